//! Runtime type tags.
//!
//! Records that arrive in a map-side byte encoding lose their static key type.
//! They carry a [`TypeTag`] instead, which the decoder compares against the
//! operator's canonical key type before trusting the payload.

use std::any::{TypeId, type_name};

/// A lightweight runtime type tag.
///
/// ```
/// use ironbeam_cogroup::type_token::TypeTag;
/// let tag = TypeTag::of::<u32>();
/// assert_eq!(tag.name, "u32");
/// assert!(tag.is::<u32>());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeTag {
    /// Stable Rust type identifier.
    pub id: TypeId,
    /// Human-readable type name (best-effort).
    pub name: &'static str,
}

impl TypeTag {
    /// Construct a tag for `T`.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Whether this tag describes `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}
