//! Byte encodings used on the shuffle and for map-side records, plus the
//! name → encoding registry that stands in for a serializer lookup service.

use crate::error::{CoGroupError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FormatResult};

/// Wire encoding of a key/value payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Json,
    Postcard,
}

impl Encoding {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Postcard => "postcard",
        }
    }

    /// # Errors
    /// Returns [`CoGroupError::Encode`] if `value` cannot be serialized.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let out = match self {
            Self::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            Self::Postcard => postcard::to_allocvec(value).map_err(|e| e.to_string()),
        };
        out.map_err(|reason| CoGroupError::Encode {
            encoding: self.name(),
            reason,
        })
    }

    /// Decode into an owned value; the result never borrows from `bytes`.
    ///
    /// # Errors
    /// Returns [`CoGroupError::Decode`] on malformed input.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let out = match self {
            Self::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            Self::Postcard => postcard::from_bytes(bytes).map_err(|e| e.to_string()),
        };
        out.map_err(|reason| CoGroupError::Decode {
            encoding: self.name(),
            reason,
        })
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(self.name())
    }
}

/// Serializer lookup by name.
///
/// Pre-populated with `"json"` and `"postcard"`; callers may add aliases.
#[derive(Clone, Debug)]
pub struct SerializerRegistry {
    by_name: HashMap<String, Encoding>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        let mut by_name = HashMap::new();
        for enc in [Encoding::Json, Encoding::Postcard] {
            by_name.insert(enc.name().to_string(), enc);
        }
        Self { by_name }
    }
}

impl SerializerRegistry {
    /// Register (or replace) `name`, returning the previous mapping.
    pub fn register(&mut self, name: impl Into<String>, encoding: Encoding) -> Option<Encoding> {
        self.by_name.insert(name.into(), encoding)
    }

    /// # Errors
    /// Returns [`CoGroupError::UnknownSerializer`] when nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Encoding> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| CoGroupError::UnknownSerializer(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_defaults_and_aliases() -> Result<()> {
        let mut reg = SerializerRegistry::default();
        assert_eq!(reg.get("json")?, Encoding::Json);
        assert!(matches!(reg.get("kryo"), Err(CoGroupError::UnknownSerializer(_))));
        reg.register("kryo", Encoding::Postcard);
        assert_eq!(reg.get("kryo")?, Encoding::Postcard);
        Ok(())
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = Encoding::Json.decode::<(u32, String)>(b"{not json").unwrap_err();
        assert!(matches!(err, CoGroupError::Decode { encoding: "json", .. }));
    }
}
