//! Records as produced by source partitions.
//!
//! A source either yields typed pairs directly or hands out records still in a
//! map-side byte encoding. Encoded records of one batch share a single buffer,
//! so decoders must copy out whatever they keep.

use crate::error::{CoGroupError, Result};
use crate::serializer::Encoding;
use crate::type_token::TypeTag;
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum Record<K, V> {
    /// Canonical, already typed pair.
    Decoded(K, V),
    /// Key and value still in a byte encoding; see [`crate::adapter`].
    Encoded(EncodedRecord),
}

impl<K, V> From<(K, V)> for Record<K, V> {
    fn from((k, v): (K, V)) -> Self {
        Self::Decoded(k, v)
    }
}

/// A key/value pair in a map-side byte encoding.
#[derive(Clone, Debug)]
pub struct EncodedRecord {
    encoding: Encoding,
    key_type: TypeTag,
    buffer: Arc<[u8]>,
    key: Range<usize>,
    value: Range<usize>,
}

impl EncodedRecord {
    /// Point into a shared `buffer`.
    ///
    /// # Errors
    /// Returns [`CoGroupError::Decode`] when either range falls outside the buffer.
    pub fn in_buffer(
        encoding: Encoding,
        key_type: TypeTag,
        buffer: Arc<[u8]>,
        key: Range<usize>,
        value: Range<usize>,
    ) -> Result<Self> {
        for r in [&key, &value] {
            if r.start > r.end || r.end > buffer.len() {
                return Err(CoGroupError::Decode {
                    encoding: encoding.name(),
                    reason: format!("range {r:?} outside buffer of {} bytes", buffer.len()),
                });
            }
        }
        Ok(Self {
            encoding,
            key_type,
            buffer,
            key,
            value,
        })
    }

    /// Encode a single pair into its own buffer.
    ///
    /// # Errors
    /// Propagates encoding failures.
    pub fn encode<K, V>(encoding: Encoding, key: &K, value: &V) -> Result<Self>
    where
        K: Serialize + 'static,
        V: Serialize,
    {
        let mut batch = encode_batch(encoding, [(key, value)])?;
        Ok(batch.remove(0))
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The key type the producer claims the key bytes hold.
    #[must_use]
    pub fn key_type(&self) -> TypeTag {
        self.key_type
    }

    #[must_use]
    pub fn key_bytes(&self) -> &[u8] {
        &self.buffer[self.key.clone()]
    }

    #[must_use]
    pub fn value_bytes(&self) -> &[u8] {
        &self.buffer[self.value.clone()]
    }

    /// Number of records currently sharing this record's buffer.
    #[must_use]
    pub fn buffer_refs(&self) -> usize {
        Arc::strong_count(&self.buffer)
    }
}

/// Encode many pairs back to back into one shared buffer, the way a map-side
/// writer packs a block.
///
/// # Errors
/// Propagates encoding failures.
pub fn encode_batch<'a, K, V, I>(encoding: Encoding, pairs: I) -> Result<Vec<EncodedRecord>>
where
    K: Serialize + 'static,
    V: Serialize + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    let mut buf = Vec::new();
    let mut spans = Vec::new();
    for (k, v) in pairs {
        let kb = encoding.encode(k)?;
        let vb = encoding.encode(v)?;
        let ks = buf.len();
        buf.extend_from_slice(&kb);
        let vs = buf.len();
        buf.extend_from_slice(&vb);
        spans.push((ks..vs, vs..buf.len()));
    }
    let buffer: Arc<[u8]> = buf.into();
    let key_type = TypeTag::of::<K>();
    Ok(spans
        .into_iter()
        .map(|(key, value)| EncodedRecord {
            encoding,
            key_type,
            buffer: Arc::clone(&buffer),
            key,
            value,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_shares_one_buffer() -> Result<()> {
        let pairs = [(1u32, "a".to_string()), (2, "bb".to_string())];
        let recs = encode_batch(Encoding::Postcard, pairs.iter().map(|(k, v)| (k, v)))?;
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].buffer_refs(), 2);
        let k: u32 = Encoding::Postcard.decode(recs[1].key_bytes())?;
        let v: String = Encoding::Postcard.decode(recs[1].value_bytes())?;
        assert_eq!((k, v.as_str()), (2, "bb"));
        Ok(())
    }

    #[test]
    fn in_buffer_checks_ranges() {
        let buf: Arc<[u8]> = vec![0u8; 4].into();
        let r = EncodedRecord::in_buffer(Encoding::Json, TypeTag::of::<u8>(), buf, 0..2, 2..9);
        assert!(r.is_err());
    }
}
