//! Transcoding of map-side encoded records into canonical typed pairs.
//!
//! Which adapter handles a record is decided by asking each adapter whether it
//! [`supports`](KeyAdapter::supports) the record's [`Encoding`] tag; the merge
//! loop never inspects concrete record types. New encodings plug in by
//! registering another adapter on the [`RecordDecoder`].

use crate::dataset::Data;
use crate::error::{CoGroupError, Result};
use crate::record::{EncodedRecord, Record};
use crate::serializer::Encoding;
use std::any::type_name;
use std::sync::Arc;

pub trait KeyAdapter<K, V>: Send + Sync {
    /// Capability check against the record's encoding tag.
    fn supports(&self, encoding: Encoding) -> bool;

    /// Decode into owned values. Implementations must not keep references into
    /// the record's buffer, which the producing iterator may reuse.
    fn decode(&self, record: &EncodedRecord) -> Result<(K, V)>;
}

/// Adapter for the serde-backed encodings in [`Encoding`].
#[derive(Clone, Debug)]
pub struct CodecAdapter {
    encodings: Vec<Encoding>,
}

impl CodecAdapter {
    #[must_use]
    pub fn new(encodings: impl IntoIterator<Item = Encoding>) -> Self {
        Self {
            encodings: encodings.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn all() -> Self {
        Self::new([Encoding::Json, Encoding::Postcard])
    }
}

impl<K: Data, V: Data> KeyAdapter<K, V> for CodecAdapter {
    fn supports(&self, encoding: Encoding) -> bool {
        self.encodings.contains(&encoding)
    }

    fn decode(&self, record: &EncodedRecord) -> Result<(K, V)> {
        let enc = record.encoding();
        let key: K = enc.decode(record.key_bytes())?;
        let value: V = enc.decode(record.value_bytes())?;
        Ok((key, value))
    }
}

/// Ordered set of adapters; the first one that supports a record's encoding wins.
pub struct RecordDecoder<K, V> {
    adapters: Vec<Arc<dyn KeyAdapter<K, V>>>,
}

impl<K, V> Clone for RecordDecoder<K, V> {
    fn clone(&self) -> Self {
        Self {
            adapters: self.adapters.clone(),
        }
    }
}

impl<K: Data, V: Data> Default for RecordDecoder<K, V> {
    fn default() -> Self {
        Self {
            adapters: vec![Arc::new(CodecAdapter::all())],
        }
    }
}

impl<K: 'static, V> RecordDecoder<K, V> {
    /// A decoder that accepts only already decoded records.
    #[must_use]
    pub fn empty() -> Self {
        Self { adapters: Vec::new() }
    }

    /// Add an adapter ahead of the existing ones.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn KeyAdapter<K, V>>) -> Self {
        self.adapters.insert(0, adapter);
        self
    }

    /// Turn a source record into a canonical pair.
    ///
    /// # Errors
    /// - [`CoGroupError::KeyTypeMismatch`] if the record's key tag is not `K`
    /// - [`CoGroupError::NoAdapter`] if no adapter supports the encoding
    /// - whatever the chosen adapter reports while decoding
    pub fn decode(&self, record: Record<K, V>) -> Result<(K, V)> {
        match record {
            Record::Decoded(k, v) => Ok((k, v)),
            Record::Encoded(rec) => {
                let tag = rec.key_type();
                if !tag.is::<K>() {
                    return Err(CoGroupError::KeyTypeMismatch {
                        expected: type_name::<K>(),
                        found: tag.name,
                    });
                }
                let adapter = self
                    .adapters
                    .iter()
                    .find(|a| a.supports(rec.encoding()))
                    .ok_or(CoGroupError::NoAdapter(rec.encoding().name()))?;
                adapter.decode(&rec)
            }
        }
    }
}
