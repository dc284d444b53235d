//! Artifact encoders used by export controllers

use super::{encode_versioned, BinaryCodec};
use crate::error::CodecResult;
use crate::model::KubeModelSet;
use serde::Serialize;

/// Turns a computed value into artifact bytes.
pub trait Encoder<T>: Send + Sync {
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>>;

    /// File extension of produced artifacts, without the dot.
    fn file_ext(&self) -> &'static str;
}

/// Versioned binary encoding with a string table.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryEncoder;

impl<T: BinaryCodec> Encoder<T> for BinaryEncoder {
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>> {
        encode_versioned(value, true)
    }

    fn file_ext(&self) -> &'static str {
        "bin"
    }
}

/// JSON encoding, mainly for inspection and debugging.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl<T: Serialize> Encoder<T> for JsonEncoder {
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn file_ext(&self) -> &'static str {
        "json"
    }
}

/// Decode a binary artifact written by [`BinaryEncoder`].
pub fn decode_binary(data: &[u8]) -> CodecResult<KubeModelSet> {
    KubeModelSet::unmarshal_binary(data)
}

/// Decode a JSON artifact and rebuild the set's lookup tables.
pub fn decode_json(data: &[u8]) -> CodecResult<KubeModelSet> {
    let mut kms: KubeModelSet = serde_json::from_slice(data)?;
    kms.rebuild_indexes();
    Ok(kms)
}
