//! Versioned binary codec
//!
//! Artifacts start with a `schema_version:u32` and a flags byte, optionally
//! followed by a string table, then the top-level struct. Every struct field
//! carries the version it was introduced in and its byte length, so a
//! decoder can skip fields it does not know about.
//!
//! Fields are only ever appended to a struct's layout. A decoder for schema
//! `N` reads streams of any version: older streams simply lack trailing
//! fields (which decode to defaults), newer streams carry trailing fields
//! that are skipped.

mod encoding;
mod kubemodel;
mod wire;


pub use encoding::{decode_binary, decode_json, BinaryEncoder, Encoder, JsonEncoder};
pub use wire::{Reader, StructReader, StructWriter, Writer};

use crate::error::CodecResult;
use std::collections::HashMap;

/// Schema version written by this encoder.
pub const SCHEMA_VERSION: u32 = 1;

/// Highest per-field version this decoder understands.
pub const FIELD_VERSION: u8 = 1;

/// Types with a field-framed binary representation.
pub trait BinaryCodec: Sized {
    fn encode(&self, w: &mut Writer) -> CodecResult<()>;

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self>;
}

/// Encode a top-level value with the schema header.
pub fn encode_versioned<T: BinaryCodec>(value: &T, string_table: bool) -> CodecResult<Vec<u8>> {
    let mut w = if string_table {
        Writer::with_string_table()
    } else {
        Writer::new()
    };
    value.encode(&mut w)?;
    w.finish(SCHEMA_VERSION)
}

/// Decode a top-level value written by [`encode_versioned`] at any schema
/// version.
pub fn decode_versioned<T: BinaryCodec>(data: &[u8]) -> CodecResult<T> {
    let (version, table, offset) = Reader::read_header(data)?;
    if version > SCHEMA_VERSION {
        tracing::debug!(
            stream_version = version,
            decoder_version = SCHEMA_VERSION,
            "Decoding newer schema; unknown fields will be skipped"
        );
    }

    let mut r = Reader::new(&data[offset..], table.as_deref());
    T::decode(&mut r)
}

pub(crate) fn write_option<T: BinaryCodec>(w: &mut Writer, value: &Option<T>) -> CodecResult<()> {
    match value {
        Some(v) => {
            w.write_bool(true);
            v.encode(w)
        }
        None => {
            w.write_bool(false);
            Ok(())
        }
    }
}

pub(crate) fn read_option<T: BinaryCodec>(r: &mut Reader<'_>) -> CodecResult<Option<T>> {
    if r.read_bool()? {
        Ok(Some(T::decode(r)?))
    } else {
        Ok(None)
    }
}

pub(crate) fn write_seq<T: BinaryCodec>(w: &mut Writer, items: &[T]) -> CodecResult<()> {
    w.write_len(items.len(), "sequence")?;
    items.iter().try_for_each(|item| item.encode(w))
}

pub(crate) fn read_seq<T: BinaryCodec>(r: &mut Reader<'_>) -> CodecResult<Vec<T>> {
    let len = r.read_len()?;
    (0..len).map(|_| T::decode(r)).collect()
}

/// UID-keyed maps are written in key order so artifacts are deterministic.
pub(crate) fn write_entity_map<T: BinaryCodec>(w: &mut Writer, map: &HashMap<String, T>) -> CodecResult<()> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    w.write_len(keys.len(), "entity map")?;
    for key in keys {
        w.write_string(key)?;
        map[key].encode(w)?;
    }
    Ok(())
}

pub(crate) fn read_entity_map<T: BinaryCodec>(r: &mut Reader<'_>) -> CodecResult<HashMap<String, T>> {
    let len = r.read_len()?;
    let mut map = HashMap::with_capacity(len);
    for _ in 0..len {
        let key = r.read_string()?;
        map.insert(key, T::decode(r)?);
    }
    Ok(map)
}
