//! Low-level wire primitives
//!
//! Fixed-width integers are little-endian. Strings are either `u32`
//! length-prefixed UTF-8 or, when a string table is active, a LEB128 varint
//! index into the table. Table entries in the header carry varint lengths.
//!
//! Structs are framed as `field_count:u16` followed by that many fields,
//! each `version:u8 | length:u32 | payload`. The explicit length lets a
//! reader skip fields it does not understand.

use super::FIELD_VERSION;
use crate::error::{CodecError, CodecResult};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};

/// Flag bit marking a string table after the header.
pub(crate) const FLAG_STRING_TABLE: u8 = 0x01;

#[derive(Debug, Default)]
struct StringTable {
    index: HashMap<String, u32>,
    entries: Vec<String>,
}

impl StringTable {
    fn intern(&mut self, s: &str) -> CodecResult<u32> {
        if let Some(&idx) = self.index.get(s) {
            return Ok(idx);
        }
        let idx = u32::try_from(self.entries.len()).map_err(|_| CodecError::LengthOverflow {
            what: "string table",
            len: self.entries.len(),
        })?;
        self.index.insert(s.to_string(), idx);
        self.entries.push(s.to_string());
        Ok(idx)
    }
}

/// Append-only encoder buffer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
    strings: Option<StringTable>,
}

impl Writer {
    /// Writer that stores strings inline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer that deduplicates strings through a table emitted in the header.
    pub fn with_string_table() -> Self {
        Self {
            buf: Vec::new(),
            strings: Some(StringTable::default()),
        }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Unsigned LEB128: seven bits per byte, high bit set on all but the last.
    pub fn write_varint(&mut self, mut v: u64) {
        while v >= 0x80 {
            self.buf.push((v as u8 & 0x7f) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    /// Write a collection length as `u32`.
    pub fn write_len(&mut self, len: usize, what: &'static str) -> CodecResult<()> {
        let len32 = u32::try_from(len).map_err(|_| CodecError::LengthOverflow { what, len })?;
        self.write_u32(len32);
        Ok(())
    }

    pub fn write_string(&mut self, s: &str) -> CodecResult<()> {
        match self.strings.as_mut() {
            Some(table) => {
                let idx = table.intern(s)?;
                self.write_varint(u64::from(idx));
            }
            None => {
                self.write_len(s.len(), "string")?;
                self.buf.extend_from_slice(s.as_bytes());
            }
        }
        Ok(())
    }

    /// Seconds since the Unix epoch followed by the sub-second nanoseconds.
    pub fn write_time(&mut self, t: &DateTime<Utc>) {
        self.write_i64(t.timestamp());
        self.write_u32(t.timestamp_subsec_nanos());
    }

    pub fn write_opt_time(&mut self, t: &Option<DateTime<Utc>>) {
        match t {
            Some(t) => {
                self.write_bool(true);
                self.write_time(t);
            }
            None => self.write_bool(false),
        }
    }

    /// Map entries are written in key order.
    pub fn write_string_map(&mut self, map: &BTreeMap<String, String>) -> CodecResult<()> {
        self.write_len(map.len(), "map")?;
        for (k, v) in map {
            self.write_string(k)?;
            self.write_string(v)?;
        }
        Ok(())
    }

    /// Write a framed struct; `f` appends the fields in layout order.
    pub fn write_struct<F>(&mut self, f: F) -> CodecResult<()>
    where
        F: FnOnce(&mut StructWriter<'_>) -> CodecResult<()>,
    {
        let count_pos = self.buf.len();
        self.write_u16(0);

        let count = {
            let mut fields = StructWriter {
                writer: self,
                count: 0,
            };
            f(&mut fields)?;
            fields.count
        };

        self.buf[count_pos..count_pos + 2].copy_from_slice(&count.to_le_bytes());
        Ok(())
    }

    /// Produce the final stream: header, optional string table, body.
    pub fn finish(self, schema_version: u32) -> CodecResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.buf.len() + 16);
        out.extend_from_slice(&schema_version.to_le_bytes());

        match self.strings {
            Some(table) => {
                out.push(FLAG_STRING_TABLE);
                let mut header = Writer::new();
                header.write_varint(table.entries.len() as u64);
                for entry in &table.entries {
                    header.write_varint(entry.len() as u64);
                    header.buf.extend_from_slice(entry.as_bytes());
                }
                out.extend_from_slice(&header.buf);
            }
            None => out.push(0),
        }

        out.extend_from_slice(&self.buf);
        Ok(out)
    }
}

/// Field appender handed out by [`Writer::write_struct`].
pub struct StructWriter<'w> {
    writer: &'w mut Writer,
    count: u16,
}

impl StructWriter<'_> {
    /// Append one field tagged with `version`.
    pub fn field<F>(&mut self, version: u8, f: F) -> CodecResult<()>
    where
        F: FnOnce(&mut Writer) -> CodecResult<()>,
    {
        self.count = self.count.checked_add(1).ok_or(CodecError::LengthOverflow {
            what: "struct fields",
            len: usize::from(u16::MAX) + 1,
        })?;

        self.writer.write_u8(version);
        let len_pos = self.writer.buf.len();
        self.writer.write_u32(0);

        f(self.writer)?;

        let len = self.writer.buf.len() - len_pos - 4;
        let len32 = u32::try_from(len).map_err(|_| CodecError::LengthOverflow { what: "field", len })?;
        self.writer.buf[len_pos..len_pos + 4].copy_from_slice(&len32.to_le_bytes());
        Ok(())
    }
}

/// Cursor over an encoded buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    strings: Option<&'a [String]>,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], strings: Option<&'a [String]>) -> Self {
        Self {
            data,
            pos: 0,
            strings,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let data: &'a [u8] = self.data;
        let slice = &data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> CodecResult<f64> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    pub fn read_varint(&mut self) -> CodecResult<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::InvalidValue {
            kind: "varint",
            value: "more than 10 bytes".to_string(),
        })
    }

    /// Varint length bounded by the bytes left.
    fn read_varint_len(&mut self) -> CodecResult<usize> {
        let len = usize::try_from(self.read_varint()?).unwrap_or(usize::MAX);
        if len > self.remaining() {
            return Err(CodecError::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        Ok(len)
    }

    /// Read a collection length, bounded by the bytes left so a corrupt
    /// count cannot trigger a huge allocation.
    pub fn read_len(&mut self) -> CodecResult<usize> {
        let len = self.read_u32()? as usize;
        if len > self.remaining() {
            return Err(CodecError::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        Ok(len)
    }

    fn read_inline_string(&mut self) -> CodecResult<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    pub fn read_string(&mut self) -> CodecResult<String> {
        match self.strings {
            Some(table) => {
                let index = self.read_varint()?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| table.get(i))
                    .cloned()
                    .ok_or(CodecError::InvalidStringIndex {
                        index: u32::try_from(index).unwrap_or(u32::MAX),
                        size: table.len(),
                    })
            }
            None => self.read_inline_string(),
        }
    }

    /// Read a string and parse it into a labelled enum.
    pub fn read_parsed<T>(&mut self) -> CodecResult<T>
    where
        T: std::str::FromStr<Err = CodecError>,
    {
        self.read_string()?.parse()
    }

    /// Read a labelled enum, or `None` for a label this decoder does not
    /// know. Newer writers may add labels.
    pub fn read_known<T>(&mut self) -> CodecResult<Option<T>>
    where
        T: std::str::FromStr<Err = CodecError>,
    {
        let label = self.read_string()?;
        match label.parse() {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::debug!(label = %label, error = %err, "Unknown label");
                Ok(None)
            }
        }
    }

    /// Read a labelled enum, falling back to the default for unknown labels.
    pub fn read_label_or_default<T>(&mut self) -> CodecResult<T>
    where
        T: std::str::FromStr<Err = CodecError> + Default,
    {
        Ok(self.read_known()?.unwrap_or_default())
    }

    pub fn read_time(&mut self) -> CodecResult<DateTime<Utc>> {
        let secs = self.read_i64()?;
        let nanos = self.read_u32()?;
        Utc.timestamp_opt(secs, nanos)
            .single()
            .ok_or_else(|| CodecError::InvalidValue {
                kind: "timestamp",
                value: format!("{secs}.{nanos:09}"),
            })
    }

    pub fn read_opt_time(&mut self) -> CodecResult<Option<DateTime<Utc>>> {
        if self.read_bool()? {
            Ok(Some(self.read_time()?))
        } else {
            Ok(None)
        }
    }

    pub fn read_string_map(&mut self) -> CodecResult<BTreeMap<String, String>> {
        let len = self.read_len()?;
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let k = self.read_string()?;
            let v = self.read_string()?;
            map.insert(k, v);
        }
        Ok(map)
    }

    /// Read a framed struct. Fields left unread by `f` are skipped.
    pub fn read_struct<T, F>(&mut self, f: F) -> CodecResult<T>
    where
        F: FnOnce(&mut StructReader<'a>) -> CodecResult<T>,
    {
        let count = self.read_u16()?;
        let mut fields = Vec::with_capacity(usize::from(count).min(self.remaining()));
        for _ in 0..count {
            let version = self.read_u8()?;
            let len = self.read_u32()? as usize;
            fields.push((version, self.take(len)?));
        }

        let mut reader = StructReader {
            fields: fields.into_iter(),
            strings: self.strings,
        };
        f(&mut reader)
    }

    /// Read the stream header and, when flagged, the string table.
    ///
    /// Returns the schema version, the string table and the offset of the
    /// body.
    pub(crate) fn read_header(data: &'a [u8]) -> CodecResult<(u32, Option<Vec<String>>, usize)> {
        let mut header = Reader::new(data, None);
        let version = header.read_u32()?;
        let flags = header.read_u8()?;

        let table = if flags & FLAG_STRING_TABLE != 0 {
            let len = header.read_varint_len()?;
            let mut entries = Vec::with_capacity(len);
            for _ in 0..len {
                let size = header.read_varint_len()?;
                let bytes = header.take(size)?;
                entries.push(String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)?);
            }
            Some(entries)
        } else {
            None
        };

        Ok((version, table, header.pos))
    }
}

/// Sequential access to the fields of a framed struct.
pub struct StructReader<'a> {
    fields: std::vec::IntoIter<(u8, &'a [u8])>,
    strings: Option<&'a [String]>,
}

impl<'a> StructReader<'a> {
    /// Next field this decoder understands, or `None` when the stream has
    /// no more fields. Fields tagged with a newer version are skipped.
    pub fn next_field(&mut self) -> Option<Reader<'a>> {
        self.fields
            .by_ref()
            .find(|(version, _)| *version <= FIELD_VERSION)
            .map(|(_, payload)| Reader::new(payload, self.strings))
    }

    /// Decode the next field with `f`; `None` when the field is absent.
    pub fn read<T, F>(&mut self, f: F) -> CodecResult<Option<T>>
    where
        F: FnOnce(&mut Reader<'a>) -> CodecResult<T>,
    {
        match self.next_field() {
            Some(mut reader) => f(&mut reader).map(Some),
            None => Ok(None),
        }
    }

    /// Decode the next field, falling back to the type's default.
    pub fn read_or_default<T, F>(&mut self, f: F) -> CodecResult<T>
    where
        T: Default,
        F: FnOnce(&mut Reader<'a>) -> CodecResult<T>,
    {
        Ok(self.read(f)?.unwrap_or_default())
    }

    /// Decode the next field, failing when it is absent.
    pub fn read_required<T, F>(&mut self, name: &'static str, f: F) -> CodecResult<T>
    where
        F: FnOnce(&mut Reader<'a>) -> CodecResult<T>,
    {
        self.read(f)?.ok_or(CodecError::MissingField(name))
    }
}
