//! # Portable Storage
//!
//! Self-describing binary key-value format used for every Levin packet body.
//!
//! ## Wire Format
//! ```text
//! [SigA(4)] [SigB(4)] [Version(1)]          optional storage header
//! [Count(varint)]
//! [NameLen(1)] [Name(N)] [Tag(1)] [Payload]  repeated Count times
//! ```
//!
//! Payloads are little-endian. Strings carry a varint length. Objects are a
//! nested section without the storage header. Arrays carry one element tag,
//! a varint count and the element payloads back to back; a byte blob is an
//! array of `uint8`.
//!
//! The element tag byte ahead of the count makes arrays self-describing, so
//! [`decode`] never needs the element type from the caller. Peers that write
//! the bare `[Count][Elements]` form without that byte are not readable here.
//!
//! Names are unique within a section: [`Section::insert`] replaces in place
//! and [`decode`] rejects a repeated name.
//!
//! Decoding is all-or-nothing: a failure anywhere in the buffer yields an
//! error and no partially filled section.

use crate::core::varint;
use crate::error::{constants, ProtocolError, Result};
use bytes::BufMut;
use std::collections::HashSet;

/// First storage signature word
pub const SIGNATURE_A: u32 = 0x0101_1101;
/// Second storage signature word
pub const SIGNATURE_B: u32 = 0x0102_0101;
/// Storage format version
pub const FORMAT_VERSION: u8 = 1;
/// Size of the optional storage header
pub const STORAGE_HEADER_LEN: usize = 9;

/// Deepest object/array nesting accepted while decoding
pub const MAX_DEPTH: usize = 32;

/// One-byte wire type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    I64 = 1,
    I32 = 2,
    I16 = 3,
    I8 = 4,
    U64 = 5,
    U32 = 6,
    U16 = 7,
    U8 = 8,
    F64 = 9,
    String = 10,
    Bool = 11,
    Object = 12,
    Array = 13,
    Reserved = 14,
}

impl TypeTag {
    /// Map a wire byte to a tag, rejecting anything outside 1..=14
    pub fn from_byte(byte: u8) -> Result<Self> {
        Ok(match byte {
            1 => TypeTag::I64,
            2 => TypeTag::I32,
            3 => TypeTag::I16,
            4 => TypeTag::I8,
            5 => TypeTag::U64,
            6 => TypeTag::U32,
            7 => TypeTag::U16,
            8 => TypeTag::U8,
            9 => TypeTag::F64,
            10 => TypeTag::String,
            11 => TypeTag::Bool,
            12 => TypeTag::Object,
            13 => TypeTag::Array,
            14 => TypeTag::Reserved,
            other => return Err(ProtocolError::UnknownType(other)),
        })
    }

    /// Smallest number of payload bytes a value of this type can occupy
    fn min_width(self) -> usize {
        match self {
            TypeTag::I64 | TypeTag::U64 | TypeTag::F64 => 8,
            TypeTag::I32 | TypeTag::U32 => 4,
            TypeTag::I16 | TypeTag::U16 => 2,
            TypeTag::Array => 2,
            _ => 1,
        }
    }
}

/// A single typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I64(i64),
    I32(i32),
    I16(i16),
    I8(i8),
    U64(u64),
    U32(u32),
    U16(u16),
    U8(u8),
    F64(f64),
    String(String),
    Bool(bool),
    Object(Section),
    Array(Array),
    /// Raw bytes, carried on the wire as an array of `uint8`
    Blob(Vec<u8>),
}

impl Value {
    /// Wire tag this value is written with
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::I64(_) => TypeTag::I64,
            Value::I32(_) => TypeTag::I32,
            Value::I16(_) => TypeTag::I16,
            Value::I8(_) => TypeTag::I8,
            Value::U64(_) => TypeTag::U64,
            Value::U32(_) => TypeTag::U32,
            Value::U16(_) => TypeTag::U16,
            Value::U8(_) => TypeTag::U8,
            Value::F64(_) => TypeTag::F64,
            Value::String(_) => TypeTag::String,
            Value::Bool(_) => TypeTag::Bool,
            Value::Object(_) => TypeTag::Object,
            Value::Array(_) | Value::Blob(_) => TypeTag::Array,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U64(v) => Some(v),
            Value::U32(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::U8(v) => Some(v.into()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I64(v) => Some(v),
            Value::I32(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::I8(v) => Some(v.into()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Section> {
        match self {
            Value::Object(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_value!(
    i64 => I64, i32 => I32, i16 => I16, i8 => I8,
    u64 => U64, u32 => U32, u16 => U16, u8 => U8,
    f64 => F64, String => String, bool => Bool,
    Section => Object, Array => Array, Vec<u8> => Blob,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

/// Homogeneous array of values sharing one element tag
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    elem: TypeTag,
    items: Vec<Value>,
}

impl Array {
    /// Build an array, checking every item against the declared element type.
    ///
    /// `uint8` arrays are represented by [`Value::Blob`] and cannot be built here.
    pub fn new(elem: TypeTag, items: Vec<Value>) -> Result<Self> {
        match elem {
            TypeTag::U8 => return Err(ProtocolError::format(constants::ERR_BYTE_ARRAY)),
            TypeTag::Reserved => return Err(ProtocolError::format(constants::ERR_RESERVED_TAG)),
            _ => {}
        }
        if items.iter().any(|item| item.tag() != elem) {
            return Err(ProtocolError::format(constants::ERR_MIXED_ARRAY));
        }
        Ok(Self { elem, items })
    }

    /// Array of nested sections
    pub fn of_objects(items: Vec<Section>) -> Self {
        Self {
            elem: TypeTag::Object,
            items: items.into_iter().map(Value::Object).collect(),
        }
    }

    pub fn element_type(&self) -> TypeTag {
        self.elem
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Ordered set of named values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Section {
    entries: Vec<(String, Value)>,
}

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing an existing entry with the same name in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    fn require<'a, T>(&'a self, name: &str, f: impl FnOnce(&'a Value) -> Option<T>) -> Result<T> {
        self.get(name)
            .and_then(f)
            .ok_or_else(|| ProtocolError::Format(format!("missing or mistyped field `{name}`")))
    }

    pub fn get_u64(&self, name: &str) -> Result<u64> {
        self.require(name, Value::as_u64)
    }

    pub fn get_u32(&self, name: &str) -> Result<u32> {
        let v = self.get_u64(name)?;
        u32::try_from(v).map_err(|_| ProtocolError::Format(format!("field `{name}` out of range")))
    }

    pub fn get_i64(&self, name: &str) -> Result<i64> {
        self.require(name, Value::as_i64)
    }

    pub fn get_str(&self, name: &str) -> Result<&str> {
        self.require(name, Value::as_str)
    }

    pub fn get_blob(&self, name: &str) -> Result<&[u8]> {
        self.require(name, Value::as_blob)
    }

    /// Fixed-size blob field, e.g. a hash or network id
    pub fn get_bytes<const N: usize>(&self, name: &str) -> Result<[u8; N]> {
        let blob = self.get_blob(name)?;
        <[u8; N]>::try_from(blob).map_err(|_| {
            ProtocolError::Format(format!(
                "field `{name}` must be {N} bytes, got {}",
                blob.len()
            ))
        })
    }

    pub fn get_object(&self, name: &str) -> Result<&Section> {
        self.require(name, Value::as_object)
    }

    pub fn get_array(&self, name: &str) -> Result<&Array> {
        self.require(name, Value::as_array)
    }
}

/// Serialize a section, optionally prefixed by the 9-byte storage header
pub fn encode(section: &Section, include_header: bool) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(64);
    if include_header {
        out.put_u32_le(SIGNATURE_A);
        out.put_u32_le(SIGNATURE_B);
        out.put_u8(FORMAT_VERSION);
    }
    write_section(&mut out, section)?;
    Ok(out)
}

/// Parse a section from the front of `bytes`.
///
/// Returns the section and whatever bytes follow it.
pub fn decode(bytes: &[u8], include_header: bool) -> Result<(Section, &[u8])> {
    let mut reader = Reader::new(bytes);
    if include_header {
        let sig_a = reader.u32()?;
        let sig_b = reader.u32()?;
        if sig_a != SIGNATURE_A || sig_b != SIGNATURE_B {
            return Err(ProtocolError::format(constants::ERR_STORAGE_SIGNATURE));
        }
        let version = reader.u8()?;
        if version != FORMAT_VERSION {
            return Err(ProtocolError::Format(format!(
                "{}: {version}",
                constants::ERR_STORAGE_VERSION
            )));
        }
    }
    let section = reader.section(0)?;
    Ok((section, reader.rest()))
}

fn write_section(out: &mut Vec<u8>, section: &Section) -> Result<()> {
    varint::write(out, section.len() as u64)?;
    for (name, value) in section.iter() {
        let name_len = u8::try_from(name.len())
            .map_err(|_| ProtocolError::format(constants::ERR_NAME_TOO_LONG))?;
        out.put_u8(name_len);
        out.put_slice(name.as_bytes());
        out.put_u8(value.tag() as u8);
        write_payload(out, value)?;
    }
    Ok(())
}

fn write_payload(out: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::I64(v) => out.put_i64_le(*v),
        Value::I32(v) => out.put_i32_le(*v),
        Value::I16(v) => out.put_i16_le(*v),
        Value::I8(v) => out.put_i8(*v),
        Value::U64(v) => out.put_u64_le(*v),
        Value::U32(v) => out.put_u32_le(*v),
        Value::U16(v) => out.put_u16_le(*v),
        Value::U8(v) => out.put_u8(*v),
        Value::F64(v) => out.put_f64_le(*v),
        Value::Bool(v) => out.put_u8(u8::from(*v)),
        Value::String(s) => {
            varint::write(out, s.len() as u64)?;
            out.put_slice(s.as_bytes());
        }
        Value::Object(section) => write_section(out, section)?,
        Value::Array(array) => {
            out.put_u8(array.elem as u8);
            varint::write(out, array.items.len() as u64)?;
            for item in &array.items {
                write_payload(out, item)?;
            }
        }
        Value::Blob(bytes) => {
            out.put_u8(TypeTag::U8 as u8);
            varint::write(out, bytes.len() as u64)?;
            out.put_slice(bytes);
        }
    }
    Ok(())
}

/// Bounds-checked cursor over an input buffer
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(ProtocolError::Bounds {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn varint(&mut self) -> Result<u64> {
        let (value, used) = varint::read(self.rest())?;
        self.pos += used;
        Ok(value)
    }

    /// Read a length/count and make sure `min_width` bytes per unit are still available
    fn count(&mut self, min_width: usize) -> Result<usize> {
        let count = self.varint()?;
        let needed = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(min_width))
            .unwrap_or(usize::MAX);
        if needed > self.remaining() {
            return Err(ProtocolError::Bounds {
                needed,
                remaining: self.remaining(),
            });
        }
        // needed fits in usize, so count does too
        Ok(count as usize)
    }

    fn section(&mut self, depth: usize) -> Result<Section> {
        if depth > MAX_DEPTH {
            return Err(ProtocolError::format(constants::ERR_NESTING_TOO_DEEP));
        }
        // name length + tag + at least one payload byte
        let count = self.count(3)?;
        let mut entries = Vec::with_capacity(count);
        let mut seen = HashSet::with_capacity(count);
        for _ in 0..count {
            let name_len = self.u8()? as usize;
            let name = std::str::from_utf8(self.take(name_len)?)
                .map_err(|_| ProtocolError::format(constants::ERR_INVALID_UTF8))?
                .to_owned();
            if !seen.insert(name.clone()) {
                return Err(ProtocolError::format(format!(
                    "{}: {name}",
                    constants::ERR_DUPLICATE_NAME
                )));
            }
            let tag = TypeTag::from_byte(self.u8()?)?;
            let value = self.value(tag, depth)?;
            entries.push((name, value));
        }
        Ok(Section { entries })
    }

    fn value(&mut self, tag: TypeTag, depth: usize) -> Result<Value> {
        Ok(match tag {
            TypeTag::I64 => Value::I64(i64::from_le_bytes(self.array()?)),
            TypeTag::I32 => Value::I32(i32::from_le_bytes(self.array()?)),
            TypeTag::I16 => Value::I16(i16::from_le_bytes(self.array()?)),
            TypeTag::I8 => Value::I8(i8::from_le_bytes(self.array()?)),
            TypeTag::U64 => Value::U64(u64::from_le_bytes(self.array()?)),
            TypeTag::U32 => Value::U32(self.u32()?),
            TypeTag::U16 => Value::U16(u16::from_le_bytes(self.array()?)),
            TypeTag::U8 => Value::U8(self.u8()?),
            TypeTag::F64 => Value::F64(f64::from_le_bytes(self.array()?)),
            TypeTag::Bool => match self.u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                _ => return Err(ProtocolError::format(constants::ERR_INVALID_BOOL)),
            },
            TypeTag::String => {
                let len = self.count(1)?;
                let s = std::str::from_utf8(self.take(len)?)
                    .map_err(|_| ProtocolError::format(constants::ERR_INVALID_UTF8))?;
                Value::String(s.to_owned())
            }
            TypeTag::Object => Value::Object(self.section(depth + 1)?),
            TypeTag::Array => self.array_value(depth + 1)?,
            TypeTag::Reserved => return Err(ProtocolError::format(constants::ERR_RESERVED_TAG)),
        })
    }

    fn array_value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(ProtocolError::format(constants::ERR_NESTING_TOO_DEEP));
        }
        let elem = TypeTag::from_byte(self.u8()?)?;
        if elem == TypeTag::Reserved {
            return Err(ProtocolError::format(constants::ERR_RESERVED_TAG));
        }
        let count = self.count(elem.min_width())?;
        if elem == TypeTag::U8 {
            return Ok(Value::Blob(self.take(count)?.to_vec()));
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.value(elem, depth)?);
        }
        Ok(Value::Array(Array { elem, items }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn sample() -> Section {
        let inner = Section::new()
            .with("current_height", 1234u64)
            .with("top_id", vec![0xAB; 32]);
        Section::new()
            .with("i64", -5i64)
            .with("i8", -1i8)
            .with("u16", 65_535u16)
            .with("f", 1.5f64)
            .with("flag", true)
            .with("name", "node")
            .with("payload_data", inner.clone())
            .with(
                "list",
                Array::new(TypeTag::U32, vec![1u32.into(), 2u32.into()]).unwrap(),
            )
            .with("objects", Array::of_objects(vec![inner.clone(), inner]))
    }

    #[test]
    fn test_roundtrip_with_and_without_header() {
        let section = sample();
        for header in [true, false] {
            let bytes = encode(&section, header).unwrap();
            let (decoded, rest) = decode(&bytes, header).unwrap();
            assert_eq!(decoded, section);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&Section::new(), true).unwrap();
        assert_eq!(
            bytes,
            [0x01, 0x11, 0x01, 0x01, 0x01, 0x01, 0x02, 0x01, 0x01, 0x00]
        );
    }

    #[test]
    fn test_entry_layout() {
        let bytes = encode(&Section::new().with("a", 7u32), false).unwrap();
        assert_eq!(bytes, [0x04, 0x01, b'a', 6, 7, 0, 0, 0]);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut section = Section::new().with("a", 1u8).with("b", 2u8);
        section.insert("a", 9u8);
        let names: Vec<_> = section.iter().map(|(n, _)| n.to_owned()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(section.get_u64("a").unwrap(), 9);
    }

    #[test]
    fn test_remaining_bytes_returned() {
        let mut bytes = encode(&Section::new().with("x", 1u8), false).unwrap();
        bytes.extend_from_slice(&[0xDE, 0xAD]);
        let (_, rest) = decode(&bytes, false).unwrap();
        assert_eq!(rest, [0xDE, 0xAD]);
    }

    #[test]
    fn test_bad_signature() {
        let mut bytes = encode(&Section::new(), true).unwrap();
        bytes[0] = 0xFF;
        assert!(matches!(decode(&bytes, true), Err(ProtocolError::Format(_))));
    }

    #[test]
    fn test_bad_version() {
        let mut bytes = encode(&Section::new(), true).unwrap();
        bytes[8] = 2;
        assert!(matches!(decode(&bytes, true), Err(ProtocolError::Format(_))));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let bytes = [0x04, 0x01, b'a', 15, 0];
        assert!(matches!(
            decode(&bytes, false),
            Err(ProtocolError::UnknownType(15))
        ));
        let bytes = [0x04, 0x01, b'a', 0, 0];
        assert!(matches!(
            decode(&bytes, false),
            Err(ProtocolError::UnknownType(0))
        ));
    }

    #[test]
    fn test_reserved_tag_rejected() {
        let bytes = [0x04, 0x01, b'a', 14, 0];
        assert!(matches!(decode(&bytes, false), Err(ProtocolError::Format(_))));
    }

    #[test]
    fn test_truncation_is_bounds_error() {
        let bytes = encode(&sample(), true).unwrap();
        for cut in 0..bytes.len() {
            let result = decode(&bytes[..cut], true);
            assert!(
                matches!(result, Err(ProtocolError::Bounds { .. })),
                "cut at {cut}: {result:?}"
            );
        }
    }

    #[test]
    fn test_string_length_past_end() {
        // "s" : string claiming 40 bytes with 2 present
        let bytes = [0x04, 0x01, b's', 10, 40 << 2, b'h', b'i'];
        assert!(matches!(
            decode(&bytes, false),
            Err(ProtocolError::Bounds { .. })
        ));
    }

    #[test]
    fn test_huge_array_count_rejected_before_allocation() {
        let mut bytes = vec![0x04, 0x01, b'a', 13, TypeTag::U64 as u8];
        varint::write(&mut bytes, varint::MAX_VARINT).unwrap();
        assert!(matches!(
            decode(&bytes, false),
            Err(ProtocolError::Bounds { .. })
        ));
    }

    #[test]
    fn test_invalid_bool() {
        let bytes = [0x04, 0x01, b'b', 11, 2];
        assert!(matches!(decode(&bytes, false), Err(ProtocolError::Format(_))));
    }

    #[test]
    fn test_nesting_limit() {
        let mut section = Section::new().with("leaf", 1u8);
        for _ in 0..(MAX_DEPTH + 2) {
            section = Section::new().with("o", section);
        }
        let bytes = encode(&section, false).unwrap();
        assert!(matches!(decode(&bytes, false), Err(ProtocolError::Format(_))));
    }

    #[test]
    fn test_blob_is_uint8_array() {
        let bytes = encode(&Section::new().with("b", vec![1u8, 2, 3]), false).unwrap();
        assert_eq!(bytes, [0x04, 0x01, b'b', 13, 8, 3 << 2, 1, 2, 3]);
        let (decoded, _) = decode(&bytes, false).unwrap();
        assert_eq!(decoded.get_blob("b").unwrap(), [1, 2, 3]);
    }

    #[test]
    fn test_array_type_checks() {
        assert!(Array::new(TypeTag::U32, vec![1u64.into()]).is_err());
        assert!(Array::new(TypeTag::U8, vec![]).is_err());
        assert!(Array::new(TypeTag::Reserved, vec![]).is_err());
        let nested = Array::new(
            TypeTag::Array,
            vec![Array::new(TypeTag::String, vec!["x".into()]).unwrap().into()],
        )
        .unwrap();
        let section = Section::new().with("n", nested);
        let (decoded, _) = decode(&encode(&section, false).unwrap(), false).unwrap();
        assert_eq!(decoded, section);
    }

    #[test]
    fn test_name_too_long() {
        let section = Section::new().with("x".repeat(256), 1u8);
        assert!(matches!(encode(&section, false), Err(ProtocolError::Format(_))));
    }

    #[test]
    fn test_typed_getters() {
        let section = sample();
        assert_eq!(section.get_i64("i64").unwrap(), -5);
        assert_eq!(section.get_str("name").unwrap(), "node");
        let inner = section.get_object("payload_data").unwrap();
        assert_eq!(inner.get_bytes::<32>("top_id").unwrap(), [0xAB; 32]);
        assert!(inner.get_bytes::<16>("top_id").is_err());
        assert!(section.get_u64("missing").is_err());
        assert!(section.get_str("i64").is_err());
    }
}
