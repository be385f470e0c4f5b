//! JCE positional tag/value serialization.
//!
//! Every value is preceded by a head byte holding the field tag in the high
//! nibble and the value type in the low nibble; tags of 15 and above spill
//! into a second byte. Integers use the narrowest width that holds them and
//! zero is encoded without a body. Structs are written in ascending tag order.
//!
//! The directory protocol wraps its payloads in a request envelope; see
//! [`encode_wrapper`] and [`decode_wrapper`].

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use thiserror::Error;

/// Deepest container nesting accepted by the decoder
pub const MAX_DEPTH: usize = 32;

/// JCE codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JceError {
    /// Input ended inside a value
    #[error("truncated input at offset {0}")]
    Truncated(usize),

    /// Unknown value type in a head byte
    #[error("unknown type {0}")]
    Type(u8),

    /// Value type is not valid at this position
    #[error("unexpected type {found} for tag {tag}")]
    Unexpected {
        /// Field tag
        tag: u8,
        /// Type found
        found: u8,
    },

    /// Negative or oversized length field
    #[error("invalid length {0}")]
    Length(i64),

    /// Containers nested beyond [`MAX_DEPTH`]
    #[error("nesting deeper than {}", MAX_DEPTH)]
    DepthExceeded,

    /// Required field absent or of the wrong kind
    #[error("missing field {0}")]
    Missing(u8),

    /// Request envelope has no payload
    #[error("empty envelope")]
    EmptyEnvelope,

    /// String value is not valid UTF-8
    #[error("invalid utf-8 in string at offset {0}")]
    Utf8(usize),
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadType {
    Int1 = 0,
    Int2 = 1,
    Int4 = 2,
    Int8 = 3,
    Float = 4,
    Double = 5,
    String1 = 6,
    String4 = 7,
    Map = 8,
    List = 9,
    StructBegin = 10,
    StructEnd = 11,
    Zero = 12,
    SimpleList = 13,
}

impl TryFrom<u8> for HeadType {
    type Error = JceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HeadType::Int1),
            1 => Ok(HeadType::Int2),
            2 => Ok(HeadType::Int4),
            3 => Ok(HeadType::Int8),
            4 => Ok(HeadType::Float),
            5 => Ok(HeadType::Double),
            6 => Ok(HeadType::String1),
            7 => Ok(HeadType::String4),
            8 => Ok(HeadType::Map),
            9 => Ok(HeadType::List),
            10 => Ok(HeadType::StructBegin),
            11 => Ok(HeadType::StructEnd),
            12 => Ok(HeadType::Zero),
            13 => Ok(HeadType::SimpleList),
            _ => Err(JceError::Type(value)),
        }
    }
}

/// Decoded JCE value
#[derive(Debug, Clone, PartialEq)]
pub enum JceValue {
    /// Any integer width
    Int(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Text
    String(String),
    /// Raw byte list
    Bytes(Bytes),
    /// Homogeneous list
    List(Vec<JceValue>),
    /// Key/value pairs in wire order
    Map(Vec<(JceValue, JceValue)>),
    /// Nested struct
    Struct(JceStruct),
}

impl JceValue {
    /// Integer payload
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            JceValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            JceValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Byte list payload
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            JceValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// List payload
    pub fn as_list(&self) -> Option<&[JceValue]> {
        match self {
            JceValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Map payload
    pub fn as_map(&self) -> Option<&[(JceValue, JceValue)]> {
        match self {
            JceValue::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Struct payload
    pub fn as_struct(&self) -> Option<&JceStruct> {
        match self {
            JceValue::Struct(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for JceValue {
    fn from(v: i64) -> Self {
        JceValue::Int(v)
    }
}

impl From<i32> for JceValue {
    fn from(v: i32) -> Self {
        JceValue::Int(v.into())
    }
}

impl From<u32> for JceValue {
    fn from(v: u32) -> Self {
        JceValue::Int(v.into())
    }
}

impl From<u16> for JceValue {
    fn from(v: u16) -> Self {
        JceValue::Int(v.into())
    }
}

impl From<&str> for JceValue {
    fn from(v: &str) -> Self {
        JceValue::String(v.to_string())
    }
}

impl From<String> for JceValue {
    fn from(v: String) -> Self {
        JceValue::String(v)
    }
}

impl From<Bytes> for JceValue {
    fn from(v: Bytes) -> Self {
        JceValue::Bytes(v)
    }
}

impl From<JceStruct> for JceValue {
    fn from(v: JceStruct) -> Self {
        JceValue::Struct(v)
    }
}

impl From<Vec<JceValue>> for JceValue {
    fn from(v: Vec<JceValue>) -> Self {
        JceValue::List(v)
    }
}

/// Tagged fields of a struct
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JceStruct {
    fields: BTreeMap<u8, JceValue>,
}

impl JceStruct {
    /// Create an empty struct
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a struct from a positional field list: entry `i` gets tag `i`,
    /// `None` entries leave their tag unset.
    pub fn from_positional<I, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = Option<V>>,
        V: Into<JceValue>,
    {
        let fields = fields
            .into_iter()
            .enumerate()
            .filter_map(|(tag, value)| Some((tag as u8, value?.into())))
            .collect();
        Self { fields }
    }

    /// Set a field
    pub fn with(mut self, tag: u8, value: impl Into<JceValue>) -> Self {
        self.fields.insert(tag, value.into());
        self
    }

    /// Set a field in place
    pub fn insert(&mut self, tag: u8, value: impl Into<JceValue>) {
        self.fields.insert(tag, value.into());
    }

    /// Get a field
    pub fn get(&self, tag: u8) -> Option<&JceValue> {
        self.fields.get(&tag)
    }

    /// Take a field out of the struct
    pub fn remove(&mut self, tag: u8) -> Option<JceValue> {
        self.fields.remove(&tag)
    }

    /// Number of fields present
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are present
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in ascending tag order
    pub fn iter(&self) -> impl Iterator<Item = (u8, &JceValue)> {
        self.fields.iter().map(|(tag, value)| (*tag, value))
    }
}

/// Serialize the fields of a struct at top level
pub fn encode_struct(value: &JceStruct) -> Bytes {
    let mut writer = JceWriter::default();
    writer.write_fields(value);
    writer.buf.freeze()
}

/// Parse a top-level field sequence
pub fn decode_struct(buf: &[u8]) -> Result<JceStruct, JceError> {
    JceReader::new(buf).read_fields(0, false)
}

/// Request envelope header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperMeta {
    /// Envelope version
    pub version: i16,
    /// Packet type
    pub packet_type: u8,
    /// Message type
    pub message_type: i32,
    /// Request id
    pub request_id: i32,
    /// Servant name
    pub service: String,
    /// Function name
    pub method: String,
    /// Server-side timeout
    pub timeout: i32,
}

impl WrapperMeta {
    /// Version 3 envelope addressed to `service`/`method`
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            version: 3,
            packet_type: 0,
            message_type: 0,
            request_id: 0,
            service: service.into(),
            method: method.into(),
            timeout: 0,
        }
    }
}

/// Wrap named structs in a version 3 request envelope.
///
/// Each struct is written at tag 0 of its own buffer and stored in a map at
/// tag 7 of the envelope under its name.
pub fn encode_wrapper(payloads: &[(&str, &JceStruct)], meta: &WrapperMeta) -> Bytes {
    let map = payloads
        .iter()
        .map(|(name, body)| {
            let nested = JceStruct::new().with(0, (*body).clone());
            (JceValue::from(*name), JceValue::Bytes(encode_struct(&nested)))
        })
        .collect();
    let buffer = encode_struct(&JceStruct::new().with(0, JceValue::Map(map)));

    let envelope = JceStruct::new()
        .with(1, i64::from(meta.version))
        .with(2, i64::from(meta.packet_type))
        .with(3, meta.message_type)
        .with(4, meta.request_id)
        .with(5, meta.service.as_str())
        .with(6, meta.method.as_str())
        .with(7, buffer)
        .with(8, meta.timeout)
        .with(9, JceValue::Map(Vec::new()))
        .with(10, JceValue::Map(Vec::new()));

    encode_struct(&envelope)
}

/// Unwrap a request envelope and return the first payload struct.
///
/// Accepts version 3 envelopes (`name -> bytes`) and version 2 envelopes
/// (`name -> type -> bytes`).
pub fn decode_wrapper(buf: &[u8]) -> Result<JceStruct, JceError> {
    let mut envelope = decode_struct(buf)?;
    let buffer = match envelope.remove(7) {
        Some(JceValue::Bytes(b)) => b,
        _ => return Err(JceError::Missing(7)),
    };

    let mut body = decode_struct(&buffer)?;
    let pairs = match body.remove(0) {
        Some(JceValue::Map(pairs)) => pairs,
        _ => return Err(JceError::Missing(0)),
    };

    let (_, value) = pairs.into_iter().next().ok_or(JceError::EmptyEnvelope)?;
    let nested = match value {
        JceValue::Bytes(b) => b,
        JceValue::Map(inner) => match inner.into_iter().next() {
            Some((_, JceValue::Bytes(b))) => b,
            _ => return Err(JceError::EmptyEnvelope),
        },
        _ => return Err(JceError::Missing(0)),
    };

    match decode_struct(&nested)?.remove(0) {
        Some(JceValue::Struct(s)) => Ok(s),
        _ => Err(JceError::Missing(0)),
    }
}

#[derive(Default)]
struct JceWriter {
    buf: BytesMut,
}

impl JceWriter {
    fn write_head(&mut self, tag: u8, ty: HeadType) {
        if tag < 15 {
            self.buf.put_u8((tag << 4) | ty as u8);
        } else {
            self.buf.put_u8(0xF0 | ty as u8);
            self.buf.put_u8(tag);
        }
    }

    fn write_int(&mut self, tag: u8, v: i64) {
        if v == 0 {
            self.write_head(tag, HeadType::Zero);
        } else if let Ok(v) = i8::try_from(v) {
            self.write_head(tag, HeadType::Int1);
            self.buf.put_i8(v);
        } else if let Ok(v) = i16::try_from(v) {
            self.write_head(tag, HeadType::Int2);
            self.buf.put_i16(v);
        } else if let Ok(v) = i32::try_from(v) {
            self.write_head(tag, HeadType::Int4);
            self.buf.put_i32(v);
        } else {
            self.write_head(tag, HeadType::Int8);
            self.buf.put_i64(v);
        }
    }

    fn write_value(&mut self, tag: u8, value: &JceValue) {
        match value {
            JceValue::Int(v) => self.write_int(tag, *v),
            JceValue::Float(v) => {
                self.write_head(tag, HeadType::Float);
                self.buf.put_f32(*v);
            }
            JceValue::Double(v) => {
                self.write_head(tag, HeadType::Double);
                self.buf.put_f64(*v);
            }
            JceValue::String(s) => {
                if let Ok(len) = u8::try_from(s.len()) {
                    self.write_head(tag, HeadType::String1);
                    self.buf.put_u8(len);
                } else {
                    self.write_head(tag, HeadType::String4);
                    self.buf.put_u32(s.len() as u32);
                }
                self.buf.put_slice(s.as_bytes());
            }
            JceValue::Bytes(b) => {
                self.write_head(tag, HeadType::SimpleList);
                self.write_head(0, HeadType::Int1);
                self.write_int(0, b.len() as i64);
                self.buf.put_slice(b);
            }
            JceValue::List(items) => {
                self.write_head(tag, HeadType::List);
                self.write_int(0, items.len() as i64);
                for item in items {
                    self.write_value(0, item);
                }
            }
            JceValue::Map(pairs) => {
                self.write_head(tag, HeadType::Map);
                self.write_int(0, pairs.len() as i64);
                for (k, v) in pairs {
                    self.write_value(0, k);
                    self.write_value(1, v);
                }
            }
            JceValue::Struct(s) => {
                self.write_head(tag, HeadType::StructBegin);
                self.write_fields(s);
                self.write_head(0, HeadType::StructEnd);
            }
        }
    }

    fn write_fields(&mut self, s: &JceStruct) {
        for (tag, value) in s.iter() {
            self.write_value(tag, value);
        }
    }
}

struct JceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> JceReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], JceError> {
        if self.remaining() < n {
            return Err(JceError::Truncated(self.pos));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], JceError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn take_string(&mut self, len: usize) -> Result<String, JceError> {
        let start = self.pos;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| JceError::Utf8(start))
    }

    fn read_head(&mut self) -> Result<(u8, HeadType), JceError> {
        let [b] = self.take_array::<1>()?;
        let ty = HeadType::try_from(b & 0x0F)?;
        let mut tag = b >> 4;
        if tag == 15 {
            [tag] = self.take_array::<1>()?;
        }
        Ok((tag, ty))
    }

    fn read_length(&mut self, depth: usize) -> Result<usize, JceError> {
        let (tag, ty) = self.read_head()?;
        match self.read_value(tag, ty, depth)? {
            // every element needs at least one head byte
            JceValue::Int(n) if n >= 0 && n as u64 <= self.remaining() as u64 => Ok(n as usize),
            JceValue::Int(n) => Err(JceError::Length(n)),
            _ => Err(JceError::Unexpected {
                tag,
                found: ty as u8,
            }),
        }
    }

    fn read_value(&mut self, tag: u8, ty: HeadType, depth: usize) -> Result<JceValue, JceError> {
        let value = match ty {
            HeadType::Zero => JceValue::Int(0),
            HeadType::Int1 => JceValue::Int(i8::from_be_bytes(self.take_array()?).into()),
            HeadType::Int2 => JceValue::Int(i16::from_be_bytes(self.take_array()?).into()),
            HeadType::Int4 => JceValue::Int(i32::from_be_bytes(self.take_array()?).into()),
            HeadType::Int8 => JceValue::Int(i64::from_be_bytes(self.take_array()?)),
            HeadType::Float => JceValue::Float(f32::from_be_bytes(self.take_array()?)),
            HeadType::Double => JceValue::Double(f64::from_be_bytes(self.take_array()?)),
            HeadType::String1 => {
                let [len] = self.take_array::<1>()?;
                JceValue::String(self.take_string(len as usize)?)
            }
            HeadType::String4 => {
                let len = u32::from_be_bytes(self.take_array()?) as usize;
                JceValue::String(self.take_string(len)?)
            }
            HeadType::SimpleList => {
                let (_, elem) = self.read_head()?;
                if elem != HeadType::Int1 {
                    return Err(JceError::Unexpected {
                        tag,
                        found: elem as u8,
                    });
                }
                let len = self.read_length(depth)?;
                JceValue::Bytes(Bytes::copy_from_slice(self.take(len)?))
            }
            HeadType::List => {
                let depth = descend(depth)?;
                let len = self.read_length(depth)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    let (item_tag, item_ty) = self.read_head()?;
                    items.push(self.read_value(item_tag, item_ty, depth)?);
                }
                JceValue::List(items)
            }
            HeadType::Map => {
                let depth = descend(depth)?;
                let len = self.read_length(depth)?;
                let mut pairs = Vec::with_capacity(len);
                for _ in 0..len {
                    let (k_tag, k_ty) = self.read_head()?;
                    let key = self.read_value(k_tag, k_ty, depth)?;
                    let (v_tag, v_ty) = self.read_head()?;
                    let value = self.read_value(v_tag, v_ty, depth)?;
                    pairs.push((key, value));
                }
                JceValue::Map(pairs)
            }
            HeadType::StructBegin => JceValue::Struct(self.read_fields(descend(depth)?, true)?),
            HeadType::StructEnd => {
                return Err(JceError::Unexpected {
                    tag,
                    found: ty as u8,
                })
            }
        };
        Ok(value)
    }

    fn read_fields(&mut self, depth: usize, nested: bool) -> Result<JceStruct, JceError> {
        let mut out = JceStruct::new();
        loop {
            if self.remaining() == 0 {
                if nested {
                    return Err(JceError::Truncated(self.pos));
                }
                return Ok(out);
            }
            let (tag, ty) = self.read_head()?;
            if ty == HeadType::StructEnd && nested {
                return Ok(out);
            }
            let value = self.read_value(tag, ty, depth)?;
            out.fields.insert(tag, value);
        }
    }
}

fn descend(depth: usize) -> Result<usize, JceError> {
    if depth >= MAX_DEPTH {
        return Err(JceError::DepthExceeded);
    }
    Ok(depth + 1)
}
