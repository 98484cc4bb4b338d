//! Binary codec (C1) — encodes/decodes the struct-shape payload family used
//! on MQTT topics and the bulk binary report endpoint.
//!
//! Grounded on `app/helper/binary_format_encoder.py`: a **shape** is either
//! a struct-shape string (`b B h H i I q Q f d ?`, network byte order), an
//! array of a struct shape (`[s]`), a UTF-8 string (`[str]`), or a
//! heterogeneous named-field record. Arrays and strings are length-prefixed
//! everywhere except at the outermost (top-level) position of a payload,
//! where the length is inferred from the remaining buffer.

use serde_json::Value as Json;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("bad shape: {0}")]
    BadShape(String),
    #[error("truncated payload")]
    TruncatedPayload,
    #[error("integer overflow")]
    Overflow,
}

/// A decoded (or to-be-encoded) value. Multi-field struct shapes decode to
/// `Tuple`; a single-character struct shape decodes to the bare scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    Tuple(Vec<Value>),
    Array(Vec<Value>),
    Record(Vec<(String, Value)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// One or more scalar type codes, packed in order.
    Struct(Vec<u8>),
    Array(Box<Shape>),
    Str,
    Record(Vec<(String, Shape)>),
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Struct(codes) => write!(f, "{}", String::from_utf8_lossy(codes)),
            Shape::Array(inner) => write!(f, "[{inner}]"),
            Shape::Str => write!(f, "[str]"),
            Shape::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, shape)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{name}:{shape}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

const SCALAR_CODES: &[u8] = b"bBhHiIqQfd?";

fn scalar_size(code: u8) -> Option<usize> {
    match code {
        b'b' | b'B' | b'?' => Some(1),
        b'h' | b'H' => Some(2),
        b'i' | b'I' | b'f' => Some(4),
        b'q' | b'Q' | b'd' => Some(8),
        _ => None,
    }
}

fn struct_size(codes: &[u8]) -> usize {
    codes.iter().filter_map(|c| scalar_size(*c)).sum()
}

/// Parse a raw shape string: either a bare struct-shape (`"f"`, `"ffi"`),
/// or a bracketed array/string (`"[f]"`, `"[str]"`).
pub fn parse_shape_str(raw: &str) -> Result<Shape, CodecError> {
    if let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        if inner == "str" {
            return Ok(Shape::Str);
        }
        let codes = parse_struct_codes(inner)?;
        return Ok(Shape::Array(Box::new(Shape::Struct(codes))));
    }
    Ok(Shape::Struct(parse_struct_codes(raw)?))
}

fn parse_struct_codes(raw: &str) -> Result<Vec<u8>, CodecError> {
    if raw.is_empty() {
        return Err(CodecError::BadShape("empty struct shape".into()));
    }
    let mut codes = Vec::with_capacity(raw.len());
    for b in raw.bytes() {
        if !SCALAR_CODES.contains(&b) {
            return Err(CodecError::BadShape(format!(
                "unknown type code '{}'",
                b as char
            )));
        }
        codes.push(b);
    }
    Ok(codes)
}

/// A `MeasurementDescriptor.type` or `CommandInfo.payloadSchema` may arrive
/// either as a bare shape string or as a list of `(name, type)` pairs (a
/// record). Both are valid JSON values coming out of storage.
pub fn shape_from_json(v: &Json) -> Result<Shape, CodecError> {
    match v {
        Json::String(s) => parse_shape_str(s),
        Json::Array(items) => {
            let mut fields = Vec::with_capacity(items.len());
            for item in items {
                let pair = item
                    .as_array()
                    .filter(|a| a.len() == 2)
                    .ok_or_else(|| CodecError::BadShape("record field must be [name, type]".into()))?;
                let name = pair[0]
                    .as_str()
                    .ok_or_else(|| CodecError::BadShape("field name must be a string".into()))?
                    .to_string();
                let shape = shape_from_json(&pair[1])?;
                fields.push((name, shape));
            }
            Ok(Shape::Record(fields))
        }
        other => Err(CodecError::BadShape(format!("unsupported shape value: {other}"))),
    }
}

fn as_i64(v: &Value) -> Result<i64, CodecError> {
    match v {
        Value::Int(n) => Ok(*n),
        Value::UInt(n) => i64::try_from(*n).map_err(|_| CodecError::Overflow),
        Value::Bool(b) => Ok(*b as i64),
        Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        _ => Err(CodecError::BadShape("expected integer".into())),
    }
}

fn as_f64(v: &Value) -> Result<f64, CodecError> {
    match v {
        Value::Float(f) => Ok(*f),
        Value::Int(n) => Ok(*n as f64),
        Value::UInt(n) => Ok(*n as f64),
        _ => Err(CodecError::BadShape("expected float".into())),
    }
}

fn encode_scalar(code: u8, v: &Value, buf: &mut Vec<u8>) -> Result<(), CodecError> {
    match code {
        b'b' => {
            let n: i8 = as_i64(v)?.try_into().map_err(|_| CodecError::Overflow)?;
            buf.push(n as u8);
        }
        b'B' => {
            let n: u8 = as_i64(v)?.try_into().map_err(|_| CodecError::Overflow)?;
            buf.push(n);
        }
        b'h' => {
            let n: i16 = as_i64(v)?.try_into().map_err(|_| CodecError::Overflow)?;
            buf.extend(n.to_be_bytes());
        }
        b'H' => {
            let n: u16 = as_i64(v)?.try_into().map_err(|_| CodecError::Overflow)?;
            buf.extend(n.to_be_bytes());
        }
        b'i' => {
            let n: i32 = as_i64(v)?.try_into().map_err(|_| CodecError::Overflow)?;
            buf.extend(n.to_be_bytes());
        }
        b'I' => {
            let n: u32 = as_i64(v)?.try_into().map_err(|_| CodecError::Overflow)?;
            buf.extend(n.to_be_bytes());
        }
        b'q' => buf.extend(as_i64(v)?.to_be_bytes()),
        b'Q' => {
            let n = match v {
                Value::UInt(n) => *n,
                other => as_i64(other)?.try_into().map_err(|_| CodecError::Overflow)?,
            };
            buf.extend(n.to_be_bytes());
        }
        b'f' => buf.extend((as_f64(v)? as f32).to_be_bytes()),
        b'd' => buf.extend(as_f64(v)?.to_be_bytes()),
        b'?' => {
            let b = match v {
                Value::Bool(b) => *b,
                other => as_i64(other)? != 0,
            };
            buf.push(b as u8);
        }
        _ => return Err(CodecError::BadShape(format!("unknown type code {}", code as char))),
    }
    Ok(())
}

fn decode_scalar(code: u8, bytes: &[u8]) -> Result<Value, CodecError> {
    let size = scalar_size(code).ok_or_else(|| CodecError::BadShape("unknown type code".into()))?;
    if bytes.len() < size {
        return Err(CodecError::TruncatedPayload);
    }
    let v = match code {
        b'b' => Value::Int(bytes[0] as i8 as i64),
        b'B' => Value::UInt(bytes[0] as u64),
        b'h' => Value::Int(i16::from_be_bytes(bytes[0..2].try_into().unwrap()) as i64),
        b'H' => Value::UInt(u16::from_be_bytes(bytes[0..2].try_into().unwrap()) as u64),
        b'i' => Value::Int(i32::from_be_bytes(bytes[0..4].try_into().unwrap()) as i64),
        b'I' => Value::UInt(u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as u64),
        b'q' => Value::Int(i64::from_be_bytes(bytes[0..8].try_into().unwrap())),
        b'Q' => Value::UInt(u64::from_be_bytes(bytes[0..8].try_into().unwrap())),
        b'f' => Value::Float(f32::from_be_bytes(bytes[0..4].try_into().unwrap()) as f64),
        b'd' => Value::Float(f64::from_be_bytes(bytes[0..8].try_into().unwrap())),
        b'?' => Value::Bool(bytes[0] != 0),
        _ => unreachable!(),
    };
    Ok(v)
}

fn encode_struct(codes: &[u8], value: &Value, buf: &mut Vec<u8>) -> Result<(), CodecError> {
    if codes.len() == 1 {
        return encode_scalar(codes[0], value, buf);
    }
    let items = match value {
        Value::Tuple(items) => items,
        _ => return Err(CodecError::BadShape("expected tuple for multi-field struct".into())),
    };
    if items.len() != codes.len() {
        return Err(CodecError::BadShape("field count mismatch".into()));
    }
    for (code, item) in codes.iter().zip(items) {
        encode_scalar(*code, item, buf)?;
    }
    Ok(())
}

fn decode_struct(codes: &[u8], bytes: &[u8]) -> Result<(Value, usize), CodecError> {
    let mut offset = 0;
    let mut values = Vec::with_capacity(codes.len());
    for code in codes {
        let size = scalar_size(*code).ok_or_else(|| CodecError::BadShape("unknown type code".into()))?;
        if bytes.len() < offset + size {
            return Err(CodecError::TruncatedPayload);
        }
        values.push(decode_scalar(*code, &bytes[offset..])?);
        offset += size;
    }
    if values.len() == 1 {
        Ok((values.into_iter().next().unwrap(), offset))
    } else {
        Ok((Value::Tuple(values), offset))
    }
}

fn encode_shape(shape: &Shape, value: &Value, top_level: bool, buf: &mut Vec<u8>) -> Result<(), CodecError> {
    match shape {
        Shape::Struct(codes) => encode_struct(codes, value, buf),
        Shape::Str => {
            let s = match value {
                Value::Str(s) => s,
                _ => return Err(CodecError::BadShape("expected string".into())),
            };
            let bytes = s.as_bytes();
            if !top_level {
                buf.extend((bytes.len() as u32).to_be_bytes());
            }
            buf.extend(bytes);
            Ok(())
        }
        Shape::Array(inner) => {
            let items = match value {
                Value::Array(items) => items,
                _ => return Err(CodecError::BadShape("expected array".into())),
            };
            if !top_level {
                buf.extend((items.len() as u32).to_be_bytes());
            }
            for item in items {
                encode_shape(inner, item, false, buf)?;
            }
            Ok(())
        }
        Shape::Record(fields) => {
            let record = match value {
                Value::Record(r) => r,
                _ => return Err(CodecError::BadShape("expected record".into())),
            };
            for (name, fshape) in fields {
                let v = record
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| CodecError::BadShape(format!("missing field '{name}'")))?;
                encode_shape(fshape, v, false, buf)?;
            }
            Ok(())
        }
    }
}

fn decode_shape(shape: &Shape, bytes: &[u8], top_level: bool) -> Result<(Value, usize), CodecError> {
    match shape {
        Shape::Struct(codes) => decode_struct(codes, bytes),
        Shape::Str => {
            if top_level {
                let s = String::from_utf8(bytes.to_vec())
                    .map_err(|_| CodecError::BadShape("invalid utf-8".into()))?;
                Ok((Value::Str(s), bytes.len()))
            } else {
                if bytes.len() < 4 {
                    return Err(CodecError::TruncatedPayload);
                }
                let len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
                if bytes.len() < 4 + len {
                    return Err(CodecError::TruncatedPayload);
                }
                let s = String::from_utf8(bytes[4..4 + len].to_vec())
                    .map_err(|_| CodecError::BadShape("invalid utf-8".into()))?;
                Ok((Value::Str(s), 4 + len))
            }
        }
        Shape::Array(inner) => {
            let Shape::Struct(codes) = inner.as_ref() else {
                return Err(CodecError::BadShape("array element must be a struct shape".into()));
            };
            let elem_size = struct_size(codes);
            if elem_size == 0 {
                return Err(CodecError::BadShape("zero-width array element".into()));
            }
            if top_level {
                if bytes.len() % elem_size != 0 {
                    return Err(CodecError::TruncatedPayload);
                }
                let count = bytes.len() / elem_size;
                let mut values = Vec::with_capacity(count);
                let mut offset = 0;
                for _ in 0..count {
                    let (v, n) = decode_struct(codes, &bytes[offset..])?;
                    values.push(v);
                    offset += n;
                }
                Ok((Value::Array(values), offset))
            } else {
                if bytes.len() < 4 {
                    return Err(CodecError::TruncatedPayload);
                }
                let count = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
                let mut offset = 4;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    let (v, n) = decode_struct(codes, &bytes[offset..])?;
                    values.push(v);
                    offset += n;
                }
                Ok((Value::Array(values), offset))
            }
        }
        Shape::Record(fields) => {
            let mut offset = 0;
            let mut record = Vec::with_capacity(fields.len());
            for (name, fshape) in fields {
                let (v, n) = decode_shape(fshape, &bytes[offset..], false)?;
                record.push((name.clone(), v));
                offset += n;
            }
            Ok((Value::Record(record), offset))
        }
    }
}

/// Encode `(time, value)` as `double time | fields…`.
pub fn encode(shape: &Shape, time: f64, value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(8 + struct_size_hint(shape));
    buf.extend(time.to_be_bytes());
    encode_shape(shape, value, true, &mut buf)?;
    Ok(buf)
}

fn struct_size_hint(shape: &Shape) -> usize {
    match shape {
        Shape::Struct(codes) => struct_size(codes),
        _ => 0,
    }
}

/// Decode `double time | fields…`. The whole buffer must be consumed by the
/// shape exactly — trailing or missing bytes are `TruncatedPayload`.
pub fn decode(shape: &Shape, bytes: &[u8]) -> Result<(f64, Value), CodecError> {
    if bytes.len() < 8 {
        return Err(CodecError::TruncatedPayload);
    }
    let time = f64::from_be_bytes(bytes[0..8].try_into().unwrap());
    let (value, consumed) = decode_shape(shape, &bytes[8..], true)?;
    if consumed != bytes.len() - 8 {
        return Err(CodecError::TruncatedPayload);
    }
    Ok((time, value))
}

/// Used by C7's payload/response validation: decode succeeds iff the bytes
/// exactly match the struct-shape schema, independent of the timestamp.
pub fn validates_shape(shape: &Shape, bytes: &[u8]) -> bool {
    decode_shape(shape, bytes, true)
        .map(|(_, consumed)| consumed == bytes.len())
        .unwrap_or(false)
}

/// Decode a flat concatenation of scalar field groups, splitting the result
/// back into one value per group. Used by the bulk binary report endpoint,
/// which packs every series of a part into a single combined record per
/// sample rather than one record per series (unlike the MQTT wire format).
pub fn decode_concatenated(groups: &[Vec<u8>], bytes: &[u8]) -> Result<(Vec<Value>, usize), CodecError> {
    let mut offset = 0;
    let mut values = Vec::with_capacity(groups.len());
    for codes in groups {
        let (v, n) = decode_struct(codes, &bytes[offset..])?;
        values.push(v);
        offset += n;
    }
    Ok((values, offset))
}

pub fn concatenated_size(groups: &[Vec<u8>]) -> usize {
    groups.iter().map(|codes| struct_size(codes)).sum()
}

/// A scalar numeric/boolean value reduced to `(min, avg, max)` for the
/// aggregation pipeline (§4.6). Non-numeric values (arrays, strings, or
/// compound records) yield `None`.
pub fn numeric_scalar(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::UInt(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_single_scalar() {
        let shape = parse_shape_str("f").unwrap();
        let bytes = encode(&shape, 1700000000.0, &Value::Float(42.0)).unwrap();
        let (t, v) = decode(&shape, &bytes).unwrap();
        assert_eq!(t, 1700000000.0);
        assert_eq!(v, Value::Float(42.0));
    }

    #[test]
    fn round_trip_multi_field_struct() {
        let shape = parse_shape_str("fi?").unwrap();
        let value = Value::Tuple(vec![Value::Float(1.5), Value::Int(-7), Value::Bool(true)]);
        let bytes = encode(&shape, 1.0, &value).unwrap();
        let (_, decoded) = decode(&shape, &bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn round_trip_top_level_array_implicit_length() {
        let shape = parse_shape_str("[f]").unwrap();
        let value = Value::Array(vec![Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)]);
        let bytes = encode(&shape, 0.0, &value).unwrap();
        // no 4-byte length prefix at top level: 8 (time) + 3*4 (f32) bytes
        assert_eq!(bytes.len(), 8 + 12);
        let (_, decoded) = decode(&shape, &bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn round_trip_nested_array_is_length_prefixed() {
        let shape = Shape::Record(vec![("samples".to_string(), parse_shape_str("[h]").unwrap())]);
        let value = Value::Record(vec![(
            "samples".to_string(),
            Value::Array(vec![Value::Int(1), Value::Int(2)]),
        )]);
        let bytes = encode(&shape, 0.0, &value).unwrap();
        // 8 (time) + 4 (length prefix) + 2*2 (i16)
        assert_eq!(bytes.len(), 8 + 4 + 4);
        let (_, decoded) = decode(&shape, &bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn round_trip_string_top_level_and_nested() {
        let top = parse_shape_str("[str]").unwrap();
        let bytes = encode(&top, 0.0, &Value::Str("hello".into())).unwrap();
        assert_eq!(bytes.len(), 8 + 5);
        let (_, v) = decode(&top, &bytes).unwrap();
        assert_eq!(v, Value::Str("hello".into()));

        let nested = Shape::Record(vec![("name".to_string(), Shape::Str)]);
        let value = Value::Record(vec![("name".to_string(), Value::Str("hi".into()))]);
        let bytes = encode(&nested, 0.0, &value).unwrap();
        assert_eq!(bytes.len(), 8 + 4 + 2);
        let (_, decoded) = decode(&nested, &bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let shape = parse_shape_str("d").unwrap();
        let err = decode(&shape, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedPayload));
    }

    #[test]
    fn overflow_is_rejected() {
        let shape = parse_shape_str("b").unwrap();
        let err = encode(&shape, 0.0, &Value::Int(1000)).unwrap_err();
        assert!(matches!(err, CodecError::Overflow));
    }

    #[test]
    fn bad_shape_string_is_rejected() {
        let err = parse_shape_str("z").unwrap_err();
        assert!(matches!(err, CodecError::BadShape(_)));
    }

    #[test]
    fn concatenated_groups_split_back_per_descriptor() {
        let groups = vec![vec![b'f'], vec![b'b', b'?']];
        let mut bytes = Vec::new();
        bytes.extend(encode_scalar_for_test(b'f', &Value::Float(2.0)));
        bytes.extend(encode_scalar_for_test(b'b', &Value::Int(-3)));
        bytes.extend(encode_scalar_for_test(b'?', &Value::Bool(true)));
        let (values, consumed) = decode_concatenated(&groups, &bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(values[0], Value::Float(2.0));
        assert_eq!(values[1], Value::Tuple(vec![Value::Int(-3), Value::Bool(true)]));
    }

    fn encode_scalar_for_test(code: u8, v: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_scalar(code, v, &mut buf).unwrap();
        buf
    }

    #[test]
    fn record_shape_from_json_pairs() {
        let json = serde_json::json!([["alt", "f"], ["label", "[str]"]]);
        let shape = shape_from_json(&json).unwrap();
        match shape {
            Shape::Record(fields) => assert_eq!(fields.len(), 2),
            _ => panic!("expected record"),
        }
    }
}
