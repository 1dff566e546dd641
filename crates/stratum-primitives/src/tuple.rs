use crate::{error::CodecError, value::Value};

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_DOUBLE: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_ARRAY: u8 = 0x06;

/// Maximum packed key size accepted by a subspace, per §4.1.
pub const MAX_KEY_BYTES: usize = 10 * 1024;

///
/// pack / unpack
///
/// Order-preserving tuple codec: `pack` is total (it never fails — every
/// `Value` has a canonical byte form), `unpack` fails with
/// `CorruptedTuple` on malformed input. Lexicographic byte order over the
/// packed form equals logical order over the nested `Value` the way §4.1
/// requires: variant tag first (so cross-type comparisons are stable),
/// then a type-specific order-preserving payload.
///

#[must_use]
pub fn pack(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        pack_value(v, &mut out);
    }
    out
}

pub fn unpack(bytes: &[u8]) -> Result<Vec<Value>, CodecError> {
    let mut pos = 0;
    let mut out = Vec::new();
    while pos < bytes.len() {
        out.push(unpack_value(bytes, &mut pos)?);
    }
    Ok(out)
}

fn pack_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&order_preserving_i64(*i).to_be_bytes());
        }
        Value::Double(d) => {
            out.push(TAG_DOUBLE);
            out.extend_from_slice(&order_preserving_f64(*d).to_be_bytes());
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            encode_escaped(s.as_bytes(), out);
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            encode_escaped(b, out);
        }
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            for item in items {
                pack_value(item, out);
            }
            // nested tuples terminate with the same 0x00 sentinel as strings,
            // but since elements are themselves tag-prefixed (tags never
            // collide with the 0xFF escape byte) the plain terminator is
            // unambiguous here too.
            out.push(TAG_NULL);
            out.push(TAG_NULL);
        }
    }
}

fn unpack_value(bytes: &[u8], pos: &mut usize) -> Result<Value, CodecError> {
    let tag = bytes[*pos];
    *pos += 1;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_BOOL => {
            let b = read_byte(bytes, pos)?;
            Ok(Value::Bool(b != 0))
        }
        TAG_INT => {
            let raw = read_u64(bytes, pos)?;
            Ok(Value::Int(order_preserving_i64_decode(raw)))
        }
        TAG_DOUBLE => {
            let raw = read_u64(bytes, pos)?;
            Ok(Value::Double(order_preserving_f64_decode(raw)))
        }
        TAG_STRING => {
            let raw = decode_escaped(bytes, pos)?;
            String::from_utf8(raw)
                .map(Value::String)
                .map_err(|e| CodecError::corrupted_tuple(format!("invalid utf8 in string: {e}")))
        }
        TAG_BYTES => decode_escaped(bytes, pos).map(Value::Bytes),
        TAG_ARRAY => {
            let mut items = Vec::new();
            loop {
                if *pos + 1 < bytes.len() && bytes[*pos] == TAG_NULL && bytes[*pos + 1] == TAG_NULL
                {
                    *pos += 2;
                    break;
                }
                if *pos >= bytes.len() {
                    return Err(CodecError::corrupted_tuple("unterminated nested tuple"));
                }
                items.push(unpack_value(bytes, pos)?);
            }
            Ok(Value::Array(items))
        }
        other => Err(CodecError::corrupted_tuple(format!(
            "unknown tuple tag byte: {other:#04x}"
        ))),
    }
}

fn read_byte(bytes: &[u8], pos: &mut usize) -> Result<u8, CodecError> {
    let b = *bytes
        .get(*pos)
        .ok_or_else(|| CodecError::corrupted_tuple("truncated tuple: expected one byte"))?;
    *pos += 1;
    Ok(b)
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Result<u64, CodecError> {
    let slice = bytes
        .get(*pos..*pos + 8)
        .ok_or_else(|| CodecError::corrupted_tuple("truncated tuple: expected 8-byte payload"))?;
    *pos += 8;
    Ok(u64::from_be_bytes(slice.try_into().unwrap()))
}

const fn order_preserving_i64(v: i64) -> u64 {
    (v as u64) ^ (1u64 << 63)
}

const fn order_preserving_i64_decode(raw: u64) -> i64 {
    (raw ^ (1u64 << 63)) as i64
}

fn order_preserving_f64(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & (1u64 << 63) != 0 {
        !bits
    } else {
        bits | (1u64 << 63)
    }
}

fn order_preserving_f64_decode(raw: u64) -> f64 {
    let bits = if raw & (1u64 << 63) != 0 {
        raw & !(1u64 << 63)
    } else {
        !raw
    };
    f64::from_bits(bits)
}

/// Escape `0x00` as `0x00 0xFF` and terminate with a bare `0x00`, the same
/// scheme FDB's tuple layer uses to keep variable-length strings/bytes both
/// order-preserving and self-delimiting.
fn encode_escaped(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        if b == 0x00 {
            out.push(0x00);
            out.push(0xFF);
        } else {
            out.push(b);
        }
    }
    out.push(0x00);
}

fn decode_escaped(bytes: &[u8], pos: &mut usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    loop {
        let b = *bytes
            .get(*pos)
            .ok_or_else(|| CodecError::corrupted_tuple("unterminated string/bytes element"))?;
        if b == 0x00 {
            if bytes.get(*pos + 1) == Some(&0xFF) {
                out.push(0x00);
                *pos += 2;
            } else {
                *pos += 1;
                return Ok(out);
            }
        } else {
            out.push(b);
            *pos += 1;
        }
    }
}
