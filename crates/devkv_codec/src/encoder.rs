//! Canonical CBOR writer.

use crate::error::CodecResult;
use crate::value::Value;
use std::cmp::Ordering;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;

/// Encodes `value` as canonical CBOR.
///
/// Integers and lengths take their shortest head, floats keep their declared
/// width and raw bits, map entries are ordered by encoded key (shorter
/// first, then bytewise), and nothing uses indefinite length. Equal values
/// therefore always produce equal bytes.
///
/// # Errors
///
/// Encoding itself cannot fail today; the `Result` leaves room for limits.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    Ok(encoded(value))
}

pub(crate) fn encoded(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(0xf6),
        Value::Bool(false) => out.push(0xf4),
        Value::Bool(true) => out.push(0xf5),
        Value::Integer(n) => match u64::try_from(*n) {
            Ok(unsigned) => write_head(out, MAJOR_UNSIGNED, unsigned),
            // -1 - n is non-negative and fits for every negative i64.
            Err(_) => write_head(out, MAJOR_NEGATIVE, (-1 - *n).unsigned_abs()),
        },
        Value::Float32(f) => {
            out.push(0xfa);
            out.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Value::Float64(f) => {
            out.push(0xfb);
            out.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Value::Bytes(bytes) => {
            write_head(out, MAJOR_BYTES, len_arg(bytes.len()));
            out.extend_from_slice(bytes);
        }
        Value::Text(text) => {
            write_head(out, MAJOR_TEXT, len_arg(text.len()));
            out.extend_from_slice(text.as_bytes());
        }
        Value::Array(items) => {
            write_head(out, MAJOR_ARRAY, len_arg(items.len()));
            for item in items {
                write_value(out, item);
            }
        }
        Value::Map(pairs) => {
            let mut entries: Vec<(Vec<u8>, &Value)> = pairs
                .iter()
                .map(|(key, value)| (encoded(key), value))
                .collect();
            entries.sort_by(|a, b| key_order(&a.0, &b.0));

            write_head(out, MAJOR_MAP, len_arg(entries.len()));
            for (key, value) in entries {
                out.extend_from_slice(&key);
                write_value(out, value);
            }
        }
    }
}

/// Writes the initial byte and the shortest argument for `arg`.
fn write_head(out: &mut Vec<u8>, major: u8, arg: u64) {
    let major = major << 5;
    if let Ok(small) = u8::try_from(arg) {
        if small < 24 {
            out.push(major | small);
        } else {
            out.extend_from_slice(&[major | 24, small]);
        }
    } else if let Ok(arg) = u16::try_from(arg) {
        out.push(major | 25);
        out.extend_from_slice(&arg.to_be_bytes());
    } else if let Ok(arg) = u32::try_from(arg) {
        out.push(major | 26);
        out.extend_from_slice(&arg.to_be_bytes());
    } else {
        out.push(major | 27);
        out.extend_from_slice(&arg.to_be_bytes());
    }
}

fn len_arg(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

/// Canonical order of encoded map keys.
pub(crate) fn key_order(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
