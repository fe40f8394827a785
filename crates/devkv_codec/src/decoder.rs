//! Canonical CBOR reader.

use crate::encoder::key_order;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Largest element count accepted for arrays and maps.
const MAX_ELEMENTS: u64 = 1 << 24;
/// Largest byte or text length accepted.
const MAX_LENGTH: u64 = 1 << 28;
/// Deepest nesting of arrays and maps accepted.
const MAX_DEPTH: usize = 64;

/// Decodes exactly one canonical CBOR item from `bytes`.
///
/// Anything [`to_canonical_cbor`](crate::to_canonical_cbor) would not have
/// produced is rejected: longer-than-needed heads, indefinite lengths,
/// unsorted or duplicate map keys, tags, half floats and trailing bytes.
///
/// # Errors
///
/// Returns the first violation found.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut reader = Reader { data: bytes, pos: 0 };
    let value = reader.item(0)?;
    if reader.pos != bytes.len() {
        return Err(CodecError::invalid_structure(format!(
            "{} trailing bytes",
            bytes.len() - reader.pos
        )));
    }
    Ok(value)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(CodecError::UnexpectedEof)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads the argument that follows an initial byte with `info` in its
    /// low five bits.
    fn argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, min) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.take_array::<1>()?[0]), 24),
            25 => (u64::from(u16::from_be_bytes(self.take_array()?)), 1 << 8),
            26 => (u64::from(u32::from_be_bytes(self.take_array()?)), 1 << 16),
            27 => (u64::from_be_bytes(self.take_array()?), 1 << 32),
            31 => return Err(CodecError::Unsupported("indefinite length".into())),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if value < min {
            return Err(CodecError::NonCanonical("argument has a longer head than needed"));
        }
        Ok(value)
    }

    fn length(&mut self, info: u8, limit: u64) -> CodecResult<usize> {
        let claimed = self.argument(info)?;
        if claimed > limit {
            return Err(CodecError::TooLong { claimed, limit });
        }
        usize::try_from(claimed).map_err(|_| CodecError::IntegerOverflow)
    }

    fn item(&mut self, depth: usize) -> CodecResult<Value> {
        if depth > MAX_DEPTH {
            return Err(CodecError::TooDeep(MAX_DEPTH));
        }
        let initial = self.take_array::<1>()?[0];
        let info = initial & 0x1f;
        match initial >> 5 {
            0 => {
                let n = self.argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.argument(info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => {
                let len = self.length(info, MAX_LENGTH)?;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            3 => {
                let len = self.length(info, MAX_LENGTH)?;
                let text = std::str::from_utf8(self.take(len)?).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_owned()))
            }
            4 => {
                let len = self.length(info, MAX_ELEMENTS)?;
                // Each element takes at least one byte.
                let mut items = Vec::with_capacity(len.min(self.data.len() - self.pos));
                for _ in 0..len {
                    items.push(self.item(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            5 => self.map(info, depth),
            6 => Err(CodecError::Unsupported("tagged item".into())),
            _ => self.simple(info),
        }
    }

    fn map(&mut self, info: u8, depth: usize) -> CodecResult<Value> {
        let len = self.length(info, MAX_ELEMENTS)?;
        let mut pairs = Vec::with_capacity(len.min(self.data.len() - self.pos));
        let mut previous: Option<&'a [u8]> = None;
        for _ in 0..len {
            let start = self.pos;
            let key = self.item(depth + 1)?;
            let encoded = &self.data[start..self.pos];
            if let Some(previous) = previous {
                if key_order(previous, encoded) != Ordering::Less {
                    return Err(CodecError::NonCanonical("map keys out of order or repeated"));
                }
            }
            previous = Some(encoded);
            pairs.push((key, self.item(depth + 1)?));
        }
        Ok(Value::Map(pairs))
    }

    fn simple(&mut self, info: u8) -> CodecResult<Value> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            25 => Err(CodecError::Unsupported("half-precision float".into())),
            26 => Ok(Value::Float32(f32::from_bits(u32::from_be_bytes(self.take_array()?)))),
            27 => Ok(Value::Float64(f64::from_bits(u64::from_be_bytes(self.take_array()?)))),
            31 => Err(CodecError::invalid_structure("break outside an indefinite item")),
            other => Err(CodecError::Unsupported(format!("simple value {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_scalars() {
        assert_eq!(from_cbor(&[0xf6]).unwrap(), Value::Null);
        assert_eq!(from_cbor(&[0xf5]).unwrap(), Value::Bool(true));
        assert_eq!(from_cbor(&[0x18, 255]).unwrap(), Value::Integer(255));
        assert_eq!(from_cbor(&[0x38, 99]).unwrap(), Value::Integer(-100));
        assert_eq!(
            from_cbor(&[0xfa, 0x3f, 0x80, 0x00, 0x00]).unwrap(),
            Value::Float32(1.0)
        );
    }

    #[test]
    fn rejects_long_heads() {
        for bytes in [&[0x18, 23][..], &[0x19, 0x00, 0xff], &[0x1a, 0, 0, 0xff, 0xff]] {
            assert!(matches!(from_cbor(bytes), Err(CodecError::NonCanonical(_))), "{bytes:?}");
        }
    }

    #[test]
    fn rejects_features_the_writer_never_uses() {
        let cases: [&[u8]; 4] = [
            &[0x5f, 0x41, b'a', 0xff],
            &[0xc1, 0x00],
            &[0xf9, 0x00, 0x00],
            &[0xf8, 0x20],
        ];
        for bytes in cases {
            assert!(matches!(from_cbor(bytes), Err(CodecError::Unsupported(_))), "{bytes:?}");
        }
    }

    #[test]
    fn rejects_unsorted_and_duplicate_keys() {
        let unsorted = [0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02];
        let duplicate = [0xa2, 0x61, b'a', 0x01, 0x61, b'a', 0x02];
        assert!(matches!(from_cbor(&unsorted), Err(CodecError::NonCanonical(_))));
        assert!(matches!(from_cbor(&duplicate), Err(CodecError::NonCanonical(_))));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(from_cbor(&[]), Err(CodecError::UnexpectedEof)));
        assert!(matches!(from_cbor(&[0x43, 1]), Err(CodecError::UnexpectedEof)));
        assert!(matches!(from_cbor(&[0x62, 0xff, 0xfe]), Err(CodecError::InvalidUtf8)));
        assert!(matches!(from_cbor(&[0x01, 0x02]), Err(CodecError::InvalidStructure { .. })));
        assert!(matches!(
            from_cbor(&[0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]),
            Err(CodecError::IntegerOverflow)
        ));
        assert!(matches!(
            from_cbor(&[0x5b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]),
            Err(CodecError::TooLong { .. })
        ));
    }

    #[test]
    fn rejects_deep_nesting() {
        let bytes = vec![0x81; MAX_DEPTH + 2];
        assert!(matches!(from_cbor(&bytes), Err(CodecError::TooDeep(_))));
    }
}
