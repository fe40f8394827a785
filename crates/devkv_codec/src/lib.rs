//! # DevKV Codec
//!
//! Canonical CBOR encoding and the typed value model for DevKV.
//!
//! Every byte DevKV persists or sends to a peer goes through this crate,
//! so encoding is deterministic:
//!
//! - map entries ordered by encoded key, shorter keys first
//! - integer and length heads as short as possible
//! - floats written at their declared width with their exact bits
//! - definite lengths only, UTF-8 text only
//!
//! The decoder refuses any input that breaks one of these rules, so a decoded
//! value re-encodes to the bytes it came from.
//!
//! ## Usage
//!
//! ```
//! use devkv_codec::{Decode, Encode, TypedValue};
//!
//! let value = TypedValue::Double(2.5);
//! let bytes = value.encode().unwrap();
//! assert_eq!(TypedValue::decode(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod typed;
mod value;

pub use decoder::from_cbor;
pub use encoder::to_canonical_cbor;
pub use error::{CodecError, CodecResult};
pub use typed::{TypedValue, ValueType};
pub use value::Value;

/// Produces the canonical CBOR form of a value.
pub trait Encode {
    /// Same value in, same bytes out.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Rebuilds a value from bytes that [`Encode`] produced.
pub trait Decode: Sized {
    /// Fails on anything that is not canonical.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_nested() {
        let value = Value::map(vec![
            (
                Value::Text("readings".to_string()),
                Value::Array(vec![Value::Float32(0.5), Value::Float64(-0.0), Value::Null]),
            ),
            (Value::Text("count".to_string()), Value::Integer(2)),
            (Value::Text("raw".to_string()), Value::Bytes(vec![0, 1, 2])),
        ]);
        let bytes = value.encode().unwrap();
        assert_eq!(Value::decode(&bytes).unwrap(), value);
    }

    #[test]
    fn extreme_integers_roundtrip() {
        for n in [i64::MIN, -1, 0, i64::MAX] {
            let bytes = Value::Integer(n).encode().unwrap();
            assert_eq!(Value::decode(&bytes).unwrap(), Value::Integer(n));
        }
    }
}
