//! Typed entry values.
//!
//! A [`TypedValue`] is what a caller stores under a key. Its tag survives
//! storage and transmission unchanged: an `Integer` never comes back as a
//! `Long`, and a `Double` is never narrowed through `Float`.

use crate::decoder::from_cbor;
use crate::encoder::to_canonical_cbor;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use crate::{Decode, Encode};
use std::fmt;

/// Type tag of a [`TypedValue`].
///
/// Codes 0 through 5 match the public value-type enumeration of the
/// distributed data API; `Long` extends it with code 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    /// UTF-8 string.
    String,
    /// 32-bit signed integer.
    Integer,
    /// 32-bit float.
    Float,
    /// Opaque byte sequence.
    ByteArray,
    /// Boolean.
    Boolean,
    /// 64-bit float.
    Double,
    /// 64-bit signed integer.
    Long,
}

impl ValueType {
    /// Wire code of this tag.
    #[must_use]
    pub const fn to_code(self) -> u8 {
        match self {
            Self::String => 0,
            Self::Integer => 1,
            Self::Float => 2,
            Self::ByteArray => 3,
            Self::Boolean => 4,
            Self::Double => 5,
            Self::Long => 6,
        }
    }

    /// Parses a wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::String),
            1 => Some(Self::Integer),
            2 => Some(Self::Float),
            3 => Some(Self::ByteArray),
            4 => Some(Self::Boolean),
            5 => Some(Self::Double),
            6 => Some(Self::Long),
            _ => None,
        }
    }

    /// Lower-case name used in error messages and CLI output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::ByteArray => "byte_array",
            Self::Boolean => "boolean",
            Self::Double => "double",
            Self::Long => "long",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value stored under a key.
#[derive(Debug, Clone)]
pub enum TypedValue {
    /// 32-bit signed integer.
    Integer(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Boolean.
    Boolean(bool),
    /// UTF-8 string.
    String(String),
    /// Opaque byte sequence.
    ByteArray(Vec<u8>),
}

impl PartialEq for TypedValue {
    /// Same tag and same bits. Floats compare by bit pattern.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::ByteArray(a), Self::ByteArray(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypedValue {}

impl TypedValue {
    /// The tag of this value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Integer(_) => ValueType::Integer,
            Self::Long(_) => ValueType::Long,
            Self::Float(_) => ValueType::Float,
            Self::Double(_) => ValueType::Double,
            Self::Boolean(_) => ValueType::Boolean,
            Self::String(_) => ValueType::String,
            Self::ByteArray(_) => ValueType::ByteArray,
        }
    }

    /// Size of the raw payload in bytes, as checked against value length limits.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Integer(_) | Self::Float(_) => 4,
            Self::Long(_) | Self::Double(_) => 8,
            Self::Boolean(_) => 1,
            Self::String(s) => s.len(),
            Self::ByteArray(b) => b.len(),
        }
    }

    /// Converts to the `[type_code, payload]` CBOR form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let payload = match self {
            Self::Integer(n) => Value::Integer(i64::from(*n)),
            Self::Long(n) => Value::Integer(*n),
            Self::Float(f) => Value::Float32(*f),
            Self::Double(f) => Value::Float64(*f),
            Self::Boolean(b) => Value::Bool(*b),
            Self::String(s) => Value::Text(s.clone()),
            Self::ByteArray(b) => Value::Bytes(b.clone()),
        };
        Value::Array(vec![
            Value::Integer(i64::from(self.value_type().to_code())),
            payload,
        ])
    }

    /// Parses the `[type_code, payload]` CBOR form.
    ///
    /// # Errors
    ///
    /// Fails on an unknown tag, a payload of the wrong CBOR kind, or an
    /// `Integer` payload outside the 32-bit range.
    pub fn from_value(value: &Value) -> CodecResult<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| CodecError::invalid_structure("typed value must be an array"))?;
        let [tag, payload] = items else {
            return Err(CodecError::invalid_structure(
                "typed value must have exactly two items",
            ));
        };
        let code = tag
            .as_integer()
            .ok_or_else(|| CodecError::invalid_structure("typed value tag must be an integer"))?;
        let value_type = u8::try_from(code)
            .ok()
            .and_then(ValueType::from_code)
            .ok_or(CodecError::UnknownValueType {
                code: u64::try_from(code).unwrap_or(u64::MAX),
            })?;
        let mismatch = || CodecError::type_mismatch(value_type.name(), payload.kind_name());

        Ok(match value_type {
            ValueType::Integer => {
                let n = payload.as_integer().ok_or_else(mismatch)?;
                Self::Integer(i32::try_from(n).map_err(|_| CodecError::IntegerOverflow)?)
            }
            ValueType::Long => Self::Long(payload.as_integer().ok_or_else(mismatch)?),
            ValueType::Float => Self::Float(payload.as_f32().ok_or_else(mismatch)?),
            ValueType::Double => Self::Double(payload.as_f64().ok_or_else(mismatch)?),
            ValueType::Boolean => Self::Boolean(payload.as_bool().ok_or_else(mismatch)?),
            ValueType::String => Self::String(payload.as_text().ok_or_else(mismatch)?.to_string()),
            ValueType::ByteArray => {
                Self::ByteArray(payload.as_bytes().ok_or_else(mismatch)?.to_vec())
            }
        })
    }

    /// Returns the string payload, if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric payload widened to `f64`, for any numeric tag.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(f64::from(*n)),
            Self::Long(n) => Some(*n as f64),
            Self::Float(f) => Some(f64::from(*f)),
            Self::Double(f) => Some(*f),
            _ => None,
        }
    }
}

impl Encode for TypedValue {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(&self.to_value())
    }
}

impl Decode for TypedValue {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Self::from_value(&from_cbor(bytes)?)
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Long(n) => write!(f, "{n}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::ByteArray(b) => {
                f.write_str("0x")?;
                b.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
            }
        }
    }
}

impl From<i32> for TypedValue {
    fn from(n: i32) -> Self {
        Self::Integer(n)
    }
}

impl From<i64> for TypedValue {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<f32> for TypedValue {
    fn from(f: f32) -> Self {
        Self::Float(f)
    }
}

impl From<f64> for TypedValue {
    fn from(f: f64) -> Self {
        Self::Double(f)
    }
}

impl From<bool> for TypedValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<u8>> for TypedValue {
    fn from(b: Vec<u8>) -> Self {
        Self::ByteArray(b)
    }
}

impl From<&[u8]> for TypedValue {
    fn from(b: &[u8]) -> Self {
        Self::ByteArray(b.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &TypedValue) -> TypedValue {
        TypedValue::decode(&value.encode().unwrap()).unwrap()
    }

    #[test]
    fn integer_stays_integer() {
        let decoded = roundtrip(&TypedValue::Integer(7));
        assert_eq!(decoded, TypedValue::Integer(7));
        assert_ne!(decoded, TypedValue::Long(7));
    }

    #[test]
    fn double_is_not_narrowed() {
        let value = TypedValue::Double(0.1);
        assert_eq!(roundtrip(&value), value);
        assert_eq!(roundtrip(&value).value_type(), ValueType::Double);
    }

    #[test]
    fn nan_payload_survives() {
        let weird = f64::from_bits(0x7ff8_0000_dead_beef);
        match roundtrip(&TypedValue::Double(weird)) {
            TypedValue::Double(back) => assert_eq!(back.to_bits(), weird.to_bits()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wire_form_is_tag_then_payload() {
        let bytes = TypedValue::Boolean(true).encode().unwrap();
        assert_eq!(bytes, vec![0x82, 0x04, 0xf5]);
    }

    #[test]
    fn unknown_tag_rejected() {
        let value = Value::Array(vec![Value::Integer(42), Value::Null]);
        assert!(matches!(
            TypedValue::from_value(&value),
            Err(CodecError::UnknownValueType { code: 42 })
        ));
    }

    #[test]
    fn mismatched_payload_rejected() {
        let value = Value::Array(vec![Value::Integer(5), Value::Float32(1.0)]);
        assert!(matches!(
            TypedValue::from_value(&value),
            Err(CodecError::TypeMismatch {
                expected: "double",
                found: "float32"
            })
        ));
    }

    #[test]
    fn integer_out_of_range_rejected() {
        let value = Value::Array(vec![Value::Integer(1), Value::Integer(i64::from(i32::MAX) + 1)]);
        assert!(matches!(
            TypedValue::from_value(&value),
            Err(CodecError::IntegerOverflow)
        ));
    }

    #[test]
    fn type_codes_are_stable() {
        for code in 0..=6 {
            assert_eq!(ValueType::from_code(code).unwrap().to_code(), code);
        }
        assert_eq!(ValueType::from_code(7), None);
    }

    #[test]
    fn display_formats() {
        assert_eq!(TypedValue::ByteArray(vec![0xab, 0x01]).to_string(), "0xab01");
        assert_eq!(TypedValue::from("v1").to_string(), "\"v1\"");
    }
}
