//! Dynamic CBOR items.

use crate::encoder::{encoded, key_order};

/// One decoded CBOR item.
///
/// `Float32` and `Float64` are distinct: each is written at its own width
/// and compared by raw bits, so NaN payloads and negative zero round-trip.
#[derive(Debug, Clone)]
pub enum Value {
    /// `null`.
    Null,
    /// `true` or `false`.
    Bool(bool),
    /// Any integer in the `i64` range.
    Integer(i64),
    /// Single-precision float.
    Float32(f32),
    /// Double-precision float.
    Float64(f64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Array.
    Array(Vec<Value>),
    /// Map, in canonical key order once built through [`Value::map`] or
    /// decoded.
    Map(Vec<(Value, Value)>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::{Array, Bool, Bytes, Float32, Float64, Integer, Map, Null, Text};
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Float32(a), Float32(b)) => a.to_bits() == b.to_bits(),
            (Float64(a), Float64(b)) => a.to_bits() == b.to_bits(),
            (Bytes(a), Bytes(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Value {
    /// A map with its entries put in canonical order.
    pub fn map(pairs: Vec<(Value, Value)>) -> Self {
        let mut keyed: Vec<(Vec<u8>, (Value, Value))> = pairs
            .into_iter()
            .map(|pair| (encoded(&pair.0), pair))
            .collect();
        keyed.sort_by(|a, b| key_order(&a.0, &b.0));
        Value::Map(keyed.into_iter().map(|(_, pair)| pair).collect())
    }

    /// Short name of this item's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Returns true for `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// The single-precision float, if this is one. Doubles are not narrowed.
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Value::Float32(f) => Some(f),
            _ => None,
        }
    }

    /// The double-precision float, if this is one. Singles are not widened.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float64(f) => Some(f),
            _ => None,
        }
    }

    /// The byte string, if this is one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The text, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The elements, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The entries, if this is a map.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(pairs) => Some(pairs),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($source:ty => |$v:ident| $build:expr),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from($v: $source) -> Self {
                    $build
                }
            }
        )*
    };
}

value_from! {
    bool => |b| Value::Bool(b),
    i64 => |n| Value::Integer(n),
    i32 => |n| Value::Integer(i64::from(n)),
    u32 => |n| Value::Integer(i64::from(n)),
    f32 => |f| Value::Float32(f),
    f64 => |f| Value::Float64(f),
    String => |s| Value::Text(s),
    &str => |s| Value::Text(s.to_owned()),
    Vec<u8> => |b| Value::Bytes(b),
    &[u8] => |b| Value::Bytes(b.to_vec()),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::from(s)
    }

    #[test]
    fn map_orders_by_encoded_key() {
        let map = Value::map(vec![
            (text("zz"), Value::Integer(1)),
            (text("b"), Value::Integer(2)),
            (text("a"), Value::Integer(3)),
        ]);
        let keys: Vec<&str> = map
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_text().unwrap())
            .collect();
        // Shorter encodings sort first.
        assert_eq!(keys, vec!["a", "b", "zz"]);
    }

    #[test]
    fn integer_keys_order_by_encoding() {
        let map = Value::map(vec![
            (Value::Integer(-1), Value::Null),
            (Value::Integer(300), Value::Null),
            (Value::Integer(0), Value::Null),
        ]);
        let keys: Vec<i64> = map
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_integer().unwrap())
            .collect();
        assert_eq!(keys, vec![0, -1, 300]);
    }

    #[test]
    fn floats_compare_by_bits() {
        assert_eq!(Value::Float64(f64::NAN), Value::Float64(f64::NAN));
        assert_ne!(Value::Float64(0.0), Value::Float64(-0.0));
        assert_ne!(Value::Float32(1.0), Value::Float64(1.0));
    }

    #[test]
    fn accessors_do_not_convert() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(42i32).as_integer(), Some(42));
        assert_eq!(Value::Float32(1.5).as_f64(), None);
        assert_eq!(Value::Float64(2.5).as_f32(), None);
        assert_eq!(Value::from(&[1u8, 2][..]).as_bytes(), Some(&[1, 2][..]));
        assert_eq!(Value::Integer(1).as_text(), None);
    }
}
