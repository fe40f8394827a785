//! Helpers for text-keyed CBOR maps.

use crate::error::{ProtocolError, ProtocolResult};
use devkv_codec::Value;

/// Builds one `(name, value)` map entry.
pub(crate) fn field(name: &str, value: Value) -> (Value, Value) {
    (Value::Text(name.to_string()), value)
}

/// Encodes a `u64` as a CBOR integer.
pub(crate) fn u64_value(field: &'static str, n: u64) -> ProtocolResult<Value> {
    i64::try_from(n)
        .map(Value::Integer)
        .map_err(|_| ProtocolError::invalid_field(field, "exceeds i64 range"))
}

/// Read access to a decoded message map.
pub(crate) struct Fields<'a> {
    pairs: &'a [(Value, Value)],
}

impl<'a> Fields<'a> {
    pub(crate) fn of(value: &'a Value) -> ProtocolResult<Self> {
        value
            .as_map()
            .map(|pairs| Self { pairs })
            .ok_or_else(|| ProtocolError::invalid_field("message", "expected map"))
    }

    pub(crate) fn get(&self, name: &str) -> Option<&'a Value> {
        self.pairs
            .iter()
            .find(|(k, _)| k.as_text() == Some(name))
            .map(|(_, v)| v)
    }

    pub(crate) fn require(&self, name: &'static str) -> ProtocolResult<&'a Value> {
        self.get(name).ok_or(ProtocolError::MissingField(name))
    }

    pub(crate) fn text(&self, name: &'static str) -> ProtocolResult<&'a str> {
        self.require(name)?
            .as_text()
            .ok_or_else(|| ProtocolError::invalid_field(name, "expected text"))
    }

    pub(crate) fn bytes(&self, name: &'static str) -> ProtocolResult<&'a [u8]> {
        self.require(name)?
            .as_bytes()
            .ok_or_else(|| ProtocolError::invalid_field(name, "expected bytes"))
    }

    pub(crate) fn u64(&self, name: &'static str) -> ProtocolResult<u64> {
        self.require(name)?
            .as_integer()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| ProtocolError::invalid_field(name, "expected unsigned integer"))
    }

    pub(crate) fn array(&self, name: &'static str) -> ProtocolResult<&'a [Value]> {
        self.require(name)?
            .as_array()
            .ok_or_else(|| ProtocolError::invalid_field(name, "expected array"))
    }
}
