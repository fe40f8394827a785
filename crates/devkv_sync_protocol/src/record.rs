//! One versioned key as exchanged between devices.

use crate::conflict::Version;
use crate::device::{DeviceId, LogicalTimestamp};
use crate::error::{ProtocolError, ProtocolResult};
use crate::fields::{field, u64_value, Fields};
use devkv_codec::{TypedValue, Value};

/// A key's latest version as known by the sending device.
///
/// `value == None` is a tombstone: the key was deleted at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    /// Entry key.
    pub key: Vec<u8>,
    /// Current value, or `None` for a delete.
    pub value: Option<TypedValue>,
    /// Device that authored this version.
    pub origin: DeviceId,
    /// Lamport time of the write.
    pub timestamp: LogicalTimestamp,
    /// Partition label used by sync ranges.
    pub label: String,
}

impl SyncRecord {
    /// Returns the version used for conflict resolution.
    #[must_use]
    pub fn version(&self) -> Version {
        Version::new(self.timestamp, self.origin.clone())
    }

    /// Returns true if this record is a delete.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Converts to a CBOR map.
    ///
    /// # Errors
    ///
    /// Fails if the timestamp does not fit the wire integer range.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        Ok(Value::map(vec![
            field("key", Value::Bytes(self.key.clone())),
            field(
                "value",
                self.value.as_ref().map_or(Value::Null, TypedValue::to_value),
            ),
            field("origin", Value::Text(self.origin.as_str().to_string())),
            field("ts", u64_value("ts", self.timestamp.as_u64())?),
            field("label", Value::Text(self.label.clone())),
        ]))
    }

    /// Parses a CBOR map produced by [`to_value`](Self::to_value).
    ///
    /// # Errors
    ///
    /// Fails on missing or malformed fields.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let fields = Fields::of(value)?;
        let raw_value = fields.require("value")?;
        let value = if raw_value.is_null() {
            None
        } else {
            Some(TypedValue::from_value(raw_value)?)
        };
        Ok(Self {
            key: fields.bytes("key")?.to_vec(),
            value,
            origin: DeviceId::new(fields.text("origin")?)?,
            timestamp: LogicalTimestamp::new(fields.u64("ts")?),
            label: fields.text("label")?.to_string(),
        })
    }

    pub(crate) fn list_to_value(records: &[Self]) -> ProtocolResult<Value> {
        records
            .iter()
            .map(Self::to_value)
            .collect::<ProtocolResult<Vec<_>>>()
            .map(Value::Array)
    }

    pub(crate) fn list_from_value(items: &[Value]) -> ProtocolResult<Vec<Self>> {
        items
            .iter()
            .map(|item| {
                Self::from_value(item)
                    .map_err(|e| ProtocolError::invalid_field("records", e.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_roundtrips() {
        let record = SyncRecord {
            key: b"k1".to_vec(),
            value: None,
            origin: DeviceId::new("a").unwrap(),
            timestamp: LogicalTimestamp::new(9),
            label: String::new(),
        };
        let back = SyncRecord::from_value(&record.to_value().unwrap()).unwrap();
        assert!(back.is_tombstone());
        assert_eq!(back, record);
    }

    #[test]
    fn missing_origin_rejected() {
        let value = Value::map(vec![
            field("key", Value::Bytes(b"k".to_vec())),
            field("value", Value::Null),
            field("ts", Value::Integer(1)),
            field("label", Value::Text(String::new())),
        ]);
        assert_eq!(
            SyncRecord::from_value(&value),
            Err(ProtocolError::MissingField("origin"))
        );
    }
}
