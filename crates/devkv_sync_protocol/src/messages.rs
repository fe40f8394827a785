//! Protocol messages exchanged between two devices.
//!
//! A frame is the CBOR array `[type_code, body]` where `body` is a
//! text-keyed map.

use crate::device::DeviceId;
use crate::error::{ProtocolError, ProtocolResult};
use crate::fields::{field, u64_value, Fields};
use crate::record::SyncRecord;
use devkv_codec::{from_cbor, to_canonical_cbor, Value};

/// Asks a peer to merge records authored by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Store both sides are syncing.
    pub store_id: String,
    /// Device sending the records.
    pub sender: DeviceId,
    /// Records to merge.
    pub records: Vec<SyncRecord>,
}

/// Result of merging a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushResponse {
    /// Records that replaced the receiver's version.
    pub applied: u64,
    /// Records the receiver already had or had a newer version of.
    pub superseded: u64,
}

/// Asks a peer for the records it authored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Store both sides are syncing.
    pub store_id: String,
    /// Device asking.
    pub requester: DeviceId,
    /// Labels to return; `None` means every label.
    pub labels: Option<Vec<String>>,
}

/// Records returned for a pull.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PullResponse {
    /// Records authored by the responding device.
    pub records: Vec<SyncRecord>,
}

/// Failure reported by the responding device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Human-readable reason.
    pub message: String,
}

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Push request.
    PushRequest(PushRequest),
    /// Push response.
    PushResponse(PushResponse),
    /// Pull request.
    PullRequest(PullRequest),
    /// Pull response.
    PullResponse(PullResponse),
    /// Error response.
    Error(ErrorResponse),
}

impl SyncMessage {
    /// Returns the message type code.
    #[must_use]
    pub fn type_code(&self) -> u8 {
        match self {
            Self::PushRequest(_) => 1,
            Self::PushResponse(_) => 2,
            Self::PullRequest(_) => 3,
            Self::PullResponse(_) => 4,
            Self::Error(_) => 5,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::PushRequest(_) => "push_request",
            Self::PushResponse(_) => "push_response",
            Self::PullRequest(_) => "pull_request",
            Self::PullResponse(_) => "pull_response",
            Self::Error(_) => "error",
        }
    }

    /// Encodes the message into a frame.
    ///
    /// # Errors
    ///
    /// Fails if a numeric field exceeds the wire integer range.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let body = match self {
            Self::PushRequest(req) => Value::map(vec![
                field("store_id", Value::Text(req.store_id.clone())),
                field("sender", Value::Text(req.sender.as_str().to_string())),
                field("records", SyncRecord::list_to_value(&req.records)?),
            ]),
            Self::PushResponse(resp) => Value::map(vec![
                field("applied", u64_value("applied", resp.applied)?),
                field("superseded", u64_value("superseded", resp.superseded)?),
            ]),
            Self::PullRequest(req) => {
                let mut pairs = vec![
                    field("store_id", Value::Text(req.store_id.clone())),
                    field("requester", Value::Text(req.requester.as_str().to_string())),
                ];
                if let Some(labels) = &req.labels {
                    pairs.push(field(
                        "labels",
                        Value::Array(labels.iter().cloned().map(Value::Text).collect()),
                    ));
                }
                Value::map(pairs)
            }
            Self::PullResponse(resp) => Value::map(vec![field(
                "records",
                SyncRecord::list_to_value(&resp.records)?,
            )]),
            Self::Error(err) => Value::map(vec![field("message", Value::Text(err.message.clone()))]),
        };
        let frame = Value::Array(vec![Value::Integer(i64::from(self.type_code())), body]);
        Ok(to_canonical_cbor(&frame)?)
    }

    /// Decodes a frame.
    ///
    /// # Errors
    ///
    /// Fails on malformed CBOR, unknown type codes or missing fields.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let frame = from_cbor(bytes)?;
        let Some([code, body]) = frame.as_array() else {
            return Err(ProtocolError::invalid_field("frame", "expected [type, body]"));
        };
        let code = code
            .as_integer()
            .ok_or_else(|| ProtocolError::invalid_field("type", "expected integer"))?;
        let fields = Fields::of(body)?;

        Ok(match code {
            1 => Self::PushRequest(PushRequest {
                store_id: fields.text("store_id")?.to_string(),
                sender: DeviceId::new(fields.text("sender")?)?,
                records: SyncRecord::list_from_value(fields.array("records")?)?,
            }),
            2 => Self::PushResponse(PushResponse {
                applied: fields.u64("applied")?,
                superseded: fields.u64("superseded")?,
            }),
            3 => {
                let labels = match fields.get("labels") {
                    None => None,
                    Some(value) => Some(
                        value
                            .as_array()
                            .ok_or_else(|| ProtocolError::invalid_field("labels", "expected array"))?
                            .iter()
                            .map(|label| {
                                label.as_text().map(str::to_string).ok_or_else(|| {
                                    ProtocolError::invalid_field("labels", "expected text items")
                                })
                            })
                            .collect::<ProtocolResult<Vec<_>>>()?,
                    ),
                };
                Self::PullRequest(PullRequest {
                    store_id: fields.text("store_id")?.to_string(),
                    requester: DeviceId::new(fields.text("requester")?)?,
                    labels,
                })
            }
            4 => Self::PullResponse(PullResponse {
                records: SyncRecord::list_from_value(fields.array("records")?)?,
            }),
            5 => Self::Error(ErrorResponse {
                message: fields.text("message")?.to_string(),
            }),
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}
