//! Log frame layout and batch payloads.
//!
//! ```text
//! | magic "DKVL" (4) | version (1) | flags (1) | payload_len u32 LE (4) | payload | crc32 LE (4) |
//! ```
//!
//! The CRC covers header and payload. The payload is a canonical CBOR
//! batch, sealed with AES-256-GCM when the `ENCRYPTED` flag is set.

use crate::crypto::CryptoManager;
use crate::error::{KvError, KvResult};
use devkv_codec::{from_cbor, to_canonical_cbor, Value};
use devkv_sync_protocol::{DeviceId, SyncRecord};

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"DKVL";
/// Current frame format version.
pub const FRAME_VERSION: u8 = 1;
/// Header size in bytes.
pub const HEADER_SIZE: usize = 10;
/// Trailing checksum size in bytes.
pub const CRC_SIZE: usize = 4;

const FLAG_ENCRYPTED: u8 = 0x01;

const KIND_APPLY: i64 = 1;
const KIND_PURGE: i64 = 2;

/// One atomic unit of the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogBatch {
    /// Versions (values or tombstones) that replace whatever the index held.
    Apply(Vec<SyncRecord>),
    /// Every version authored by the device is dropped.
    Purge(DeviceId),
}

impl LogBatch {
    fn to_value(&self) -> KvResult<Value> {
        Ok(match self {
            Self::Apply(records) => Value::Array(vec![
                Value::Integer(KIND_APPLY),
                Value::Array(
                    records
                        .iter()
                        .map(SyncRecord::to_value)
                        .collect::<Result<_, _>>()?,
                ),
            ]),
            Self::Purge(device) => Value::Array(vec![
                Value::Integer(KIND_PURGE),
                Value::Text(device.to_string()),
            ]),
        })
    }

    fn from_value(value: &Value) -> KvResult<Self> {
        let items = value
            .as_array()
            .filter(|items| items.len() == 2)
            .ok_or_else(|| KvError::corruption("batch is not a [kind, body] pair"))?;
        match items[0].as_integer() {
            Some(KIND_APPLY) => {
                let records = items[1]
                    .as_array()
                    .ok_or_else(|| KvError::corruption("apply batch body is not an array"))?
                    .iter()
                    .map(SyncRecord::from_value)
                    .collect::<Result<_, _>>()?;
                Ok(Self::Apply(records))
            }
            Some(KIND_PURGE) => {
                let device = items[1]
                    .as_text()
                    .ok_or_else(|| KvError::corruption("purge batch body is not a device id"))?;
                Ok(Self::Purge(DeviceId::new(device)?))
            }
            other => Err(KvError::corruption(format!("unknown batch kind {other:?}"))),
        }
    }
}

/// Encodes `batch` into a complete frame.
pub fn encode_frame(batch: &LogBatch, cipher: Option<&CryptoManager>, aad: &[u8]) -> KvResult<Vec<u8>> {
    let plain = to_canonical_cbor(&batch.to_value()?)?;
    let (flags, payload) = match cipher {
        Some(cipher) => (FLAG_ENCRYPTED, cipher.seal(&plain, aad)?),
        None => (0, plain),
    };
    let len = u32::try_from(payload.len())
        .map_err(|_| KvError::argument_invalid("batch too large for one frame"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.push(FRAME_VERSION);
    frame.push(flags);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Why a scan stopped before the end of the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailDamage {
    /// The last frame is cut short.
    Incomplete {
        /// Frame start.
        offset: u64,
    },
    /// Bytes at `offset` do not start a frame.
    BadMagic {
        /// Frame start.
        offset: u64,
    },
    /// The frame at `offset` fails its checksum.
    ChecksumMismatch {
        /// Frame start.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },
}

impl TailDamage {
    /// Offset of the first unusable byte.
    #[must_use]
    pub fn offset(&self) -> u64 {
        match self {
            Self::Incomplete { offset }
            | Self::BadMagic { offset }
            | Self::ChecksumMismatch { offset, .. } => *offset,
        }
    }
}

impl std::fmt::Display for TailDamage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete { offset } => write!(f, "incomplete frame at offset {offset}"),
            Self::BadMagic { offset } => write!(f, "invalid magic at offset {offset}"),
            Self::ChecksumMismatch {
                offset,
                expected,
                actual,
            } => write!(
                f,
                "checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}"
            ),
        }
    }
}

/// Result of reading a log from the start.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    /// Batches of every intact frame, in log order.
    pub batches: Vec<LogBatch>,
    /// Number of intact frames.
    pub frames: usize,
    /// Length of the intact prefix in bytes.
    pub valid_len: u64,
    /// Set when unusable bytes follow the intact prefix.
    pub damage: Option<TailDamage>,
    /// Set when at least one frame is encrypted.
    pub encrypted: bool,
}

/// Reads every intact frame of `data`.
///
/// Damage at the tail (a torn write) ends the scan without an error.
///
/// # Errors
///
/// Fails when an intact frame cannot be decrypted or decoded, or when an
/// encrypted frame is found and no `cipher` is given.
pub fn scan(data: &[u8], cipher: Option<&CryptoManager>, aad: &[u8]) -> KvResult<Scan> {
    let mut result = Scan::default();
    let mut pos = 0usize;

    while pos < data.len() {
        let offset = pos as u64;
        let rest = &data[pos..];
        if rest.len() < HEADER_SIZE {
            result.damage = Some(TailDamage::Incomplete { offset });
            break;
        }
        if rest[0..4] != FRAME_MAGIC || rest[4] > FRAME_VERSION {
            result.damage = Some(TailDamage::BadMagic { offset });
            break;
        }
        let flags = rest[5];
        let payload_len = u32::from_le_bytes([rest[6], rest[7], rest[8], rest[9]]) as usize;
        let total = HEADER_SIZE + payload_len + CRC_SIZE;
        if rest.len() < total {
            result.damage = Some(TailDamage::Incomplete { offset });
            break;
        }

        let body_end = HEADER_SIZE + payload_len;
        let expected = u32::from_le_bytes([
            rest[body_end],
            rest[body_end + 1],
            rest[body_end + 2],
            rest[body_end + 3],
        ]);
        let actual = compute_crc32(&rest[..body_end]);
        if expected != actual {
            result.damage = Some(TailDamage::ChecksumMismatch {
                offset,
                expected,
                actual,
            });
            break;
        }

        let payload = &rest[HEADER_SIZE..body_end];
        let plain = if flags & FLAG_ENCRYPTED != 0 {
            result.encrypted = true;
            let cipher = cipher.ok_or_else(|| {
                KvError::crypto("log is encrypted; a key is required to read it")
            })?;
            cipher.open(payload, aad)?
        } else {
            payload.to_vec()
        };
        let value = from_cbor(&plain)
            .map_err(|e| KvError::corruption(format!("frame at offset {offset}: {e}")))?;
        result.batches.push(LogBatch::from_value(&value)?);
        result.frames += 1;
        pos += total;
        result.valid_len = pos as u64;
    }

    Ok(result)
}

/// Computes a CRC32 checksum (IEEE polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EncryptionKey;
    use devkv_codec::TypedValue;
    use devkv_sync_protocol::LogicalTimestamp;

    fn record(key: &str, ts: u64) -> SyncRecord {
        SyncRecord {
            key: key.as_bytes().to_vec(),
            value: Some(TypedValue::Long(ts as i64)),
            origin: DeviceId::new("phone").unwrap(),
            timestamp: LogicalTimestamp::new(ts),
            label: String::new(),
        }
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn scan_reads_frames_in_order() {
        let mut log = encode_frame(&LogBatch::Apply(vec![record("a", 1)]), None, b"").unwrap();
        log.extend(
            encode_frame(
                &LogBatch::Purge(DeviceId::new("tablet").unwrap()),
                None,
                b"",
            )
            .unwrap(),
        );

        let scan = scan(&log, None, b"").unwrap();
        assert_eq!(scan.frames, 2);
        assert_eq!(scan.valid_len, log.len() as u64);
        assert!(scan.damage.is_none());
        assert_eq!(scan.batches[0], LogBatch::Apply(vec![record("a", 1)]));
        assert!(matches!(scan.batches[1], LogBatch::Purge(_)));
    }

    #[test]
    fn torn_tail_is_reported_not_fatal() {
        let first = encode_frame(&LogBatch::Apply(vec![record("a", 1)]), None, b"").unwrap();
        let second = encode_frame(&LogBatch::Apply(vec![record("b", 2)]), None, b"").unwrap();
        let mut log = first.clone();
        log.extend_from_slice(&second[..second.len() - 3]);

        let scan = scan(&log, None, b"").unwrap();
        assert_eq!(scan.frames, 1);
        assert_eq!(scan.valid_len, first.len() as u64);
        assert_eq!(
            scan.damage,
            Some(TailDamage::Incomplete {
                offset: first.len() as u64
            })
        );
    }

    #[test]
    fn flipped_bit_fails_checksum() {
        let mut log = encode_frame(&LogBatch::Apply(vec![record("a", 1)]), None, b"").unwrap();
        log[HEADER_SIZE + 2] ^= 0x40;
        let scan = scan(&log, None, b"").unwrap();
        assert_eq!(scan.frames, 0);
        assert!(matches!(
            scan.damage,
            Some(TailDamage::ChecksumMismatch { offset: 0, .. })
        ));
    }

    #[test]
    fn encrypted_frames_need_the_key() {
        let cipher = CryptoManager::new(&EncryptionKey::generate());
        let log = encode_frame(&LogBatch::Apply(vec![record("a", 1)]), Some(&cipher), b"s").unwrap();

        let scan_ok = scan(&log, Some(&cipher), b"s").unwrap();
        assert!(scan_ok.encrypted);
        assert_eq!(scan_ok.frames, 1);

        assert!(matches!(scan(&log, None, b"s"), Err(KvError::Crypto { .. })));
        let other = CryptoManager::new(&EncryptionKey::generate());
        assert!(matches!(
            scan(&log, Some(&other), b"s"),
            Err(KvError::Crypto { .. })
        ));
    }
}
