//! Argument checks run before any I/O.

use crate::config::{KvStoreType, MAX_BATCH_SIZE, MAX_STORE_ID_LENGTH, MAX_VALUE_LENGTH};
use crate::error::{KvError, KvResult};
use crate::types::Key;
use devkv_codec::TypedValue;

pub(crate) fn key(kind: KvStoreType, key: &Key) -> KvResult<()> {
    if key.is_empty() {
        return Err(KvError::key_invalid("key is empty"));
    }
    if key.as_bytes().iter().all(u8::is_ascii_whitespace) {
        return Err(KvError::key_invalid("key is blank"));
    }
    let max = kind.max_key_length();
    if key.len() > max {
        return Err(KvError::key_invalid(format!(
            "key is {} bytes, maximum is {max}",
            key.len()
        )));
    }
    Ok(())
}

pub(crate) fn value(value: &TypedValue) -> KvResult<()> {
    let size = value.payload_len();
    if size > MAX_VALUE_LENGTH {
        return Err(KvError::ValueTooLarge {
            size,
            max: MAX_VALUE_LENGTH,
        });
    }
    Ok(())
}

pub(crate) fn batch_len(len: usize) -> KvResult<()> {
    if len > MAX_BATCH_SIZE {
        return Err(KvError::argument_invalid(format!(
            "batch of {len} exceeds maximum of {MAX_BATCH_SIZE}"
        )));
    }
    Ok(())
}

pub(crate) fn entries(kind: KvStoreType, entries: &[(Key, TypedValue)]) -> KvResult<()> {
    batch_len(entries.len())?;
    for (k, v) in entries {
        key(kind, k)?;
        value(v)?;
    }
    Ok(())
}

pub(crate) fn keys(kind: KvStoreType, keys: &[Key]) -> KvResult<()> {
    batch_len(keys.len())?;
    keys.iter().try_for_each(|k| key(kind, k))
}

/// Store ids name a directory, so they are restricted to a portable
/// character set.
pub(crate) fn store_id(store_id: &str) -> KvResult<()> {
    if store_id.is_empty() || store_id.len() > MAX_STORE_ID_LENGTH {
        return Err(KvError::argument_invalid(format!(
            "store id must be 1..={MAX_STORE_ID_LENGTH} bytes"
        )));
    }
    if !store_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        || store_id.starts_with('.')
    {
        return Err(KvError::argument_invalid(format!(
            "store id '{store_id}' contains unsupported characters"
        )));
    }
    Ok(())
}
