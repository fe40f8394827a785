//! Dump command implementation.

use super::{display_key, hex, load, replay};
use devkv_core::{SyncRecord, TypedValue};
use serde::Serialize;
use std::path::Path;

/// Which entries to print.
#[derive(Debug, Default)]
pub struct Filter {
    /// Key prefix; empty matches everything.
    pub prefix: String,
    /// Authoring device.
    pub device: Option<String>,
    /// Maximum number of entries.
    pub limit: Option<usize>,
}

/// One live entry as printed.
#[derive(Debug, Serialize)]
pub struct DumpedEntry {
    /// Key as text.
    pub key: String,
    /// Value tag name.
    #[serde(rename = "type")]
    pub value_type: String,
    /// Value; byte arrays as hex.
    pub value: serde_json::Value,
    /// Authoring device.
    pub origin: String,
    /// Lamport time of the write.
    pub timestamp: u64,
}

impl DumpedEntry {
    fn from_record(record: &SyncRecord, value: &TypedValue) -> Self {
        Self {
            key: display_key(&record.key),
            value_type: value.value_type().to_string(),
            value: to_json(value),
            origin: record.origin.to_string(),
            timestamp: record.timestamp.as_u64(),
        }
    }
}

fn to_json(value: &TypedValue) -> serde_json::Value {
    match value {
        TypedValue::Integer(n) => (*n).into(),
        TypedValue::Long(n) => (*n).into(),
        TypedValue::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        TypedValue::Double(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        TypedValue::Boolean(b) => (*b).into(),
        TypedValue::String(s) => s.clone().into(),
        TypedValue::ByteArray(bytes) => hex(bytes).into(),
    }
}

/// Live entries of the store at `path` selected by `filter`.
pub fn collect(
    path: &Path,
    secret: Option<&[u8]>,
    filter: &Filter,
) -> Result<Vec<DumpedEntry>, Box<dyn std::error::Error>> {
    let loaded = load(path, secret)?;
    let records = replay(loaded.meta.options.kv_store_type, &loaded.scan.batches);
    let entries = records
        .iter()
        .filter(|record| record.key.starts_with(filter.prefix.as_bytes()))
        .filter(|record| {
            filter
                .device
                .as_deref()
                .map_or(true, |device| record.origin.as_str() == device)
        })
        .filter_map(|record| {
            record
                .value
                .as_ref()
                .map(|value| DumpedEntry::from_record(record, value))
        })
        .take(filter.limit.unwrap_or(usize::MAX))
        .collect();
    Ok(entries)
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    secret: Option<&[u8]>,
    filter: &Filter,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = collect(path, secret, filter)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            for entry in &entries {
                println!(
                    "{} [{}] = {} (origin {}, t={})",
                    entry.key, entry.value_type, entry.value, entry.origin, entry.timestamp
                );
            }
            println!();
            println!("{} entries", entries.len());
        }
    }
    Ok(())
}
