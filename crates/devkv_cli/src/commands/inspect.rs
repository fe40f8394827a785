//! Inspect command implementation.

use super::{format_size, load, replay};
use devkv_core::Options;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store directory.
    pub path: String,
    /// Store id recorded in META.
    pub store_id: String,
    /// META format version.
    pub format_version: u32,
    /// Options fixed at creation.
    pub options: Options,
    /// Log size in bytes.
    pub log_size: u64,
    /// Intact log frames.
    pub frames: usize,
    /// Live entries over all devices.
    pub live_entries: usize,
    /// Retained delete markers.
    pub tombstones: usize,
    /// Live entries per authoring device.
    pub devices: BTreeMap<String, usize>,
    /// Damage found after the intact prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_damage: Option<String>,
}

/// Builds the inspection result for the store at `path`.
pub fn inspect(path: &Path, secret: Option<&[u8]>) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let loaded = load(path, secret)?;
    let records = replay(loaded.meta.options.kv_store_type, &loaded.scan.batches);

    let mut devices = BTreeMap::new();
    let mut tombstones = 0;
    for record in &records {
        if record.is_tombstone() {
            tombstones += 1;
        } else {
            *devices.entry(record.origin.to_string()).or_insert(0) += 1;
        }
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        store_id: loaded.meta.store_id,
        format_version: loaded.meta.format_version,
        options: loaded.meta.options,
        log_size: loaded.log_size,
        frames: loaded.scan.frames,
        live_entries: records.len() - tombstones,
        tombstones,
        devices,
        tail_damage: loaded.scan.damage.map(|damage| damage.to_string()),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, secret: Option<&[u8]>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path, secret)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("devkv Store Inspection");
    println!("======================");
    println!();
    println!("Path:     {}", result.path);
    println!("Store id: {}", result.store_id);
    println!("Format:   v{}", result.format_version);
    println!();
    println!("Options:");
    println!("  Kind:           {}", result.options.kv_store_type);
    println!("  Security level: {:?}", result.options.security_level);
    println!("  Encrypted:      {}", result.options.encrypt);
    println!("  Backup:         {}", result.options.backup);
    println!("  Auto sync:      {}", result.options.auto_sync);
    println!();
    println!("Log:");
    println!("  Size:   {} bytes", format_size(result.log_size));
    println!("  Frames: {}", result.frames);
    if let Some(damage) = &result.tail_damage {
        println!("  Damage: {damage}");
    }
    println!();
    println!("Entries:");
    println!("  Live:       {}", result.live_entries);
    println!("  Tombstones: {}", result.tombstones);

    if !result.devices.is_empty() {
        println!();
        println!("Devices:");
        for (device, count) in &result.devices {
            println!("  {device}: {count} entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::build_store;
    use super::*;
    use devkv_core::{KvStoreType, Options};
    use tempfile::tempdir;

    #[test]
    fn counts_entries_per_device() {
        let dir = tempdir().unwrap();
        let path = build_store(dir.path(), Options::new());
        let result = inspect(&path, None).unwrap();

        assert_eq!(result.store_id, "notes");
        assert_eq!(result.options.kv_store_type, KvStoreType::DeviceCollaboration);
        assert_eq!(result.frames, 4);
        assert_eq!(result.live_entries, 2);
        assert_eq!(result.tombstones, 1);
        assert_eq!(result.devices.get("phone"), Some(&2));
        assert!(result.tail_damage.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["devices"]["phone"], 2);
        assert!(json.get("tail_damage").is_none());
    }
}
