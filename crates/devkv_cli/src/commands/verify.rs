//! Verify command implementation.

use super::{format_size, load};
use devkv_core::{LogBatch, TailDamage};
use std::path::Path;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Intact frames.
    pub frames: usize,
    /// Versions carried by those frames.
    pub versions: usize,
    /// Device purges carried by those frames.
    pub purges: usize,
    /// Log size in bytes.
    pub log_size: u64,
    /// Length of the intact prefix.
    pub valid_len: u64,
    /// Damage after the intact prefix; dropped when the store next opens.
    pub damage: Option<TailDamage>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.damage.is_none()
    }
}

/// Checks every frame of the store at `path`.
///
/// Intact frames that cannot be decrypted or decoded fail outright; damage
/// at the tail is reported in the result.
pub fn verify(path: &Path, secret: Option<&[u8]>) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let loaded = load(path, secret)?;
    let mut versions = 0;
    let mut purges = 0;
    for batch in &loaded.scan.batches {
        match batch {
            LogBatch::Apply(records) => versions += records.len(),
            LogBatch::Purge(_) => purges += 1,
        }
    }
    Ok(VerifyResult {
        frames: loaded.scan.frames,
        versions,
        purges,
        log_size: loaded.log_size,
        valid_len: loaded.scan.valid_len,
        damage: loaded.scan.damage,
    })
}

/// Runs the verify command.
pub fn run(path: &Path, secret: Option<&[u8]>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {}", path.display());
    println!();

    let result = verify(path, secret)?;
    println!("  Log size:  {} bytes", format_size(result.log_size));
    println!("  Frames:    {}", result.frames);
    println!("  Versions:  {}", result.versions);
    println!("  Purges:    {}", result.purges);

    if let Some(damage) = &result.damage {
        println!("  Damage:    {damage}");
        println!(
            "  {} bytes after offset {} will be dropped on next open",
            result.log_size - result.valid_len,
            result.valid_len
        );
    }

    println!();
    if result.is_ok() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::build_store;
    use super::*;
    use devkv_core::{log_path, Options};
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn intact_log_passes() {
        let dir = tempdir().unwrap();
        let path = build_store(dir.path(), Options::new());
        let result = verify(&path, None).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.frames, 4);
        assert_eq!(result.versions, 4);
        assert_eq!(result.purges, 0);
        assert_eq!(result.valid_len, result.log_size);
    }

    #[test]
    fn torn_tail_is_reported() {
        let dir = tempdir().unwrap();
        let path = build_store(dir.path(), Options::new());
        let mut log = OpenOptions::new().append(true).open(log_path(&path)).unwrap();
        log.write_all(b"DKV").unwrap();
        drop(log);

        let result = verify(&path, None).unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.frames, 4);
        assert!(matches!(result.damage, Some(TailDamage::Incomplete { .. })));
        assert_eq!(result.log_size - result.valid_len, 3);
        assert!(run(&path, None).is_err());
    }
}
