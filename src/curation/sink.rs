//! Unified rejection sink - one `rejected/` directory per working directory
//! plus a JSON-lines ledger recording why each asset was removed.

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::common::{REJECTED_DIR_NAME, REJECTION_LEDGER_NAME};
use crate::models::asset::RejectReason;

#[derive(Serialize)]
struct RejectionRecord<'a> {
    file: &'a str,
    reason: &'static str,
    stage: &'a str,
    rejected_at: String,
}

pub struct RejectionSink {
    dir: PathBuf,
    ledger: PathBuf,
}

impl RejectionSink {
    /// Open (creating if needed) the sink under `base`.
    pub fn create(base: &Path) -> Result<Self> {
        let dir = base.join(REJECTED_DIR_NAME);
        fs::create_dir_all(&dir)
            .context(format!("failed to create rejection sink {:?}", dir))?;
        let ledger = dir.join(REJECTION_LEDGER_NAME);
        Ok(Self { dir, ledger })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move an asset into the sink and append its provenance record. The
    /// move is a rename, so a concurrent scan sees the file in exactly one
    /// directory.
    pub fn reject(&self, asset_path: &Path, reason: RejectReason, stage: &str) -> Result<PathBuf> {
        let file_name = asset_path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("asset {:?} has no file name", asset_path))?;
        let destination = self.dir.join(file_name);

        fs::rename(asset_path, &destination).context(format!(
            "failed to move rejected asset {:?} into {:?}",
            asset_path, self.dir
        ))?;

        self.append_record(&file_name.to_string_lossy(), reason, stage)?;
        Ok(destination)
    }

    fn append_record(&self, file: &str, reason: RejectReason, stage: &str) -> Result<()> {
        let record = RejectionRecord {
            file,
            reason: reason.code(),
            stage,
            rejected_at: chrono::Utc::now().to_rfc3339(),
        };
        let line = serde_json::to_string(&record).context("failed to serialize rejection record")?;

        let mut ledger = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.ledger)
            .context(format!("failed to open rejection ledger {:?}", self.ledger))?;
        writeln!(ledger, "{}", line).context("failed to append rejection record")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_moves_the_file_and_records_the_reason() {
        let dir = tempfile::tempdir().unwrap();
        let asset = dir.path().join("dull.png");
        fs::write(&asset, b"pixels").unwrap();

        let sink = RejectionSink::create(dir.path()).unwrap();
        let destination = sink.reject(&asset, RejectReason::Blurry, "quality").unwrap();

        assert!(!asset.exists());
        assert!(destination.exists());
        assert_eq!(destination, dir.path().join("rejected/dull.png"));

        let ledger = fs::read_to_string(dir.path().join("rejected/rejections.jsonl")).unwrap();
        let record: serde_json::Value = serde_json::from_str(ledger.lines().next().unwrap()).unwrap();
        assert_eq!(record["file"], "dull.png");
        assert_eq!(record["reason"], "blurry");
        assert_eq!(record["stage"], "quality");
    }

    #[test]
    fn create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        RejectionSink::create(dir.path()).unwrap();
        RejectionSink::create(dir.path()).unwrap();
        assert!(dir.path().join(REJECTED_DIR_NAME).is_dir());
    }
}
