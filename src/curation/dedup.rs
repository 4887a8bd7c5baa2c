//! Perceptual deduplication - first-seen-wins removal of visually identical
//! assets.
//!
//! Matching is exact fingerprint equality, deliberately: a distance
//! threshold would change which assets survive a pass.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::common::CURATION_RAYON_POOL;
use crate::models::asset::{Asset, RejectReason, Stage};
use crate::utils::list_image_files;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    pub scanned: usize,
    pub removed: usize,
}

/// Remove every asset whose fingerprint was already seen earlier in the
/// scan. Scan order is lexical by file name, so repeated runs make the same
/// keep/delete decisions; the fingerprints themselves are computed in
/// parallel beforehand.
pub fn deduplicate_directory(dir: &Path) -> Result<DedupOutcome> {
    let files = list_image_files(dir)?;
    let mut assets: Vec<Asset> = files.into_iter().map(Asset::from_existing).collect();
    let scanned = assets.len();
    info!("scanning {} asset(s) in {:?} for duplicates", scanned, dir);

    let bar = fingerprint_progress(scanned);
    CURATION_RAYON_POOL.install(|| {
        assets.par_iter_mut().for_each(|asset| {
            if let Err(err) = asset.fingerprint() {
                warn!("could not fingerprint {:?}: {err:#}", asset.path());
            }
            bar.inc(1);
        });
    });
    bar.finish_and_clear();

    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    let mut removed = 0;
    for asset in &mut assets {
        // Unreadable assets are neither kept nor removed; they stay in
        // place for manual inspection.
        let Some(fingerprint) = asset.cached_fingerprint() else {
            continue;
        };

        if seen.insert(fingerprint.to_vec()) {
            asset.set_stage(Stage::Deduped);
        } else {
            fs::remove_file(asset.path()).map_err(|e| {
                anyhow::anyhow!("failed to delete duplicate {:?}: {}", asset.path(), e)
            })?;
            asset.set_stage(Stage::Rejected(RejectReason::Duplicate));
            removed += 1;
        }
    }

    info!("removed {} duplicate(s); {} unique fingerprint(s)", removed, seen.len());
    Ok(DedupOutcome { scanned, removed })
}

fn fingerprint_progress(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{msg} {wide_bar} {pos}/{len}")
            .expect("static progress template"),
    );
    bar.set_message("fingerprinting");
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    fn flat_png(path: &PathBuf, luma: u8) {
        RgbImage::from_pixel(32, 32, Rgb([luma, luma, luma]))
            .save(path)
            .unwrap();
    }

    fn ramp_png(path: &PathBuf) {
        RgbImage::from_fn(32, 32, |x, _| {
            let v = (x * 8) as u8;
            Rgb([v, v, v])
        })
        .save(path)
        .unwrap();
    }

    #[test]
    fn three_identical_copies_leave_exactly_one_file() {
        let dir = tempfile::tempdir().unwrap();
        flat_png(&dir.path().join("a.png"), 90);
        for name in ["b.png", "c.png"] {
            std::fs::copy(dir.path().join("a.png"), dir.path().join(name)).unwrap();
        }
        ramp_png(&dir.path().join("d.png"));

        let outcome = deduplicate_directory(dir.path()).unwrap();
        assert_eq!(outcome.scanned, 4);
        assert_eq!(outcome.removed, 2);

        // First-seen-wins: the lexically first copy survives.
        assert!(dir.path().join("a.png").exists());
        assert!(!dir.path().join("b.png").exists());
        assert!(!dir.path().join("c.png").exists());
        assert!(dir.path().join("d.png").exists());
    }

    #[test]
    fn second_pass_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        flat_png(&dir.path().join("a.png"), 40);
        std::fs::copy(dir.path().join("a.png"), dir.path().join("b.png")).unwrap();

        assert_eq!(deduplicate_directory(dir.path()).unwrap().removed, 1);
        assert_eq!(deduplicate_directory(dir.path()).unwrap().removed, 0);
    }

    #[test]
    fn unreadable_files_are_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("corrupt.png"), b"not a png").unwrap();
        ramp_png(&dir.path().join("ok.png"));

        let outcome = deduplicate_directory(dir.path()).unwrap();
        assert_eq!(outcome.removed, 0);
        assert!(dir.path().join("corrupt.png").exists());
        assert!(dir.path().join("ok.png").exists());
    }

    #[test]
    fn empty_directory_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            deduplicate_directory(dir.path()).unwrap(),
            DedupOutcome::default()
        );
    }
}
