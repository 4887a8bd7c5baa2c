//! Pipeline orchestration - sequences the batch filter stages over a working
//! directory, cheapest first, and drives one-shot ingestion.

use anyhow::{Context, Result};
use log::info;
use std::path::Path;

use crate::capability::{ContentDetector, ImageEmbedder};
use crate::curation::dedup::deduplicate_directory;
use crate::curation::novelty::{CurationParams, curate_directory};
use crate::curation::quality::{QualityThresholds, run_quality_gate};
use crate::curation::sink::RejectionSink;
use crate::ingest::extract::{NormalizeOptions, normalize_source};
use crate::models::asset::Asset;

/// Normalize one file, or every file directly inside a directory, into
/// `processed_dir`. Per-file failures are surfaced by the caller's logging;
/// they never abort the rest of a directory run.
pub fn ingest_path(
    source: &Path,
    processed_dir: &Path,
    options: &NormalizeOptions,
) -> Result<Vec<Asset>> {
    if source.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(source)
            .context(format!("failed to read source directory {:?}", source))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        entries.sort();

        let mut assets = Vec::new();
        for entry in entries {
            match normalize_source(&entry, processed_dir, options) {
                Ok(mut produced) => assets.append(&mut produced),
                Err(err) => crate::ingest::watcher::report_ingest_failure(&entry, err),
            }
        }
        Ok(assets)
    } else {
        normalize_source(source, processed_dir, options)
    }
}

/// Run the three filter stages over `dir` in their canonical order:
/// deduplication (identity only), then the quality gate (full decodes),
/// then novelty curation (model inference). Ordering keeps the expensive
/// stages from wasting work on assets already known to be duplicates.
pub fn run_filter_stages(
    dir: &Path,
    thresholds: &QualityThresholds,
    params: &CurationParams,
    embedder: &dyn ImageEmbedder,
    detector: &dyn ContentDetector,
) -> Result<()> {
    let sink = RejectionSink::create(dir)?;

    let dedup = deduplicate_directory(dir).context("deduplication pass failed")?;
    let quality =
        run_quality_gate(dir, thresholds, detector, &sink).context("quality gate pass failed")?;
    let curation =
        curate_directory(dir, params, embedder, &sink).context("novelty curation pass failed")?;

    info!(
        "filter stages complete: {} duplicate(s) removed, {} quality rejection(s), {} cluster rejection(s)",
        dedup.removed, quality.rejected, curation.rejected
    );
    Ok(())
}
