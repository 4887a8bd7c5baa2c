//! Novelty curation - rejects overrepresented visual motifs wholesale while
//! always preserving outliers.
//!
//! Includes:
//! - Batched embedding of every asset via the injected capability
//! - Density-based clustering of the embedding vectors
//! - Whole-cluster rejection above `max_cluster_size`, never partial

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

use crate::capability::ImageEmbedder;
use crate::common::CURATION_RAYON_POOL;
use crate::curation::cluster::dbscan;
use crate::curation::sink::RejectionSink;
use crate::models::asset::{Asset, RejectReason, Stage};
use crate::utils::list_image_files;

const STAGE_NAME: &str = "novelty";

#[derive(Debug, Clone, Copy)]
pub struct CurationParams {
    /// Clusters larger than this are treated as a cliché and rejected whole.
    pub max_cluster_size: usize,
    /// Minimum points for a grouping to count as a cluster; smaller
    /// groupings come back as outliers. Doubles as the insufficient-data
    /// bound for the whole pass.
    pub min_cluster_size: usize,
    /// Neighborhood radius for the density scan, in embedding space.
    pub cluster_eps: f32,
}

impl Default for CurationParams {
    fn default() -> Self {
        Self {
            max_cluster_size: crate::common::DEFAULT_MAX_CLUSTER_SIZE,
            min_cluster_size: crate::common::DEFAULT_MIN_CLUSTER_SIZE,
            cluster_eps: crate::common::DEFAULT_CLUSTER_EPS,
        }
    }
}

#[derive(Debug, Default)]
pub struct CurationOutcome {
    pub embedded: usize,
    pub clusters: usize,
    pub outliers: usize,
    pub rejected: usize,
}

/// Cluster the directory's assets by embedding and reject every member of
/// each oversized cluster. Outliers are never rejected, and a population
/// below `min_cluster_size` is left entirely alone.
pub fn curate_directory(
    dir: &Path,
    params: &CurationParams,
    embedder: &dyn ImageEmbedder,
    sink: &RejectionSink,
) -> Result<CurationOutcome> {
    let files = list_image_files(dir)?;
    if files.len() < params.min_cluster_size {
        info!(
            "only {} asset(s) in {:?}; not enough to cluster, rejecting nothing",
            files.len(),
            dir
        );
        return Ok(CurationOutcome::default());
    }

    let mut assets: Vec<Asset> = files.into_iter().map(Asset::from_existing).collect();

    let bar = embedding_progress(assets.len());
    CURATION_RAYON_POOL.install(|| {
        assets.par_iter_mut().for_each(|asset| {
            if let Err(err) = asset.embedding(embedder) {
                warn!("could not embed {:?}: {err:#}", asset.path());
            }
            bar.inc(1);
        });
    });
    bar.finish_and_clear();

    // Unreadable assets drop out of the clustering population but stay on
    // disk, the same recovery rule as every other batch pass.
    let embedded: Vec<(usize, Vec<f32>)> = assets
        .iter()
        .enumerate()
        .filter_map(|(idx, asset)| {
            asset
                .cached_embedding()
                .map(|embedding| (idx, embedding.to_vec()))
        })
        .collect();

    let vectors: Vec<Vec<f32>> = embedded.iter().map(|(_, v)| v.clone()).collect();
    let labels = dbscan(&vectors, params.cluster_eps, params.min_cluster_size);

    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut outliers = 0;
    for ((asset_idx, _), label) in embedded.iter().zip(&labels) {
        match label {
            Some(cluster) => clusters.entry(*cluster).or_default().push(*asset_idx),
            None => outliers += 1,
        }
    }

    let mut outcome = CurationOutcome {
        embedded: embedded.len(),
        clusters: clusters.len(),
        outliers,
        rejected: 0,
    };

    for (label, members) in &clusters {
        if members.len() <= params.max_cluster_size {
            for &idx in members {
                assets[idx].set_stage(Stage::Curated);
            }
            continue;
        }

        info!(
            "rejecting overrepresented cluster {} with {} member(s)",
            label,
            members.len()
        );
        for &idx in members {
            sink.reject(
                assets[idx].path(),
                RejectReason::OverrepresentedCluster,
                STAGE_NAME,
            )?;
            assets[idx].set_stage(Stage::Rejected(RejectReason::OverrepresentedCluster));
            outcome.rejected += 1;
        }
    }

    info!(
        "novelty curation: {} cluster(s), {} outlier(s), {} rejected",
        outcome.clusters, outcome.outliers, outcome.rejected
    );
    Ok(outcome)
}

fn embedding_progress(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{msg} {wide_bar} {pos}/{len}")
            .expect("static progress template"),
    );
    bar.set_message("embedding");
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::LumaGridEmbedder;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    fn near_identical_dark_png(path: &PathBuf, tweak: u8) {
        let mut image = RgbImage::from_pixel(64, 64, Rgb([12, 12, 12]));
        image.put_pixel(0, 0, Rgb([12 + tweak, 12, 12]));
        image.save(path).unwrap();
    }

    fn white_png(path: &PathBuf) {
        RgbImage::from_pixel(64, 64, Rgb([250, 250, 250]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn oversized_cluster_is_rejected_whole_and_the_outlier_survives() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..12u8 {
            near_identical_dark_png(&dir.path().join(format!("dark_{:02}.png", i)), i);
        }
        white_png(&dir.path().join("unique.png"));

        let sink = RejectionSink::create(dir.path()).unwrap();
        let outcome = curate_directory(
            dir.path(),
            &CurationParams::default(),
            &LumaGridEmbedder::default(),
            &sink,
        )
        .unwrap();

        assert_eq!(outcome.clusters, 1);
        assert_eq!(outcome.outliers, 1);
        assert_eq!(outcome.rejected, 12);

        let survivors = crate::utils::list_image_files(dir.path()).unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].file_name().unwrap(), "unique.png");

        let rejected = crate::utils::list_image_files(&dir.path().join("rejected")).unwrap();
        assert_eq!(rejected.len(), 12);
    }

    #[test]
    fn clusters_within_the_size_bound_are_retained() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5u8 {
            near_identical_dark_png(&dir.path().join(format!("dark_{:02}.png", i)), i);
        }

        let sink = RejectionSink::create(dir.path()).unwrap();
        let outcome = curate_directory(
            dir.path(),
            &CurationParams::default(),
            &LumaGridEmbedder::default(),
            &sink,
        )
        .unwrap();

        assert_eq!(outcome.clusters, 1);
        assert_eq!(outcome.rejected, 0);
        assert_eq!(crate::utils::list_image_files(dir.path()).unwrap().len(), 5);
    }

    #[test]
    fn insufficient_population_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        white_png(&dir.path().join("only.png"));

        let sink = RejectionSink::create(dir.path()).unwrap();
        let outcome = curate_directory(
            dir.path(),
            &CurationParams::default(),
            &LumaGridEmbedder::default(),
            &sink,
        )
        .unwrap();

        assert_eq!(outcome.embedded, 0);
        assert_eq!(outcome.rejected, 0);
        assert!(dir.path().join("only.png").exists());
    }
}
