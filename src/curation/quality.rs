//! Quality gate - resolution, sharpness, and content checks in a fixed
//! short-circuit order.
//!
//! The order is cheap-to-expensive (header read, full decode, detector
//! inference) and is also a behavioral contract: an asset failing several
//! gates is reported only for the first. Unreadable images are logged and
//! left in place, counting as neither pass nor fail.

use anyhow::Result;
use log::{info, warn};
use std::path::Path;

use crate::capability::ContentDetector;
use crate::models::asset::{Asset, RejectReason, Stage};
use crate::curation::sink::RejectionSink;
use crate::utils::list_image_files;

const STAGE_NAME: &str = "quality";

#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    /// An asset fails only when width AND height are both below this, so a
    /// very wide, short image still passes.
    pub min_resolution: u32,
    /// Minimum Laplacian-variance sharpness score.
    pub blur_threshold: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_resolution: crate::common::DEFAULT_MIN_RESOLUTION,
            blur_threshold: crate::common::DEFAULT_BLUR_THRESHOLD,
        }
    }
}

#[derive(Debug, Default)]
pub struct QualityOutcome {
    pub evaluated: usize,
    pub rejected: usize,
    pub skipped: usize,
}

pub fn run_quality_gate(
    dir: &Path,
    thresholds: &QualityThresholds,
    detector: &dyn ContentDetector,
    sink: &RejectionSink,
) -> Result<QualityOutcome> {
    let files = list_image_files(dir)?;
    let mut outcome = QualityOutcome {
        evaluated: files.len(),
        ..Default::default()
    };
    info!("running quality gate over {} asset(s) in {:?}", files.len(), dir);

    for file in files {
        let mut asset = Asset::from_existing(file);

        // Gate 1: resolution, from the header alone.
        let (width, height) = match asset.dimensions() {
            Ok(dims) => dims,
            Err(err) => {
                warn!("could not read {:?}; leaving in place: {err:#}", asset.path());
                outcome.skipped += 1;
                continue;
            }
        };
        if width < thresholds.min_resolution && height < thresholds.min_resolution {
            reject(&mut asset, RejectReason::LowResolution, sink)?;
            outcome.rejected += 1;
            continue;
        }

        // Gate 2: sharpness, needs the full decode.
        let image = match asset.decode() {
            Ok(image) => image,
            Err(err) => {
                warn!("could not decode {:?}; leaving in place: {err:#}", asset.path());
                outcome.skipped += 1;
                continue;
            }
        };
        let sharpness = laplacian_variance(&image.to_luma8());
        if sharpness < thresholds.blur_threshold {
            reject(&mut asset, RejectReason::Blurry, sink)?;
            outcome.rejected += 1;
            continue;
        }

        // Gate 3: content detector.
        match detector.detect(&image) {
            Ok(regions) if !regions.is_empty() => {
                reject(&mut asset, RejectReason::DetectedContent, sink)?;
                outcome.rejected += 1;
            }
            Ok(_) => asset.set_stage(Stage::QualityChecked),
            Err(err) => {
                warn!(
                    "detector failed on {:?}; leaving in place: {err:#}",
                    asset.path()
                );
                outcome.skipped += 1;
            }
        }
    }

    info!(
        "quality gate rejected {} of {} asset(s)",
        outcome.rejected, outcome.evaluated
    );
    Ok(outcome)
}

fn reject(asset: &mut Asset, reason: RejectReason, sink: &RejectionSink) -> Result<()> {
    sink.reject(asset.path(), reason, STAGE_NAME)?;
    asset.set_stage(Stage::Rejected(reason));
    Ok(())
}

/// Variance of the 3x3 Laplacian over a grayscale image. Sharp images carry
/// more high-frequency edge content and score higher.
pub fn laplacian_variance(image: &image::GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut values = Vec::with_capacity(((width - 2) * (height - 2)) as usize);
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = i32::from(image.get_pixel(x, y)[0]);
            let top = i32::from(image.get_pixel(x, y - 1)[0]);
            let bottom = i32::from(image.get_pixel(x, y + 1)[0]);
            let left = i32::from(image.get_pixel(x - 1, y)[0]);
            let right = i32::from(image.get_pixel(x + 1, y)[0]);
            values.push(f64::from(top + bottom + left + right - 4 * center));
        }
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}
