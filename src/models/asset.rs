//! Asset model - a single still image moving through the curation lifecycle.
//!
//! Dimensions, the perceptual fingerprint, and the embedding vector are all
//! computed lazily and cached on first access, so cheap gates never pay for
//! expensive work they short-circuit past.

use anyhow::Result;
use image::{DynamicImage, ImageReader};
use image_hasher::HasherConfig;
use std::path::{Path, PathBuf};

use crate::capability::ImageEmbedder;
use crate::common::errors::PipelineError;
use crate::utils::PathExt;

/// How the asset entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOrigin {
    /// Copied through from a dropped source image.
    Image,
    /// Extracted from a dropped video at the given scene sequence number.
    VideoFrame { sequence: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Duplicate,
    LowResolution,
    Blurry,
    DetectedContent,
    OverrepresentedCluster,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Duplicate => "duplicate",
            RejectReason::LowResolution => "low-resolution",
            RejectReason::Blurry => "blurry",
            RejectReason::DetectedContent => "detected-content",
            RejectReason::OverrepresentedCluster => "overrepresented-cluster",
        }
    }
}

/// Lifecycle stage. `Rejected` is terminal; everything else advances in
/// order as the asset survives each filter pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingested,
    Deduped,
    QualityChecked,
    Curated,
    Rejected(RejectReason),
}

#[derive(Debug)]
pub struct Asset {
    path: PathBuf,
    origin: AssetOrigin,
    stage: Stage,
    dimensions: Option<(u32, u32)>,
    fingerprint: Option<Vec<u8>>,
    embedding: Option<Vec<f32>>,
}

impl Asset {
    pub fn new(path: impl Into<PathBuf>, origin: AssetOrigin) -> Self {
        Self {
            path: path.into(),
            origin,
            stage: Stage::Ingested,
            dimensions: None,
            fingerprint: None,
            embedding: None,
        }
    }

    /// Rebuild an asset record from a file already sitting in a working
    /// directory. A `{stem}_NNNNN.png` name marks an extracted video frame;
    /// anything else is treated as a copied-through image.
    pub fn from_existing(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let origin = frame_sequence_of(&path)
            .map(|sequence| AssetOrigin::VideoFrame { sequence })
            .unwrap_or(AssetOrigin::Image);
        Self::new(path, origin)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> AssetOrigin {
        self.origin
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    /// `(width, height)` read from the image header without a full decode.
    pub fn dimensions(&mut self) -> Result<(u32, u32)> {
        if let Some(dims) = self.dimensions {
            return Ok(dims);
        }
        let dims = ImageReader::open(&self.path)
            .map_err(|e| self.read_error(image::ImageError::IoError(e)))?
            .with_guessed_format()
            .map_err(|e| self.read_error(image::ImageError::IoError(e)))?
            .into_dimensions()
            .map_err(|e| self.read_error(e))?;
        self.dimensions = Some(dims);
        Ok(dims)
    }

    /// Full decode. Format is sniffed from the leading bytes, not the
    /// extension, matching how sources are classified at ingest.
    pub fn decode(&self) -> Result<DynamicImage> {
        let image = ImageReader::open(&self.path)
            .map_err(|e| self.read_error(image::ImageError::IoError(e)))?
            .with_guessed_format()
            .map_err(|e| self.read_error(image::ImageError::IoError(e)))?
            .decode()
            .map_err(|e| self.read_error(e))?;
        Ok(image)
    }

    /// Perceptual fingerprint bytes, computed once per asset.
    pub fn fingerprint(&mut self) -> Result<&[u8]> {
        if self.fingerprint.is_none() {
            let image = self.decode()?;
            self.fingerprint = Some(compute_fingerprint(&image));
        }
        Ok(self.fingerprint.as_deref().expect("fingerprint just cached"))
    }

    pub fn cached_fingerprint(&self) -> Option<&[u8]> {
        self.fingerprint.as_deref()
    }

    /// Embedding vector via the injected capability, computed once per asset.
    pub fn embedding(&mut self, embedder: &dyn ImageEmbedder) -> Result<&[f32]> {
        if self.embedding.is_none() {
            let image = self.decode()?;
            self.embedding = Some(embedder.embed(&image)?);
        }
        Ok(self.embedding.as_deref().expect("embedding just cached"))
    }

    pub fn cached_embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    fn read_error(&self, source: image::ImageError) -> anyhow::Error {
        PipelineError::AssetRead {
            path: self.path.clone(),
            source,
        }
        .into()
    }
}

/// Compute the perceptual fingerprint of a decoded image. Stable under
/// re-encoding of the same visual content, unstable under different content.
pub fn compute_fingerprint(image: &DynamicImage) -> Vec<u8> {
    let hasher = HasherConfig::new().to_hasher();
    let hash = hasher.hash_image(image);
    hash.as_bytes().to_vec()
}

fn frame_sequence_of(path: &Path) -> Option<u32> {
    if path.ext_lower() != "png" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (_, suffix) = stem.rsplit_once('_')?;
    if suffix.len() != 5 {
        return None;
    }
    suffix.parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_names_round_trip_to_video_frame_origin() {
        let asset = Asset::from_existing("out/clip_00003.png");
        assert_eq!(asset.origin(), AssetOrigin::VideoFrame { sequence: 3 });

        let asset = Asset::from_existing("out/holiday.jpg");
        assert_eq!(asset.origin(), AssetOrigin::Image);

        // Underscore without the five-digit suffix is just a file name.
        let asset = Asset::from_existing("out/my_photo.png");
        assert_eq!(asset.origin(), AssetOrigin::Image);
    }

    #[test]
    fn identical_content_yields_identical_fingerprints() {
        let image = DynamicImage::new_rgb8(64, 64);
        assert_eq!(compute_fingerprint(&image), compute_fingerprint(&image));
    }

    #[test]
    fn unreadable_asset_surfaces_asset_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image at all").unwrap();

        let mut asset = Asset::from_existing(&path);
        let err = asset.fingerprint().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::AssetRead { .. })
        ));
    }
}
