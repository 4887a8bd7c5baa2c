//! Capability interfaces - the externally supplied functions the curation
//! stages depend on without owning their implementations.
//!
//! The quality gate takes a `ContentDetector`, the novelty curator takes an
//! `ImageEmbedder`. Swapping in a model-backed implementation changes which
//! assets survive but never touches the stage logic itself.

use anyhow::Result;
use image::DynamicImage;
use image::imageops::FilterType;

/// Axis-aligned region reported by a content detector, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Maps an image to a fixed-length vector in which visually similar images
/// land close together under euclidean distance.
pub trait ImageEmbedder: Send + Sync {
    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>>;

    /// Dimensionality of the produced vectors.
    fn dimension(&self) -> usize;
}

/// Finds instances of the undesired subject class. Any returned region
/// fails the asset at the content gate.
pub trait ContentDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Region>>;
}

/// Built-in embedder: the image resampled to a small grayscale grid, one
/// component per cell scaled to `[0, 1]`. Coarse, but model-free, and it
/// separates flat-different-brightness images where a normalized vector
/// would collapse them.
pub struct LumaGridEmbedder {
    grid: u32,
}

impl LumaGridEmbedder {
    pub fn new(grid: u32) -> Self {
        Self { grid: grid.max(1) }
    }
}

impl Default for LumaGridEmbedder {
    fn default() -> Self {
        Self::new(16)
    }
}

impl ImageEmbedder for LumaGridEmbedder {
    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let small = image
            .resize_exact(self.grid, self.grid, FilterType::Triangle)
            .to_luma8();
        Ok(small.pixels().map(|p| f32::from(p[0]) / 255.0).collect())
    }

    fn dimension(&self) -> usize {
        (self.grid * self.grid) as usize
    }
}

/// Detector that never reports a region. The default when no subject-class
/// exclusion is configured.
pub struct NullDetector;

impl ContentDetector for NullDetector {
    fn detect(&self, _image: &DynamicImage) -> Result<Vec<Region>> {
        Ok(Vec::new())
    }
}
