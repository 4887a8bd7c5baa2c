//! Error taxonomy for the curation pipeline.
//!
//! Per-asset failures (`UnsupportedMediaType`, `Extraction`, `AssetRead`) are
//! recovered locally by the stage that hits them; `Configuration` failures are
//! fatal and must surface before any asset processing begins.

use log::error;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The file's content matched no recognized image or video kind.
    /// The source file is preserved untouched for manual triage.
    #[error("unsupported media type `{detected}` for {path:?}")]
    UnsupportedMediaType { path: PathBuf, detected: String },

    /// The external video decode failed or exceeded its time bound.
    /// Zero assets were produced and the source file was preserved.
    #[error("frame extraction failed for {path:?}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// A single asset's bytes could not be read or decoded during a
    /// filter pass. The asset is left in place and the batch continues.
    #[error("could not decode asset {path:?}")]
    AssetRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Malformed ontology document, empty bucket, missing model file, and
    /// the like. Aborts the run before any asset is touched.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Log an error chain and hand it back, so call sites can both record and
/// propagate with one combinator.
pub fn handle_error(err: anyhow::Error) -> anyhow::Error {
    error!("{err:?}");
    err
}
