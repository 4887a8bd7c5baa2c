//! Media kind detection by content, never by extension.

use anyhow::{Context, Result};
use std::path::Path;

use crate::common::errors::PipelineError;
use crate::common::{IMAGE_MIME_TYPES, VIDEO_MIME_TYPES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Classify a source file by its magic bytes. Unrecognized content is an
/// `UnsupportedMediaType` error; the caller must leave the file untouched.
pub fn sniff_media_kind(path: &Path) -> Result<MediaKind> {
    let detected = infer::get_from_path(path)
        .context(format!("failed to read leading bytes of {:?}", path))?;

    match detected {
        Some(kind) if IMAGE_MIME_TYPES.contains(&kind.mime_type()) => Ok(MediaKind::Image),
        Some(kind) if VIDEO_MIME_TYPES.contains(&kind.mime_type()) => Ok(MediaKind::Video),
        other => Err(PipelineError::UnsupportedMediaType {
            path: path.to_path_buf(),
            detected: other
                .map(|kind| kind.mime_type().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }
        .into()),
    }
}
