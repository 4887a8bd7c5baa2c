//! Source normalization - turns a dropped media file into still-image assets.
//!
//! Includes:
//! - Copy-through for recognized image kinds
//! - Scene-change frame extraction for video via an external ffmpeg process
//! - Bounded-time subprocess supervision with forced termination
//! - Staged frame writes promoted into the target directory by atomic rename
//!
//! The source file is consumed (deleted) only after every derived asset is
//! durably in the target directory; any failure leaves it in place.

use anyhow::{Context, Result};
use log::{info, warn};
use std::{
    fs,
    io::{BufReader, Read},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};
use uuid::Uuid;

use crate::common::DEFAULT_DECODE_TIMEOUT_SECS;
use crate::common::DEFAULT_SCENE_THRESHOLD;
use crate::common::errors::PipelineError;
use crate::ingest::sniff::{MediaKind, sniff_media_kind};
use crate::models::asset::{Asset, AssetOrigin};

const CHILD_POLL_INTERVAL_MS: u64 = 50;
const STDERR_TAIL_CHARS: usize = 400;

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Scene-change score in `[0.0, 1.0]` above which a frame is extracted;
    /// lower detects more scenes.
    pub scene_threshold: f64,
    /// Bound on a single ffmpeg invocation. On expiry the child is killed
    /// and the extraction reported as failed.
    pub decode_timeout: Duration,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            scene_threshold: DEFAULT_SCENE_THRESHOLD,
            decode_timeout: Duration::from_secs(DEFAULT_DECODE_TIMEOUT_SECS),
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Public API
// ────────────────────────────────────────────────────────────────

/// Normalize one dropped source file into assets inside `target_dir`.
///
/// Classification is by content. Images yield a single copied asset; videos
/// yield one asset per detected scene change. On any error the source file
/// is preserved for manual triage.
pub fn normalize_source(
    source: &Path,
    target_dir: &Path,
    options: &NormalizeOptions,
) -> Result<Vec<Asset>> {
    fs::create_dir_all(target_dir)
        .context(format!("failed to create target directory {:?}", target_dir))?;

    match sniff_media_kind(source)? {
        MediaKind::Image => {
            let asset = copy_image(source, target_dir)?;
            fs::remove_file(source)
                .context(format!("failed to remove consumed source {:?}", source))?;
            Ok(vec![asset])
        }
        MediaKind::Video => {
            let assets = extract_scene_frames(source, target_dir, options)?;
            // Only a successful extraction may consume the source; zero
            // detected scenes still counts as success.
            fs::remove_file(source)
                .context(format!("failed to remove consumed source {:?}", source))?;
            info!(
                "extracted {} frame(s) from {:?} at threshold {}",
                assets.len(),
                source,
                options.scene_threshold
            );
            Ok(assets)
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Image Path
// ────────────────────────────────────────────────────────────────

fn copy_image(source: &Path, target_dir: &Path) -> Result<Asset> {
    let file_name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("source {:?} has no file name", source))?;
    let mut destination = target_dir.join(file_name);

    // A later drop with the same name must not clobber an earlier asset.
    if destination.exists() {
        destination = target_dir.join(disambiguated_name(source));
        warn!(
            "name collision for {:?}; storing as {:?}",
            file_name, destination
        );
    }

    fs::copy(source, &destination).context(format!(
        "failed to copy {:?} into {:?}",
        source, destination
    ))?;

    Ok(Asset::new(destination, AssetOrigin::Image))
}

fn disambiguated_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = source
        .extension()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let tag = Uuid::new_v4().simple().to_string();
    if ext.is_empty() {
        format!("{}-{}", stem, &tag[..8])
    } else {
        format!("{}-{}.{}", stem, &tag[..8], ext)
    }
}

// ────────────────────────────────────────────────────────────────
// Video Path
// ────────────────────────────────────────────────────────────────

fn extract_scene_frames(
    source: &Path,
    target_dir: &Path,
    options: &NormalizeOptions,
) -> Result<Vec<Asset>> {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "frame".to_string());

    // Frames land in a hidden staging directory first, then move into the
    // scanned target by rename, so a concurrent batch pass never observes a
    // half-written frame.
    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(target_dir)
        .context(format!("failed to create staging directory in {:?}", target_dir))?;

    run_scene_extraction(source, staging.path(), &stem, options)?;
    promote_frames(staging.path(), target_dir, &stem)
}

fn run_scene_extraction(
    source: &Path,
    staging_dir: &Path,
    stem: &str,
    options: &NormalizeOptions,
) -> Result<()> {
    let filter = format!("select=gt(scene\\,{})", options.scene_threshold);
    let pattern = staging_dir.join(format!("{}_%05d.png", stem));
    let input = source.to_string_lossy();
    let output = pattern.to_string_lossy();

    let mut cmd = create_silent_ffmpeg_command();
    cmd.args([
        "-y",
        "-i",
        input.as_ref(),
        "-vf",
        filter.as_str(),
        "-vsync",
        "vfr",
        "-qscale:v",
        "2",
        output.as_ref(),
    ]);

    let mut child = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| PipelineError::Extraction {
            path: source.to_path_buf(),
            reason: format!("failed to spawn ffmpeg: {}", e),
        })?;

    // Drain stderr on a separate thread so a chatty child cannot fill the
    // pipe and deadlock against our wait loop.
    let stderr_reader = child.stderr.take().map(|stderr| {
        thread::spawn(move || {
            let mut buffer = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut buffer);
            buffer
        })
    });

    let status = match wait_with_timeout(&mut child, options.decode_timeout)
        .context("failed while waiting for ffmpeg")?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PipelineError::Extraction {
                path: source.to_path_buf(),
                reason: format!(
                    "ffmpeg exceeded the {}s decode timeout and was killed",
                    options.decode_timeout.as_secs()
                ),
            }
            .into());
        }
    };

    let stderr_text = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if !status.success() {
        return Err(PipelineError::Extraction {
            path: source.to_path_buf(),
            reason: format!(
                "ffmpeg exited with {}: {}",
                status.code().unwrap_or(-1),
                tail(&stderr_text, STDERR_TAIL_CHARS)
            ),
        }
        .into());
    }

    Ok(())
}

/// Move extracted frames from staging into the target directory, returning
/// assets in increasing sequence order.
fn promote_frames(staging_dir: &Path, target_dir: &Path, stem: &str) -> Result<Vec<Asset>> {
    let prefix = format!("{}_", stem);
    let mut names: Vec<String> = fs::read_dir(staging_dir)
        .context(format!("failed to read staging directory {:?}", staging_dir))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(&prefix) && name.ends_with(".png"))
        .collect();
    names.sort();

    let mut assets = Vec::with_capacity(names.len());
    for name in names {
        let sequence = name
            .trim_start_matches(&prefix)
            .trim_end_matches(".png")
            .parse::<u32>()
            .context(format!("unexpected frame name {:?}", name))?;

        let destination = target_dir.join(&name);
        fs::rename(staging_dir.join(&name), &destination).context(format!(
            "failed to promote frame {:?} into {:?}",
            name, target_dir
        ))?;
        assets.push(Asset::new(destination, AssetOrigin::VideoFrame { sequence }));
    }

    Ok(assets)
}

// ────────────────────────────────────────────────────────────────
// Subprocess Supervision
// ────────────────────────────────────────────────────────────────

pub fn create_silent_ffmpeg_command() -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-hide_banner", "-nostats", "-nostdin"]);
    cmd
}

/// Poll the child until it exits or the timeout elapses. `None` means the
/// deadline passed with the child still running; the caller owns the kill.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("failed to poll child process")? {
            return Ok(Some(status));
        }
        if started.elapsed() >= timeout {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(CHILD_POLL_INTERVAL_MS));
    }
}

fn tail(text: &str, max_chars: usize) -> &str {
    let trimmed = text.trim();
    match trimmed.char_indices().nth_back(max_chars.saturating_sub(1)) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(path: &Path, luma: u8) {
        RgbImage::from_pixel(16, 16, Rgb([luma, luma, luma]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn image_source_is_copied_and_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let drop_dir = dir.path().join("drop");
        let processed = dir.path().join("processed");
        fs::create_dir_all(&drop_dir).unwrap();

        let source = drop_dir.join("shot.png");
        write_png(&source, 80);

        let assets =
            normalize_source(&source, &processed, &NormalizeOptions::default()).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].origin(), AssetOrigin::Image);
        assert!(processed.join("shot.png").exists());
        assert!(!source.exists(), "source must be consumed on success");
    }

    #[test]
    fn name_collisions_do_not_clobber_existing_assets() {
        let dir = tempfile::tempdir().unwrap();
        let drop_dir = dir.path().join("drop");
        let processed = dir.path().join("processed");
        fs::create_dir_all(&drop_dir).unwrap();
        fs::create_dir_all(&processed).unwrap();

        write_png(&processed.join("shot.png"), 10);
        let source = drop_dir.join("shot.png");
        write_png(&source, 200);

        let assets =
            normalize_source(&source, &processed, &NormalizeOptions::default()).unwrap();
        assert_eq!(assets.len(), 1);
        assert_ne!(assets[0].path(), processed.join("shot.png"));
        assert!(processed.join("shot.png").exists());
        assert!(assets[0].path().exists());
    }

    #[test]
    fn unsupported_content_preserves_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("mystery.dat");
        fs::write(&source, b"nothing recognizable in here").unwrap();

        let err = normalize_source(&source, &dir.path().join("out"), &NormalizeOptions::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::UnsupportedMediaType { .. })
        ));
        assert!(source.exists(), "unsupported source must be left untouched");
    }

    #[test]
    fn failed_extraction_preserves_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.mp4");

        // A plausible MP4 header followed by garbage: sniffed as video, but
        // undecodable, so the extraction must fail however far it gets.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&24u32.to_be_bytes());
        bytes.extend_from_slice(b"ftypisom");
        bytes.extend_from_slice(&[0u8; 256]);
        fs::write(&source, &bytes).unwrap();

        let err = normalize_source(&source, &dir.path().join("out"), &NormalizeOptions::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Extraction { .. })
        ));
        assert!(source.exists(), "failed extraction must preserve the source");
    }

    #[test]
    fn promoted_frames_are_ordered_by_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let target = dir.path().join("target");
        fs::create_dir_all(&staging).unwrap();
        fs::create_dir_all(&target).unwrap();

        for seq in [3u32, 1, 2] {
            write_png(&staging.join(format!("clip_{:05}.png", seq)), 50);
        }
        // An unrelated file in staging must be ignored.
        fs::write(staging.join("stray.txt"), b"x").unwrap();

        let assets = promote_frames(&staging, &target, "clip").unwrap();
        let sequences: Vec<_> = assets
            .iter()
            .map(|a| match a.origin() {
                AssetOrigin::VideoFrame { sequence } => sequence,
                other => panic!("unexpected origin {:?}", other),
            })
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(target.join("clip_00001.png").exists());
        assert!(target.join("clip_00003.png").exists());
        assert!(!staging.join("clip_00001.png").exists());
    }

    #[cfg(unix)]
    #[test]
    fn wait_with_timeout_reports_an_overrunning_child() {
        let mut child = Command::new("sleep")
            .arg("5")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let outcome = wait_with_timeout(&mut child, Duration::from_millis(200)).unwrap();
        assert!(outcome.is_none());
        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn stderr_tail_keeps_the_last_characters() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 10), "ab");
        assert_eq!(tail("  spaced  ", 10), "spaced");
    }
}
