//! Folder watcher - event-driven ingestion of dropped media.
//!
//! Creation notifications arrive on the notify thread and are handed off
//! through a bounded channel to a semaphore-limited worker pool; the
//! normalizer itself runs on blocking threads, so a slow video extraction
//! never stalls detection of new arrivals. Files already sitting in the
//! drop directory at startup are recovered by an initial scan.

use anyhow::{Context, Result};
use dashmap::DashMap;
use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::{Semaphore, mpsc};
use walkdir::WalkDir;

use crate::common::WATCH_QUEUE_CAPACITY;
use crate::common::errors::{PipelineError, handle_error};
use crate::ingest::extract::{NormalizeOptions, normalize_source};
use crate::models::asset::Asset;
use crate::utils::wait_for_stable_size;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub drop_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub workers: usize,
    pub normalize: NormalizeOptions,
}

/// Normalize a single detected file. Waits for its size to settle first so
/// a producer still writing is never consumed half-way.
pub fn ingest_one(
    source: &Path,
    processed_dir: &Path,
    options: &NormalizeOptions,
) -> Result<Vec<Asset>> {
    if !source.exists() {
        // A duplicate notification for a path already consumed.
        debug!("skipping vanished path {:?}", source);
        return Ok(Vec::new());
    }
    wait_for_stable_size(source)?;
    normalize_source(source, processed_dir, options)
}

/// Watch the drop directory and feed every new file through the normalizer
/// exactly once, until ctrl-c.
pub async fn watch_and_ingest(config: WatchConfig) -> Result<()> {
    if config.processed_dir.starts_with(&config.drop_dir) {
        return Err(PipelineError::Configuration(format!(
            "processed directory {:?} must not live inside the watched directory {:?}",
            config.processed_dir, config.drop_dir
        ))
        .into());
    }

    fs::create_dir_all(&config.drop_dir)
        .context(format!("failed to create drop directory {:?}", config.drop_dir))?;
    fs::create_dir_all(&config.processed_dir).context(format!(
        "failed to create processed directory {:?}",
        config.processed_dir
    ))?;

    let (tx, mut rx) = mpsc::channel::<PathBuf>(WATCH_QUEUE_CAPACITY);

    // Start watching before the catch-up scan so nothing dropped in between
    // is missed; the in-flight set absorbs the overlap.
    let _watcher = spawn_fs_watcher(&config.drop_dir, tx.clone())?;
    let recovered = enqueue_existing(&config.drop_dir, &tx).await?;
    if recovered > 0 {
        info!(
            "recovered {} pre-existing file(s) from {:?}",
            recovered, config.drop_dir
        );
    }
    info!("watching {:?} for new files", config.drop_dir);

    let workers = config.workers.max(1);
    let permits = Arc::new(Semaphore::new(workers));
    let in_flight: Arc<DashMap<PathBuf, ()>> = Arc::new(DashMap::new());
    let processed_dir = Arc::new(config.processed_dir.clone());
    let options = Arc::new(config.normalize.clone());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested; draining in-flight work");
                break;
            }
            received = rx.recv() => match received {
                Some(path) => {
                    dispatch(path, &permits, &in_flight, &processed_dir, &options).await;
                }
                None => break,
            }
        }
    }

    // Wait for every worker permit to come back before returning.
    let _ = permits
        .acquire_many(workers as u32)
        .await
        .context("worker pool closed unexpectedly")?;
    Ok(())
}

async fn dispatch(
    path: PathBuf,
    permits: &Arc<Semaphore>,
    in_flight: &Arc<DashMap<PathBuf, ()>>,
    processed_dir: &Arc<PathBuf>,
    options: &Arc<NormalizeOptions>,
) {
    if in_flight.insert(path.clone(), ()).is_some() {
        debug!("{:?} already queued; ignoring duplicate notification", path);
        return;
    }

    let permit = permits
        .clone()
        .acquire_owned()
        .await
        .expect("worker semaphore closed");
    let in_flight = in_flight.clone();
    let processed_dir = processed_dir.clone();
    let options = options.clone();

    tokio::spawn(async move {
        let _permit = permit;
        let worker_path = path.clone();
        let joined = tokio::task::spawn_blocking(move || {
            ingest_one(&worker_path, &processed_dir, &options)
        })
        .await;

        match joined {
            Ok(Ok(assets)) if !assets.is_empty() => {
                info!("normalized {:?} into {} asset(s)", path, assets.len());
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => report_ingest_failure(&path, err),
            Err(join_err) => {
                let _ = handle_error(anyhow::anyhow!(
                    "normalizer worker for {:?} panicked: {}",
                    path,
                    join_err
                ));
            }
        }
        in_flight.remove(&path);
    });
}

/// Per-asset errors are recovered locally: the source file stays where it
/// is and ingestion continues.
pub fn report_ingest_failure(path: &Path, err: anyhow::Error) {
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::UnsupportedMediaType { detected, .. }) => {
            warn!(
                "skipping {:?} (unsupported media type `{}`); left in place for triage",
                path, detected
            );
        }
        Some(PipelineError::Extraction { reason, .. }) => {
            warn!("extraction failed for {:?}; source preserved: {}", path, reason);
        }
        _ => {
            let _ = handle_error(err.context(format!("failed to ingest {:?}", path)));
        }
    }
}

fn spawn_fs_watcher(drop_dir: &Path, tx: mpsc::Sender<PathBuf>) -> Result<RecommendedWatcher> {
    let mut watcher =
        notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_)) {
                    return;
                }
                for path in event.paths {
                    if path.is_file() {
                        // blocking_send applies queue backpressure to the
                        // notify thread once the channel is full.
                        if tx.blocking_send(path).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(err) => warn!("watch error: {}", err),
        })
        .context("failed to create filesystem watcher")?;

    watcher
        .watch(drop_dir, RecursiveMode::Recursive)
        .context(format!("failed to watch {:?}", drop_dir))?;
    Ok(watcher)
}

/// Queue every regular file already present under the drop directory.
async fn enqueue_existing(drop_dir: &Path, tx: &mpsc::Sender<PathBuf>) -> Result<usize> {
    let mut queued = 0;
    for entry in WalkDir::new(drop_dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            tx.send(entry.into_path())
                .await
                .context("notification queue closed during catch-up scan")?;
            queued += 1;
        }
    }
    Ok(queued)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn catch_up_scan_queues_existing_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.jpg"), b"y").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let queued = enqueue_existing(dir.path(), &tx).await.unwrap();
        assert_eq!(queued, 2);

        let mut received = Vec::new();
        while let Ok(path) = rx.try_recv() {
            received.push(path);
        }
        assert_eq!(received.len(), 2);
        assert!(received.iter().all(|p| p.is_file()));
    }

    #[tokio::test]
    async fn nested_processed_directory_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let config = WatchConfig {
            drop_dir: dir.path().to_path_buf(),
            processed_dir: dir.path().join("processed"),
            workers: 1,
            normalize: NormalizeOptions::default(),
        };

        let err = watch_and_ingest(config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn ingest_one_tolerates_vanished_paths() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("never-existed.png");
        let assets =
            ingest_one(&gone, dir.path(), &NormalizeOptions::default()).unwrap();
        assert!(assets.is_empty());
    }
}
