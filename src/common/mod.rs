pub mod errors;

pub const DEFAULT_SCENE_THRESHOLD: f64 = 0.4;

pub const DEFAULT_MIN_RESOLUTION: u32 = 1280;

pub const DEFAULT_BLUR_THRESHOLD: f64 = 100.0;

pub const DEFAULT_MAX_CLUSTER_SIZE: usize = 10;

pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 2;

pub const DEFAULT_CLUSTER_EPS: f32 = 0.5;

pub const DEFAULT_DECODE_TIMEOUT_SECS: u64 = 120;

/// Capacity of the watcher's notification queue; senders block once it
/// fills, which is the backpressure point of the ingest path.
pub const WATCH_QUEUE_CAPACITY: usize = 256;

pub const VIDEO_MIME_TYPES: &'static [&'static str] =
    &["video/mp4", "video/quicktime", "video/x-matroska"];

pub const IMAGE_MIME_TYPES: &'static [&'static str] =
    &["image/jpeg", "image/png", "image/webp"];

/// Extensions an already-normalized asset directory may contain. Listing
/// order for batch passes is lexical by file name, not by this table.
pub const ASSET_EXTENSIONS: &'static [&'static str] = &["jpg", "jpeg", "png", "webp"];

pub const REJECTED_DIR_NAME: &str = "rejected";

pub const REJECTION_LEDGER_NAME: &str = "rejections.jsonl";

use std::sync::LazyLock;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::runtime::{Builder, Runtime};

pub static CURRENT_NUM_THREADS: LazyLock<usize> = LazyLock::new(|| rayon::current_num_threads());

// Watcher-specific Tokio Runtime
// This runtime handles folder watching, dispatch, and worker handoff; the
// normalizer itself runs on blocking threads so extraction never stalls
// event delivery.
pub static WATCH_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("watch-worker")
        .enable_all()
        .build()
        .expect("Failed to build watch Tokio runtime")
});

// Rayon thread pool for compute-intensive batch work (fingerprinting,
// embedding). It does not create a global Rayon pool, so it does not
// interfere with other threads.
pub static CURATION_RAYON_POOL: LazyLock<ThreadPool> = LazyLock::new(|| {
    ThreadPoolBuilder::new()
        .num_threads(*CURRENT_NUM_THREADS)
        .thread_name(|i| format!("curation-worker-{}", i))
        .build()
        .expect("Failed to build curation Rayon pool")
});
