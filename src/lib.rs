//! stillsift - turns arbitrary dropped media into a curated set of distinct,
//! in-focus, non-repetitive still images ready for downstream labeling.
//!
//! The pipeline is a folder watcher feeding a source normalizer (images are
//! copied through, videos become scene-change frames), followed by three
//! batch filter stages run cheapest-first over the processed directory:
//! perceptual deduplication, quality gating, and novelty curation.

pub mod capability;
pub mod captions;
pub mod common;
pub mod curation;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod utils;

pub use capability::{ContentDetector, ImageEmbedder, LumaGridEmbedder, NullDetector, Region};
pub use common::errors::PipelineError;
pub use curation::dedup::{DedupOutcome, deduplicate_directory};
pub use curation::novelty::{CurationOutcome, CurationParams, curate_directory};
pub use curation::quality::{QualityOutcome, QualityThresholds, run_quality_gate};
pub use curation::sink::RejectionSink;
pub use ingest::extract::{NormalizeOptions, normalize_source};
pub use ingest::watcher::{WatchConfig, watch_and_ingest};
pub use models::asset::{Asset, AssetOrigin, RejectReason, Stage};
pub use models::ontology::{Ontology, load_ontology};
