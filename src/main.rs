use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::time::Duration;

use stillsift::capability::{LumaGridEmbedder, NullDetector};
use stillsift::captions::validate_captions;
use stillsift::common::{
    CURRENT_NUM_THREADS, DEFAULT_BLUR_THRESHOLD, DEFAULT_CLUSTER_EPS, DEFAULT_DECODE_TIMEOUT_SECS,
    DEFAULT_MAX_CLUSTER_SIZE, DEFAULT_MIN_CLUSTER_SIZE, DEFAULT_MIN_RESOLUTION,
    DEFAULT_SCENE_THRESHOLD, WATCH_RUNTIME,
};
use stillsift::curation::novelty::{CurationParams, curate_directory};
use stillsift::curation::quality::{QualityThresholds, run_quality_gate};
use stillsift::curation::sink::RejectionSink;
use stillsift::curation::dedup::deduplicate_directory;
use stillsift::ingest::extract::NormalizeOptions;
use stillsift::ingest::watcher::{WatchConfig, watch_and_ingest};
use stillsift::models::ontology::load_ontology;
use stillsift::pipeline::{ingest_path, run_filter_stages};

#[derive(Parser, Debug)]
#[command(name = "stillsift")]
#[command(about = "Curates dropped media into distinct, in-focus still images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch a drop directory and normalize every new file as it arrives
    Watch {
        /// Directory to watch for dropped media
        drop_dir: PathBuf,
        /// Directory receiving normalized assets
        #[arg(long)]
        processed_dir: PathBuf,
        /// Scene-change threshold in [0.0, 1.0]; lower detects more scenes
        #[arg(long, default_value_t = DEFAULT_SCENE_THRESHOLD)]
        scene_threshold: f64,
        /// Concurrent normalizer workers
        #[arg(long)]
        workers: Option<usize>,
        /// Bound on a single video decode invocation
        #[arg(long, default_value_t = DEFAULT_DECODE_TIMEOUT_SECS)]
        decode_timeout_secs: u64,
    },
    /// Normalize one file, or every file in a directory, then exit
    Ingest {
        /// Source file or directory of dropped media
        source: PathBuf,
        #[arg(long)]
        processed_dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_SCENE_THRESHOLD)]
        scene_threshold: f64,
        #[arg(long, default_value_t = DEFAULT_DECODE_TIMEOUT_SECS)]
        decode_timeout_secs: u64,
    },
    /// Remove perceptual duplicates from a directory of assets
    Dedup {
        directory: PathBuf,
    },
    /// Reject low-resolution, blurry, or detector-flagged assets
    Quality {
        directory: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MIN_RESOLUTION)]
        min_resolution: u32,
        #[arg(long, default_value_t = DEFAULT_BLUR_THRESHOLD)]
        blur_threshold: f64,
    },
    /// Reject overrepresented visual clusters, keeping outliers
    Curate {
        directory: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MAX_CLUSTER_SIZE)]
        max_cluster_size: usize,
        #[arg(long, default_value_t = DEFAULT_MIN_CLUSTER_SIZE)]
        min_cluster_size: usize,
        #[arg(long, default_value_t = DEFAULT_CLUSTER_EPS)]
        cluster_eps: f32,
    },
    /// Run dedup, quality, and curate over a directory in one pass
    Filter {
        directory: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MIN_RESOLUTION)]
        min_resolution: u32,
        #[arg(long, default_value_t = DEFAULT_BLUR_THRESHOLD)]
        blur_threshold: f64,
        #[arg(long, default_value_t = DEFAULT_MAX_CLUSTER_SIZE)]
        max_cluster_size: usize,
        #[arg(long, default_value_t = DEFAULT_MIN_CLUSTER_SIZE)]
        min_cluster_size: usize,
        #[arg(long, default_value_t = DEFAULT_CLUSTER_EPS)]
        cluster_eps: f32,
    },
    /// Load and validate an ontology document
    CheckOntology {
        ontology: PathBuf,
    },
    /// Validate sidecar captions against an ontology
    CheckCaptions {
        directory: PathBuf,
        #[arg(long)]
        ontology: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Watch {
            drop_dir,
            processed_dir,
            scene_threshold,
            workers,
            decode_timeout_secs,
        } => {
            let config = WatchConfig {
                drop_dir,
                processed_dir,
                workers: workers.unwrap_or_else(|| (*CURRENT_NUM_THREADS).max(1)),
                normalize: NormalizeOptions {
                    scene_threshold,
                    decode_timeout: Duration::from_secs(decode_timeout_secs),
                },
            };
            WATCH_RUNTIME.block_on(watch_and_ingest(config))
        }
        Command::Ingest {
            source,
            processed_dir,
            scene_threshold,
            decode_timeout_secs,
        } => {
            let options = NormalizeOptions {
                scene_threshold,
                decode_timeout: Duration::from_secs(decode_timeout_secs),
            };
            let assets = ingest_path(&source, &processed_dir, &options)?;
            info!("produced {} asset(s) in {:?}", assets.len(), processed_dir);
            Ok(())
        }
        Command::Dedup { directory } => {
            let outcome = deduplicate_directory(&directory)?;
            info!(
                "scan complete: removed {} duplicate(s) of {} scanned",
                outcome.removed, outcome.scanned
            );
            Ok(())
        }
        Command::Quality {
            directory,
            min_resolution,
            blur_threshold,
        } => {
            let sink = RejectionSink::create(&directory)?;
            let thresholds = QualityThresholds {
                min_resolution,
                blur_threshold,
            };
            run_quality_gate(&directory, &thresholds, &NullDetector, &sink)?;
            Ok(())
        }
        Command::Curate {
            directory,
            max_cluster_size,
            min_cluster_size,
            cluster_eps,
        } => {
            let sink = RejectionSink::create(&directory)?;
            let params = CurationParams {
                max_cluster_size,
                min_cluster_size,
                cluster_eps,
            };
            curate_directory(&directory, &params, &LumaGridEmbedder::default(), &sink)?;
            Ok(())
        }
        Command::Filter {
            directory,
            min_resolution,
            blur_threshold,
            max_cluster_size,
            min_cluster_size,
            cluster_eps,
        } => {
            let thresholds = QualityThresholds {
                min_resolution,
                blur_threshold,
            };
            let params = CurationParams {
                max_cluster_size,
                min_cluster_size,
                cluster_eps,
            };
            run_filter_stages(
                &directory,
                &thresholds,
                &params,
                &LumaGridEmbedder::default(),
                &NullDetector,
            )
        }
        Command::CheckOntology { ontology } => {
            let document = load_ontology(&ontology)?;
            info!(
                "ontology v{} loaded: {} bucket(s), {} token(s)",
                document.version,
                document.buckets.len(),
                document.all_tokens().len()
            );
            Ok(())
        }
        Command::CheckCaptions {
            directory,
            ontology,
        } => {
            let document = load_ontology(&ontology)?;
            let violations = validate_captions(&directory, &document)?;
            if violations.is_empty() {
                info!("all captions are well-formed");
                Ok(())
            } else {
                for violation in &violations {
                    error!("{}", violation);
                }
                error!("caption validation failed with {} error(s)", violations.len());
                std::process::exit(1);
            }
        }
    }
}
