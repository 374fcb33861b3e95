//! Epoch Sampler Read Benchmark
//!
//! This binary runs a group of workers, one thread each, that read a shared
//! array file in shuffled, sharded batches for a number of epochs and report
//! per-epoch I/O throughput.
//!
//! # Usage
//!
//! ```bash
//! # Four workers, 32 samples per batch, shuffled every epoch
//! sampler-bench --input images.bin --workers 4 --batch-size 32 --shuffle
//!
//! # Rotate shards between epochs and simulate 50ms of compute per batch
//! sampler-bench --input images.bin --workers 4 --rank-shift 1 --compute 0.05
//!
//! # Start from a configuration file
//! sampler-bench --config sampler.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sampler_core::driver::{DriverOptions, EpochDriver, RunSummary};
use sampler_core::group::{LocalGroup, LocalMember, WorkerGroup};
use sampler_core::progress::{ConsoleProgress, NoProgress, ProgressSink};
use sampler_core::storage::{ArrayStore, LocalArrayStore};
use sampler_core::timing::TimingTable;
use sampler_core::{Result, RuntimeError, SamplerConfig, TransferMode};

/// Distributed epoch read benchmark
#[derive(Parser, Debug)]
#[command(name = "sampler-bench")]
#[command(about = "Reads a sharded array dataset in shuffled batches and reports I/O throughput")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Array file to read
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Samples per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Maximum batches per epoch
    #[arg(short = 'n', long)]
    num_batches: Option<usize>,

    /// Number of epochs
    #[arg(short, long)]
    epochs: Option<u64>,

    /// Reshuffle the samples every epoch
    #[arg(long)]
    shuffle: bool,

    /// Seed of the shuffle generator
    #[arg(long)]
    seed: Option<u64>,

    /// Shard rotation per epoch
    #[arg(long, allow_hyphen_values = true)]
    rank_shift: Option<i64>,

    /// Number of workers
    #[arg(short, long)]
    workers: Option<u32>,

    /// Simulated compute time per batch in seconds
    #[arg(long)]
    compute: Option<f64>,

    /// Synchronize all workers at the end of every epoch
    #[arg(long)]
    barrier: bool,

    /// Request collective transfers
    #[arg(long, conflicts_with = "independent")]
    collective: bool,

    /// Request independent transfers
    #[arg(long)]
    independent: bool,

    /// Memory each worker allocates before reading, in MiB
    #[arg(long)]
    memory_per_worker: Option<u64>,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Applies command-line values on top of a loaded configuration.
    fn apply(&self, mut config: SamplerConfig) -> SamplerConfig {
        if let Some(input) = &self.input {
            config.store.path = input.clone();
        }
        if self.collective {
            config.store.transfer_mode = TransferMode::Collective;
        } else if self.independent {
            config.store.transfer_mode = TransferMode::Independent;
        }

        if let Some(batch_size) = self.batch_size {
            config.sampling.batch_size = batch_size;
        }
        if let Some(num_batches) = self.num_batches {
            config.sampling.num_batches = num_batches;
        }
        if let Some(epochs) = self.epochs {
            config.sampling.epochs = epochs;
        }
        if self.shuffle {
            config.sampling.shuffle = true;
        }
        if let Some(seed) = self.seed {
            config.sampling.seed = seed;
        }
        if let Some(rank_shift) = self.rank_shift {
            config.sampling.rank_shift = rank_shift;
        }

        if let Some(workers) = self.workers {
            config.run.workers = workers;
        }
        if let Some(compute) = self.compute {
            config.run.compute_delay_seconds = compute;
        }
        if self.barrier {
            config.run.barrier_each_epoch = true;
        }
        if let Some(mib) = self.memory_per_worker {
            config.run.memory_per_worker_mib = mib;
        }
        if self.no_progress {
            config.run.progress = false;
        }
        config
    }
}

fn load_config(args: &Args) -> Result<SamplerConfig> {
    let config = match &args.config {
        Some(path) => SamplerConfig::from_file(path)?,
        None => SamplerConfig::default(),
    };
    let config = args.apply(config.with_env_overrides());
    config.validate()?;
    Ok(config)
}

fn run_worker(
    member: LocalMember,
    options: DriverOptions,
    store: Arc<dyn ArrayStore>,
    show_progress: bool,
) -> Result<RunSummary> {
    let progress: Box<dyn ProgressSink> = if show_progress && member.is_reporter() {
        Box::new(ConsoleProgress::stderr())
    } else {
        Box::new(NoProgress)
    };

    let group: Arc<dyn WorkerGroup> = Arc::new(member);
    let mut driver = EpochDriver::new(options, store, group.clone())?.with_progress(progress);
    if group.is_reporter() {
        driver.log_banner();
    }
    driver.run()
}

fn run(config: &SamplerConfig) -> Result<TimingTable> {
    let mut timing = TimingTable::new();

    timing.start("open");
    let store = Arc::new(LocalArrayStore::open(&config.store)?);
    timing.stop("open");
    tracing::info!(
        path = %store.path().display(),
        mapped = store.is_mapped(),
        "opened dataset"
    );

    let options = DriverOptions::from_config(config)?;
    let members = LocalGroup::new(config.run.workers)?;
    let show_progress = config.run.progress;

    let results: Vec<Result<RunSummary>> = thread::scope(|scope| {
        let handles: Vec<_> = members
            .into_iter()
            .map(|member| {
                let rank = member.rank();
                let store: Arc<dyn ArrayStore> = store.clone();
                let options = options.clone();
                let handle = thread::Builder::new()
                    .name(format!("worker-{rank}"))
                    .spawn_scoped(scope, move || {
                        run_worker(member, options, store, show_progress)
                    });
                (rank, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(rank, handle)| match handle {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    Err(RuntimeError::aborted(format!("worker {rank} panicked")))
                }),
                Err(e) => Err(RuntimeError::aborted(format!(
                    "failed to spawn worker {rank}: {e}"
                ))),
            })
            .collect()
    });

    timing.start("close");
    drop(store);
    timing.stop("close");

    let mut first_error: Option<RuntimeError> = None;
    for result in results {
        match result {
            Ok(summary) => timing.merge(&summary.timing),
            Err(e) => {
                // The root cause wins over the aborts it triggered in peers
                let replace = match &first_error {
                    None => true,
                    Some(current) => current.is_aborted() && !e.is_aborted(),
                };
                if replace {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(timing),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Starting epoch sampler benchmark");
    tracing::info!("  Input: {}", config.store.path.display());
    tracing::info!("  Workers: {}", config.run.workers);

    match run(&config) {
        Ok(timing) => {
            tracing::info!("====== timing (all workers) ======");
            timing.log_summary();
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("benchmark failed: {e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                tracing::error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
