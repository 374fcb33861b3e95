// sampler-core/src/config.rs

//! Configuration management for the epoch sampler.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, RuntimeError};
use crate::sampling::RemainderPolicy;

// Top-level sampler configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub store: StoreConfig,
    pub sampling: SamplingConfig,
    pub run: RunConfig,
}

/// How the store moves data for a read request.
///
/// Chosen once at startup and fixed for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Let the store pick.
    #[default]
    Default,
    /// All workers participate in every transfer.
    Collective,
    /// Each worker transfers on its own.
    Independent,
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransferMode::Default => "default",
            TransferMode::Collective => "collective",
            TransferMode::Independent => "independent",
        };
        f.write_str(name)
    }
}

impl FromStr for TransferMode {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "default" => Ok(TransferMode::Default),
            "collective" => Ok(TransferMode::Collective),
            "independent" => Ok(TransferMode::Independent),
            _ => Err(RuntimeError::config(format!(
                "unknown transfer mode: '{s}'. Expected 'default', 'collective', or 'independent'"
            ))),
        }
    }
}

// Backing store options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    // Path to the array file.
    pub path: PathBuf,
    // Whether to use memory-mapped I/O.
    pub use_mmap: bool,
    // File size threshold (bytes) above which to use mmap.
    pub mmap_threshold: u64,
    /// Transfer mode for every read of the run.
    pub transfer_mode: TransferMode,
}

/// Sampling and batching options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Samples per batch.
    pub batch_size: usize,
    /// Upper bound on batches read per epoch.
    pub num_batches: usize,
    /// Number of epochs to run.
    pub epochs: u64,
    /// Whether to reshuffle the global ordering every epoch.
    pub shuffle: bool,
    /// Seed for the ordering generator. Every worker must use the same one.
    pub seed: u64,
    /// Per-epoch rotation of worker-to-shard assignment. Zero disables rotation.
    pub rank_shift: i64,
    /// What happens to the `N mod P` trailing samples.
    pub remainder: RemainderPolicy,
}

// Run-level options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    // Number of workers in the group.
    pub workers: u32,
    // Simulated compute time per batch, in seconds.
    pub compute_delay_seconds: f64,
    // Whether all workers synchronize at the end of every epoch.
    pub barrier_each_epoch: bool,
    // Whether the reporting worker draws a progress bar.
    pub progress: bool,
    // Memory each worker allocates and touches before reading, in MiB.
    pub memory_per_worker_mib: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./images.bin"),
            use_mmap: true,
            mmap_threshold: 1024 * 1024, // 1 MB
            transfer_mode: TransferMode::Default,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            num_batches: 16,
            epochs: 4,
            shuffle: false,
            seed: 100,
            rank_shift: 0,
            remainder: RemainderPolicy::Drop,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            compute_delay_seconds: 0.0,
            barrier_each_epoch: false,
            progress: true,
            memory_per_worker_mib: 0,
        }
    }
}

impl FromStr for SamplerConfig {
    type Err = RuntimeError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| RuntimeError::config_with_source("failed to parse TOML config", e))
    }
}

impl SamplerConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::storage_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `SAMPLER_` and use underscores
    // to separate nested fields. For example:
    // - `SAMPLER_STORE_PATH` overrides `store.path`
    // - `SAMPLER_SAMPLING_SHUFFLE` overrides `sampling.shuffle`
    // - `SAMPLER_RUN_WORKERS` overrides `run.workers`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Store overrides
        if let Ok(val) = std::env::var("SAMPLER_STORE_PATH") {
            self.store.path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SAMPLER_STORE_USE_MMAP") {
            if let Ok(v) = val.parse() {
                self.store.use_mmap = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_STORE_MMAP_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.store.mmap_threshold = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_STORE_TRANSFER_MODE") {
            if let Ok(v) = val.parse() {
                self.store.transfer_mode = v;
            }
        }

        // Sampling overrides
        if let Ok(val) = std::env::var("SAMPLER_SAMPLING_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                self.sampling.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_SAMPLING_NUM_BATCHES") {
            if let Ok(v) = val.parse() {
                self.sampling.num_batches = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_SAMPLING_EPOCHS") {
            if let Ok(v) = val.parse() {
                self.sampling.epochs = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_SAMPLING_SHUFFLE") {
            if let Ok(v) = val.parse() {
                self.sampling.shuffle = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_SAMPLING_SEED") {
            if let Ok(v) = val.parse() {
                self.sampling.seed = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_SAMPLING_RANK_SHIFT") {
            if let Ok(v) = val.parse() {
                self.sampling.rank_shift = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_SAMPLING_REMAINDER") {
            if let Ok(v) = val.parse() {
                self.sampling.remainder = v;
            }
        }

        // Run overrides
        if let Ok(val) = std::env::var("SAMPLER_RUN_WORKERS") {
            if let Ok(v) = val.parse() {
                self.run.workers = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_RUN_COMPUTE_DELAY_SECONDS") {
            if let Ok(v) = val.parse() {
                self.run.compute_delay_seconds = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_RUN_BARRIER_EACH_EPOCH") {
            if let Ok(v) = val.parse() {
                self.run.barrier_each_epoch = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_RUN_PROGRESS") {
            if let Ok(v) = val.parse() {
                self.run.progress = v;
            }
        }
        if let Ok(val) = std::env::var("SAMPLER_RUN_MEMORY_PER_WORKER_MIB") {
            if let Ok(v) = val.parse() {
                self.run.memory_per_worker_mib = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.store.path.as_os_str().is_empty() {
            return Err(RuntimeError::config("store.path must not be empty"));
        }

        if self.sampling.batch_size == 0 {
            return Err(RuntimeError::config(
                "sampling.batch_size must be greater than 0",
            ));
        }

        if self.run.workers == 0 {
            return Err(RuntimeError::config("run.workers must be greater than 0"));
        }

        self.run.compute_delay()?;
        self.run.memory_per_worker_bytes()?;

        Ok(())
    }
}

impl RunConfig {
    // Simulated compute time per batch.
    //
    // # Errors
    //
    // Returns an error if the delay is negative, not finite, or too large
    // to represent as a `Duration`.
    pub fn compute_delay(&self) -> Result<Duration> {
        let delay = self.compute_delay_seconds;
        Duration::try_from_secs_f64(delay).map_err(|e| {
            RuntimeError::config_with_source(
                format!(
                    "run.compute_delay_seconds must be a non-negative number of seconds, \
                     got {delay}"
                ),
                e,
            )
        })
    }

    // Per-worker memory allocation in bytes.
    //
    // # Errors
    //
    // Returns an error if the size overflows the address space.
    pub fn memory_per_worker_bytes(&self) -> Result<usize> {
        usize::try_from(self.memory_per_worker_mib)
            .ok()
            .and_then(|mib| mib.checked_mul(1024 * 1024))
            .ok_or_else(|| {
                RuntimeError::config(format!(
                    "run.memory_per_worker_mib is too large: {}",
                    self.memory_per_worker_mib
                ))
            })
    }
}
