// sampler-core/src/driver.rs

//! Epoch and batch loop of one worker.
//!
//! For every epoch the driver reshuffles the global ordering (if enabled),
//! rotates the worker's effective id, computes its shard, and reads the
//! shard batch by batch into one reusable buffer. Each filled buffer is
//! handed to a consumer closure before the next read overwrites it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sampler_core::driver::{DriverOptions, EpochDriver};
//! use sampler_core::group::LocalGroup;
//! use sampler_core::storage::MemoryArrayStore;
//!
//! let store = Arc::new(MemoryArrayStore::with_row_values("demo", vec![64, 4]).unwrap());
//! let options = DriverOptions {
//!     batch_size: 8,
//!     num_batches: 4,
//!     epochs: 2,
//!     ..Default::default()
//! };
//!
//! let mut driver = EpochDriver::new(options, store, Arc::new(LocalGroup::solo())).unwrap();
//! let summary = driver
//!     .run_with(|_ctx, batch, data| {
//!         assert_eq!(data.len(), batch.len() * 4);
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(summary.total_batches(), 8);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SamplerConfig;
use crate::error::{Result, RuntimeError};
use crate::group::WorkerGroup;
use crate::progress::{NoProgress, ProgressSink};
use crate::sampling::{
    excluded_samples, partition_with, Batch, BatchSlicer, EpochContext, EpochRotator,
    IndexOrdering, RemainderPolicy, SelectionBuilder, ShardDescriptor,
};
use crate::storage::ArrayStore;
use crate::timing::TimingTable;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Options for one worker's epoch loop.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub batch_size: usize,
    /// Upper bound on batches per epoch.
    pub num_batches: usize,
    pub epochs: u64,
    pub shuffle: bool,
    pub seed: u64,
    pub rank_shift: i64,
    pub remainder: RemainderPolicy,
    /// Time to block after each batch, standing in for a training step.
    pub compute_delay: Duration,
    /// Synchronize all workers at the end of every epoch.
    pub barrier_each_epoch: bool,
    /// Memory the worker allocates and holds for the whole run, simulating
    /// an application footprint next to the reader.
    pub memory_ballast_bytes: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::assemble(&SamplerConfig::default(), Duration::ZERO, 0)
    }
}

impl DriverOptions {
    /// Extracts the driver options from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the compute delay or the memory allocation cannot
    /// be represented.
    pub fn from_config(config: &SamplerConfig) -> Result<Self> {
        let compute_delay = config.run.compute_delay()?;
        let memory_ballast_bytes = config.run.memory_per_worker_bytes()?;
        Ok(Self::assemble(config, compute_delay, memory_ballast_bytes))
    }

    fn assemble(
        config: &SamplerConfig,
        compute_delay: Duration,
        memory_ballast_bytes: usize,
    ) -> Self {
        Self {
            batch_size: config.sampling.batch_size,
            num_batches: config.sampling.num_batches,
            epochs: config.sampling.epochs,
            shuffle: config.sampling.shuffle,
            seed: config.sampling.seed,
            rank_shift: config.sampling.rank_shift,
            remainder: config.sampling.remainder,
            compute_delay,
            barrier_each_epoch: config.run.barrier_each_epoch,
            memory_ballast_bytes,
        }
    }
}

/// Where the driver is in its epoch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Shuffling,
    PartitionComputed,
    Reading { batch: usize },
    EpochComplete,
    Terminal,
}

/// What one worker did in one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub context: EpochContext,
    pub shard: ShardDescriptor,
    pub batches: usize,
    pub samples: u64,
    pub bytes: u64,
    /// Wall time spent inside store reads.
    pub read_time: Duration,
}

impl EpochReport {
    /// Samples read per second of read time.
    pub fn samples_per_sec(&self) -> f64 {
        rate(self.samples as f64, self.read_time)
    }

    /// MiB read per second of read time.
    pub fn mib_per_sec(&self) -> f64 {
        rate(self.bytes as f64 / BYTES_PER_MIB, self.read_time)
    }
}

/// Renders an error with all of its causes on one line.
fn error_chain(error: &RuntimeError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Allocates about `bytes` of memory and writes every element.
fn allocate_ballast(bytes: usize) -> Vec<f64> {
    (0..bytes / std::mem::size_of::<f64>())
        .map(|i| i as f64)
        .collect()
}

fn rate(amount: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        amount / secs
    } else {
        0.0
    }
}

/// Everything one worker did over the whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub rank: u32,
    pub epochs: Vec<EpochReport>,
    pub timing: TimingTable,
}

impl RunSummary {
    pub fn total_batches(&self) -> usize {
        self.epochs.iter().map(|e| e.batches).sum()
    }

    pub fn total_samples(&self) -> u64 {
        self.epochs.iter().map(|e| e.samples).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.epochs.iter().map(|e| e.bytes).sum()
    }

    pub fn total_read_time(&self) -> Duration {
        self.epochs.iter().map(|e| e.read_time).sum()
    }
}

/// Runs the epoch loop for one worker.
pub struct EpochDriver {
    options: DriverOptions,
    store: Arc<dyn ArrayStore>,
    group: Arc<dyn WorkerGroup>,
    ordering: IndexOrdering,
    selector: SelectionBuilder,
    rotator: EpochRotator,
    progress: Box<dyn ProgressSink>,
    timing: TimingTable,
    state: DriverState,
    short_shard_warned: bool,
}

impl EpochDriver {
    /// Creates a driver for the worker `group.rank()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch size is zero, the group is empty, or the
    /// rank lies outside the group.
    pub fn new(
        options: DriverOptions,
        store: Arc<dyn ArrayStore>,
        group: Arc<dyn WorkerGroup>,
    ) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(RuntimeError::config("batch size must be greater than 0"));
        }
        if group.size() == 0 {
            return Err(RuntimeError::config("number of workers must be greater than 0"));
        }
        if group.rank() >= group.size() {
            return Err(RuntimeError::invalid_worker(group.rank(), group.size()));
        }

        let shape = store.shape().clone();
        let ordering = IndexOrdering::identity(shape.num_samples(), options.seed);
        let selector = SelectionBuilder::new(shape.num_samples(), shape.sample_shape());
        let rotator = EpochRotator::new(group.rank(), group.size(), options.rank_shift);

        Ok(Self {
            options,
            store,
            group,
            ordering,
            selector,
            rotator,
            progress: Box::new(NoProgress),
            timing: TimingTable::new(),
            state: DriverState::Idle,
            short_shard_warned: false,
        })
    }

    /// Replaces the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// The worker's current copy of the global ordering.
    pub fn ordering(&self) -> &IndexOrdering {
        &self.ordering
    }

    /// Logs dataset, I/O and sampling parameters.
    pub fn log_banner(&self) {
        let shape = self.store.shape();
        let workers = self.group.size();

        tracing::info!("====== dataset info ======");
        tracing::info!("Dataset: {}", self.store.name());
        tracing::info!("Number of samples in the dataset: {}", shape.num_samples());
        tracing::info!("Sample shape: {:?}", shape.sample_shape());
        tracing::info!(
            "Samples excluded per epoch: {}",
            excluded_samples(shape.num_samples(), workers, self.options.remainder)
        );
        tracing::info!("====== I/O info ======");
        tracing::info!("Transfer mode: {}", self.store.transfer_mode());
        tracing::info!("====== training info ======");
        tracing::info!("Batch size: {}", self.options.batch_size);
        tracing::info!("Number of batches per epoch: {}", self.options.num_batches);
        tracing::info!("Number of epochs: {}", self.options.epochs);
        tracing::info!("Shuffling the samples: {}", self.options.shuffle);
        tracing::info!("Rank shift: {}", self.options.rank_shift);
        tracing::info!("Number of workers: {}", workers);
        tracing::info!("Compute time per batch: {:?}", self.options.compute_delay);
        if self.options.memory_ballast_bytes > 0 {
            tracing::info!(
                "Application memory per worker: {:.1} MiB",
                self.options.memory_ballast_bytes as f64 / BYTES_PER_MIB
            );
        }
    }

    /// Runs all epochs, discarding the batch contents.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.run_with(|_, _, _| Ok(()))
    }

    /// Runs all epochs, handing each filled buffer to `consume`.
    ///
    /// `consume` sees the epoch context, the sorted batch, and exactly
    /// `batch.len() * sample_elements` elements, row `i` of which holds
    /// sample `batch.indices()[i]`.
    ///
    /// # Errors
    ///
    /// Any failure is fatal. Before returning it, the driver aborts the
    /// worker group so peers blocked at a barrier fail too.
    pub fn run_with<F>(&mut self, mut consume: F) -> Result<RunSummary>
    where
        F: FnMut(&EpochContext, &Batch, &[f32]) -> Result<()>,
    {
        match self.run_epochs(&mut consume) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                if !e.is_aborted() {
                    self.group.abort(&error_chain(&e));
                }
                self.state = DriverState::Terminal;
                tracing::error!(rank = self.group.rank(), error = %e, "worker failed");
                Err(e)
            }
        }
    }

    fn run_epochs<F>(&mut self, consume: &mut F) -> Result<RunSummary>
    where
        F: FnMut(&EpochContext, &Batch, &[f32]) -> Result<()>,
    {
        let sample_elements = self.store.shape().sample_elements() as usize;
        let mut buffer = vec![0.0f32; self.options.batch_size * sample_elements];
        let ballast = allocate_ballast(self.options.memory_ballast_bytes);
        let mut reports = Vec::new();

        for epoch in 0..self.options.epochs {
            let report = self.run_epoch(epoch, &mut buffer, consume)?;
            if self.group.is_reporter() {
                self.log_epoch(&report);
            }
            reports.push(report);

            if self.options.barrier_each_epoch {
                self.group.barrier()?;
            }
            self.state = DriverState::Idle;
        }

        drop(buffer);
        drop(ballast);
        self.state = DriverState::Terminal;

        let summary = RunSummary {
            rank: self.group.rank(),
            epochs: reports,
            timing: self.timing.clone(),
        };
        tracing::debug!(
            rank = summary.rank,
            batches = summary.total_batches(),
            samples = summary.total_samples(),
            "worker finished"
        );
        Ok(summary)
    }

    fn run_epoch<F>(
        &mut self,
        epoch: u64,
        buffer: &mut [f32],
        consume: &mut F,
    ) -> Result<EpochReport>
    where
        F: FnMut(&EpochContext, &Batch, &[f32]) -> Result<()>,
    {
        if self.options.shuffle {
            self.state = DriverState::Shuffling;
            self.ordering.shuffle();
        }

        let context = self.rotator.context(epoch);
        let shard = partition_with(
            self.ordering.len() as u64,
            self.group.size(),
            context.effective_worker_id,
            self.options.remainder,
        )?;
        self.state = DriverState::PartitionComputed;
        tracing::debug!(
            rank = context.worker_id,
            epoch,
            effective_worker_id = context.effective_worker_id,
            offset = shard.offset,
            count = shard.count,
            "shard computed"
        );

        let available = BatchSlicer::available_batches(shard.count, self.options.batch_size);
        if available < self.options.num_batches && !self.short_shard_warned {
            tracing::warn!(
                rank = context.worker_id,
                requested = self.options.num_batches,
                available,
                "shard too small for requested batches per epoch, reading {available}"
            );
            self.short_shard_warned = true;
        }

        let slicer = BatchSlicer::new(self.ordering.as_slice(), shard, self.options.batch_size)?
            .with_limit(self.options.num_batches);
        let total = slicer.len();
        let sample_elements = self.store.shape().sample_elements() as usize;

        let mut read_time = Duration::ZERO;
        let mut bytes = 0u64;
        let mut samples = 0u64;

        for batch in slicer {
            self.state = DriverState::Reading { batch: batch.index };

            self.timing.start("select");
            let selection = self.selector.build(batch.indices())?;
            self.timing.stop("select");

            let started = Instant::now();
            self.timing.start("read");
            let read = self
                .store
                .read(&selection, buffer)
                .map_err(|e| RuntimeError::batch_read(epoch, batch.index, e))?;
            self.timing.stop("read");
            read_time += started.elapsed();
            bytes += read as u64;
            samples += batch.len() as u64;

            let data = &buffer[..batch.len() * sample_elements];
            if tracing::enabled!(tracing::Level::TRACE) && sample_elements > 0 {
                let firsts: Vec<(u64, f32)> = batch
                    .indices()
                    .iter()
                    .zip(data.chunks(sample_elements))
                    .map(|(&index, row)| (index, row[0]))
                    .collect();
                tracing::trace!(epoch, batch = batch.index, ?firsts, "batch read");
            }
            consume(&context, &batch, data)?;

            if !self.options.compute_delay.is_zero() {
                std::thread::sleep(self.options.compute_delay);
            }

            self.progress.update(epoch, (batch.index + 1) as f64 / total as f64);
        }

        self.progress.finish_epoch(epoch);
        self.state = DriverState::EpochComplete;

        Ok(EpochReport {
            context,
            shard,
            batches: total,
            samples,
            bytes,
            read_time,
        })
    }

    fn log_epoch(&self, report: &EpochReport) {
        let workers = f64::from(self.group.size());
        tracing::info!(
            "Epoch {}: {:6.2} (sec) - {:8.2} (samples/sec) - {:8.2} (MB/sec) - \
             group estimate {:8.2} (samples/sec) {:8.2} (MB/sec)",
            report.context.epoch,
            report.read_time.as_secs_f64(),
            report.samples_per_sec(),
            report.mib_per_sec(),
            report.samples_per_sec() * workers,
            report.mib_per_sec() * workers,
        );
    }
}

impl std::fmt::Debug for EpochDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochDriver")
            .field("rank", &self.group.rank())
            .field("workers", &self.group.size())
            .field("store", &self.store.name())
            .field("state", &self.state)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferMode;
    use crate::group::LocalGroup;
    use crate::sampling::Selection;
    use crate::storage::{DatasetShape, MemoryArrayStore};
    use std::sync::Mutex;

    fn row_store(dims: Vec<u64>) -> Arc<dyn ArrayStore> {
        Arc::new(MemoryArrayStore::with_row_values("test", dims).unwrap())
    }

    fn solo() -> Arc<dyn WorkerGroup> {
        Arc::new(LocalGroup::solo())
    }

    fn options(batch_size: usize, num_batches: usize, epochs: u64) -> DriverOptions {
        DriverOptions {
            batch_size,
            num_batches,
            epochs,
            ..Default::default()
        }
    }

    #[test]
    fn test_reads_expected_rows() {
        let mut driver =
            EpochDriver::new(options(4, 100, 1), row_store(vec![20, 3]), solo()).unwrap();

        let mut seen = Vec::new();
        driver
            .run_with(|_, batch, data| {
                assert_eq!(data.len(), batch.len() * 3);
                for (row, &index) in data.chunks(3).zip(batch.indices()) {
                    assert!(row.iter().all(|&v| v == index as f32));
                }
                seen.extend_from_slice(batch.indices());
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        assert_eq!(driver.state(), DriverState::Terminal);
    }

    #[test]
    fn test_report_counts() {
        let mut driver =
            EpochDriver::new(options(5, 4, 3), row_store(vec![100, 2]), solo()).unwrap();
        let summary = driver.run().unwrap();

        assert_eq!(summary.epochs.len(), 3);
        for report in &summary.epochs {
            assert_eq!(report.batches, 4);
            assert_eq!(report.samples, 20);
            assert_eq!(report.bytes, 20 * 2 * 4);
            assert_eq!(report.shard, ShardDescriptor { count: 100, offset: 0 });
        }
        assert_eq!(summary.total_batches(), 12);
        assert_eq!(summary.timing.get("read").unwrap().count, 12);
        assert_eq!(summary.timing.get("select").unwrap().count, 12);
    }

    #[test]
    fn test_shuffle_changes_batches_every_epoch() {
        let mut opts = options(10, 1, 3);
        opts.shuffle = true;
        let mut driver = EpochDriver::new(opts, row_store(vec![1000]), solo()).unwrap();

        let mut batches: Vec<Vec<u64>> = Vec::new();
        driver
            .run_with(|_, batch, _| {
                let indices = batch.indices();
                assert!(indices.windows(2).all(|w| w[0] < w[1]));
                batches.push(indices.to_vec());
                Ok(())
            })
            .unwrap();

        assert_eq!(batches.len(), 3);
        assert_ne!(batches[0], batches[1]);
        assert_ne!(batches[1], batches[2]);
        assert_eq!(driver.ordering().shuffle_count(), 3);
    }

    #[test]
    fn test_zero_epochs() {
        let mut driver = EpochDriver::new(options(4, 4, 0), row_store(vec![8]), solo()).unwrap();
        let summary = driver.run().unwrap();
        assert!(summary.epochs.is_empty());
        assert_eq!(driver.state(), DriverState::Terminal);
    }

    #[test]
    fn test_batch_larger_than_shard() {
        let mut driver = EpochDriver::new(options(16, 4, 2), row_store(vec![10]), solo()).unwrap();
        let summary = driver.run().unwrap();
        assert_eq!(summary.total_batches(), 0);
        assert_eq!(summary.epochs.len(), 2);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = EpochDriver::new(options(0, 4, 1), row_store(vec![10]), solo());
        assert!(result.is_err());
    }

    #[test]
    fn test_consumer_error_aborts_group() {
        let group = Arc::new(LocalGroup::solo());
        let mut driver =
            EpochDriver::new(options(2, 4, 1), row_store(vec![10]), group.clone()).unwrap();

        let err = driver
            .run_with(|_, _, _| Err(RuntimeError::invalid_selection("consumer gave up")))
            .unwrap_err();

        assert!(err.to_string().contains("consumer gave up"));
        assert!(group.abort_reason().is_some());
        assert_eq!(driver.state(), DriverState::Terminal);
    }

    struct FailingStore {
        inner: MemoryArrayStore,
        fail_on_read: usize,
        reads: Mutex<usize>,
    }

    impl ArrayStore for FailingStore {
        fn name(&self) -> &str {
            "failing"
        }

        fn shape(&self) -> &DatasetShape {
            self.inner.shape()
        }

        fn transfer_mode(&self) -> TransferMode {
            TransferMode::Default
        }

        fn read(&self, selection: &Selection, buffer: &mut [f32]) -> Result<usize> {
            let mut reads = self.reads.lock().unwrap();
            *reads += 1;
            if *reads == self.fail_on_read {
                return Err(RuntimeError::storage("failing", "device went away"));
            }
            self.inner.read(selection, buffer)
        }
    }

    #[test]
    fn test_read_failure_names_epoch_and_batch() {
        let store = Arc::new(FailingStore {
            inner: MemoryArrayStore::with_row_values("inner", vec![40, 2]).unwrap(),
            fail_on_read: 6,
            reads: Mutex::new(0),
        });
        let mut driver = EpochDriver::new(options(5, 4, 3), store, solo()).unwrap();

        let err = driver.run().unwrap_err();
        match err {
            RuntimeError::BatchRead { epoch, batch, .. } => {
                // 4 batches per epoch, sixth read is epoch 1 batch 1
                assert_eq!(epoch, 1);
                assert_eq!(batch, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct Recording(Arc<Mutex<Vec<(u64, f64)>>>);

    impl ProgressSink for Recording {
        fn update(&mut self, epoch: u64, fraction: f64) {
            self.0.lock().unwrap().push((epoch, fraction));
        }
    }

    #[test]
    fn test_progress_updates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut driver = EpochDriver::new(options(2, 4, 2), row_store(vec![8]), solo())
            .unwrap()
            .with_progress(Box::new(Recording(log.clone())));
        driver.run().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 8);
        assert_eq!(log[0], (0, 0.25));
        assert_eq!(log[3], (0, 1.0));
        assert_eq!(log[7], (1, 1.0));
    }

    #[test]
    fn test_from_config_rejects_unrepresentable_delay() {
        let mut config = SamplerConfig::default();
        config.run.compute_delay_seconds = 1e20;
        assert!(DriverOptions::from_config(&config).is_err());

        config.run.compute_delay_seconds = 0.5;
        config.run.memory_per_worker_mib = 2;
        let options = DriverOptions::from_config(&config).unwrap();
        assert_eq!(options.compute_delay, Duration::from_millis(500));
        assert_eq!(options.memory_ballast_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn test_allocate_ballast() {
        let ballast = allocate_ballast(1024);
        assert_eq!(ballast.len(), 128);
        assert_eq!(ballast[127], 127.0);
        assert!(allocate_ballast(7).is_empty());
    }

    #[test]
    fn test_run_with_ballast() {
        let mut opts = options(2, 4, 1);
        opts.memory_ballast_bytes = 64 * 1024;
        let mut driver = EpochDriver::new(opts, row_store(vec![8]), solo()).unwrap();
        assert_eq!(driver.run().unwrap().total_batches(), 4);
    }

    #[test]
    fn test_throughput_rates() {
        let report = EpochReport {
            context: EpochContext {
                epoch: 0,
                worker_id: 0,
                effective_worker_id: 0,
            },
            shard: ShardDescriptor { count: 10, offset: 0 },
            batches: 2,
            samples: 10,
            bytes: 2 * 1024 * 1024,
            read_time: Duration::from_secs(2),
        };
        assert_eq!(report.samples_per_sec(), 5.0);
        assert_eq!(report.mib_per_sec(), 1.0);

        let instant = EpochReport {
            read_time: Duration::ZERO,
            ..report
        };
        assert_eq!(instant.samples_per_sec(), 0.0);
    }
}
