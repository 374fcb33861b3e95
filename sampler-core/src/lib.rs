// sampler-core/src/lib.rs

//! Epoch Sampler - Core Library
//!
//! This crate provides the pieces of a distributed, epoch-based batch reader:
//! deterministic sample ordering and sharding, batch selection against an
//! N-dimensional array store, and the per-worker epoch driver that ties them
//! together.

pub mod config;
pub mod driver;
pub mod error;
pub mod group;
pub mod progress;
pub mod sampling;
pub mod storage;
pub mod timing;

// Re-export commonly used types for convenience
pub use config::{SamplerConfig, TransferMode};
pub use driver::{DriverOptions, DriverState, EpochDriver, EpochReport, RunSummary};
pub use error::{Result, RuntimeError};
pub use group::{LocalGroup, LocalMember, WorkerGroup};
pub use progress::{ConsoleProgress, NoProgress, ProgressSink};
pub use sampling::{
    partition, Batch, BatchSlicer, EpochContext, EpochRotator, IndexOrdering, RemainderPolicy,
    SampleIndex, Selection, SelectionBuilder, ShardDescriptor,
};
pub use storage::{ArrayStore, DatasetShape, LocalArrayStore, MemoryArrayStore};
pub use timing::TimingTable;
