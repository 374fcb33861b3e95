// sampler-core/src/sampling/mod.rs

//! Distributed sample ordering, sharding and batch selection.
//!
//! Every worker runs the same pipeline independently and deterministically:
//!
//! 1. [`IndexOrdering`] holds the global order of sample indices and
//!    reshuffles it from a seeded generator that is advanced, never re-seeded.
//! 2. [`effective_worker_id`] rotates which shard a worker owns each epoch.
//! 3. [`partition`] cuts the ordering into one contiguous window per worker.
//! 4. [`BatchSlicer`] walks a window in fixed-size batches, sorting each one.
//! 5. [`SelectionBuilder`] turns a sorted batch into row ranges against the
//!    array store.
//!
//! Since all workers share the seed and the epoch counter, they agree on the
//! global partition without exchanging any message.
//!
//! # Example
//!
//! ```
//! use sampler_core::sampling::{
//!     effective_worker_id, partition, BatchSlicer, IndexOrdering, SelectionBuilder,
//! };
//!
//! let mut ordering = IndexOrdering::identity(100, 42);
//! ordering.shuffle();
//!
//! let worker = effective_worker_id(1, 0, 4, 1);
//! let shard = partition(100, 4, worker).unwrap();
//! let builder = SelectionBuilder::new(100, &[3, 32, 32]);
//!
//! for batch in BatchSlicer::new(ordering.as_slice(), shard, 5).unwrap() {
//!     let selection = builder.build(batch.indices()).unwrap();
//!     assert_eq!(selection.num_rows(), 5);
//! }
//! ```

mod batch;
mod ordering;
mod partition;
mod rotation;
mod selection;

/// Position of one sample along the leading axis of the dataset.
pub type SampleIndex = u64;

pub use batch::{Batch, BatchSlicer};
pub use ordering::IndexOrdering;
pub use partition::{
    excluded_samples, partition, partition_with, RemainderPolicy, ShardDescriptor,
    DEFAULT_REMAINDER_POLICY,
};
pub use rotation::{effective_worker_id, EpochContext, EpochRotator};
pub use selection::{Hyperslab, RowRange, Selection, SelectionBuilder};
