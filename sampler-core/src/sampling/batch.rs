// sampler-core/src/sampling/batch.rs

use crate::error::{Result, RuntimeError};

use super::partition::ShardDescriptor;
use super::SampleIndex;

/// A fixed-size group of sample indices, sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of this batch within its shard, starting at 0.
    pub index: usize,
    indices: Vec<SampleIndex>,
}

impl Batch {
    /// Builds a batch from indices in any order. The indices are sorted.
    pub fn new(index: usize, mut indices: Vec<SampleIndex>) -> Self {
        indices.sort_unstable();
        Self { index, indices }
    }

    /// The sample indices, in ascending order.
    pub fn indices(&self) -> &[SampleIndex] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Cuts a shard's window of the global ordering into batches.
///
/// Produces `floor(count / batch_size)` batches, optionally capped, each
/// taken contiguously from the window in ordering order and then sorted. A
/// trailing partial batch is dropped. Call [`reset`](BatchSlicer::reset) to
/// walk the same shard again.
#[derive(Debug, Clone)]
pub struct BatchSlicer<'a> {
    window: &'a [SampleIndex],
    batch_size: usize,
    total_batches: usize,
    next: usize,
}

impl<'a> BatchSlicer<'a> {
    /// Creates a slicer over `ordering[shard.offset .. shard.offset + shard.count]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `batch_size` is zero or the shard window extends
    /// past the end of the ordering.
    pub fn new(
        ordering: &'a [SampleIndex],
        shard: ShardDescriptor,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(RuntimeError::config("batch size must be greater than 0"));
        }
        if shard.end() > ordering.len() as u64 {
            return Err(RuntimeError::invalid_selection(format!(
                "shard window {}..{} exceeds ordering of length {}",
                shard.offset,
                shard.end(),
                ordering.len()
            )));
        }

        let window = &ordering[shard.offset as usize..shard.end() as usize];
        Ok(Self {
            window,
            batch_size,
            total_batches: Self::available_batches(shard.count, batch_size),
            next: 0,
        })
    }

    /// Number of whole batches a shard of `count` samples can supply.
    pub fn available_batches(count: u64, batch_size: usize) -> usize {
        if batch_size == 0 {
            return 0;
        }
        (count / batch_size as u64) as usize
    }

    /// Caps the number of batches produced.
    #[must_use]
    pub fn with_limit(mut self, max_batches: usize) -> Self {
        self.total_batches = self.total_batches.min(max_batches);
        self
    }

    /// Total number of batches this slicer produces from the start.
    pub fn num_batches(&self) -> usize {
        self.total_batches
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Rewinds to the first batch of the shard.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl Iterator for BatchSlicer<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.next >= self.total_batches {
            return None;
        }

        let start = self.next * self.batch_size;
        let indices = self.window[start..start + self.batch_size].to_vec();
        let batch = Batch::new(self.next, indices);
        self.next += 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_batches - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BatchSlicer<'_> {}
