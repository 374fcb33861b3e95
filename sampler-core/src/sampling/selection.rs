// sampler-core/src/sampling/selection.rs

use crate::error::{Result, RuntimeError};

use super::SampleIndex;

/// A run of consecutive rows along the sample axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: u64,
    pub count: u64,
}

impl RowRange {
    pub fn end(&self) -> u64 {
        self.start + self.count
    }
}

/// One block of a selection in the dataset's full index space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperslab {
    /// Start coordinate on every axis.
    pub start: Vec<u64>,
    /// Extent on every axis.
    pub count: Vec<u64>,
}

/// The rows of a batch, expressed against the store's index space.
///
/// Rows are kept as ascending, non-overlapping, non-adjacent ranges along
/// the sample axis; every non-sample axis is selected in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    runs: Vec<RowRange>,
    sample_shape: Vec<u64>,
    num_rows: u64,
}

impl Selection {
    /// Coalesced row ranges in ascending order.
    pub fn runs(&self) -> &[RowRange] {
        &self.runs
    }

    /// Extent of the non-sample axes.
    pub fn sample_shape(&self) -> &[u64] {
        &self.sample_shape
    }

    /// Total number of selected rows.
    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    /// Elements in a single row.
    pub fn sample_elements(&self) -> u64 {
        self.sample_shape.iter().product()
    }

    /// Elements across all selected rows.
    pub fn num_elements(&self) -> u64 {
        self.num_rows * self.sample_elements()
    }

    /// Every selected row, ascending.
    pub fn rows(&self) -> impl Iterator<Item = u64> + '_ {
        self.runs.iter().flat_map(|r| r.start..r.end())
    }

    /// The selection as full-rank blocks, one per run.
    pub fn hyperslabs(&self) -> impl Iterator<Item = Hyperslab> + '_ {
        self.runs.iter().map(move |run| {
            let mut start = Vec::with_capacity(self.sample_shape.len() + 1);
            start.push(run.start);
            start.extend(std::iter::repeat(0).take(self.sample_shape.len()));

            let mut count = Vec::with_capacity(self.sample_shape.len() + 1);
            count.push(run.count);
            count.extend_from_slice(&self.sample_shape);

            Hyperslab { start, count }
        })
    }
}

/// Turns sorted batches of sample indices into [`Selection`]s.
#[derive(Debug, Clone)]
pub struct SelectionBuilder {
    num_samples: u64,
    sample_shape: Vec<u64>,
}

impl SelectionBuilder {
    pub fn new(num_samples: u64, sample_shape: &[u64]) -> Self {
        Self {
            num_samples,
            sample_shape: sample_shape.to_vec(),
        }
    }

    pub fn num_samples(&self) -> u64 {
        self.num_samples
    }

    /// Builds the selection for `indices`.
    ///
    /// `indices` must be strictly ascending. Consecutive indices are merged
    /// into a single row range.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if any index is `>= num_samples`, and
    /// `InvalidSelection` if the indices are unsorted or repeat. Both mean the
    /// caller has a bug; neither is clamped or skipped.
    pub fn build(&self, indices: &[SampleIndex]) -> Result<Selection> {
        let mut runs: Vec<RowRange> = Vec::new();
        let mut prev: Option<SampleIndex> = None;

        for &index in indices {
            if index >= self.num_samples {
                return Err(RuntimeError::index_out_of_range(index, self.num_samples));
            }
            if let Some(p) = prev {
                if index <= p {
                    return Err(RuntimeError::invalid_selection(format!(
                        "indices must be strictly ascending, got {index} after {p}"
                    )));
                }
            }

            match runs.last_mut() {
                Some(run) if run.end() == index => run.count += 1,
                _ => runs.push(RowRange {
                    start: index,
                    count: 1,
                }),
            }
            prev = Some(index);
        }

        Ok(Selection {
            runs,
            sample_shape: self.sample_shape.clone(),
            num_rows: indices.len() as u64,
        })
    }
}
