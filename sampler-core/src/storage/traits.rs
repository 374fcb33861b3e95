// sampler-core/src/storage/traits.rs

//! Array store abstraction.
//!
//! The epoch driver only ever talks to an [`ArrayStore`]: it asks for the
//! dataset shape once and then issues one read per batch into a reusable
//! buffer.

use crate::config::TransferMode;
use crate::error::{Result, RuntimeError};
use crate::sampling::Selection;

/// Size of one stored element in bytes.
pub const ELEMENT_BYTES: usize = std::mem::size_of::<f32>();

/// Shape of a stored array `[N, d1, ..., dk]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetShape {
    dims: Vec<u64>,
}

impl DatasetShape {
    /// Creates a shape from its full dimensions, leading sample axis first.
    ///
    /// # Errors
    ///
    /// Returns an error if `dims` is empty.
    pub fn new(dims: Vec<u64>) -> Result<Self> {
        if dims.is_empty() {
            return Err(RuntimeError::dataset(
                "shape",
                "array must have at least one dimension",
            ));
        }
        Ok(Self { dims })
    }

    /// All dimensions, leading sample axis first.
    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    /// `N`, the extent of the sample axis.
    pub fn num_samples(&self) -> u64 {
        self.dims[0]
    }

    /// `(d1, ..., dk)`, the shape of one sample.
    pub fn sample_shape(&self) -> &[u64] {
        &self.dims[1..]
    }

    /// Elements in one sample.
    pub fn sample_elements(&self) -> u64 {
        self.sample_shape().iter().product()
    }

    /// Bytes in one sample.
    pub fn sample_bytes(&self) -> u64 {
        self.sample_elements() * ELEMENT_BYTES as u64
    }

    /// Elements in the whole array.
    pub fn total_elements(&self) -> u64 {
        self.dims.iter().product()
    }
}

/// A read-only multidimensional array of `f32` samples.
///
/// Implementations must be safe to share between workers of one process.
/// A read-through cache is expected to implement this trait by wrapping
/// another store.
pub trait ArrayStore: Send + Sync {
    /// Human-readable name for logs and errors.
    fn name(&self) -> &str;

    /// Shape of the stored array.
    fn shape(&self) -> &DatasetShape;

    /// Transfer mode the store was opened with.
    fn transfer_mode(&self) -> TransferMode;

    /// Reads the selected rows into `buffer`, in ascending row order.
    ///
    /// Returns the number of bytes transferred. Elements of `buffer` past the
    /// selection are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the selection does not fit the array or the
    /// buffer, or if the underlying read fails.
    fn read(&self, selection: &Selection, buffer: &mut [f32]) -> Result<usize>;
}

/// Checks a selection against an array shape and a destination buffer.
///
/// Returns the number of elements the read will fill.
pub(crate) fn check_selection(
    shape: &DatasetShape,
    selection: &Selection,
    buffer_len: usize,
) -> Result<usize> {
    if selection.sample_shape() != shape.sample_shape() {
        return Err(RuntimeError::invalid_selection(format!(
            "selection sample shape {:?} does not match array sample shape {:?}",
            selection.sample_shape(),
            shape.sample_shape()
        )));
    }

    if let Some(last) = selection.runs().last() {
        if last.end() > shape.num_samples() {
            return Err(RuntimeError::index_out_of_range(
                last.end() - 1,
                shape.num_samples(),
            ));
        }
    }

    let elements = selection.num_elements() as usize;
    if elements > buffer_len {
        return Err(RuntimeError::invalid_selection(format!(
            "buffer holds {buffer_len} elements but the selection needs {elements}"
        )));
    }

    Ok(elements)
}
