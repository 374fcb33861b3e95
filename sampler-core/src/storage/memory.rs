// sampler-core/src/storage/memory.rs

use super::traits::{check_selection, ArrayStore, DatasetShape, ELEMENT_BYTES};
use crate::config::TransferMode;
use crate::error::{Result, RuntimeError};
use crate::sampling::Selection;

/// An array store held entirely in memory.
pub struct MemoryArrayStore {
    name: String,
    shape: DatasetShape,
    data: Vec<f32>,
    transfer_mode: TransferMode,
}

impl MemoryArrayStore {
    /// Creates a store from row-major data.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is empty or `data` does not hold exactly
    /// the number of elements the shape describes.
    pub fn new(name: impl Into<String>, dims: Vec<u64>, data: Vec<f32>) -> Result<Self> {
        let name = name.into();
        let shape = DatasetShape::new(dims)?;
        if shape.total_elements() != data.len() as u64 {
            return Err(RuntimeError::dataset(
                name,
                format!(
                    "shape {:?} needs {} elements, got {}",
                    shape.dims(),
                    shape.total_elements(),
                    data.len()
                ),
            ));
        }

        Ok(Self {
            name,
            shape,
            data,
            transfer_mode: TransferMode::Default,
        })
    }

    /// Creates a store where every element of row `i` equals `i`.
    pub fn with_row_values(name: impl Into<String>, dims: Vec<u64>) -> Result<Self> {
        let shape = DatasetShape::new(dims.clone())?;
        let per_row = shape.sample_elements() as usize;
        let data = (0..shape.num_samples())
            .flat_map(|row| std::iter::repeat(row as f32).take(per_row))
            .collect();
        Self::new(name, dims, data)
    }

    #[must_use]
    pub fn with_transfer_mode(mut self, mode: TransferMode) -> Self {
        self.transfer_mode = mode;
        self
    }
}

impl ArrayStore for MemoryArrayStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> &DatasetShape {
        &self.shape
    }

    fn transfer_mode(&self) -> TransferMode {
        self.transfer_mode
    }

    fn read(&self, selection: &Selection, buffer: &mut [f32]) -> Result<usize> {
        let elements = check_selection(&self.shape, selection, buffer.len())?;
        let per_row = self.shape.sample_elements() as usize;

        let mut filled = 0;
        for run in selection.runs() {
            let start = run.start as usize * per_row;
            let len = run.count as usize * per_row;
            buffer[filled..filled + len].copy_from_slice(&self.data[start..start + len]);
            filled += len;
        }

        debug_assert_eq!(filled, elements);
        Ok(elements * ELEMENT_BYTES)
    }
}

impl std::fmt::Debug for MemoryArrayStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryArrayStore")
            .field("name", &self.name)
            .field("shape", &self.shape.dims())
            .field("transfer_mode", &self.transfer_mode)
            .finish()
    }
}
