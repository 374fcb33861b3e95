// sampler-core/tests/common/mod.rs

#![allow(dead_code)]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use sampler_core::config::TransferMode;
use sampler_core::sampling::Selection;
use sampler_core::storage::{ArrayHeader, ArrayStore, DatasetShape, MemoryArrayStore};
use sampler_core::{Result, RuntimeError};

/// Writes an array file whose every element of row `r` equals `r`.
pub fn write_row_array(dir: &Path, name: &str, dims: &[u64]) -> PathBuf {
    let path = dir.join(name);
    let header = ArrayHeader::new(dims.to_vec());
    let per_row: u64 = dims[1..].iter().product();

    let mut out = BufWriter::new(File::create(&path).unwrap());
    out.write_all(&header.encode()).unwrap();
    for row in 0..dims[0] {
        for _ in 0..per_row {
            out.write_all(&(row as f32).to_le_bytes()).unwrap();
        }
    }
    out.flush().unwrap();
    path
}

/// A store that fails the `fail_on`-th read (1-based) across all callers.
pub struct FailingStore {
    inner: MemoryArrayStore,
    fail_on: usize,
    reads: AtomicUsize,
}

impl FailingStore {
    pub fn new(dims: Vec<u64>, fail_on: usize) -> Self {
        Self {
            inner: MemoryArrayStore::with_row_values("failing", dims).unwrap(),
            fail_on,
            reads: AtomicUsize::new(0),
        }
    }
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
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(RuntimeError::storage("failing", "injected read failure"));
        }
        self.inner.read(selection, buffer)
    }
}
