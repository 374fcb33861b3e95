// sampler-core/src/storage/local.rs

//! Local filesystem array store.
//!
//! This module provides an [`ArrayStore`] backed by a single array file on
//! the local filesystem. Large files are memory-mapped; small files, or all
//! files when mmap is disabled, are served with positioned reads.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use memmap2::Mmap;

use super::format::ArrayHeader;
use super::traits::{check_selection, ArrayStore, DatasetShape, ELEMENT_BYTES};
use crate::config::{StoreConfig, TransferMode};
use crate::error::{Result, RuntimeError};
use crate::sampling::Selection;

/// Array store over a local array file.
///
/// The file is opened and validated once; the handle is then shared by every
/// worker in the process.
pub struct LocalArrayStore {
    path: PathBuf,
    name: String,
    shape: DatasetShape,
    /// Byte offset of the first element.
    data_offset: u64,
    source: Source,
    transfer_mode: TransferMode,
}

enum Source {
    Mapped(Mmap),
    File(Mutex<File>),
}

impl LocalArrayStore {
    /// Opens the array file named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, its header is invalid,
    /// its size does not match the header, or it holds no samples.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = config.path.clone();
        let name = path.display().to_string();

        let file = File::open(&path)
            .map_err(|e| RuntimeError::storage_with_source(&path, "failed to open file", e))?;
        let size = file
            .metadata()
            .map_err(|e| {
                RuntimeError::storage_with_source(&path, "failed to read file metadata", e)
            })?
            .len();

        let mut reader = BufReader::new(&file);
        let header = ArrayHeader::decode(&mut reader, &name)?;
        drop(reader);

        let data_offset = header.encoded_len() as u64;
        let expected = header
            .data_len()
            .and_then(|data_len| data_offset.checked_add(data_len))
            .ok_or_else(|| RuntimeError::dataset(&name, "array dimensions overflow"))?;
        if expected != size {
            return Err(RuntimeError::dataset(
                &name,
                format!(
                    "file is {size} bytes but header {:?} describes {expected} bytes",
                    header.dims
                ),
            ));
        }

        let shape = DatasetShape::new(header.dims)?;
        if shape.num_samples() == 0 {
            return Err(RuntimeError::dataset(&name, "dataset has no samples"));
        }

        // Use mmap for large files if enabled
        let source = if config.use_mmap && size >= config.mmap_threshold {
            // SAFETY: The file is opened read-only and we keep the Mmap for
            // the lifetime of the store. Datasets are not written while read.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                RuntimeError::storage_with_source(&path, "failed to memory-map file", e)
            })?;
            Source::Mapped(mmap)
        } else {
            Source::File(Mutex::new(file))
        };

        tracing::debug!(
            path = %path.display(),
            dims = ?shape.dims(),
            mapped = matches!(source, Source::Mapped(_)),
            transfer_mode = %config.transfer_mode,
            "opened array store"
        );

        Ok(Self {
            path,
            name,
            shape,
            data_offset,
            source,
            transfer_mode: config.transfer_mode,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether reads are served from a memory map.
    pub fn is_mapped(&self) -> bool {
        matches!(self.source, Source::Mapped(_))
    }

    fn read_run(&self, byte_start: u64, out: &mut [f32], scratch: &mut Vec<u8>) -> Result<()> {
        let byte_len = out.len() * ELEMENT_BYTES;

        match &self.source {
            Source::Mapped(mmap) => {
                let start = byte_start as usize;
                let end = start + byte_len;
                if end > mmap.len() {
                    return Err(RuntimeError::storage(
                        &self.path,
                        format!("read range {start}..{end} exceeds file size {}", mmap.len()),
                    ));
                }
                decode_f32(&mmap[start..end], out);
            }
            Source::File(file) => {
                let mut file = file
                    .lock()
                    .map_err(|_| RuntimeError::storage(&self.path, "file handle lock poisoned"))?;

                file.seek(SeekFrom::Start(byte_start)).map_err(|e| {
                    RuntimeError::storage_with_source(
                        &self.path,
                        format!("failed to seek to position {byte_start}"),
                        e,
                    )
                })?;

                scratch.resize(byte_len, 0);
                file.read_exact(scratch).map_err(|e| {
                    RuntimeError::storage_with_source(
                        &self.path,
                        format!("failed to read {byte_len} bytes at position {byte_start}"),
                        e,
                    )
                })?;
                decode_f32(scratch, out);
            }
        }

        Ok(())
    }
}

impl ArrayStore for LocalArrayStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> &DatasetShape {
        &self.shape
    }

    fn transfer_mode(&self) -> TransferMode {
        self.transfer_mode
    }

    // A single local file has no peers to coordinate with, so every transfer
    // mode is served with independent reads.
    fn read(&self, selection: &Selection, buffer: &mut [f32]) -> Result<usize> {
        let elements = check_selection(&self.shape, selection, buffer.len())?;
        let per_row = self.shape.sample_elements() as usize;
        let row_bytes = self.shape.sample_bytes();

        let mut scratch = Vec::new();
        let mut filled = 0;
        for run in selection.runs() {
            let len = run.count as usize * per_row;
            let byte_start = self.data_offset + run.start * row_bytes;
            self.read_run(byte_start, &mut buffer[filled..filled + len], &mut scratch)?;
            filled += len;
        }

        Ok(elements * ELEMENT_BYTES)
    }
}

impl std::fmt::Debug for LocalArrayStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalArrayStore")
            .field("path", &self.path)
            .field("shape", &self.shape.dims())
            .field("mapped", &self.is_mapped())
            .field("transfer_mode", &self.transfer_mode)
            .finish()
    }
}

fn decode_f32(bytes: &[u8], out: &mut [f32]) {
    for (dst, chunk) in out.iter_mut().zip(bytes.chunks_exact(ELEMENT_BYTES)) {
        *dst = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}
