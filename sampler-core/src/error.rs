// sampler-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Dataset '{name}' error: {message}")]
    Dataset {
        name: String,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Worker {worker_id} out of range (workers: {workers})")]
    InvalidWorker {
        worker_id: u32,
        workers: u32,
    },

    #[error("Sample index {index} out of range (samples: {num_samples})")]
    IndexOutOfRange {
        index: u64,
        num_samples: u64,
    },

    #[error("Invalid selection: {message}")]
    InvalidSelection {
        message: String,
    },

    #[error("Read failed in epoch {epoch}, batch {batch}")]
    BatchRead {
        epoch: u64,
        batch: usize,
        #[source]
        source: Box<RuntimeError>,
    },

    #[error("Run aborted: {reason}")]
    Aborted {
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

// Convenience constructors
impl RuntimeError {

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn dataset(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dataset {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_worker(worker_id: u32, workers: u32) -> Self {
        Self::InvalidWorker { worker_id, workers }
    }

    pub fn index_out_of_range(index: u64, num_samples: u64) -> Self {
        Self::IndexOutOfRange { index, num_samples }
    }

    pub fn invalid_selection(message: impl Into<String>) -> Self {
        Self::InvalidSelection {
            message: message.into(),
        }
    }

    pub fn batch_read(epoch: u64, batch: usize, source: RuntimeError) -> Self {
        Self::BatchRead {
            epoch,
            batch,
            source: Box::new(source),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Whether this error came from a peer's abort rather than a local failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
