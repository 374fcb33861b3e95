// sampler-core/src/storage/mod.rs

//! Storage abstraction for the epoch sampler.
//!
//! This module defines the [`ArrayStore`] trait the epoch driver reads
//! through, the on-disk array file format, and two implementations: a local
//! file store and an in-memory store.
//!
//! # Example
//!
//! ```no_run
//! use sampler_core::config::StoreConfig;
//! use sampler_core::sampling::SelectionBuilder;
//! use sampler_core::storage::{ArrayStore, LocalArrayStore};
//! use std::path::PathBuf;
//!
//! let config = StoreConfig {
//!     path: PathBuf::from("images.bin"),
//!     ..Default::default()
//! };
//! let store = LocalArrayStore::open(&config).unwrap();
//!
//! let shape = store.shape();
//! let builder = SelectionBuilder::new(shape.num_samples(), shape.sample_shape());
//! let selection = builder.build(&[0, 1, 7]).unwrap();
//!
//! let mut buffer = vec![0.0f32; 3 * shape.sample_elements() as usize];
//! let bytes = store.read(&selection, &mut buffer).unwrap();
//! ```

mod format;
mod local;
mod memory;
mod traits;

pub use format::ArrayHeader;
pub use local::LocalArrayStore;
pub use memory::MemoryArrayStore;
pub use traits::{ArrayStore, DatasetShape, ELEMENT_BYTES};
