//! # txai_data
//!
//! Datasets and loaders for txai experiments.
//!
//! This crate provides:
//! - [`TSDataset`] holding `(N, V, L)` series with `(N, W)` labels
//! - [`TSDatasets`] for the train/valid/test parts of one CV fold
//! - [`TSDataLoader`] for seeded, batched iteration as Burn tensors
//! - [`DatasetKind`], the registry of named experiment datasets
//! - npy/npz readers and writers
//! - [`SpikeConfig`], a seeded synthetic dataset with known saliency
//!
//! ## Example
//!
//! ```rust,ignore
//! use txai_core::Seed;
//! use txai_data::{DatasetKind, LoadOptions, TSDataLoaders};
//!
//! let kind: DatasetKind = "spike".parse()?;
//! let data = kind.load("./data", &LoadOptions::default())?;
//! let dls = TSDataLoaders::from_datasets(&data, 64, kind.default_test_batch_size(), Seed::new(2021))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod dataset;
mod error;
mod io;
mod loader;
mod sources;
mod splits;
mod synthetic;

pub use dataset::{TSDataset, TSDatasets};
pub use error::{DataError, Result};
pub use io::{read_npy, read_npz, write_npy, write_npz};
pub use loader::{TSDataLoader, TSDataLoaderBuilder, TSDataLoaders};
pub use sources::{DatasetFamily, DatasetKind, LoadOptions};
pub use splits::{cv_split, FoldSplit};
pub use synthetic::{SpikeConfig, SpikeData};
