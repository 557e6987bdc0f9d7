//! # txai_core
//!
//! Core types shared by every txai crate.
//!
//! This crate provides:
//! - [`Seed`] for deterministic random number generation
//! - [`TSShape`] for time series shape metadata
//! - [`TSTensor`] and [`TSBatch`] wrappers around Burn tensors
//! - [`DeterministicMode`], the run-wide reproducibility switch
//! - Error types and backend aliases
//!
//! ## Shape Convention
//!
//! Model inputs follow `(B, V, L)`:
//! - `B`: Batch size (number of series)
//! - `V`: Variables/features
//! - `L`: Sequence length (time steps)
//!
//! Importance arrays are the exception: they are stored as
//! `(N, L, V)` so that one row is one timestep of one series.
//!
//! ## Example
//!
//! ```rust,ignore
//! use txai_core::{DeterministicMode, Seed, TSShape};
//!
//! let mode = DeterministicMode::resolve(true);
//! let seed = mode.seed(Seed::new(2021));
//! let shape = TSShape::new(32, 3, 50);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod determinism;
mod error;
mod seed;
mod shape;
mod split;
mod tensor;

pub use determinism::{DeterministicMode, DETERMINISTIC_ENV};
pub use error::{CoreError, Result};
pub use seed::Seed;
pub use shape::TSShape;
pub use split::Split;
pub use tensor::{
    array2_to_tensor, array3_to_tensor, tensor_to_array2, tensor_to_array3, TSBatch, TSTensor,
};

/// Backend type aliases for convenience.
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::{NdArray, NdArrayDevice};

    pub use burn_autodiff::Autodiff;

    /// Backend used for inference, explanation and evaluation.
    #[cfg(feature = "backend-ndarray")]
    pub type InferBackend = NdArray<f32>;

    /// Backend used for training (autodiff over [`InferBackend`]).
    #[cfg(feature = "backend-ndarray")]
    pub type TrainBackend = Autodiff<InferBackend>;
}
