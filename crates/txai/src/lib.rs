//! # txai
//!
//! Feature-importance experiments for time-series classifiers.
//!
//! - **Data**: synthetic and recorded datasets, CV folds, loaders
//! - **Models**: GRU / LSTM / causal CONV classifiers, feature generators
//! - **Training**: classifier and generator training loops, metrics
//! - **Explainers**: WinIT, FO, AFO, Integrated Gradients, Input × Gradient
//! - **Evaluation**: masking-based performance drop, ground-truth scores
//! - **Pipeline**: YAML-configured runs tying everything together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use txai::prelude::*;
//!
//! let config = RunConfig::load("config/main.yaml")?;
//! let mut runner = ExplanationRunner::new(config)?;
//! let summary = runner.run()?;
//! println!("{} result rows", summary.rows);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pipeline;

pub use txai_core as core;
pub use txai_data as data;
pub use txai_eval as eval;
pub use txai_explain as explain;
pub use txai_models as models;
pub use txai_train as train;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use txai::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use txai_core::{DeterministicMode, Seed, Split, TSShape};

    // Data
    pub use txai_data::{
        read_npy, read_npz, write_npy, write_npz, DatasetKind, LoadOptions, SpikeConfig,
        TSDataLoaders, TSDataset, TSDatasets,
    };

    // Models
    pub use txai_models::{
        FeatureGenerator, FeatureGeneratorConfig, ModelType, StateClassifier,
        StateClassifierConfig,
    };

    // Training
    pub use txai_train::{
        ClassificationSummary, ClassifierTrainer, ClassifierTrainerConfig, GeneratorTrainer,
        GeneratorTrainerConfig,
    };

    // Explain
    pub use txai_explain::{
        Aggregation, ClassifierPredictor, Divergence, Explainer, ExplainerSpec, Explanation,
        ImportanceMap, Predictor, WinIT, WinITConfig, WindowedScores,
    };

    // Evaluation
    pub use txai_eval::{
        DropMetrics, MaskMethod, Masker, MaskerConfig, PerformanceDrop, ResultRow, ResultsTable,
        TopK,
    };

    // Pipeline
    pub use crate::pipeline::{ExplanationRunner, RunConfig, RunSummary};
}
