//! YAML-configured experiment pipeline.
//!
//! ```text
//! data files -> classifier (train | load) -> generators (optional)
//!            -> explainers -> importance arrays -> evaluation -> results csv
//! ```
//!
//! [`RunConfig`] holds every setting; [`ExplanationRunner`] executes the
//! steps for one dataset fold.

mod config;
mod error;
mod paths;
mod runner;

pub use config::{
    ConfigOverrides, DataSection, DropMode, EvaluationSection, ExplainerSection,
    GeneratorSection, ModelSection, PathSection, RunConfig, StepFlags, DEFAULT_CONFIG_PATH,
};
pub use error::{PipelineError, Result};
pub use paths::RunPaths;
pub use runner::{ClassifierReport, ExplanationRunner, RunSummary};
