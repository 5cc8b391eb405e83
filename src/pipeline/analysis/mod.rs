//! Analysis pipeline: crop identification, local classification, disease
//! narration and the orchestrator that reconciles them into one record.

pub mod types;
pub mod prompt;
pub mod parser;
pub mod labels;
pub mod crop;
pub mod classifier;
pub mod narrator;
pub mod orchestrator;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use labels::*;
pub use crop::*;
pub use classifier::*;
pub use narrator::*;
pub use orchestrator::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::source::SourceError;
use crate::pipeline::vision::VisionError;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Classifier model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Classifier initialization failed: {0}")]
    ModelInit(String),

    #[error("Invalid classifier label config: {0}")]
    LabelConfig(String),

    #[error("Classifier inference failed: {0}")]
    Inference(String),
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Image source error: {0}")]
    Source(#[from] SourceError),

    #[error("Vision service error: {0}")]
    Vision(#[from] VisionError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Analysis panicked: {0}")]
    Panicked(String),
}
