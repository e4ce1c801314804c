// src/services/mod.rs
//! Single-call features built on the generative-text service.

pub mod quiz;
pub mod tutor;

pub use quiz::{Quiz, QuizQuestion, QuizService};
pub use tutor::TutorService;

use crate::pipeline::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Unsupported file type. Please upload a PDF or PPT file.")]
    UnsupportedFileType,

    #[error("Message must not be empty")]
    EmptyMessage,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The text service rejected the request or returned nothing usable.
    #[error("Text generation failed: {0}")]
    Upstream(String),
}
