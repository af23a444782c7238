//! Typed errors for the annotations crate.

use arrow::error::ArrowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnnotationError {
    /// Input columns do not have the annotation layout.
    #[error("annotation schema: {0}")]
    Schema(String),

    #[error("invalid action '{0}': must be 'include' or 'exclude'")]
    InvalidAction(String),

    #[error("invalid score {0:.2}: must be between -1.0 and 1.0")]
    ScoreOutOfRange(f64),

    #[error("annotation limit exceeded: maximum {max} annotations allowed")]
    TooManyAnnotations { max: usize },

    #[error("annotation file size limit exceeded: maximum {max} bytes allowed")]
    FileTooLarge { max: usize },

    #[error("annotation writer already finished")]
    Finished,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}
