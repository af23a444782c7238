//! Sift Annotations - search engine annotation files
//!
//! This crate writes query results as the XML annotation file a
//! programmable search engine is configured with.

pub mod error;
pub mod writer;

pub use error::AnnotationError;
pub use writer::{AnnotationLimits, AnnotationStats, AnnotationWriter, MAX_ANNOTATIONS, MAX_FILE_BYTES};
