//! Sift Core - DataFusion engine with web search table functions
//!
//! This crate wires the search connectors into a DataFusion `SessionContext`
//! so search results can be queried with plain SQL.

pub mod engine;

pub use engine::SearchEngine;

// Re-export for downstream consumers
pub use datafusion::arrow::record_batch::RecordBatch;
pub use datafusion::physical_plan::SendableRecordBatchStream;
