//! Sift Connectors - Web search APIs as DataFusion tables
//!
//! This crate provides the pieces that turn a paginated search API into a
//! virtual table:
//! - Transport with retry/backoff
//! - Query compiler and predicate absorber
//! - Pagination engine (combined and per-site round-robin)
//! - DataFusion table provider, scan exec, table functions and pushdown rule

pub mod config;
pub mod credentials;
pub mod error;
pub mod exec;
pub mod filter;
pub mod function;
pub mod metrics;
pub mod pagination;
pub mod query;
pub mod record;
pub mod request;
pub mod rule;
pub mod scripted;
pub mod sink;
pub mod table;
pub mod transport;

pub use config::{RetryPolicy, SearchConfig};
pub use credentials::{CredentialResolver, EnvCredentials, SearchCredentials, StaticCredentials};
pub use error::SearchError;
pub use exec::SearchScanExec;
pub use filter::{Absorption, LimitHint, Literal, Predicate, PredicateOp, SortHint};
pub use function::SearchTableFunction;
pub use metrics::SearchMetrics;
pub use pagination::{run_scan, PartitionStrategy};
pub use record::{FetchedRecord, ImageRecord, Page, WebRecord};
pub use request::{FilterSet, SearchKind, SearchRequest};
pub use rule::SearchPushdownRule;
pub use table::SearchTable;
pub use transport::{HttpFetcher, RawResponse, ReqwestFetcher, Transport};
