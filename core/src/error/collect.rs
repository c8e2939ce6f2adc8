use thiserror::Error;

use crate::aggregate::{AggregateError, FlattenError};
use crate::cache::CacheError;

use super::FetchError;

/// Source-level failure. Only systemic conditions surface as this;
/// per-item failures inside a batch stay inside the batch result.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("unexpected payload from {url}: {detail}")]
    UnexpectedPayload { url: String, detail: String },
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("aggregation error: {0}")]
    Aggregate(#[from] AggregateError),
    #[error("flatten error: {0}")]
    Flatten(#[from] FlattenError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
