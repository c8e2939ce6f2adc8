//! godata-core: the reusable engine behind the godata collector.
//!
//! Two pieces do the real work: [`aggregate`] turns flat record
//! sequences into nested summary trees, and [`fetch`] runs batches of
//! independent requests with bounded per-host concurrency, per-task
//! failure accounting, and (for downloads) a sequential retry pass.
//! The rest is the plumbing every pull needs: a forgiving JSON cache,
//! configuration, progress display, and date/text helpers.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod progress;
pub mod util;

pub use aggregate::{aggregate, KeyFn, KeyValue, Node, Reducer};
pub use cache::Cache;
pub use config::AppConfig;
pub use error::{CollectError, FetchError, FetchErrorKind};
pub use export::CsvExporter;
pub use fetch::{
    DownloadReport, DownloadTask, Downloader, FetchOutcome, FetchTask, Fetcher, HttpTransport,
    Method, Transport, TransportResponse,
};
pub use progress::ProgressMonitor;
