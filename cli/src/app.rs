//! Command implementations: wire configuration and sources together,
//! run the pull, report the outcome.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use godata_core::cache::Cache;
use godata_core::config::AppConfig;
use godata_core::error::CollectError;
use godata_core::export::CsvExporter;
use godata_core::fetch::HttpTransport;
use godata_core::progress::ProgressMonitor;
use godata_core::util::time::human_duration;
use godata_sources::collector::{dump_json, GoDataCollector};
use godata_sources::documents::{download_documents, list_documents, FEED_TYPES};

use crate::commands::cli::{CollectArgs, DocumentsArgs};

pub async fn run_collect(
    args: &CollectArgs,
    cfg: &AppConfig,
    quiet: bool,
) -> Result<i32, CollectError> {
    let started = Instant::now();

    let collector = GoDataCollector::initialize(cfg, args.test, args.use_cache).await?;
    let mut progress = ProgressMonitor::new(collector.country_count(), !quiet);
    progress.set_message("Collecting data");

    let document = collector.collect(&mut progress).await?;
    progress.finish("Collection finished");

    dump_json(&args.output_file, &document)?;

    if let Some(csv_path) = &args.csv {
        let docs: Vec<Value> = document
            .get("countries")
            .and_then(Value::as_object)
            .map(|countries| countries.values().cloned().collect())
            .unwrap_or_default();
        let rows = CsvExporter::new(vec!["country".to_string()]).export(&docs, csv_path)?;
        tracing::info!(path = %csv_path.display(), rows, "wrote csv export");
    }

    tracing::info!(
        elapsed = %human_duration(started.elapsed()),
        "collection run complete"
    );
    Ok(0)
}

pub async fn run_documents(
    args: &DocumentsArgs,
    cfg: &AppConfig,
) -> Result<i32, CollectError> {
    let started = Instant::now();
    let cache_dir = args
        .cache_dir
        .clone()
        .unwrap_or_else(|| cfg.cache.directory.clone());
    let cache = Cache::new(&cache_dir);
    let transport = Arc::new(HttpTransport::new(&cfg.fetch)?);

    if args.list_only {
        let listings = list_documents(transport.as_ref(), &FEED_TYPES).await?;
        for listing in &listings {
            println!("{}\t{}\t{}", listing.doc_type, listing.title, listing.url);
        }
        tracing::info!(documents = listings.len(), "listing complete");
        return Ok(0);
    }

    let report =
        download_documents(transport, &cache, &FEED_TYPES, cfg.fetch.limit_per_host).await?;

    tracing::info!(
        succeeded = report.succeeded,
        recovered = report.recovered,
        failed = report.failed.len(),
        elapsed = %human_duration(started.elapsed()),
        "document download complete"
    );
    for failure in &report.failed {
        tracing::error!(
            url = %failure.url,
            dest = %failure.dest.display(),
            error = %failure.error,
            "permanently failed download"
        );
    }

    Ok(if report.is_clean() { 0 } else { 1 })
}
