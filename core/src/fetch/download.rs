use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::error::FetchError;

use super::transport::Transport;
use super::host_limits;

/// One file to pull: source URL and destination path. The destination
/// layout (`<cache>/pdf/<type>/<title>.pdf`) is the caller's business.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub dest: PathBuf,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
        }
    }
}

/// A download that stayed failed after its retry.
#[derive(Debug)]
pub struct FailedDownload {
    pub url: String,
    pub dest: PathBuf,
    pub error: FetchError,
}

/// Tally of one `download_all` run. Permanent failures are enumerated,
/// never just counted.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Completed on the first, concurrent pass.
    pub succeeded: usize,
    /// Failed first, completed on the sequential retry.
    pub recovered: usize,
    pub failed: Vec<FailedDownload>,
}

impl DownloadReport {
    pub fn total_succeeded(&self) -> usize {
        self.succeeded + self.recovered
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Bulk downloader: a bounded concurrent first pass, then one strictly
/// sequential retry over the first-pass failures.
///
/// Per task: `Pending -> {Success, Failed}`, then
/// `Failed -> {Success, PermanentlyFailed}`. A retry failure is
/// terminal; there is no backoff and no further attempt.
pub struct Downloader {
    transport: Arc<dyn Transport>,
    limit_per_host: usize,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, limit_per_host: usize) -> Self {
        Self {
            transport,
            limit_per_host,
        }
    }

    /// `on_failure` fires once per first-attempt failure and once more
    /// per retry failure.
    pub async fn download_all(
        &self,
        tasks: Vec<DownloadTask>,
        mut on_failure: impl FnMut(&DownloadTask, &FetchError),
    ) -> DownloadReport {
        let mut report = DownloadReport::default();
        let limits = host_limits(tasks.iter().map(|t| t.url.as_str()), self.limit_per_host);

        let mut in_flight = FuturesUnordered::new();
        for (index, (task, limit)) in tasks.iter().zip(&limits).enumerate() {
            let transport = self.transport.clone();
            in_flight.push(async move {
                let result = match limit {
                    Some(semaphore) => {
                        let _permit = semaphore.acquire().await.ok();
                        tracing::info!(url = %task.url, dest = %task.dest.display(), "downloading");
                        transport.download(&task.url, &task.dest).await
                    }
                    None => Err(FetchError::InvalidUrl {
                        url: task.url.clone(),
                    }),
                };
                (index, result)
            });
        }

        // First-attempt failures land here. The driver loop is the only
        // writer, so appends are serialized without a lock.
        let mut registry: Vec<(usize, FetchError)> = Vec::new();
        while let Some((index, result)) = in_flight.next().await {
            match result {
                Ok(bytes) => {
                    tracing::debug!(url = %tasks[index].url, bytes, "download complete");
                    report.succeeded += 1;
                }
                Err(error) => {
                    on_failure(&tasks[index], &error);
                    registry.push((index, error));
                }
            }
        }
        drop(in_flight);

        // Retry pass: strictly after the concurrent pass, one direct
        // attempt per failure, in first-failure order.
        for (index, first_error) in registry {
            let task = &tasks[index];
            tracing::info!(url = %task.url, error = %first_error, "retrying failed download");
            match self.transport.download(&task.url, &task.dest).await {
                Ok(_) => report.recovered += 1,
                Err(error) => {
                    on_failure(task, &error);
                    report.failed.push(FailedDownload {
                        url: task.url.clone(),
                        dest: task.dest.clone(),
                        error,
                    });
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::fetch::{Method, TransportResponse};

    /// Per-URL scripted failure counts: a URL fails its first
    /// `failures_before_success` attempts, then succeeds.
    struct ScriptedTransport {
        scripted: Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(scripted: &[(&str, usize)]) -> Self {
            Self {
                scripted: Mutex::new(
                    scripted
                        .iter()
                        .map(|(url, n)| (url.to_string(), *n))
                        .collect(),
                ),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn attempt(&self, url: &str) -> Result<(), FetchError> {
            let mut scripted = self.scripted.lock().unwrap();
            match scripted.get_mut(url) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    Err(FetchError::Timeout {
                        url: url.to_string(),
                    })
                }
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(
            &self,
            _method: Method,
            url: &str,
            _payload: Option<&Value>,
        ) -> Result<TransportResponse, FetchError> {
            self.attempt(url).map(|_| TransportResponse {
                status: 200,
                body: Value::Null,
                final_url: url.to_string(),
            })
        }

        async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
            self.attempt(url).map(|_| String::new())
        }

        async fn download(&self, url: &str, _dest: &Path) -> Result<u64, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.attempt(url).map(|_| 128)
        }
    }

    fn task(url: &str) -> DownloadTask {
        DownloadTask::new(url, format!("/tmp/out/{}", url.rsplit('/').next().unwrap()))
    }

    #[tokio::test]
    async fn retry_pass_recovers_transient_failures() {
        // fail-once recovers on retry; fail-forever stays failed
        let transport = Arc::new(ScriptedTransport::new(&[
            ("https://docs.example.org/fail-once.pdf", 1),
            ("https://docs.example.org/fail-forever.pdf", 99),
        ]));
        let downloader = Downloader::new(transport, 5);
        let tasks = vec![
            task("https://docs.example.org/ok-1.pdf"),
            task("https://docs.example.org/fail-once.pdf"),
            task("https://docs.example.org/ok-2.pdf"),
            task("https://docs.example.org/fail-forever.pdf"),
        ];

        let mut failure_calls = 0;
        let report = downloader
            .download_all(tasks, |_, _| failure_calls += 1)
            .await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.recovered, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.total_succeeded(), 3);
        assert!(!report.is_clean());
        assert!(report.failed[0].url.ends_with("fail-forever.pdf"));
        // two first-pass failures + one retry failure
        assert_eq!(failure_calls, 3);
    }

    #[tokio::test]
    async fn download_pass_respects_host_ceiling() {
        let transport = Arc::new(ScriptedTransport::new(&[]));
        let downloader = Downloader::new(transport.clone(), 3);
        let tasks: Vec<DownloadTask> = (0..12)
            .map(|i| task(&format!("https://docs.example.org/file-{i}.pdf")))
            .collect();

        let report = downloader.download_all(tasks, |_, _| {}).await;

        assert_eq!(report.succeeded, 12);
        let peak = transport.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {peak}");
    }

    #[tokio::test]
    async fn clean_run_reports_no_failures() {
        let transport = Arc::new(ScriptedTransport::new(&[]));
        let downloader = Downloader::new(transport, 5);
        let report = downloader
            .download_all(vec![task("https://docs.example.org/a.pdf")], |_, _| {
                panic!("no failure expected")
            })
            .await;
        assert!(report.is_clean());
        assert_eq!(report.total_succeeded(), 1);
    }
}
