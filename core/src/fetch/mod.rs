//! Bounded concurrent fetch with per-task failure accounting.
//!
//! A batch of independent requests runs simultaneously, capped per
//! destination host, driven by a single `FuturesUnordered` polled from
//! the calling task: cooperative interleaving, no spawned threads of
//! control. One failed task never aborts its siblings; the caller gets
//! every outcome back in submission order and correlates by token.

mod download;
mod transport;

pub use download::{DownloadReport, DownloadTask, Downloader, FailedDownload};
pub use transport::{HttpTransport, Method, Transport, TransportResponse};

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Simultaneous in-flight requests permitted to one host in one batch.
pub const DEFAULT_LIMIT_PER_HOST: usize = 5;

/// One unit of work for a batch fetch. The `token` is opaque to the
/// fetch layer and handed back untouched with the outcome, so the
/// caller never has to rely on completion order.
#[derive(Debug, Clone)]
pub struct FetchTask<T> {
    pub url: String,
    pub payload: Option<Value>,
    pub token: T,
}

impl<T> FetchTask<T> {
    pub fn get(url: impl Into<String>, token: T) -> Self {
        Self {
            url: url.into(),
            payload: None,
            token,
        }
    }

    pub fn post(url: impl Into<String>, payload: Value, token: T) -> Self {
        Self {
            url: url.into(),
            payload: Some(payload),
            token,
        }
    }
}

/// Terminal result of one task, consumed exactly once by the caller.
#[derive(Debug)]
pub enum FetchOutcome {
    Success {
        status: u16,
        body: Value,
        final_url: String,
    },
    Failure(FetchError),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            FetchOutcome::Success { body, .. } => Some(body),
            FetchOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FetchOutcome::Success { .. } => None,
            FetchOutcome::Failure(error) => Some(error),
        }
    }
}

/// One semaphore per distinct destination host, scoped to a single
/// batch. A task with an unparseable URL gets no slot and fails on its
/// own without touching its siblings.
fn host_limits<'a>(
    urls: impl Iterator<Item = &'a str>,
    limit: usize,
) -> Vec<Option<Arc<Semaphore>>> {
    let mut hosts: HashMap<String, Arc<Semaphore>> = HashMap::new();
    urls.map(|url| {
        host_of(url).map(|host| {
            hosts
                .entry(host)
                .or_insert_with(|| Arc::new(Semaphore::new(limit)))
                .clone()
        })
    })
    .collect()
}

fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    limit_per_host: usize,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, limit_per_host: usize) -> Self {
        Self {
            transport,
            limit_per_host,
        }
    }

    pub fn from_config(cfg: &FetchConfig) -> Result<Self, FetchError> {
        Ok(Self::new(
            Arc::new(HttpTransport::new(cfg)?),
            cfg.limit_per_host,
        ))
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// GET every task concurrently; outcomes in submission order.
    /// `on_failure` fires exactly once per failing task, from the
    /// driver loop, so callers need no synchronization of their own.
    pub async fn fetch_all<T>(
        &self,
        tasks: Vec<FetchTask<T>>,
        on_failure: impl FnMut(&FetchTask<T>, &FetchError),
    ) -> Vec<(FetchOutcome, T)> {
        self.run_batch(Method::Get, tasks, on_failure).await
    }

    /// POST variant of [`Fetcher::fetch_all`]; each task's payload is
    /// sent as a JSON body.
    pub async fn post_all<T>(
        &self,
        tasks: Vec<FetchTask<T>>,
        on_failure: impl FnMut(&FetchTask<T>, &FetchError),
    ) -> Vec<(FetchOutcome, T)> {
        self.run_batch(Method::Post, tasks, on_failure).await
    }

    async fn run_batch<T>(
        &self,
        method: Method,
        tasks: Vec<FetchTask<T>>,
        mut on_failure: impl FnMut(&FetchTask<T>, &FetchError),
    ) -> Vec<(FetchOutcome, T)> {
        let limits = host_limits(tasks.iter().map(|t| t.url.as_str()), self.limit_per_host);

        let mut in_flight = FuturesUnordered::new();
        for (index, (task, limit)) in tasks.iter().zip(&limits).enumerate() {
            let transport = self.transport.clone();
            in_flight.push(async move {
                let result = match limit {
                    Some(semaphore) => {
                        let _permit = semaphore.acquire().await.ok();
                        transport.execute(method, &task.url, task.payload.as_ref()).await
                    }
                    None => Err(FetchError::InvalidUrl {
                        url: task.url.clone(),
                    }),
                };
                (index, result)
            });
        }

        // Completion order is arbitrary; slots keyed by submission index
        // restore the caller-visible ordering.
        let mut slots: Vec<Option<FetchOutcome>> = (0..tasks.len()).map(|_| None).collect();
        while let Some((index, result)) = in_flight.next().await {
            slots[index] = Some(match result {
                Ok(response) => FetchOutcome::Success {
                    status: response.status,
                    body: response.body,
                    final_url: response.final_url,
                },
                Err(error) => {
                    on_failure(&tasks[index], &error);
                    FetchOutcome::Failure(error)
                }
            });
        }
        drop(in_flight);

        slots
            .into_iter()
            .zip(tasks)
            .map(|(outcome, task)| {
                let outcome = outcome.unwrap_or_else(|| {
                    FetchOutcome::Failure(FetchError::Request {
                        url: task.url.clone(),
                        message: "task produced no result".to_string(),
                    })
                });
                (outcome, task.token)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    /// Transport that records the peak number of concurrent calls and
    /// fails any URL containing `fail`.
    struct CountingTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl CountingTransport {
        fn new(delay: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                delay,
            }
        }

        async fn enter(&self, url: &str) -> Result<(), FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if url.contains("fail") {
                return Err(FetchError::Status {
                    status: 500,
                    url: url.to_string(),
                    preview: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn execute(
            &self,
            _method: Method,
            url: &str,
            _payload: Option<&Value>,
        ) -> Result<TransportResponse, FetchError> {
            self.enter(url).await?;
            Ok(TransportResponse {
                status: 200,
                body: json!({"url": url}),
                final_url: url.to_string(),
            })
        }

        async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
            self.enter(url).await?;
            Ok(String::new())
        }

        async fn download(&self, url: &str, _dest: &Path) -> Result<u64, FetchError> {
            self.enter(url).await?;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn outcomes_preserve_submission_order() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(1)));
        let fetcher = Fetcher::new(transport, DEFAULT_LIMIT_PER_HOST);
        let tasks: Vec<FetchTask<usize>> = (0..6)
            .map(|i| {
                let url = if i % 3 == 1 {
                    format!("https://api.example.org/fail/{i}")
                } else {
                    format!("https://api.example.org/ok/{i}")
                };
                FetchTask::get(url, i)
            })
            .collect();

        let mut failures = 0;
        let results = fetcher.fetch_all(tasks, |_, _| failures += 1).await;

        assert_eq!(results.len(), 6);
        for (i, (outcome, token)) in results.iter().enumerate() {
            assert_eq!(*token, i);
            assert_eq!(outcome.is_success(), i % 3 != 1);
        }
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn per_host_ceiling_is_respected() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(10)));
        let fetcher = Fetcher::new(transport.clone(), 5);
        let tasks: Vec<FetchTask<usize>> = (0..20)
            .map(|i| FetchTask::get(format!("https://one-host.example.org/item/{i}"), i))
            .collect();

        let results = fetcher.fetch_all(tasks, |_, _| {}).await;

        assert_eq!(results.len(), 20);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 20);
        let peak = transport.peak.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak in-flight was {peak}");
        assert!(peak > 1, "batch never actually overlapped");
    }

    #[tokio::test]
    async fn hosts_are_limited_independently() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(10)));
        let fetcher = Fetcher::new(transport.clone(), 2);
        let mut tasks = Vec::new();
        for i in 0..4 {
            tasks.push(FetchTask::get(format!("https://a.example.org/{i}"), i));
            tasks.push(FetchTask::get(format!("https://b.example.org/{i}"), 10 + i));
        }

        fetcher.fetch_all(tasks, |_, _| {}).await;

        // Two hosts at 2 each can overlap up to 4 in total.
        let peak = transport.peak.load(Ordering::SeqCst);
        assert!(peak > 2, "hosts were serialized together, peak={peak}");
        assert!(peak <= 4, "peak in-flight was {peak}");
    }

    #[tokio::test]
    async fn invalid_url_fails_alone() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(1)));
        let fetcher = Fetcher::new(transport, DEFAULT_LIMIT_PER_HOST);
        let tasks = vec![
            FetchTask::get("not a url at all", "bad"),
            FetchTask::get("https://api.example.org/ok", "good"),
        ];

        let mut failed_tokens = Vec::new();
        let results = fetcher
            .fetch_all(tasks, |task, _| failed_tokens.push(task.token))
            .await;

        assert!(!results[0].0.is_success());
        assert!(results[1].0.is_success());
        assert_eq!(failed_tokens, vec!["bad"]);
    }

    #[tokio::test]
    async fn empty_batch_returns_empty() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(1)));
        let fetcher = Fetcher::new(transport, DEFAULT_LIMIT_PER_HOST);
        let results = fetcher.fetch_all(Vec::<FetchTask<()>>::new(), |_, _| {}).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn post_all_carries_payloads() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(1)));
        let fetcher = Fetcher::new(transport, DEFAULT_LIMIT_PER_HOST);
        let tasks = vec![FetchTask::post(
            "https://api.example.org/query",
            json!({"limit": 1}),
            ("cholera", 2010, 1),
        )];
        let results = fetcher.post_all(tasks, |_, _| {}).await;
        assert_eq!(results[0].1, ("cholera", 2010, 1));
        assert!(results[0].0.is_success());
    }
}
