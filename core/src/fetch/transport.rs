use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::config::FetchConfig;
use crate::error::{preview_body, FetchError};

/// The two verbs the upstream APIs use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
    /// URL after redirects, for source attribution in the output.
    pub final_url: String,
}

/// Seam between the batch fetch layer and the actual HTTP stack.
/// Production code uses [`HttpTransport`]; tests substitute mocks that
/// count in-flight requests or fail on demand.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request and parse the body as JSON. A non-2xx status or
    /// an undecodable body is an error.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<TransportResponse, FetchError>;

    /// Fetch a body as raw text, for feeds that are not JSON.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;

    /// Stream a body into `dest`, creating parent directories. Returns
    /// the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(cfg: &FetchConfig) -> Result<Self, FetchError> {
        Self::with_headers(cfg, reqwest::header::HeaderMap::new())
    }

    /// Transport with extra default headers, e.g. an `Authorization`
    /// header shared by every request of one source.
    pub fn with_headers(
        cfg: &FetchConfig,
        headers: reqwest::header::HeaderMap,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Client {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    async fn get_checked(&self, url: &str) -> Result<(reqwest::Response, String), FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url))?;
        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: final_url,
                preview: preview_body(&text),
            });
        }
        Ok((response, final_url))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<TransportResponse, FetchError> {
        let request = match method {
            Method::Get => self.client.get(url),
            Method::Post => match payload {
                Some(body) => self.client.post(url).json(body),
                None => self.client.post(url),
            },
        };
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url))?;
        let status = response.status();
        let final_url = response.url().to_string();
        let text = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url))?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: final_url,
                preview: preview_body(&text),
            });
        }
        let body = serde_json::from_str(&text).map_err(|e| FetchError::Decode {
            url: final_url.clone(),
            message: format!("{} | body={}", e, preview_body(&text)),
        })?;
        Ok(TransportResponse {
            status: status.as_u16(),
            body,
            final_url,
        })
    }

    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let (response, _) = self.get_checked(url).await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let (response, _) = self.get_checked(url).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FetchError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|source| FetchError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::from_reqwest(e, url))?;
            file.write_all(&chunk)
                .await
                .map_err(|source| FetchError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(written)
    }
}
