use std::path::PathBuf;

use thiserror::Error;

const BODY_PREVIEW_LIMIT: usize = 512;

/// Failure of a single fetch or download attempt, classified once at
/// the transport boundary so callers can branch on [`FetchErrorKind`]
/// without string matching.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out: {url}")]
    Timeout { url: String },
    #[error("connection failed for {url}: {message}")]
    Connect { url: String, message: String },
    #[error("request failed for {url}: {message}")]
    Request { url: String, message: String },
    #[error("unexpected status {status} from {url}: {preview}")]
    Status {
        status: u16,
        url: String,
        preview: String,
    },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("invalid url: {url}")]
    InvalidUrl { url: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build http client: {message}")]
    Client { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Connect,
    Request,
    Status,
    Decode,
    InvalidUrl,
    Io,
    Client,
}

impl FetchErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Status => "status",
            Self::Decode => "decode",
            Self::InvalidUrl => "invalid-url",
            Self::Io => "io",
            Self::Client => "client",
        }
    }
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Timeout { .. } => FetchErrorKind::Timeout,
            Self::Connect { .. } => FetchErrorKind::Connect,
            Self::Request { .. } => FetchErrorKind::Request,
            Self::Status { .. } => FetchErrorKind::Status,
            Self::Decode { .. } => FetchErrorKind::Decode,
            Self::InvalidUrl { .. } => FetchErrorKind::InvalidUrl,
            Self::Io { .. } => FetchErrorKind::Io,
            Self::Client { .. } => FetchErrorKind::Client,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Timeout { url }
            | Self::Connect { url, .. }
            | Self::Request { url, .. }
            | Self::Status { url, .. }
            | Self::Decode { url, .. }
            | Self::InvalidUrl { url } => Some(url),
            Self::Io { .. } | Self::Client { .. } => None,
        }
    }

    pub fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if err.is_connect() {
            FetchError::Connect {
                url,
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            FetchError::Decode {
                url,
                message: err.to_string(),
            }
        } else {
            FetchError::Request {
                url,
                message: err.to_string(),
            }
        }
    }
}

/// Trimmed body excerpt carried inside status/decode errors, enough to
/// diagnose a misbehaving endpoint without logging whole payloads.
pub fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    if trimmed.len() <= BODY_PREVIEW_LIMIT {
        return trimmed.to_string();
    }
    let mut end = BODY_PREVIEW_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}
