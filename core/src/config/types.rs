use serde::{Deserialize, Serialize};

use crate::fetch::DEFAULT_LIMIT_PER_HOST;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub collect: CollectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Working directory for pulled data, summaries and downloads.
    #[serde(default = "default_cache_dir")]
    pub directory: String,
}

fn default_cache_dir() -> String {
    ".cache".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Simultaneous in-flight requests permitted per destination host.
    #[serde(default = "default_limit_per_host")]
    pub limit_per_host: usize,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Some upstream feeds reject requests without a browser UA.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_limit_per_host() -> usize {
    DEFAULT_LIMIT_PER_HOST
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:63.0) Gecko/20100101 Firefox/63.0".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            limit_per_host: default_limit_per_host(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory`.
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "godata_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Directory for log files; unset means alongside the cache.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectConfig {
    /// How many countries a test-mode run covers.
    #[serde(default = "default_test_country_cap")]
    pub test_country_cap: usize,

    /// `username:password` for the HPC funding API.
    #[serde(default)]
    pub hpc_credential: String,
}

fn default_test_country_cap() -> usize {
    2
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            test_country_cap: default_test_country_cap(),
            hpc_credential: String::new(),
        }
    }
}
