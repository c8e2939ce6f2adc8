use std::path::Path;

use super::types::AppConfig;

pub const CONFIG_FILENAME: &str = "godata.toml";

/// Load `./godata.toml` when present, else defaults, then apply
/// environment overrides (highest priority).
pub fn load_default() -> anyhow::Result<AppConfig> {
    let local_config = Path::new(CONFIG_FILENAME);

    let mut cfg: AppConfig = if local_config.exists() {
        let s = std::fs::read_to_string(local_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else {
        AppConfig::default()
    };

    if let Ok(v) = std::env::var("GODATA_CACHE_DIR") {
        if !v.trim().is_empty() {
            cfg.cache.directory = v;
        }
    }
    if let Ok(v) = std::env::var("GODATA_HPC_CREDENTIAL") {
        if !v.trim().is_empty() {
            cfg.collect.hpc_credential = v;
        }
    }
    if let Ok(v) = std::env::var("GODATA_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }

    Ok(cfg)
}
