mod load;
mod types;

pub use load::load_default;
pub use types::{AppConfig, CacheConfig, CollectConfig, FetchConfig, LoggingConfig};
