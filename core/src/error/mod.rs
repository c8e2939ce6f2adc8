mod collect;
mod fetch;

pub use collect::CollectError;
pub use fetch::{preview_body, FetchError, FetchErrorKind};
