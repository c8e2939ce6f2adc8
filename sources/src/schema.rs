//! Field, source and unit names used in the assembled output document.

pub mod fields {
    pub const VALUE: &str = "value";
    pub const SOURCE_URL: &str = "sourceUrl";
    pub const SOURCE: &str = "source";
    pub const DATE_PULLED: &str = "datePulled";
    pub const UNIT: &str = "unit";
}

pub mod sources {
    pub const RELIEFWEB: &str = "reliefweb";
    pub const ACLED: &str = "acled";
    pub const GO_API: &str = "prddsgocdnapi.azureedge.net";
    pub const START_NETWORK: &str = "startnetwork";
}

pub mod units {
    pub const COUNT: &str = "count";
    pub const AVERAGE: &str = "average";
}
