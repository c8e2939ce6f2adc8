//! godata-sources: one module per upstream API the collector pulls
//! from, plus the country lookup service and the orchestrator that
//! assembles the combined output document.

pub mod alerts;
pub mod appeals;
pub mod collector;
pub mod conflict;
pub mod country;
pub mod documents;
pub mod funding;
pub mod population;
pub mod reliefweb;
pub mod schema;

pub use collector::{dump_json, GoDataCollector};
pub use country::{CountryIndex, CountryRecord};
