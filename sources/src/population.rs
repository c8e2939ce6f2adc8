use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use godata_core::fetch::{FetchTask, Fetcher};

use crate::country::CountryIndex;

pub const WORLDBANK_API: &str = "http://api.worldbank.org";

/// Total-population indicator queried per country.
const INDICATOR: &str = "SP.POP.TOTL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationPoint {
    pub date: String,
    /// The API reports null for years it has no estimate.
    pub value: Option<f64>,
}

fn population_url(base: &str, iso3: &str, from_year: i32, to_year: i32) -> String {
    format!(
        "{base}/countries/{iso3}/indicators/{INDICATOR}?format=json&per_page=10&date={from_year}:{to_year}"
    )
}

/// World Bank population series, keyed by iso2. A malformed payload
/// loses that one country, logged with its URL; the rest of the batch
/// is unaffected.
pub async fn pull_population(
    fetcher: &Fetcher,
    index: &CountryIndex,
    iso3s: &[String],
    from_year: i32,
    to_year: i32,
    base: &str,
) -> HashMap<String, Vec<PopulationPoint>> {
    let tasks: Vec<FetchTask<String>> = iso3s
        .iter()
        .map(|iso3| {
            FetchTask::get(population_url(base, iso3, from_year, to_year), iso3.clone())
        })
        .collect();
    let responses = fetcher
        .fetch_all(tasks, |task, error| {
            tracing::warn!(url = %task.url, %error, "population query failed");
        })
        .await;

    let mut population = HashMap::new();
    for (outcome, iso3) in responses {
        let Some(body) = outcome.body() else { continue };
        // Body shape: [metadata, [{date, value}, ...]].
        let Some(points) = body
            .get(1)
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        Some(PopulationPoint {
                            date: entry.get("date")?.as_str()?.to_string(),
                            value: entry.get("value").and_then(Value::as_f64),
                        })
                    })
                    .collect::<Vec<_>>()
            })
        else {
            tracing::warn!(%iso3, body = %body, "population payload missing data array");
            continue;
        };
        let iso2 = index.iso3_to_iso2(&iso3).unwrap_or(&iso3).to_string();
        population.insert(iso2, points);
    }
    population
}
