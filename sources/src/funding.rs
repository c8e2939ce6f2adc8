use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use godata_core::aggregate::{aggregate, get_path, KeyFn, KeyValue, Node, Reducer};
use godata_core::cache::Cache;
use godata_core::config::FetchConfig;
use godata_core::error::{CollectError, FetchError};
use godata_core::fetch::{FetchTask, Fetcher, HttpTransport};

use crate::country::CountryIndex;

pub const HPC_API: &str = "https://api.hpc.tools/v1/public";

const FUNDS_FILE: &str = "fts/funds.json";
const FUND_AREAS: [&str; 2] = ["fundingTotals", "pledgeTotals"];

/// One country-year cell of the merged funding tree.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingYear {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_totals: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pledge_totals: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_activations: Option<i64>,
}

type FundsTree = HashMap<String, BTreeMap<i64, FundingYear>>;

/// FTS/HPC funding: per-country yearly funding and pledge totals merged
/// with per-country emergency activation counts.
///
/// The flow endpoint needs basic auth; the credential is encoded once
/// into a transport-level `Authorization` header shared by the whole
/// fan-out.
pub struct FundingSource {
    funds: FundsTree,
}

impl FundingSource {
    pub async fn load(
        cfg: &FetchConfig,
        credential: &str,
        cache: &Cache,
        iso3s: &[String],
        use_cache: bool,
    ) -> Result<Self, CollectError> {
        Self::load_from(cfg, credential, cache, iso3s, use_cache, HPC_API).await
    }

    pub async fn load_from(
        cfg: &FetchConfig,
        credential: &str,
        cache: &Cache,
        iso3s: &[String],
        use_cache: bool,
        base: &str,
    ) -> Result<Self, CollectError> {
        if use_cache {
            if let Some(funds) = cache.load::<FundsTree>(FUNDS_FILE) {
                tracing::info!("using local funding data");
                return Ok(Self { funds });
            }
        }

        tracing::info!(countries = iso3s.len(), "pulling funding data");
        let fetcher = authorized_fetcher(cfg, credential)?;
        let mut funds = pull_funds(&fetcher, base, iso3s).await;
        let counts = pull_activation_counts(&fetcher, base, iso3s).await?;
        merge_counts(&mut funds, &counts);
        cache.store(FUNDS_FILE, &funds)?;
        Ok(Self { funds })
    }

    /// Merged `year -> {fundingTotals, pledgeTotals, numActivations}`
    /// for one country.
    pub fn data_for(&self, index: &CountryIndex, iso2: &str) -> Option<Value> {
        let iso3 = index.iso2_to_iso3(iso2)?;
        self.funds
            .get(iso3)
            .and_then(|years| serde_json::to_value(years).ok())
    }
}

fn authorized_fetcher(cfg: &FetchConfig, credential: &str) -> Result<Fetcher, FetchError> {
    let mut headers = HeaderMap::new();
    let encoded = format!("Basic {}", URL_SAFE.encode(credential));
    let value = HeaderValue::from_str(&encoded).map_err(|e| FetchError::Client {
        message: format!("credential is not a valid header value: {e}"),
    })?;
    headers.insert(AUTHORIZATION, value);
    Ok(Fetcher::new(
        Arc::new(HttpTransport::with_headers(cfg, headers)?),
        cfg.limit_per_host,
    ))
}

fn flow_url(base: &str, iso3: &str) -> String {
    format!("{base}/fts/flow?countryISO3={iso3}&groupby=year&report=3")
}

fn emergency_url(base: &str, iso3: &str) -> String {
    format!("{base}/emergency/country/{iso3}")
}

/// Yearly funding/pledge totals per country. The country comes from the
/// correlation token, never from parsing the URL back.
async fn pull_funds(fetcher: &Fetcher, base: &str, iso3s: &[String]) -> FundsTree {
    let tasks: Vec<FetchTask<String>> = iso3s
        .iter()
        .map(|iso3| FetchTask::get(flow_url(base, iso3), iso3.clone()))
        .collect();
    let responses = fetcher
        .fetch_all(tasks, |task, error| {
            tracing::warn!(url = %task.url, %error, "funding flow query failed");
        })
        .await;

    let mut funds = FundsTree::new();
    for (outcome, iso3) in responses {
        let Some(body) = outcome.body() else { continue };
        let years = funds.entry(iso3).or_default();
        for area in FUND_AREAS {
            let breakdown = get_path(body, &format!("data__report3__{area}__objects"), "__")
                .and_then(Value::as_array)
                .and_then(|objects| objects.first())
                .and_then(|first| first.get("objectsBreakdown"))
                .and_then(Value::as_array);
            for entry in breakdown.into_iter().flatten() {
                let Some(year) = entry
                    .get("name")
                    .and_then(Value::as_str)
                    .and_then(|name| name.parse::<i64>().ok())
                else {
                    tracing::warn!(entry = %entry, "funding breakdown with non-year name, skipping");
                    continue;
                };
                let total = entry.get("totalFunding").and_then(Value::as_f64);
                let cell = years.entry(year).or_default();
                match area {
                    "fundingTotals" => cell.funding_totals = total,
                    _ => cell.pledge_totals = total,
                }
            }
        }
    }
    funds
}

/// Emergency activation counts per country per year, computed with one
/// aggregation over every (iso3, year) pair seen across the fan-out.
async fn pull_activation_counts(
    fetcher: &Fetcher,
    base: &str,
    iso3s: &[String],
) -> Result<Node, CollectError> {
    let tasks: Vec<FetchTask<String>> = iso3s
        .iter()
        .map(|iso3| FetchTask::get(emergency_url(base, iso3), iso3.clone()))
        .collect();
    let responses = fetcher
        .fetch_all(tasks, |task, error| {
            tracing::warn!(url = %task.url, %error, "emergency count query failed");
        })
        .await;

    let mut records: Vec<(String, i64)> = Vec::new();
    for (outcome, iso3) in responses {
        let Some(body) = outcome.body() else { continue };
        for emergency in body
            .get("data")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let Some(year) = emergency
                .get("date")
                .and_then(Value::as_str)
                .and_then(year_of_date)
            else {
                continue;
            };
            records.push((iso3.clone(), year));
        }
    }

    let by_iso3 = |r: &(String, i64)| KeyValue::Str(r.0.clone());
    let by_year = |r: &(String, i64)| KeyValue::Int(r.1);
    let keys: [KeyFn<'_, (String, i64)>; 2] = [&by_iso3, &by_year];
    Ok(aggregate(&records, &keys, &|_| None, Reducer::Count)?)
}

fn year_of_date(date: &str) -> Option<i64> {
    date.get(..4)?.parse().ok()
}

fn merge_counts(funds: &mut FundsTree, counts: &Node) {
    let Some(countries) = counts.children() else { return };
    for (iso3, years) in countries {
        let KeyValue::Str(iso3) = iso3 else { continue };
        let Some(years) = years.children() else { continue };
        let cells = funds.entry(iso3.clone()).or_default();
        for (year, count) in years {
            let KeyValue::Int(year) = year else { continue };
            cells.entry(*year).or_default().num_activations =
                count.value().map(|v| v as i64);
        }
    }
}
