use std::collections::HashMap;

use serde_json::{json, Map, Value};

use godata_core::aggregate::{aggregate, get_path, KeyFn, KeyValue, Node, Reducer};
use godata_core::cache::Cache;
use godata_core::error::CollectError;
use godata_core::fetch::{Fetcher, Method};
use godata_core::util::text::snake_to_camel;
use godata_core::util::time::year_month_of;

pub const API_ENDPOINT: &str = "https://prddsgocdnapi.azureedge.net/api/v2";

pub const REGION_NAMES: [(i64, &str); 5] = [
    (0, "AFRICA"),
    (1, "AMERICAS"),
    (2, "ASIA_PACIFIC"),
    (3, "EUROPE"),
    (4, "MENA"),
];

/// Appeal type ids as the API encodes them.
fn appeal_type_name(atype: i64) -> Option<&'static str> {
    match atype {
        0 => Some("DREF"),
        1 => Some("APPEAL"),
        2 => Some("INTL"),
        _ => None,
    }
}

/// Bookkeeping fields dropped from normalized appeal records.
const DROPPED_FIELDS: [&str; 8] = [
    "created_at",
    "modified_at",
    "event",
    "needs_confirmation",
    "status",
    "aid",
    "region",
    "country",
];

pub const METRIC_REQUESTED: &str = "amountRequested";
pub const METRIC_FUNDED: &str = "amountFunded";
pub const METRIC_BENEFICIARIES: &str = "numBeneficiaries";

/// One (group, dtype, atype, month, metric) contribution, the record
/// shape fed to the aggregator.
struct AppealRow {
    group: i64,
    dtype: i64,
    atype: &'static str,
    month: String,
    metric: &'static str,
    value: f64,
}

enum Grouping {
    Country,
    Region,
}

#[derive(Debug)]
pub struct AppealsSummary {
    pub by_country: Node,
    pub by_region: Node,
}

/// Appeals (GO API): full pull of every appeal record, summarized as
/// `group -> dtype -> atype -> month -> metric` sum trees, both
/// country-wise and region-wise.
pub struct AppealsSource {
    base: String,
    summary: AppealsSummary,
    disaster_types: HashMap<i64, String>,
}

impl AppealsSource {
    pub async fn load(
        fetcher: &Fetcher,
        cache: &Cache,
        use_cache: bool,
    ) -> Result<Self, CollectError> {
        Self::load_from(fetcher, cache, use_cache, API_ENDPOINT).await
    }

    pub async fn load_from(
        fetcher: &Fetcher,
        cache: &Cache,
        use_cache: bool,
        base: &str,
    ) -> Result<Self, CollectError> {
        let cached: Option<Vec<Value>> = if use_cache {
            cache.load("go_api/data.json")
        } else {
            None
        };
        let data = match cached {
            Some(data) => {
                tracing::info!("using local appeals data");
                data
            }
            None => {
                tracing::info!("pulling appeals data");
                let data = Self::pull(fetcher, base).await?;
                cache.store("go_api/data.json", &data)?;
                data
            }
        };

        let disaster_types = match use_cache
            .then(|| cache.load::<HashMap<i64, String>>("go_api/disaster_types.json"))
            .flatten()
        {
            Some(types) => types,
            None => {
                let types = Self::pull_disaster_types(fetcher, base).await?;
                cache.store("go_api/disaster_types.json", &types)?;
                types
            }
        };

        tracing::info!(appeals = data.len(), "re-calculating appeals summary");
        let summary = summarize(&data)?;
        cache.store(
            "go_api/summary.json",
            &json!({"cw": summary.by_country, "rw": summary.by_region}),
        )?;

        Ok(Self {
            base: base.to_string(),
            summary,
            disaster_types,
        })
    }

    /// Two-step pull: ask for the record count, then everything.
    async fn pull(fetcher: &Fetcher, base: &str) -> Result<Vec<Value>, CollectError> {
        let transport = fetcher.transport();
        let url = format!("{base}/appeal/?limit=1");
        let first = transport.execute(Method::Get, &url, None).await?;
        let count = first
            .body
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| CollectError::UnexpectedPayload {
                url,
                detail: "missing `count`".to_string(),
            })?;

        let full = transport
            .execute(Method::Get, &format!("{base}/appeal/?limit={count}"), None)
            .await?;
        Ok(full
            .body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn pull_disaster_types(
        fetcher: &Fetcher,
        base: &str,
    ) -> Result<HashMap<i64, String>, CollectError> {
        let transport = fetcher.transport();
        let response = transport
            .execute(Method::Get, &format!("{base}/disaster_type/"), None)
            .await?;
        let mut types = HashMap::new();
        for entry in response
            .body
            .get("results")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let (Some(id), Some(name)) = (
                entry.get("id").and_then(Value::as_i64),
                entry.get("name").and_then(Value::as_str),
            ) {
                types.insert(id, name.to_string());
            }
        }
        Ok(types)
    }

    /// Latest appeal for one country, normalized; `{}` when the country
    /// has none.
    pub async fn latest_appeal(
        &self,
        fetcher: &Fetcher,
        country_id: i64,
    ) -> Result<(String, Value), CollectError> {
        let url = format!(
            "{}/appeal/?limit=1&ordering=id&country={country_id}",
            self.base
        );
        let response = fetcher.transport().execute(Method::Get, &url, None).await?;
        let latest = response
            .body
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .map(normalize)
            .unwrap_or_else(|| Value::Object(Map::new()));
        Ok((format!("{}/appeal/", self.base), latest))
    }

    pub fn by_country(&self, country_id: i64) -> Option<&Node> {
        self.summary.by_country.get(&KeyValue::Int(country_id))
    }

    pub fn by_region(&self, region_id: i64) -> Option<&Node> {
        self.summary.by_region.get(&KeyValue::Int(region_id))
    }

    pub fn disaster_type_names(&self) -> &HashMap<i64, String> {
        &self.disaster_types
    }
}

/// Drop bookkeeping fields, camelCase the rest, and replace the numeric
/// appeal type with its name.
pub fn normalize(datum: &Value) -> Value {
    let Some(map) = datum.as_object() else {
        return datum.clone();
    };
    let mut out = Map::new();
    for (key, value) in map {
        if DROPPED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        out.insert(snake_to_camel(key), value.clone());
    }
    if let Some(name) = datum
        .get("atype")
        .and_then(Value::as_i64)
        .and_then(appeal_type_name)
    {
        out.insert("atype".to_string(), Value::String(name.to_string()));
    }
    Value::Object(out)
}

fn summarize(data: &[Value]) -> Result<AppealsSummary, CollectError> {
    Ok(AppealsSummary {
        by_country: summarize_rows(rows(data, Grouping::Country))?,
        by_region: summarize_rows(rows(data, Grouping::Region))?,
    })
}

fn summarize_rows(rows: Vec<AppealRow>) -> Result<Node, CollectError> {
    let keys: [KeyFn<'_, AppealRow>; 5] = [
        &|r| KeyValue::Int(r.group),
        &|r| KeyValue::Int(r.dtype),
        &|r| KeyValue::from(r.atype),
        &|r| KeyValue::Str(r.month.clone()),
        &|r| KeyValue::from(r.metric),
    ];
    Ok(aggregate(&rows, &keys, &|r| Some(r.value), Reducer::Sum)?)
}

/// Amounts arrive as either JSON numbers or decimal strings.
fn amount(datum: &Value, field: &str) -> f64 {
    match datum.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn start_month(datum: &Value) -> Option<String> {
    let date = datum.get("start_date")?.as_str()?;
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(date) {
        return Some(year_month_of(parsed.date_naive()));
    }
    // Some records carry a bare `YYYY-MM-DD...` string.
    let prefix = date.get(..7)?;
    prefix
        .as_bytes()
        .get(4)
        .filter(|b| **b == b'-')
        .map(|_| prefix.to_string())
}

fn rows(data: &[Value], grouping: Grouping) -> Vec<AppealRow> {
    let mut rows = Vec::new();
    for datum in data {
        let Some(dtype) = get_path(datum, "dtype__id", "__").and_then(Value::as_i64) else {
            tracing::warn!(datum = %datum, "appeal without disaster type, skipping");
            continue;
        };
        let Some(atype) = datum
            .get("atype")
            .and_then(Value::as_i64)
            .and_then(appeal_type_name)
        else {
            continue;
        };
        let Some(month) = start_month(datum) else {
            tracing::warn!(datum = %datum, "appeal without a usable start date, skipping");
            continue;
        };

        let requested = amount(datum, "amount_requested");
        let funded = amount(datum, "amount_funded");
        let beneficiaries = datum
            .get("num_beneficiaries")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let group = match grouping {
            Grouping::Country => {
                // Country-wise skips appeals with no country or nothing
                // reported on any metric.
                let country_id = get_path(datum, "country__id", "__").and_then(Value::as_i64);
                let Some(country_id) = country_id else { continue };
                if requested == 0.0 && funded == 0.0 && beneficiaries == 0.0 {
                    continue;
                }
                country_id
            }
            Grouping::Region => {
                let Some(region_id) =
                    get_path(datum, "region__id", "__").and_then(Value::as_i64)
                else {
                    continue;
                };
                region_id
            }
        };

        for (metric, value) in [
            (METRIC_REQUESTED, requested),
            (METRIC_FUNDED, funded),
            (METRIC_BENEFICIARIES, beneficiaries),
        ] {
            rows.push(AppealRow {
                group,
                dtype,
                atype,
                month: month.clone(),
                metric,
                value,
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn appeal(
        country: Option<i64>,
        region: Option<i64>,
        dtype: i64,
        atype: i64,
        start: &str,
        requested: &str,
        funded: &str,
        beneficiaries: i64,
    ) -> Value {
        json!({
            "country": country.map(|id| json!({"id": id, "iso": "XX"})),
            "region": region.map(|id| json!({"id": id})),
            "dtype": {"id": dtype, "name": "Flood"},
            "atype": atype,
            "start_date": start,
            "amount_requested": requested,
            "amount_funded": funded,
            "num_beneficiaries": beneficiaries,
            "created_at": "2018-01-01T00:00:00Z",
            "status": "active",
        })
    }

    #[test]
    fn summary_sums_per_country_dtype_atype_month_metric() {
        let data = vec![
            appeal(Some(14), Some(2), 12, 0, "2018-06-14T00:00:00Z", "100.0", "40.0", 500),
            appeal(Some(14), Some(2), 12, 0, "2018-06-20T00:00:00Z", "50.0", "10.0", 100),
            appeal(Some(14), Some(2), 12, 1, "2018-07-01T00:00:00Z", "7.0", "7.0", 7),
        ];
        let summary = summarize(&data).unwrap();
        let leaf = |atype: &str, month: &str, metric: &str| {
            summary
                .by_country
                .get_path(&[
                    14i64.into(),
                    12i64.into(),
                    atype.into(),
                    month.into(),
                    metric.into(),
                ])
                .and_then(Node::value)
        };
        assert_eq!(leaf("DREF", "2018-06", METRIC_REQUESTED), Some(150.0));
        assert_eq!(leaf("DREF", "2018-06", METRIC_FUNDED), Some(50.0));
        assert_eq!(leaf("DREF", "2018-06", METRIC_BENEFICIARIES), Some(600.0));
        assert_eq!(leaf("APPEAL", "2018-07", METRIC_REQUESTED), Some(7.0));
    }

    #[test]
    fn country_summary_skips_empty_and_countryless_appeals() {
        let data = vec![
            // no country: region-wise only
            appeal(None, Some(1), 4, 1, "2017-01-05T00:00:00Z", "9.0", "0", 0),
            // all-zero metrics: skipped country-wise
            appeal(Some(7), Some(1), 4, 1, "2017-01-05T00:00:00Z", "0", "0", 0),
        ];
        let summary = summarize(&data).unwrap();
        assert!(summary.by_country.get(&KeyValue::Int(7)).is_none());
        assert!(summary.by_region.get(&KeyValue::Int(1)).is_some());
    }

    #[test]
    fn normalize_drops_bookkeeping_and_renames() {
        let datum = appeal(Some(14), Some(2), 12, 2, "2018-06-14T00:00:00Z", "1", "1", 1);
        let normalized = normalize(&datum);
        assert_eq!(normalized["atype"], json!("INTL"));
        assert_eq!(normalized["amountRequested"], json!("1"));
        assert_eq!(normalized["numBeneficiaries"], json!(1));
        assert!(normalized.get("created_at").is_none());
        assert!(normalized.get("country").is_none());
        assert!(normalized.get("status").is_none());
    }

    #[tokio::test]
    async fn load_pulls_count_then_everything() {
        use godata_core::config::FetchConfig;
        use godata_core::fetch::HttpTransport;
        use std::sync::Arc;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/appeal/")
            .match_query(mockito::Matcher::UrlEncoded("limit".into(), "1".into()))
            .with_body(r#"{"count": 2, "results": []}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v2/appeal/")
            .match_query(mockito::Matcher::UrlEncoded("limit".into(), "2".into()))
            .with_body(
                r#"{"count": 2, "results": [
                    {"country": {"id": 14}, "region": {"id": 2}, "dtype": {"id": 1},
                     "atype": 0, "start_date": "2018-06-14T00:00:00Z",
                     "amount_requested": "10.0", "amount_funded": "5.0",
                     "num_beneficiaries": 100},
                    {"country": {"id": 14}, "region": {"id": 2}, "dtype": {"id": 1},
                     "atype": 0, "start_date": "2018-06-15T00:00:00Z",
                     "amount_requested": "20.0", "amount_funded": "5.0",
                     "num_beneficiaries": 50}
                ]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v2/disaster_type/")
            .with_body(r#"{"results": [{"id": 1, "name": "Flood"}]}"#)
            .create_async()
            .await;

        let fetcher = Fetcher::new(
            Arc::new(HttpTransport::new(&FetchConfig::default()).unwrap()),
            5,
        );
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let base = format!("{}/api/v2", server.url());
        let source = AppealsSource::load_from(&fetcher, &cache, false, &base)
            .await
            .unwrap();

        let requested = source
            .by_country(14)
            .and_then(|node| {
                node.get_path(&[1i64.into(), "DREF".into(), "2018-06".into(), METRIC_REQUESTED.into()])
            })
            .and_then(Node::value);
        assert_eq!(requested, Some(30.0));
        assert_eq!(source.disaster_type_names().get(&1).map(String::as_str), Some("Flood"));
        // Raw pull and summary both land in the cache.
        assert!(cache.load::<Vec<Value>>("go_api/data.json").is_some());
        assert!(cache.load::<Value>("go_api/summary.json").is_some());
    }
}
