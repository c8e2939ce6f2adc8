use chrono::NaiveDate;
use serde_json::{json, Value};

use godata_core::aggregate::{aggregate, KeyFn, KeyValue, Node, Reducer};
use godata_core::cache::Cache;
use godata_core::error::CollectError;
use godata_core::fetch::{Fetcher, Method};
use godata_core::util::text::title_camel_case;
use godata_core::util::time::year_range_back;

use crate::country::CountryIndex;

pub const ACLED_API: &str = "https://api.acleddata.com/acled/read?limit=0&terms=accept";

/// Events before this date are out of the reporting window.
const WINDOW_START: &str = "2008-01-01";

#[derive(Debug)]
pub struct ConflictSummary {
    /// `iso3 -> year -> count`.
    pub by_year: Node,
    /// `iso3 -> event type -> month -> count`.
    pub by_type_month: Node,
}

/// Conflict events (ACLED): one bulk pull, then every query is served
/// from the two summary trees.
pub struct ConflictSource {
    summary: ConflictSummary,
    pulled_at: Option<String>,
}

impl ConflictSource {
    pub async fn load(
        fetcher: &Fetcher,
        cache: &Cache,
        use_cache: bool,
    ) -> Result<Self, CollectError> {
        Self::load_from(fetcher, cache, use_cache, ACLED_API).await
    }

    pub async fn load_from(
        fetcher: &Fetcher,
        cache: &Cache,
        use_cache: bool,
        url: &str,
    ) -> Result<Self, CollectError> {
        let cached: Option<Vec<Value>> = if use_cache {
            cache.load("acleddata/data.json")
        } else {
            None
        };
        let data = match cached {
            Some(data) => {
                tracing::info!("using local conflict data");
                data
            }
            None => {
                tracing::info!("pulling conflict data");
                let response = fetcher.transport().execute(Method::Get, url, None).await?;
                let data = response
                    .body
                    .get("data")
                    .and_then(Value::as_array)
                    .cloned()
                    .ok_or_else(|| CollectError::UnexpectedPayload {
                        url: url.to_string(),
                        detail: "missing `data` array".to_string(),
                    })?;
                cache.store("acleddata/data.json", &data)?;
                data
            }
        };

        tracing::info!(events = data.len(), "re-calculating conflict summary");
        let summary = summarize(&data)?;
        cache.store(
            "acleddata/summary.json",
            &json!({"average": summary.by_year, "all": summary.by_type_month}),
        )?;

        Ok(Self {
            summary,
            pulled_at: cache.modified_iso("acleddata/data.json"),
        })
    }

    /// ISO timestamp of the underlying data pull.
    pub fn pulled_at(&self) -> Option<&str> {
        self.pulled_at.as_deref()
    }

    /// Average yearly event count over the trailing window; years with
    /// no events count as zero.
    pub fn events_average(&self, index: &CountryIndex, iso2: &str, now: NaiveDate) -> f64 {
        let iso3 = index.iso2_to_iso3(iso2).unwrap_or(iso2).to_uppercase();
        let country = self.summary.by_year.get(&KeyValue::Str(iso3));
        let (start, end) = year_range_back(now, 10);
        let mut total = 0.0;
        let mut years = 0usize;
        for year in start..=end {
            years += 1;
            total += country
                .and_then(|node| node.get(&KeyValue::Int(year as i64)))
                .and_then(Node::value)
                .unwrap_or(0.0);
        }
        total / years.max(1) as f64
    }

    /// Full `event type -> month -> count` tree for one country.
    pub fn events_by_type(&self, index: &CountryIndex, iso2: &str) -> Option<&Node> {
        let iso3 = index.iso2_to_iso3(iso2).unwrap_or(iso2).to_uppercase();
        self.summary.by_type_month.get(&KeyValue::Str(iso3))
    }
}

fn field<'a>(datum: &'a Value, name: &str) -> Option<&'a str> {
    datum.get(name).and_then(Value::as_str)
}

/// Years arrive as strings or numbers depending on the export.
fn year_of(datum: &Value) -> KeyValue {
    match datum.get("year") {
        Some(Value::Number(n)) => n.as_i64().map(KeyValue::Int).unwrap_or(KeyValue::Null),
        Some(Value::String(s)) => s.parse().map(KeyValue::Int).unwrap_or(KeyValue::Null),
        _ => KeyValue::Null,
    }
}

fn summarize(data: &[Value]) -> Result<ConflictSummary, CollectError> {
    let windowed: Vec<&Value> = data
        .iter()
        .filter(|datum| field(datum, "event_date").is_some_and(|d| d >= WINDOW_START))
        .collect();

    let by_iso3 = |d: &&Value| KeyValue::from(field(d, "iso3"));
    let by_year = |d: &&Value| year_of(d);
    let by_event_type =
        |d: &&Value| KeyValue::Str(title_camel_case(field(d, "event_type").unwrap_or_default()));
    let by_month = |d: &&Value| {
        KeyValue::from(field(d, "event_date").and_then(|date| date.get(..7)))
    };

    let year_keys: [KeyFn<'_, &Value>; 2] = [&by_iso3, &by_year];
    let type_keys: [KeyFn<'_, &Value>; 3] = [&by_iso3, &by_event_type, &by_month];
    Ok(ConflictSummary {
        by_year: aggregate(&windowed, &year_keys, &|_| None, Reducer::Count)?,
        by_type_month: aggregate(&windowed, &type_keys, &|_| None, Reducer::Count)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::CountryRecord;
    use pretty_assertions::assert_eq;

    fn event(iso3: &str, date: &str, year: i64, event_type: &str) -> Value {
        json!({
            "data_id": "1",
            "iso3": iso3,
            "event_date": date,
            "year": year.to_string(),
            "event_type": event_type,
        })
    }

    fn index() -> CountryIndex {
        CountryIndex::from_records(vec![CountryRecord {
            id: 119,
            iso: "NP".to_string(),
            iso3: "NPL".to_string(),
            name: Some("Nepal".to_string()),
            region: Some(2),
        }])
    }

    fn sample() -> Vec<Value> {
        vec![
            event("NPL", "2010-05-01", 2010, "Riots/Protests"),
            event("NPL", "2010-06-10", 2010, "Riots/Protests"),
            event("NPL", "2011-01-02", 2011, "Battle-No change of territory"),
            // outside the window, dropped everywhere
            event("NPL", "2007-12-31", 2007, "Riots/Protests"),
        ]
    }

    #[test]
    fn counts_by_year_inside_window() {
        let summary = summarize(&sample()).unwrap();
        let count = |year: i64| {
            summary
                .by_year
                .get_path(&["NPL".into(), year.into()])
                .and_then(Node::value)
        };
        assert_eq!(count(2010), Some(2.0));
        assert_eq!(count(2011), Some(1.0));
        assert_eq!(count(2007), None);
    }

    #[test]
    fn counts_by_camel_cased_type_and_month() {
        let summary = summarize(&sample()).unwrap();
        let count = summary
            .by_type_month
            .get_path(&["NPL".into(), "Riots/protests".into(), "2010-05".into()])
            .and_then(Node::value);
        assert_eq!(count, Some(1.0));
    }

    #[tokio::test]
    async fn ten_year_average_counts_empty_years_as_zero() {
        use godata_core::config::FetchConfig;
        use godata_core::fetch::HttpTransport;
        use std::sync::Arc;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/acled/read")
            .with_body(
                serde_json::to_string(&json!({"data": sample()})).unwrap(),
            )
            .create_async()
            .await;

        let fetcher = Fetcher::new(
            Arc::new(HttpTransport::new(&FetchConfig::default()).unwrap()),
            5,
        );
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let source = ConflictSource::load_from(
            &fetcher,
            &cache,
            false,
            &format!("{}/acled/read", server.url()),
        )
        .await
        .unwrap();

        let now = NaiveDate::from_ymd_opt(2018, 6, 15).unwrap();
        // 3 events over 11 calendar years (2008..=2018).
        let avg = source.events_average(&index(), "NP", now);
        assert!((avg - 3.0 / 11.0).abs() < 1e-9);
        assert!(source.pulled_at().is_some());
        assert!(source.events_by_type(&index(), "NP").is_some());
    }
}
