use std::collections::HashMap;

use godata_core::aggregate::{aggregate, KeyFn, KeyValue, Node, Reducer};
use godata_core::cache::Cache;
use godata_core::error::CollectError;
use godata_core::fetch::Fetcher;

use crate::country::CountryIndex;

pub const ALERTS_URL: &str = "https://startnetwork.org/api/v1/start-fund-all-alerts";

const DATA_FILE: &str = "startnetwork/data.csv";
const COUNTRY_COLUMN: &str = "Country";
const CRISIS_COLUMN: &str = "Crisis Type";

/// Start Fund alerts: a CSV feed summarized as
/// `iso2 -> crisis type -> count`. Alerts whose country name cannot be
/// resolved keep their rows under the `null` key.
pub struct AlertsSource {
    summary: Node,
    pulled_at: Option<String>,
}

impl AlertsSource {
    pub async fn load(
        fetcher: &Fetcher,
        cache: &Cache,
        index: &CountryIndex,
        use_cache: bool,
    ) -> Result<Self, CollectError> {
        Self::load_from(fetcher, cache, index, use_cache, ALERTS_URL).await
    }

    pub async fn load_from(
        fetcher: &Fetcher,
        cache: &Cache,
        index: &CountryIndex,
        use_cache: bool,
        url: &str,
    ) -> Result<Self, CollectError> {
        let cached = if use_cache {
            cache.load_text(DATA_FILE)
        } else {
            None
        };
        let text = match cached {
            Some(text) => {
                tracing::info!("using local alerts data");
                text
            }
            None => {
                tracing::info!("pulling alerts data");
                fetcher
                    .transport()
                    .download(url, &cache.path(DATA_FILE))
                    .await?;
                cache
                    .load_text(DATA_FILE)
                    .ok_or_else(|| CollectError::UnexpectedPayload {
                        url: url.to_string(),
                        detail: "downloaded alerts file is unreadable".to_string(),
                    })?
            }
        };

        let rows = parse_rows(&text)?;
        tracing::info!(alerts = rows.len(), "re-calculating alerts summary");
        let summary = summarize(&rows, index)?;
        cache.store("startnetwork/summary.json", &summary)?;

        Ok(Self {
            summary,
            pulled_at: cache.modified_iso(DATA_FILE),
        })
    }

    pub fn pulled_at(&self) -> Option<&str> {
        self.pulled_at.as_deref()
    }

    /// `crisis type -> count` tree for one country.
    pub fn by_country(&self, iso2: &str) -> Option<&Node> {
        self.summary.get(&KeyValue::Str(iso2.to_uppercase()))
    }
}

fn parse_rows(text: &str) -> Result<Vec<HashMap<String, String>>, CollectError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

fn summarize(
    rows: &[HashMap<String, String>],
    index: &CountryIndex,
) -> Result<Node, CollectError> {
    let by_country = |row: &HashMap<String, String>| {
        KeyValue::from(
            row.get(COUNTRY_COLUMN)
                .and_then(|name| index.iso2_from_name(name)),
        )
    };
    let by_crisis = |row: &HashMap<String, String>| {
        KeyValue::Str(
            row.get(CRISIS_COLUMN)
                .map(|c| c.to_lowercase())
                .unwrap_or_default(),
        )
    };
    let keys: [KeyFn<'_, HashMap<String, String>>; 2] = [&by_country, &by_crisis];
    Ok(aggregate(rows, &keys, &|_| None, Reducer::Count)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::CountryRecord;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn index() -> CountryIndex {
        CountryIndex::from_records(vec![CountryRecord {
            id: 119,
            iso: "NP".to_string(),
            iso3: "NPL".to_string(),
            name: Some("Nepal".to_string()),
            region: Some(2),
        }])
    }

    const CSV_BODY: &str = "\
Country,Crisis Type,Alert Date
Nepal [Kathmandu],Flood,2018-07-01
Nepal,FLOOD,2018-08-01
Nepal,Drought,2018-09-01
Atlantis,Earthquake,2018-09-02
";

    #[test]
    fn summary_counts_by_country_and_lowercased_crisis() {
        let rows = parse_rows(CSV_BODY).unwrap();
        let summary = summarize(&rows, &index()).unwrap();
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({
                "NP": {"flood": 2, "drought": 1},
                "null": {"earthquake": 1},
            })
        );
    }

    #[tokio::test]
    async fn load_downloads_and_summarizes() {
        use godata_core::config::FetchConfig;
        use godata_core::fetch::HttpTransport;
        use std::sync::Arc;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/start-fund-all-alerts")
            .with_body(CSV_BODY)
            .create_async()
            .await;

        let fetcher = Fetcher::new(
            Arc::new(HttpTransport::new(&FetchConfig::default()).unwrap()),
            5,
        );
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let source = AlertsSource::load_from(
            &fetcher,
            &cache,
            &index(),
            false,
            &format!("{}/api/v1/start-fund-all-alerts", server.url()),
        )
        .await
        .unwrap();

        let flood = source
            .by_country("np")
            .and_then(|node| node.get(&KeyValue::from("flood")))
            .and_then(Node::value);
        assert_eq!(flood, Some(2.0));
        assert!(source.pulled_at().is_some());
        // Raw CSV is kept for the next cached run.
        assert!(cache.load_text("startnetwork/data.csv").is_some());
    }
}
