use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use godata_core::cache::Cache;
use godata_core::error::CollectError;
use godata_core::fetch::{Fetcher, Method};

pub const COUNTRY_ISO3_URL: &str = "http://country.io/iso3.json";
pub const COUNTRY_LIST_URL: &str =
    "https://prddsgocdnapi.azureedge.net/api/v2/country/?limit=300";

/// Country names the upstream listing spells differently from the ISO
/// registry; keyed by lower-cased name, value is the iso3 code.
const NAMED_FALLBACKS: [(&str, &str); 5] = [
    ("cape verde", "CPV"),
    ("syria", "SYR"),
    ("gaza strip", "GAZ"),
    ("north korea", "PRK"),
    ("netherlands antilles", "ANT"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryRecord {
    pub id: i64,
    pub iso: String,
    #[serde(default)]
    pub iso3: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<i64>,
}

/// Country lookup service: the collector's country list plus
/// iso2<->iso3 and name->iso2 maps.
///
/// Constructed once at startup (from the cache when allowed, from a
/// fresh pull otherwise) and passed explicitly to every consumer.
/// Nothing here runs at import time and nothing is global.
pub struct CountryIndex {
    countries: Vec<CountryRecord>,
    iso2_to_iso3: HashMap<String, String>,
    iso3_to_iso2: HashMap<String, String>,
    name_to_iso2: HashMap<String, String>,
}

impl CountryIndex {
    pub const CACHE_FILE: &'static str = "country.json";

    pub async fn load(
        fetcher: &Fetcher,
        cache: &Cache,
        use_cache: bool,
    ) -> Result<Self, CollectError> {
        Self::load_from(fetcher, cache, use_cache, COUNTRY_ISO3_URL, COUNTRY_LIST_URL).await
    }

    pub async fn load_from(
        fetcher: &Fetcher,
        cache: &Cache,
        use_cache: bool,
        iso3_url: &str,
        list_url: &str,
    ) -> Result<Self, CollectError> {
        if use_cache {
            if let Some(countries) = cache.load::<Vec<CountryRecord>>(Self::CACHE_FILE) {
                tracing::info!("using local country data");
                return Ok(Self::from_records(countries));
            }
        }
        let index = Self::pull(fetcher, iso3_url, list_url).await?;
        cache.store(Self::CACHE_FILE, &index.countries)?;
        Ok(index)
    }

    async fn pull(
        fetcher: &Fetcher,
        iso3_url: &str,
        list_url: &str,
    ) -> Result<Self, CollectError> {
        tracing::info!("pulling country data");
        let transport = fetcher.transport();

        let iso3_response = transport.execute(Method::Get, iso3_url, None).await?;
        let mut iso2_to_iso3: HashMap<String, String> =
            serde_json::from_value(iso3_response.body)?;
        // Corrections the upstream map is missing.
        iso2_to_iso3.insert("AN".to_string(), "ANT".to_string());
        iso2_to_iso3.insert("CS".to_string(), "SCG".to_string());

        let listing = transport.execute(Method::Get, list_url, None).await?;
        let results = listing
            .body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| CollectError::UnexpectedPayload {
                url: list_url.to_string(),
                detail: "missing `results` array".to_string(),
            })?;

        let mut countries = Vec::new();
        for entry in results {
            let Ok(mut record) = serde_json::from_value::<CountryRecord>(entry) else {
                continue;
            };
            if record.iso.trim().is_empty() {
                continue;
            }
            record.iso = record.iso.to_uppercase();
            record.iso3 = iso2_to_iso3
                .get(&record.iso)
                .cloned()
                .unwrap_or_default()
                .to_uppercase();
            countries.push(record);
        }
        Ok(Self::from_records(countries))
    }

    pub fn from_records(countries: Vec<CountryRecord>) -> Self {
        let mut iso2_to_iso3 = HashMap::new();
        let mut iso3_to_iso2 = HashMap::new();
        let mut name_to_iso2 = HashMap::new();
        for record in &countries {
            if !record.iso3.is_empty() {
                iso2_to_iso3.insert(record.iso.clone(), record.iso3.clone());
                iso3_to_iso2.insert(record.iso3.clone(), record.iso.clone());
            }
            if let Some(name) = &record.name {
                name_to_iso2.insert(name.to_lowercase(), record.iso.clone());
            }
        }
        for (name, iso3) in NAMED_FALLBACKS {
            if let Some(iso2) = iso3_to_iso2.get(iso3) {
                name_to_iso2
                    .entry(name.to_string())
                    .or_insert_with(|| iso2.clone());
            }
        }
        Self {
            countries,
            iso2_to_iso3,
            iso3_to_iso2,
            name_to_iso2,
        }
    }

    pub fn records(&self) -> &[CountryRecord] {
        &self.countries
    }

    pub fn iso3_list(&self) -> Vec<String> {
        self.countries
            .iter()
            .filter(|c| !c.iso3.is_empty())
            .map(|c| c.iso3.clone())
            .collect()
    }

    pub fn iso2_to_iso3(&self, iso2: &str) -> Option<&str> {
        self.iso2_to_iso3
            .get(&iso2.to_uppercase())
            .map(String::as_str)
    }

    pub fn iso3_to_iso2(&self, iso3: &str) -> Option<&str> {
        self.iso3_to_iso2
            .get(&iso3.to_uppercase())
            .map(String::as_str)
    }

    /// Resolve a display name (possibly with a trailing `[...]`
    /// qualifier) to an iso2 code.
    pub fn iso2_from_name(&self, name: &str) -> Option<&str> {
        let cleaned = name.split(" [").next().unwrap_or(name).trim();
        self.name_to_iso2
            .get(&cleaned.to_lowercase())
            .map(String::as_str)
    }

    pub fn contains_iso3(&self, iso3: &str) -> bool {
        self.iso3_to_iso2.contains_key(&iso3.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use godata_core::config::FetchConfig;
    use godata_core::fetch::HttpTransport;
    use std::sync::Arc;

    fn records() -> Vec<CountryRecord> {
        vec![
            CountryRecord {
                id: 14,
                iso: "AF".to_string(),
                iso3: "AFG".to_string(),
                name: Some("Afghanistan".to_string()),
                region: Some(2),
            },
            CountryRecord {
                id: 107,
                iso: "CV".to_string(),
                iso3: "CPV".to_string(),
                name: Some("Cabo Verde".to_string()),
                region: Some(0),
            },
        ]
    }

    #[test]
    fn maps_are_built_both_ways() {
        let index = CountryIndex::from_records(records());
        assert_eq!(index.iso2_to_iso3("af"), Some("AFG"));
        assert_eq!(index.iso3_to_iso2("afg"), Some("AF"));
        assert!(index.contains_iso3("CPV"));
        assert!(!index.contains_iso3("NPL"));
    }

    #[test]
    fn name_lookup_handles_qualifiers_and_fallbacks() {
        let index = CountryIndex::from_records(records());
        assert_eq!(index.iso2_from_name("Afghanistan [Kabul]"), Some("AF"));
        // "cape verde" is not the listed name but a known alias.
        assert_eq!(index.iso2_from_name("Cape Verde"), Some("CV"));
        assert_eq!(index.iso2_from_name("Atlantis"), None);
    }

    #[tokio::test]
    async fn pull_joins_listing_with_iso3_map() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/iso3.json")
            .with_body(r#"{"AF": "AFG", "NP": "NPL"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v2/country/")
            .with_body(
                r#"{"results": [
                    {"id": 14, "iso": "af", "name": "Afghanistan", "region": 2},
                    {"id": 119, "iso": "np", "name": "Nepal", "region": 2},
                    {"id": 0, "iso": "", "name": "No Iso"}
                ]}"#,
            )
            .create_async()
            .await;

        let fetcher = Fetcher::new(
            Arc::new(HttpTransport::new(&FetchConfig::default()).unwrap()),
            5,
        );
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let index = CountryIndex::load_from(
            &fetcher,
            &cache,
            false,
            &format!("{}/iso3.json", server.url()),
            &format!("{}/api/v2/country/", server.url()),
        )
        .await
        .unwrap();

        assert_eq!(index.records().len(), 2);
        assert_eq!(index.iso2_to_iso3("NP"), Some("NPL"));
        // The pull is cached for the next run.
        assert!(cache
            .load::<Vec<CountryRecord>>(CountryIndex::CACHE_FILE)
            .is_some());
    }
}
