use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{json, Value};

use godata_core::error::CollectError;
use godata_core::fetch::{FetchTask, Fetcher, Method};
use godata_core::util::text::title_camel_case;
use godata_core::util::time::{month_bounds_iso, months_back, YearMonth};

use crate::country::CountryIndex;

pub const RELIEFWEB_API: &str = "https://api.reliefweb.int/v1";
pub const APP_NAME: &str = "godata";

const PRIMARY_COUNTRY_FIELD: &str = "primary_country.iso3";

/// Disease names queried for the epidemic breakdown; "others" is the
/// negated complement of the list.
pub const EPIDEMIC_NAMES: [&str; 6] = [
    "Cholera outbreak",
    "Meningitis",
    "Rift Valley fever",
    "Viral haemorrhagic fevers",
    "Viral hepatitis A B C E",
    "Yellow fever",
];

/// ReliefWeb disaster-type codes translated to the IFRC taxonomy.
pub fn ifrc_type_name(code: &str) -> Option<&'static str> {
    Some(match code {
        "CW" => "Cold Wave",
        "HT" => "Heat Wave",
        "DR" => "Drought",
        "EQ" => "Earthquake",
        "LS" => "Land Slide",
        "TS" => "Tsunami",
        "VO" => "Volcano",
        "EC" => "Extratropical Cyclone",
        "TC" => "Tropical Cyclone",
        "SS" => "Storm Surge",
        "FL" => "Flood",
        "FF" => "Flash Flood",
        "CE" => "Complex Emergency",
        "FR" => "Fire",
        "OT" => "Other",
        _ => return None,
    })
}

/// Correlation token for one epidemic count query.
#[derive(Debug, Clone, Copy)]
struct EpidemicToken {
    name: &'static str,
    month: YearMonth,
}

/// ReliefWeb disaster queries. Stateless: every method pulls fresh.
pub struct ReliefWebSource {
    base: String,
}

impl Default for ReliefWebSource {
    fn default() -> Self {
        Self::new(RELIEFWEB_API)
    }
}

impl ReliefWebSource {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    fn disasters_url(&self) -> String {
        format!("{}/disasters?appname={APP_NAME}", self.base)
    }

    fn iso3_lower(index: &CountryIndex, iso2: &str) -> String {
        index
            .iso2_to_iso3(iso2)
            .unwrap_or(iso2)
            .to_lowercase()
    }

    /// Total number of reported events for a country since `from_iso`.
    pub async fn reported_events_since(
        &self,
        fetcher: &Fetcher,
        index: &CountryIndex,
        iso2: &str,
        from_iso: &str,
    ) -> Result<(String, Option<i64>), CollectError> {
        let url = self.disasters_url();
        let payload = json!({
            "limit": 1,
            "filter": {
                "operator": "AND",
                "conditions": [
                    {"field": "date.created", "value": {"from": from_iso}},
                    {"field": PRIMARY_COUNTRY_FIELD, "value": Self::iso3_lower(index, iso2)},
                ],
            },
        });
        let response = fetcher
            .transport()
            .execute(Method::Post, &url, Some(&payload))
            .await?;
        let count = response.body.get("totalCount").and_then(Value::as_i64);
        Ok((response.final_url, count))
    }

    /// Reported events per disease per month over the last ten years.
    ///
    /// One query per (disease, month) pair, fanned out concurrently;
    /// the `(name, month)` token re-associates each count. A month
    /// with a missing or zero count is left out, but the disease key
    /// itself always appears.
    pub async fn epidemic_month_counts(
        &self,
        fetcher: &Fetcher,
        index: &CountryIndex,
        iso2: &str,
        now: NaiveDate,
    ) -> Result<(String, BTreeMap<String, BTreeMap<String, i64>>), CollectError> {
        let url = self.disasters_url();
        let iso3 = Self::iso3_lower(index, iso2);

        let mut tasks = Vec::new();
        for name in EPIDEMIC_NAMES.iter().copied().chain(["others"]) {
            for month in months_back(now, 10) {
                let Some((from, to)) = month_bounds_iso(month.year, month.month) else {
                    continue;
                };
                // "others" negates the whole disease list.
                let name_condition = if name == "others" {
                    json!({"field": "name", "value": EPIDEMIC_NAMES, "negate": true})
                } else {
                    json!({"field": "name", "value": name})
                };
                let payload = json!({
                    "limit": 1,
                    "filter": {
                        "operator": "AND",
                        "conditions": [
                            name_condition,
                            {"field": "date.created", "value": {"from": from, "to": to}},
                            {"field": PRIMARY_COUNTRY_FIELD, "value": iso3},
                        ],
                    },
                });
                tasks.push(FetchTask::post(
                    url.clone(),
                    payload,
                    EpidemicToken { name, month },
                ));
            }
        }

        let responses = fetcher
            .post_all(tasks, |task, error| {
                tracing::warn!(url = %task.url, %error, "epidemic count query failed");
            })
            .await;

        let mut collector: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
        for (outcome, token) in responses {
            let entry = collector.entry(title_camel_case(token.name)).or_default();
            let count = outcome
                .body()
                .and_then(|body| body.get("totalCount"))
                .and_then(Value::as_i64);
            if let Some(count) = count.filter(|c| *c > 0) {
                entry.insert(token.month.formatted(), count);
            }
        }
        Ok((url, collector))
    }

    /// Most recent disaster for a country, normalized; `None` when the
    /// country has no disaster on record.
    pub async fn latest_disaster(
        &self,
        fetcher: &Fetcher,
        index: &CountryIndex,
        iso2: &str,
    ) -> Result<Option<Value>, CollectError> {
        let transport = fetcher.transport();
        let listing_url = format!(
            "{}&{PRIMARY_COUNTRY_FIELD}={}&limit=1&sort=date:desc",
            self.disasters_url(),
            Self::iso3_lower(index, iso2),
        );
        let listing = transport.execute(Method::Get, &listing_url, None).await?;
        let Some(disaster_id) = listing
            .body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|data| data.first())
            .and_then(|first| first.get("id"))
            .and_then(id_as_string)
        else {
            return Ok(None);
        };

        let detail_url = format!("{}/disasters/{disaster_id}?appname={APP_NAME}", self.base);
        let detail = transport.execute(Method::Get, &detail_url, None).await?;
        match normalize_disaster(&detail.body) {
            Some(disaster) => Ok(Some(disaster)),
            None => {
                tracing::warn!(
                    url = %detail_url,
                    body = %detail.body,
                    "malformed disaster detail payload, skipping"
                );
                Ok(None)
            }
        }
    }
}

/// ReliefWeb ids arrive as either numbers or strings.
fn id_as_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Flatten a disaster detail payload to the output document's shape.
pub fn normalize_disaster(body: &Value) -> Option<Value> {
    let url = body.get("links")?.get("self")?.get("href")?;
    let disaster = body.get("data")?.as_array()?.first()?.get("fields")?;
    let type_code = disaster.get("primary_type")?.get("code")?.as_str()?;
    Some(json!({
        "sourceUrl": url,
        "id": disaster.get("id"),
        "name": disaster.get("name"),
        "glide": disaster.get("glide"),
        "ongoing": disaster.get("current"),
        "disasterUrl": disaster.get("url"),
        "description": disaster.get("description"),
        "date": disaster.get("date").and_then(|d| d.get("created")),
        "numCountries": disaster
            .get("country")
            .and_then(Value::as_array)
            .map(Vec::len),
        "primaryTypeCode": type_code,
        "primaryTypeName": disaster.get("primary_type").and_then(|t| t.get("name")),
        "primaryTypeNameIfrcTax": ifrc_type_name(type_code),
    }))
}
