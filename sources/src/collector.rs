use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::{json, Map, Value};

use godata_core::cache::Cache;
use godata_core::config::AppConfig;
use godata_core::error::CollectError;
use godata_core::fetch::Fetcher;
use godata_core::progress::ProgressMonitor;
use godata_core::util::time::{to_iso_date, year_range_back};

use crate::alerts::{AlertsSource, ALERTS_URL};
use crate::appeals::{AppealsSource, REGION_NAMES};
use crate::conflict::{ConflictSource, ACLED_API};
use crate::country::{CountryIndex, CountryRecord};
use crate::funding::FundingSource;
use crate::population::{pull_population, PopulationPoint, WORLDBANK_API};
use crate::reliefweb::ReliefWebSource;
use crate::schema::{fields, sources, units};

/// Everything a collection run needs, initialized up front so a
/// systemic failure (unreachable API, unusable cache) aborts before any
/// per-country work starts.
pub struct GoDataCollector {
    fetcher: Fetcher,
    countries: CountryIndex,
    country_cap: Option<usize>,
    appeals: AppealsSource,
    conflict: ConflictSource,
    alerts: AlertsSource,
    funding: FundingSource,
    population: std::collections::HashMap<String, Vec<PopulationPoint>>,
    reliefweb: ReliefWebSource,
    now: DateTime<Utc>,
}

impl GoDataCollector {
    /// `test` caps the pull to a handful of countries for fast
    /// iteration; `use_cache` serves every bulk pull from disk when a
    /// valid cache file exists.
    pub async fn initialize(
        cfg: &AppConfig,
        test: bool,
        use_cache: bool,
    ) -> Result<Self, CollectError> {
        let cache = Cache::new(&cfg.cache.directory);
        let fetcher = Fetcher::from_config(&cfg.fetch)?;
        let now = Utc::now();

        tracing::info!("initializing collector");
        let countries = CountryIndex::load(&fetcher, &cache, use_cache).await?;
        let country_cap = test.then_some(cfg.collect.test_country_cap);

        let appeals = AppealsSource::load(&fetcher, &cache, use_cache).await?;
        let conflict = ConflictSource::load(&fetcher, &cache, use_cache).await?;
        let alerts = AlertsSource::load(&fetcher, &cache, &countries, use_cache).await?;

        let mut iso3s = countries.iso3_list();
        if let Some(cap) = country_cap {
            iso3s.truncate(cap);
        }
        let funding = FundingSource::load(
            &cfg.fetch,
            &cfg.collect.hpc_credential,
            &cache,
            &iso3s,
            use_cache,
        )
        .await?;

        let (from_year, to_year) = year_range_back(now.date_naive(), 10);
        let population = pull_population(
            &fetcher,
            &countries,
            &iso3s,
            from_year,
            to_year,
            WORLDBANK_API,
        )
        .await;

        Ok(Self {
            fetcher,
            countries,
            country_cap,
            appeals,
            conflict,
            alerts,
            funding,
            population,
            reliefweb: ReliefWebSource::default(),
            now,
        })
    }

    fn now_iso(&self) -> String {
        to_iso_date(self.now.year(), self.now.month(), self.now.day())
            .unwrap_or_else(|| self.now.to_rfc3339())
    }

    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Region summaries, then per-country data across every source.
    /// Per-country failures are logged and defaulted; only systemic
    /// conditions have already aborted in [`Self::initialize`].
    pub async fn collect(
        &self,
        progress: &mut ProgressMonitor,
    ) -> Result<Value, CollectError> {
        let mut regions = Map::new();
        for (region_id, region_name) in REGION_NAMES {
            tracing::info!(region = region_name, "collecting region data");
            regions.insert(
                region_name.to_string(),
                json!({"appeals": self.appeals.by_region(region_id)}),
            );
        }

        let records: Vec<CountryRecord> = {
            let mut records = self.countries.records().to_vec();
            if let Some(cap) = self.country_cap {
                records.truncate(cap);
            }
            records
        };

        let mut countries = Map::new();
        for (position, country) in records.iter().enumerate() {
            tracing::info!(
                iso = %country.iso,
                "collecting data for country {} of {}",
                position + 1,
                records.len(),
            );
            progress.add_item(&country.iso);
            let data = self.country_data(country).await;
            progress.complete_item(&country.iso, true);
            countries.insert(country.iso.clone(), data);
        }

        Ok(json!({
            "regions": regions,
            "countries": countries,
            "disasterTypes": self.appeals.disaster_type_names(),
        }))
    }

    /// One stamped `{value, sourceUrl, source, datePulled, unit?}` entry.
    fn entry(
        &self,
        value: Value,
        source_url: &str,
        source: &str,
        date_pulled: Option<&str>,
        unit: Option<&str>,
    ) -> Value {
        let mut entry = Map::new();
        entry.insert(fields::VALUE.to_string(), value);
        entry.insert(fields::SOURCE_URL.to_string(), json!(source_url));
        entry.insert(fields::SOURCE.to_string(), json!(source));
        entry.insert(
            fields::DATE_PULLED.to_string(),
            json!(date_pulled.map(str::to_string).unwrap_or_else(|| self.now_iso())),
        );
        if let Some(unit) = unit {
            entry.insert(fields::UNIT.to_string(), json!(unit));
        }
        Value::Object(entry)
    }

    async fn country_data(&self, country: &CountryRecord) -> Value {
        let iso = country.iso.as_str();
        let mut data = Map::new();
        data.insert("country".to_string(), json!(iso));

        // Reported events: total count, conflict average, full conflict tree.
        tracing::info!(source = "reliefweb", op = "reported_events", iso);
        let reported = match self
            .reliefweb
            .reported_events_since(
                &self.fetcher,
                &self.countries,
                iso,
                "2008-01-01T00:00:00+00:00",
            )
            .await
        {
            Ok((url, count)) => self.entry(
                json!(count),
                &url,
                sources::RELIEFWEB,
                None,
                Some(units::COUNT),
            ),
            Err(error) => {
                tracing::warn!(iso, %error, "reported-events query failed, defaulting");
                Value::Null
            }
        };
        let conflict_average = self.entry(
            json!(self.conflict.events_average(&self.countries, iso, self.today())),
            ACLED_API,
            sources::ACLED,
            self.conflict.pulled_at(),
            Some(units::AVERAGE),
        );
        let conflict_full = self.entry(
            json!(self.conflict.events_by_type(&self.countries, iso)),
            ACLED_API,
            sources::ACLED,
            self.conflict.pulled_at(),
            None,
        );
        data.insert(
            "numReportedEvents".to_string(),
            json!([reported, conflict_average, conflict_full]),
        );

        // Epidemic breakdown by disease and month.
        tracing::info!(source = "reliefweb", op = "epidemic_month_counts", iso);
        match self
            .reliefweb
            .epidemic_month_counts(&self.fetcher, &self.countries, iso, self.today())
            .await
        {
            Ok((url, counts)) => {
                data.insert(
                    "numOfOperationsByEpidemicType".to_string(),
                    self.entry(
                        json!(counts),
                        &url,
                        sources::RELIEFWEB,
                        None,
                        Some(units::COUNT),
                    ),
                );
            }
            Err(error) => {
                tracing::warn!(iso, %error, "epidemic counts failed, defaulting");
                data.insert("numOfOperationsByEpidemicType".to_string(), Value::Null);
            }
        }

        // Most recent disaster on record.
        tracing::info!(source = "reliefweb", op = "latest_disaster", iso);
        let latest_disaster = match self
            .reliefweb
            .latest_disaster(&self.fetcher, &self.countries, iso)
            .await
        {
            Ok(disaster) => json!(disaster),
            Err(error) => {
                tracing::warn!(iso, %error, "latest-disaster query failed, defaulting");
                Value::Null
            }
        };
        data.insert("latestDisaster".to_string(), latest_disaster);

        // Start Fund operations by crisis type.
        data.insert(
            "numOfOperationsByCrisisType".to_string(),
            self.entry(
                json!(self.alerts.by_country(iso)),
                ALERTS_URL,
                sources::START_NETWORK,
                self.alerts.pulled_at(),
                Some(units::COUNT),
            ),
        );

        // Latest appeal with budget and targeted beneficiaries.
        tracing::info!(source = "go_api", op = "latest_appeal", iso);
        let latest_appeal = match self
            .appeals
            .latest_appeal(&self.fetcher, country.id)
            .await
        {
            Ok((url, appeal)) => self.entry(appeal, &url, sources::GO_API, None, None),
            Err(error) => {
                tracing::warn!(iso, %error, "latest-appeal query failed, defaulting");
                Value::Null
            }
        };
        data.insert("latestAppeal".to_string(), latest_appeal);

        // Appeal sums by type, funding tree, population series.
        data.insert(
            "appeals".to_string(),
            json!(self.appeals.by_country(country.id)),
        );
        data.insert(
            "fts".to_string(),
            json!(self.funding.data_for(&self.countries, iso)),
        );
        data.insert(
            "population".to_string(),
            json!(self.population.get(iso).cloned().unwrap_or_default()),
        );

        Value::Object(data)
    }

    pub fn country_count(&self) -> usize {
        match self.country_cap {
            Some(cap) => cap.min(self.countries.records().len()),
            None => self.countries.records().len(),
        }
    }
}

/// Write the combined document to `path`, creating parent directories.
pub fn dump_json(path: &std::path::Path, document: &Value) -> Result<(), CollectError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(document)?)?;
    tracing::info!(path = %path.display(), "wrote output document");
    Ok(())
}
