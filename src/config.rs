// src/config.rs

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{env, fs, path::Path, time::Duration};
use url::Url;

use crate::fetch::{Source, SourceKind};
use crate::merge::{global, nyc, states};

/// Environment variable naming an optional YAML override file.
pub const CONFIG_ENV: &str = "COVIDBOARD_CONFIG";

const HOUR_SECS: u64 = 60 * 60;

/// Upstream locations for every dataset the dashboard reads.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceUrls {
    pub us_states: String,
    pub vaccinations: String,
    pub ny_confirmed: String,
    pub nyc_by_group: String,
    pub nyc_by_day: String,
    pub nyc_by_modzcta: String,
    pub modzcta_reference: String,
    pub global: String,
    pub modzcta_geojson: String,
    pub borough_population: String,
}

impl Default for SourceUrls {
    fn default() -> Self {
        Self {
            us_states: "https://github.com/nytimes/covid-19-data/blob/master/live/us-states.csv?raw=true".into(),
            vaccinations: "https://github.com/BloombergGraphics/covid-vaccine-tracker-data/blob/master/data/current-usa.csv?raw=true".into(),
            ny_confirmed: "https://github.com/CSSEGISandData/COVID-19/blob/master/csse_covid_19_data/csse_covid_19_time_series/time_series_covid19_confirmed_US.csv?raw=true".into(),
            nyc_by_group: "https://github.com/nychealth/coronavirus-data/blob/master/totals/by-group.csv?raw=true".into(),
            nyc_by_day: "https://github.com/nychealth/coronavirus-data/blob/master/trends/data-by-day.csv?raw=true".into(),
            nyc_by_modzcta: "https://github.com/nychealth/coronavirus-data/blob/master/totals/data-by-modzcta.csv?raw=true".into(),
            modzcta_reference: "https://data.cityofnewyork.us/resource/pri4-ifjk.csv".into(),
            global: "https://github.com/owid/covid-19-data/blob/master/public/data/owid-covid-data.csv?raw=true".into(),
            modzcta_geojson: "https://data.cityofnewyork.us/resource/pri4-ifjk.geojson".into(),
            borough_population: "https://www.citypopulation.de/en/usa/newyorkcity/".into(),
        }
    }
}

/// Runtime configuration. Every field has a default, so an override file
/// only needs to name what it changes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub sources: SourceUrls,
    /// Cache lifetime for frequently updated tables.
    pub live_ttl_secs: u64,
    /// Cache lifetime for geographic/reference documents.
    pub reference_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: SourceUrls::default(),
            live_ttl_secs: HOUR_SECS,
            reference_ttl_secs: HOUR_SECS * 24 * 15,
        }
    }
}

impl Config {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(text).context("parsing YAML config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading config {}", path.display()))
    }

    /// Defaults, unless `COVIDBOARD_CONFIG` points at an override file.
    pub fn from_env() -> Result<Self> {
        match env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.live_ttl_secs == 0 {
            bail!("live_ttl_secs must be greater than zero");
        }
        if self.reference_ttl_secs == 0 {
            bail!("reference_ttl_secs must be greater than zero");
        }
        self.sources().map(|_| ())
    }

    pub fn live_ttl(&self) -> Duration {
        Duration::from_secs(self.live_ttl_secs)
    }

    pub fn reference_ttl(&self) -> Duration {
        Duration::from_secs(self.reference_ttl_secs)
    }

    /// Resolve the configured URLs into source descriptors.
    pub fn sources(&self) -> Result<Sources> {
        let s = &self.sources;
        let live = self.live_ttl();
        let reference = self.reference_ttl();
        Ok(Sources {
            us_states: csv_source(
                "us_states",
                &s.us_states,
                Some(0),
                states::CASE_COLUMNS,
                live,
            )?,
            vaccinations: csv_source(
                "vaccinations",
                &s.vaccinations,
                None,
                states::VACCINATION_COLUMNS,
                live,
            )?,
            // every date is its own column
            ny_confirmed: Source {
                id: "ny_confirmed",
                url: parse_url("ny_confirmed", &s.ny_confirmed)?,
                kind: SourceKind::Csv {
                    index_column: None,
                    columns: None,
                },
                ttl: live,
            },
            nyc_by_group: csv_source(
                "nyc_by_group",
                &s.nyc_by_group,
                None,
                nyc::BOROUGH_COLUMNS,
                live,
            )?,
            nyc_by_day: csv_source("nyc_by_day", &s.nyc_by_day, None, nyc::DAILY_COLUMNS, live)?,
            nyc_by_modzcta: csv_source(
                "nyc_by_modzcta",
                &s.nyc_by_modzcta,
                None,
                nyc::MODZCTA_COLUMNS,
                live,
            )?,
            modzcta_reference: csv_source(
                "modzcta_reference",
                &s.modzcta_reference,
                None,
                nyc::REFERENCE_COLUMNS,
                live,
            )?,
            global: csv_source("global", &s.global, None, global::COLUMNS, live)?,
            modzcta_geojson: Source {
                id: "modzcta_geojson",
                url: parse_url("modzcta_geojson", &s.modzcta_geojson)?,
                kind: SourceKind::GeoJson,
                ttl: reference,
            },
            borough_population: Source {
                id: "borough_population",
                url: parse_url("borough_population", &s.borough_population)?,
                kind: SourceKind::HtmlTable,
                ttl: reference,
            },
        })
    }
}

fn csv_source(
    id: &'static str,
    raw: &str,
    index_column: Option<usize>,
    columns: &'static [&'static str],
    ttl: Duration,
) -> Result<Source> {
    Ok(Source {
        id,
        url: parse_url(id, raw)?,
        kind: SourceKind::Csv {
            index_column,
            columns: Some(columns),
        },
        ttl,
    })
}

fn parse_url(id: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("invalid URL for source `{}`: {}", id, raw))
}

/// The resolved source catalog.
#[derive(Debug, Clone)]
pub struct Sources {
    pub us_states: Source,
    pub vaccinations: Source,
    pub ny_confirmed: Source,
    pub nyc_by_group: Source,
    pub nyc_by_day: Source,
    pub nyc_by_modzcta: Source,
    pub modzcta_reference: Source,
    pub global: Source,
    pub modzcta_geojson: Source,
    pub borough_population: Source,
}
