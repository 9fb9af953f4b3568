// src/merge/mod.rs
//
// fetch → normalize → join → derive → rank, rerun from scratch on every refresh.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::{Config, Sources};
use crate::fetch::Loader;

pub mod arrow;
pub mod geo;
pub mod global;
pub mod nyc;
pub mod series;
pub mod states;

pub use geo::{BoroughPopulation, GeoBoundaries};
pub use global::CountryRecord;
pub use nyc::{Borough, BoroughRecord, DailyPoint, DailySeries, ZctaRecord};
pub use series::{CumulativeSeries, Window};
pub use states::{StateRecord, StateTable};

/// Everything the rendering layer needs for one refresh. Read-only.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub generated_at: DateTime<Utc>,
    pub states: StateTable,
    pub boroughs: Vec<BoroughRecord>,
    pub daily: DailySeries,
    pub ny_cumulative: CumulativeSeries,
    pub modzcta: Vec<ZctaRecord>,
    pub global: Vec<CountryRecord>,
    pub boundaries: GeoBoundaries,
    pub borough_population: Vec<BoroughPopulation>,
}

/// Runs the whole pipeline against a [`Loader`], whose caches decide
/// whether a refresh actually hits the network.
pub struct DatasetMerger {
    loader: Loader,
    sources: Sources,
}

impl DatasetMerger {
    pub fn new(loader: Loader, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            loader,
            sources: config.sources()?,
        })
    }

    /// Only the state-level join: live cases plus vaccinations.
    pub async fn refresh_states(&self) -> Result<StateTable> {
        let s = &self.sources;
        let (cases, vaccinations) = futures::try_join!(
            self.loader.load_table(&s.us_states),
            self.loader.load_table(&s.vaccinations),
        )?;

        let cases = states::normalize_cases(&cases).context("normalizing us_states")?;
        let vaccinations =
            states::normalize_vaccinations(&vaccinations).context("normalizing vaccinations")?;
        let table = states::join_states(&cases, &vaccinations);
        info!(states = table.len(), "state table refreshed");
        Ok(table)
    }

    /// Every dataset on the page. Any fetch or schema failure aborts the refresh.
    pub async fn refresh(&self) -> Result<Dashboard> {
        let s = &self.sources;
        let l = &self.loader;
        let (
            state_table,
            ny_confirmed,
            by_group,
            by_day,
            by_modzcta,
            reference,
            owid,
            geojson,
            page,
        ) = futures::try_join!(
            self.refresh_states(),
            l.load_table(&s.ny_confirmed),
            l.load_table(&s.nyc_by_group),
            l.load_table(&s.nyc_by_day),
            l.load_table(&s.nyc_by_modzcta),
            l.load_table(&s.modzcta_reference),
            l.load_table(&s.global),
            l.load_document(&s.modzcta_geojson),
            l.load_page(&s.borough_population),
        )?;

        let dashboard = Dashboard {
            generated_at: l.clock().now(),
            states: state_table,
            boroughs: nyc::normalize_boroughs(&by_group).context("normalizing nyc_by_group")?,
            daily: nyc::normalize_daily(&by_day).context("normalizing nyc_by_day")?,
            ny_cumulative: series::ny_cumulative(&ny_confirmed)
                .context("normalizing ny_confirmed")?,
            modzcta: nyc::merge_modzcta(&by_modzcta, &reference)
                .context("merging MODZCTA tables")?,
            global: global::normalize_global(&owid).context("normalizing global")?,
            boundaries: GeoBoundaries::from_value(geojson).context("indexing MODZCTA boundaries")?,
            borough_population: geo::parse_borough_population(&page)
                .context("parsing borough population")?,
        };

        info!(
            states = dashboard.states.len(),
            boroughs = dashboard.boroughs.len(),
            days = dashboard.daily.len(),
            areas = dashboard.modzcta.len(),
            countries = dashboard.global.len(),
            "dashboard refreshed"
        );
        Ok(dashboard)
    }
}
