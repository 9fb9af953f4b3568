// src/merge/nyc.rs

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::{collections::HashMap, fmt};
use tracing::{debug, instrument, warn};

use crate::merge::series::{take_last, truncate, Window};
use crate::process::{date_parser::parse_date, RawTable};

/// How much trailing history the daily series keeps.
pub const DAILY_HISTORY_DAYS: usize = 365;

pub const BOROUGH_COLUMNS: &[&str] = &["subgroup", "CASE_RATE", "CASE_COUNT"];

pub const DAILY_COLUMNS: &[&str] = &[
    "date_of_interest",
    "ALL_CASE_COUNT_7DAY_AVG",
    "BK_ALL_CASE_COUNT_7DAY_AVG",
    "BX_ALL_CASE_COUNT_7DAY_AVG",
    "MN_ALL_CASE_COUNT_7DAY_AVG",
    "QN_ALL_CASE_COUNT_7DAY_AVG",
    "SI_ALL_CASE_COUNT_7DAY_AVG",
];

pub const MODZCTA_COLUMNS: &[&str] = &[
    "label",
    "NEIGHBORHOOD_NAME",
    "BOROUGH_GROUP",
    "COVID_CASE_COUNT",
    "COVID_CASE_RATE",
    "PERCENT_POSITIVE",
];

pub const REFERENCE_COLUMNS: &[&str] = &["label", "modzcta", "zcta", "the_geom"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Borough {
    Brooklyn,
    Bronx,
    Manhattan,
    Queens,
    StatenIsland,
}

impl Borough {
    pub const ALL: [Borough; 5] = [
        Borough::Brooklyn,
        Borough::Bronx,
        Borough::Manhattan,
        Borough::Queens,
        Borough::StatenIsland,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Borough::Brooklyn => "Brooklyn",
            Borough::Bronx => "Bronx",
            Borough::Manhattan => "Manhattan",
            Borough::Queens => "Queens",
            Borough::StatenIsland => "Staten Island",
        }
    }

    /// Column prefix used by the NYC Health trend files.
    pub fn code(self) -> &'static str {
        match self {
            Borough::Brooklyn => "BK",
            Borough::Bronx => "BX",
            Borough::Manhattan => "MN",
            Borough::Queens => "QN",
            Borough::StatenIsland => "SI",
        }
    }

    /// Exact names only; the totals files spell Staten Island without a space.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Brooklyn" => Some(Borough::Brooklyn),
            "Bronx" => Some(Borough::Bronx),
            "Manhattan" => Some(Borough::Manhattan),
            "Queens" => Some(Borough::Queens),
            "Staten Island" | "StatenIsland" => Some(Borough::StatenIsland),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Borough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoroughRecord {
    pub borough: Borough,
    /// Cases per 100,000 residents.
    pub case_rate: Option<f64>,
    pub case_count: Option<u64>,
}

#[instrument(level = "debug", skip(table), fields(source = %table.source))]
pub fn normalize_boroughs(table: &RawTable) -> Result<Vec<BoroughRecord>> {
    let subgroup = table.column("subgroup")?;
    let rate = table.column("CASE_RATE")?;
    let count = table.column("CASE_COUNT")?;

    let mut out: Vec<BoroughRecord> = Vec::with_capacity(Borough::ALL.len());
    for row in 0..table.len() {
        let Some(borough) = table.text(row, subgroup).and_then(Borough::parse) else {
            continue;
        };
        if out.iter().any(|r| r.borough == borough) {
            warn!(%borough, "duplicate borough row ignored");
            continue;
        }
        out.push(BoroughRecord {
            borough,
            case_rate: table.number(row, rate),
            case_count: table.count(row, count),
        });
    }
    debug!(boroughs = out.len(), "normalized borough totals");
    Ok(out)
}

/// 7-day averages for one day, citywide and per borough.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub citywide: Option<f64>,
    boroughs: [Option<f64>; 5],
}

impl DailyPoint {
    pub fn new(date: NaiveDate, citywide: Option<f64>, boroughs: [Option<f64>; 5]) -> Self {
        Self {
            date,
            citywide,
            boroughs,
        }
    }

    pub fn borough(&self, borough: Borough) -> Option<f64> {
        self.boroughs[borough.index()]
    }
}

/// Daily 7-day moving averages, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySeries {
    points: Vec<DailyPoint>,
}

impl DailySeries {
    /// Sorts by date; the order is kept stable for equal dates.
    pub fn new(mut points: Vec<DailyPoint>) -> Self {
        points.sort_by_key(|p| p.date);
        Self { points }
    }

    pub fn points(&self) -> &[DailyPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn window(&self, window: Window) -> &[DailyPoint] {
        truncate(&self.points, window)
    }
}

fn avg_column(borough: Option<Borough>) -> String {
    match borough {
        Some(b) => format!("{}_ALL_CASE_COUNT_7DAY_AVG", b.code()),
        None => "ALL_CASE_COUNT_7DAY_AVG".to_string(),
    }
}

#[instrument(level = "debug", skip(table), fields(source = %table.source))]
pub fn normalize_daily(table: &RawTable) -> Result<DailySeries> {
    let date_col = table.column("date_of_interest")?;
    let city = table.column(&avg_column(None))?;
    let mut borough_cols = [0usize; 5];
    for b in Borough::ALL {
        borough_cols[b.index()] = table.column(&avg_column(Some(b)))?;
    }

    let mut points = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let raw = table.text(row, date_col).unwrap_or_default();
        let date = parse_date(raw).with_context(|| {
            format!(
                "unparseable date_of_interest `{}` at row {} of {}",
                raw, row, table.source
            )
        })?;
        let boroughs = borough_cols.map(|col| table.number(row, col));
        points.push(DailyPoint::new(date, table.number(row, city), boroughs));
    }

    let mut series = DailySeries::new(points);
    series.points = take_last(&series.points, DAILY_HISTORY_DAYS).to_vec();
    debug!(days = series.len(), "normalized daily series");
    Ok(series)
}

/// One MODZCTA area with its case totals and boundary geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ZctaRecord {
    pub neighborhood_name: String,
    pub borough_group: String,
    pub modzcta: String,
    pub zcta: String,
    pub covid_case_count: Option<u64>,
    pub covid_case_rate: Option<f64>,
    pub percent_positive: Option<f64>,
    pub label: String,
    pub the_geom: String,
}

/// Inner join of the per-MODZCTA totals with the city reference table on `label`.
#[instrument(level = "debug", skip_all, fields(source = %by_modzcta.source))]
pub fn merge_modzcta(by_modzcta: &RawTable, reference: &RawTable) -> Result<Vec<ZctaRecord>> {
    let l_label = by_modzcta.column("label")?;
    let name = by_modzcta.column("NEIGHBORHOOD_NAME")?;
    let group = by_modzcta.column("BOROUGH_GROUP")?;
    let count = by_modzcta.column("COVID_CASE_COUNT")?;
    let rate = by_modzcta.column("COVID_CASE_RATE")?;
    let positive = by_modzcta.column("PERCENT_POSITIVE")?;

    let r_label = reference.column("label")?;
    let modzcta = reference.column("modzcta")?;
    let zcta = reference.column("zcta")?;
    let geom = reference.column("the_geom")?;

    let mut by_label: HashMap<&str, Vec<usize>> = HashMap::new();
    for row in 0..reference.len() {
        if let Some(label) = reference.text(row, r_label) {
            by_label.entry(label).or_default().push(row);
        }
    }

    let text = |t: &RawTable, row: usize, col: usize| {
        t.text(row, col).unwrap_or_default().to_string()
    };
    let mut out = Vec::new();
    for row in 0..by_modzcta.len() {
        let Some(label) = by_modzcta.text(row, l_label) else {
            continue;
        };
        for &r in by_label.get(label).into_iter().flatten() {
            out.push(ZctaRecord {
                neighborhood_name: text(by_modzcta, row, name),
                borough_group: text(by_modzcta, row, group),
                modzcta: text(reference, r, modzcta),
                zcta: text(reference, r, zcta),
                covid_case_count: by_modzcta.count(row, count),
                covid_case_rate: by_modzcta.number(row, rate),
                percent_positive: by_modzcta.number(row, positive),
                label: label.to_string(),
                the_geom: text(reference, r, geom),
            });
        }
    }
    debug!(areas = out.len(), "merged MODZCTA tables");
    Ok(out)
}
