// src/merge/global.rs

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::process::{date_parser::parse_iso_date, RawTable};

/// The 5 of the roughly 67 OWID columns that are read.
pub const COLUMNS: &[&str] = &[
    "iso_code",
    "location",
    "date",
    "total_cases",
    "total_cases_per_million",
];

/// Continents, income groups and the world total carry this prefix.
const AGGREGATE_PREFIX: &str = "OWID_";

/// Latest cumulative figures for one country.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryRecord {
    pub iso_code: String,
    pub location: String,
    pub total_cases: Option<f64>,
    pub total_cases_per_million: Option<f64>,
    /// Date of the newest row seen for this country.
    pub as_of: Option<NaiveDate>,
}

/// Most recent non-null observation, by date.
#[derive(Default)]
struct Latest {
    value: Option<(Option<NaiveDate>, f64)>,
}

impl Latest {
    fn offer(&mut self, date: Option<NaiveDate>, value: Option<f64>) {
        let Some(v) = value else { return };
        match self.value {
            Some((seen, _)) if seen > date => {}
            _ => self.value = Some((date, v)),
        }
    }

    fn get(&self) -> Option<f64> {
        self.value.map(|(_, v)| v)
    }
}

#[derive(Default)]
struct Country {
    total_cases: Latest,
    per_million: Latest,
    as_of: Option<NaiveDate>,
}

/// One row per (`iso_code`, `location`), ordered by key.
///
/// Totals are each country's latest cumulative value, not a sum of the
/// cumulative column across dates, so they are far below such a sum.
#[instrument(level = "debug", skip(table), fields(source = %table.source))]
pub fn normalize_global(table: &RawTable) -> Result<Vec<CountryRecord>> {
    let iso = table.column("iso_code")?;
    let location = table.column("location")?;
    let date = table.column("date")?;
    let total = table.column("total_cases")?;
    let per_million = table.column("total_cases_per_million")?;

    let mut countries: BTreeMap<(String, String), Country> = BTreeMap::new();
    let mut aggregates = 0usize;
    for row in 0..table.len() {
        let (Some(code), Some(name)) = (table.text(row, iso), table.text(row, location)) else {
            continue;
        };
        if code.starts_with(AGGREGATE_PREFIX) {
            aggregates += 1;
            continue;
        }
        let day = table.text(row, date).and_then(parse_iso_date);
        let entry = countries
            .entry((code.to_string(), name.to_string()))
            .or_default();
        entry.total_cases.offer(day, table.number(row, total));
        entry.per_million.offer(day, table.number(row, per_million));
        entry.as_of = entry.as_of.max(day);
    }

    let out: Vec<CountryRecord> = countries
        .into_iter()
        .map(|((iso_code, location), c)| CountryRecord {
            iso_code,
            location,
            total_cases: c.total_cases.get(),
            total_cases_per_million: c.per_million.get(),
            as_of: c.as_of,
        })
        .collect();
    debug!(
        countries = out.len(),
        aggregate_rows = aggregates,
        "normalized global table"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::table;

    const OWID: &str = "\
iso_code,continent,location,date,total_cases,new_cases,total_cases_per_million
FRA,Europe,France,2022-01-01,100,,1.5
FRA,Europe,France,2022-01-02,150,50,2.25
FRA,Europe,France,2022-01-03,,,
AFG,Asia,Afghanistan,2022-01-01,10,10,0.25
OWID_WRL,,World,2022-01-02,5000,1,0.6
";

    #[test]
    fn keeps_latest_value_per_country() -> Result<()> {
        let rows = normalize_global(&table("global", OWID))?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].iso_code, "AFG");
        let france = &rows[1];
        assert_eq!(france.location, "France");
        assert_eq!(france.total_cases, Some(150.0));
        assert_eq!(france.total_cases_per_million, Some(2.25));
        assert_eq!(france.as_of, NaiveDate::from_ymd_opt(2022, 1, 3));
        Ok(())
    }

    #[test]
    fn reads_a_table_narrowed_to_its_columns() -> Result<()> {
        let narrow = RawTable::from_csv(
            "global",
            chrono::Utc::now(),
            OWID.as_bytes(),
            None,
            Some(COLUMNS),
        )?;
        assert_eq!(narrow.headers.len(), COLUMNS.len());
        assert_eq!(
            normalize_global(&narrow)?,
            normalize_global(&table("global", OWID))?
        );
        Ok(())
    }

    #[test]
    fn out_of_order_rows_do_not_regress() {
        let mut latest = Latest::default();
        let d = |day| NaiveDate::from_ymd_opt(2022, 1, day);
        latest.offer(d(5), Some(9.0));
        latest.offer(d(4), Some(8.0));
        latest.offer(d(6), None);
        assert_eq!(latest.get(), Some(9.0));
    }
}
