// src/merge/series.rs

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use std::{fmt, str::FromStr};
use tracing::debug;

use crate::process::{date_parser::parse_us_date, RawTable};

pub const NY_STATE: &str = "New York";

/// Trailing time frames offered for the daily charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    PastWeek,
    TwoWeeks,
    ThirtyDays,
    NinetyDays,
    PastYear,
}

impl Window {
    /// In the order the selector lists them.
    pub const ALL: [Window; 5] = [
        Window::PastYear,
        Window::NinetyDays,
        Window::ThirtyDays,
        Window::TwoWeeks,
        Window::PastWeek,
    ];

    pub fn days(self) -> usize {
        match self {
            Window::PastWeek => 7,
            Window::TwoWeeks => 14,
            Window::ThirtyDays => 30,
            Window::NinetyDays => 90,
            Window::PastYear => 365,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Window::PastWeek => "Past Week",
            Window::TwoWeeks => "14 Days",
            Window::ThirtyDays => "30 Days",
            Window::NinetyDays => "90 Days",
            Window::PastYear => "Past Year",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Window {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Window::ALL
            .into_iter()
            .find(|w| w.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow!("unknown time frame `{}`", s))
    }
}

/// The last `n` items of a chronological series, order preserved.
pub fn take_last<T>(series: &[T], n: usize) -> &[T] {
    &series[series.len().saturating_sub(n)..]
}

pub fn truncate<T>(series: &[T], window: Window) -> &[T] {
    take_last(series, window.days())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumulativePoint {
    pub date: NaiveDate,
    pub cases: i64,
}

/// Confirmed cases since the outbreak for one state, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeSeries {
    pub region: String,
    pub points: Vec<CumulativePoint>,
}

impl CumulativeSeries {
    pub fn window(&self, window: Window) -> &[CumulativePoint] {
        truncate(&self.points, window)
    }

    pub fn latest(&self) -> Option<&CumulativePoint> {
        self.points.last()
    }
}

pub fn ny_cumulative(table: &RawTable) -> Result<CumulativeSeries> {
    state_cumulative(table, NY_STATE)
}

/// Sum every date column of the county-level confirmed-case file over the
/// rows belonging to `state`.
pub fn state_cumulative(table: &RawTable, state: &str) -> Result<CumulativeSeries> {
    let key = table.column("Province_State")?;
    let dates: Vec<(usize, NaiveDate)> = table
        .headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| parse_us_date(h).map(|d| (i, d)))
        .collect();
    if dates.is_empty() {
        bail!("no date columns in {}", table.source);
    }

    let mut sums = vec![0i64; dates.len()];
    let mut matched = 0usize;
    for row in 0..table.len() {
        if table.text(row, key) != Some(state) {
            continue;
        }
        matched += 1;
        for (sum, (col, _)) in sums.iter_mut().zip(&dates) {
            *sum += table.integer(row, *col).unwrap_or(0);
        }
    }
    if matched == 0 {
        bail!("no rows for `{}` in {}", state, table.source);
    }

    let mut points: Vec<CumulativePoint> = dates
        .iter()
        .zip(sums)
        .map(|((_, date), cases)| CumulativePoint { date: *date, cases })
        .collect();
    points.sort_by_key(|p| p.date);

    debug!(
        state,
        counties = matched,
        days = points.len(),
        "built cumulative series"
    );
    Ok(CumulativeSeries {
        region: state.to_string(),
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::table;

    #[test]
    fn labels_round_trip_through_parse() {
        assert_eq!("Past Week".parse::<Window>().unwrap().days(), 7);
        assert_eq!("90 days".parse::<Window>().unwrap(), Window::NinetyDays);
        assert_eq!(Window::PastYear.to_string(), "Past Year");
        assert!("Fortnight".parse::<Window>().is_err());
    }

    #[test]
    fn truncation_is_a_suffix() {
        let series: Vec<u32> = (1..=100).collect();
        let week = truncate(&series, Window::PastWeek);
        let month = truncate(&series, Window::ThirtyDays);
        assert_eq!(week, &[94, 95, 96, 97, 98, 99, 100]);
        assert_eq!(month.len(), 30);
        assert!(month.windows(week.len()).any(|w| w == week));
        assert_eq!(&month[month.len() - 7..], week);
        // shorter than the window: everything
        assert_eq!(truncate(&series[..3], Window::PastYear), &[1, 2, 3]);
        assert!(truncate::<u32>(&[], Window::PastWeek).is_empty());
    }

    const JHU: &str = "\
UID,iso2,iso3,code3,FIPS,Admin2,Province_State,Country_Region,Lat,Long_,Combined_Key,1/23/20,1/22/20,1/24/20
1,US,USA,840,36001,Albany,New York,US,42.6,-73.9,\"Albany, New York, US\",2,1,4
2,US,USA,840,36005,Bronx,New York,US,40.8,-73.8,\"Bronx, New York, US\",10,5,20
3,US,USA,840,34001,Atlantic,New Jersey,US,39.4,-74.6,\"Atlantic, New Jersey, US\",7,7,7
";

    #[test]
    fn sums_counties_per_date_in_chronological_order() -> Result<()> {
        let s = ny_cumulative(&table("ny_confirmed", JHU))?;
        let got: Vec<(String, i64)> = s
            .points
            .iter()
            .map(|p| (p.date.format("%Y-%m-%d").to_string(), p.cases))
            .collect();
        assert_eq!(
            got,
            vec![
                ("2020-01-22".to_string(), 6),
                ("2020-01-23".to_string(), 12),
                ("2020-01-24".to_string(), 24),
            ]
        );
        assert_eq!(s.latest().unwrap().cases, 24);
        assert_eq!(s.window(Window::PastWeek).len(), 3);
        Ok(())
    }

    #[test]
    fn unknown_state_is_an_error() {
        let err = state_cumulative(&table("ny_confirmed", JHU), "Ohio").unwrap_err();
        assert!(err.to_string().contains("Ohio"));
    }
}
