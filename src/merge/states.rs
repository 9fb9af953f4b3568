// src/merge/states.rs

use anyhow::Result;
use std::{cmp::Ordering, collections::HashMap};
use tracing::{debug, instrument, warn};

use crate::process::RawTable;

/// Territories dropped from the case table.
pub const CASE_EXCLUSIONS: &[&str] = &["Northern Mariana Islands", "American Samoa"];

/// Territories dropped from the vaccination table. Both spellings of the
/// Marianas appear upstream.
pub const VACCINATION_EXCLUSIONS: &[&str] = &[
    "Micronesia",
    "Marshall Islands",
    "Palau",
    "Northern Marianas",
    "Northern Mariana Islands",
    "American Samoa",
];

/// Federal programs and national totals listed alongside the states in the
/// vaccination tracker.
pub const NON_STATE_AGGREGATES: &[&str] = &[
    "Bureau of Prisons",
    "Dept. of Defense",
    "Department of Defense",
    "Indian Health Svc",
    "Indian Health Service",
    "Veterans Health",
    "Veterans Health Administration",
    "Long Term Care",
    "Federal Entities",
    "United States",
    "U.S. Total",
];

/// Columns of the live case table read by [`normalize_cases`]. `deaths` is optional.
pub const CASE_COLUMNS: &[&str] = &["state", "cases", "confirmed_cases", "deaths"];

/// Columns of the vaccination table read by [`normalize_vaccinations`].
pub const VACCINATION_COLUMNS: &[&str] = &[
    "id",
    "name",
    "peopleVaccinated",
    "completedVaccination",
    "boosterDosesAdministered",
    "population",
];

/// One row of the live case table after projection.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRow {
    pub state: String,
    pub cases: Option<u64>,
    pub confirmed_cases: Option<u64>,
    pub deaths: Option<u64>,
}

/// One row of the vaccination table after projection and renaming.
#[derive(Debug, Clone, PartialEq)]
pub struct VaccinationRow {
    pub id: String,
    pub state: String,
    pub people_vaccinated: Option<u64>,
    pub completed_vaccination: Option<u64>,
    pub booster_doses_administered: Option<u64>,
    pub population: Option<u64>,
}

/// A state or territory present in both sources, with derived percentages.
///
/// A percentage is `None` when its numerator is missing or the population is
/// missing or zero.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub state: String,
    pub id: String,
    pub population: Option<u64>,
    pub cases: Option<u64>,
    pub confirmed_cases: Option<u64>,
    pub deaths: Option<u64>,
    pub people_vaccinated: Option<u64>,
    pub completed_vaccination: Option<u64>,
    pub booster_doses_administered: Option<u64>,
    pub pct_covid: Option<f64>,
    pub pct_fully_vaccinated: Option<f64>,
    pub pct_received_booster: Option<f64>,
    pub pct_dead_from_covid: Option<f64>,
}

/// `numerator / population * 100`, or `None` when undefined.
pub fn ratio(numerator: Option<u64>, population: Option<u64>) -> Option<f64> {
    match (numerator, population) {
        (Some(n), Some(p)) if p > 0 => Some(n as f64 / p as f64 * 100.0),
        _ => None,
    }
}

/// Ascending or descending on a nullable key; `None` always sorts last.
fn nulls_last<T: PartialOrd>(a: Option<T>, b: Option<T>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Project the live case table and drop the excluded territories, largest
/// case count first.
#[instrument(level = "debug", skip(table), fields(source = %table.source))]
pub fn normalize_cases(table: &RawTable) -> Result<Vec<CaseRow>> {
    let mut wanted = vec!["state", "confirmed_cases", "cases"];
    if table.has_column("deaths") {
        wanted.push("deaths");
    }
    let t = table.select(&wanted)?.exclude("state", CASE_EXCLUSIONS)?;

    let state = t.column("state")?;
    let confirmed = t.column("confirmed_cases")?;
    let cases = t.column("cases")?;
    let deaths = t.column("deaths").ok();

    let mut rows: Vec<CaseRow> = (0..t.len())
        .filter_map(|r| {
            Some(CaseRow {
                state: t.text(r, state)?.to_string(),
                cases: t.count(r, cases),
                confirmed_cases: t.count(r, confirmed),
                deaths: deaths.and_then(|d| t.count(r, d)),
            })
        })
        .collect();
    rows.sort_by(|a, b| nulls_last(a.cases, b.cases, true));

    debug!(rows = rows.len(), "normalized case table");
    Ok(rows)
}

/// Drop aggregate and excluded rows, align the Virgin Islands name with the
/// case table, and project the columns used downstream.
#[instrument(level = "debug", skip(table), fields(source = %table.source))]
pub fn normalize_vaccinations(table: &RawTable) -> Result<Vec<VaccinationRow>> {
    let t = table
        .exclude("name", NON_STATE_AGGREGATES)?
        .exclude("name", VACCINATION_EXCLUSIONS)?
        .replace("U.S. Virgin Islands", "Virgin Islands")
        .select(VACCINATION_COLUMNS)?
        .rename("name", "state")?;

    let id = t.column("id")?;
    let state = t.column("state")?;
    let people = t.column("peopleVaccinated")?;
    let completed = t.column("completedVaccination")?;
    let boosters = t.column("boosterDosesAdministered")?;
    let population = t.column("population")?;

    let rows: Vec<VaccinationRow> = (0..t.len())
        .filter_map(|r| {
            Some(VaccinationRow {
                id: t.text(r, id).unwrap_or_default().to_string(),
                state: t.text(r, state)?.to_string(),
                people_vaccinated: t.count(r, people),
                completed_vaccination: t.count(r, completed),
                booster_doses_administered: t.count(r, boosters),
                population: t.count(r, population),
            })
        })
        .collect();

    debug!(rows = rows.len(), "normalized vaccination table");
    Ok(rows)
}

/// Inner join on `state`, keeping the case table's order, then derive the
/// percentage columns. States found on one side only are dropped.
pub fn join_states(cases: &[CaseRow], vaccinations: &[VaccinationRow]) -> StateTable {
    let mut by_state: HashMap<&str, Vec<&VaccinationRow>> = HashMap::new();
    for v in vaccinations {
        by_state.entry(v.state.as_str()).or_default().push(v);
    }

    let mut records = Vec::with_capacity(cases.len());
    let mut unmatched = Vec::new();
    for c in cases {
        let Some(matches) = by_state.get(c.state.as_str()) else {
            unmatched.push(c.state.as_str());
            continue;
        };
        for v in matches {
            records.push(StateRecord {
                state: c.state.clone(),
                id: v.id.clone(),
                population: v.population,
                cases: c.cases,
                confirmed_cases: c.confirmed_cases,
                deaths: c.deaths,
                people_vaccinated: v.people_vaccinated,
                completed_vaccination: v.completed_vaccination,
                booster_doses_administered: v.booster_doses_administered,
                pct_covid: ratio(c.cases, v.population),
                pct_fully_vaccinated: ratio(v.completed_vaccination, v.population),
                pct_received_booster: ratio(v.booster_doses_administered, v.population),
                pct_dead_from_covid: ratio(c.deaths, v.population),
            });
        }
    }

    if !unmatched.is_empty() {
        debug!(states = ?unmatched, "case rows without vaccination data dropped");
    }
    let vaccination_only: Vec<&str> = vaccinations
        .iter()
        .map(|v| v.state.as_str())
        .filter(|s| !cases.iter().any(|c| c.state == *s))
        .collect();
    if !vaccination_only.is_empty() {
        debug!(states = ?vaccination_only, "vaccination rows without case data dropped");
    }
    let undefined = records.iter().filter(|r| r.pct_covid.is_none()).count();
    if undefined > 0 {
        warn!(undefined, "states with an undefined case percentage");
    }

    StateTable { records }
}

/// The merged state-level dataset and its ranked views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateTable {
    records: Vec<StateRecord>,
}

impl StateTable {
    pub fn records(&self) -> &[StateRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, state: &str) -> Option<&StateRecord> {
        self.records.iter().find(|r| r.state == state)
    }

    /// States with a reported, nonzero case count, lowest `pct_Covid` first.
    pub fn cleaned(&self) -> Vec<&StateRecord> {
        let mut rows: Vec<&StateRecord> = self
            .records
            .iter()
            .filter(|r| matches!(r.cases, Some(c) if c != 0))
            .collect();
        rows.sort_by(|a, b| nulls_last(a.pct_covid, b.pct_covid, false));
        rows
    }

    pub fn least_affected(&self) -> Vec<&StateRecord> {
        self.cleaned()
    }

    /// The cleaned view, highest `pct_Covid` first.
    pub fn most_affected(&self) -> Vec<&StateRecord> {
        let mut rows = self.cleaned();
        rows.sort_by(|a, b| nulls_last(a.pct_covid, b.pct_covid, true));
        rows
    }

    /// Every state, lowest `pct_Fully_Vaccinated` first.
    pub fn vaccination_leaderboard(&self) -> Vec<&StateRecord> {
        let mut rows: Vec<&StateRecord> = self.records.iter().collect();
        rows.sort_by(|a, b| {
            nulls_last(a.pct_fully_vaccinated, b.pct_fully_vaccinated, false)
        });
        rows
    }
}
