// src/merge/arrow.rs

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Date32Array, Float64Array, StringArray, UInt64Array},
    datatypes::{DataType as ArrowDataType, Date32Type, Field, Schema as ArrowSchema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use super::nyc::{Borough, DailySeries};
use super::states::{StateRecord, StateTable};

/// Column layout handed to the chart layer, in display order.
///
/// - text   → Utf8
/// - counts → UInt64
/// - pct_*  → Float64, null when the ratio is undefined
pub fn state_schema() -> Arc<ArrowSchema> {
    let text = |name: &str| Field::new(name, ArrowDataType::Utf8, false);
    let count = |name: &str| Field::new(name, ArrowDataType::UInt64, true);
    let pct = |name: &str| Field::new(name, ArrowDataType::Float64, true);

    Arc::new(ArrowSchema::new(vec![
        text("state"),
        text("id"),
        count("population"),
        count("cases"),
        count("confirmed_cases"),
        pct("pct_Covid"),
        count("completedVaccination"),
        pct("pct_Fully_Vaccinated"),
        count("boosterDosesAdministered"),
        pct("pct_ReceivedBooster"),
        count("deaths"),
        pct("pct_deadFromCovid"),
    ]))
}

impl StateTable {
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let rows = self.records();
        let text = |f: fn(&StateRecord) -> &str| -> ArrayRef {
            Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
        };
        let count = |f: fn(&StateRecord) -> Option<u64>| -> ArrayRef {
            Arc::new(UInt64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
        };
        let pct = |f: fn(&StateRecord) -> Option<f64>| -> ArrayRef {
            Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
        };

        let columns = vec![
            text(|r| r.state.as_str()),
            text(|r| r.id.as_str()),
            count(|r| r.population),
            count(|r| r.cases),
            count(|r| r.confirmed_cases),
            pct(|r| r.pct_covid),
            count(|r| r.completed_vaccination),
            pct(|r| r.pct_fully_vaccinated),
            count(|r| r.booster_doses_administered),
            pct(|r| r.pct_received_booster),
            count(|r| r.deaths),
            pct(|r| r.pct_dead_from_covid),
        ];
        RecordBatch::try_new(state_schema(), columns).context("building state record batch")
    }
}

/// `Date`, `Avg_Total_City_Case_Count`, then one `<code>_7Day_Avg` per borough.
pub fn daily_schema() -> Arc<ArrowSchema> {
    let mut fields = vec![
        Field::new("Date", ArrowDataType::Date32, false),
        Field::new("Avg_Total_City_Case_Count", ArrowDataType::Float64, true),
    ];
    for b in Borough::ALL {
        fields.push(Field::new(
            format!("{}_7Day_Avg", b.code()),
            ArrowDataType::Float64,
            true,
        ));
    }
    Arc::new(ArrowSchema::new(fields))
}

impl DailySeries {
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let points = self.points();
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(Date32Array::from(
                points
                    .iter()
                    .map(|p| Date32Type::from_naive_date(p.date))
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                points.iter().map(|p| p.citywide).collect::<Vec<_>>(),
            )),
        ];
        for b in Borough::ALL {
            columns.push(Arc::new(Float64Array::from(
                points.iter().map(|p| p.borough(b)).collect::<Vec<_>>(),
            )));
        }
        RecordBatch::try_new(daily_schema(), columns).context("building daily record batch")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::nyc::DailyPoint;
    use crate::merge::states::{join_states, CaseRow, VaccinationRow};
    use arrow::array::Array;
    use chrono::NaiveDate;

    #[test]
    fn state_batch_has_display_columns_and_null_ratios() -> Result<()> {
        let cases = vec![
            CaseRow {
                state: "Ohio".into(),
                cases: Some(30),
                confirmed_cases: Some(25),
                deaths: Some(1),
            },
            CaseRow {
                state: "Utah".into(),
                cases: Some(10),
                confirmed_cases: None,
                deaths: None,
            },
        ];
        let vacc = |state: &str, id: &str, population| VaccinationRow {
            id: id.into(),
            state: state.into(),
            people_vaccinated: Some(1),
            completed_vaccination: Some(50),
            booster_doses_administered: Some(20),
            population,
        };
        let table = join_states(
            &cases,
            &[vacc("Ohio", "OH", Some(100)), vacc("Utah", "UT", Some(0))],
        );

        let batch = table.to_record_batch()?;
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 12);
        assert_eq!(batch.schema().field(5).name(), "pct_Covid");

        let ids = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(ids.value(0), "OH");

        let pct = batch
            .column(5)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!((pct.value(0) - 30.0).abs() < 1e-9);
        assert!(pct.is_null(1));
        Ok(())
    }

    #[test]
    fn daily_batch_uses_date32() -> Result<()> {
        let series = DailySeries::new(vec![
            DailyPoint::new(
                NaiveDate::from_ymd_opt(1970, 1, 11).unwrap(),
                Some(1.0),
                [Some(2.0), None, None, None, Some(6.0)],
            ),
            DailyPoint::new(
                NaiveDate::from_ymd_opt(1969, 12, 31).unwrap(),
                None,
                [None; 5],
            ),
        ]);
        let batch = series.to_record_batch()?;
        assert_eq!(batch.num_columns(), 7);
        assert_eq!(batch.schema().field(6).name(), "SI_7Day_Avg");
        let dates = batch
            .column(0)
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        // sorted on construction; days are counted from 1970-01-01
        assert_eq!(dates.value(0), -1);
        assert_eq!(dates.value(1), 10);
        Ok(())
    }
}
