// src/merge/geo.rs

use anyhow::{anyhow, bail, Result};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::{collections::BTreeSet, sync::Arc};
use tracing::{debug, warn};

use crate::process::utils::parse_count;

/// Property that links a boundary feature to the MODZCTA tables.
pub const FEATURE_KEY: &str = "modzcta";

/// The MODZCTA boundary document, validated and indexed by area key.
#[derive(Debug, Clone)]
pub struct GeoBoundaries {
    document: Arc<Value>,
    keys: BTreeSet<String>,
    features: usize,
}

impl GeoBoundaries {
    pub fn from_value(document: Arc<Value>) -> Result<Self> {
        match document.get("type").and_then(Value::as_str) {
            Some("FeatureCollection") => {}
            other => bail!(
                "expected a GeoJSON FeatureCollection, found type {:?}",
                other
            ),
        }
        let Some(features) = document.get("features").and_then(Value::as_array) else {
            bail!("GeoJSON FeatureCollection has no `features` array");
        };

        let mut keys = BTreeSet::new();
        let mut unkeyed = 0usize;
        for feature in features {
            match feature_key(feature) {
                Some(k) => {
                    keys.insert(k);
                }
                None => unkeyed += 1,
            }
        }
        if unkeyed > 0 {
            warn!(unkeyed, key = FEATURE_KEY, "features without a key property");
        }
        debug!(
            features = features.len(),
            keys = keys.len(),
            "indexed boundaries"
        );

        Ok(Self {
            features: features.len(),
            document,
            keys,
        })
    }

    /// The untouched document, for the map layer.
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn len(&self) -> usize {
        self.features
    }

    pub fn is_empty(&self) -> bool {
        self.features == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

fn feature_key(feature: &Value) -> Option<String> {
    match feature.get("properties")?.get(FEATURE_KEY)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoroughPopulation {
    pub name: String,
    /// Latest census figure.
    pub population: Option<u64>,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid CSS selector {:?}: {:?}", css, e))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read the first `<table>` of the population page: the `Name` column and
/// the second-to-last column, which holds the most recent census.
pub fn parse_borough_population(html: &str) -> Result<Vec<BoroughPopulation>> {
    let doc = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let header_sel = selector("th")?;
    let cell_sel = selector("td")?;

    let Some(table) = doc.select(&table_sel).next() else {
        bail!("no <table> on borough population page");
    };

    let mut name_col = 0usize;
    let mut out = Vec::new();
    for row in table.select(&row_sel) {
        let headers: Vec<String> = row.select(&header_sel).map(cell_text).collect();
        if !headers.is_empty() && row.select(&cell_sel).next().is_none() {
            if let Some(idx) = headers.iter().position(|h| h.starts_with("Name")) {
                name_col = idx;
            }
            continue;
        }

        let cells: Vec<String> = row.select(&cell_sel).map(cell_text).collect();
        if cells.len() < 2 || name_col >= cells.len() {
            continue;
        }
        let name = cells[name_col].clone();
        if name.is_empty() {
            continue;
        }
        out.push(BoroughPopulation {
            population: parse_count(&cells[cells.len() - 2]),
            name,
        });
    }

    if out.is_empty() {
        bail!("borough population table has no data rows");
    }
    debug!(rows = out.len(), "parsed borough population table");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn indexes_feature_keys() -> Result<()> {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"modzcta": "10001", "label": "10001, 10118"}, "geometry": null},
                {"type": "Feature", "properties": {"modzcta": 10002}, "geometry": null},
                {"type": "Feature", "properties": {}, "geometry": null}
            ]
        });
        let geo = GeoBoundaries::from_value(Arc::new(doc))?;
        assert_eq!(geo.len(), 3);
        assert!(geo.contains("10001"));
        assert!(geo.contains("10002"));
        assert_eq!(geo.keys().count(), 2);
        assert_eq!(geo.document()["type"], "FeatureCollection");
        Ok(())
    }

    #[test]
    fn rejects_non_collections() {
        let err = GeoBoundaries::from_value(Arc::new(json!({"type": "Feature"}))).unwrap_err();
        assert!(err.to_string().contains("FeatureCollection"));
        let err =
            GeoBoundaries::from_value(Arc::new(json!({"type": "FeatureCollection"}))).unwrap_err();
        assert!(err.to_string().contains("features"));
    }

    const PAGE: &str = r#"<html><body>
<table id="ts">
<thead><tr><th>Name</th><th>Status</th><th>Population<br>Census<br>2010-04-01</th><th>Population<br>Census<br>2020-04-01</th><th></th></tr></thead>
<tbody>
<tr><td class="rname"><a href="x">Bronx</a></td><td>Borough</td><td>1,385,108</td><td>1,472,654</td><td><a>→</a></td></tr>
<tr><td class="rname"><a href="y">Staten Island</a></td><td>Borough</td><td>468,730</td><td>495,747</td><td><a>→</a></td></tr>
</tbody>
<tfoot><tr><td>New York City</td><td>City</td><td>8,175,133</td><td>8,804,190</td><td></td></tr></tfoot>
</table>
<table><tr><td>other</td><td>1</td></tr></table>
</body></html>"#;

    #[test]
    fn reads_name_and_latest_census() -> Result<()> {
        let rows = parse_borough_population(PAGE)?;
        assert_eq!(
            rows,
            vec![
                BoroughPopulation {
                    name: "Bronx".into(),
                    population: Some(1_472_654)
                },
                BoroughPopulation {
                    name: "Staten Island".into(),
                    population: Some(495_747)
                },
                BoroughPopulation {
                    name: "New York City".into(),
                    population: Some(8_804_190)
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn page_without_table_is_an_error() {
        assert!(parse_borough_population("<p>moved</p>").is_err());
    }
}
