use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use tracing::debug;

use crate::process::utils::{clean_str, parse_count, parse_integer, parse_number};

/// A rectangular snapshot of one fetched CSV resource.
///
/// Every transformation returns a new table; nothing is edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Id of the source this table came from, used in error messages.
    pub source: String,
    /// When the body was downloaded.
    pub fetched_at: DateTime<Utc>,
    /// Header of the column that was split off as the row index, if any.
    pub index_name: Option<String>,
    /// One entry per row when `index_name` is set, otherwise empty.
    pub index: Vec<String>,
    pub headers: Vec<String>,
    /// Every data row, padded or cut to `headers.len()` fields.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Parse a CSV body with a header row. When `index_column` is given that
    /// column is moved out of `headers`/`rows` into `index`. When `columns`
    /// is given every other column is dropped while reading, so only the
    /// named cells are ever stored; names absent upstream are left for
    /// [`RawTable::column`] to report.
    pub fn from_csv<R: Read>(
        source: &str,
        fetched_at: DateTime<Utc>,
        reader: R,
        index_column: Option<usize>,
        columns: Option<&[&str]>,
    ) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let all_headers: Vec<String> = rdr
            .headers()
            .with_context(|| format!("reading CSV header of {}", source))?
            .iter()
            .map(clean_str)
            .collect();
        let width = all_headers.len();

        if let Some(idx) = index_column {
            if idx >= width {
                bail!(
                    "index column {} out of range for {} ({} columns)",
                    idx,
                    source,
                    width
                );
            }
        }

        let kept: Vec<usize> = (0..width)
            .filter(|&p| Some(p) != index_column)
            .filter(|&p| {
                columns.map_or(true, |names| names.contains(&all_headers[p].as_str()))
            })
            .collect();

        let mut index = Vec::new();
        let mut rows = Vec::new();
        let mut record = StringRecord::new();
        let mut n = 0usize;
        while rdr
            .read_record(&mut record)
            .with_context(|| format!("CSV parse error in {} at record {}", source, n))?
        {
            if let Some(idx) = index_column {
                index.push(record.get(idx).unwrap_or_default().to_string());
            }
            let row: Vec<String> = kept
                .iter()
                .map(|&p| record.get(p).unwrap_or_default().to_string())
                .collect();
            rows.push(row);
            n += 1;
        }

        let index_name = index_column.map(|idx| all_headers[idx].clone());
        let headers: Vec<String> = kept.iter().map(|&p| all_headers[p].clone()).collect();
        debug!(
            source,
            rows = rows.len(),
            columns = headers.len(),
            skipped = width - headers.len(),
            "parsed CSV"
        );

        Ok(Self {
            source: source.to_string(),
            fetched_at,
            index_name,
            index,
            headers,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Position of `name`; a missing column means the upstream schema drifted.
    pub fn column(&self, name: &str) -> Result<usize> {
        match self.headers.iter().position(|h| h == name) {
            Some(idx) => Ok(idx),
            None => bail!("missing column `{}` in {}", name, self.source),
        }
    }

    /// Trimmed cell text, `None` when blank.
    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn count(&self, row: usize, col: usize) -> Option<u64> {
        self.text(row, col).and_then(parse_count)
    }

    pub fn integer(&self, row: usize, col: usize) -> Option<i64> {
        self.text(row, col).and_then(parse_integer)
    }

    pub fn number(&self, row: usize, col: usize) -> Option<f64> {
        self.text(row, col).and_then(parse_number)
    }

    /// Keep only the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let positions = names
            .iter()
            .map(|n| self.column(n))
            .collect::<Result<Vec<_>>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| positions.iter().map(|&p| row[p].clone()).collect())
            .collect();
        Ok(Self {
            headers: names.iter().map(|n| n.to_string()).collect(),
            ..self.with_rows(rows)
        })
    }

    /// Rows for which `keep` returns true, index kept aligned.
    pub fn retain_rows(&self, mut keep: impl FnMut(&[String]) -> bool) -> Self {
        let mut index = Vec::new();
        let mut rows = Vec::new();
        for (n, row) in self.rows.iter().enumerate() {
            if keep(row) {
                if let Some(label) = self.index.get(n) {
                    index.push(label.clone());
                }
                rows.push(row.clone());
            }
        }
        Self {
            index,
            ..self.with_rows(rows)
        }
    }

    /// Drop rows whose `column` exactly matches one of `values`.
    pub fn exclude(&self, column: &str, values: &[&str]) -> Result<Self> {
        let col = self.column(column)?;
        let out = self.retain_rows(|row| !values.contains(&row[col].trim()));
        if out.len() != self.len() {
            debug!(
                source = %self.source,
                column,
                dropped = self.len() - out.len(),
                "excluded rows"
            );
        }
        Ok(out)
    }

    /// Replace every cell equal to `from` with `to`.
    pub fn replace(&self, from: &str, to: &str) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| {
                        if cell.trim() == from {
                            to.to_string()
                        } else {
                            cell.clone()
                        }
                    })
                    .collect()
            })
            .collect();
        self.with_rows(rows)
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<Self> {
        let col = self.column(from)?;
        let mut out = self.clone();
        out.headers[col] = to.to_string();
        Ok(out)
    }

    /// Same metadata and headers, different rows. The index is copied only
    /// when it still lines up with the new rows.
    fn with_rows(&self, rows: Vec<Vec<String>>) -> Self {
        let index = if self.index.len() == rows.len() {
            self.index.clone()
        } else {
            Vec::new()
        };
        Self {
            source: self.source.clone(),
            fetched_at: self.fetched_at,
            index_name: self.index_name.clone(),
            index,
            headers: self.headers.clone(),
            rows,
        }
    }
}

#[cfg(test)]
pub(crate) fn table(source: &str, csv: &str) -> RawTable {
    use chrono::TimeZone;
    let at = Utc.with_ymd_and_hms(2022, 1, 10, 12, 0, 0).unwrap();
    RawTable::from_csv(source, at, csv.as_bytes(), None, None).unwrap()
}
