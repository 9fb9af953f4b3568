// src/fetch/mod.rs

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};
use url::Url;

use crate::process::RawTable;

pub mod cache;

pub use cache::{epoch_bucket, Clock, SystemClock, TtlCache};

/// How a source's body is interpreted once downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Comma separated, header row first. `index_column` is split off as the
    /// row index; `columns`, when set, lists the only columns kept in memory.
    Csv {
        index_column: Option<usize>,
        columns: Option<&'static [&'static str]>,
    },
    GeoJson,
    /// An HTML page whose first `<table>` holds the data.
    HtmlTable,
}

/// One remote resource the dashboard reads.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: &'static str,
    pub url: Url,
    pub kind: SourceKind,
    /// How long a fetched snapshot stays valid.
    pub ttl: Duration,
}

/// Anything that can GET a URL and hand back its body.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get_text(&self, url: &Url) -> Result<String>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get_text(&self, url: &Url) -> Result<String> {
        debug!("Fetching text from {}", url);
        self.client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", url))?
            .text()
            .await
            .with_context(|| format!("Reading text from {}", url))
    }
}

/// Fetches sources and memoizes the parsed result per source TTL.
pub struct Loader {
    fetcher: Arc<dyn Fetch>,
    clock: Arc<dyn Clock>,
    tables: TtlCache<RawTable>,
    documents: TtlCache<serde_json::Value>,
    pages: TtlCache<String>,
}

impl Loader {
    pub fn new(fetcher: Arc<dyn Fetch>, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher,
            tables: TtlCache::new(Arc::clone(&clock)),
            documents: TtlCache::new(Arc::clone(&clock)),
            pages: TtlCache::new(Arc::clone(&clock)),
            clock,
        }
    }

    /// Live HTTP fetching against the wall clock.
    pub fn http() -> Self {
        Self::new(Arc::new(HttpFetcher::default()), Arc::new(SystemClock))
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    #[tracing::instrument(level = "info", skip(self, source), fields(source = source.id))]
    pub async fn load_table(&self, source: &Source) -> Result<Arc<RawTable>> {
        let (index_column, columns) = match source.kind {
            SourceKind::Csv {
                index_column,
                columns,
            } => (index_column, columns),
            other => bail!("source `{}` is {:?}, not CSV", source.id, other),
        };

        self.tables
            .get_or_fetch(source.id, source.ttl, || async {
                let body = self.fetcher.get_text(&source.url).await?;
                let table = RawTable::from_csv(
                    source.id,
                    self.clock.now(),
                    body.as_bytes(),
                    index_column,
                    columns,
                )?;
                info!(
                    rows = table.len(),
                    columns = table.headers.len(),
                    bytes = body.len(),
                    "fetched table"
                );
                Ok(table)
            })
            .await
            .with_context(|| format!("loading `{}` from {}", source.id, source.url))
    }

    #[tracing::instrument(level = "info", skip(self, source), fields(source = source.id))]
    pub async fn load_document(&self, source: &Source) -> Result<Arc<serde_json::Value>> {
        if source.kind != SourceKind::GeoJson {
            bail!("source `{}` is {:?}, not GeoJSON", source.id, source.kind);
        }

        self.documents
            .get_or_fetch(source.id, source.ttl, || async {
                let body = self.fetcher.get_text(&source.url).await?;
                let doc: serde_json::Value = serde_json::from_str(&body)
                    .with_context(|| format!("parsing JSON body of {}", source.url))?;
                info!(bytes = body.len(), "fetched document");
                Ok(doc)
            })
            .await
            .with_context(|| format!("loading `{}` from {}", source.id, source.url))
    }

    #[tracing::instrument(level = "info", skip(self, source), fields(source = source.id))]
    pub async fn load_page(&self, source: &Source) -> Result<Arc<String>> {
        if source.kind != SourceKind::HtmlTable {
            bail!(
                "source `{}` is {:?}, not an HTML page",
                source.id,
                source.kind
            );
        }

        self.pages
            .get_or_fetch(source.id, source.ttl, || async {
                let body = self.fetcher.get_text(&source.url).await?;
                info!(bytes = body.len(), "fetched page");
                Ok(body)
            })
            .await
            .with_context(|| format!("loading `{}` from {}", source.id, source.url))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ManualClock, StaticFetcher};
    use super::*;
    use chrono::{TimeZone, Utc};

    fn csv_source(url: &str) -> Source {
        Source {
            id: "us_states",
            url: Url::parse(url).unwrap(),
            kind: SourceKind::Csv {
                index_column: Some(0),
                columns: None,
            },
            ttl: Duration::from_secs(3600),
        }
    }

    fn loader(fetcher: Arc<StaticFetcher>) -> (Loader, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2022, 1, 10, 12, 0, 0).unwrap(),
        ));
        (Loader::new(fetcher, clock.clone()), clock)
    }

    #[tokio::test]
    async fn table_is_memoized_within_ttl() -> Result<()> {
        let url = "https://fixtures.test/us-states.csv";
        let body = "date,state,cases\n2022-01-10,Texas,5\n";
        let fetcher = Arc::new(StaticFetcher::default().with(url, body));
        let (loader, clock) = loader(fetcher.clone());
        let source = csv_source(url);

        let first = loader.load_table(&source).await?;
        clock.advance(chrono::Duration::minutes(59));
        let second = loader.load_table(&source).await?;
        assert_eq!(fetcher.hits(url), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.index_name.as_deref(), Some("date"));
        assert_eq!(first.headers, vec!["state", "cases"]);

        clock.advance(chrono::Duration::minutes(2));
        loader.load_table(&source).await?;
        assert_eq!(fetcher.hits(url), 2);
        Ok(())
    }

    #[tokio::test]
    async fn cached_table_holds_only_listed_columns() -> Result<()> {
        let url = "https://fixtures.test/owid.csv";
        let body = "iso_code,continent,location,date,total_cases,new_cases,total_cases_per_million\n\
                    FRA,Europe,France,2022-01-02,150,50,2.25\n";
        let fetcher = Arc::new(StaticFetcher::default().with(url, body));
        let (loader, _) = loader(fetcher);
        let source = Source {
            id: "global",
            url: Url::parse(url)?,
            kind: SourceKind::Csv {
                index_column: None,
                columns: Some(&["iso_code", "location", "date", "total_cases"]),
            },
            ttl: Duration::from_secs(3600),
        };

        let table = loader.load_table(&source).await?;
        assert_eq!(
            table.headers,
            vec!["iso_code", "location", "date", "total_cases"]
        );
        assert_eq!(table.rows[0], vec!["FRA", "France", "2022-01-02", "150"]);
        Ok(())
    }

    #[tokio::test]
    async fn fetch_failure_names_the_source() {
        let fetcher = Arc::new(StaticFetcher::default());
        let (loader, _) = loader(fetcher);
        let err = loader
            .load_table(&csv_source("https://fixtures.test/missing.csv"))
            .await
            .unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("us_states"));
        assert!(msg.contains("404"));
    }

    #[tokio::test]
    async fn kind_mismatch_is_rejected() {
        let (loader, _) = loader(Arc::new(StaticFetcher::default()));
        let err = loader
            .load_document(&csv_source("https://fixtures.test/a.csv"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not GeoJSON"));
    }

    #[tokio::test]
    async fn documents_and_pages_are_loaded() -> Result<()> {
        let geo = "https://fixtures.test/zones.geojson";
        let page = "https://fixtures.test/population.html";
        let fetcher = Arc::new(
            StaticFetcher::default()
                .with(geo, r#"{"type":"FeatureCollection","features":[]}"#)
                .with(page, "<table></table>"),
        );
        let (loader, _) = loader(fetcher);
        let ttl = Duration::from_secs(15 * 24 * 3600);

        let doc = loader
            .load_document(&Source {
                id: "modzcta_geojson",
                url: Url::parse(geo)?,
                kind: SourceKind::GeoJson,
                ttl,
            })
            .await?;
        assert_eq!(doc["type"], "FeatureCollection");

        let html = loader
            .load_page(&Source {
                id: "borough_population",
                url: Url::parse(page)?,
                kind: SourceKind::HtmlTable,
                ttl,
            })
            .await?;
        assert_eq!(html.as_str(), "<table></table>");
        Ok(())
    }
}
