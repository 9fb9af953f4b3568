use anyhow::Result;
use covidboard::{merge::Borough, Config, DatasetMerger, Loader, Window};
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const TOP_N: usize = 5;

fn pct(v: Option<f64>) -> String {
    v.map(|p| format!("{:.2}%", p))
        .unwrap_or_else(|| "n/a".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,covidboard=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configure sources ────────────────────────────────────────
    let config = Config::from_env()?;
    let merger = DatasetMerger::new(Loader::http(), &config)?;

    // ─── 3) refresh ──────────────────────────────────────────────────
    let start = Instant::now();
    let dashboard = merger.refresh().await?;
    info!(elapsed = ?start.elapsed(), at = %dashboard.generated_at, "refresh complete");

    // ─── 4) summarize ────────────────────────────────────────────────
    for r in dashboard.states.most_affected().iter().take(TOP_N) {
        info!(state = %r.state, pct_covid = %pct(r.pct_covid), "most affected");
    }
    for r in dashboard
        .states
        .vaccination_leaderboard()
        .iter()
        .rev()
        .filter(|r| r.pct_fully_vaccinated.is_some())
        .take(TOP_N)
    {
        info!(
            state = %r.state,
            fully_vaccinated = %pct(r.pct_fully_vaccinated),
            booster = %pct(r.pct_received_booster),
            "most vaccinated"
        );
    }

    for p in dashboard.daily.window(Window::PastWeek) {
        info!(
            date = %p.date,
            citywide = ?p.citywide,
            brooklyn = ?p.borough(Borough::Brooklyn),
            "7-day average"
        );
    }
    for b in &dashboard.boroughs {
        info!(borough = %b.borough, count = ?b.case_count, rate = ?b.case_rate, "borough totals");
    }

    match dashboard.ny_cumulative.latest() {
        Some(p) => info!(date = %p.date, cases = p.cases, "New York cumulative"),
        None => warn!("New York cumulative series is empty"),
    }

    let missing = dashboard
        .modzcta
        .iter()
        .filter(|z| !dashboard.boundaries.contains(&z.modzcta))
        .count();
    if missing > 0 {
        warn!(missing, "MODZCTA rows without a boundary feature");
    }

    let batch = dashboard.states.to_record_batch()?;
    info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        countries = dashboard.global.len(),
        "all done"
    );
    Ok(())
}
