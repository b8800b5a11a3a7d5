//! # Apagones
//!
//! A service that aggregates the weekly scheduled power-maintenance
//! ("outage") announcements of the three Dominican electricity
//! distributors and serves them as one API.
//!
//! Each distributor publishes the same kind of information in a different
//! shape:
//!
//! - **Edeeste**: a PDF table linked from a listing page
//! - **Edenorte**: an Excel workbook linked from a blog post
//! - **Edesur**: plain page markup, tabs and accordions
//!
//! ## Architecture
//!
//! The pipeline runs once at startup (fail fast, no backoff) and once per
//! day at midnight (with a 30-minute retry loop around model outages):
//!
//! 1. **Acquire**: fetch the provider's page and any linked document
//! 2. **Extract**: hand PDFs/spreadsheets to a vision model that answers
//!    with a fixed four-column table; Edesur is parsed straight from the DOM
//! 3. **Normalize**: group rows into canonical per-day, per-province events
//! 4. **Commit**: atomically replace that company's rows for the current
//!    ISO week
//!
//! The three providers run concurrently and fail independently; whatever
//! succeeds is committed. `GET /outages` serves the stored current week.

use chrono::{Days, Local, NaiveDateTime};
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod ai;
mod cli;
mod error;
mod fetch;
mod models;
mod normalize;
mod orchestrator;
mod pdf;
mod providers;
mod routes;
mod spreadsheet;
mod store;
mod week;

use ai::GeminiExtractor;
use cli::Cli;
use routes::AppState;
use store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    info!("apagones starting up");

    let store = Arc::new(PgStore::connect(&args.database_url).await?);
    store.migrate().await?;

    let model = Arc::new(GeminiExtractor::new(
        args.gemini_api_key.clone(),
        args.gemini_model.clone(),
    ));

    // Startup pass: fail fast so boot never hangs on a model outage; the
    // daily refresh will fill in whatever this pass missed.
    orchestrator::run(store.as_ref(), model.as_ref(), false).await;
    info!("Startup scrape finished");

    {
        let store = Arc::clone(&store);
        let model = Arc::clone(&model);
        fn assert_send<T: Send>(_: &T) {}
        let s: &PgStore = store.as_ref();
        let m = model.as_ref();
        let fr = orchestrator::probe_dispatch(s, m);
        assert_send(&fr);
        tokio::spawn(async move { daily_refresh(store, model).await });
    }

    let app = routes::router(AppState {
        store: Arc::clone(&store),
    });
    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!(listen = %args.listen, "Serving outage API");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Re-run the whole pipeline every midnight, local time.
///
/// The daily invocation runs with retry mode on: a provider stuck behind a
/// model outage keeps retrying on its 30-minute backoff without holding up
/// the next day's tick for the others.
async fn daily_refresh(store: Arc<PgStore>, model: Arc<GeminiExtractor>) {
    loop {
        let wait = until_next_midnight(Local::now().naive_local());
        info!(secs = wait.as_secs(), "Sleeping until the next scheduled refresh");
        sleep(wait).await;

        if let Err(e) = store.migrate().await {
            error!(error = %e, "Schema check failed; skipping this refresh");
            continue;
        }
        orchestrator::run(store.as_ref(), model.as_ref(), true).await;
    }
}

/// Seconds from `now` to the next local midnight, never zero.
fn until_next_midnight(now: NaiveDateTime) -> Duration {
    let next = (now.date() + Days::new(1))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    Duration::from_secs((next - now).num_seconds().max(1) as u64)
}
