//! Document fetching over a shared HTTP client.
//!
//! Every network read in the pipeline goes through this module: provider
//! pages and the binary documents (PDF, spreadsheet) they link to. Transport
//! failures come back as [`ScrapeError::Fetch`]; a non-2xx status is not an
//! error here — the body is returned and downstream locators decide what to
//! make of it.
//!
//! There is deliberately no retry at this layer. Retry is the orchestrator's
//! call, scoped to a whole provider run, not to individual requests.

use crate::error::ScrapeError;
use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .expect("building the shared HTTP client cannot fail")
});

/// Fetch a URL and return the response body as text.
///
/// # Arguments
///
/// * `url` - The page to fetch
/// * `headers` - Extra request headers (name, value); one origin insists on a
///   browser User-Agent
#[instrument(level = "debug", skip_all, fields(%url))]
pub async fn fetch_text(url: &str, headers: &[(&str, &str)]) -> Result<String, ScrapeError> {
    let mut request = CLIENT.get(url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    debug!(%status, bytes = body.len(), "Fetched document");
    Ok(body)
}

/// Fetch a URL and return the raw response body.
///
/// Used for linked binary documents (PDF schedules, spreadsheets).
#[instrument(level = "debug", skip_all, fields(%url))]
pub async fn fetch_bytes(url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, ScrapeError> {
    let mut request = CLIENT.get(url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    debug!(%status, bytes = body.len(), "Fetched binary document");
    Ok(body.to_vec())
}
