//! AI extraction adapter: document in, four-column table out.
//!
//! Two providers publish documents (a PDF, a spreadsheet) instead of
//! structured markup. This module isolates the one non-deterministic,
//! externally-dependent step of their pipelines: handing the rendered
//! document to a generative vision model together with a fixed instruction
//! template and getting back delimited text in the canonical
//! `province,day,time,sectors` shape.
//!
//! # Architecture
//!
//! - [`ExtractModel`]: the narrow capability trait the providers depend on,
//!   so tests substitute a deterministic stub
//! - [`GeminiExtractor`]: the real implementation against the Gemini
//!   `generateContent` REST API
//! - [`RetryExtract`]: decorator adding short exponential backoff with
//!   jitter for transient API blips
//!
//! The instruction templates are versioned constants embedded here, not
//! user-configurable. Any invocation failure — transport, non-success
//! status, unreadable response body — wraps uniformly as
//! [`ScrapeError::ModelUnavailable`], the one error kind the orchestrator
//! retries. A *malformed* response is not detected here; it surfaces
//! downstream as a normalization parse failure.

use crate::error::ScrapeError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::{rng, Rng};
use serde_json::{json, Value};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Instruction template for PDF page images, revision 1.
///
/// Kept in lockstep with the normalizer's header expectations; change both
/// together or not at all.
pub const PAGE_IMAGE_INSTRUCTIONS: &str = r#"You are an expert data extraction assistant. Your task is to analyze an image of a power maintenance schedule and convert the table into a csv file.
Follow these rules carefully:
1. The main table headers are the days of the scheduled maintenance, and the sub-headers are for "Provincia", "Municipio", "Circuito", "Horario", "Zona de Mantenimiento", and "Causa".
2. Go through each of these headers and extract the date, province, schedule, and zone.
3. The output should be a single csv-like string where each row represents a single maintenance event.

The header row should be: province,day,time,sectors

Here is an example of a single row from the table and its correct csv output:
province,day,time,sectors
Santo Domingo,lunes 15 de septiembre,9:20 a.m. - 3:20 p.m.,"Boreal, La Ureña, Los Tres Brazos, Riviera Del Ozama"

Notice how there is a dash separating the start and end time.

Analyze the entire image and extract all the entries in order from start to end of week. Your response should not contain any text outside of the csv data. Each row should have exactly four columns."#;

/// Instruction template for spreadsheet table dumps, revision 1.
pub const TABLE_TEXT_INSTRUCTIONS: &str = r#"You are an expert data extraction assistant. Your task is to analyze a csv file of a power maintenance schedule and organize the data, carefully following these instructions:
1. Find and extract the data pertaining to the date, province, schedule, and zone ("municipio").
2. The output should be a single csv-like string where each row represents a single maintenance event.

The header row should be: province,day,time,sectors

Here is an example of a single row from the table and its correct csv output:
province,day,time,sectors
Santo Domingo,lunes 15 de septiembre,9:20 a.m. - 3:20 p.m.,"Boreal, La Ureña, Los Tres Brazos, Riviera Del Ozama"

The output should strictly follow this format. If the data in the original file is formatted differently, your task is to adjust it so that it matches the expected format. For example, the date might be in iso format (YYYY-MM-DD), so you may need to match the "lunes 15 de septiembre" format. The header row in the original file might also not match the one specified above. Your task is to find the corresponding data and make sure the output matches the "province,day,time,sectors" format.

Analyze the entire csv file and extract all the entries in order from start to end of week. Your response should not contain any text outside of the csv data. Each row should have exactly four columns."#;

/// The document handed to the model.
#[derive(Debug, Clone)]
pub enum Payload {
    /// PNG-encoded page images of a rendered PDF.
    Pages(Vec<Vec<u8>>),
    /// Delimited text dump of a spreadsheet.
    Table(String),
}

/// Capability trait for the extraction model.
///
/// Implementors take a document payload plus an instruction template and
/// return the model's text answer. The trait is the seam where tests plug
/// in a deterministic stub.
pub trait ExtractModel {
    /// Send the payload to the model and return its raw text response.
    fn extract(
        &self,
        payload: &Payload,
        instructions: &str,
    ) -> impl Future<Output = Result<String, ScrapeError>> + Send;
}

impl<T: ExtractModel + Sync> ExtractModel for &T {
    async fn extract(&self, payload: &Payload, instructions: &str) -> Result<String, ScrapeError> {
        (**self).extract(payload, instructions).await
    }
}

/// Gemini `generateContent` client.
pub struct GeminiExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

impl GeminiExtractor {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

impl ExtractModel for GeminiExtractor {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn extract(&self, payload: &Payload, instructions: &str) -> Result<String, ScrapeError> {
        let t0 = Instant::now();
        let url = format!("{API_BASE}/{}:generateContent", self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(payload, instructions))
            .send()
            .await
            .map_err(|e| ScrapeError::ModelUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Model endpoint refused the request");
            return Err(ScrapeError::ModelUnavailable(format!(
                "model endpoint returned HTTP {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ScrapeError::ModelUnavailable(format!("unreadable response body: {e}")))?;

        let text = response_text(&body);
        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = text.len(),
            "Model call succeeded"
        );
        Ok(text)
    }
}

/// Build the `generateContent` request body for a payload.
fn request_body(payload: &Payload, instructions: &str) -> Value {
    let mut parts = vec![json!({ "text": instructions })];
    match payload {
        Payload::Pages(pages) => {
            for page in pages {
                parts.push(json!({
                    "inline_data": {
                        "mime_type": "image/png",
                        "data": BASE64.encode(page),
                    }
                }));
            }
        }
        Payload::Table(table) => parts.push(json!({ "text": table })),
    }
    json!({ "contents": [{ "parts": parts }] })
}

/// Concatenate the text parts of the first candidate.
///
/// A body without candidates yields an empty string on purpose: the
/// normalizer is the judge of whether the content is usable.
fn response_text(body: &Value) -> String {
    body["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Decorator that retries transient model failures with exponential backoff.
///
/// Only [`ScrapeError::ModelUnavailable`] is retried; every other error kind
/// passes straight through. Exhaustion surfaces the last
/// `ModelUnavailable`, which the orchestrator then handles on its own,
/// much coarser, schedule.
pub struct RetryExtract<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: ExtractModel> RetryExtract<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl<T: ExtractModel + Sync> ExtractModel for RetryExtract<T> {
    #[instrument(level = "info", skip_all)]
    async fn extract(&self, payload: &Payload, instructions: &str) -> Result<String, ScrapeError> {
        let mut attempt = 0usize;
        loop {
            match self.inner.extract(payload, instructions).await {
                Ok(response) => return Ok(response),
                Err(e @ ScrapeError::ModelUnavailable(_)) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(attempt, max = self.max_retries, error = %e, "extract() exhausted retries");
                        return Err(e);
                    }
                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);
                    warn!(attempt, max = self.max_retries, ?delay, error = %e, "extract() attempt failed; backing off");
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Call the model with short-backoff retry around transient failures.
///
/// This is the entry point the providers use.
#[instrument(level = "info", skip_all)]
pub async fn extract_with_backoff<M: ExtractModel + Sync>(
    model: &M,
    payload: &Payload,
    instructions: &str,
) -> Result<String, ScrapeError> {
    let api = RetryExtract::new(model, 3, Duration::from_secs(2));
    api.extract(payload, instructions).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_request_body_for_pages() {
        let payload = Payload::Pages(vec![vec![1, 2, 3], vec![4, 5]]);
        let body = request_body(&payload, "do the thing");

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["text"], "do the thing");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], BASE64.encode([1u8, 2, 3]));
    }

    #[test]
    fn test_request_body_for_table() {
        let payload = Payload::Table("province,day,time,sectors".to_string());
        let body = request_body(&payload, "instructions");

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["text"], "province,day,time,sectors");
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "a,b" }, { "text": ",c" }] }
            }]
        });
        assert_eq!(response_text(&body), "a,b,c");
    }

    #[test]
    fn test_response_text_tolerates_missing_candidates() {
        assert_eq!(response_text(&json!({})), "");
    }

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl ExtractModel for Flaky {
        async fn extract(&self, _: &Payload, _: &str) -> Result<String, ScrapeError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            if n <= self.failures {
                Err(ScrapeError::ModelUnavailable("503".to_string()))
            } else {
                Ok("province,day,time,sectors".to_string())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failures() {
        let model = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let api = RetryExtract::new(&model, 3, Duration::from_millis(10));
        let out = api
            .extract(&Payload::Table(String::new()), "x")
            .await
            .unwrap();
        assert_eq!(out, "province,day,time,sectors");
        assert_eq!(model.calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_surfaces_model_unavailable() {
        let model = Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let api = RetryExtract::new(&model, 3, Duration::from_millis(10));
        let err = api
            .extract(&Payload::Table(String::new()), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::ModelUnavailable(_)));
        // initial attempt plus three retries
        assert_eq!(model.calls.load(Ordering::Relaxed), 4);
    }

    struct Broken;

    impl ExtractModel for Broken {
        async fn extract(&self, _: &Payload, _: &str) -> Result<String, ScrapeError> {
            Err(ScrapeError::Extraction("bad table".to_string()))
        }
    }

    #[tokio::test]
    async fn test_non_retryable_errors_pass_through() {
        let api = RetryExtract::new(Broken, 3, Duration::from_millis(10));
        let err = api
            .extract(&Payload::Table(String::new()), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Extraction(_)));
    }
}
