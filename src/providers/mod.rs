//! Distributor-specific extraction pipelines.
//!
//! Each submodule owns one distributor's acquisition strategy; all three
//! satisfy the same contract: locate this week's data and return canonical
//! events, or fail with a typed [`ScrapeError`].
//!
//! | Distributor | Module | Source format | Model call |
//! |-------------|--------|---------------|------------|
//! | Edeeste | [`edeeste`] | Downloadable PDF | Vision, page images |
//! | Edenorte | [`edenorte`] | Downloadable spreadsheet | Text, table dump |
//! | Edesur | [`edesur`] | Inline page markup | None |
//!
//! The set is closed: [`Provider`] is an enum, not a plugin registry, and
//! dispatch is an explicit match.

pub mod edeeste;
pub mod edenorte;
pub mod edesur;

use crate::ai::ExtractModel;
use crate::error::ScrapeError;
use crate::models::{Company, MaintenanceEvent};
use tokio::task;

/// One distributor's pipeline variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Edeeste,
    Edenorte,
    Edesur,
}

impl Provider {
    pub fn company(&self) -> Company {
        match self {
            Provider::Edeeste => Company::Edeeste,
            Provider::Edenorte => Company::Edenorte,
            Provider::Edesur => Company::Edesur,
        }
    }

    /// Run this provider's full pipeline.
    ///
    /// Edesur never touches the model; the parameter is part of the shared
    /// contract so callers treat all variants alike.
    pub async fn scrape<M: ExtractModel + Sync>(
        &self,
        model: &M,
    ) -> Result<Vec<MaintenanceEvent>, ScrapeError> {
        match self {
            Provider::Edeeste => edeeste::scrape(model).await,
            Provider::Edenorte => edenorte::scrape(model).await,
            Provider::Edesur => edesur::scrape().await,
        }
    }
}

/// Run CPU-bound work (HTML tree walks, rasterization, workbook decoding)
/// off the async scheduler.
///
/// The parsed HTML tree is not `Send`, so locator functions take the raw
/// document text and finish their whole walk inside the closure, returning
/// owned data.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, ScrapeError>
where
    F: FnOnce() -> Result<T, ScrapeError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|e| ScrapeError::Extraction(format!("background task failed: {e}")))?
}
