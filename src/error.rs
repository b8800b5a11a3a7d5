//! Error taxonomy for the extraction pipeline.
//!
//! Every provider failure is one of four kinds, and the orchestrator's
//! handling hinges on which one it gets:
//!
//! | Variant | Meaning | Retried? |
//! |---------|---------|----------|
//! | [`ScrapeError::Fetch`] | Transport-level failure (DNS, connect, timeout) | No |
//! | [`ScrapeError::StructureChanged`] | Expected markup pattern not found | No |
//! | [`ScrapeError::ModelUnavailable`] | AI model call failed | Yes, while retry mode is on |
//! | [`ScrapeError::Extraction`] | Malformed table, missing columns, decode failures | No |
//!
//! Failures are always contained to the provider that raised them; the other
//! providers' runs proceed independently.

use thiserror::Error;

/// A failure raised somewhere along one provider's scrape pipeline.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Network-level failure while fetching a page or a linked document.
    ///
    /// A non-2xx response is NOT a fetch error; the body is still returned
    /// and inspected downstream.
    #[error("error fetching website: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The markup pattern a locator expected was not found.
    ///
    /// `maybe_unpublished` distinguishes "the containers exist but none
    /// mention this week" (the schedule may simply not be posted yet) from
    /// "the page no longer has the containers at all" (a redesign).
    #[error("{context}")]
    StructureChanged {
        context: &'static str,
        maybe_unpublished: bool,
    },

    /// The AI model endpoint could not be reached or refused the request.
    ///
    /// The only retryable kind: the orchestrator re-runs the whole provider
    /// pipeline after a fixed backoff while retry mode is enabled.
    #[error("AI model not currently available: {0}")]
    ModelUnavailable(String),

    /// Anything else that makes the extracted data unusable: a tabular body
    /// without the expected header, a PDF that will not render, a workbook
    /// without the expected sheet.
    #[error("extraction failed: {0}")]
    Extraction(String),
}

impl ScrapeError {
    /// Short machine-friendly label for log fields and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Fetch(_) => "fetch",
            ScrapeError::StructureChanged { .. } => "structure_changed",
            ScrapeError::ModelUnavailable(_) => "model_unavailable",
            ScrapeError::Extraction(_) => "extraction",
        }
    }
}

/// A failure in the storage collaborator.
///
/// Kept separate from [`ScrapeError`] so storage trouble is never confused
/// with an extraction failure when deciding whether to retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        let e = ScrapeError::ModelUnavailable("503".to_string());
        assert_eq!(e.kind(), "model_unavailable");

        let e = ScrapeError::StructureChanged {
            context: "no media containers",
            maybe_unpublished: false,
        };
        assert_eq!(e.kind(), "structure_changed");
    }

    #[test]
    fn test_structure_changed_display_uses_context() {
        let e = ScrapeError::StructureChanged {
            context: "error fetching link; website structure may have changed",
            maybe_unpublished: true,
        };
        assert!(e.to_string().contains("structure may have changed"));
    }
}
