//! Orchestration of the three provider pipelines.
//!
//! Each provider run walks a small state machine:
//!
//! ```text
//! PENDING -> RUNNING -> SUCCEEDED
//!                    -> FAILED_RETRYING -> RUNNING   (model unavailable, retry mode on)
//!                    -> FAILED_TERMINAL              (anything else)
//! ```
//!
//! The three runs are joined on one task and proceed independently: a
//! provider sitting in its 30-minute backoff suspends only its own future,
//! and a provider that fails terminally never stops the others from
//! committing. Only [`ScrapeError::ModelUnavailable`] is retried — the
//! document fetch and the model call are both redone from scratch on every
//! attempt — and the loop runs for as long as retry mode stays enabled.

use crate::ai::ExtractModel;
use crate::error::ScrapeError;
use crate::models::{Company, MaintenanceEvent};
use crate::providers::Provider;
use crate::store::MaintenanceStore;
use crate::week;
use chrono::Local;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// How long a provider waits after a model failure before starting over.
pub const MODEL_RETRY_BACKOFF: Duration = Duration::from_secs(30 * 60);

/// Terminal state of one provider run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    FailedTerminal,
}

/// Run all three providers concurrently and commit whatever succeeds.
///
/// # Arguments
///
/// * `retry` - `false` for the fail-fast startup invocation, `true` for the
///   daily scheduled one
#[instrument(level = "info", skip(store, model))]
pub async fn run<S, M>(store: &S, model: &M, retry: bool)
where
    S: MaintenanceStore + Sync,
    M: ExtractModel + Sync,
{
    info!("Starting pipeline run for all providers");
    let (edeeste, edesur, edenorte) = tokio::join!(
        dispatch(Provider::Edeeste, store, model, retry),
        dispatch(Provider::Edesur, store, model, retry),
        dispatch(Provider::Edenorte, store, model, retry),
    );
    info!(?edeeste, ?edesur, ?edenorte, "Pipeline run finished");
}

#[doc(hidden)]
pub async fn probe_dispatch<S, M>(store: &S, model: &M)
where
    S: MaintenanceStore + Sync,
    M: ExtractModel + Sync,
{
    let _ = dispatch(Provider::Edeeste, store, model, true).await;
}

/// Bridge one provider variant into the generic run loop.
async fn dispatch<S, M>(provider: Provider, store: &S, model: &M, retry: bool) -> RunOutcome
where
    S: MaintenanceStore + Sync,
    M: ExtractModel + Sync,
{
    // The closure owns `Copy` captures (`provider`, the `&M` reference) in an
    // `async move` block and hands back a boxed `Send` future. This routes
    // through the blanket `AsyncFnMut` impl for `FnMut() -> Future` instead of
    // an `async ||` closure, whose `CallRefFuture` borrows the closure with a
    // late-bound lifetime the compiler can't prove `Send` across `tokio::spawn`.
    run_provider(provider.company(), store, retry, move || {
        Box::pin(async move { provider.scrape(model).await })
            as Pin<Box<dyn Future<Output = Result<Vec<MaintenanceEvent>, ScrapeError>> + Send + '_>>
    })
    .await
}

/// Drive one provider's state machine to a terminal state.
///
/// `scrape` is the provider's whole pipeline; it is re-invoked from scratch
/// on every retry so a stale document can never be re-fed to the model.
pub async fn run_provider<S, F>(
    company: Company,
    store: &S,
    retry: bool,
    mut scrape: F,
) -> RunOutcome
where
    S: MaintenanceStore + Sync,
    F: AsyncFnMut() -> Result<Vec<MaintenanceEvent>, ScrapeError>,
{
    info!(%company, state = "pending", "Provider run queued");
    loop {
        info!(%company, state = "running", "Fetching data");
        match scrape().await {
            Ok(events) => return commit(company, store, events).await,
            Err(e @ ScrapeError::ModelUnavailable(_)) if retry => {
                warn!(
                    %company,
                    state = "failed_retrying",
                    backoff_secs = MODEL_RETRY_BACKOFF.as_secs(),
                    error = %e,
                    "Model unavailable; will retry from scratch"
                );
                sleep(MODEL_RETRY_BACKOFF).await;
            }
            Err(ScrapeError::StructureChanged {
                context,
                maybe_unpublished,
            }) => {
                // distinct log shape so operators can tell a redesign from a
                // late publication at a glance
                warn!(
                    %company,
                    state = "failed_terminal",
                    kind = "structure_changed",
                    maybe_unpublished,
                    context,
                    "Abandoning provider for this run"
                );
                return RunOutcome::FailedTerminal;
            }
            Err(e) => {
                error!(
                    %company,
                    state = "failed_terminal",
                    kind = e.kind(),
                    error = %e,
                    "Abandoning provider for this run"
                );
                return RunOutcome::FailedTerminal;
            }
        }
    }
}

/// Hand a successful scrape to the store.
///
/// An empty event list leaves whatever is already stored untouched: an
/// empty answer must never wipe a week that was extracted fine earlier the
/// same day.
async fn commit<S: MaintenanceStore + Sync>(
    company: Company,
    store: &S,
    events: Vec<MaintenanceEvent>,
) -> RunOutcome {
    if events.is_empty() {
        info!(%company, state = "succeeded", "No events extracted; existing rows left in place");
        return RunOutcome::Succeeded;
    }

    let week_number = week::week_number(Local::now().date_naive());
    match store
        .replace_current_week(company, week_number, &events)
        .await
    {
        Ok(()) => {
            info!(
                %company,
                state = "succeeded",
                count = events.len(),
                week_number,
                "Committed events"
            );
            RunOutcome::Succeeded
        }
        Err(e) => {
            error!(%company, state = "failed_terminal", error = %e, "Failed to commit events");
            RunOutcome::FailedTerminal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeSectors;
    use crate::store::MemoryStore;
    use std::cell::Cell;

    fn sample_events(company: Company) -> Vec<MaintenanceEvent> {
        vec![MaintenanceEvent {
            company,
            week_number: week::week_number(Local::now().date_naive()),
            day: "2025-09-15".to_string(),
            province: "Santo Domingo".to_string(),
            maintenance: vec![TimeSectors {
                time: "9:20 a.m. - 3:20 p.m.".to_string(),
                sectors: vec!["Boreal".to_string()],
            }],
        }]
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_unavailable_retries_until_success() {
        let store = MemoryStore::default();
        let calls = Cell::new(0u32);
        let started = tokio::time::Instant::now();

        let outcome = run_provider(Company::Edeeste, &store, true, async || {
            let n = calls.get() + 1;
            calls.set(n);
            if n <= 3 {
                // before a successful attempt, nothing may be committed
                assert!(store.all().is_empty());
                Err(ScrapeError::ModelUnavailable("503".to_string()))
            } else {
                Ok(sample_events(Company::Edeeste))
            }
        })
        .await;

        assert_eq!(outcome, RunOutcome::Succeeded);
        assert_eq!(calls.get(), 4);
        // three full backoff waits elapsed (paused time auto-advances)
        assert!(started.elapsed() >= MODEL_RETRY_BACKOFF * 3);
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn test_model_unavailable_without_retry_is_terminal() {
        let store = MemoryStore::default();
        let calls = Cell::new(0u32);

        let outcome = run_provider(Company::Edenorte, &store, false, async || {
            calls.set(calls.get() + 1);
            Err(ScrapeError::ModelUnavailable("503".to_string()))
        })
        .await;

        assert_eq!(outcome, RunOutcome::FailedTerminal);
        assert_eq!(calls.get(), 1);
        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn test_other_errors_are_never_retried() {
        let store = MemoryStore::default();
        let calls = Cell::new(0u32);

        let outcome = run_provider(Company::Edeeste, &store, true, async || {
            calls.set(calls.get() + 1);
            Err(ScrapeError::StructureChanged {
                context: "layout changed",
                maybe_unpublished: false,
            })
        })
        .await;

        assert_eq!(outcome, RunOutcome::FailedTerminal);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_one_failing_provider_does_not_block_the_others() {
        let store = MemoryStore::default();

        let (a, b, c) = tokio::join!(
            run_provider(Company::Edeeste, &store, true, async || {
                Err(ScrapeError::StructureChanged {
                    context: "not published yet",
                    maybe_unpublished: true,
                })
            }),
            run_provider(Company::Edesur, &store, true, async || {
                Ok(sample_events(Company::Edesur))
            }),
            run_provider(Company::Edenorte, &store, true, async || {
                Ok(sample_events(Company::Edenorte))
            }),
        );

        assert_eq!(a, RunOutcome::FailedTerminal);
        assert_eq!(b, RunOutcome::Succeeded);
        assert_eq!(c, RunOutcome::Succeeded);

        let stored = store.all();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|e| e.company == Company::Edesur));
        assert!(stored.iter().any(|e| e.company == Company::Edenorte));
        assert!(!stored.iter().any(|e| e.company == Company::Edeeste));
    }

    #[tokio::test]
    async fn test_empty_scrape_leaves_existing_rows() {
        let store = MemoryStore::default();
        let week = week::week_number(Local::now().date_naive());
        store
            .replace_current_week(Company::Edesur, week, &sample_events(Company::Edesur))
            .await
            .unwrap();

        let outcome =
            run_provider(Company::Edesur, &store, false, async || Ok(Vec::new())).await;

        assert_eq!(outcome, RunOutcome::Succeeded);
        assert_eq!(store.all().len(), 1);
    }
}
