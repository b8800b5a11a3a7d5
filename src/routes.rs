//! HTTP query endpoint for the stored events.
//!
//! One route: `GET /outages` returns the current ISO week's events across
//! all companies. An empty week — whether never scraped or scraped and
//! failed — is a plain `404 Data not found.`; clients get no distinction
//! between the two on purpose.

use crate::models::MaintenanceEvent;
use crate::store::MaintenanceStore;
use crate::week;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Datelike, Local};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, instrument};

/// Shared handler state.
pub struct AppState<S> {
    pub store: Arc<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

/// Build the API router.
pub fn router<S>(state: AppState<S>) -> Router
where
    S: MaintenanceStore + Send + Sync + 'static,
{
    Router::new()
        .route("/outages", get(outages::<S>))
        .with_state(state)
}

/// `GET /outages` — the current week's events, ordered by province then day.
#[instrument(level = "info", skip_all)]
async fn outages<S>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<MaintenanceEvent>>, (StatusCode, Json<Value>)>
where
    S: MaintenanceStore + Send + Sync + 'static,
{
    let today = Local::now().date_naive();
    match state
        .store
        .current_week(week::week_number(today), today.year())
        .await
    {
        Ok(events) if events.is_empty() => Err(data_not_found(StatusCode::NOT_FOUND)),
        Ok(events) => Ok(Json(events)),
        Err(e) => {
            error!(error = %e, "Failed to load current-week events");
            Err(data_not_found(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

fn data_not_found(status: StatusCode) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "detail": "Data not found." })))
}
