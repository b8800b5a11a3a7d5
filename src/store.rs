//! Storage collaborator for canonical events.
//!
//! The pipeline hands each successful provider run to a
//! [`MaintenanceStore`] and never looks at the rows again. The contract is
//! deliberately narrow:
//!
//! - [`MaintenanceStore::replace_current_week`]: delete that company's rows
//!   for the ISO week, insert the fresh set, one unit of work
//! - [`MaintenanceStore::current_week`]: what the query endpoint serves
//!
//! [`PgStore`] is the real backend; [`MemoryStore`] is the deterministic
//! stand-in the orchestrator tests run against.

use crate::error::StoreError;
use crate::models::{Company, MaintenanceEvent, TimeSectors};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::future::Future;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Capability trait for event persistence.
pub trait MaintenanceStore {
    /// Replace one company's rows for one ISO week with a fresh event set.
    ///
    /// Deleting from a table that does not exist yet is tolerated as
    /// "nothing to delete", not an error.
    fn replace_current_week(
        &self,
        company: Company,
        week_number: i32,
        events: &[MaintenanceEvent],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Events of the given ISO week whose `day` mentions the given year,
    /// ordered by province then day.
    ///
    /// The year filter is what keeps date-sentinel rows out of API
    /// responses.
    fn current_week(
        &self,
        week_number: i32,
        year: i32,
    ) -> impl Future<Output = Result<Vec<MaintenanceEvent>, StoreError>> + Send;
}

const CREATE_MAINTENANCE_EVENT: &str = "\
CREATE TABLE IF NOT EXISTS maintenance_event (
    id BIGSERIAL PRIMARY KEY,
    week_number INTEGER NOT NULL,
    company TEXT NOT NULL,
    day TEXT NOT NULL,
    province TEXT NOT NULL
)";

const CREATE_TIME_SECTORS: &str = "\
CREATE TABLE IF NOT EXISTS time_sectors (
    id BIGSERIAL PRIMARY KEY,
    maintenance_event_id BIGINT NOT NULL REFERENCES maintenance_event(id) ON DELETE CASCADE,
    \"time\" TEXT NOT NULL,
    sectors JSONB NOT NULL
)";

/// PostgreSQL-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database behind `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Create the schema if it is not there yet. Safe to run on every boot.
    #[instrument(level = "info", skip_all)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_MAINTENANCE_EVENT)
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_TIME_SECTORS).execute(&self.pool).await?;
        info!("Database schema ready");
        Ok(())
    }
}

impl MaintenanceStore for PgStore {
    #[instrument(level = "info", skip_all, fields(%company, week_number, count = events.len()))]
    async fn replace_current_week(
        &self,
        company: Company,
        week_number: i32,
        events: &[MaintenanceEvent],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let table: Option<String> =
            sqlx::query_scalar("SELECT to_regclass('public.maintenance_event')::text")
                .fetch_one(&mut *tx)
                .await?;
        if table.is_some() {
            let deleted =
                sqlx::query("DELETE FROM maintenance_event WHERE week_number = $1 AND company = $2")
                    .bind(week_number)
                    .bind(company.as_str())
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            debug!(deleted, "Cleared previous rows for the week");
        } else {
            warn!("Skipping deletion; table does not exist yet");
        }

        for event in events {
            let event_id: i64 = sqlx::query_scalar(
                "INSERT INTO maintenance_event (week_number, company, day, province) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(event.week_number)
            .bind(event.company.as_str())
            .bind(&event.day)
            .bind(&event.province)
            .fetch_one(&mut *tx)
            .await?;

            for window in &event.maintenance {
                sqlx::query(
                    "INSERT INTO time_sectors (maintenance_event_id, \"time\", sectors) \
                     VALUES ($1, $2, $3)",
                )
                .bind(event_id)
                .bind(&window.time)
                .bind(serde_json::json!(window.sectors))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        info!("Committed weekly events");
        Ok(())
    }

    async fn current_week(
        &self,
        week_number: i32,
        year: i32,
    ) -> Result<Vec<MaintenanceEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, week_number, company, day, province FROM maintenance_event \
             WHERE week_number = $1 AND day LIKE $2 ORDER BY province, day",
        )
        .bind(week_number)
        .bind(format!("%{year}%"))
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let company_name: String = row.get("company");
            let Some(company) = Company::from_name(&company_name) else {
                warn!(%company_name, "Skipping row with unknown company");
                continue;
            };

            let windows = sqlx::query(
                "SELECT \"time\", sectors FROM time_sectors \
                 WHERE maintenance_event_id = $1 ORDER BY id",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

            let maintenance = windows
                .into_iter()
                .map(|w| TimeSectors {
                    time: w.get("time"),
                    sectors: serde_json::from_value(w.get("sectors")).unwrap_or_default(),
                })
                .collect();

            events.push(MaintenanceEvent {
                company,
                week_number: row.get("week_number"),
                day: row.get("day"),
                province: row.get("province"),
                maintenance,
            });
        }

        Ok(events)
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    events: Mutex<Vec<MaintenanceEvent>>,
}

impl MemoryStore {
    /// Snapshot of everything currently stored.
    pub fn all(&self) -> Vec<MaintenanceEvent> {
        self.events.lock().expect("store lock poisoned").clone()
    }
}

impl MaintenanceStore for MemoryStore {
    async fn replace_current_week(
        &self,
        company: Company,
        week_number: i32,
        events: &[MaintenanceEvent],
    ) -> Result<(), StoreError> {
        let mut stored = self.events.lock().expect("store lock poisoned");
        stored.retain(|e| !(e.company == company && e.week_number == week_number));
        stored.extend(events.iter().cloned());
        Ok(())
    }

    async fn current_week(
        &self,
        week_number: i32,
        year: i32,
    ) -> Result<Vec<MaintenanceEvent>, StoreError> {
        let year_token = year.to_string();
        let mut events: Vec<MaintenanceEvent> = self
            .events
            .lock()
            .expect("store lock poisoned")
            .iter()
            .filter(|e| e.week_number == week_number && e.day.contains(&year_token))
            .cloned()
            .collect();
        events.sort_by(|a, b| (&a.province, &a.day).cmp(&(&b.province, &b.day)));
        Ok(events)
    }
}
