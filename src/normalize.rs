//! Normalization of tabular extraction output into canonical events.
//!
//! Two of the three providers funnel their documents through the AI
//! extraction adapter, which answers with delimited text in a fixed
//! four-column shape:
//!
//! ```text
//! province,day,time,sectors
//! Santo Domingo,lunes 15 de septiembre,9:20 a.m. - 3:20 p.m.,"Boreal, La Ureña"
//! ```
//!
//! This module parses that body and groups it into [`MaintenanceEvent`]s.
//!
//! # Failure policy
//!
//! A problem with the *whole* body — missing header, wrong column count — is
//! fatal for the provider's run and surfaces as [`ScrapeError::Extraction`].
//! A single unparseable *date* degrades to the [`DATE_NOT_AVAILABLE`]
//! sentinel and the run continues.
//!
//! # Ordering
//!
//! Output order is grouping order, not input row order: distinct `day`
//! values in first-seen order, then distinct `province` values in first-seen
//! order within each day. Windows within a group keep row order.

use crate::error::ScrapeError;
use crate::models::{Company, MaintenanceEvent, TimeSectors, DATE_NOT_AVAILABLE};
use crate::week;
use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use tracing::{debug, warn};

/// One data row of the four-column tabular body.
struct Record {
    province: String,
    day: String,
    time: String,
    sectors: String,
}

/// Parse a tabular body into grouped canonical events.
///
/// # Arguments
///
/// * `company` - Stamped onto every event
/// * `body` - The delimited text returned by the extraction adapter
/// * `today` - Reference date; supplies the ISO week number and the year
///   appended to the sources' year-less dates
pub fn tabular_to_events(
    company: Company,
    body: &str,
    today: NaiveDate,
) -> Result<Vec<MaintenanceEvent>, ScrapeError> {
    let records = parse_records(body)?;
    let week_number = week::week_number(today);

    let mut events = Vec::new();
    let days: Vec<&str> = records.iter().map(|r| r.day.as_str()).unique().collect();
    for day in days {
        let provinces: Vec<&str> = records
            .iter()
            .filter(|r| r.day == day)
            .map(|r| r.province.as_str())
            .unique()
            .collect();
        for province in provinces {
            let mut maintenance = Vec::new();
            for record in records
                .iter()
                .filter(|r| r.day == day && r.province == province)
            {
                let sectors: Vec<String> = record
                    .sectors
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                if sectors.is_empty() {
                    warn!(%province, %day, "Dropping window with no sectors");
                    continue;
                }
                maintenance.push(TimeSectors {
                    time: record.time.clone(),
                    sectors,
                });
            }
            if maintenance.is_empty() {
                continue;
            }
            events.push(MaintenanceEvent {
                company,
                week_number,
                day: resolve_day(day, today),
                province: province.to_string(),
                maintenance,
            });
        }
    }

    debug!(count = events.len(), %company, "Normalized tabular body");
    Ok(events)
}

/// Resolve a raw `day` cell to an ISO date string.
///
/// An all-digit value is a spreadsheet serial (days since 1899-12-30);
/// anything else is tried as a Spanish long-form date with the current year
/// appended. Either path falls back to the [`DATE_NOT_AVAILABLE`] sentinel
/// instead of failing the run.
fn resolve_day(raw: &str, today: NaiveDate) -> String {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return match trimmed.parse::<i64>().ok().and_then(week::from_serial) {
            Some(date) => date.to_string(),
            None => DATE_NOT_AVAILABLE.to_string(),
        };
    }
    match week::parse_spanish_date(&format!("{trimmed}, {}", today.year())) {
        Some(date) => date.to_string(),
        None => DATE_NOT_AVAILABLE.to_string(),
    }
}

/// Parse the body into records, validating the header and column count.
fn parse_records(body: &str) -> Result<Vec<Record>, ScrapeError> {
    let table = strip_code_fences(body);
    let mut rows = parse_rows(&table);
    if rows.is_empty() {
        return Err(ScrapeError::Extraction(
            "tabular body contains no rows".to_string(),
        ));
    }

    let header: Vec<String> = rows
        .remove(0)
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    if header != ["province", "day", "time", "sectors"] {
        return Err(ScrapeError::Extraction(format!(
            "unexpected header row: {header:?}"
        )));
    }

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match <[String; 4]>::try_from(row) {
            Ok([province, day, time, sectors]) => Ok(Record {
                province,
                day,
                time,
                sectors,
            }),
            Err(row) => Err(ScrapeError::Extraction(format!(
                "row {} has {} columns, expected 4",
                i + 2,
                row.len()
            ))),
        })
        .collect()
}

/// Drop markdown code-fence lines the model sometimes wraps its answer in.
fn strip_code_fences(body: &str) -> String {
    body.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Minimal comma-delimited parser: double-quoted fields, doubled-quote
/// escapes, CRLF tolerant. Blank lines are skipped.
fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => row.push(std::mem::take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                if !(row.len() == 1 && row[0].trim().is_empty()) {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    // flush a trailing row without a final newline
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        if !(row.len() == 1 && row[0].trim().is_empty()) {
            rows.push(row);
        }
    }

    rows
}
