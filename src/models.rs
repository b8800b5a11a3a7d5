//! Data models for canonical maintenance events.
//!
//! This module defines the common event schema every provider normalizes
//! into:
//! - [`Company`]: the closed set of distributors we scrape
//! - [`MaintenanceEvent`]: one (day, province) group of scheduled interruptions
//! - [`TimeSectors`]: one interruption window and the zones it affects
//!
//! Events are ephemeral value objects: built fresh on every pipeline run,
//! never mutated afterwards, and handed to the store exactly once.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel substituted for `day` when the source date cannot be parsed.
pub const DATE_NOT_AVAILABLE: &str = "Date not available.";

/// Sentinel substituted for `time` when the source text does not contain the
/// expected pair of clock timestamps.
pub const TIME_NOT_AVAILABLE: &str = "Time data not available.";

/// One of the three electricity distributors.
///
/// A closed enum rather than an open registry: the set of providers is fixed
/// and each one has its own hand-written acquisition pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Company {
    Edeeste,
    Edesur,
    Edenorte,
}

impl Company {
    pub const ALL: [Company; 3] = [Company::Edeeste, Company::Edesur, Company::Edenorte];

    /// Stable name used in storage rows and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Company::Edeeste => "Edeeste",
            Company::Edesur => "Edesur",
            Company::Edenorte => "Edenorte",
        }
    }

    /// Inverse of [`Company::as_str`], for decoding storage rows.
    pub fn from_name(name: &str) -> Option<Company> {
        Company::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Company {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled interruption window within a (day, province) group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSectors {
    /// Textual time range, e.g. `"9:20 a.m. - 3:20 p.m."`, or
    /// [`TIME_NOT_AVAILABLE`].
    pub time: String,
    /// Ordered, trimmed sector/zone names. Never empty, may contain
    /// duplicates. Split on `','` is literal; a sector name containing a
    /// comma is a documented limitation of the source format.
    pub sectors: Vec<String>,
}

/// A canonical maintenance event: all interruption windows announced for one
/// province on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceEvent {
    pub company: Company,
    /// ISO week number (1-53) of the calendar week at extraction time.
    /// Stamped by the pipeline, never parsed from source data.
    pub week_number: i32,
    /// ISO `YYYY-MM-DD` date, or [`DATE_NOT_AVAILABLE`].
    pub day: String,
    /// Administrative region name exactly as published by the source.
    pub province: String,
    /// At least one entry; groups with no windows are dropped before emission.
    pub maintenance: Vec<TimeSectors>,
}
