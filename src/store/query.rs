//! Filtered retrieval over the event table.
//!
//! Filters combine with AND and results always come back newest first,
//! ties broken by id. Option strings that are not recognized fall open to
//! "All" rather than matching nothing.

use std::fmt;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{schema, EventStore};
use crate::core::filter::normalize_extension;
use crate::core::{Event, EventKind};

/// Presentation sentinel meaning "no constraint".
pub const ALL_SENTINEL: &str = "All";

/// Label used for files without an extension.
pub const NO_EXTENSION_LABEL: &str = "(none)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EventTypeFilter {
    #[default]
    All,
    Only(EventKind),
}

impl EventTypeFilter {
    pub fn parse(value: &str) -> Self {
        match EventKind::parse(value) {
            Some(kind) => Self::Only(kind),
            None => {
                if !is_all(value) {
                    tracing::debug!(value, "unrecognized event type filter, using All");
                }
                Self::All
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtensionChoice {
    #[default]
    All,
    /// Normalized extension; empty selects files without one.
    Only(String),
}

impl ExtensionChoice {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if is_all(value) || value.is_empty() {
            Self::All
        } else if value.eq_ignore_ascii_case(NO_EXTENSION_LABEL) {
            Self::Only(String::new())
        } else {
            Self::Only(normalize_extension(value))
        }
    }
}

/// Time window relative to query execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateRange {
    #[default]
    All,
    /// Rolling 24 hours.
    Today,
    Last7Days,
    Last30Days,
}

impl DateRange {
    pub const OPTIONS: [DateRange; 4] = [
        DateRange::All,
        DateRange::Today,
        DateRange::Last7Days,
        DateRange::Last30Days,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DateRange::All => ALL_SENTINEL,
            DateRange::Today => "Today",
            DateRange::Last7Days => "Last 7 days",
            DateRange::Last30Days => "Last 30 days",
        }
    }

    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match Self::OPTIONS
            .into_iter()
            .find(|range| range.label().eq_ignore_ascii_case(value))
        {
            Some(range) => range,
            None => {
                tracing::debug!(value, "unrecognized date range, using All");
                Self::All
            }
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            DateRange::All => None,
            DateRange::Today => Some(Duration::hours(24)),
            DateRange::Last7Days => Some(Duration::days(7)),
            DateRange::Last30Days => Some(Duration::days(30)),
        }
    }

    /// Inclusive lower bound for a query run at `now`.
    pub fn lower_bound(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration().map(|window| now - window)
    }

    pub fn includes(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.lower_bound(now) {
            Some(lower) => timestamp >= lower,
            None => true,
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn is_all(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(ALL_SENTINEL)
}

/// Filter set for one retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryFilters {
    pub event_type: EventTypeFilter,
    pub extension: ExtensionChoice,
    pub date_range: DateRange,
}

impl QueryFilters {
    /// Builds filters from the three option strings a front end offers.
    pub fn from_options(event_type: &str, extension: &str, date_range: &str) -> Self {
        Self {
            event_type: EventTypeFilter::parse(event_type),
            extension: ExtensionChoice::parse(extension),
            date_range: DateRange::parse(date_range),
        }
    }

    pub fn with_event_type(mut self, kind: EventKind) -> Self {
        self.event_type = EventTypeFilter::Only(kind);
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = ExtensionChoice::parse(extension);
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = range;
        self
    }

    /// Whether `event` satisfies every filter at time `now`.
    pub fn matches(&self, event: &Event, now: DateTime<Utc>) -> bool {
        let type_ok = match self.event_type {
            EventTypeFilter::All => true,
            EventTypeFilter::Only(kind) => event.event_type() == kind,
        };
        let ext_ok = match &self.extension {
            ExtensionChoice::All => true,
            ExtensionChoice::Only(ext) => event.extension() == ext,
        };
        type_ok && ext_ok && self.date_range.includes(event.timestamp(), now)
    }

    fn to_sql(&self, now: DateTime<Utc>) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut sql = format!("SELECT {} FROM events WHERE 1=1", schema::EVENT_COLUMNS);
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let EventTypeFilter::Only(kind) = self.event_type {
            params.push(Box::new(kind.as_str()));
            sql.push_str(&format!(" AND event = ?{}", params.len()));
        }
        if let ExtensionChoice::Only(ext) = &self.extension {
            params.push(Box::new(ext.clone()));
            sql.push_str(&format!(" AND file_extension = ?{}", params.len()));
        }
        if let Some(lower) = self.date_range.lower_bound(now) {
            params.push(Box::new(lower.timestamp()));
            sql.push_str(&format!(" AND event_timestamp >= ?{}", params.len()));
        }

        sql.push_str(" ORDER BY event_timestamp DESC, id DESC");
        (sql, params)
    }
}

impl EventStore {
    /// Runs `filters` against the store at the current time.
    pub fn query(&self, filters: &QueryFilters) -> Vec<Event> {
        self.query_at(filters, Utc::now())
    }

    /// Runs `filters` with date windows anchored at `now`.
    pub fn query_at(&self, filters: &QueryFilters, now: DateTime<Utc>) -> Vec<Event> {
        let (sql, params) = filters.to_sql(now);
        let params: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        match self.select_events(&sql, &params) {
            Ok(events) => {
                tracing::debug!(?filters, count = events.len(), "query executed");
                events
            }
            Err(err) => {
                tracing::warn!("query failed: {}", err);
                Vec::new()
            }
        }
    }

    /// Distinct non-empty extensions present in the table, sorted.
    pub fn distinct_extensions(&self) -> Vec<String> {
        self.count_by_extension()
            .into_iter()
            .map(|(ext, _)| ext)
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Extension choices for a front end: the `All` sentinel, then observed values.
    pub fn extension_choices(&self) -> Vec<String> {
        std::iter::once(ALL_SENTINEL.to_string())
            .chain(self.distinct_extensions())
            .collect()
    }
}
