use std::fmt;
use std::fs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::events::{Event, EventKind, RawNotification};

/// Extension allow-list for one watch session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtensionFilter {
    /// Match-all sentinel.
    #[default]
    All,
    /// A single normalized extension such as `.txt`.
    Only(String),
}

impl ExtensionFilter {
    /// Parses user input. Empty, `All`, `None` and `*` all mean match-all.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty()
            || trimmed == "*"
            || trimmed.eq_ignore_ascii_case("all")
            || trimmed.eq_ignore_ascii_case("none")
        {
            Self::All
        } else {
            Self::Only(normalize_extension(trimmed))
        }
    }

    pub fn from_option(value: Option<&str>) -> Self {
        value.map(Self::parse).unwrap_or_default()
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl fmt::Display for ExtensionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Only(ext) => f.write_str(ext),
        }
    }
}

/// Lower-cases an extension and makes sure it carries a leading dot.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim();
    if ext.is_empty() {
        return String::new();
    }
    let lower = ext.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

/// Turns a raw notification into an [`Event`] stamped with `capture_time`.
///
/// Size is read for files that still exist; a failed stat leaves it absent.
pub fn classify(raw: &RawNotification, capture_time: DateTime<Utc>, user: &str) -> Event {
    let size = if raw.kind == EventKind::Deleted || raw.is_directory {
        None
    } else {
        match fs::metadata(&raw.path) {
            Ok(meta) if meta.is_file() => Some(meta.len()),
            Ok(_) => None,
            Err(err) => {
                tracing::trace!(path = %raw.path.display(), "size unavailable: {}", err);
                None
            }
        }
    };

    Event::new(raw.path.clone(), raw.kind, capture_time)
        .with_size(size)
        .with_directory(raw.is_directory)
        .with_user(user)
}

/// Admission decision for a classified event.
pub fn admit(event: &Event, filter: &ExtensionFilter) -> bool {
    match filter {
        ExtensionFilter::All => true,
        ExtensionFilter::Only(ext) => event.extension().eq_ignore_ascii_case(ext.trim()),
    }
}

/// Best-effort name of the observing user.
pub fn current_user() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}
