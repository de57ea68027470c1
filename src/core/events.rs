use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::config::AppConfig;
use super::filter::normalize_extension;

/// Kind of change carried by a raw notification and by a classified event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Created, EventKind::Modified, EventKind::Deleted];

    /// Lower-case name used in the event table.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
        }
    }

    /// Case-insensitive parse of a persisted or user-supplied name.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unprocessed notification coming off the OS watch mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub path: PathBuf,
    pub kind: EventKind,
    pub is_directory: bool,
}

impl RawNotification {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            kind,
            is_directory,
        }
    }
}

/// One observed file-system change.
///
/// Events are never mutated in place: the builder methods consume `self`
/// and the store hands out fresh values when reading rows back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    id: Option<i64>,
    filename: String,
    file_path: PathBuf,
    extension: String,
    event_type: EventKind,
    timestamp: DateTime<Utc>,
    file_size: Option<u64>,
    is_directory: bool,
    user: String,
}

impl Event {
    /// Builds an event for `path`, deriving filename and normalized extension.
    pub fn new(path: impl Into<PathBuf>, event_type: EventKind, timestamp: DateTime<Utc>) -> Self {
        let file_path = path.into();
        let filename = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = file_path
            .extension()
            .map(|ext| normalize_extension(&ext.to_string_lossy()))
            .unwrap_or_default();

        Self {
            id: None,
            filename,
            file_path,
            extension,
            event_type,
            timestamp: truncate_to_seconds(timestamp),
            file_size: None,
            is_directory: false,
            user: String::new(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.file_size = size;
        self
    }

    pub fn with_directory(mut self, is_directory: bool) -> Self {
        self.is_directory = is_directory;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Rebuilds an event from its stored columns.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_row(
        id: i64,
        filename: String,
        file_path: PathBuf,
        extension: String,
        event_type: EventKind,
        timestamp: DateTime<Utc>,
        file_size: Option<u64>,
        is_directory: bool,
        user: String,
    ) -> Self {
        Self {
            id: Some(id),
            filename,
            file_path,
            extension,
            event_type,
            timestamp,
            file_size,
            is_directory,
            user,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn event_type(&self) -> EventKind {
        self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Extension as shown to people: `"(none)"` when the path has none.
    pub fn display_extension(&self) -> &str {
        if self.extension.is_empty() {
            "(none)"
        } else {
            &self.extension
        }
    }
}

/// Drops sub-second precision; events are recorded at second resolution.
pub fn truncate_to_seconds(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.timestamp(), 0).unwrap_or(timestamp)
}

/// Transient display buffer owned by the serial consumer.
///
/// Holds at most `retention_cap` entries, newest first. Persisted data is
/// never affected by eviction here.
#[derive(Debug, Clone)]
pub struct DisplayState {
    pub events: VecDeque<Event>,
    pub retention_cap: usize,
    /// Total number of events ever shown, including evicted ones.
    pub total_seen: u64,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::new(100)
    }
}

impl DisplayState {
    pub fn new(retention_cap: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(retention_cap),
            retention_cap,
            total_seen: 0,
        }
    }

    pub fn with_config(config: &AppConfig) -> Self {
        Self::new(config.display.retention_cap)
    }

    pub fn add_event(&mut self, event: Event) {
        self.events.push_front(event);
        self.total_seen += 1;

        while self.events.len() > self.retention_cap {
            self.events.pop_back();
        }
    }

    /// Adds a drained batch, preserving its production order.
    pub fn extend(&mut self, batch: impl IntoIterator<Item = Event>) {
        for event in batch {
            self.add_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Counts of (created, modified, deleted) among the retained entries.
    pub fn get_quick_stats(&self) -> (usize, usize, usize) {
        let mut created = 0;
        let mut modified = 0;
        let mut deleted = 0;

        for event in &self.events {
            match event.event_type() {
                EventKind::Created => created += 1,
                EventKind::Modified => modified += 1,
                EventKind::Deleted => deleted += 1,
            }
        }

        (created, modified, deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_event_derives_name_and_extension() {
        let event = Event::new("/tmp/watched/Report.TXT", EventKind::Created, at(1_700_000_000));

        assert_eq!(event.filename(), "Report.TXT");
        assert_eq!(event.extension(), ".txt");
        assert_eq!(event.file_path(), Path::new("/tmp/watched/Report.TXT"));
        assert!(event.id().is_none());
        assert!(event.file_size().is_none());
    }

    #[test]
    fn test_event_without_extension() {
        let event = Event::new("/tmp/watched/Makefile", EventKind::Modified, at(0));

        assert_eq!(event.extension(), "");
        assert_eq!(event.display_extension(), "(none)");
    }

    #[test]
    fn test_event_timestamp_has_second_resolution() {
        let precise = Utc.timestamp_opt(1_700_000_000, 987_000_000).unwrap();
        let event = Event::new("a.txt", EventKind::Created, precise);

        assert_eq!(event.timestamp(), at(1_700_000_000));
    }

    #[test]
    fn test_event_kind_parse() {
        assert_eq!(EventKind::parse("Created"), Some(EventKind::Created));
        assert_eq!(EventKind::parse(" deleted "), Some(EventKind::Deleted));
        assert_eq!(EventKind::parse("MODIFIED"), Some(EventKind::Modified));
        assert_eq!(EventKind::parse("renamed"), None);
    }

    #[test]
    fn test_display_state_retention_cap() {
        let mut state = DisplayState::new(3);

        for i in 0..5 {
            state.add_event(Event::new(format!("file{i}.rs"), EventKind::Created, at(i)));
        }

        assert_eq!(state.len(), 3);
        assert_eq!(state.total_seen, 5);
        // Newest first; the two oldest were evicted.
        let names: Vec<&str> = state.events.iter().map(|e| e.filename()).collect();
        assert_eq!(names, vec!["file4.rs", "file3.rs", "file2.rs"]);
    }

    #[test]
    fn test_display_state_quick_stats() {
        let mut state = DisplayState::default();
        state.add_event(Event::new("created.rs", EventKind::Created, at(1)));
        state.add_event(Event::new("modified.rs", EventKind::Modified, at(2)));
        state.add_event(Event::new("deleted.rs", EventKind::Deleted, at(3)));

        assert_eq!(state.get_quick_stats(), (1, 1, 1));
    }

    #[test]
    fn test_display_state_extend_keeps_batch_order() {
        let mut state = DisplayState::new(2);
        state.extend((0..4).map(|i| Event::new(format!("f{i}"), EventKind::Modified, at(i))));

        let names: Vec<&str> = state.events.iter().map(|e| e.filename()).collect();
        assert_eq!(names, vec!["f3", "f2"]);
        assert_eq!(state.total_seen, 4);
    }
}
