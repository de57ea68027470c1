use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};

use super::events::{truncate_to_seconds, Event, EventKind, RawNotification};
use super::filter::{admit, classify, current_user, ExtensionFilter};
use super::queue::QueueProducer;
use crate::store::EventStore;

/// Extension filter shared between a monitor and its observation thread.
pub type SharedFilter = Arc<RwLock<ExtensionFilter>>;

pub fn shared_filter(filter: ExtensionFilter) -> SharedFilter {
    Arc::new(RwLock::new(filter))
}

/// Per-notification handling on the monitor thread.
///
/// Every admitted event is written to the store (when one is attached) and
/// pushed to the delivery queue. Neither side effect depends on the other
/// succeeding.
pub struct Pipeline {
    store: Option<EventStore>,
    producer: QueueProducer,
    filter: SharedFilter,
    user: String,
    last_stamp: Option<DateTime<Utc>>,
    debounce: Duration,
    last_seen: HashMap<(PathBuf, EventKind), Instant>,
}

impl Pipeline {
    pub fn new(store: Option<EventStore>, producer: QueueProducer, filter: SharedFilter) -> Self {
        Self {
            store,
            producer,
            filter,
            user: current_user(),
            last_stamp: None,
            debounce: Duration::ZERO,
            last_seen: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Drops repeats of the same path and kind arriving within `window`.
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    /// Handles one raw notification stamped with the current time.
    pub fn process(&mut self, raw: RawNotification) -> Option<Event> {
        self.process_at(raw, Utc::now())
    }

    /// Handles one raw notification captured at `capture_time`.
    ///
    /// Returns the delivered event, or `None` if it was filtered out.
    pub fn process_at(&mut self, raw: RawNotification, capture_time: DateTime<Utc>) -> Option<Event> {
        if self.is_bounce(&raw) {
            tracing::trace!(path = %raw.path.display(), kind = %raw.kind, "debounced");
            return None;
        }

        let stamp = self.next_stamp(capture_time);
        let event = classify(&raw, stamp, &self.user);

        let admitted = {
            let filter = self.filter.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            admit(&event, &filter)
        };
        if !admitted {
            tracing::debug!(path = %event.file_path().display(), kind = %event.event_type(), "not admitted");
            return None;
        }

        let event = match &self.store {
            Some(store) => match store.insert(&event) {
                Ok(id) => event.with_id(id),
                Err(err) => {
                    tracing::warn!(path = %event.file_path().display(), "event not persisted: {}", err);
                    event
                }
            },
            None => event,
        };

        self.producer.push(event.clone());
        Some(event)
    }

    /// Capture times never go backwards within one pipeline.
    fn next_stamp(&mut self, capture_time: DateTime<Utc>) -> DateTime<Utc> {
        let stamp = truncate_to_seconds(capture_time);
        let stamp = match self.last_stamp {
            Some(last) if last > stamp => last,
            _ => stamp,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn is_bounce(&mut self, raw: &RawNotification) -> bool {
        if self.debounce.is_zero() {
            return false;
        }

        let now = Instant::now();
        let key = (raw.path.clone(), raw.kind);
        if let Some(last) = self.last_seen.get(&key) {
            if now.duration_since(*last) < self.debounce {
                return true;
            }
        }

        let window = self.debounce;
        self.last_seen.retain(|_, seen| now.duration_since(*seen) < window);
        self.last_seen.insert(key, now);
        false
    }
}
