//! Core functionality module
//!
//! Contains directory watching, classification, admission and the hand-off
//! to the serial consumer

pub mod events;
pub mod filter;
pub mod pipeline;
pub mod queue;
pub mod watcher;

// Re-export main types
pub use events::{DisplayState, Event, EventKind, RawNotification};
pub use filter::{admit, classify, current_user, normalize_extension, ExtensionFilter};
pub use pipeline::{shared_filter, Pipeline, SharedFilter};
pub use queue::{delivery_queue, QueueConsumer, QueueProducer};
pub use watcher::{translate, DirectoryMonitor, WatchSession, WatchState};
