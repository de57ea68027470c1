//! Hand-off between the monitor thread and the single serial consumer.
//!
//! Producers push without waiting on the consumer. The queue is unbounded
//! unless a capacity is given, in which case the oldest queued event is
//! dropped to make room and the drop is counted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use super::events::Event;

#[derive(Debug)]
struct Shared {
    events: Mutex<VecDeque<Event>>,
    capacity: Option<usize>,
    dropped: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Creates a connected producer/consumer pair.
///
/// `capacity` of `None` means unbounded.
pub fn delivery_queue(capacity: Option<usize>) -> (QueueProducer, QueueConsumer) {
    let shared = Arc::new(Shared {
        events: Mutex::new(VecDeque::new()),
        capacity: capacity.map(|c| c.max(1)),
        dropped: AtomicU64::new(0),
    });

    (
        QueueProducer { shared: shared.clone() },
        QueueConsumer { shared },
    )
}

/// Producer side. Cheap to clone; one per monitor thread.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    shared: Arc<Shared>,
}

impl QueueProducer {
    /// Enqueues `event`. Never blocks on the consumer.
    pub fn push(&self, event: Event) {
        let mut events = self.shared.lock();
        if let Some(capacity) = self.shared.capacity {
            while events.len() >= capacity {
                events.pop_front();
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        events.push_back(event);
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side. Not `Clone`: there is exactly one drainer per queue.
#[derive(Debug)]
pub struct QueueConsumer {
    shared: Arc<Shared>,
}

impl QueueConsumer {
    /// Removes and returns everything queued since the last drain, oldest first.
    pub fn drain_all(&mut self) -> Vec<Event> {
        let mut events = self.shared.lock();
        events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events discarded by the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}
