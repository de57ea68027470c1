use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use filewatch_log::{
    delivery_queue, DirectoryMonitor, Event, EventKind, EventStore, ExtensionFilter, QueueConsumer, QueryFilters,
    WatchError, WatchState,
};

/// Drains the queue until `done` holds for everything collected so far, or the deadline passes.
fn collect_until(consumer: &mut QueueConsumer, timeout: Duration, done: impl Fn(&[Event]) -> bool) -> Vec<Event> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while Instant::now() < deadline {
        events.extend(consumer.drain_all());
        if done(&events) {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    events
}

fn created_named<'a>(events: &'a [Event], name: &str) -> Vec<&'a Event> {
    events
        .iter()
        .filter(|e| e.event_type() == EventKind::Created && e.filename() == name)
        .collect()
}

#[test]
fn test_recursive_watch_with_extension_filter() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::create_dir(temp_dir.path().join("sub")).expect("Failed to create subdirectory");

    let (producer, mut consumer) = delivery_queue(None);
    let mut monitor = DirectoryMonitor::new(producer, None);
    monitor.set_extension_filter(ExtensionFilter::parse(".txt"));
    monitor.start(temp_dir.path(), true).expect("Failed to start monitor");

    fs::write(temp_dir.path().join("sub").join("a.txt"), "hello").expect("Failed to write test file");
    let events = collect_until(&mut consumer, Duration::from_secs(5), |events| {
        !created_named(events, "a.txt").is_empty()
    });

    let created = created_named(&events, "a.txt");
    assert_eq!(created.len(), 1, "exactly one Created event for a.txt");
    assert_eq!(created[0].extension(), ".txt");
    assert!(!created[0].is_directory());

    fs::write(temp_dir.path().join("b.png"), "png").expect("Failed to write test file");
    let events = collect_until(&mut consumer, Duration::from_millis(700), |_| false);
    assert!(
        events.iter().all(|e| e.extension() == ".txt"),
        "only .txt events are admitted"
    );
    assert!(events.iter().all(|e| e.filename() != "b.png"));

    monitor.stop();
}

#[test]
fn test_admitted_events_are_persisted() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = EventStore::in_memory();

    let (producer, mut consumer) = delivery_queue(None);
    let mut monitor = DirectoryMonitor::new(producer, Some(store.clone()));
    monitor.start(temp_dir.path(), true).expect("Failed to start monitor");

    fs::write(temp_dir.path().join("notes.md"), "# notes").expect("Failed to write test file");
    let events = collect_until(&mut consumer, Duration::from_secs(5), |events| {
        !created_named(events, "notes.md").is_empty()
    });
    monitor.stop();

    let created = created_named(&events, "notes.md");
    assert_eq!(created.len(), 1);

    let id = created[0].id().expect("persisted events carry their id");
    let stored = store.get_by_id(id).expect("lookup succeeds").expect("row exists");
    assert_eq!(stored.filename(), "notes.md");
    assert_eq!(stored.extension(), ".md");

    let by_type = store.query(&QueryFilters::default().with_event_type(EventKind::Created));
    assert!(by_type.iter().any(|e| e.filename() == "notes.md"));
}

#[test]
fn test_deleted_file_has_no_size() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let doomed = temp_dir.path().join("doomed.log");
    fs::write(&doomed, "bye").expect("Failed to write test file");

    let (producer, mut consumer) = delivery_queue(None);
    let mut monitor = DirectoryMonitor::new(producer, None);
    monitor.start(temp_dir.path(), false).expect("Failed to start monitor");

    fs::remove_file(&doomed).expect("Failed to delete test file");
    let events = collect_until(&mut consumer, Duration::from_secs(5), |events| {
        events.iter().any(|e| e.event_type() == EventKind::Deleted)
    });
    monitor.stop();

    let deleted = events
        .iter()
        .find(|e| e.event_type() == EventKind::Deleted && e.filename() == "doomed.log")
        .expect("Should have received a Deleted event");
    assert!(deleted.file_size().is_none());
}

#[test]
fn test_non_recursive_ignores_subdirectories() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::create_dir(temp_dir.path().join("nested")).expect("Failed to create subdirectory");

    let (producer, mut consumer) = delivery_queue(None);
    let mut monitor = DirectoryMonitor::new(producer, None);
    monitor.start(temp_dir.path(), false).expect("Failed to start monitor");

    fs::write(temp_dir.path().join("nested").join("deep.txt"), "x").expect("Failed to write test file");
    fs::write(temp_dir.path().join("top.txt"), "x").expect("Failed to write test file");

    let mut events = collect_until(&mut consumer, Duration::from_secs(5), |events| {
        !created_named(events, "top.txt").is_empty()
    });
    // Give a late nested notification a chance to show up.
    events.extend(collect_until(&mut consumer, Duration::from_millis(300), |_| false));
    monitor.stop();

    assert_eq!(created_named(&events, "top.txt").len(), 1);
    assert!(created_named(&events, "deep.txt").is_empty());
}

#[test]
fn test_no_delivery_after_stop() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let (producer, mut consumer) = delivery_queue(None);
    let mut monitor = DirectoryMonitor::new(producer, None);
    monitor.start(temp_dir.path(), true).expect("Failed to start monitor");
    monitor.stop();
    monitor.stop();
    assert_eq!(monitor.state(), WatchState::Idle);

    consumer.drain_all();
    fs::write(temp_dir.path().join("late.txt"), "x").expect("Failed to write test file");
    let events = collect_until(&mut consumer, Duration::from_millis(500), |_| false);
    assert!(events.is_empty(), "no events after stop returns");
}

#[test]
fn test_restart_after_stop() {
    let first = TempDir::new().expect("Failed to create temp dir");
    let second = TempDir::new().expect("Failed to create temp dir");

    let (producer, mut consumer) = delivery_queue(None);
    let mut monitor = DirectoryMonitor::new(producer, None);
    monitor.start(first.path(), true).expect("Failed to start monitor");
    monitor.stop();

    let session = monitor.start(second.path(), true).expect("Failed to restart monitor");
    assert_eq!(session.root_path, fs::canonicalize(second.path()).unwrap());

    fs::write(second.path().join("again.txt"), "x").expect("Failed to write test file");
    let events = collect_until(&mut consumer, Duration::from_secs(5), |events| {
        !created_named(events, "again.txt").is_empty()
    });
    assert_eq!(created_named(&events, "again.txt").len(), 1);
}

#[test]
fn test_lost_watch_is_reported_once() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path().join("vanishing");
    fs::create_dir(&root).expect("Failed to create watch root");

    let (producer, _consumer) = delivery_queue(None);
    let mut monitor = DirectoryMonitor::new(producer, None);
    monitor.start(&root, true).expect("Failed to start monitor");

    fs::remove_dir_all(&root).expect("Failed to remove watch root");

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut error = None;
    while Instant::now() < deadline {
        error = monitor.take_error();
        if error.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    assert!(matches!(error, Some(WatchError::WatchLost { .. })));
    assert!(monitor.take_error().is_none(), "reported exactly once");
    assert_eq!(monitor.state(), WatchState::Idle);

    fs::create_dir(&root).expect("Failed to recreate watch root");
    assert!(monitor.start(&root, true).is_ok(), "caller may retry start");
}

#[test]
fn test_restart_after_unreported_loss_keeps_new_session() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path().join("gone");
    let other = temp_dir.path().join("other");
    fs::create_dir(&root).expect("Failed to create watch root");
    fs::create_dir(&other).expect("Failed to create second root");

    let (producer, _consumer) = delivery_queue(None);
    let mut monitor = DirectoryMonitor::new(producer, None);
    monitor.start(&root, true).expect("Failed to start monitor");

    fs::remove_dir_all(&root).expect("Failed to remove watch root");
    let deadline = Instant::now() + Duration::from_secs(5);
    while monitor.is_watching() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(monitor.state(), WatchState::Idle, "loss ends the session");

    // Restart without collecting the earlier loss.
    monitor.start(&other, true).expect("Failed to restart monitor");

    let (tx, rx) = std::sync::mpsc::channel();
    let worker = std::thread::spawn(move || {
        let error = monitor.take_error();
        let state = monitor.state();
        let _ = tx.send((error.is_none(), state));
        monitor
    });

    let (no_error, state) = rx
        .recv_timeout(Duration::from_secs(3))
        .expect("take_error returns promptly on a live session");
    assert!(no_error, "an earlier session's loss is not reported");
    assert_eq!(state, WatchState::Watching);

    let mut monitor = worker.join().expect("worker thread panicked");
    monitor.stop();
    assert_eq!(monitor.state(), WatchState::Idle);
}

#[test]
fn test_two_monitors_share_one_queue() {
    let left = TempDir::new().expect("Failed to create temp dir");
    let right = TempDir::new().expect("Failed to create temp dir");

    let (producer, mut consumer) = delivery_queue(None);
    let mut first = DirectoryMonitor::new(producer.clone(), None);
    let mut second = DirectoryMonitor::new(producer, None);
    first.start(left.path(), true).expect("Failed to start monitor");
    second.start(right.path(), true).expect("Failed to start monitor");

    fs::write(left.path().join("left.txt"), "l").expect("Failed to write test file");
    fs::write(right.path().join("right.txt"), "r").expect("Failed to write test file");

    let events = collect_until(&mut consumer, Duration::from_secs(5), |events| {
        !created_named(events, "left.txt").is_empty() && !created_named(events, "right.txt").is_empty()
    });

    assert_eq!(created_named(&events, "left.txt").len(), 1);
    assert_eq!(created_named(&events, "right.txt").len(), 1);
}
