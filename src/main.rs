use clap::Parser;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use filewatch_log::{
    cli::{Cli, Command, OutputFormat, QueryArgs, WatchArgs},
    config::AppConfig,
    export::{format_timestamp, send_report, validate_email, CsvExporter, DisplayRow, ReportMailer},
    delivery_queue, DirectoryMonitor, DisplayState, Event, EventKind, EventStore, QueryFilters,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    cli.setup_logging();

    let config = cli.load_config()?;
    if let Err(err) = config.validate() {
        eprintln!("Invalid configuration: {}", err);
        std::process::exit(1);
    }

    let store = EventStore::open(&config.store);
    tracing::debug!(db = %store.path().display(), "event store opened");

    match &cli.command {
        Command::Watch(args) => run_watch_mode(args, &config, store)?,
        Command::Query(args) => run_query(args, &store)?,
        Command::Extensions => {
            for choice in store.extension_choices() {
                println!("{}", choice);
            }
        }
        Command::Stats => print_stats(&store),
        Command::Delete { id } => {
            if store.delete_by_id(*id) {
                println!("Deleted event {}", id);
            } else {
                eprintln!("No event with id {}", id);
                std::process::exit(1);
            }
        }
        Command::Reset { yes } => {
            if !yes {
                eprintln!("Refusing to reset the event log without --yes");
                std::process::exit(1);
            }
            if !store.reset() {
                bail!("Failed to reset the event log at {}", store.path().display());
            }
            println!("Event log cleared");
        }
        Command::Email { recipient, file } => run_email(recipient, file)?,
    }

    Ok(())
}

fn run_watch_mode(args: &WatchArgs, config: &AppConfig, store: EventStore) -> Result<()> {
    let (producer, mut consumer) = delivery_queue(config.queue.capacity);
    let mut display_state = DisplayState::with_config(config);

    let mut monitors = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let mut monitor = DirectoryMonitor::with_config(config, producer.clone(), Some(store.clone()));
        let session = monitor
            .start(path, config.watcher.recursive)
            .with_context(|| format!("Failed to watch {}", path.display()))?;

        if args.output == OutputFormat::Text {
            println!("Watching: {}", session.root_path.display());
        }
        monitors.push(monitor);
    }
    drop(producer);

    let roots: Vec<PathBuf> = monitors
        .iter()
        .filter_map(|m| m.session().map(|s| s.root_path))
        .collect();

    if args.output == OutputFormat::Text {
        println!("Press Ctrl+C to quit");
        println!("---");
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(config.watcher.poll_interval());

        let batch = consumer.drain_all();
        for event in &batch {
            let root = roots.iter().find(|root| event.file_path().starts_with(root));
            match args.output {
                OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
                OutputFormat::Text => print_text_event(event, root.map(PathBuf::as_path), args.no_color),
                OutputFormat::Compact => print_compact_event(event),
            }
        }
        display_state.extend(batch);

        for monitor in &mut monitors {
            if let Some(err) = monitor.take_error() {
                eprintln!("Error: {}", err);
            }
        }

        if monitors.iter().all(|m| !m.is_watching()) {
            tracing::warn!("no directory is being watched any more");
            break;
        }
    }

    for monitor in &mut monitors {
        monitor.stop();
    }

    // Events admitted between the last drain and the stop.
    display_state.extend(consumer.drain_all());

    let (created, modified, deleted) = display_state.get_quick_stats();
    let seen = display_state.total_seen;
    tracing::info!(
        seen,
        created,
        modified,
        deleted,
        dropped = consumer.dropped(),
        "watch finished"
    );

    Ok(())
}

fn run_query(args: &QueryArgs, store: &EventStore) -> Result<()> {
    let filters = QueryFilters::from_options(&args.event_type, &args.ext, &args.range);
    let events = store.query(&filters);

    if let Some(path) = &args.export {
        let rows = if args.full {
            CsvExporter::export_full(path, &events)?
        } else {
            CsvExporter::export_rows(path, &events, None)?
        };
        println!("Exported {} events to {}", rows, path.display());
        return Ok(());
    }

    if events.is_empty() {
        println!("No events found");
        return Ok(());
    }

    for event in &events {
        let row = DisplayRow::from_event(event, None);
        println!(
            "{:>6}  {}  {:<8}  {:<8}  {}",
            event.id().unwrap_or_default(),
            row.timestamp,
            row.event,
            row.extension,
            row.path
        );
    }

    Ok(())
}

fn print_stats(store: &EventStore) {
    println!("Total events: {}", store.count_all());

    println!();
    println!("By event type:");
    for (kind, count) in store.count_by_event_type() {
        println!("  {:<10} {}", kind, count);
    }

    println!();
    println!("By extension:");
    for (ext, count) in store.count_by_extension() {
        let label = if ext.is_empty() { "(none)" } else { ext.as_str() };
        println!("  {:<10} {}", label, count);
    }
}

/// Stand-in transport used until a real mail backend is configured.
struct UnconfiguredMailer;

impl ReportMailer for UnconfiguredMailer {
    fn send(&self, recipient: &str, attachment: &Path) -> bool {
        tracing::warn!(recipient, attachment = %attachment.display(), "no mail transport configured");
        false
    }
}

fn run_email(recipient: &str, file: &Path) -> Result<()> {
    if !validate_email(recipient) {
        bail!("Invalid email address: {}", recipient);
    }

    send_report(&UnconfiguredMailer, recipient, file)
        .with_context(|| format!("Could not send {} to {}", file.display(), recipient))?;
    Ok(())
}

fn print_text_event(event: &Event, root: Option<&Path>, no_color: bool) {
    let time_str = format_timestamp(event.timestamp());
    let path = root
        .and_then(|root| event.file_path().strip_prefix(root).ok())
        .unwrap_or_else(|| event.file_path());

    let event_type = match event.event_type() {
        EventKind::Created => "CREATED",
        EventKind::Modified => "MODIFIED",
        EventKind::Deleted => "DELETED",
    };

    let size = event
        .file_size()
        .map(|s| format!(" ({} bytes)", s))
        .unwrap_or_default();

    if no_color {
        println!("[{}] {} {}{}", time_str, event_type, path.display(), size);
    } else {
        let color = match event.event_type() {
            EventKind::Created => "\x1b[32m",  // Green
            EventKind::Modified => "\x1b[33m", // Yellow
            EventKind::Deleted => "\x1b[31m",  // Red
        };
        println!("[{}] {}{}\x1b[0m {}{}", time_str, color, event_type, path.display(), size);
    }
}

fn print_compact_event(event: &Event) {
    let event_type = match event.event_type() {
        EventKind::Created => "C",
        EventKind::Modified => "M",
        EventKind::Deleted => "D",
    };

    println!("{} {}", event_type, event.file_path().display());
}
