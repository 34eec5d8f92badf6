//! Basic dispatcher usage example
//!
//! Demonstrates a console sink, per-sink thresholds and the logging macros.
//!
//! Run with: cargo run --example basic_usage

use rust_log_dispatcher::prelude::*;
use rust_log_dispatcher::{debug, error, info, verbose, warn};

fn main() -> Result<()> {
    println!("=== Rust Log Dispatcher - Basic Usage Example ===\n");

    let dispatcher = Dispatcher::new()?;
    let console = dispatcher.register_sink(
        ConsoleSink::stdout(),
        Severity::Verbose,
        TextFormatter::new().with_location(true),
    )?;

    println!("1. Logging at different severities:");
    verbose!(dispatcher, "This is a verbose message");
    debug!(dispatcher, "This is a debug message");
    info!(dispatcher, "This is an info message");
    warn!(dispatcher, "This is a warning message");
    error!(dispatcher, "This is an error message");
    dispatcher.flush()?;

    println!("\n2. Raising the console threshold to INFO:");
    dispatcher.set_min_severity(console, Severity::Info)?;
    verbose!(dispatcher, "Verbose message (hidden)");
    debug!(dispatcher, "Debug message (hidden)");
    info!(dispatcher, "Info message (visible)");
    warn!(dispatcher, "Warning message (visible)");
    dispatcher.flush()?;

    println!("\n3. Structured fields:");
    dispatcher.log_with_fields(
        Severity::Info,
        "User logged in",
        EventFields::new()
            .with_field("user_id", 42)
            .with_field("method", "password"),
    );
    dispatcher.flush()?;

    let metrics = dispatcher.metrics();
    println!(
        "\nDelivered: {}, filtered: {}, dropped: {}",
        metrics.delivered(),
        metrics.filtered(),
        metrics.dropped_count()
    );

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
