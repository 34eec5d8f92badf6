//! File logging example
//!
//! Demonstrates a console sink and a rotating file sink with different
//! thresholds and formatters.
//!
//! Run with: cargo run --example file_logging

use rust_log_dispatcher::prelude::*;
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== Rust Log Dispatcher - File Logging Example ===\n");

    let policy = RotationPolicy::new()
        .with_max_file_size(4 * 1024)
        .with_max_age(Some(Duration::from_secs(3600)))
        .with_max_archived_files(3)
        .with_compression(true);
    let file = FileSink::with_policy("logs", "application", policy)?;

    let dispatcher = Dispatcher::builder()
        .sink(ConsoleSink::new(), Severity::Warn, TextFormatter::new())
        .sink(file, Severity::Debug, JsonFormatter::new())
        .build()?;

    println!("1. Console shows WARN and above, the file gets DEBUG and above:");
    dispatcher.info("Application started");
    dispatcher.debug("Loading configuration...");
    dispatcher.warn("Using default settings for some options");
    dispatcher.error("Failed to load optional plugin");

    println!("\n2. Writing enough to trigger rotation:");
    for i in 1..=200 {
        dispatcher.info(format!("Processing item {}/200", i));
    }
    dispatcher.flush()?;

    println!("\nLogs written to logs/application.log (archives compressed alongside)");
    println!("\n=== Example completed successfully! ===");
    Ok(())
}
