//! Batched storage example
//!
//! Records are buffered and handed to a store in batches, either when the
//! batch fills or when the save interval passes.
//!
//! Run with: cargo run --example database_sink

use rust_log_dispatcher::prelude::*;
use rust_log_dispatcher::sinks::{DatabaseSinkConfig, JsonLinesStore};
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== Rust Log Dispatcher - Database Sink Example ===\n");

    let config = DatabaseSinkConfig {
        save_threshold: 25,
        save_interval: Some(Duration::from_millis(200)),
        max_age: Some(Duration::from_secs(24 * 3600)),
        ..Default::default()
    };

    let memory = MemoryStore::new();
    let dispatcher = Dispatcher::builder()
        .sink(
            DatabaseSink::with_config(memory.clone(), config.clone())?.with_name("memory"),
            Severity::Info,
            MessageFormatter,
        )
        .sink(
            DatabaseSink::with_config(JsonLinesStore::open("records.jsonl")?, config)?
                .with_name("jsonl"),
            Severity::Warn,
            JsonFormatter::new(),
        )
        .build()?;

    for i in 0..60 {
        if i % 10 == 0 {
            dispatcher.warn(format!("Checkpoint {}", i));
        } else {
            dispatcher.info(format!("Row {}", i));
        }
    }

    println!("Before flush: {} records in {} batches", memory.len(), memory.batch_count());
    dispatcher.flush()?;
    println!("After flush:  {} records in {} batches", memory.len(), memory.batch_count());

    println!("\nWarnings were also appended to records.jsonl");
    println!("\n=== Example completed successfully! ===");
    Ok(())
}
