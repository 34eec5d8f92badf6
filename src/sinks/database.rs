//! Batching sink for storage backends
//!
//! [`DatabaseSink`] buffers records and hands them to a [`LogStore`] in
//! batches, either when enough have accumulated or when the oldest pending
//! record has waited long enough. It also drives retention by asking the
//! store to delete records past their maximum age.

use crate::core::{LogError, LogEvent, LogSink, Result, Severity};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One persisted log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub context: i32,
    pub text: String,
}

impl LogRecord {
    pub fn from_event(event: &LogEvent, text: &str) -> Self {
        Self {
            timestamp: *event.timestamp(),
            severity: event.severity(),
            context: event.context(),
            text: text.to_string(),
        }
    }
}

/// A storage backend for [`DatabaseSink`]
///
/// Called only from the owning sink's worker thread.
pub trait LogStore: Send {
    /// Durably store a batch, oldest first
    fn persist(&mut self, batch: &[LogRecord]) -> Result<()>;

    /// Remove records older than `cutoff`, returning how many went away
    fn delete_older_than(&mut self, _cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Batching and retention settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSinkConfig {
    /// Save once this many records are pending
    pub save_threshold: usize,
    /// Save once the oldest pending record has waited this long
    pub save_interval: Option<Duration>,
    /// Records older than this are deleted; `None` keeps everything
    pub max_age: Option<Duration>,
    pub delete_interval: Option<Duration>,
    pub delete_on_every_save: bool,
}

impl Default for DatabaseSinkConfig {
    fn default() -> Self {
        Self {
            save_threshold: 500,
            save_interval: Some(Duration::from_secs(60)),
            max_age: Some(Duration::from_secs(7 * 24 * 60 * 60)),
            delete_interval: Some(Duration::from_secs(5 * 60)),
            delete_on_every_save: false,
        }
    }
}

impl DatabaseSinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.save_threshold == 0 {
            return Err(LogError::config("DatabaseSink", "save_threshold must be at least 1"));
        }
        for (field, value) in [
            ("save_interval", self.save_interval),
            ("max_age", self.max_age),
            ("delete_interval", self.delete_interval),
        ] {
            if value == Some(Duration::ZERO) {
                return Err(LogError::config(
                    "DatabaseSink",
                    format!("{} must be non-zero", field),
                ));
            }
        }
        Ok(())
    }
}

/// # Example
///
/// ```
/// use rust_log_dispatcher::prelude::*;
/// use rust_log_dispatcher::sinks::{DatabaseSink, DatabaseSinkConfig, MemoryStore};
///
/// let store = MemoryStore::new();
/// let config = DatabaseSinkConfig { save_threshold: 10, ..Default::default() };
/// let sink = DatabaseSink::with_config(store.clone(), config).unwrap();
///
/// let dispatcher = Dispatcher::new().unwrap();
/// dispatcher.register_sink(sink, Severity::Info, MessageFormatter).unwrap();
/// dispatcher.info("stored");
/// dispatcher.flush().unwrap();
///
/// assert_eq!(store.len(), 1);
/// ```
pub struct DatabaseSink<S: LogStore> {
    name: String,
    store: S,
    config: DatabaseSinkConfig,
    pending: Vec<LogRecord>,
    first_pending_at: Option<Instant>,
    last_delete: Instant,
}

impl<S: LogStore> DatabaseSink<S> {
    pub fn new(store: S) -> Self {
        Self {
            name: "database".to_string(),
            store,
            config: DatabaseSinkConfig::default(),
            pending: Vec::new(),
            first_pending_at: None,
            last_delete: Instant::now(),
        }
    }

    pub fn with_config(store: S, config: DatabaseSinkConfig) -> Result<Self> {
        config.validate()?;
        let mut sink = Self::new(store);
        sink.pending.reserve(config.save_threshold.min(4096));
        sink.config = config;
        Ok(sink)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &DatabaseSinkConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Hand pending records to the store
    ///
    /// A batch the store rejects is dropped, not retried.
    pub fn save(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.pending);
        self.first_pending_at = None;
        self.store.persist(&batch)?;

        if self.config.delete_on_every_save {
            self.delete_expired()?;
        }
        Ok(())
    }

    /// Enforce `max_age` now
    pub fn delete_expired(&mut self) -> Result<usize> {
        self.last_delete = Instant::now();
        let Some(max_age) = self.config.max_age else {
            return Ok(0);
        };
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| LogError::config("DatabaseSink", format!("max_age out of range: {}", e)))?;
        self.store.delete_older_than(Utc::now() - max_age)
    }
}

impl<S: LogStore> LogSink for DatabaseSink<S> {
    fn deliver(&mut self, event: &LogEvent, formatted: &str) -> Result<()> {
        if self.pending.is_empty() {
            self.first_pending_at = Some(Instant::now());
        }
        self.pending.push(LogRecord::from_event(event, formatted));

        if self.pending.len() >= self.config.save_threshold {
            self.save()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.save()?;
        self.store.flush()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tick_interval(&self) -> Option<Duration> {
        let shortest = match (self.config.save_interval, self.config.delete_interval) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => return None,
        };
        Some((shortest / 2).max(Duration::from_millis(10)))
    }

    fn on_tick(&mut self) -> Result<()> {
        let save_due = match (self.first_pending_at, self.config.save_interval) {
            (Some(since), Some(interval)) => since.elapsed() >= interval,
            _ => false,
        };
        if save_due {
            self.save()?;
        }

        if let Some(interval) = self.config.delete_interval {
            if self.last_delete.elapsed() >= interval {
                self.delete_expired()?;
            }
        }
        Ok(())
    }
}

impl<S: LogStore> Drop for DatabaseSink<S> {
    fn drop(&mut self) {
        if let Err(e) = self.save() {
            eprintln!("[LOGGER ERROR] Sink '{}' lost records on drop: {}", self.name, e);
        }
    }
}

/// In-memory store; clones share the same records
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<LogRecord>>>,
    batches: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Number of `persist` calls so far
    pub fn batch_count(&self) -> usize {
        *self.batches.lock()
    }
}

impl LogStore for MemoryStore {
    fn persist(&mut self, batch: &[LogRecord]) -> Result<()> {
        self.records.lock().extend_from_slice(batch);
        *self.batches.lock() += 1;
        Ok(())
    }

    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|record| record.timestamp >= cutoff);
        Ok(before - records.len())
    }
}

/// Append-only file with one JSON object per record
pub struct JsonLinesStore {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = Self::open_writer(&path)?;
        Ok(Self { path, writer })
    }

    fn open_writer(path: &Path) -> Result<BufWriter<File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                LogError::io_operation(
                    "opening JSON lines store",
                    format!("cannot open '{}'", path.display()),
                    e,
                )
            })?;
        Ok(BufWriter::new(file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored record, oldest first
    pub fn read_all(&self) -> Result<Vec<LogRecord>> {
        let file = File::open(&self.path)?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                records.push(serde_json::from_str(&line)?);
            }
        }
        Ok(records)
    }
}

impl LogStore for JsonLinesStore {
    fn persist(&mut self, batch: &[LogRecord]) -> Result<()> {
        for record in batch {
            serde_json::to_writer(&mut self.writer, record)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Rewrites the file without expired records
    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.writer.flush()?;
        let records = self.read_all()?;
        let (keep, expired): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|record| record.timestamp >= cutoff);
        if expired.is_empty() {
            return Ok(0);
        }

        let mut temp_name = self.path.as_os_str().to_os_string();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        {
            let mut temp = BufWriter::new(File::create(&temp_path)?);
            for record in &keep {
                serde_json::to_writer(&mut temp, record)?;
                temp.write_all(b"\n")?;
            }
            temp.flush()?;
        }
        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            LogError::io_operation("compacting JSON lines store", "rename failed", e)
        })?;

        self.writer = Self::open_writer(&self.path)?;
        Ok(expired.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    fn info(message: &str) -> LogEvent {
        LogEvent::new(Severity::Info, message)
    }

    fn config(threshold: usize) -> DatabaseSinkConfig {
        DatabaseSinkConfig {
            save_threshold: threshold,
            save_interval: None,
            max_age: None,
            delete_interval: None,
            delete_on_every_save: false,
        }
    }

    #[test]
    fn test_saves_on_threshold() {
        let store = MemoryStore::new();
        let mut sink = DatabaseSink::with_config(store.clone(), config(3)).unwrap();

        sink.deliver(&info("a"), "a").unwrap();
        sink.deliver(&info("b"), "b").unwrap();
        assert_eq!(store.len(), 0);
        assert_eq!(sink.pending_len(), 2);

        sink.deliver(&info("c"), "c").unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.batch_count(), 1);
        assert_eq!(sink.pending_len(), 0);
    }

    #[test]
    fn test_saves_on_interval_tick() {
        let store = MemoryStore::new();
        let cfg = DatabaseSinkConfig {
            save_interval: Some(Duration::from_millis(30)),
            ..config(100)
        };
        let mut sink = DatabaseSink::with_config(store.clone(), cfg).unwrap();
        assert!(sink.tick_interval().is_some());

        sink.deliver(&info("a"), "a").unwrap();
        sink.on_tick().unwrap();
        assert_eq!(store.len(), 0);

        thread::sleep(Duration::from_millis(50));
        sink.on_tick().unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_flush_saves_partial_batch() {
        let store = MemoryStore::new();
        let mut sink = DatabaseSink::with_config(store.clone(), config(100)).unwrap();
        sink.deliver(&info("a"), "a").unwrap();
        sink.flush().unwrap();
        assert_eq!(store.records()[0].text, "a");
    }

    #[test]
    fn test_retention_deletes_expired() {
        let store = MemoryStore::new();
        let cfg = DatabaseSinkConfig {
            max_age: Some(Duration::from_secs(3600)),
            delete_on_every_save: true,
            ..config(1)
        };
        let mut sink = DatabaseSink::with_config(store.clone(), cfg).unwrap();

        let old = info("old").with_timestamp(Utc::now() - chrono::Duration::hours(2));
        sink.deliver(&old, "old").unwrap();
        assert_eq!(store.len(), 0);

        sink.deliver(&info("new"), "new").unwrap();
        let texts: Vec<_> = store.records().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec!["new"]);
    }

    #[test]
    fn test_invalid_config() {
        let result = DatabaseSink::with_config(MemoryStore::new(), config(0));
        assert!(matches!(result, Err(LogError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_drop_saves_pending() {
        let store = MemoryStore::new();
        {
            let mut sink = DatabaseSink::with_config(store.clone(), config(100)).unwrap();
            sink.deliver(&info("a"), "a").unwrap();
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_json_lines_store() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("logs.jsonl");
        let mut store = JsonLinesStore::open(&path)?;

        let old = LogRecord::from_event(
            &info("old").with_timestamp(Utc::now() - chrono::Duration::days(10)),
            "old",
        );
        let new = LogRecord::from_event(&info("new").with_context(7), "new");
        store.persist(&[old, new.clone()])?;

        let content = fs::read_to_string(&path)?;
        assert_eq!(content.lines().count(), 2);
        for line in content.lines() {
            let parsed: serde_json::Value = serde_json::from_str(line)?;
            assert!(parsed["text"].is_string());
            assert_eq!(parsed["severity"], "info");
        }

        let removed = store.delete_older_than(Utc::now() - chrono::Duration::days(7))?;
        assert_eq!(removed, 1);
        assert_eq!(store.read_all()?, vec![new]);

        // Still appendable after compaction
        store.persist(&[LogRecord::from_event(&info("later"), "later")])?;
        assert_eq!(store.read_all()?.len(), 2);
        Ok(())
    }
}
