//! Rotating file sink
//!
//! Writes to `<dir>/<name>.log`, opened lazily on the first delivery. After
//! every append the size and age thresholds of the [`RotationPolicy`] are
//! checked; when one is reached the current file is renamed into the archive
//! set, the archive is pruned, and a fresh current file is opened.

use super::rotation::{archive_file_name, compress_archive, discover_archives, RotationPolicy};
use crate::core::{LogError, LogEvent, LogSink, Result};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Lifecycle of the current file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSinkState {
    Closed,
    Open,
    RollingOver,
}

/// # Example
///
/// ```no_run
/// use rust_log_dispatcher::prelude::*;
/// use rust_log_dispatcher::sinks::{FileSink, RotationPolicy};
///
/// let policy = RotationPolicy::new()
///     .with_max_file_size(10 * 1024 * 1024)
///     .with_max_archived_files(7)
///     .with_compression(true);
/// let sink = FileSink::with_policy("/var/log/myapp", "myapp", policy).unwrap();
///
/// let dispatcher = Dispatcher::new().unwrap();
/// dispatcher.register_sink(sink, Severity::Info, TextFormatter::new()).unwrap();
/// ```
pub struct FileSink {
    name: String,
    directory: PathBuf,
    base_name: String,
    current_path: PathBuf,
    policy: RotationPolicy,
    state: FileSinkState,
    writer: Option<BufWriter<File>>,
    current_size: u64,
    created_at: SystemTime,
    /// Oldest first
    archived: Vec<PathBuf>,
    next_seq: u64,
    started: bool,
}

impl FileSink {
    pub fn new(directory: impl AsRef<Path>, base_name: &str) -> Result<Self> {
        Self::with_policy(directory, base_name, RotationPolicy::default())
    }

    /// # Errors
    ///
    /// [`LogError::InvalidConfiguration`] for an empty or path-like base
    /// name, a policy that never rolls, or a directory that cannot be
    /// created.
    pub fn with_policy(
        directory: impl AsRef<Path>,
        base_name: &str,
        policy: RotationPolicy,
    ) -> Result<Self> {
        if base_name.trim().is_empty() {
            return Err(LogError::config("FileSink", "file name must not be empty"));
        }
        if base_name.contains(['/', '\\']) {
            return Err(LogError::config(
                "FileSink",
                format!("file name '{}' must not contain a path separator", base_name),
            ));
        }
        policy.validate()?;

        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            LogError::config(
                "FileSink",
                format!("cannot create directory '{}': {}", directory.display(), e),
            )
        })?;

        let (archived, next_seq) = discover_archives(&directory, base_name)?;
        let current_path = directory.join(format!("{}.log", base_name));

        let mut sink = Self {
            name: format!("file:{}", current_path.display()),
            directory,
            base_name: base_name.to_string(),
            current_path,
            policy,
            state: FileSinkState::Closed,
            writer: None,
            current_size: 0,
            created_at: SystemTime::now(),
            archived,
            next_seq,
            started: false,
        };
        // Discovered archives may exceed a tighter policy
        sink.prune()?;
        Ok(sink)
    }

    pub fn state(&self) -> FileSinkState {
        self.state
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Archives oldest first
    pub fn archived_files(&self) -> &[PathBuf] {
        &self.archived
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Roll the current file into the archive now
    ///
    /// An empty or never-written current file is not archived.
    pub fn roll_now(&mut self) -> Result<()> {
        self.roll_over()
    }

    fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.created_at)
            .unwrap_or(Duration::ZERO)
    }

    fn open(&mut self) -> Result<()> {
        if !self.started {
            self.started = true;
            if !self.policy.reuse_existing {
                self.archive_current()?;
                self.prune()?;
            }
        }

        let path_str = self.current_path.display().to_string();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_path)
            .map_err(|e| LogError::file_sink(path_str.clone(), format!("cannot open: {}", e)))?;

        #[cfg(feature = "file")]
        fs2::FileExt::try_lock_exclusive(&file).map_err(|_| LogError::file_lock(path_str.clone()))?;

        let metadata = file
            .metadata()
            .map_err(|e| LogError::file_sink(path_str, format!("cannot read metadata: {}", e)))?;
        self.current_size = metadata.len();
        self.created_at = if self.current_size == 0 {
            SystemTime::now()
        } else {
            metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or_else(|_| SystemTime::now())
        };

        self.writer = Some(BufWriter::new(file));
        self.state = FileSinkState::Open;
        Ok(())
    }

    /// Drop the handle without reporting; used after a failed write
    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
        self.state = FileSinkState::Closed;
    }

    fn roll_over(&mut self) -> Result<()> {
        let was_open = self.state == FileSinkState::Open;
        self.state = FileSinkState::RollingOver;
        let archived = self.archive_current();
        let pruned = self.prune();
        let reopened = if archived.is_ok() && was_open {
            self.open()
        } else {
            Ok(())
        };

        if self.writer.is_none() {
            self.state = FileSinkState::Closed;
        }
        archived.and(pruned).and(reopened)
    }

    /// Close the current file and rename it into the archive set
    fn archive_current(&mut self) -> Result<()> {
        let path_str = self.current_path.display().to_string();
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| {
                LogError::file_rotation(path_str.clone(), format!("flush before rollover: {}", e))
            })?;
        }

        let len = fs::metadata(&self.current_path).map(|m| m.len()).unwrap_or(0);
        self.current_size = 0;
        self.created_at = SystemTime::now();
        if len == 0 {
            return Ok(());
        }

        let archive_path = self
            .directory
            .join(archive_file_name(&self.base_name, &Utc::now(), self.next_seq));
        self.next_seq += 1;

        fs::rename(&self.current_path, &archive_path).map_err(|e| {
            LogError::file_rotation(path_str, format!("rename into archive failed: {}", e))
        })?;

        if self.policy.compress {
            match compress_archive(&archive_path) {
                Ok(gz_path) => self.archived.push(gz_path),
                Err(e) => {
                    self.archived.push(archive_path);
                    return Err(e);
                }
            }
        } else {
            self.archived.push(archive_path);
        }
        Ok(())
    }

    /// Enforce the archive count, then the disk quota, oldest first
    fn prune(&mut self) -> Result<()> {
        let mut first_error = None;

        let excess = self.archived.len().saturating_sub(self.policy.max_archived_files);
        for path in self.archived.drain(..excess).collect::<Vec<_>>() {
            remove_archive(&path, &mut first_error);
        }

        if let Some(quota) = self.policy.disk_quota {
            let mut sizes: Vec<u64> = self
                .archived
                .iter()
                .map(|p| fs::metadata(p).map(|m| m.len()).unwrap_or(0))
                .collect();
            let mut total: u64 = sizes.iter().sum();
            while total > quota && !self.archived.is_empty() {
                let path = self.archived.remove(0);
                total -= sizes.remove(0);
                remove_archive(&path, &mut first_error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

fn remove_archive(path: &Path, first_error: &mut Option<LogError>) {
    if let Err(e) = fs::remove_file(path) {
        if first_error.is_none() {
            *first_error = Some(LogError::file_rotation(
                path.display().to_string(),
                format!("cannot remove old archive: {}", e),
            ));
        }
    }
}

impl LogSink for FileSink {
    fn deliver(&mut self, _event: &LogEvent, formatted: &str) -> Result<()> {
        if self.state != FileSinkState::Open {
            if let Err(e) = self.open() {
                self.close();
                return Err(e);
            }
        }

        let Some(writer) = self.writer.as_mut() else {
            self.state = FileSinkState::Closed;
            return Err(LogError::file_sink(
                self.current_path.display().to_string(),
                "no open handle",
            ));
        };

        let written = writer
            .write_all(formatted.as_bytes())
            .and_then(|()| writer.write_all(b"\n"));
        if let Err(e) = written {
            self.close();
            return Err(LogError::file_sink(
                self.current_path.display().to_string(),
                format!("write failed: {}", e),
            ));
        }

        self.current_size += formatted.len() as u64 + 1;
        if self.policy.should_roll(self.current_size, self.age()) {
            self.roll_over()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().map_err(|e| {
                LogError::file_sink(
                    self.current_path.display().to_string(),
                    format!("flush failed: {}", e),
                )
            })?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tick_interval(&self) -> Option<Duration> {
        self.policy.check_interval()
    }

    fn on_tick(&mut self) -> Result<()> {
        if self.state == FileSinkState::Open && self.policy.should_roll(self.current_size, self.age()) {
            self.roll_over()?;
        }
        self.flush()
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;
    use std::thread;
    use tempfile::tempdir;

    fn event() -> LogEvent {
        LogEvent::new(Severity::Info, "unused")
    }

    fn size_policy(max: u64, keep: usize) -> RotationPolicy {
        RotationPolicy::new()
            .with_max_file_size(max)
            .with_max_age(None)
            .with_max_archived_files(keep)
            .with_disk_quota(None)
    }

    #[test]
    fn test_opens_lazily() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::new(dir.path(), "app").unwrap();
        assert_eq!(sink.state(), FileSinkState::Closed);
        assert!(!sink.current_path().exists());
        assert_eq!(sink.name(), format!("file:{}", dir.path().join("app.log").display()));

        sink.deliver(&event(), "hello").unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.state(), FileSinkState::Open);
        assert_eq!(fs::read_to_string(sink.current_path()).unwrap(), "hello\n");
        assert_eq!(sink.current_size(), 6);
    }

    #[test]
    fn test_rejects_bad_configuration() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            FileSink::new(dir.path(), ""),
            Err(LogError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            FileSink::new(dir.path(), "nested/app"),
            Err(LogError::InvalidConfiguration { .. })
        ));
        let never = RotationPolicy::new().with_max_file_size(0).with_max_age(None);
        assert!(FileSink::with_policy(dir.path(), "app", never).is_err());
    }

    #[test]
    fn test_rollover_adds_exactly_one_archive() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::with_policy(dir.path(), "app", size_policy(20, 5)).unwrap();

        sink.deliver(&event(), "0123456789").unwrap();
        assert!(sink.archived_files().is_empty());

        sink.deliver(&event(), "0123456789").unwrap();
        assert_eq!(sink.archived_files().len(), 1);
        assert_eq!(sink.current_size(), 0);
        assert_eq!(sink.state(), FileSinkState::Open);

        let archived = fs::read_to_string(&sink.archived_files()[0]).unwrap();
        assert_eq!(archived, "0123456789\n0123456789\n");
    }

    #[test]
    fn test_retention_bound() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::with_policy(dir.path(), "app", size_policy(10, 3)).unwrap();

        for i in 0..20 {
            sink.deliver(&event(), &format!("line {:04}", i)).unwrap();
        }
        assert_eq!(sink.archived_files().len(), 3);

        let on_disk = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "app.log")
            .count();
        assert_eq!(on_disk, 3);

        // Survivors are the newest
        let newest = fs::read_to_string(sink.archived_files().last().unwrap()).unwrap();
        assert_eq!(newest, "line 0019\n");
    }

    #[test]
    fn test_zero_archives_keeps_none() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::with_policy(dir.path(), "app", size_policy(5, 0)).unwrap();
        for _ in 0..4 {
            sink.deliver(&event(), "abcdef").unwrap();
        }
        assert!(sink.archived_files().is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_disk_quota_prunes_oldest() {
        let dir = tempdir().unwrap();
        let policy = size_policy(10, 10).with_disk_quota(Some(25));
        let mut sink = FileSink::with_policy(dir.path(), "app", policy).unwrap();

        for i in 0..5 {
            sink.deliver(&event(), &format!("entry {:04}", i)).unwrap();
        }
        // Each archive is 11 bytes; only two fit in 25
        assert_eq!(sink.archived_files().len(), 2);
    }

    #[test]
    fn test_roll_now_and_empty_file() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::with_policy(dir.path(), "app", size_policy(1024, 5)).unwrap();

        sink.roll_now().unwrap();
        assert!(sink.archived_files().is_empty());

        sink.deliver(&event(), "keep me").unwrap();
        sink.roll_now().unwrap();
        assert_eq!(sink.archived_files().len(), 1);
        assert_eq!(sink.current_size(), 0);
    }

    #[test]
    fn test_age_rollover_on_tick() {
        let dir = tempdir().unwrap();
        let policy = RotationPolicy::new()
            .with_max_file_size(0)
            .with_max_age(Some(Duration::from_millis(50)));
        let mut sink = FileSink::with_policy(dir.path(), "app", policy).unwrap();
        assert!(sink.tick_interval().is_some());

        sink.deliver(&event(), "old").unwrap();
        thread::sleep(Duration::from_millis(80));
        sink.on_tick().unwrap();

        assert_eq!(sink.archived_files().len(), 1);
    }

    #[test]
    fn test_compressed_archives() {
        let dir = tempdir().unwrap();
        let policy = size_policy(10, 5).with_compression(true);
        let mut sink = FileSink::with_policy(dir.path(), "app", policy).unwrap();

        sink.deliver(&event(), "0123456789").unwrap();
        let archive = &sink.archived_files()[0];
        assert!(archive.to_string_lossy().ends_with(".log.gz"));
        assert!(archive.exists());
    }

    #[test]
    fn test_discovers_and_continues_archives() {
        let dir = tempdir().unwrap();
        {
            let mut sink = FileSink::with_policy(dir.path(), "app", size_policy(5, 5)).unwrap();
            sink.deliver(&event(), "first").unwrap();
            sink.deliver(&event(), "second").unwrap();
        }

        let sink = FileSink::with_policy(dir.path(), "app", size_policy(5, 5)).unwrap();
        assert_eq!(sink.archived_files().len(), 2);

        let tighter = FileSink::with_policy(dir.path(), "app", size_policy(5, 1)).unwrap();
        assert_eq!(tighter.archived_files().len(), 1);
    }

    #[test]
    fn test_reuse_existing_disabled_archives_previous_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.log"), "from last run\n").unwrap();

        let policy = size_policy(1024, 5).with_reuse_existing(false);
        let mut sink = FileSink::with_policy(dir.path(), "app", policy).unwrap();
        sink.deliver(&event(), "fresh").unwrap();
        sink.flush().unwrap();

        assert_eq!(sink.archived_files().len(), 1);
        assert_eq!(fs::read_to_string(sink.current_path()).unwrap(), "fresh\n");
    }

    #[test]
    fn test_startup_archive_respects_retention() {
        let dir = tempdir().unwrap();
        {
            let mut sink = FileSink::with_policy(dir.path(), "app", size_policy(5, 2)).unwrap();
            for _ in 0..3 {
                sink.deliver(&event(), "abcdef").unwrap();
            }
            assert_eq!(sink.archived_files().len(), 2);
        }
        fs::write(dir.path().join("app.log"), "leftover\n").unwrap();

        let policy = size_policy(1024, 2).with_reuse_existing(false);
        let mut sink = FileSink::with_policy(dir.path(), "app", policy).unwrap();
        sink.deliver(&event(), "fresh").unwrap();
        sink.flush().unwrap();

        assert_eq!(sink.archived_files().len(), 2);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
        let newest = fs::read_to_string(sink.archived_files().last().unwrap()).unwrap();
        assert_eq!(newest, "leftover\n");
    }

    #[test]
    fn test_reuse_existing_appends() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.log"), "earlier\n").unwrap();

        let mut sink = FileSink::with_policy(dir.path(), "app", size_policy(1024, 5)).unwrap();
        sink.deliver(&event(), "later").unwrap();
        sink.flush().unwrap();

        assert_eq!(
            fs::read_to_string(sink.current_path()).unwrap(),
            "earlier\nlater\n"
        );
        assert_eq!(sink.current_size(), 14);
    }
}
