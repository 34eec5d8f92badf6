//! Rotation policy and archive naming for [`FileSink`](super::FileSink)
//!
//! Archives are named `<name>.<YYYYMMDD-HHMMSS-mmm>.<seq>.log`, with a
//! `.gz` suffix once compressed, so sorting names sorts by age.

use crate::core::{LogError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ARCHIVE_TIMESTAMP: &str = "%Y%m%d-%H%M%S-%3f";
const ARCHIVE_TIMESTAMP_LEN: usize = 19;
const SEQ_WIDTH: usize = 6;

/// When a file sink rolls its current file and how many archives it keeps
///
/// ```
/// use rust_log_dispatcher::sinks::RotationPolicy;
/// use std::time::Duration;
///
/// let policy = RotationPolicy::new()
///     .with_max_file_size(50 * 1024 * 1024)
///     .with_max_age(Some(Duration::from_secs(3600)))
///     .with_max_archived_files(7)
///     .with_compression(true);
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationPolicy {
    /// Roll once the current file reaches this many bytes; 0 disables
    pub max_file_size: u64,
    /// Roll once the current file is this old
    pub max_age: Option<Duration>,
    /// Archives kept; 0 keeps none
    pub max_archived_files: usize,
    /// Upper bound on total archive bytes, oldest pruned first
    pub disk_quota: Option<u64>,
    pub compress: bool,
    /// Append to an existing current file instead of archiving it on start
    pub reuse_existing: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024,
            max_age: Some(Duration::from_secs(24 * 60 * 60)),
            max_archived_files: 5,
            disk_quota: Some(20 * 1024 * 1024),
            compress: false,
            reuse_existing: true,
        }
    }
}

impl RotationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_age(mut self, age: Option<Duration>) -> Self {
        self.max_age = age;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_archived_files(mut self, count: usize) -> Self {
        self.max_archived_files = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_disk_quota(mut self, bytes: Option<u64>) -> Self {
        self.disk_quota = bytes;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_reuse_existing(mut self, reuse: bool) -> Self {
        self.reuse_existing = reuse;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 && self.max_age.is_none() {
            return Err(LogError::config(
                "RotationPolicy",
                "max_file_size is 0 and no max_age is set: the file would never roll",
            ));
        }
        if self.max_age == Some(Duration::ZERO) {
            return Err(LogError::config("RotationPolicy", "max_age must be non-zero"));
        }
        Ok(())
    }

    /// True once either threshold is reached
    pub fn should_roll(&self, size: u64, age: Duration) -> bool {
        let size_exceeded = self.max_file_size > 0 && size >= self.max_file_size;
        let age_exceeded = self.max_age.is_some_and(|max_age| age >= max_age);
        size_exceeded || age_exceeded
    }

    /// How often an idle sink should re-check the age threshold
    pub fn check_interval(&self) -> Option<Duration> {
        self.max_age
            .map(|age| (age / 2).clamp(Duration::from_millis(10), Duration::from_secs(60)))
    }
}

pub(crate) fn archive_file_name(base_name: &str, at: &DateTime<Utc>, seq: u64) -> String {
    format!(
        "{}.{}.{:0width$}.log",
        base_name,
        at.format(ARCHIVE_TIMESTAMP),
        seq,
        width = SEQ_WIDTH
    )
}

/// Sequence number of an archive belonging to `base_name`, if the name is one
pub(crate) fn parse_archive_seq(base_name: &str, file_name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(base_name)?.strip_prefix('.')?;
    let rest = rest
        .strip_suffix(".log.gz")
        .or_else(|| rest.strip_suffix(".log"))?;

    let (stamp, seq) = rest.split_once('.')?;
    let stamp_ok = stamp.len() == ARCHIVE_TIMESTAMP_LEN
        && stamp
            .char_indices()
            .all(|(i, c)| if i == 8 || i == 15 { c == '-' } else { c.is_ascii_digit() });
    if !stamp_ok || seq.len() != SEQ_WIDTH || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    seq.parse().ok()
}

/// Existing archives for `base_name` in `dir`, oldest first, and the next
/// free sequence number
pub(crate) fn discover_archives(dir: &Path, base_name: &str) -> Result<(Vec<PathBuf>, u64)> {
    let entries = fs::read_dir(dir).map_err(|e| {
        LogError::io_operation(
            "scanning log directory",
            format!("cannot list '{}'", dir.display()),
            e,
        )
    })?;

    let mut archives = Vec::new();
    let mut next_seq = 0;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(seq) = parse_archive_seq(base_name, file_name) {
            next_seq = next_seq.max(seq + 1);
            archives.push(entry.path());
        }
    }
    archives.sort();
    Ok((archives, next_seq))
}

/// Gzip `path` into `<path>.gz` and remove the original
///
/// Streams through a temporary file; the original is only removed once the
/// compressed copy is complete.
pub(crate) fn compress_archive(path: &Path) -> Result<PathBuf> {
    let gz_path = append_extension(path, "gz");
    let temp_path = append_extension(path, "gz.tmp");
    let rotation_error =
        |message: String| LogError::file_rotation(path.display().to_string(), message);

    let input = File::open(path).map_err(|e| rotation_error(format!("cannot open for compression: {}", e)))?;
    let mut reader = BufReader::with_capacity(64 * 1024, input);

    let output = File::create(&temp_path)
        .map_err(|e| rotation_error(format!("cannot create '{}': {}", temp_path.display(), e)))?;
    let mut encoder = flate2::write::GzEncoder::new(
        BufWriter::with_capacity(64 * 1024, output),
        flate2::Compression::default(),
    );

    let streamed = (|| -> std::io::Result<()> {
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            encoder.write_all(&buffer[..n])?;
        }
        encoder.finish()?.flush()
    })();

    if let Err(e) = streamed.and_then(|()| fs::rename(&temp_path, &gz_path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(rotation_error(format!("compression failed: {}", e)));
    }

    if let Err(e) = fs::remove_file(path) {
        eprintln!(
            "[LOGGER WARNING] Compressed '{}' but could not remove the original: {}",
            path.display(),
            e
        );
    }
    Ok(gz_path)
}

fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(extension);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flate2::read::GzDecoder;
    use tempfile::tempdir;

    #[test]
    fn test_default_policy() {
        let policy = RotationPolicy::default();
        assert_eq!(policy.max_file_size, 1024 * 1024);
        assert_eq!(policy.max_age, Some(Duration::from_secs(86_400)));
        assert_eq!(policy.max_archived_files, 5);
        assert_eq!(policy.disk_quota, Some(20 * 1024 * 1024));
        assert!(!policy.compress);
        assert!(policy.reuse_existing);
    }

    #[test]
    fn test_validate_rejects_policy_that_never_rolls() {
        let policy = RotationPolicy::new().with_max_file_size(0).with_max_age(None);
        assert!(matches!(
            policy.validate(),
            Err(LogError::InvalidConfiguration { .. })
        ));

        let policy = RotationPolicy::new().with_max_file_size(0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_should_roll() {
        let policy = RotationPolicy::new()
            .with_max_file_size(100)
            .with_max_age(Some(Duration::from_secs(60)));

        assert!(!policy.should_roll(99, Duration::from_secs(1)));
        assert!(policy.should_roll(100, Duration::from_secs(1)));
        assert!(policy.should_roll(0, Duration::from_secs(60)));

        let size_only = RotationPolicy::new().with_max_age(None).with_max_file_size(10);
        assert!(!size_only.should_roll(9, Duration::from_secs(1_000_000)));
        assert_eq!(size_only.check_interval(), None);
    }

    #[test]
    fn test_archive_name_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let name = archive_file_name("app", &at, 42);
        assert_eq!(name, "app.20240309-140507-000.000042.log");
        assert_eq!(parse_archive_seq("app", &name), Some(42));
        assert_eq!(parse_archive_seq("app", &format!("{}.gz", name)), Some(42));
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert_eq!(parse_archive_seq("app", "app.log"), None);
        assert_eq!(parse_archive_seq("app", "other.20240309-140507-000.000001.log"), None);
        assert_eq!(parse_archive_seq("app", "app.2024-0309-140507-000.000001.log"), None);
        assert_eq!(parse_archive_seq("app", "app.20240309-140507-000.1.log"), None);
        assert_eq!(parse_archive_seq("app", "app.20240309-140507-000.000001.txt"), None);
    }

    #[test]
    fn test_discover_archives_sorted() {
        let dir = tempdir().unwrap();
        for name in [
            "app.20240102-000000-000.000003.log",
            "app.20240101-000000-000.000001.log.gz",
            "app.log",
            "unrelated.txt",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let (archives, next_seq) = discover_archives(dir.path(), "app").unwrap();
        let names: Vec<_> = archives
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "app.20240101-000000-000.000001.log.gz",
                "app.20240102-000000-000.000003.log"
            ]
        );
        assert_eq!(next_seq, 4);
    }

    #[test]
    fn test_compress_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.20240101-000000-000.000001.log");
        fs::write(&path, "line one\nline two\n").unwrap();

        let gz_path = compress_archive(&path).unwrap();
        assert!(!path.exists());
        assert!(gz_path.to_string_lossy().ends_with(".log.gz"));

        let mut text = String::new();
        GzDecoder::new(File::open(&gz_path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "line one\nline two\n");
    }
}
