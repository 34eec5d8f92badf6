//! Sink implementations

#[cfg(feature = "console")]
pub mod console;
pub mod database;
pub mod file;
pub mod rotation;
pub mod syslog;

#[cfg(feature = "console")]
pub use console::{ColorMode, ConsoleSink, ConsoleTarget};
pub use database::{DatabaseSink, DatabaseSinkConfig, JsonLinesStore, LogRecord, LogStore, MemoryStore};
pub use file::{FileSink, FileSinkState};
pub use rotation::RotationPolicy;
pub use syslog::{syslog_severity, SyslogFacility, SyslogTransport, SystemLogSink};

pub use crate::core::LogSink;
