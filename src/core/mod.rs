//! Core dispatcher types and traits

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fields;
pub mod formatter;
pub mod log_event;
pub mod metrics;
pub mod overflow_policy;
pub mod severity;
pub mod sink;
mod sink_worker;
pub mod timestamp;

pub use config::DispatcherConfig;
pub use dispatcher::{
    Dispatcher, DispatcherBuilder, SinkId, DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use error::{ErrorKind, LogError, Result};
pub use fields::{EventFields, FieldValue};
pub use formatter::{
    ChainFormatter, ContextFilterFormatter, JsonFormatter, LogFormatter, LogfmtFormatter,
    MessageFormatter, TextFormatter,
};
pub use log_event::LogEvent;
pub use metrics::DispatchMetrics;
pub use overflow_policy::{ErrorCallback, OverflowCallback, OverflowPolicy};
pub use severity::Severity;
pub use sink::LogSink;
pub use timestamp::TimestampFormat;
