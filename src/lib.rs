//! # Rust Log Dispatcher
//!
//! A multi-destination, severity-filtered, asynchronous logging framework.
//!
//! Events are submitted to a [`Dispatcher`], which routes each one to every
//! registered sink whose threshold accepts its severity. Every sink has its
//! own formatter and its own worker thread, so slow or failing sinks never
//! hold up callers or each other.
//!
//! ## Features
//!
//! - **Per-sink thresholds and formatters**: text, JSON, logfmt, context filters
//! - **Sinks**: rotating files, console with colors, syslog, batched storage
//! - **Bounded queue** with configurable overflow policy and metrics
//! - **Flush barrier**: wait until everything logged so far is delivered
//!
//! ```
//! use rust_log_dispatcher::prelude::*;
//!
//! let dispatcher = Dispatcher::builder()
//!     .sink(ConsoleSink::new(), Severity::Info, TextFormatter::new())
//!     .build()
//!     .unwrap();
//!
//! dispatcher.info("service started");
//! dispatcher.flush().unwrap();
//! ```

pub mod core;
pub mod macros;
pub mod sinks;

pub mod prelude {
    #[cfg(feature = "console")]
    pub use crate::sinks::{ColorMode, ConsoleSink};
    pub use crate::sinks::{DatabaseSink, FileSink, MemoryStore, RotationPolicy, SystemLogSink};
    pub use crate::core::{
        ChainFormatter, ContextFilterFormatter, DispatchMetrics, Dispatcher, DispatcherBuilder,
        DispatcherConfig, EventFields, FieldValue, JsonFormatter, LogError, LogEvent,
        LogFormatter, LogSink, LogfmtFormatter, MessageFormatter, OverflowPolicy, Result,
        Severity, SinkId, TextFormatter, TimestampFormat, DEFAULT_SHUTDOWN_TIMEOUT,
    };
}

pub use crate::core::{
    ChainFormatter, ContextFilterFormatter, DispatchMetrics, Dispatcher, DispatcherBuilder,
    DispatcherConfig, ErrorCallback, ErrorKind, EventFields, FieldValue, JsonFormatter, LogError,
    LogEvent, LogFormatter, LogSink, LogfmtFormatter, MessageFormatter, OverflowCallback,
    OverflowPolicy, Result, Severity, SinkId, TextFormatter, TimestampFormat,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT,
};
