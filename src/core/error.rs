//! Error types for the log dispatcher

pub type Result<T> = std::result::Result<T, LogError>;

/// Coarse classification of a [`LogError`]
///
/// Configuration errors are returned synchronously from the registration API.
/// Delivery and rotation errors never reach producers: they are captured at
/// the sink boundary and handed to the dispatcher's error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Delivery,
    Rotation,
    Queue,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// No sink registered under the given id
    #[error("No sink registered with id {id}")]
    UnknownSink { id: u64 },

    /// A sink failed to output an event
    #[error("Delivery to sink '{sink}' failed: {message}")]
    DeliveryError { sink: String, message: String },

    /// A sink panicked while handling an event
    #[error("Sink '{sink}' panicked: {message}")]
    SinkPanicked { sink: String, message: String },

    /// File sink write error with path
    #[error("File sink error for '{path}': {message}")]
    FileSinkError { path: String, message: String },

    /// File rotation error
    #[error("File rotation failed for '{path}': {message}")]
    FileRotationError { path: String, message: String },

    /// File lock error
    #[error("Failed to acquire file lock on '{path}'")]
    FileLockError { path: String },

    /// Dispatcher already shut down
    #[error("Dispatcher already stopped")]
    DispatcherStopped,

    /// Flush did not complete in time
    #[error("Flush did not complete within {waited:?}")]
    FlushTimeout { waited: std::time::Duration },
}

impl LogError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LogError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LogError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a delivery error for a named sink
    pub fn delivery(sink: impl Into<String>, message: impl Into<String>) -> Self {
        LogError::DeliveryError {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create a file sink error
    pub fn file_sink(path: impl Into<String>, message: impl Into<String>) -> Self {
        LogError::FileSinkError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a file rotation error
    pub fn file_rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        LogError::FileRotationError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a file lock error
    pub fn file_lock(path: impl Into<String>) -> Self {
        LogError::FileLockError { path: path.into() }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LogError::InvalidConfiguration { .. } | LogError::UnknownSink { .. } => {
                ErrorKind::Configuration
            }
            LogError::FileRotationError { .. } => ErrorKind::Rotation,
            LogError::IoOperation { .. }
            | LogError::IoError(_)
            | LogError::JsonError(_)
            | LogError::DeliveryError { .. }
            | LogError::SinkPanicked { .. }
            | LogError::FileSinkError { .. }
            | LogError::FileLockError { .. } => ErrorKind::Delivery,
            LogError::DispatcherStopped | LogError::FlushTimeout { .. } => ErrorKind::Queue,
        }
    }
}
