//! Serializable dispatcher settings

use super::{
    dispatcher::{DispatcherBuilder, DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT},
    error::{LogError, Result},
    overflow_policy::OverflowPolicy,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Queue and lifecycle settings loadable from JSON
///
/// Missing fields take their defaults. `queue_capacity: null` selects an
/// unbounded queue.
///
/// ```
/// use rust_log_dispatcher::{DispatcherConfig, OverflowPolicy};
///
/// let config = DispatcherConfig::from_json(
///     r#"{ "queue_capacity": 256, "overflow_policy": "Block" }"#,
/// ).unwrap();
/// assert_eq!(config.queue_capacity, Some(256));
/// assert_eq!(config.overflow_policy, OverflowPolicy::Block);
/// assert!(config.preserve_errors);
///
/// let dispatcher = config.into_builder().build().unwrap();
/// assert_eq!(dispatcher.sink_count(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub queue_capacity: Option<usize>,
    pub overflow_policy: OverflowPolicy,
    pub preserve_errors: bool,
    pub shutdown_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
            overflow_policy: OverflowPolicy::default(),
            preserve_errors: true,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64,
        }
    }
}

impl DispatcherConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            LogError::io_operation(
                "reading dispatcher config",
                format!("cannot read '{}'", path.display()),
                e,
            )
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == Some(0) {
            return Err(LogError::config(
                "DispatcherConfig",
                "queue_capacity must be non-zero (use null for unbounded)",
            ));
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Builder preloaded with these settings; add sinks before `build`
    pub fn into_builder(self) -> DispatcherBuilder {
        let builder = match self.queue_capacity {
            Some(capacity) => DispatcherBuilder::new().queue_capacity(capacity),
            None => DispatcherBuilder::new().unbounded(),
        };
        builder
            .overflow_policy(self.overflow_policy.clone())
            .preserve_errors(self.preserve_errors)
            .shutdown_timeout(self.shutdown_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = DispatcherConfig::from_json("{}").unwrap();
        assert_eq!(config, DispatcherConfig::default());
        assert_eq!(config.shutdown_timeout(), DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn test_unbounded_and_zero_capacity() {
        let config = DispatcherConfig::from_json(r#"{"queue_capacity": null}"#).unwrap();
        assert_eq!(config.queue_capacity, None);

        let result = DispatcherConfig::from_json(r#"{"queue_capacity": 0}"#);
        assert!(matches!(result, Err(LogError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_malformed_json_is_error() {
        let result = DispatcherConfig::from_json("{ not json");
        assert!(matches!(result, Err(LogError::JsonError(_))));
    }

    #[test]
    fn test_from_file_round_trip() {
        let config = DispatcherConfig {
            queue_capacity: Some(64),
            overflow_policy: OverflowPolicy::DropNewest,
            preserve_errors: false,
            shutdown_timeout_ms: 250,
        };

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(config.to_json().unwrap().as_bytes()).unwrap();

        let loaded = DispatcherConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let result = DispatcherConfig::from_json_file("/nonexistent/dispatcher.json");
        assert!(matches!(result, Err(LogError::IoOperation { .. })));
    }
}
