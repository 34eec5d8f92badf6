//! Overflow policies for the bounded delivery queue

use super::error::LogError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What `log` does when the bounded delivery queue is full
///
/// Error-severity events bypass the policy and block while the dispatcher's
/// `preserve_errors` setting is on.
///
/// ```
/// use rust_log_dispatcher::OverflowPolicy;
/// use std::time::Duration;
///
/// let policy = OverflowPolicy::default();
/// assert_eq!(policy, OverflowPolicy::AlertAndDrop);
///
/// let policy = OverflowPolicy::BlockWithTimeout(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Drop the new event, counting it in the metrics
    DropNewest,

    /// Wait until space is available
    ///
    /// Producers feel backpressure from slow sinks.
    Block,

    /// Wait up to the timeout, then drop with an alert
    BlockWithTimeout(Duration),

    /// Drop the new event, warn on stderr and invoke the overflow callback
    #[default]
    AlertAndDrop,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::DropNewest => write!(f, "DropNewest"),
            OverflowPolicy::Block => write!(f, "Block"),
            OverflowPolicy::BlockWithTimeout(d) => write!(f, "BlockWithTimeout({:?})", d),
            OverflowPolicy::AlertAndDrop => write!(f, "AlertAndDrop"),
        }
    }
}

/// Called with the running total of dropped events
pub type OverflowCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Called with the sink name and the error whenever a sink fails
///
/// Runs on the failing sink's delivery worker.
pub type ErrorCallback = Arc<dyn Fn(&str, &LogError) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_policy_display() {
        assert_eq!(OverflowPolicy::DropNewest.to_string(), "DropNewest");
        assert_eq!(OverflowPolicy::Block.to_string(), "Block");
        assert_eq!(
            OverflowPolicy::BlockWithTimeout(Duration::from_millis(100)).to_string(),
            "BlockWithTimeout(100ms)"
        );
        assert_eq!(OverflowPolicy::AlertAndDrop.to_string(), "AlertAndDrop");
    }

    #[test]
    fn test_overflow_policy_serde() {
        let policy: OverflowPolicy = serde_json::from_str("\"Block\"").unwrap();
        assert_eq!(policy, OverflowPolicy::Block);

        let policy: OverflowPolicy =
            serde_json::from_str(r#"{"BlockWithTimeout":{"secs":0,"nanos":5000000}}"#).unwrap();
        assert_eq!(policy, OverflowPolicy::BlockWithTimeout(Duration::from_millis(5)));
    }
}
