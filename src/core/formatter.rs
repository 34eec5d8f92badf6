//! Formatters turning a [`LogEvent`] into the text a sink outputs
//!
//! A formatter is a pure function of the event and its own configuration. It
//! may return `None` to tell the sink to skip the event, which is how the
//! filtering formatters work.

use super::log_event::LogEvent;
use super::timestamp::TimestampFormat;
use std::collections::HashSet;

/// Renders events for one sink
///
/// Implementations must be free of side effects and shared mutable state;
/// the same event and configuration always produce the same text.
///
/// Closures work too:
///
/// ```
/// use rust_log_dispatcher::{LogEvent, LogFormatter, Severity};
///
/// let upper = |event: &LogEvent| Some(event.message().to_uppercase());
/// let event = LogEvent::new(Severity::Info, "ready");
/// assert_eq!(upper.format(&event).as_deref(), Some("READY"));
/// ```
pub trait LogFormatter: Send + Sync {
    fn format(&self, event: &LogEvent) -> Option<String>;
}

impl<F> LogFormatter for F
where
    F: Fn(&LogEvent) -> Option<String> + Send + Sync,
{
    fn format(&self, event: &LogEvent) -> Option<String> {
        self(event)
    }
}

/// Outputs the message only
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFormatter;

impl LogFormatter for MessageFormatter {
    fn format(&self, event: &LogEvent) -> Option<String> {
        Some(event.message().to_string())
    }
}

/// Human-readable single-line format
///
/// Example: `[2025-01-08T10:30:45.123Z] [INFO ] main - Request processed`
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    timestamp_format: TimestampFormat,
    show_location: bool,
    show_tag: bool,
    label_width: Option<(usize, usize)>,
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Set a custom timestamp format using a strftime-compatible format string
    #[must_use]
    pub fn with_custom_timestamp(mut self, format_str: &str) -> Self {
        self.timestamp_format = TimestampFormat::Custom(format_str.to_string());
        self
    }

    /// Append `(file:line function)` after the message when known
    #[must_use]
    pub fn with_location(mut self, enabled: bool) -> Self {
        self.show_location = enabled;
        self
    }

    /// Prefix the message with `[tag]` when the event carries one
    #[must_use]
    pub fn with_tag(mut self, enabled: bool) -> Self {
        self.show_tag = enabled;
        self
    }

    /// Pad the queue label to `min` columns and truncate it at `max`
    ///
    /// Keeps columns aligned when thread names vary in length.
    #[must_use]
    pub fn with_label_width(mut self, min: usize, max: usize) -> Self {
        self.label_width = Some((min, max.max(min)));
        self
    }

    fn render_label(&self, label: &str) -> String {
        match self.label_width {
            None => label.to_string(),
            Some((min, max)) => {
                let truncated: String = label.chars().take(max).collect();
                format!("{:<width$}", truncated, width = min)
            }
        }
    }
}

impl LogFormatter for TextFormatter {
    fn format(&self, event: &LogEvent) -> Option<String> {
        let mut line = format!(
            "[{}] [{:5}] {} - ",
            self.timestamp_format.format(event.timestamp()),
            event.severity().to_str(),
            self.render_label(event.queue_label()),
        );

        if self.show_tag {
            if let Some(tag) = event.tag() {
                line.push_str(&format!("[{}] ", tag));
            }
        }
        line.push_str(event.message());

        if let Some(fields) = event.fields() {
            if !fields.is_empty() {
                line.push(' ');
                line.push_str(&fields.format_fields());
            }
        }

        if self.show_location {
            if let (Some(file), Some(lineno)) = (event.file_name(), event.line()) {
                match event.function() {
                    Some(function) => line.push_str(&format!(" ({}:{} {})", file, lineno, function)),
                    None => line.push_str(&format!(" ({}:{})", file, lineno)),
                }
            }
        }

        Some(line)
    }
}

/// One JSON object per event
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    timestamp_format: TimestampFormat,
}

impl JsonFormatter {
    /// Event keys; a user field with one of these names is written as `field_<name>`
    pub const RESERVED_KEYS: [&'static str; 11] = [
        "timestamp",
        "level",
        "message",
        "queue",
        "thread_id",
        "file",
        "line",
        "function",
        "module_path",
        "context",
        "tag",
    ];

    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    fn timestamp_value(&self, event: &LogEvent) -> serde_json::Value {
        let ts = event.timestamp();
        match self.timestamp_format {
            TimestampFormat::Unix => serde_json::Value::Number(ts.timestamp().into()),
            TimestampFormat::UnixMillis => serde_json::Value::Number(ts.timestamp_millis().into()),
            TimestampFormat::UnixMicros => serde_json::Value::Number(ts.timestamp_micros().into()),
            _ => serde_json::Value::String(self.timestamp_format.format(ts)),
        }
    }

    /// Build the JSON object for an event
    pub fn to_value(&self, event: &LogEvent) -> serde_json::Value {
        use serde_json::Value;

        let mut obj = serde_json::Map::new();
        obj.insert("timestamp".to_string(), self.timestamp_value(event));
        obj.insert(
            "level".to_string(),
            Value::String(event.severity().to_str().to_string()),
        );
        obj.insert("message".to_string(), Value::String(event.message().to_string()));
        obj.insert(
            "queue".to_string(),
            Value::String(event.queue_label().to_string()),
        );
        obj.insert(
            "thread_id".to_string(),
            Value::String(event.thread_id().to_string()),
        );
        if let Some(file) = event.file() {
            obj.insert("file".to_string(), Value::String(file.to_string()));
        }
        if let Some(line) = event.line() {
            obj.insert("line".to_string(), Value::Number(line.into()));
        }
        if let Some(function) = event.function() {
            obj.insert("function".to_string(), Value::String(function.to_string()));
        }
        if let Some(module_path) = event.module_path() {
            obj.insert("module_path".to_string(), Value::String(module_path.to_string()));
        }
        if event.context() != 0 {
            obj.insert("context".to_string(), Value::Number(event.context().into()));
        }
        if let Some(tag) = event.tag() {
            obj.insert("tag".to_string(), Value::String(tag.to_string()));
        }
        if let Some(fields) = event.fields() {
            for (key, value) in fields.iter() {
                let mut key = key.clone();
                while Self::RESERVED_KEYS.contains(&key.as_str()) || obj.contains_key(&key) {
                    key = format!("field_{}", key);
                }
                obj.insert(key, value.to_json_value());
            }
        }
        Value::Object(obj)
    }
}

impl LogFormatter for JsonFormatter {
    fn format(&self, event: &LogEvent) -> Option<String> {
        serde_json::to_string(&self.to_value(event)).ok()
    }
}

/// `key=value` pairs compatible with log aggregation tools
///
/// Example: `timestamp=2025-01-08T10:30:45.123Z level=INFO message="Request processed"`
#[derive(Debug, Clone, Default)]
pub struct LogfmtFormatter {
    timestamp_format: TimestampFormat,
}

impl LogfmtFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Keep only characters that are legal in a logfmt key
    fn escape_key(key: &str) -> String {
        key.chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect()
    }

    /// Quote a value if it contains spaces, quotes or `=`
    fn escape_value(value: &str) -> String {
        if value.is_empty() || value.contains(' ') || value.contains('"') || value.contains('=') {
            Self::quote_value(value)
        } else {
            value.to_string()
        }
    }

    fn quote_value(value: &str) -> String {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

impl LogFormatter for LogfmtFormatter {
    fn format(&self, event: &LogEvent) -> Option<String> {
        use super::fields::FieldValue;

        let mut parts = vec![
            format!(
                "timestamp={}",
                Self::escape_value(&self.timestamp_format.format(event.timestamp()))
            ),
            format!("level={}", event.severity().to_str()),
            // Message is always quoted
            format!("message={}", Self::quote_value(event.message())),
            format!("queue={}", Self::escape_value(event.queue_label())),
        ];

        if let Some(file) = event.file() {
            parts.push(format!("file={}", Self::escape_value(file)));
        }
        if let Some(line) = event.line() {
            parts.push(format!("line={}", line));
        }
        if let Some(function) = event.function() {
            parts.push(format!("function={}", Self::escape_value(function)));
        }
        if let Some(tag) = event.tag() {
            parts.push(format!("tag={}", Self::escape_value(tag)));
        }
        if let Some(fields) = event.fields() {
            for (key, value) in fields.iter() {
                let rendered = match value {
                    FieldValue::String(s) => Self::quote_value(s),
                    other => other.to_string(),
                };
                parts.push(format!("{}={}", Self::escape_key(key), rendered));
            }
        }

        Some(parts.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextFilterMode {
    Allow,
    Deny,
}

/// Passes or suppresses events by their numeric context, then delegates
///
/// # Example
///
/// ```
/// use rust_log_dispatcher::{ContextFilterFormatter, LogEvent, LogFormatter, MessageFormatter, Severity};
///
/// let only_network = ContextFilterFormatter::allow([7], MessageFormatter);
/// let net = LogEvent::new(Severity::Info, "socket open").with_context(7);
/// let ui = LogEvent::new(Severity::Info, "button").with_context(2);
/// assert!(only_network.format(&net).is_some());
/// assert!(only_network.format(&ui).is_none());
/// ```
pub struct ContextFilterFormatter<F> {
    mode: ContextFilterMode,
    contexts: HashSet<i32>,
    inner: F,
}

impl<F: LogFormatter> ContextFilterFormatter<F> {
    /// Only events whose context is listed reach `inner`
    pub fn allow(contexts: impl IntoIterator<Item = i32>, inner: F) -> Self {
        Self {
            mode: ContextFilterMode::Allow,
            contexts: contexts.into_iter().collect(),
            inner,
        }
    }

    /// Events whose context is listed are suppressed
    pub fn deny(contexts: impl IntoIterator<Item = i32>, inner: F) -> Self {
        Self {
            mode: ContextFilterMode::Deny,
            contexts: contexts.into_iter().collect(),
            inner,
        }
    }

    pub fn is_listed(&self, context: i32) -> bool {
        self.contexts.contains(&context)
    }
}

impl<F: LogFormatter> LogFormatter for ContextFilterFormatter<F> {
    fn format(&self, event: &LogEvent) -> Option<String> {
        let listed = self.is_listed(event.context());
        let pass = match self.mode {
            ContextFilterMode::Allow => listed,
            ContextFilterMode::Deny => !listed,
        };
        if pass {
            self.inner.format(event)
        } else {
            None
        }
    }
}

/// Runs formatters in sequence
///
/// Each formatter sees the previous formatter's output as the event message.
/// Any stage returning `None` suppresses the event.
#[derive(Default)]
pub struct ChainFormatter {
    stages: Vec<Box<dyn LogFormatter>>,
}

impl ChainFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then<F: LogFormatter + 'static>(mut self, formatter: F) -> Self {
        self.stages.push(Box::new(formatter));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl LogFormatter for ChainFormatter {
    fn format(&self, event: &LogEvent) -> Option<String> {
        let mut stages = self.stages.iter();
        let Some(first) = stages.next() else {
            return Some(event.message().to_string());
        };
        let mut text = first.format(event)?;
        for stage in stages {
            text = stage.format(&event.with_message(text))?;
        }
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EventFields, Severity};
    use chrono::TimeZone;

    fn fixed_event() -> LogEvent {
        LogEvent::new(Severity::Info, "Request processed")
            .with_timestamp(chrono::Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45).unwrap())
            .with_queue_label("main")
    }

    #[test]
    fn test_text_format() {
        let result = TextFormatter::new().format(&fixed_event()).unwrap();
        assert_eq!(
            result,
            "[2025-01-08T10:30:45.000Z] [INFO ] main - Request processed"
        );
    }

    #[test]
    fn test_text_format_with_fields_tag_and_location() {
        let event = fixed_event()
            .with_fields(EventFields::new().with_field("user_id", 123).with_field("action", "login"))
            .with_tag("auth")
            .with_location("src/auth/session.rs", 88, "app::auth")
            .with_function("app::auth::open");

        let result = TextFormatter::new()
            .with_tag(true)
            .with_location(true)
            .format(&event)
            .unwrap();

        assert!(result.contains("[auth] Request processed"));
        assert!(result.contains("action=login user_id=123"));
        assert!(result.ends_with("(session.rs:88 app::auth::open)"));
    }

    #[test]
    fn test_text_label_width() {
        let formatter = TextFormatter::new().with_label_width(6, 8);
        let short = formatter.format(&fixed_event()).unwrap();
        assert!(short.contains("] main   - "));

        let long = formatter
            .format(&fixed_event().with_queue_label("background-io"))
            .unwrap();
        assert!(long.contains("] backgrou - "));
    }

    #[test]
    fn test_formatting_is_deterministic() {
        let event = fixed_event().with_fields(
            EventFields::new()
                .with_field("b", 2)
                .with_field("a", 1)
                .with_field("c", 3),
        );
        let formatters: Vec<Box<dyn LogFormatter>> = vec![
            Box::new(TextFormatter::new()),
            Box::new(JsonFormatter::new()),
            Box::new(LogfmtFormatter::new()),
        ];
        for formatter in formatters {
            assert_eq!(formatter.format(&event), formatter.format(&event));
        }
    }

    #[test]
    fn test_json_format() {
        let event = fixed_event()
            .with_context(3)
            .with_fields(EventFields::new().with_field("latency_ms", 42));
        let result = JsonFormatter::new().format(&event).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["message"], "Request processed");
        assert_eq!(parsed["timestamp"], "2025-01-08T10:30:45.000Z");
        assert_eq!(parsed["context"], 3);
        assert_eq!(parsed["latency_ms"], 42);
    }

    #[test]
    fn test_json_field_clashing_with_event_key() {
        let event = fixed_event().with_fields(
            EventFields::new()
                .with_field("level", "custom")
                .with_field("message", 7)
                .with_field("context", "billing"),
        );
        let result = JsonFormatter::new().format(&event).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["message"], "Request processed");
        assert!(parsed.get("context").is_none());
        assert_eq!(parsed["field_level"], "custom");
        assert_eq!(parsed["field_message"], 7);
        assert_eq!(parsed["field_context"], "billing");
    }

    #[test]
    fn test_json_numeric_timestamp() {
        let result = JsonFormatter::new()
            .with_timestamp_format(TimestampFormat::Unix)
            .format(&fixed_event())
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["timestamp"], 1736332245);
    }

    #[test]
    fn test_logfmt_format() {
        let event = fixed_event().with_fields(
            EventFields::new()
                .with_field("query", "SELECT * FROM users WHERE id=1")
                .with_field("count", 5),
        );
        let result = LogfmtFormatter::new().format(&event).unwrap();

        assert!(result.contains("level=INFO"));
        assert!(result.contains("message=\"Request processed\""));
        assert!(result.contains("count=5"));
        assert!(result.contains("query=\"SELECT * FROM users WHERE id=1\""));
    }

    #[test]
    fn test_context_deny() {
        let formatter = ContextFilterFormatter::deny([1, 2], MessageFormatter);
        assert!(formatter.format(&fixed_event().with_context(1)).is_none());
        assert_eq!(
            formatter.format(&fixed_event().with_context(9)).as_deref(),
            Some("Request processed")
        );
    }

    #[test]
    fn test_chain_formatter() {
        let chain = ChainFormatter::new()
            .then(|e: &LogEvent| Some(format!("<{}>", e.message())))
            .then(|e: &LogEvent| Some(e.message().to_uppercase()));
        assert_eq!(
            chain.format(&fixed_event()).as_deref(),
            Some("<REQUEST PROCESSED>")
        );

        let suppressed = ChainFormatter::new()
            .then(MessageFormatter)
            .then(ContextFilterFormatter::allow([5], MessageFormatter));
        assert!(suppressed.format(&fixed_event()).is_none());

        assert_eq!(
            ChainFormatter::new().format(&fixed_event()).as_deref(),
            Some("Request processed")
        );
    }
}
