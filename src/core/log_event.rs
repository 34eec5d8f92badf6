//! Log event structure

use super::fields::EventFields;
use super::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::cell::RefCell;

// Thread-local caches for thread information to avoid repeated allocations
thread_local! {
    static THREAD_ID_CACHE: RefCell<Option<String>> = const { RefCell::new(None) };
    static THREAD_NAME_CACHE: RefCell<Option<Option<String>>> = const { RefCell::new(None) };
}

fn current_thread_id() -> String {
    THREAD_ID_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| format!("{:?}", std::thread::current().id()))
            .clone()
    })
}

fn current_thread_name() -> Option<String> {
    THREAD_NAME_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| std::thread::current().name().map(String::from))
            .clone()
    })
}

fn sanitized<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(LogEvent::sanitize_message(&raw))
}

fn sanitized_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|s| LogEvent::sanitize_message(&s)))
}

/// One log occurrence
///
/// Built at the call site with [`LogEvent::new`] and the `with_*` methods,
/// then handed to the dispatcher. The dispatcher shares a single instance
/// between all sinks, so there are no mutating accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    severity: Severity,
    #[serde(deserialize_with = "sanitized")]
    message: String,
    timestamp: DateTime<Utc>,
    file: Option<String>,
    line: Option<u32>,
    function: Option<String>,
    module_path: Option<String>,
    #[serde(deserialize_with = "sanitized")]
    queue_label: String,
    thread_id: String,
    context: i32,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "sanitized_opt"
    )]
    tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<EventFields>,
}

impl LogEvent {
    /// Sanitize log message to prevent log injection attacks
    ///
    /// Replaces newlines, carriage returns, and tabs with escape sequences
    /// so one event always renders as one line.
    fn sanitize_message(message: &str) -> String {
        message
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }

    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        let thread_id = current_thread_id();
        let queue_label = current_thread_name()
            .map(|name| Self::sanitize_message(&name))
            .unwrap_or_else(|| thread_id.clone());
        Self {
            severity,
            message: Self::sanitize_message(&message.into()),
            timestamp: Utc::now(),
            file: None,
            line: None,
            function: None,
            module_path: None,
            queue_label,
            thread_id,
            context: 0,
            tag: None,
            fields: None,
        }
    }

    pub fn with_location(mut self, file: &str, line: u32, module_path: &str) -> Self {
        self.file = Some(file.to_string());
        self.line = Some(line);
        self.module_path = Some(module_path.to_string());
        self
    }

    pub fn with_function(mut self, function: &str) -> Self {
        self.function = Some(function.to_string());
        self
    }

    /// Override the capture time (replaying or testing)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_queue_label(mut self, label: impl Into<String>) -> Self {
        self.queue_label = Self::sanitize_message(&label.into());
        self
    }

    /// Numeric context, matched by [`ContextFilterFormatter`](crate::ContextFilterFormatter)
    pub fn with_context(mut self, context: i32) -> Self {
        self.context = context;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(Self::sanitize_message(&tag.into()));
        self
    }

    pub fn with_fields(mut self, fields: EventFields) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Copy of this event carrying a different message
    ///
    /// Used by chained formatters; the message is taken verbatim.
    pub fn with_message(&self, message: impl Into<String>) -> Self {
        let mut event = self.clone();
        event.message = message.into();
        event
    }

    #[inline]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// File name without its directory
    pub fn file_name(&self) -> Option<&str> {
        self.file
            .as_deref()
            .map(|f| f.rsplit(['/', '\\']).next().unwrap_or(f))
    }

    pub fn line(&self) -> Option<u32> {
        self.line
    }

    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }

    pub fn module_path(&self) -> Option<&str> {
        self.module_path.as_deref()
    }

    pub fn queue_label(&self) -> &str {
        &self.queue_label
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn context(&self) -> i32 {
        self.context
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn fields(&self) -> Option<&EventFields> {
        self.fields.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sanitizes_message() {
        let event = LogEvent::new(Severity::Info, "line one\nline two\tend");
        assert_eq!(event.message(), "line one\\nline two\\tend");
    }

    #[test]
    fn test_tag_and_label_sanitized() {
        use crate::core::formatter::{LogFormatter, TextFormatter};

        let event = LogEvent::new(Severity::Info, "login")
            .with_tag("auth\nERROR forged")
            .with_queue_label("main\r\nINFO forged");
        assert_eq!(event.tag(), Some("auth\\nERROR forged"));
        assert_eq!(event.queue_label(), "main\\r\\nINFO forged");

        let line = TextFormatter::new().with_tag(true).format(&event).unwrap();
        assert_eq!(line.lines().count(), 1);
    }

    #[test]
    fn test_deserialized_event_sanitized() {
        let event = LogEvent::new(Severity::Warn, "clean").with_tag("net");
        let mut value = serde_json::to_value(&event).unwrap();
        value["message"] = "a\nb".into();
        value["queue_label"] = "q\tr".into();
        value["tag"] = "x\ny".into();

        let restored: LogEvent = serde_json::from_value(value).unwrap();
        assert_eq!(restored.message(), "a\\nb");
        assert_eq!(restored.queue_label(), "q\\tr");
        assert_eq!(restored.tag(), Some("x\\ny"));
    }

    #[test]
    fn test_queue_label_defaults_to_thread_name() {
        let handle = std::thread::Builder::new()
            .name("worker-7".to_string())
            .spawn(|| LogEvent::new(Severity::Debug, "x"))
            .unwrap();
        let event = handle.join().unwrap();
        assert_eq!(event.queue_label(), "worker-7");
    }

    #[test]
    fn test_file_name_strips_directories() {
        let event = LogEvent::new(Severity::Info, "x").with_location("src/net/conn.rs", 10, "app::net");
        assert_eq!(event.file_name(), Some("conn.rs"));
        assert_eq!(event.line(), Some(10));
        assert_eq!(event.module_path(), Some("app::net"));
    }

    #[test]
    fn test_with_message_keeps_metadata() {
        let event = LogEvent::new(Severity::Warn, "original")
            .with_context(7)
            .with_tag("net");
        let copy = event.with_message("rendered");
        assert_eq!(copy.message(), "rendered");
        assert_eq!(copy.context(), 7);
        assert_eq!(copy.tag(), Some("net"));
        assert_eq!(copy.timestamp(), event.timestamp());
        assert_eq!(event.message(), "original");
    }
}
