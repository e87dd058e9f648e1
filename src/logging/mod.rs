//! Tag-categorized event logging.
//!
//! Events are created per log call, rendered into a single line by the
//! [`formatter`], and handed to a [`LogSink`]. Nothing is persisted.

pub mod formatter;
pub mod serializers;
pub mod sink;
pub mod telemetry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use formatter::{format, FormatterConfig, MessageTemplate};
pub use serializers::{SerializerTable, REQUEST_FIELD, RESPONSE_FIELD, RESPONSE_TIME_FIELD};
pub use sink::{ConsoleSink, LogSink, MemorySink, TracingSink};

/// Severity derived from an event's tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// First tag naming a level wins; events without one are `Info`.
    pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> Self {
        tags.iter()
            .find_map(|tag| Self::from_tag(tag.as_ref()))
            .unwrap_or(LogLevel::Info)
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            "fatal" => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

/// Inbound request summary attached to an event under `req`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub url: String,
}

impl RequestInfo {
    pub fn new(method: &str, host: Option<&str>, url: &str) -> Self {
        Self {
            method: method.to_string(),
            host: host.map(str::to_string),
            url: url.to_string(),
        }
    }
}

/// Outgoing response summary attached to an event under `res`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl ResponseInfo {
    pub fn new(status_code: u16, status_message: Option<&str>) -> Self {
        Self {
            status_code,
            status_message: status_message.map(str::to_string),
        }
    }
}

/// A structured, tag-categorized log record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: DateTime<FixedOffset>,
    pub tags: Vec<String>,
    pub message: String,
    pub fields: BTreeMap<String, Value>,
}

impl LogEvent {
    pub fn new<S: AsRef<str>>(tags: &[S], message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().fixed_offset(),
            tags: tags.iter().map(|t| t.as_ref().to_string()).collect(),
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_request(self, request: RequestInfo) -> Self {
        let value = serde_json::to_value(request).unwrap_or(Value::Null);
        self.with_field(REQUEST_FIELD, value)
    }

    pub fn with_response(self, response: ResponseInfo) -> Self {
        let value = serde_json::to_value(response).unwrap_or(Value::Null);
        self.with_field(RESPONSE_FIELD, value)
    }

    pub fn with_response_time(self, elapsed: Duration) -> Self {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.with_field(RESPONSE_TIME_FIELD, millis)
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_tags(&self.tags)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Formats events and writes them to a sink. Cheap to clone.
#[derive(Clone)]
pub struct Logger {
    formatter: Arc<FormatterConfig>,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(formatter: FormatterConfig, sink: Arc<dyn LogSink>) -> Self {
        Self {
            formatter: Arc::new(formatter),
            sink,
        }
    }

    pub fn emit(&self, event: &LogEvent) {
        let line = self.formatter.format(event);
        self.sink.write(event.level(), &line);
    }

    pub fn log<S: AsRef<str>>(&self, tags: &[S], message: impl Into<String>) {
        self.emit(&LogEvent::new(tags, message));
    }

    pub fn formatter(&self) -> &FormatterConfig {
        &self.formatter
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("formatter", &self.formatter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_from_tags() {
        assert_eq!(LogLevel::from_tags(&["startup", "info"]), LogLevel::Info);
        assert_eq!(LogLevel::from_tags(&["shutdown", "warn"]), LogLevel::Warn);
        assert_eq!(LogLevel::from_tags(&["startup", "error"]), LogLevel::Error);
        assert_eq!(LogLevel::from_tags(&["request"]), LogLevel::Info);
        assert_eq!(LogLevel::from_tags::<&str>(&[]), LogLevel::Info);
    }

    #[test]
    fn request_and_response_use_wire_field_names() {
        let event = LogEvent::new(&["request"], "request completed")
            .with_request(RequestInfo::new("get", Some("x.test"), "/a"))
            .with_response(ResponseInfo::new(200, Some("OK")))
            .with_response_time(Duration::from_millis(7));

        assert_eq!(event.fields["req"]["method"], "get");
        assert_eq!(event.fields["res"]["statusCode"], 200);
        assert_eq!(event.fields["res"]["statusMessage"], "OK");
        assert_eq!(event.fields["responseTime"], 7);
    }

    #[test]
    fn logger_writes_formatted_line_to_sink() {
        let sink = MemorySink::new();
        let logger = Logger::new(FormatterConfig::plain(), Arc::new(sink.clone()));

        logger.log(&["startup", "info"], "ready");
        logger.log(&["startup", "error"], "boom");

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO: [startup,info] ready"));
        assert!(lines[1].ends_with("ERROR: [startup,error] boom"));
        assert_eq!(sink.levels(), vec![LogLevel::Info, LogLevel::Error]);
    }
}
