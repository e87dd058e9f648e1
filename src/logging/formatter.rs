//! Single-line rendering of [`LogEvent`]s.
//!
//! Output shape:
//!
//! ```text
//! [2024-05-01T10:00:00+09:00] INFO: [startup,info] ready GET x.test /a 200 OK 3ms
//! ```
//!
//! The body after the level label comes from a [`MessageTemplate`]
//! (default `{tags} {data} {req} {res} {responseTime}`). Placeholders whose
//! field is absent or excluded are dropped, never reported as an error.
//! Fields the template does not reference are not rendered.

use std::collections::BTreeSet;
use std::fmt::Write;

use colored::Colorize;
use serde_json::Value;

use super::serializers::{SerializerTable, MESSAGE_FIELD, TAGS_FIELD};
use super::{LogEvent, LogLevel};

pub const DEFAULT_MESSAGE_FORMAT: &str = "{tags} {data} {req} {res} {responseTime}";
pub const DEFAULT_TRANSLATE_TIME: &str = "%Y-%m-%dT%H:%M:%S%:z";
pub const DEFAULT_IGNORE: &[&str] = &["pid", "hostname"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A message format parsed into literal and placeholder segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    segments: Vec<Segment>,
}

impl MessageTemplate {
    /// Parses `{name}` placeholders. An unterminated `{` is kept as literal text.
    pub fn parse(format: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = format;

        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) if !after[..close].contains('{') => {
                    literal.push_str(&rest[..open]);
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(after[..close].trim().to_string()));
                    rest = &after[close + 1..];
                }
                _ => {
                    literal.push_str(&rest[..=open]);
                    rest = after;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    /// Field names referenced by the template, in order of appearance.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::parse(DEFAULT_MESSAGE_FORMAT)
    }
}

/// Formatter configuration: serializers, template, color and timestamp
/// settings, and the field-exclusion list.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    pub colorize: bool,
    pub template: MessageTemplate,
    /// `chrono` strftime pattern for the timestamp prefix.
    pub translate_time: String,
    /// Fields excluded from rendering even when the template names them.
    pub ignore: BTreeSet<String>,
    pub serializers: SerializerTable,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            colorize: true,
            template: MessageTemplate::default(),
            translate_time: DEFAULT_TRANSLATE_TIME.to_string(),
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
            serializers: SerializerTable::standard(),
        }
    }
}

impl FormatterConfig {
    pub fn plain() -> Self {
        Self {
            colorize: false,
            ..Self::default()
        }
    }

    pub fn with_template(mut self, format: &str) -> Self {
        self.template = MessageTemplate::parse(format);
        self
    }

    pub fn with_serializer<F>(mut self, field: &str, serializer: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.serializers.insert(field, serializer);
        self
    }

    pub fn with_ignore<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Renders `event` as one line. Never fails.
    pub fn format(&self, event: &LogEvent) -> String {
        let level = LogLevel::from_tags(&event.tags);
        let mut timestamp = String::new();
        if write!(timestamp, "{}", event.timestamp.format(&self.translate_time)).is_err() {
            timestamp = event.timestamp.to_rfc3339();
        }
        let label = if self.colorize {
            level.colored_label()
        } else {
            level.label().to_string()
        };

        let body = self.render_body(event);
        if body.is_empty() {
            format!("[{}] {}:", timestamp, label)
        } else {
            format!("[{}] {}: {}", timestamp, label, body)
        }
    }

    fn render_body(&self, event: &LogEvent) -> String {
        let mut out = String::new();
        for segment in &self.template.segments {
            match segment {
                Segment::Literal(text) => {
                    // an absent placeholder leaves two separators side by side
                    if out.ends_with(' ') && text.starts_with(' ') {
                        out.push_str(&text[1..]);
                    } else {
                        out.push_str(text);
                    }
                }
                Segment::Field(name) => {
                    if let Some(rendered) = self.render_field(event, name) {
                        out.push_str(&rendered);
                    }
                }
            }
        }
        out.trim().to_string()
    }

    fn render_field(&self, event: &LogEvent, name: &str) -> Option<String> {
        if self.ignore.contains(name) {
            return None;
        }
        let value = match name {
            TAGS_FIELD => Value::from(event.tags.clone()),
            MESSAGE_FIELD => Value::from(event.message.clone()),
            other => event.fields.get(other)?.clone(),
        };
        let rendered = single_line(&self.serializers.render(name, &value));
        if rendered.is_empty() {
            None
        } else {
            Some(rendered)
        }
    }
}

/// Convenience wrapper around [`FormatterConfig::format`].
pub fn format(event: &LogEvent, config: &FormatterConfig) -> String {
    config.format(event)
}

fn single_line(text: &str) -> String {
    if text.contains(['\n', '\r']) {
        text.replace('\r', "\\r").replace('\n', "\\n")
    } else {
        text.to_string()
    }
}

impl LogLevel {
    fn colored_label(self) -> String {
        let label = self.label();
        match self {
            LogLevel::Trace => label.bright_black().to_string(),
            LogLevel::Debug => label.blue().to_string(),
            LogLevel::Info => label.green().to_string(),
            LogLevel::Warn => label.yellow().to_string(),
            LogLevel::Error => label.red().to_string(),
            LogLevel::Fatal => label.on_red().to_string(),
        }
    }
}
