//! Per-field serializers used by the event formatter.
//!
//! Each serializer is a pure function from a field value to its rendered
//! fragment. The table is built once at configuration time and looked up by
//! field name while formatting; a missing entry falls back to
//! [`default_stringify`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::Value;

pub const REQUEST_FIELD: &str = "req";
pub const RESPONSE_FIELD: &str = "res";
pub const RESPONSE_TIME_FIELD: &str = "responseTime";
pub const TAGS_FIELD: &str = "tags";
pub const MESSAGE_FIELD: &str = "data";

/// Rendering function for a single field.
pub type Serializer = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Field name → serializer lookup table.
#[derive(Clone, Default)]
pub struct SerializerTable {
    entries: HashMap<String, Serializer>,
}

impl SerializerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the gateway's standard `req`, `res`, `tags` and
    /// `responseTime` serializers.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.insert(REQUEST_FIELD, serialize_request);
        table.insert(RESPONSE_FIELD, serialize_response);
        table.insert(TAGS_FIELD, serialize_tags);
        table.insert(RESPONSE_TIME_FIELD, serialize_response_time);
        table
    }

    pub fn insert<F>(&mut self, field: &str, serializer: F)
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.entries.insert(field.to_string(), Arc::new(serializer));
    }

    pub fn remove(&mut self, field: &str) -> Option<Serializer> {
        self.entries.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&Serializer> {
        self.entries.get(field)
    }

    /// Renders `value` with the registered serializer, or the default
    /// stringification when none is registered.
    pub fn render(&self, field: &str, value: &Value) -> String {
        match self.get(field) {
            Some(serializer) => serializer(value),
            None => default_stringify(value),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for SerializerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fields: Vec<&String> = self.entries.keys().collect();
        fields.sort();
        f.debug_struct("SerializerTable").field("fields", &fields).finish()
    }
}

/// Strings render verbatim, `null` renders empty, everything else as compact JSON.
pub fn default_stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `METHOD host path`, method uppercased. `host` may sit at the top level or
/// under `headers.host`.
pub fn serialize_request(value: &Value) -> String {
    let method = value
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_uppercase();
    let host = value
        .get("host")
        .and_then(Value::as_str)
        .or_else(|| value.pointer("/headers/host").and_then(Value::as_str))
        .unwrap_or("-");
    let url = value.get("url").and_then(Value::as_str).unwrap_or("-");
    format!("{} {} {}", method, host, url)
}

/// `statusCode statusMessage`. Falls back to the canonical reason phrase
/// when no message was recorded.
pub fn serialize_response(value: &Value) -> String {
    let code = value.get("statusCode").and_then(Value::as_u64);
    let message = value
        .get("statusMessage")
        .and_then(Value::as_str)
        .or_else(|| value.pointer("/raw/statusMessage").and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| {
            code.and_then(|c| u16::try_from(c).ok())
                .and_then(|c| StatusCode::from_u16(c).ok())
                .and_then(|status| status.canonical_reason())
                .map(str::to_string)
        });

    match (code, message) {
        (Some(code), Some(message)) => format!("{} {}", code, message),
        (Some(code), None) => code.to_string(),
        (None, Some(message)) => format!("- {}", message),
        (None, None) => "-".to_string(),
    }
}

/// `[a,b,c]`
pub fn serialize_tags(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let joined = items
                .iter()
                .map(default_stringify)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{}]", joined)
        }
        other => format!("[{}]", default_stringify(other)),
    }
}

/// `<n>ms`
pub fn serialize_response_time(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(ms) => format!("{}ms", ms),
            None => format!("{}ms", n),
        },
        other => format!("{}ms", default_stringify(other)),
    }
}
