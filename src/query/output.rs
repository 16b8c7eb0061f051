//! Output pipeline: empty-value filtering, serialization and JSONP.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::{Error, Result};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// How a document is turned into a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub as_text: bool,
    pub compact: bool,
    pub filter: bool,
    pub callback: Option<String>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            as_text: false,
            compact: true,
            filter: false,
            callback: None,
        }
    }
}

/// A serialized document and the content type to send it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatted {
    pub body: String,
    pub content_type: &'static str,
}

fn callback_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z$_][a-zA-Z$0-9._]*$").expect("Invalid regex"))
}

/// Check a JSONP callback name. Anything but a dotted identifier is a
/// [`Error::MalformedQuery`].
pub fn validate_callback(callback: &str) -> Result<()> {
    if callback_pattern().is_match(callback) {
        Ok(())
    } else {
        Err(Error::MalformedQuery(format!("invalid JSONP callback {:?}", callback)))
    }
}

/// Whether `value` counts as empty for [`filter_out`].
///
/// Numbers are never empty: a result code of 0 means success.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

/// Recursively strip empty values.
///
/// Mapping entries whose filtered value is empty are dropped. A sequence
/// whose elements all filter to empty collapses to `null`, otherwise every
/// (filtered) element is kept.
pub fn filter_out(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let items: Vec<Value> = items.into_iter().map(filter_out).collect();
            if items.iter().all(is_empty) {
                Value::Null
            } else {
                Value::Array(items)
            }
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, filter_out(value)))
                .filter(|(_, value)| !is_empty(value))
                .collect(),
        ),
        other => other,
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Filter, serialize and optionally JSONP-wrap a document.
pub fn format(document: Value, options: &OutputOptions) -> Result<Formatted> {
    let document = if options.filter {
        filter_out(document)
    } else {
        document
    };
    let mut body = if options.compact {
        serde_json::to_string(&document)?
    } else {
        serde_json::to_string_pretty(&sort_keys(document))?
    };

    if let Some(ref callback) = options.callback {
        match validate_callback(callback) {
            Ok(()) => body = format!("{}({});", callback, body),
            Err(e) => tracing::warn!(error = %e, "ignoring JSONP callback"),
        }
    }

    let content_type = if options.as_text {
        CONTENT_TYPE_TEXT
    } else {
        CONTENT_TYPE_JSON
    };
    Ok(Formatted { body, content_type })
}
