//! Normalization of heterogeneous raw inputs into [`NormalizedError`].
//!
//! Hosts report errors as plain messages, caught failures with stacks, or
//! arbitrary structured payloads. Normalization flattens all three into the
//! canonical record and bounds the depth of free-form payload data so a
//! pathological input cannot balloon a queue entry.

use chrono::{DateTime, Utc};
use faultline_core::{ErrorId, Level, NormalizedError, StackFrame};
use serde_json::Value;

/// Maximum nesting depth retained in `extra` payload data.
pub const MAX_EXTRA_DEPTH: usize = 5;

const DEPTH_MARKER: &str = "[truncated]";

/// A raw error report before normalization.
#[derive(Debug, Clone)]
pub enum RawEvent {
    /// A bare message with a severity.
    Message {
        /// Report text.
        message: String,
        /// Severity.
        level: Level,
    },
    /// A caught failure with a kind and stack trace.
    Failure {
        /// Primary error message.
        message: String,
        /// Error kind or type name.
        kind: String,
        /// Stack frames, innermost first.
        stack: Vec<StackFrame>,
    },
    /// An arbitrary structured payload.
    ///
    /// Recognized fields: `message`, `kind` (or `type`), `level`. Everything
    /// else lands in `extra`, depth-bounded.
    Structured {
        /// Host-provided payload.
        payload: Value,
    },
}

impl RawEvent {
    /// Creates a message event at error severity.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message { message: message.into(), level: Level::Error }
    }

    /// Creates a caught-failure event.
    pub fn failure(
        message: impl Into<String>,
        kind: impl Into<String>,
        stack: Vec<StackFrame>,
    ) -> Self {
        Self::Failure { message: message.into(), kind: kind.into(), stack }
    }

    /// Creates a failure event from any error value.
    ///
    /// The source chain is appended to the message; callers who know a more
    /// specific kind than "Error" use [`failure`](Self::failure) directly.
    pub fn caught(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Failure { message, kind: "Error".to_string(), stack: Vec::new() }
    }
}

/// Normalizes a raw event into a canonical record captured at `timestamp`.
pub fn normalize(event: RawEvent, timestamp: DateTime<Utc>) -> NormalizedError {
    let mut error = NormalizedError {
        id: ErrorId::new(),
        message: String::new(),
        kind: "Error".to_string(),
        level: Level::Error,
        stack: Vec::new(),
        timestamp,
        tags: Default::default(),
        extra: Default::default(),
        breadcrumbs: Vec::new(),
        user: None,
    };

    match event {
        RawEvent::Message { message, level } => {
            error.message = message;
            error.level = level;
        },
        RawEvent::Failure { message, kind, stack } => {
            error.message = message;
            error.kind = kind;
            error.stack = stack;
        },
        RawEvent::Structured { payload } => normalize_structured(payload, &mut error),
    }

    error
}

fn normalize_structured(payload: Value, error: &mut NormalizedError) {
    let Value::Object(fields) = payload else {
        // Non-object payloads become the message verbatim.
        error.message = value_to_message(&payload);
        return;
    };

    for (key, value) in fields {
        match key.as_str() {
            "message" => error.message = value_to_message(&value),
            "kind" | "type" => {
                if let Value::String(kind) = value {
                    error.kind = kind;
                }
            },
            "level" => {
                if let Ok(level) = serde_json::from_value::<Level>(value) {
                    error.level = level;
                }
            },
            _ => {
                error.extra.insert(key, bound_depth(value, MAX_EXTRA_DEPTH));
            },
        }
    }

    if error.message.is_empty() {
        error.message = "unknown error".to_string();
    }
}

fn value_to_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Recursively truncates nesting deeper than `depth` levels.
fn bound_depth(value: Value, depth: usize) -> Value {
    match value {
        Value::Object(map) => {
            if depth == 0 {
                return Value::String(DEPTH_MARKER.to_string());
            }
            Value::Object(map.into_iter().map(|(k, v)| (k, bound_depth(v, depth - 1))).collect())
        },
        Value::Array(items) => {
            if depth == 0 {
                return Value::String(DEPTH_MARKER.to_string());
            }
            Value::Array(items.into_iter().map(|v| bound_depth(v, depth - 1)).collect())
        },
        scalar => scalar,
    }
}
