//! Core domain models and strongly-typed identifiers.
//!
//! Defines the canonical error record, queue items, and newtype ID wrappers
//! for compile-time type safety. Records are immutable once enqueued; only
//! the retry counter of a queue item changes over its lifetime, and only
//! through the queue store.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Strongly-typed identifier of a captured error record.
///
/// Wraps a UUID to prevent mixing with queue item IDs. Assigned at capture
/// time and stable across retries and export/import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorId(pub Uuid);

impl ErrorId {
    /// Creates a new random error ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ErrorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ErrorId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Strongly-typed identifier of a queued delivery item.
///
/// Generated at enqueue time. One error record enqueued twice yields two
/// distinct item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Creates a new random item ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ItemId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Name of a reporting backend ("sentry", "raygun", ...).
///
/// Queue items are tagged with the provider that was current at capture
/// time, so previously queued items keep draining to their original backend
/// after the active adapter changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Provider(pub String);

impl Provider {
    /// Returns the provider name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Provider {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Provider {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Severity of a captured record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Verbose diagnostic detail.
    Debug,
    /// Informational breadcrumb-grade event.
    Info,
    /// Something unexpected but recoverable.
    Warning,
    /// An application error.
    Error,
    /// The application cannot continue.
    Fatal,
}

impl Default for Level {
    fn default() -> Self {
        Self::Error
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// One frame of a captured stack trace, innermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Function or method name.
    pub function: String,
    /// Source file, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file: Option<String>,
    /// 1-based line number, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub line: Option<u32>,
    /// 1-based column number, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub column: Option<u32>,
}

impl StackFrame {
    /// Creates a frame with only a function name.
    pub fn named(function: impl Into<String>) -> Self {
        Self { function: function.into(), file: None, line: None, column: None }
    }
}

/// A timestamped diagnostic event preceding an error.
///
/// Breadcrumbs live in a bounded ring; the trail current at capture time is
/// frozen into the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Grouping category ("http", "navigation", "console", ...).
    pub category: String,
    /// Human-readable description.
    pub message: String,
    /// Severity of the breadcrumb itself.
    pub level: Level,
    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,
}

/// Identity of the user active when the error was captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable user identifier.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    /// Email address, if known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
    /// Display or login name, if known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub username: Option<String>,
}

impl UserIdentity {
    /// True when no identifying field is set.
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.email.is_none() && self.username.is_none()
    }
}

/// Canonical error record produced by the capture pipeline.
///
/// Immutable once enqueued. Everything an adapter needs to report the error
/// is embedded here; adapters receive the record as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedError {
    /// Unique record identifier.
    pub id: ErrorId,
    /// Primary error message.
    pub message: String,
    /// Error kind or type name ("TypeError", "io::Error", ...).
    pub kind: String,
    /// Severity.
    pub level: Level,
    /// Stack frames, innermost first. Empty when unavailable.
    pub stack: Vec<StackFrame>,
    /// When the error was captured.
    pub timestamp: DateTime<Utc>,
    /// Indexed key/value annotations.
    pub tags: BTreeMap<String, String>,
    /// Free-form structured payload, depth-bounded at capture time.
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Breadcrumb trail frozen at capture time, oldest first.
    pub breadcrumbs: Vec<Breadcrumb>,
    /// User active at capture time, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user: Option<UserIdentity>,
}

/// One pending delivery, owned by the queue store.
///
/// `retry_count` is monotonically non-decreasing until the item is removed;
/// the delivery engine mutates it only through
/// [`QueueStore::update_retry_count`](crate::storage::QueueStore::update_retry_count).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique item identifier, generated at enqueue time.
    pub id: ItemId,
    /// The record to deliver.
    pub error: NormalizedError,
    /// Lane this item drains to.
    pub provider: Provider,
    /// Completed failed attempts so far.
    pub retry_count: u32,
    /// When the item was enqueued.
    pub created_at: DateTime<Utc>,
    /// Earliest next attempt imposed by the backend (rate-limit guidance).
    /// When set it overrides the computed backoff schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
}

/// Process-wide delivery counters.
///
/// All counters are monotonic; `total_errors` counts records accepted by the
/// capture pipeline (filter-vetoed records are not counted anywhere).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Records accepted and enqueued.
    pub total_errors: u64,
    /// Records delivered to an adapter.
    pub successful_errors: u64,
    /// Failed delivery attempts (each transient failure counts once).
    pub failed_errors: u64,
    /// Records lost: retries exhausted, permanent rejection, eviction, or
    /// oversize rejection.
    pub dropped_errors: u64,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Number of pending items across all lanes.
    pub item_count: usize,
    /// Serialized size of the queue record in bytes.
    pub byte_size: usize,
    /// Creation time of the oldest pending item.
    pub oldest_timestamp: Option<DateTime<Utc>>,
}
