//! Adapter capability set implemented by provider bindings.
//!
//! An adapter is the bound implementation of one reporting backend
//! (console, Sentry, Raygun, ...). The core never interprets error
//! semantics; it hands fully normalized records to whichever adapter owns
//! the lane. Failure classification is signaled by the adapter, never
//! inferred here.

use std::collections::BTreeMap;

use async_trait::async_trait;
use faultline_core::{Breadcrumb, NormalizedError, UserIdentity};
use thiserror::Error;

/// Configuration handed to an adapter at activation time.
///
/// The core treats the contents as opaque; typical bindings read a DSN plus
/// backend-specific options.
#[derive(Debug, Clone, Default)]
pub struct AdapterConfig {
    /// Connection string / ingest endpoint, when the backend uses one.
    pub dsn: Option<String>,
    /// Backend-specific options.
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl AdapterConfig {
    /// Creates a config with only a DSN.
    pub fn with_dsn(dsn: impl Into<String>) -> Self {
        Self { dsn: Some(dsn.into()), options: serde_json::Map::new() }
    }
}

/// Ambient context forwarded to adapters outside of individual sends.
#[derive(Debug, Clone, Default)]
pub struct AdapterContext {
    /// Active user, if any.
    pub user: Option<UserIdentity>,
    /// Ambient tags.
    pub tags: BTreeMap<String, String>,
}

/// Per-delivery context handed to `send` alongside the record.
#[derive(Debug, Clone)]
pub struct SendContext {
    /// Queue item being delivered.
    pub item_id: faultline_core::ItemId,
    /// 1-based attempt number for this item.
    pub attempt_number: u32,
    /// When the item was originally enqueued.
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
}

/// Failure reported by an adapter `send`.
///
/// The adapter owns the transient/permanent distinction: the engine retries
/// transient failures with backoff and drops permanent ones immediately,
/// without consuming a retry slot.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// Temporary condition (network blip, backend outage). Retried.
    #[error("transient delivery failure: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// Backend throttling with explicit guidance. Retried after the given
    /// delay instead of the computed backoff.
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before the next attempt.
        retry_after_seconds: u64,
    },

    /// Retrying cannot succeed (malformed payload, auth failure). Dropped.
    #[error("permanent delivery failure: {message}")]
    Permanent {
        /// Description of the failure.
        message: String,
    },
}

impl SendError {
    /// Creates a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    /// Creates a rate-limit failure with retry guidance.
    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self::RateLimited { retry_after_seconds }
    }

    /// Creates a permanent failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent { message: message.into() }
    }

    /// Whether the engine should retry after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited { .. })
    }

    /// Backend-provided retry delay, if any.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_seconds } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

/// Failure reported by an adapter `initialize`.
#[derive(Debug, Clone, Error)]
#[error("adapter initialization failed: {message}")]
pub struct InitError {
    /// Description of the failure.
    pub message: String,
}

impl InitError {
    /// Creates an initialization failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Capability set of one reporting backend.
///
/// `send`, `set_context`, and `add_breadcrumb` are invoked only after
/// `initialize` has resolved successfully for the current activation.
#[async_trait]
pub trait Adapter: Send + Sync + std::fmt::Debug {
    /// Prepares the backend connection. Called exactly once per activation.
    async fn initialize(&self, config: AdapterConfig) -> Result<(), InitError>;

    /// Delivers one normalized record.
    async fn send(&self, error: &NormalizedError, context: &SendContext) -> Result<(), SendError>;

    /// Pushes ambient user/tag context to the backend.
    async fn set_context(&self, context: &AdapterContext) -> Result<(), SendError>;

    /// Forwards a breadcrumb to backends that track trails natively.
    async fn add_breadcrumb(&self, breadcrumb: &Breadcrumb) -> Result<(), SendError>;
}
