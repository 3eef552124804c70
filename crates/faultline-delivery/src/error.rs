//! Error types for the delivery engine and adapter registry.

use faultline_core::Provider;
use thiserror::Error;

/// Errors surfaced by registry and engine operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Activating an adapter failed during its `initialize` call.
    #[error("failed to initialize adapter '{name}': {message}")]
    AdapterInit {
        /// Registered adapter name.
        name: Provider,
        /// Failure reported by the adapter.
        message: String,
    },

    /// An operation named a provider with no registered adapter.
    #[error("no adapter registered for provider '{0}'")]
    UnknownProvider(Provider),

    /// The engine did not drain in-flight work within the shutdown window.
    #[error("shutdown timed out after {elapsed_ms}ms")]
    ShutdownTimeout {
        /// Time spent waiting before giving up.
        elapsed_ms: u64,
    },
}

impl DeliveryError {
    /// Creates an adapter initialization error.
    pub fn adapter_init(name: Provider, message: impl Into<String>) -> Self {
        Self::AdapterInit { name, message: message.into() }
    }
}

/// Convenience alias for delivery results.
pub type Result<T> = std::result::Result<T, DeliveryError>;
