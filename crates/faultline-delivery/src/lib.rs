//! Delivery engine, adapter registry, and retry policy for Faultline.
//!
//! This crate owns everything between the persistent queue and the provider
//! backends: the [`Adapter`] capability set, the [`AdapterRegistry`] tracking
//! which adapter is current, the [`RetryPolicy`] computing backoff schedules,
//! and the [`DeliveryEngine`] draining queue lanes to adapters.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod engine;
pub mod error;
pub mod registry;
pub mod retry;

pub use adapter::{Adapter, AdapterConfig, AdapterContext, InitError, SendContext, SendError};
pub use engine::{DeliveryConfig, DeliveryEngine, DrainHandle};
pub use error::{DeliveryError, Result};
pub use registry::AdapterRegistry;
pub use retry::{RetryDecision, RetryPolicy};
