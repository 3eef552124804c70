//! Core domain models and durable stores for the Faultline telemetry core.
//!
//! Provides the canonical error record, the bounded persistent retry queue,
//! ambient capture scope, counters, and the key-value persistence capability
//! the host supplies. The delivery and capture crates build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    Breadcrumb, ErrorId, ItemId, Level, Metrics, NormalizedError, Provider, QueueItem, QueueStats,
    StackFrame, UserIdentity,
};
pub use storage::{ExportData, KeyValueStore, MemoryStore, QueueConfig, Settings, Storage};
pub use time::{Clock, RealClock, TestClock};
