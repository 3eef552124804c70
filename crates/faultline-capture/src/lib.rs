//! Host-facing capture pipeline for Faultline.
//!
//! Turns raw error reports into normalized records, merges ambient scope,
//! applies the pre-send filter, and hands accepted records to the queue for
//! asynchronous delivery. Nothing in this crate surfaces an error to the
//! capturing caller.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod normalize;
pub mod pipeline;

pub use normalize::{normalize, RawEvent, MAX_EXTRA_DEPTH};
pub use pipeline::{BeforeSend, CaptureConfig, CapturePipeline, ContextOverrides};
