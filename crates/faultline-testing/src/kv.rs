//! Fault-injecting key-value backend for degradation testing.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};

use async_trait::async_trait;
use faultline_core::{CoreError, KeyValueStore, MemoryStore, Result};

/// Key-value store wrapper that injects persistence failures on demand.
///
/// Wraps a [`MemoryStore`] and fails reads or writes while the matching flag
/// is set, for asserting that callers degrade to in-memory operation instead
/// of surfacing errors. Clones share flags and backing data.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    write_failures: Arc<AtomicU32>,
}

impl FlakyStore {
    /// Creates a store that behaves normally until a failure flag is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts or stops failing `get` calls.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Starts or stops failing `set` and `remove` calls.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of writes rejected so far.
    pub fn write_failures(&self) -> u32 {
        self.write_failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CoreError::persistence("injected read failure"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.write_failures.fetch_add(1, Ordering::SeqCst);
            return Err(CoreError::persistence("injected write failure"));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.write_failures.fetch_add(1, Ordering::SeqCst);
            return Err(CoreError::persistence("injected write failure"));
        }
        self.inner.remove(key).await
    }
}
