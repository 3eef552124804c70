//! Scriptable mock adapter for exercising the delivery engine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use faultline_core::{Breadcrumb, NormalizedError};
use faultline_delivery::{Adapter, AdapterConfig, AdapterContext, InitError, SendContext, SendError};

/// Outcome a [`MockAdapter`] produces for one `send` call.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Delivery succeeds.
    Success,
    /// Delivery fails transiently with the given message.
    Transient(String),
    /// Delivery is rate limited with retry guidance in seconds.
    RateLimited(u64),
    /// Delivery fails permanently with the given message.
    Permanent(String),
    /// Delivery hangs forever, for exercising send timeouts.
    Hang,
}

#[derive(Debug, Default)]
struct MockState {
    init_failure: Option<String>,
    init_calls: u32,
    script: VecDeque<SendOutcome>,
    sends: Vec<(NormalizedError, SendContext)>,
    contexts: Vec<AdapterContext>,
    breadcrumbs: Vec<Breadcrumb>,
}

/// In-memory adapter with a scripted outcome queue and full call recording.
///
/// Scripted outcomes are consumed in order; once the script is exhausted
/// every further `send` succeeds. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    /// Creates an adapter that initializes and delivers successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter whose `initialize` rejects with the given message.
    pub fn failing_init(message: impl Into<String>) -> Self {
        let adapter = Self::new();
        adapter.state.lock().expect("mock state poisoned").init_failure = Some(message.into());
        adapter
    }

    /// Appends outcomes to the send script.
    pub fn script(&self, outcomes: impl IntoIterator<Item = SendOutcome>) -> &Self {
        self.state.lock().expect("mock state poisoned").script.extend(outcomes);
        self
    }

    /// Number of `initialize` calls so far.
    pub fn init_calls(&self) -> u32 {
        self.state.lock().expect("mock state poisoned").init_calls
    }

    /// Number of `send` calls so far.
    pub fn send_count(&self) -> usize {
        self.state.lock().expect("mock state poisoned").sends.len()
    }

    /// Every record and context passed to `send`, in call order.
    pub fn sends(&self) -> Vec<(NormalizedError, SendContext)> {
        self.state.lock().expect("mock state poisoned").sends.clone()
    }

    /// Every ambient context pushed via `set_context`, in call order.
    pub fn contexts(&self) -> Vec<AdapterContext> {
        self.state.lock().expect("mock state poisoned").contexts.clone()
    }

    /// Every breadcrumb forwarded via `add_breadcrumb`, in call order.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.state.lock().expect("mock state poisoned").breadcrumbs.clone()
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn initialize(&self, _config: AdapterConfig) -> Result<(), InitError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.init_calls += 1;
        match &state.init_failure {
            Some(message) => Err(InitError::new(message.clone())),
            None => Ok(()),
        }
    }

    async fn send(&self, error: &NormalizedError, context: &SendContext) -> Result<(), SendError> {
        let outcome = {
            let mut state = self.state.lock().expect("mock state poisoned");
            state.sends.push((error.clone(), context.clone()));
            state.script.pop_front().unwrap_or(SendOutcome::Success)
        };
        match outcome {
            SendOutcome::Success => Ok(()),
            SendOutcome::Transient(message) => Err(SendError::transient(message)),
            SendOutcome::RateLimited(seconds) => Err(SendError::rate_limited(seconds)),
            SendOutcome::Permanent(message) => Err(SendError::permanent(message)),
            SendOutcome::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            },
        }
    }

    async fn set_context(&self, context: &AdapterContext) -> Result<(), SendError> {
        self.state.lock().expect("mock state poisoned").contexts.push(context.clone());
        Ok(())
    }

    async fn add_breadcrumb(&self, breadcrumb: &Breadcrumb) -> Result<(), SendError> {
        self.state.lock().expect("mock state poisoned").breadcrumbs.push(breadcrumb.clone());
        Ok(())
    }
}
