//! Ambient capture scope: user identity, tags, and the breadcrumb trail.
//!
//! The scope is an explicitly owned object handed to the capture pipeline,
//! not a global. State changes only through explicit calls (`set_user`,
//! `add_breadcrumb`, `reset`); nothing expires implicitly. The breadcrumb
//! trail is a bounded ring, oldest evicted on overflow.

use std::{collections::BTreeMap, collections::VecDeque, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::Result,
    models::{Breadcrumb, UserIdentity},
    storage::kv::{self, keys, KeyValueStore},
};

/// Default breadcrumb ring capacity.
pub const DEFAULT_MAX_BREADCRUMBS: usize = 50;

/// Persisted scope blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ScopeRecord {
    user: Option<UserIdentity>,
    tags: BTreeMap<String, String>,
    breadcrumbs: VecDeque<Breadcrumb>,
}

/// Frozen copy of the scope, merged into a record at capture time.
#[derive(Debug, Clone, Default)]
pub struct ScopeSnapshot {
    /// Current user, if set.
    pub user: Option<UserIdentity>,
    /// Current tags.
    pub tags: BTreeMap<String, String>,
    /// Breadcrumb trail, oldest first.
    pub breadcrumbs: Vec<Breadcrumb>,
}

/// Process-wide capture scope with best-effort persistence.
#[derive(Debug)]
pub struct ScopeStore {
    store: Arc<dyn KeyValueStore>,
    max_breadcrumbs: usize,
    state: tokio::sync::Mutex<ScopeRecord>,
}

impl ScopeStore {
    /// Creates an empty scope over the given backend.
    pub fn new(store: Arc<dyn KeyValueStore>, max_breadcrumbs: usize) -> Self {
        Self { store, max_breadcrumbs, state: tokio::sync::Mutex::new(ScopeRecord::default()) }
    }

    /// Restores persisted scope state. Corrupt records start fresh.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the backend read itself fails.
    pub async fn load(&self) -> Result<()> {
        let record = match kv::load_json::<ScopeRecord>(self.store.as_ref(), keys::SCOPE).await {
            Ok(record) => record.unwrap_or_default(),
            Err(crate::error::CoreError::Serialization(e)) => {
                warn!(error = %e, "discarding corrupt scope record");
                ScopeRecord::default()
            },
            Err(e) => return Err(e),
        };
        *self.state.lock().await = record;
        Ok(())
    }

    /// Sets or clears the active user.
    pub async fn set_user(&self, user: Option<UserIdentity>) {
        let mut state = self.state.lock().await;
        state.user = user.filter(|u| !u.is_empty());
        self.persist(&state).await;
    }

    /// Sets one tag. Later values overwrite earlier ones.
    pub async fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.tags.insert(key.into(), value.into());
        self.persist(&state).await;
    }

    /// Removes one tag.
    pub async fn remove_tag(&self, key: &str) {
        let mut state = self.state.lock().await;
        if state.tags.remove(key).is_some() {
            self.persist(&state).await;
        }
    }

    /// Appends a breadcrumb, evicting the oldest past the ring capacity.
    pub async fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        let mut state = self.state.lock().await;
        state.breadcrumbs.push_back(breadcrumb);
        while state.breadcrumbs.len() > self.max_breadcrumbs {
            state.breadcrumbs.pop_front();
        }
        self.persist(&state).await;
    }

    /// Clears user, tags, and breadcrumbs.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = ScopeRecord::default();
        self.persist(&state).await;
    }

    /// Freezes the current scope for merging into a record.
    pub async fn snapshot(&self) -> ScopeSnapshot {
        let state = self.state.lock().await;
        ScopeSnapshot {
            user: state.user.clone(),
            tags: state.tags.clone(),
            breadcrumbs: state.breadcrumbs.iter().cloned().collect(),
        }
    }

    /// Replaces the scope wholesale. Used by import.
    pub(crate) async fn replace(&self, snapshot: ScopeSnapshot) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = ScopeRecord {
            user: snapshot.user,
            tags: snapshot.tags,
            breadcrumbs: snapshot.breadcrumbs.into_iter().collect(),
        };
        kv::store_json(self.store.as_ref(), keys::SCOPE, &*state).await
    }

    async fn persist(&self, state: &ScopeRecord) {
        if let Err(e) = kv::store_json(self.store.as_ref(), keys::SCOPE, state).await {
            warn!(error = %e, "scope persist failed, continuing in-memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{models::Level, storage::kv::MemoryStore};

    fn crumb(message: &str) -> Breadcrumb {
        Breadcrumb {
            timestamp: Utc::now(),
            category: "test".to_string(),
            message: message.to_string(),
            level: Level::Info,
            data: None,
        }
    }

    #[tokio::test]
    async fn breadcrumb_ring_evicts_oldest() {
        let scope = ScopeStore::new(Arc::new(MemoryStore::new()), 3);

        for i in 0..5 {
            scope.add_breadcrumb(crumb(&format!("crumb-{i}"))).await;
        }

        let snapshot = scope.snapshot().await;
        assert_eq!(snapshot.breadcrumbs.len(), 3);
        assert_eq!(snapshot.breadcrumbs[0].message, "crumb-2");
        assert_eq!(snapshot.breadcrumbs[2].message, "crumb-4");
    }

    #[tokio::test]
    async fn empty_user_is_treated_as_clear() {
        let scope = ScopeStore::new(Arc::new(MemoryStore::new()), 10);

        scope.set_user(Some(UserIdentity::default())).await;
        assert!(scope.snapshot().await.user.is_none());

        scope.set_user(Some(UserIdentity { id: Some("u-1".into()), ..Default::default() })).await;
        assert_eq!(scope.snapshot().await.user.unwrap().id.as_deref(), Some("u-1"));
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let scope = ScopeStore::new(Arc::new(MemoryStore::new()), 10);
        scope.set_tag("env", "prod").await;
        scope.add_breadcrumb(crumb("x")).await;
        scope.set_user(Some(UserIdentity { id: Some("u".into()), ..Default::default() })).await;

        scope.reset().await;

        let snapshot = scope.snapshot().await;
        assert!(snapshot.user.is_none());
        assert!(snapshot.tags.is_empty());
        assert!(snapshot.breadcrumbs.is_empty());
    }

    #[tokio::test]
    async fn scope_survives_reload() {
        let store = Arc::new(MemoryStore::new());
        let scope = ScopeStore::new(store.clone(), 10);
        scope.set_tag("release", "1.2.3").await;
        scope.add_breadcrumb(crumb("persisted")).await;

        let restored = ScopeStore::new(store, 10);
        restored.load().await.expect("load should succeed");

        let snapshot = restored.snapshot().await;
        assert_eq!(snapshot.tags.get("release").map(String::as_str), Some("1.2.3"));
        assert_eq!(snapshot.breadcrumbs.len(), 1);
    }
}
