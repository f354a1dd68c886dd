//! Registry of locally authenticated users and the "current user" designation.
//!
//! The store is an explicitly constructed handle: clone it and hand it to
//! whatever needs to act on behalf of a user. Every clone shares the same
//! records and the same active designation.
//!
//! Activation rules:
//! - `activate(id)` designates a stored user; unknown ids leave state untouched.
//! - `current()` with nobody active promotes one stored user. Which one is the
//!   store's choice and not caller-controlled, but once promoted the same user
//!   is returned until something changes the designation.
//! - `add_or_replace` never changes the designation.
//! - `remove` of the active user clears the designation without promoting.
//!
//! Mutations are serialized end to end: the persistence write of one mutation
//! completes before the next mutation touches memory, so storage sees them in
//! the same order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::credentials::CredentialRecord;
use super::persistence::CredentialPersistence;
use super::session::Session;
use crate::api::ApiClient;

/// Request behavior for one activation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct SessionOptions {
    /// Start requests as soon as they are constructed. When false, requests
    /// are handed back dormant and the caller starts them.
    pub start_all_requests_immediately: bool,
    /// Serve cacheable reads from the local cache even past their lifetime,
    /// and never evict while set.
    pub offline_mode: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            start_all_requests_immediately: true,
            offline_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Activation {
    user_id: u64,
    options: SessionOptions,
}

#[derive(Default)]
struct StoreState {
    records: HashMap<u64, CredentialRecord>,
    active: Option<Activation>,
}

struct StoreInner {
    state: Mutex<StoreState>,
    // Held across a mutation and its write-through. Always taken before `state`.
    writes: Mutex<()>,
    persistence: Arc<dyn CredentialPersistence>,
    defaults: SessionOptions,
    client: Option<ApiClient>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    /// Load every persisted record. A failing backend is logged and the store
    /// starts empty.
    pub fn open(persistence: Arc<dyn CredentialPersistence>, defaults: SessionOptions) -> Self {
        Self::build(persistence, defaults, None)
    }

    /// Like `open`, with a client that sessions use to execute requests.
    pub fn open_with_client(
        persistence: Arc<dyn CredentialPersistence>,
        defaults: SessionOptions,
        client: ApiClient,
    ) -> Self {
        Self::build(persistence, defaults, Some(client))
    }

    fn build(
        persistence: Arc<dyn CredentialPersistence>,
        defaults: SessionOptions,
        client: Option<ApiClient>,
    ) -> Self {
        let records = match persistence.load_all() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to load stored credentials, starting empty");
                Vec::new()
            }
        };
        debug!(count = records.len(), "Session store opened");

        let state = StoreState {
            records: records.into_iter().map(|r| (r.user_id(), r)).collect(),
            active: None,
        };

        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(state),
                writes: Mutex::new(()),
                persistence,
                defaults,
                client,
            }),
        }
    }

    /// The session of the current user, promoting a stored user if nobody is
    /// active. `None` when the store is empty.
    pub fn current(&self) -> Option<Session> {
        self.resolve_active().map(|_| Session::new(self.clone()))
    }

    /// Make `user_id` the current user. Returns false, changing nothing, if
    /// no record exists for it.
    ///
    /// Re-activating the user that is already current keeps its options.
    pub fn activate(&self, user_id: u64) -> bool {
        let mut state = self.inner.state.lock();
        if !state.records.contains_key(&user_id) {
            debug!(user_id, "Activation of unknown user ignored");
            return false;
        }

        if state.active.map(|a| a.user_id) != Some(user_id) {
            state.active = Some(Activation {
                user_id,
                options: self.inner.defaults,
            });
            info!(user_id, "Activated user");
        }
        true
    }

    /// Ids of every stored user, in no particular order.
    pub fn local_users(&self) -> Vec<u64> {
        self.inner.state.lock().records.keys().copied().collect()
    }

    /// Store a freshly authenticated credential, replacing any earlier record
    /// for the same user. The active designation is left alone.
    pub fn add_or_replace(&self, record: CredentialRecord) {
        let user_id = record.user_id();
        let _writes = self.inner.writes.lock();
        let replaced = self
            .inner
            .state
            .lock()
            .records
            .insert(user_id, record.clone())
            .is_some();
        info!(user_id, replaced, "Stored credential");

        if let Err(e) = self.inner.persistence.save(&record) {
            warn!(user_id, error = %e, "Failed to persist credential, keeping it in memory");
        }
    }

    /// Forget a user. Clears the designation if they were current.
    /// Returns whether a record existed.
    pub fn remove(&self, user_id: u64) -> bool {
        let _writes = self.inner.writes.lock();
        let removed = {
            let mut state = self.inner.state.lock();
            let removed = state.records.remove(&user_id).is_some();
            if state.active.map(|a| a.user_id) == Some(user_id) {
                state.active = None;
            }
            removed
        };

        if removed {
            info!(user_id, "Removed credential");
            if let Err(e) = self.inner.persistence.delete(user_id) {
                warn!(user_id, error = %e, "Failed to delete persisted credential");
            }
        }
        removed
    }

    /// Remove every stored user.
    pub fn reset(&self) {
        let _writes = self.inner.writes.lock();
        let removed: Vec<u64> = {
            let mut state = self.inner.state.lock();
            state.active = None;
            state.records.drain().map(|(id, _)| id).collect()
        };

        info!(count = removed.len(), "Session store reset");
        for user_id in removed {
            if let Err(e) = self.inner.persistence.delete(user_id) {
                warn!(user_id, error = %e, "Failed to delete persisted credential");
            }
        }
    }

    pub fn contains(&self, user_id: u64) -> bool {
        self.inner.state.lock().records.contains_key(&user_id)
    }

    pub fn record(&self, user_id: u64) -> Option<CredentialRecord> {
        self.inner.state.lock().records.get(&user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The designated user, without promoting anyone.
    pub fn active_user_id(&self) -> Option<u64> {
        let state = self.inner.state.lock();
        state
            .active
            .map(|a| a.user_id)
            .filter(|id| state.records.contains_key(id))
    }

    pub fn defaults(&self) -> SessionOptions {
        self.inner.defaults
    }

    pub(crate) fn client(&self) -> Option<&ApiClient> {
        self.inner.client.as_ref()
    }

    /// The active record and its options, promoting a stored user if needed.
    pub(crate) fn resolve_active(&self) -> Option<(CredentialRecord, SessionOptions)> {
        let mut state = self.inner.state.lock();
        let activation = self.ensure_active(&mut state)?;
        let record = state.records.get(&activation.user_id)?.clone();
        Some((record, activation.options))
    }

    /// Apply `update` to the options of the current activation cycle,
    /// promoting a stored user first if nobody is active. Returns false only
    /// when the store is empty.
    pub(crate) fn update_active_options(&self, update: impl FnOnce(&mut SessionOptions)) -> bool {
        let mut state = self.inner.state.lock();
        if self.ensure_active(&mut state).is_none() {
            return false;
        }
        match state.active.as_mut() {
            Some(activation) => {
                update(&mut activation.options);
                true
            }
            None => false,
        }
    }

    /// Make `state.active` point at a stored record: drop a designation whose
    /// record is gone, then promote one if nobody is active.
    fn ensure_active(&self, state: &mut StoreState) -> Option<Activation> {
        if let Some(active) = state.active {
            if state.records.contains_key(&active.user_id) {
                return Some(active);
            }
            debug!(user_id = active.user_id, "Active user no longer stored, clearing");
            state.active = None;
        }

        // HashMap iteration order: arbitrary, memoized by the designation below.
        let user_id = *state.records.keys().next()?;
        let activation = Activation {
            user_id,
            options: self.inner.defaults,
        };
        state.active = Some(activation);
        info!(user_id, "Promoted stored user to current");
        Some(activation)
    }
}
