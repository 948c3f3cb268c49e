//! Concurrency keys and in-flight enforcement
//!
//! A trigger with a concurrency policy renders a key from its params. While
//! an invocation holding a key is running, later invocations with the same
//! key are either dropped (`Skip`) or wait their turn (`Queue`).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::types::{ConcurrencyPolicy, ConcurrencyStrategy, Param};

/// Render the concurrency key of one invocation.
///
/// No policy means no key (empty string). Unknown `$(params.x)` references
/// stay in the key verbatim.
pub fn resolve_concurrency_key(policy: Option<&ConcurrencyPolicy>, params: &[Param]) -> String {
    let Some(policy) = policy else {
        return String::new();
    };
    params.iter().fold(policy.key.clone(), |key, param| {
        key.replace(&format!("$(params.{})", param.name), &param.value)
    })
}

struct Slot {
    lock: Arc<Mutex<()>>,
    holders: usize,
}

type Slots = Arc<DashMap<String, Slot>>;

/// Tracks which concurrency keys are currently running
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    slots: Slots,
}

impl InFlightRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask to run an invocation with `key`.
    ///
    /// Returns `None` when the strategy is `Skip` and the key is already in
    /// flight. With `Queue` this waits until earlier holders finish. An empty
    /// key is always admitted and never tracked. Dropping the future while
    /// it waits gives up the place in the queue.
    pub async fn admit(&self, key: &str, strategy: ConcurrencyStrategy) -> Option<InFlightGuard> {
        if key.is_empty() {
            return Some(InFlightGuard::untracked());
        }

        let lock = {
            let mut slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
                lock: Arc::new(Mutex::new(())),
                holders: 0,
            });
            slot.holders += 1;
            slot.lock.clone()
        };

        // Registered before waiting so a cancelled waiter still releases its count
        let mut guard = InFlightGuard {
            key: key.to_string(),
            slots: Some(self.slots.clone()),
            permit: None,
        };

        match strategy {
            ConcurrencyStrategy::Skip => match lock.try_lock_owned() {
                Ok(permit) => guard.permit = Some(permit),
                Err(_) => {
                    debug!(key = %key, "concurrency key in flight, skipping");
                    return None;
                }
            },
            ConcurrencyStrategy::Queue => {
                debug!(key = %key, "waiting for concurrency key");
                guard.permit = Some(lock.lock_owned().await);
            }
        }

        Some(guard)
    }

    /// Number of invocations holding or waiting for `key`
    pub fn in_flight(&self, key: &str) -> usize {
        self.slots.get(key).map(|slot| slot.holders).unwrap_or(0)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no key is tracked
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Admission to run; releases the key when dropped
pub struct InFlightGuard {
    key: String,
    slots: Option<Slots>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl InFlightGuard {
    fn untracked() -> Self {
        Self {
            key: String::new(),
            slots: None,
            permit: None,
        }
    }

    /// The key this guard holds, empty when untracked
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // Hand the lock to the next waiter before giving up the slot
        drop(self.permit.take());

        let Some(slots) = self.slots.take() else {
            return;
        };
        let entry = slots.entry(std::mem::take(&mut self.key));
        if let Entry::Occupied(mut entry) = entry {
            entry.get_mut().holders -= 1;
            if entry.get().holders == 0 {
                entry.remove();
            }
        }
    }
}
