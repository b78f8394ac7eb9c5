//! Wait/notify bridge between inbound notifications and blocked workers.
//!
//! Each key is `(plan_id, event)` where the event is an instance name
//! (instantiation) or a test id (cancel acknowledgement). A key is
//! registered before the outbound request that will trigger its signal,
//! so a callback that arrives early is kept until the worker waits.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::domain::errors::{CuratorError, CuratorResult};

/// `(plan_id, event)`
pub type SyncKey = (String, String);

#[derive(Debug)]
enum Slot {
    Pending(oneshot::Sender<()>),
    Fired,
}

/// Handle returned by [`CallbackSynchronizer::register`], consumed by a single wait.
#[derive(Debug)]
pub struct WaitHandle {
    key: SyncKey,
    receiver: oneshot::Receiver<()>,
}

impl WaitHandle {
    pub fn key(&self) -> &SyncKey {
        &self.key
    }
}

#[derive(Debug, Default)]
pub struct CallbackSynchronizer {
    slots: Mutex<HashMap<SyncKey, Slot>>,
}

impl CallbackSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SyncKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the wait handle for a key. Fails if the key is already outstanding.
    pub fn register(&self, plan_id: &str, event: &str) -> CuratorResult<WaitHandle> {
        let key = (plan_id.to_string(), event.to_string());
        let mut slots = self.slots();
        if slots.contains_key(&key) {
            return Err(CuratorError::AlreadyExists(format!(
                "synchronizer {plan_id}/{event}"
            )));
        }
        let (sender, receiver) = oneshot::channel();
        slots.insert(key.clone(), Slot::Pending(sender));
        debug!(plan_id, event, "registered synchronizer");
        Ok(WaitHandle { key, receiver })
    }

    /// Wake the worker waiting on a key.
    ///
    /// Unknown keys only log a warning; a second signal on the same key is a
    /// no-op. Returns true if this call fired the key.
    pub fn signal(&self, plan_id: &str, event: &str) -> bool {
        let key = (plan_id.to_string(), event.to_string());
        let mut slots = self.slots();
        match slots.get_mut(&key) {
            Some(slot) => match std::mem::replace(slot, Slot::Fired) {
                Slot::Pending(sender) => {
                    // receiver may already be gone if the worker timed out
                    let _ = sender.send(());
                    debug!(plan_id, event, "signalled synchronizer");
                    true
                }
                Slot::Fired => {
                    debug!(plan_id, event, "synchronizer already signalled");
                    false
                }
            },
            None => {
                warn!(plan_id, event, "signal for unknown synchronizer ignored");
                false
            }
        }
    }

    /// Block until the key is signalled or the timeout elapses.
    ///
    /// The key is removed whatever the outcome.
    pub async fn wait(&self, handle: WaitHandle, timeout: Duration) -> CuratorResult<()> {
        let WaitHandle { key, receiver } = handle;
        let outcome = tokio::time::timeout(timeout, receiver).await;
        self.slots().remove(&key);

        let (plan_id, event) = key;
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(CuratorError::WaitAbandoned(format!("{plan_id}/{event}"))),
            Err(_) => {
                warn!(plan_id = %plan_id, event = %event, ?timeout, "synchronizer timed out");
                Err(CuratorError::Timeout {
                    waiting_for: format!("{plan_id}/{event}"),
                    after: timeout,
                })
            }
        }
    }

    /// Drop a handle without waiting, e.g. when the triggering request failed.
    pub fn discard(&self, handle: WaitHandle) {
        self.slots().remove(&handle.key);
    }

    /// Remove every key of a plan; outstanding waits end with `WaitAbandoned`.
    pub fn drop_plan(&self, plan_id: &str) -> usize {
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|(plan, _), _| plan != plan_id);
        before - slots.len()
    }

    pub fn is_pending(&self, plan_id: &str, event: &str) -> bool {
        matches!(
            self.slots().get(&(plan_id.to_string(), event.to_string())),
            Some(Slot::Pending(_))
        )
    }

    /// Outstanding keys, sorted, for diagnostics.
    pub fn pending_keys(&self) -> Vec<SyncKey> {
        let mut keys: Vec<SyncKey> = self
            .slots()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Pending(_)))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}
