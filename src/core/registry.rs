//! Run registry: the only shared mutable state in the engine.
//!
//! A thread-safe mapping from group key to the ordered runs competing in
//! that group. Mutation is atomic per key: each group has its own async
//! mutex, the outer map is only locked long enough to find or insert a
//! slot, and there is no global lock across groups. Contention is bounded
//! by the number of distinct groups in flight.
//!
//! The map locks are held only for short synchronous lookups and never
//! across an await, and no path waits on a slot mutex while holding a
//! map lock, so slot and map locks cannot deadlock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::arbiter::Decision;
use crate::domain::{GroupKey, RunId, RunRecord, RunState, TriggerEvent};

/// Errors produced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A slot was retired between lookup and lock on every attempt.
    /// Transient; retried internally with bounded attempts first.
    #[error("registry contention on group {key} after {attempts} attempts")]
    Contention { key: GroupKey, attempts: u32 },

    /// No record with this id exists (never admitted, or already evicted).
    #[error("unknown run: {0}")]
    UnknownRun(RunId),
}

/// Result of a state transition request.
///
/// Duplicate completion callbacks are expected from the executor, so a
/// transition on an already-terminal record is a benign no-op signal, not
/// an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was applied
    Applied,

    /// The record was already terminal; nothing changed
    AlreadyTerminal,

    /// The record was no longer in the state the caller required
    NotApplicable,
}

struct GroupSlot {
    runs: Vec<RunRecord>,
    /// Set when the slot's last run is evicted and the map entry removed;
    /// a caller that locked the stale slot must fetch a fresh one.
    retired: bool,
}

/// Thread-safe registry of runs keyed by concurrency group.
pub struct RunRegistry {
    groups: RwLock<HashMap<GroupKey, Arc<Mutex<GroupSlot>>>>,
    index: RwLock<HashMap<RunId, GroupKey>>,
    admission_seq: AtomicU64,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            admission_seq: AtomicU64::new(0),
        }
    }

    /// Fetch the slot for a key, creating it if absent.
    fn slot(&self, key: &GroupKey) -> Arc<Mutex<GroupSlot>> {
        if let Some(slot) = self.groups.read().expect("registry lock poisoned").get(key) {
            return Arc::clone(slot);
        }

        let mut groups = self.groups.write().expect("registry lock poisoned");
        Arc::clone(groups.entry(key.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(GroupSlot {
                runs: Vec::new(),
                retired: false,
            }))
        }))
    }

    /// Decide cancellations and admit a new run as one atomic step.
    ///
    /// `decide` sees the group's runs exactly as they are at admission
    /// time; the cancellation set it returns and the append of the new
    /// Queued record are applied under the same slot lock, so no window
    /// exists in which two unprotected runs of one group are both live.
    /// The admission counter is assigned under the lock too, making
    /// `created_at` the coordinator's own serialization order for the key.
    ///
    /// If the slot is retired underneath us the decision would be stale;
    /// it is recomputed against the fresh slot, up to `attempts` times.
    pub async fn admit<F>(
        &self,
        key: &GroupKey,
        event: &TriggerEvent,
        protected: bool,
        decide: F,
        attempts: u32,
    ) -> Result<(RunRecord, Vec<RunRecord>), RegistryError>
    where
        F: Fn(&[RunRecord]) -> Decision,
    {
        for _ in 0..attempts.max(1) {
            let slot = self.slot(key);
            let mut guard = slot.lock().await;
            if guard.retired {
                debug!(%key, "group slot retired mid-admission, retrying");
                continue;
            }

            let decision = decide(&guard.runs);
            let created_at = self.admission_seq.fetch_add(1, Ordering::SeqCst);
            let record = RunRecord::new(key.clone(), event.clone(), protected, created_at);

            // A submission must never cancel the record it is creating.
            let cancel_ids: Vec<RunId> = decision
                .to_cancel
                .into_iter()
                .filter(|id| *id != record.id)
                .collect();

            let now = Utc::now();
            let mut canceled = Vec::new();
            for run in guard.runs.iter_mut() {
                if cancel_ids.contains(&run.id) && run.is_active() {
                    run.state = RunState::Canceled;
                    run.finished_at = Some(now);
                    canceled.push(run.clone());
                }
            }

            guard.runs.push(record.clone());
            self.index
                .write()
                .expect("registry lock poisoned")
                .insert(record.id, key.clone());

            return Ok((record, canceled));
        }

        Err(RegistryError::Contention {
            key: key.clone(),
            attempts,
        })
    }

    /// Active (queued or running) runs in a group, in admission order.
    pub async fn list_active(&self, key: &GroupKey) -> Vec<RunRecord> {
        let slot = {
            let groups = self.groups.read().expect("registry lock poisoned");
            match groups.get(key) {
                Some(slot) => Arc::clone(slot),
                None => return Vec::new(),
            }
        };
        let guard = slot.lock().await;
        guard.runs.iter().filter(|r| r.is_active()).cloned().collect()
    }

    /// Look up a run by id.
    pub async fn get(&self, id: RunId) -> Option<RunRecord> {
        let key = self
            .index
            .read()
            .expect("registry lock poisoned")
            .get(&id)
            .cloned()?;
        let slot = {
            let groups = self.groups.read().expect("registry lock poisoned");
            Arc::clone(groups.get(&key)?)
        };
        let guard = slot.lock().await;
        guard.runs.iter().find(|r| r.id == id).cloned()
    }

    /// Transition a run to a new state.
    ///
    /// Already-terminal records yield `AlreadyTerminal` rather than an
    /// error; duplicate completion callbacks are expected.
    pub async fn transition(
        &self,
        id: RunId,
        new_state: RunState,
    ) -> Result<TransitionOutcome, RegistryError> {
        self.transition_if(id, new_state, |_| true).await
    }

    /// Transition a run only while it is still Queued. Used by the
    /// dispatch-timeout watchdog so an acknowledged run is never failed.
    pub async fn fail_if_queued(
        &self,
        id: RunId,
        new_state: RunState,
    ) -> Result<TransitionOutcome, RegistryError> {
        self.transition_if(id, new_state, |state| matches!(state, RunState::Queued))
            .await
    }

    async fn transition_if(
        &self,
        id: RunId,
        new_state: RunState,
        applies: impl FnOnce(&RunState) -> bool,
    ) -> Result<TransitionOutcome, RegistryError> {
        let key = self
            .index
            .read()
            .expect("registry lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(RegistryError::UnknownRun(id))?;
        let slot = {
            let groups = self.groups.read().expect("registry lock poisoned");
            groups
                .get(&key)
                .map(Arc::clone)
                .ok_or(RegistryError::UnknownRun(id))?
        };

        let mut guard = slot.lock().await;
        let run = guard
            .runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RegistryError::UnknownRun(id))?;

        if run.is_terminal() {
            return Ok(TransitionOutcome::AlreadyTerminal);
        }
        if !applies(&run.state) {
            return Ok(TransitionOutcome::NotApplicable);
        }

        if new_state.is_terminal() {
            run.finished_at = Some(Utc::now());
        }
        run.state = new_state;
        Ok(TransitionOutcome::Applied)
    }

    /// Remove a terminal record from the registry. Returns false if the
    /// record is still active (eviction refused) or already gone.
    pub async fn evict(&self, id: RunId) -> bool {
        let key = {
            let index = self.index.read().expect("registry lock poisoned");
            match index.get(&id) {
                Some(key) => key.clone(),
                None => return false,
            }
        };
        let slot = {
            let groups = self.groups.read().expect("registry lock poisoned");
            match groups.get(&key) {
                Some(slot) => Arc::clone(slot),
                None => return false,
            }
        };

        let mut guard = slot.lock().await;
        let Some(pos) = guard.runs.iter().position(|r| r.id == id) else {
            return false;
        };
        if !guard.runs[pos].is_terminal() {
            return false;
        }

        guard.runs.remove(pos);
        self.index.write().expect("registry lock poisoned").remove(&id);

        if guard.runs.is_empty() {
            guard.retired = true;
            self.groups
                .write()
                .expect("registry lock poisoned")
                .remove(&key);
        }
        true
    }

    /// Snapshot of every group and its runs, for observability output.
    pub async fn snapshot(&self) -> Vec<(GroupKey, Vec<RunRecord>)> {
        let slots: Vec<(GroupKey, Arc<Mutex<GroupSlot>>)> = {
            let groups = self.groups.read().expect("registry lock poisoned");
            groups
                .iter()
                .map(|(k, v)| (k.clone(), Arc::clone(v)))
                .collect()
        };

        let mut out = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            let guard = slot.lock().await;
            if !guard.runs.is_empty() {
                out.push((key, guard.runs.clone()));
            }
        }
        out.sort_by(|a, b| a.0.discriminant.cmp(&b.0.discriminant));
        out
    }
}
