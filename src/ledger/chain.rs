use crate::config::LedgerConfig;
use crate::error::ChainError;
use crate::ledger::pow::{verify_proof_of_work, MAX_DIFFICULTY};
use crate::ledger::validation::{find_double_spend, validate_no_double_spend};
use crate::miner::StopSignal;
use crate::transaction::{PoolView, TransactionRecord};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct LedgerState {
    pending: HashMap<String, TransactionRecord>,
    verified: Vec<TransactionRecord>,
    /// Bumped on every mutation so waiters can tell that something changed.
    version: u64,
}

impl LedgerState {
    fn view(&self) -> PoolView<'_> {
        PoolView::new(&self.pending, &self.verified)
    }

    fn tip_id(&self) -> Option<&str> {
        self.verified.last().map(|r| r.id())
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.verified.is_empty()
    }

    fn check_append(&self, record: &TransactionRecord, difficulty: u32) -> Result<(), ChainError> {
        // The very first record is the genesis and is trusted as-is.
        let Some(tip) = self.tip_id() else {
            return Ok(());
        };

        record.validate_for_pool(self.view())?;
        validate_no_double_spend(record, &self.verified)?;
        record.validate_additional_structure()?;

        let found = record.prev_pointer().unwrap_or_default();
        if found != tip {
            return Err(ChainError::StaleTip {
                expected: tip.to_string(),
                found: found.to_string(),
            });
        }

        verify_proof_of_work(record, difficulty)
    }
}

/// Owned copy of both pools, taken under the lock.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub pending: HashMap<String, TransactionRecord>,
    pub verified: Vec<TransactionRecord>,
}

impl LedgerSnapshot {
    pub fn view(&self) -> PoolView<'_> {
        PoolView::new(&self.pending, &self.verified)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id) || self.verified.iter().any(|r| r.id() == id)
    }
}

/// Single source of truth for the pending pool and the verified chain.
///
/// Every mutation goes through one mutex, so `append_verified` re-checks the
/// tip and commits in the same critical section: at most one append can win
/// for any given tip.
pub struct Ledger {
    state: Mutex<LedgerState>,
    changed: Condvar,
    height: AtomicUsize,
    difficulty: u32,
}

impl Ledger {
    pub fn new(difficulty: u32) -> Result<Self, ChainError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(ChainError::ConfigError(format!(
                "difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, difficulty
            )));
        }
        Ok(Self {
            state: Mutex::new(LedgerState::default()),
            changed: Condvar::new(),
            height: AtomicUsize::new(0),
            difficulty,
        })
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self, ChainError> {
        Self::new(config.difficulty)
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Validates `record` (unless the ledger is still empty) and stores it in the pending pool.
    ///
    /// Re-submitting an id that is already pending simply overwrites it.
    pub fn submit_pending(&self, record: TransactionRecord) -> Result<bool, ChainError> {
        let mut state = self.state.lock();

        if !state.is_empty() {
            let checked = record
                .validate_for_pool(state.view())
                .and_then(|_| validate_no_double_spend(&record, &state.verified));
            if let Err(e) = checked {
                warn!(id = record.short_id(), kind = ?e.kind(), "rejected pending record: {}", e);
                return Err(e);
            }
        }

        let id = record.id().to_string();
        state.pending.insert(id.clone(), record);
        state.version += 1;
        let present = state.pending.contains_key(&id);
        drop(state);

        self.changed.notify_all();
        debug!(id = %id, "record added to pending pool");
        Ok(present)
    }

    /// Whether any verified record after genesis already spent one of `record`'s
    /// non-genesis inputs.
    pub fn is_double_spent(&self, record: &TransactionRecord) -> bool {
        let state = self.state.lock();
        find_double_spend(record, &state.verified).is_some()
    }

    /// Removes a double-spent record from the pending pool. Returns whether it was evicted.
    pub fn evict_double_spent(&self, record: &TransactionRecord) -> bool {
        let mut state = self.state.lock();
        let Some(conflicting) = find_double_spend(record, &state.verified).map(str::to_string)
        else {
            return false;
        };
        if state.pending.remove(record.id()).is_none() {
            return false;
        }
        state.version += 1;
        drop(state);

        self.changed.notify_all();
        warn!(
            id = record.short_id(),
            conflicting = %conflicting,
            "double spend detected, evicted record from pending pool"
        );
        true
    }

    /// Appends a mined record to the verified chain.
    ///
    /// All checks and the commit happen under one lock. On failure neither pool
    /// changes and the caller gets the specific reason.
    pub fn append_verified(&self, record: TransactionRecord) -> Result<(), ChainError> {
        let mut state = self.state.lock();

        if let Err(e) = state.check_append(&record, self.difficulty) {
            if e.is_retryable() {
                debug!(id = record.short_id(), "append lost the race: {}", e);
            } else {
                warn!(id = record.short_id(), kind = ?e.kind(), "append rejected: {}", e);
            }
            return Err(e);
        }

        state.pending.remove(record.id());
        let id = record.id().to_string();
        state.verified.push(record);
        state.version += 1;
        let height = state.verified.len();
        self.height.store(height, Ordering::SeqCst);
        drop(state);

        self.changed.notify_all();
        info!(id = %id, height, "record appended to verified chain");
        Ok(())
    }

    /// Strips mining fields and offers the record to the pending pool again.
    pub fn requeue(&self, mut record: TransactionRecord) -> Result<bool, ChainError> {
        record.clear_mining_fields();
        self.submit_pending(record)
    }

    /// Runs pool validation for `record` against the live pools.
    pub fn validate_candidate(&self, record: &TransactionRecord) -> Result<(), ChainError> {
        let state = self.state.lock();
        record.validate_for_pool(state.view())
    }

    /// Both pools are empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().is_empty()
    }

    pub fn is_chain_empty(&self) -> bool {
        self.verified_len() == 0
    }

    /// Verified chain length; readable without taking the lock.
    pub fn verified_len(&self) -> usize {
        self.height.load(Ordering::SeqCst)
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn tip_id(&self) -> Option<String> {
        self.state.lock().tip_id().map(str::to_string)
    }

    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    pub fn contains_pending(&self, id: &str) -> bool {
        self.state.lock().pending.contains_key(id)
    }

    pub fn contains_verified(&self, id: &str) -> bool {
        self.state.lock().verified.iter().any(|r| r.id() == id)
    }

    /// Pending ids at this instant, sorted so that sampling is reproducible under a seeded rng.
    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn pending_record(&self, id: &str) -> Option<TransactionRecord> {
        self.state.lock().pending.get(id).cloned()
    }

    pub fn verified(&self) -> Vec<TransactionRecord> {
        self.state.lock().verified.clone()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.lock();
        LedgerSnapshot {
            pending: state.pending.clone(),
            verified: state.verified.clone(),
        }
    }

    /// Blocks until the pending pool is non-empty, `stop` fires, or `timeout` elapses.
    pub fn wait_for_pending(&self, stop: &StopSignal, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.pending.is_empty() && !stop.is_triggered() {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        !state.pending.is_empty() && !stop.is_triggered()
    }

    /// Blocks until the ledger version moves past `seen`, `stop` fires, or `timeout` elapses.
    pub fn wait_for_change(&self, seen: u64, stop: &StopSignal, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.version == seen && !stop.is_triggered() {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.version
    }

    /// Blocks until the verified chain reaches `height` or `timeout` elapses.
    pub fn wait_for_height(&self, height: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.verified.len() < height {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.verified.len() >= height
    }

    /// Wakes every waiter so it can re-check the stop signal.
    pub fn wake_all(&self) {
        // Taking the lock orders this notify after any waiter's pre-wait check.
        let _state = self.state.lock();
        self.changed.notify_all();
    }

    /// Debug rendering of both pools.
    pub fn display(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        let _ = writeln!(out, "\nUnverified Transaction Pool ({})", state.pending.len());
        let mut pending: Vec<&TransactionRecord> = state.pending.values().collect();
        pending.sort_by(|a, b| a.id().cmp(b.id()));
        for record in pending {
            let _ = writeln!(out, "\n{}", record);
        }
        let _ = writeln!(out, "\nVerified Transaction Pool ({})", state.verified.len());
        for record in &state.verified {
            let _ = writeln!(out, "\n{}", record);
        }
        out
    }
}
