//! Proof-of-work miner agents
//!
//! A `MinerAgent` repeatedly resyncs its local chain, picks a pending record at
//! random, searches for a nonce on top of its local tip and submits the result
//! to the shared [`Ledger`]. Agents run on their own threads and observe a
//! shared [`StopSignal`] at every wait, every nonce batch and around submission.

use crate::config::MinerConfig;
use crate::error::{ChainError, ErrorKind};
use crate::ledger::{target_for_difficulty, pow::search_batch, Ledger};
use crate::sync::LocalChain;
use crate::transaction::TransactionRecord;
use crossbeam_channel::Sender;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Process-wide cancellation token shared by the harness and every agent.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Idle,
    Selecting,
    Mining,
    Submitting,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinerStats {
    /// Mining attempts started.
    pub attempts: u64,
    pub hashes: u64,
    pub appended: u64,
    /// Appends that lost the race for the tip.
    pub stale: u64,
    /// Searches abandoned because the chain grew underneath them.
    pub superseded: u64,
    pub evicted: u64,
    /// Mined records the ledger refused for a reason other than a stale tip.
    pub rejected: u64,
}

/// Progress reports sent to whoever spawned the agent.
#[derive(Debug, Clone)]
pub enum MinerEvent {
    Appended { agent: usize, id: String },
    Evicted { agent: usize, id: String },
    Halted { agent: usize, error: ChainError },
    Stopped { agent: usize, stats: MinerStats },
}

enum MiningOutcome {
    Found(TransactionRecord),
    Superseded,
    Stopped,
}

pub struct MinerAgent {
    id: usize,
    ledger: Arc<Ledger>,
    local: LocalChain,
    stop: StopSignal,
    events: Option<Sender<MinerEvent>>,
    config: MinerConfig,
    rng: StdRng,
    state: MinerState,
    stats: MinerStats,
    dropped: HashSet<String>,
}

impl MinerAgent {
    pub fn new(id: usize, ledger: Arc<Ledger>, stop: StopSignal, config: MinerConfig) -> Self {
        Self::with_rng(id, ledger, stop, config, StdRng::from_entropy())
    }

    /// Deterministic nonce draws and candidate choice, for tests.
    pub fn with_seed(
        id: usize,
        ledger: Arc<Ledger>,
        stop: StopSignal,
        config: MinerConfig,
        seed: u64,
    ) -> Self {
        Self::with_rng(id, ledger, stop, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        id: usize,
        ledger: Arc<Ledger>,
        stop: StopSignal,
        config: MinerConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            id,
            ledger,
            local: LocalChain::new(),
            stop,
            events: None,
            config,
            rng,
            state: MinerState::Idle,
            stats: MinerStats::default(),
            dropped: HashSet::new(),
        }
    }

    pub fn with_events(mut self, events: Sender<MinerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> MinerState {
        self.state
    }

    pub fn stats(&self) -> &MinerStats {
        &self.stats
    }

    pub fn local_chain(&self) -> &LocalChain {
        &self.local
    }

    fn emit(&self, event: MinerEvent) {
        if let Some(events) = &self.events {
            // The receiver may already be gone during shutdown.
            let _ = events.send(event);
        }
    }

    /// Runs until the stop signal fires or the local chain hits an inconsistency.
    pub fn run(mut self) -> Result<MinerStats, ChainError> {
        info!(agent = self.id, "miner started");
        let result = self.run_loop();
        self.state = MinerState::Stopped;

        match &result {
            Ok(()) => info!(agent = self.id, stats = ?self.stats, "miner exiting"),
            Err(e) => {
                error!(agent = self.id, "miner halted: {}", e);
                self.emit(MinerEvent::Halted {
                    agent: self.id,
                    error: e.clone(),
                });
            }
        }
        self.emit(MinerEvent::Stopped {
            agent: self.id,
            stats: self.stats.clone(),
        });
        debug!(agent = self.id, "final local chain:{}", self.local.display());

        result.map(|_| self.stats)
    }

    fn run_loop(&mut self) -> Result<(), ChainError> {
        while !self.stop.is_triggered() {
            self.step()?;
        }
        Ok(())
    }

    /// One pass through `Idle -> Selecting -> Mining -> Submitting`.
    pub fn step(&mut self) -> Result<(), ChainError> {
        self.state = MinerState::Idle;
        self.local.resync(&self.ledger)?;

        // Nothing to mine on until the genesis has been appended.
        let Some(tip) = self.local.tip_id().map(str::to_string) else {
            let seen = self.ledger.version();
            self.ledger
                .wait_for_change(seen, &self.stop, self.config.idle_wait());
            return Ok(());
        };

        if !self
            .ledger
            .wait_for_pending(&self.stop, self.config.idle_wait())
        {
            return Ok(());
        }

        self.state = MinerState::Selecting;
        let Some(candidate) = self.select_candidate() else {
            return Ok(());
        };

        self.state = MinerState::Mining;
        let mined = match self.mine(candidate, tip) {
            MiningOutcome::Found(record) => record,
            MiningOutcome::Superseded => {
                self.stats.superseded += 1;
                return Ok(());
            }
            MiningOutcome::Stopped => return Ok(()),
        };

        if self.stop.is_triggered() {
            return Ok(());
        }
        self.state = MinerState::Submitting;
        self.submit(mined);
        self.state = MinerState::Idle;
        Ok(())
    }

    /// Picks a uniformly random pending record that is currently valid.
    ///
    /// A double-spent candidate is evicted and ends the round. Records that are not
    /// valid yet (e.g. waiting on an unmined input) are skipped, not evicted.
    fn select_candidate(&mut self) -> Option<TransactionRecord> {
        let seen_version = self.ledger.version();
        let mut ids = self.ledger.pending_ids();
        ids.shuffle(&mut self.rng);

        for id in ids {
            if self.stop.is_triggered() {
                return None;
            }
            let Some(record) = self.ledger.pending_record(&id) else {
                continue;
            };

            if self.ledger.is_double_spent(&record) {
                if self.ledger.evict_double_spent(&record) {
                    self.stats.evicted += 1;
                    self.emit(MinerEvent::Evicted {
                        agent: self.id,
                        id: record.id().to_string(),
                    });
                }
                return None;
            }
            if self.dropped.contains(record.id()) {
                continue;
            }

            match self.ledger.validate_candidate(&record) {
                Ok(()) => return Some(record),
                Err(e) => debug!(agent = self.id, id = record.short_id(), "candidate not valid yet: {}", e),
            }
        }

        // Nothing minable right now; wait for the pools to change.
        self.ledger
            .wait_for_change(seen_version, &self.stop, self.config.idle_wait());
        None
    }

    fn mine(&mut self, mut record: TransactionRecord, tip: String) -> MiningOutcome {
        record.set_prev_pointer(tip);
        self.stats.attempts += 1;

        let local_height = self.local.synced_height();
        let content = record.canonical_content();
        let target = target_for_difficulty(self.ledger.difficulty());

        loop {
            if self.stop.is_triggered() {
                return MiningOutcome::Stopped;
            }
            if self.ledger.verified_len() > local_height {
                debug!(agent = self.id, id = record.short_id(), "chain advanced, abandoning search");
                return MiningOutcome::Superseded;
            }

            let result = search_batch(&content, &target, self.config.nonce_batch, &mut self.rng);
            self.stats.hashes += result.hashes;
            if let Some((nonce, digest)) = result.solution {
                record.attach_proof(nonce, digest);
                return MiningOutcome::Found(record);
            }
        }
    }

    fn submit(&mut self, record: TransactionRecord) {
        let id = record.id().to_string();
        match self.ledger.append_verified(record) {
            Ok(()) => {
                self.stats.appended += 1;
                info!(agent = self.id, id = %id, "mined and appended record");
                self.emit(MinerEvent::Appended { agent: self.id, id });
            }
            Err(e) if e.is_retryable() => {
                self.stats.stale += 1;
                debug!(agent = self.id, id = %id, "lost race for tip");
            }
            Err(e) => {
                self.stats.rejected += 1;
                if e.kind() != ErrorKind::DoubleSpend {
                    warn!(agent = self.id, id = %id, kind = ?e.kind(), "dropping record: {}", e);
                }
                self.dropped.insert(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::transaction::{Outputs, TxKind};
    use crossbeam_channel::unbounded;
    use std::thread;
    use std::time::Duration;

    fn test_config() -> MinerConfig {
        MinerConfig {
            agents: 1,
            nonce_batch: 256,
            idle_wait_ms: 5,
        }
    }

    fn seeded_ledger() -> (Arc<Ledger>, KeyPair, TransactionRecord) {
        let alice = KeyPair::generate();
        let mut outputs = Outputs::new();
        outputs.insert(alice.identity(), 15);
        let genesis = TransactionRecord::genesis(outputs);

        let ledger = Arc::new(Ledger::new(1).unwrap());
        ledger.submit_pending(genesis.clone()).unwrap();
        ledger.append_verified(genesis.clone()).unwrap();
        (ledger, alice, genesis)
    }

    #[test]
    fn test_step_mines_pending_record() {
        let (ledger, alice, genesis) = seeded_ledger();
        let record = TransactionRecord::signed(
            TxKind::Transfer,
            vec![genesis.id().to_string()],
            alice.identity(),
            15,
            &[&alice],
        )
        .unwrap();
        ledger.submit_pending(record.clone()).unwrap();

        let (tx, rx) = unbounded();
        let mut agent =
            MinerAgent::with_seed(0, Arc::clone(&ledger), StopSignal::new(), test_config(), 11)
                .with_events(tx);
        agent.step().unwrap();

        assert_eq!(ledger.verified_len(), 2);
        assert_eq!(ledger.tip_id().as_deref(), Some(record.id()));
        assert_eq!(agent.stats().appended, 1);
        assert_eq!(agent.state(), MinerState::Idle);
        assert!(matches!(rx.try_recv(), Ok(MinerEvent::Appended { .. })));

        // The next step adopts the new record into the local chain.
        agent.step().unwrap();
        assert_eq!(agent.local_chain().len(), 2);
        assert_eq!(agent.local_chain().tip_id(), Some(record.id()));
    }

    #[test]
    fn test_step_evicts_double_spent_candidate() {
        let (ledger, alice, genesis) = seeded_ledger();
        let bob = KeyPair::generate();
        let first = TransactionRecord::signed(
            TxKind::Transfer,
            vec![genesis.id().to_string()],
            alice.identity(),
            15,
            &[&alice],
        )
        .unwrap();
        ledger.submit_pending(first.clone()).unwrap();

        let mut agent =
            MinerAgent::with_seed(1, Arc::clone(&ledger), StopSignal::new(), test_config(), 5);
        agent.step().unwrap();

        let spend = |to: &KeyPair, amount| {
            TransactionRecord::signed(
                TxKind::Transfer,
                vec![first.id().to_string()],
                to.identity(),
                amount,
                &[&alice],
            )
            .unwrap()
        };
        let a = spend(&bob, 15);
        let b = spend(&alice, 14);
        ledger.submit_pending(a.clone()).unwrap();
        ledger.submit_pending(b.clone()).unwrap();

        for _ in 0..10 {
            agent.step().unwrap();
            if ledger.pending_len() == 0 {
                break;
            }
        }

        assert_eq!(ledger.verified_len(), 3);
        assert_eq!(ledger.pending_len(), 0);
        assert_eq!(agent.stats().evicted, 1);
    }

    #[test]
    fn test_run_stops_promptly_when_idle() {
        let (ledger, _, _) = seeded_ledger();
        let stop = StopSignal::new();
        let agent = MinerAgent::new(2, Arc::clone(&ledger), stop.clone(), test_config());

        let handle = thread::spawn(move || agent.run());
        thread::sleep(Duration::from_millis(20));
        stop.trigger();
        ledger.wake_all();

        let stats = handle.join().unwrap().unwrap();
        assert_eq!(stats.appended, 0);
    }

    #[test]
    fn test_stop_interrupts_mining() {
        let alice = KeyPair::generate();
        let mut outputs = Outputs::new();
        outputs.insert(alice.identity(), 15);
        let genesis = TransactionRecord::genesis(outputs);
        // No digest meets a 64-nibble target, so the search only ends on stop.
        let ledger = Arc::new(Ledger::new(64).unwrap());
        ledger.submit_pending(genesis.clone()).unwrap();
        ledger.append_verified(genesis.clone()).unwrap();
        ledger
            .submit_pending(
                TransactionRecord::signed(
                    TxKind::Transfer,
                    vec![genesis.id().to_string()],
                    alice.identity(),
                    15,
                    &[&alice],
                )
                .unwrap(),
            )
            .unwrap();

        let stop = StopSignal::new();
        let agent = MinerAgent::new(3, Arc::clone(&ledger), stop.clone(), test_config());
        let handle = thread::spawn(move || agent.run());
        thread::sleep(Duration::from_millis(50));
        stop.trigger();
        ledger.wake_all();

        let stats = handle.join().unwrap().unwrap();
        assert_eq!(stats.attempts, 1);
        assert!(stats.hashes > 0);
        assert_eq!(ledger.verified_len(), 1);
    }

    #[test]
    fn test_waits_for_genesis_before_mining() {
        let alice = KeyPair::generate();
        let mut outputs = Outputs::new();
        outputs.insert(alice.identity(), 15);
        let genesis = TransactionRecord::genesis(outputs);

        // Genesis and a spend of it are pending, but nothing is verified yet.
        let ledger = Arc::new(Ledger::new(1).unwrap());
        ledger.submit_pending(genesis.clone()).unwrap();
        let spend = TransactionRecord::signed(
            TxKind::Transfer,
            vec![genesis.id().to_string()],
            alice.identity(),
            15,
            &[&alice],
        )
        .unwrap();
        ledger.submit_pending(spend.clone()).unwrap();
        assert!(ledger.validate_candidate(&spend).is_ok());

        let stop = StopSignal::new();
        let config = MinerConfig {
            idle_wait_ms: 50,
            ..test_config()
        };
        let agent = MinerAgent::with_seed(4, Arc::clone(&ledger), stop.clone(), config, 21);
        let handle = thread::spawn(move || agent.run());

        thread::sleep(Duration::from_millis(150));
        assert!(ledger.is_chain_empty());

        ledger.append_verified(genesis).unwrap();
        assert!(ledger.wait_for_height(2, Duration::from_secs(10)));
        stop.trigger();
        ledger.wake_all();

        let stats = handle.join().unwrap().unwrap();
        assert_eq!(stats.superseded, 0);
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.appended, 1);
        assert_eq!(ledger.tip_id().as_deref(), Some(spend.id()));
    }
}
