//! In-process simulation harness
//!
//! Builds one shared [`Ledger`], seeds it from a fixture scenario, runs the
//! configured number of miner agents on OS threads until the verified chain
//! reaches the expected length (or the timeout passes), then stops and joins them.

use crate::config::Config;
use crate::error::ChainError;
use crate::fixtures::{self, Scenario};
use crate::ledger::Ledger;
use crate::miner::{MinerAgent, MinerEvent, MinerStats, StopSignal};
use crate::transaction::TransactionRecord;
use crossbeam_channel::unbounded;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct SimulationReport {
    pub verified: Vec<TransactionRecord>,
    pub pending: usize,
    pub expected_chain_length: usize,
    /// The chain reached the expected length before the timeout.
    pub converged: bool,
    pub elapsed: Duration,
    pub agent_stats: Vec<MinerStats>,
    /// Agents that halted on an inconsistency.
    pub halted: Vec<(usize, ChainError)>,
    pub events: Vec<MinerEvent>,
    pub ledger_display: String,
}

impl SimulationReport {
    pub fn total_appended(&self) -> u64 {
        self.agent_stats.iter().map(|s| s.appended).sum()
    }

    pub fn total_hashes(&self) -> u64 {
        self.agent_stats.iter().map(|s| s.hashes).sum()
    }
}

pub struct Simulation {
    config: Config,
}

impl Simulation {
    pub fn new(config: Config) -> Result<Self, ChainError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self) -> Result<SimulationReport, ChainError> {
        let scenario = Scenario::generate()?;
        let records = match &self.config.simulation.fixture_path {
            Some(path) => {
                fixtures::save(&scenario.records, path)?;
                fixtures::load(path)?
            }
            None => scenario.records.clone(),
        };
        let expected = self
            .config
            .simulation
            .expected_chain_length
            .unwrap_or(scenario.expected_chain_length);

        let ledger = Arc::new(Ledger::from_config(&self.config.ledger)?);
        load_into_ledger(&ledger, &records)?;
        info!(
            pending = ledger.pending_len(),
            difficulty = ledger.difficulty(),
            agents = self.config.miner.agents,
            expected,
            "starting simulation"
        );

        let started = Instant::now();
        let stop = StopSignal::new();
        let (tx, rx) = unbounded();

        let mut handles = Vec::with_capacity(self.config.miner.agents);
        for id in 0..self.config.miner.agents {
            let agent = MinerAgent::new(
                id,
                Arc::clone(&ledger),
                stop.clone(),
                self.config.miner.clone(),
            )
            .with_events(tx.clone());
            let spawned = thread::Builder::new()
                .name(format!("miner-{}", id))
                .spawn(move || agent.run());
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    stop.trigger();
                    ledger.wake_all();
                    return Err(e.into());
                }
            }
        }
        drop(tx);

        let converged = ledger.wait_for_height(expected, self.config.simulation.timeout());
        if !converged {
            warn!(
                height = ledger.verified_len(),
                expected, "timed out waiting for the verified chain"
            );
        }

        stop.trigger();
        ledger.wake_all();

        let mut agent_stats = Vec::with_capacity(handles.len());
        let mut halted = Vec::new();
        for (id, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(stats)) => agent_stats.push(stats),
                Ok(Err(e)) => halted.push((id, e)),
                Err(_) => {
                    error!(agent = id, "miner thread panicked");
                    halted.push((
                        id,
                        ChainError::ChainInconsistency(format!("miner {} panicked", id)),
                    ));
                }
            }
        }
        let events: Vec<MinerEvent> = rx.try_iter().collect();
        let elapsed = started.elapsed();

        let verified = ledger.verified();
        info!(
            height = verified.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            halted = halted.len(),
            "simulation finished"
        );

        Ok(SimulationReport {
            pending: ledger.pending_len(),
            ledger_display: ledger.display(),
            verified,
            expected_chain_length: expected,
            converged,
            elapsed,
            agent_stats,
            halted,
            events,
        })
    }
}

/// Submits every record to the pending pool; the first one is the genesis and is
/// appended straight away. Rejections are logged and skipped.
pub fn load_into_ledger(ledger: &Ledger, records: &[TransactionRecord]) -> Result<(), ChainError> {
    let Some((genesis, rest)) = records.split_first() else {
        return Err(ChainError::StructuralError(
            "fixture contains no records".to_string(),
        ));
    };
    ledger.submit_pending(genesis.clone())?;
    ledger.append_verified(genesis.clone())?;

    for record in rest {
        if let Err(e) = ledger.submit_pending(record.clone()) {
            warn!(id = record.short_id(), kind = ?e.kind(), "fixture record rejected: {}", e);
        }
    }
    Ok(())
}
