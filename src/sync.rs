//! Local chain synchronization for miner agents
//!
//! Each agent keeps its own copy of the verified chain and re-validates every
//! record it adopts instead of trusting the shared ledger. While adopting, it
//! looks for forks (several records declaring the same predecessor) and keeps
//! only the longest branch; records on the losing branches go back to the
//! ledger's pending pool.

use crate::error::ChainError;
use crate::ledger::{has_valid_proof_of_work, Ledger};
use crate::transaction::TransactionRecord;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Branch graph over `(id -> predecessor)` edges of a local chain.
struct BranchGraph<'a> {
    children: HashMap<&'a str, Vec<&'a str>>,
    depth: HashMap<&'a str, usize>,
}

impl<'a> BranchGraph<'a> {
    fn new(chain: &'a [TransactionRecord]) -> Self {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for record in chain {
            if let Some(prev) = record.prev_pointer() {
                children.entry(prev).or_default().push(record.id());
            }
        }
        Self {
            children,
            depth: HashMap::new(),
        }
    }

    fn children_of(&self, id: &str) -> &[&'a str] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn has_fork(&self) -> bool {
        self.children.values().any(|kids| kids.len() > 1)
    }

    /// Length of the longest path starting at `start`, counting `start` itself.
    fn depth(&mut self, start: &'a str) -> usize {
        let mut stack = vec![(start, false)];
        let mut on_stack = HashSet::new();

        while let Some((node, expanded)) = stack.pop() {
            if self.depth.contains_key(node) {
                continue;
            }
            if expanded {
                let deepest = self
                    .children_of(node)
                    .iter()
                    .map(|kid| self.depth.get(kid).copied().unwrap_or(0))
                    .max()
                    .unwrap_or(0);
                self.depth.insert(node, deepest + 1);
                continue;
            }
            if !on_stack.insert(node) {
                continue;
            }
            stack.push((node, true));
            let kids: Vec<&'a str> = self.children_of(node).to_vec();
            for kid in kids {
                if !self.depth.contains_key(kid) {
                    stack.push((kid, false));
                }
            }
        }

        self.depth.get(start).copied().unwrap_or(1)
    }

    /// Every id reachable from `head`, `head` included.
    fn subtree(&self, head: &'a str, into: &mut HashSet<String>) {
        let mut stack = vec![head];
        while let Some(node) = stack.pop() {
            if into.insert(node.to_string()) {
                stack.extend(self.children_of(node).iter().copied());
            }
        }
    }
}

/// Prunes all but the longest branch at every fork reachable from the chain's first record.
pub struct ForkResolver;

impl ForkResolver {
    /// Removes losing branches from `chain` and returns them in chain order.
    ///
    /// Ties go to the branch whose head is in `known` (was already in the local
    /// chain before this round), then to the smallest head id.
    pub fn resolve(
        chain: &mut Vec<TransactionRecord>,
        known: &HashSet<String>,
    ) -> Vec<TransactionRecord> {
        let Some(root) = chain.first().map(|r| r.id().to_string()) else {
            return Vec::new();
        };

        let discarded = {
            let mut graph = BranchGraph::new(chain);
            if !graph.has_fork() {
                return Vec::new();
            }

            let mut discarded = HashSet::new();
            let mut cursor = root.as_str();
            let mut visited = HashSet::new();
            while visited.insert(cursor.to_string()) {
                let heads: Vec<&str> = graph.children_of(cursor).to_vec();
                let winner = match heads.len() {
                    0 => break,
                    1 => heads[0],
                    _ => {
                        let mut ranked: Vec<(&str, usize)> =
                            heads.iter().map(|h| (*h, graph.depth(*h))).collect();
                        ranked.sort_by_key(|(head, depth)| {
                            (Reverse(*depth), !known.contains(*head), *head)
                        });
                        let (winner, winning_depth) = ranked[0];
                        let fork_point = cursor.get(..10).unwrap_or(cursor);
                        for (loser, depth) in &ranked[1..] {
                            info!(
                                fork_point = %fork_point,
                                kept_depth = winning_depth,
                                pruned_depth = *depth,
                                "pruning shorter branch"
                            );
                            graph.subtree(*loser, &mut discarded);
                        }
                        winner
                    }
                };
                cursor = winner;
            }
            discarded
        };

        let mut pruned = Vec::new();
        chain.retain(|record| {
            if discarded.contains(record.id()) {
                pruned.push(record.clone());
                false
            } else {
                true
            }
        });
        pruned
    }
}

/// An agent's independently verified copy of the chain.
#[derive(Debug, Default, Clone)]
pub struct LocalChain {
    records: Vec<TransactionRecord>,
    known: HashSet<String>,
    pruned: HashSet<String>,
    synced_height: usize,
}

impl LocalChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain holding `records` as if they had been adopted at ledger height `synced_height`.
    #[cfg(test)]
    pub(crate) fn seeded(records: Vec<TransactionRecord>, synced_height: usize) -> Self {
        Self {
            known: records.iter().map(|r| r.id().to_string()).collect(),
            records,
            pruned: HashSet::new(),
            synced_height,
        }
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn tip_id(&self) -> Option<&str> {
        self.records.last().map(|r| r.id())
    }

    /// Ledger height observed at the last resync.
    pub fn synced_height(&self) -> usize {
        self.synced_height
    }

    pub fn contains(&self, id: &str) -> bool {
        self.known.contains(id)
    }

    /// Adopts every verified record not yet seen, re-validating each one, then resolves forks.
    ///
    /// Pruned records are returned; those the ledger does not hold as verified are
    /// requeued on its pending pool. A record that fails re-validation, or whose
    /// predecessor exists nowhere, is a fatal inconsistency.
    pub fn resync(&mut self, ledger: &Ledger) -> Result<Vec<TransactionRecord>, ChainError> {
        let snapshot = ledger.snapshot();
        if snapshot.verified.len() == self.synced_height {
            return Ok(Vec::new());
        }

        let before = self.known.clone();
        let mut pruned_all = Vec::new();

        for record in &snapshot.verified {
            let id = record.id();
            if self.known.contains(id) || self.pruned.contains(id) {
                continue;
            }

            if !self.records.is_empty() {
                record.validate_for_pool(snapshot.view()).map_err(|e| {
                    ChainError::ChainInconsistency(format!(
                        "verified record {} failed re-validation: {}",
                        id, e
                    ))
                })?;
                if !has_valid_proof_of_work(record, ledger.difficulty()) {
                    return Err(ChainError::ChainInconsistency(format!(
                        "verified record {} carries an invalid proof of work",
                        id
                    )));
                }

                let prev = record.prev_pointer().unwrap_or_default();
                if !self.known.contains(prev) {
                    if self.pruned.contains(prev) || snapshot.contains(prev) {
                        // Extends a branch this chain already discarded.
                        self.pruned.insert(id.to_string());
                        pruned_all.push(record.clone());
                        continue;
                    }
                    return Err(ChainError::ChainInconsistency(format!(
                        "verified record {} points at unknown predecessor {}",
                        id, prev
                    )));
                }
            }

            self.records.push(record.clone());
            self.known.insert(id.to_string());
        }

        for discarded in ForkResolver::resolve(&mut self.records, &before) {
            self.known.remove(discarded.id());
            self.pruned.insert(discarded.id().to_string());
            pruned_all.push(discarded);
        }

        self.synced_height = snapshot.verified.len();

        for record in &pruned_all {
            // Only records this chain holds alone can go back to pending.
            if ledger.contains_verified(record.id()) {
                debug!(id = record.short_id(), "pruned record is verified in the ledger, not requeued");
                continue;
            }
            if let Err(e) = ledger.requeue(record.clone()) {
                warn!(id = record.short_id(), kind = ?e.kind(), "pruned record was not requeued: {}", e);
            }
        }
        if !pruned_all.is_empty() {
            info!(pruned = pruned_all.len(), "resolved fork in local chain{}", self.display());
        }

        Ok(pruned_all)
    }

    /// Truncated ids of the local chain, one per line.
    pub fn display(&self) -> String {
        let mut out = String::from("\n");
        for record in &self.records {
            out.push('\t');
            out.push_str(record.short_id());
            out.push_str("...\n");
        }
        out
    }
}
