//! Sample transaction sets for the simulation
//!
//! The generated scenario covers every record type together with the failure
//! modes the ledger has to catch: a double-spend pair, a record signed by the
//! wrong identity, a structurally invalid record and an overspend.

use crate::crypto::{Identity, KeyPair};
use crate::error::ChainError;
use crate::transaction::{Outputs, TransactionRecord, TxKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// One record as stored in the fixture file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixtureEntry {
    #[serde(rename = "NUMBER")]
    pub number: String,
    #[serde(rename = "TYPE")]
    pub kind: TxKind,
    #[serde(rename = "INPUT")]
    pub inputs: Vec<String>,
    #[serde(rename = "OUTPUT")]
    pub outputs: Outputs,
    #[serde(rename = "SIGNATURE")]
    pub signatures: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureFile {
    pub transactions: Vec<FixtureEntry>,
}

impl From<&TransactionRecord> for FixtureEntry {
    fn from(record: &TransactionRecord) -> Self {
        FixtureEntry {
            number: record.id().to_string(),
            kind: record.kind(),
            inputs: record.inputs().to_vec(),
            outputs: record.outputs().clone(),
            signatures: record.signatures().to_vec(),
        }
    }
}

impl FixtureEntry {
    /// Rebuilds the record, checking that `NUMBER` matches the content-derived id.
    pub fn into_record(self) -> Result<TransactionRecord, ChainError> {
        let record = TransactionRecord::new(self.kind, self.inputs, self.outputs, self.signatures);
        if record.id() != self.number {
            return Err(ChainError::StructuralError(format!(
                "fixture NUMBER {} does not match record content (expected {})",
                self.number,
                record.id()
            )));
        }
        Ok(record)
    }
}

/// A generated batch of records plus the chain length an honest run converges to.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Named participants, `user1` through `user5`.
    pub identities: BTreeMap<String, Identity>,
    pub records: Vec<TransactionRecord>,
    pub expected_chain_length: usize,
}

impl Scenario {
    /// Fresh keys, fresh records.
    ///
    /// Genesis, nine valid spends of which one member of the double-spend pair is
    /// mined, and three records the pending pool refuses.
    pub fn generate() -> Result<Self, ChainError> {
        let users: Vec<KeyPair> = (0..5).map(|_| KeyPair::generate()).collect();
        let (u1, u2, u3, u4, u5) = (&users[0], &users[1], &users[2], &users[3], &users[4]);

        let mut outputs = Outputs::new();
        outputs.insert(u1.identity(), 15);
        outputs.insert(u2.identity(), 5);
        outputs.insert(u3.identity(), 5);
        outputs.insert(u4.identity(), 20);
        let genesis = TransactionRecord::genesis(outputs);
        let g = genesis.id().to_string();

        let t1 = TransactionRecord::signed(TxKind::Transfer, vec![g.clone()], u1.identity(), 15, &[u1])?;
        let t2 = TransactionRecord::signed(TxKind::Transfer, vec![g.clone()], u2.identity(), 5, &[u2])?;
        let t3 = TransactionRecord::signed(TxKind::Transfer, vec![g.clone()], u3.identity(), 5, &[u3])?;
        let join = TransactionRecord::signed(
            TxKind::Join,
            vec![t2.id().to_string(), t3.id().to_string()],
            u1.identity(),
            10,
            &[u2, u3],
        )?;
        let merge = TransactionRecord::signed(
            TxKind::Merge,
            vec![t1.id().to_string(), join.id().to_string()],
            u1.identity(),
            25,
            &[u1, u1],
        )?;

        // Both spend the merge output; only one can be mined.
        let spend_a = TransactionRecord::signed(TxKind::Transfer, vec![merge.id().to_string()], u2.identity(), 25, &[u1])?;
        let spend_b = TransactionRecord::signed(TxKind::Transfer, vec![merge.id().to_string()], u3.identity(), 25, &[u1])?;

        let t4 = TransactionRecord::signed(TxKind::Transfer, vec![g], u4.identity(), 20, &[u4])?;
        let t5 = TransactionRecord::signed(TxKind::Transfer, vec![t4.id().to_string()], u5.identity(), 20, &[u4])?;

        // Signed by the recipient instead of the owner.
        let wrong_signer = TransactionRecord::signed(TxKind::Transfer, vec![t4.id().to_string()], u5.identity(), 20, &[u5])?;
        // A merge needs at least two inputs.
        let short_merge = TransactionRecord::signed(TxKind::Merge, vec![t5.id().to_string()], u5.identity(), 20, &[u5])?;
        let overspend = TransactionRecord::signed(TxKind::Transfer, vec![t5.id().to_string()], u1.identity(), 50, &[u5])?;

        let identities = users
            .iter()
            .enumerate()
            .map(|(i, keypair)| (format!("user{}", i + 1), keypair.identity()))
            .collect();

        Ok(Scenario {
            identities,
            records: vec![
                genesis, t1, t2, t3, join, merge, spend_a, spend_b, t4, t5, wrong_signer, short_merge, overspend,
            ],
            expected_chain_length: 9,
        })
    }
}

/// Writes `records` as a fixture file.
pub fn save(records: &[TransactionRecord], path: impl AsRef<Path>) -> Result<(), ChainError> {
    let file = FixtureFile {
        transactions: records.iter().map(FixtureEntry::from).collect(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    fs::write(path.as_ref(), json)?;
    info!(path = %path.as_ref().display(), records = records.len(), "wrote fixture file");
    Ok(())
}

pub fn load(path: impl AsRef<Path>) -> Result<Vec<TransactionRecord>, ChainError> {
    let raw = fs::read_to_string(path.as_ref())?;
    let file: FixtureFile = serde_json::from_str(&raw)?;
    file.transactions
        .into_iter()
        .map(FixtureEntry::into_record)
        .collect()
}
