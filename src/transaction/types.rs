/// Transaction record types for powledger
use crate::crypto::{sha256_hex, Identity, KeyPair};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum serialized record size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Length of a hex encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Recipient identity -> amount. Ordered so that hashing is deterministic.
pub type Outputs = BTreeMap<Identity, u64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    /// One input, one output.
    #[serde(rename = "TRANS")]
    Transfer,
    /// Several inputs owned by one sender, one output.
    #[serde(rename = "MERGE")]
    Merge,
    /// Several inputs owned by several senders, one output.
    #[serde(rename = "JOIN")]
    Join,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Transfer => "TRANS",
            TxKind::Merge => "MERGE",
            TxKind::Join => "JOIN",
        }
    }
}

impl std::str::FromStr for TxKind {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANS" => Ok(TxKind::Transfer),
            "MERGE" => Ok(TxKind::Merge),
            "JOIN" => Ok(TxKind::Join),
            other => Err(ChainError::StructuralError(format!(
                "Unknown transaction type {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger entry.
///
/// The content fields (`kind`, `inputs`, `outputs`, `signatures`) and the
/// derived `id` are fixed at construction. Only the mining fields
/// (`prev_pointer`, `nonce`, `proof_of_work`) change, and only on a miner's
/// private copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecordFields")]
pub struct TransactionRecord {
    id: String,
    kind: TxKind,
    inputs: Vec<String>,
    outputs: Outputs,
    signatures: Vec<String>,
    prev_pointer: Option<String>,
    nonce: u32,
    proof_of_work: Option<String>,
}

/// Wire form of a record; the id is re-derived and checked on the way in.
#[derive(Deserialize)]
struct RecordFields {
    id: String,
    kind: TxKind,
    inputs: Vec<String>,
    outputs: Outputs,
    signatures: Vec<String>,
    prev_pointer: Option<String>,
    nonce: u32,
    proof_of_work: Option<String>,
}

impl TryFrom<RecordFields> for TransactionRecord {
    type Error = ChainError;

    fn try_from(fields: RecordFields) -> Result<Self, Self::Error> {
        let mut record = TransactionRecord::new(fields.kind, fields.inputs, fields.outputs, fields.signatures);
        if record.id != fields.id {
            return Err(ChainError::StructuralError(format!(
                "Record id {} does not match its content (expected {})",
                fields.id, record.id
            )));
        }
        record.prev_pointer = fields.prev_pointer;
        record.nonce = fields.nonce;
        record.proof_of_work = fields.proof_of_work;
        Ok(record)
    }
}

fn push_field(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn push_outputs(buf: &mut Vec<u8>, outputs: &Outputs) {
    buf.extend_from_slice(&(outputs.len() as u32).to_le_bytes());
    for (identity, amount) in outputs {
        push_field(buf, identity.as_bytes());
        buf.extend_from_slice(&amount.to_le_bytes());
    }
}

fn push_list(buf: &mut Vec<u8>, items: &[String]) {
    buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
    for item in items {
        push_field(buf, item.as_bytes());
    }
}

impl TransactionRecord {
    pub fn new(kind: TxKind, inputs: Vec<String>, outputs: Outputs, signatures: Vec<String>) -> Self {
        let id = Self::compute_id(&inputs, &outputs, &signatures);
        TransactionRecord {
            id,
            kind,
            inputs,
            outputs,
            signatures,
            prev_pointer: None,
            nonce: 0,
            proof_of_work: None,
        }
    }

    /// The input-less record seeding the initial distribution of funds.
    pub fn genesis(outputs: Outputs) -> Self {
        Self::new(TxKind::Transfer, Vec::new(), outputs, Vec::new())
    }

    /// Builds a record paying `amount` to `recipient`, with `signers[i]` signing for `inputs[i]`.
    pub fn signed(
        kind: TxKind,
        inputs: Vec<String>,
        recipient: Identity,
        amount: u64,
        signers: &[&KeyPair],
    ) -> Result<Self, ChainError> {
        let mut outputs = Outputs::new();
        outputs.insert(recipient, amount);

        let message = Self::signable_message_for(kind, &inputs, &outputs);
        let signatures = signers
            .iter()
            .map(|keypair| keypair.sign(&message))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(kind, inputs, outputs, signatures))
    }

    /// Content-derived id over `(inputs, outputs, signatures)`.
    pub fn compute_id(inputs: &[String], outputs: &Outputs, signatures: &[String]) -> String {
        let mut buf = Vec::new();
        push_list(&mut buf, inputs);
        push_outputs(&mut buf, outputs);
        push_list(&mut buf, signatures);
        sha256_hex(&buf)
    }

    fn signable_message_for(kind: TxKind, inputs: &[String], outputs: &Outputs) -> Vec<u8> {
        let mut message = Vec::new();
        push_field(&mut message, kind.as_str().as_bytes());
        push_list(&mut message, inputs);
        push_outputs(&mut message, outputs);
        message
    }

    /// The bytes every input signature covers: `(type, inputs, outputs)`.
    pub fn signable_message(&self) -> Vec<u8> {
        Self::signable_message_for(self.kind, &self.inputs, &self.outputs)
    }

    /// Deterministic serialization of every field except `nonce` and `proof_of_work`.
    pub fn canonical_content(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        push_field(&mut buf, self.id.as_bytes());
        push_field(&mut buf, self.kind.as_str().as_bytes());
        push_list(&mut buf, &self.inputs);
        push_outputs(&mut buf, &self.outputs);
        push_list(&mut buf, &self.signatures);
        match &self.prev_pointer {
            Some(prev) => {
                buf.push(1);
                push_field(&mut buf, prev.as_bytes());
            }
            None => buf.push(0),
        }
        buf
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TxKind {
        self.kind
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    pub fn prev_pointer(&self) -> Option<&str> {
        self.prev_pointer.as_deref()
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn proof_of_work(&self) -> Option<&str> {
        self.proof_of_work.as_deref()
    }

    pub fn is_genesis(&self) -> bool {
        self.inputs.is_empty()
    }

    /// The single `(recipient, amount)` pair of a non-genesis record.
    pub fn single_output(&self) -> Option<(&Identity, u64)> {
        if self.outputs.len() != 1 {
            return None;
        }
        self.outputs.iter().next().map(|(k, v)| (k, *v))
    }

    pub fn set_prev_pointer(&mut self, tip: impl Into<String>) {
        self.prev_pointer = Some(tip.into());
    }

    pub fn attach_proof(&mut self, nonce: u32, proof_of_work: impl Into<String>) {
        self.nonce = nonce;
        self.proof_of_work = Some(proof_of_work.into());
    }

    /// Returns the record to its unmined state.
    pub fn clear_mining_fields(&mut self) {
        self.prev_pointer = None;
        self.nonce = 0;
        self.proof_of_work = None;
    }

    pub fn short_id(&self) -> &str {
        self.id.get(..10).unwrap_or(&self.id)
    }

    /// Multi-line debug rendering of every field.
    pub fn display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_genesis() {
            writeln!(f, "   GENESIS TRANSACTION")?;
        } else {
            writeln!(f, "   transaction")?;
        }
        writeln!(f, "\tid:             {}", self.id)?;
        for (i, input) in self.inputs.iter().enumerate() {
            let label = if i == 0 { "input(s):" } else { "" };
            writeln!(f, "\t{:<16}{}", label, input)?;
        }
        for (identity, amount) in &self.outputs {
            writeln!(f, "\t{:<16}{} -> {}", "output:", identity, amount)?;
        }
        for (i, signature) in self.signatures.iter().enumerate() {
            let label = if i == 0 { "signature(s):" } else { "" };
            writeln!(f, "\t{:<16}{}...", label, signature.get(..10).unwrap_or(signature))?;
        }
        writeln!(
            f,
            "\tprev_pointer:   {}",
            self.prev_pointer.as_deref().unwrap_or("None")
        )?;
        writeln!(f, "\tnonce:          {}", self.nonce)?;
        writeln!(
            f,
            "\tproof_of_work:  {}",
            self.proof_of_work.as_deref().unwrap_or("None")
        )?;
        writeln!(f, "\ttype:           {}", self.kind)
    }
}
