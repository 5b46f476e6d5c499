/// Validation logic for transaction records, separated from the type definitions
use crate::crypto::{verify_signature, Identity};
use crate::error::ChainError;
use crate::transaction::types::{TransactionRecord, TxKind, DIGEST_HEX_LEN, MAX_TRANSACTION_SIZE};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Read-only view of both pools that a record is validated against.
#[derive(Clone, Copy)]
pub struct PoolView<'a> {
    pub pending: &'a HashMap<String, TransactionRecord>,
    pub verified: &'a [TransactionRecord],
}

impl<'a> PoolView<'a> {
    pub fn new(
        pending: &'a HashMap<String, TransactionRecord>,
        verified: &'a [TransactionRecord],
    ) -> Self {
        Self { pending, verified }
    }

    /// Every `(owner, amount)` pair that the record `id` paid out, searching both pools.
    pub fn resolve_outputs(&self, id: &str) -> BTreeMap<Identity, u64> {
        let mut outputs = BTreeMap::new();
        if let Some(record) = self.pending.get(id) {
            outputs.extend(record.outputs().iter().map(|(k, v)| (k.clone(), *v)));
        }
        for record in self.verified.iter().filter(|r| r.id() == id) {
            outputs.extend(record.outputs().iter().map(|(k, v)| (k.clone(), *v)));
        }
        outputs
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl TransactionRecord {
    /// Field-level checks that need no ledger state.
    pub fn validate_structure(&self) -> Result<(), ChainError> {
        if self.inputs().is_empty() {
            return Err(ChainError::StructuralError(
                "Record must reference at least one input".to_string(),
            ));
        }
        if self.inputs().len() != self.signatures().len() {
            return Err(ChainError::StructuralError(format!(
                "{} inputs but {} signatures",
                self.inputs().len(),
                self.signatures().len()
            )));
        }

        let (recipient, amount) = self.single_output().ok_or_else(|| {
            ChainError::StructuralError(format!(
                "Record must have exactly one output, got {}",
                self.outputs().len()
            ))
        })?;
        if amount == 0 {
            return Err(ChainError::StructuralError(
                "Output amount must be positive".to_string(),
            ));
        }
        if !is_hex(recipient) {
            return Err(ChainError::StructuralError(
                "Output recipient is not a serialized identity".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for input in self.inputs() {
            if input.len() != DIGEST_HEX_LEN || !is_hex(input) {
                return Err(ChainError::StructuralError(format!(
                    "Input {} is not a transaction id",
                    input
                )));
            }
            if !seen.insert(input.as_str()) {
                return Err(ChainError::StructuralError(format!(
                    "Input {} is cited more than once",
                    input
                )));
            }
        }
        if let Some(bad) = self.signatures().iter().find(|s| !is_hex(s)) {
            return Err(ChainError::StructuralError(format!(
                "Signature {} is not hex",
                bad
            )));
        }

        match self.kind() {
            TxKind::Transfer if self.inputs().len() != 1 => {
                return Err(ChainError::StructuralError(format!(
                    "Transfer must have exactly one input, got {}",
                    self.inputs().len()
                )))
            }
            TxKind::Merge | TxKind::Join if self.inputs().len() < 2 => {
                return Err(ChainError::StructuralError(format!(
                    "{} must have more than one input",
                    self.kind()
                )))
            }
            _ => {}
        }

        let serialized = bincode::serialize(self)?;
        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(ChainError::StructuralError(format!(
                "Record too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }

        Ok(())
    }

    /// For each input, the identity whose signature verified and the amount it was owed.
    pub fn resolve_senders(&self, view: PoolView<'_>) -> Result<Vec<(Identity, u64)>, ChainError> {
        let message = self.signable_message();
        let mut senders = Vec::with_capacity(self.inputs().len());

        for (input, signature) in self.inputs().iter().zip(self.signatures()) {
            // Genesis pays several owners under one id, so every candidate is tried.
            let candidates = view.resolve_outputs(input);
            let sender = candidates
                .into_iter()
                .find(|(identity, _)| verify_signature(identity, signature, &message).is_ok());

            match sender {
                Some(found) => senders.push(found),
                None => {
                    return Err(ChainError::InvalidSender(format!(
                        "No owner of input {} signed record {}",
                        input,
                        self.id()
                    )))
                }
            }
        }

        Ok(senders)
    }

    /// Sum of what every verified sender was owed must cover the output; the excess is forfeited.
    pub fn validate_funds(&self, senders: &[(Identity, u64)]) -> Result<(), ChainError> {
        let mut sender_funds: HashMap<&str, u64> = HashMap::new();
        for (identity, amount) in senders {
            let entry = sender_funds.entry(identity.as_str()).or_insert(0);
            *entry = entry.saturating_add(*amount);
        }
        let available = sender_funds
            .values()
            .fold(0u64, |acc, v| acc.saturating_add(*v));
        let required = self.single_output().map(|(_, amount)| amount).unwrap_or(0);

        if available < required {
            return Err(ChainError::InsufficientFunds {
                available,
                required,
            });
        }
        Ok(())
    }

    /// Structural, sender and funds checks against a snapshot of both pools.
    pub fn validate_for_pool(&self, view: PoolView<'_>) -> Result<(), ChainError> {
        self.validate_structure()?;
        let senders = self.resolve_senders(view)?;
        self.validate_funds(&senders)
    }

    /// Checks the fields filled in by mining.
    pub fn validate_additional_structure(&self) -> Result<(), ChainError> {
        match self.prev_pointer() {
            Some(prev) if prev.len() == DIGEST_HEX_LEN && is_hex(prev) => {}
            Some(prev) => {
                return Err(ChainError::InvalidAdditionalStructure(format!(
                    "prev_pointer {} is not a transaction id",
                    prev
                )))
            }
            None => {
                return Err(ChainError::InvalidAdditionalStructure(
                    "prev_pointer is missing".to_string(),
                ))
            }
        }

        match self.proof_of_work() {
            Some(pow) if pow.len() == DIGEST_HEX_LEN && is_hex(pow) => Ok(()),
            Some(pow) => Err(ChainError::InvalidAdditionalStructure(format!(
                "proof_of_work {} is not a digest",
                pow
            ))),
            None => Err(ChainError::InvalidAdditionalStructure(
                "proof_of_work is missing".to_string(),
            )),
        }
    }
}
