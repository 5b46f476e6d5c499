//! Proof-of-work target arithmetic and nonce search.

use crate::error::ChainError;
use crate::transaction::TransactionRecord;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Leading zero hex nibbles required by default.
pub const DEFAULT_DIFFICULTY: u32 = 5;

/// A 256-bit digest has 64 nibbles.
pub const MAX_DIFFICULTY: u32 = 64;

/// `(2^256 - 1) >> (4 * difficulty)` as a big-endian byte array.
pub fn target_for_difficulty(difficulty: u32) -> [u8; 32] {
    let mut target = [0xFF; 32];
    let shift_bits = difficulty.min(MAX_DIFFICULTY) * 4;
    let zero_bytes = (shift_bits / 8) as usize;
    let partial_bits = shift_bits % 8;

    for item in target.iter_mut().take(zero_bytes) {
        *item = 0;
    }
    if zero_bytes < 32 && partial_bits > 0 {
        target[zero_bytes] = 0xFF >> partial_bits;
    }
    target
}

/// Big-endian byte arrays compare like the 256-bit integers they encode.
pub fn meets_target(digest: &[u8; 32], target: &[u8; 32]) -> bool {
    digest <= target
}

/// `SHA256(canonical_content || nonce)`.
pub fn proof_digest(canonical_content: &[u8], nonce: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(canonical_content);
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

/// Whether the record's own nonce satisfies `difficulty`.
pub fn has_valid_proof_of_work(record: &TransactionRecord, difficulty: u32) -> bool {
    let digest = proof_digest(&record.canonical_content(), record.nonce());
    meets_target(&digest, &target_for_difficulty(difficulty))
}

/// Full check used at append time: the stored digest must match and meet the target.
pub fn verify_proof_of_work(record: &TransactionRecord, difficulty: u32) -> Result<(), ChainError> {
    let digest = proof_digest(&record.canonical_content(), record.nonce());
    let expected = hex::encode(digest);

    if record.proof_of_work() != Some(expected.as_str()) {
        return Err(ChainError::InvalidProofOfWork(format!(
            "stored digest does not match recomputed {} for record {}",
            expected,
            record.id()
        )));
    }
    if !meets_target(&digest, &target_for_difficulty(difficulty)) {
        return Err(ChainError::InvalidProofOfWork(format!(
            "digest {} is above the difficulty {} target",
            expected, difficulty
        )));
    }
    Ok(())
}

/// Result of one bounded batch of nonce draws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Winning nonce and its hex digest, if one was drawn.
    pub solution: Option<(u32, String)>,
    /// Number of digests computed in this batch.
    pub hashes: u64,
}

/// Draws up to `batch` uniformly random nonces against `canonical_content`.
pub fn search_batch<R: Rng + ?Sized>(
    canonical_content: &[u8],
    target: &[u8; 32],
    batch: u32,
    rng: &mut R,
) -> SearchResult {
    for attempt in 0..batch {
        let nonce: u32 = rng.gen();
        let digest = proof_digest(canonical_content, nonce);
        if meets_target(&digest, target) {
            return SearchResult {
                solution: Some((nonce, hex::encode(digest))),
                hashes: attempt as u64 + 1,
            };
        }
    }
    SearchResult {
        solution: None,
        hashes: batch as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Outputs, TxKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_record() -> TransactionRecord {
        let mut outputs = Outputs::new();
        outputs.insert("02".repeat(33), 10);
        let mut record = TransactionRecord::new(
            TxKind::Transfer,
            vec!["aa".repeat(32)],
            outputs,
            vec!["bb".repeat(64)],
        );
        record.set_prev_pointer("cc".repeat(32));
        record
    }

    fn mine(record: &mut TransactionRecord, difficulty: u32) {
        let target = target_for_difficulty(difficulty);
        let content = record.canonical_content();
        let mut rng = StdRng::seed_from_u64(7);
        loop {
            if let Some((nonce, digest)) = search_batch(&content, &target, 4096, &mut rng).solution {
                record.attach_proof(nonce, digest);
                return;
            }
        }
    }

    #[test]
    fn test_target_shifts_by_nibbles() {
        assert_eq!(target_for_difficulty(0), [0xFF; 32]);

        let one = target_for_difficulty(1);
        assert_eq!(one[0], 0x0F);
        assert_eq!(one[1], 0xFF);

        let five = target_for_difficulty(5);
        assert_eq!(&five[..3], &[0x00, 0x00, 0x0F]);
        assert_eq!(five[3], 0xFF);

        assert_eq!(target_for_difficulty(64), [0u8; 32]);
    }

    #[test]
    fn test_mined_record_verifies() {
        let mut record = sample_record();
        mine(&mut record, 2);
        assert!(has_valid_proof_of_work(&record, 2));
        assert!(verify_proof_of_work(&record, 2).is_ok());
        assert!(record.proof_of_work().unwrap().starts_with("00"));
    }

    #[test]
    fn test_tampered_nonce_or_tip_fails() {
        let mut record = sample_record();
        mine(&mut record, 2);

        let mut other_tip = record.clone();
        other_tip.set_prev_pointer("dd".repeat(32));
        assert!(verify_proof_of_work(&other_tip, 2).is_err());

        let mut wrong_digest = record.clone();
        wrong_digest.attach_proof(record.nonce(), "00".repeat(32));
        assert!(matches!(
            verify_proof_of_work(&wrong_digest, 2),
            Err(ChainError::InvalidProofOfWork(_))
        ));
    }

    #[test]
    fn test_search_batch_reports_hashes() {
        let content = sample_record().canonical_content();
        let mut rng = StdRng::seed_from_u64(1);
        let result = search_batch(&content, &target_for_difficulty(64), 16, &mut rng);
        assert_eq!(result.solution, None);
        assert_eq!(result.hashes, 16);

        let result = search_batch(&content, &target_for_difficulty(0), 16, &mut rng);
        assert_eq!(result.hashes, 1);
        assert!(result.solution.is_some());
    }
}
