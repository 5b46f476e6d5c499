//! Transaction module split into types and validation for better modularity

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::PoolView;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::error::ChainError;
    use std::collections::HashMap;

    struct Fixture {
        alice: KeyPair,
        bob: KeyPair,
        carol: KeyPair,
        genesis: TransactionRecord,
    }

    fn fixture() -> Fixture {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let carol = KeyPair::generate();
        let mut outputs = Outputs::new();
        outputs.insert(alice.identity(), 15);
        outputs.insert(bob.identity(), 5);
        outputs.insert(carol.identity(), 5);
        let genesis = TransactionRecord::genesis(outputs);
        Fixture {
            alice,
            bob,
            carol,
            genesis,
        }
    }

    #[test]
    fn test_id_is_reproducible_from_content() {
        let f = fixture();
        let a = TransactionRecord::signed(
            TxKind::Transfer,
            vec![f.genesis.id().to_string()],
            f.alice.identity(),
            15,
            &[&f.alice],
        )
        .unwrap();
        let b = TransactionRecord::new(
            a.kind(),
            a.inputs().to_vec(),
            a.outputs().clone(),
            a.signatures().to_vec(),
        );
        assert_eq!(a.id(), b.id());
        assert_eq!(
            a.id(),
            TransactionRecord::compute_id(a.inputs(), a.outputs(), a.signatures())
        );
    }

    #[test]
    fn test_mining_fields_do_not_change_id() {
        let f = fixture();
        let mut record = TransactionRecord::signed(
            TxKind::Transfer,
            vec![f.genesis.id().to_string()],
            f.bob.identity(),
            5,
            &[&f.bob],
        )
        .unwrap();
        let id = record.id().to_string();
        let before = record.canonical_content();

        record.set_prev_pointer(f.genesis.id());
        assert_eq!(record.id(), id);
        assert_ne!(record.canonical_content(), before);

        let with_prev = record.canonical_content();
        record.attach_proof(42, "ab".repeat(32));
        assert_eq!(record.canonical_content(), with_prev);
    }

    #[test]
    fn test_valid_transfer_from_genesis() {
        let f = fixture();
        let pending = HashMap::new();
        let verified = vec![f.genesis.clone()];
        let record = TransactionRecord::signed(
            TxKind::Transfer,
            vec![f.genesis.id().to_string()],
            f.alice.identity(),
            15,
            &[&f.alice],
        )
        .unwrap();

        assert!(record
            .validate_for_pool(PoolView::new(&pending, &verified))
            .is_ok());
    }

    #[test]
    fn test_input_may_point_at_pending_record() {
        let f = fixture();
        let verified = vec![f.genesis.clone()];
        let first = TransactionRecord::signed(
            TxKind::Transfer,
            vec![f.genesis.id().to_string()],
            f.carol.identity(),
            5,
            &[&f.carol],
        )
        .unwrap();
        let mut pending = HashMap::new();
        pending.insert(first.id().to_string(), first.clone());

        let second = TransactionRecord::signed(
            TxKind::Transfer,
            vec![first.id().to_string()],
            f.alice.identity(),
            5,
            &[&f.carol],
        )
        .unwrap();
        assert!(second
            .validate_for_pool(PoolView::new(&pending, &verified))
            .is_ok());
    }

    #[test]
    fn test_structural_rules() {
        let f = fixture();
        let input = f.genesis.id().to_string();

        // Merge with a single input
        let merge = TransactionRecord::signed(
            TxKind::Merge,
            vec![input.clone()],
            f.alice.identity(),
            1,
            &[&f.alice],
        )
        .unwrap();
        assert!(matches!(
            merge.validate_structure(),
            Err(ChainError::StructuralError(_))
        ));

        // Transfer with two inputs
        let transfer = TransactionRecord::signed(
            TxKind::Transfer,
            vec![input.clone(), "cd".repeat(32)],
            f.alice.identity(),
            1,
            &[&f.alice, &f.alice],
        )
        .unwrap();
        assert!(transfer.validate_structure().is_err());

        // Signature count mismatch
        let mut outputs = Outputs::new();
        outputs.insert(f.alice.identity(), 1);
        let unsigned = TransactionRecord::new(TxKind::Transfer, vec![input.clone()], outputs, vec![]);
        assert!(unsigned.validate_structure().is_err());

        // Zero amount
        let zero = TransactionRecord::signed(
            TxKind::Transfer,
            vec![input.clone()],
            f.alice.identity(),
            0,
            &[&f.alice],
        )
        .unwrap();
        assert!(zero.validate_structure().is_err());

        // Two outputs
        let mut outputs = Outputs::new();
        outputs.insert(f.alice.identity(), 1);
        outputs.insert(f.bob.identity(), 1);
        let split = TransactionRecord::new(
            TxKind::Transfer,
            vec![input.clone()],
            outputs,
            vec!["ab".repeat(64)],
        );
        assert!(split.validate_structure().is_err());

        // Same input cited twice
        let dup = TransactionRecord::signed(
            TxKind::Merge,
            vec![input.clone(), input],
            f.alice.identity(),
            1,
            &[&f.alice, &f.alice],
        )
        .unwrap();
        assert!(dup.validate_structure().is_err());

        // Genesis has no inputs and never passes pool validation
        assert!(f.genesis.validate_structure().is_err());
    }

    #[test]
    fn test_signer_without_funds_is_invalid_sender() {
        let f = fixture();
        let stranger = KeyPair::generate();
        let pending = HashMap::new();
        let verified = vec![f.genesis.clone()];

        let record = TransactionRecord::signed(
            TxKind::Transfer,
            vec![f.genesis.id().to_string()],
            stranger.identity(),
            5,
            &[&stranger],
        )
        .unwrap();

        let result = record.validate_for_pool(PoolView::new(&pending, &verified));
        assert!(matches!(result, Err(ChainError::InvalidSender(_))));
    }

    #[test]
    fn test_unknown_input_is_invalid_sender() {
        let f = fixture();
        let pending = HashMap::new();
        let verified = vec![f.genesis.clone()];
        let record = TransactionRecord::signed(
            TxKind::Transfer,
            vec!["00".repeat(32)],
            f.alice.identity(),
            1,
            &[&f.alice],
        )
        .unwrap();
        assert!(matches!(
            record.validate_for_pool(PoolView::new(&pending, &verified)),
            Err(ChainError::InvalidSender(_))
        ));
    }

    #[test]
    fn test_overspend_from_genesis_is_insufficient() {
        let f = fixture();
        let pending = HashMap::new();
        let verified = vec![f.genesis.clone()];
        let record = TransactionRecord::signed(
            TxKind::Transfer,
            vec![f.genesis.id().to_string()],
            f.bob.identity(),
            6,
            &[&f.bob],
        )
        .unwrap();

        assert_eq!(
            record.validate_for_pool(PoolView::new(&pending, &verified)),
            Err(ChainError::InsufficientFunds {
                available: 5,
                required: 6
            })
        );
    }

    #[test]
    fn test_additional_structure() {
        let f = fixture();
        let mut record = TransactionRecord::signed(
            TxKind::Transfer,
            vec![f.genesis.id().to_string()],
            f.alice.identity(),
            15,
            &[&f.alice],
        )
        .unwrap();
        assert!(matches!(
            record.validate_additional_structure(),
            Err(ChainError::InvalidAdditionalStructure(_))
        ));

        record.set_prev_pointer(f.genesis.id());
        assert!(record.validate_additional_structure().is_err());

        record.attach_proof(7, "not-a-digest");
        assert!(record.validate_additional_structure().is_err());

        record.attach_proof(7, "0f".repeat(32));
        assert!(record.validate_additional_structure().is_ok());

        record.clear_mining_fields();
        assert_eq!(record.prev_pointer(), None);
        assert_eq!(record.nonce(), 0);
    }

    #[test]
    fn test_display_marks_genesis() {
        let f = fixture();
        assert!(f.genesis.display().contains("GENESIS TRANSACTION"));
        assert!(f.genesis.display().contains("prev_pointer:   None"));
    }

    #[test]
    fn test_deserialized_id_must_match_content() {
        let f = fixture();
        let mut record = TransactionRecord::signed(
            TxKind::Transfer,
            vec![f.genesis.id().to_string()],
            f.alice.identity(),
            15,
            &[&f.alice],
        )
        .unwrap();
        record.set_prev_pointer(f.genesis.id());
        record.attach_proof(42, "0a".repeat(32));

        let json = serde_json::to_string(&record).unwrap();
        let reloaded: TransactionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, record);
        assert_eq!(reloaded.nonce(), 42);

        let tampered = json.replace(record.id(), &"ab".repeat(32));
        let err = serde_json::from_str::<TransactionRecord>(&tampered).unwrap_err();
        assert!(err.to_string().contains("does not match its content"));
    }

    #[test]
    fn test_rendering_tolerates_non_ascii_signatures() {
        let f = fixture();
        let record = TransactionRecord::new(
            TxKind::Transfer,
            vec![f.genesis.id().to_string()],
            f.genesis.outputs().clone(),
            vec![format!("a{}", "é".repeat(8))],
        );
        assert!(record.validate_structure().is_err());
        // Byte 10 falls inside a multi-byte character.
        let rendered = record.to_string();
        assert!(rendered.contains(&format!("a{}", "é".repeat(8))));
        assert_eq!(record.short_id().len(), 10);
    }
}
