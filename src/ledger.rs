// Ledger state, proof-of-work arithmetic and spend checks live in submodules;
// everything callers need is re-exported here.

pub mod chain;
pub mod pow;
pub mod validation;

pub use chain::*;
pub use pow::{has_valid_proof_of_work, target_for_difficulty, verify_proof_of_work};
pub use validation::{find_double_spend, validate_no_double_spend};
