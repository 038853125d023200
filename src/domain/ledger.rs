use super::{Cents, StatementRecord, UserId};

/// Effect of a record on `user`'s balance. Zero if the user is not a party.
pub fn balance_effect(user: UserId, record: &StatementRecord) -> Cents {
    record
        .view_for(user)
        .map(|view| view.signed_amount())
        .unwrap_or(0)
}

/// Compute the balance for a single user from a list of records.
/// Balance = deposits - withdrawals - outgoing transfers + incoming transfers
///
/// Records must be in append order. Each prefix sum is then a balance the
/// user actually held, which guarded appends keep within `0..=Cents::MAX`.
pub fn compute_balance(user: UserId, records: &[StatementRecord]) -> Cents {
    records
        .iter()
        .map(|record| balance_effect(user, record))
        .sum()
}
