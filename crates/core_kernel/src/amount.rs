//! Decimal amount and quantity helpers
//!
//! Ledger amounts and inventory quantities are plain `rust_decimal::Decimal`
//! values. Amounts carry their debit/credit meaning in the sign, so this module
//! only provides the arithmetic the posting rules share: rounding, pro-rata
//! allocation and the zero floor applied when quantities are rolled back.

use rust_decimal::Decimal;
use thiserror::Error;

/// Internal precision for amounts and quantities
pub const AMOUNT_SCALE: u32 = 4;

/// Precision used when allocating a currency amount across lines
pub const CURRENCY_SCALE: u32 = 2;

/// Errors that can occur during amount calculations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Division by zero")]
    DivisionByZero,
}

/// Rounds to the internal amount precision
pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp(AMOUNT_SCALE)
}

/// Clamps a rolled-back quantity at zero
///
/// Reversals subtract quantities that were added by an earlier posting. When
/// the stored value was already corrupted or reversed twice, the result never
/// goes below zero.
pub fn floor_at_zero(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Allocates `total` according to the given weights
///
/// Every share is rounded to `scale` decimal places, and the last share with
/// a non-zero weight receives the remainder so the allocations always sum
/// exactly to `total`. Zero weights always get zero. Returns allocations in
/// the same order as the weights.
///
/// # Errors
///
/// Returns an error if `weights` is empty or sums to zero
pub fn allocate_by_ratios(
    total: Decimal,
    weights: &[Decimal],
    scale: u32,
) -> Result<Vec<Decimal>, AmountError> {
    if weights.is_empty() {
        return Err(AmountError::InvalidAmount("Empty ratios".to_string()));
    }

    let total_weight: Decimal = weights.iter().sum();
    if total_weight.is_zero() {
        return Err(AmountError::DivisionByZero);
    }

    let mut allocations: Vec<Decimal> = weights
        .iter()
        .map(|weight| {
            if weight.is_zero() {
                Decimal::ZERO
            } else {
                (total * *weight / total_weight).round_dp(scale)
            }
        })
        .collect();

    // A zero weight never absorbs rounding
    if let Some(last) = weights.iter().rposition(|weight| !weight.is_zero()) {
        let others: Decimal = allocations
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != last)
            .map(|(_, share)| *share)
            .sum();
        allocations[last] = total - others;
    }

    Ok(allocations)
}

/// Allocates `total` pro rata, returning zeros when there is nothing to weigh by
pub fn allocate_pro_rata(total: Decimal, weights: &[Decimal], scale: u32) -> Vec<Decimal> {
    match allocate_by_ratios(total, weights, scale) {
        Ok(allocations) => allocations,
        Err(_) => vec![Decimal::ZERO; weights.len()],
    }
}
