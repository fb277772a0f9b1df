//! Custom Test Assertions
//!
//! Ledger assertions with messages that name the offending reference or
//! account instead of dumping whole line vectors.

use std::collections::HashSet;

use rust_decimal::Decimal;

use domain_posting::journal::{account_totals, reference_totals};
use domain_posting::{ItemLedgerEntry, JournalLine, StoreState};

/// Asserts that every journal line reference nets to zero
///
/// # Panics
///
/// Panics naming the first reference whose amounts do not sum to zero
pub fn assert_balanced_by_reference(lines: &[JournalLine]) {
    for (reference, sum) in reference_totals(lines).into_values() {
        assert!(
            sum.is_zero(),
            "Journal line reference {} sums to {}, expected 0",
            reference,
            sum
        );
    }
}

/// Asserts that every reference groups exactly one debit and one credit
pub fn assert_paired(lines: &[JournalLine]) {
    for (uuid, _) in reference_totals(lines) {
        let group: Vec<&JournalLine> = lines
            .iter()
            .filter(|line| *line.journal_line_reference.as_uuid() == uuid)
            .collect();
        let debits = group.iter().filter(|line| line.is_debit()).count();
        assert_eq!(
            (group.len(), debits),
            (2, 1),
            "Journal line reference {} has {} lines with {} debits, expected one debit and one credit",
            uuid,
            group.len(),
            debits
        );
    }
}

/// Asserts that every account nets to zero over `lines`
///
/// Used on a document's lines together with its void.
pub fn assert_accounts_net_to_zero(lines: &[JournalLine]) {
    for (account, total) in account_totals(lines) {
        assert!(total.is_zero(), "Account {} nets to {}, expected 0", account, total);
    }
}

/// Asserts the net amount booked to one account
pub fn assert_account_total(lines: &[JournalLine], account: &str, expected: Decimal) {
    let actual = account_totals(lines).get(account).copied().unwrap_or(Decimal::ZERO);
    assert_eq!(actual, expected, "Account {} totals {}, expected {}", account, actual, expected);
}

/// Asserts that item ledger quantities net to zero per item
pub fn assert_item_quantities_net_to_zero(entries: &[ItemLedgerEntry]) {
    let items: HashSet<_> = entries.iter().map(|entry| entry.item_id).collect();
    for item_id in items {
        let total: Decimal = entries
            .iter()
            .filter(|entry| entry.item_id == item_id)
            .map(|entry| entry.quantity)
            .sum();
        assert!(total.is_zero(), "Item {} quantities net to {}, expected 0", item_id, total);
    }
}

/// Asserts that a store state holds no ledger writes at all
pub fn assert_no_ledger_writes(state: &StoreState) {
    assert!(state.journals.is_empty(), "Expected no journals, found {}", state.journals.len());
    assert!(
        state.journal_lines.is_empty(),
        "Expected no journal lines, found {}",
        state.journal_lines.len()
    );
    assert!(
        state.item_ledger_entries.is_empty(),
        "Expected no item ledger entries, found {}",
        state.item_ledger_entries.len()
    );
}

/// Asserts that a Decimal value is within tolerance of the expected value
pub fn assert_decimal_approx_eq(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "Values differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual,
        expected,
        diff,
        tolerance
    );
}
