//! General ledger journals
//!
//! Amounts are signed: debits are positive and credits negative. Lines are
//! always written in pairs sharing one `JournalLineReference`, so a journal
//! is balanced exactly when every reference group sums to zero.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{AccountingPeriodId, CompanyId, JournalId, JournalLineId, JournalLineReference, UserId};

use crate::error::PostingError;
use crate::labels::labelled_enum;

labelled_enum! {
    /// Document kind a ledger entry was derived from
    pub enum DocumentType ("document type") {
        SalesInvoice => "Sales Invoice",
        SalesShipment => "Sales Shipment",
        TransferShipment => "Transfer Shipment",
    }
}

impl DocumentType {
    /// Short kind used in document line references
    pub fn slug(&self) -> &'static str {
        match self {
            DocumentType::SalesInvoice => "sales-invoice",
            DocumentType::SalesShipment => "sales-shipment",
            DocumentType::TransferShipment => "transfer-shipment",
        }
    }
}

/// Builds the `"<kind>:<line id>"` reference tying a ledger line to its document line
pub fn document_line_reference(document_type: DocumentType, line_id: Uuid) -> String {
    format!("{}:{}", document_type.slug(), line_id)
}

/// A journal header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Journal {
    pub id: JournalId,
    pub company_id: CompanyId,
    pub accounting_period_id: AccountingPeriodId,
    pub description: String,
    pub posting_date: NaiveDate,
    pub created_by: UserId,
}

/// A single journal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalLine {
    pub id: JournalLineId,
    pub journal_id: JournalId,
    pub company_id: CompanyId,
    pub account_number: String,
    pub description: String,
    /// Positive for a debit, negative for a credit
    pub amount: Decimal,
    pub quantity: Decimal,
    pub document_type: DocumentType,
    pub document_id: Uuid,
    pub external_document_id: Option<String>,
    pub document_line_reference: String,
    pub journal_line_reference: JournalLineReference,
}

impl JournalLine {
    pub fn is_debit(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

/// Document context shared by every line of one journal
#[derive(Debug, Clone)]
pub struct JournalSource {
    pub journal_id: JournalId,
    pub company_id: CompanyId,
    pub document_type: DocumentType,
    pub document_id: Uuid,
    pub external_document_id: Option<String>,
}

/// One side of a journal pair
#[derive(Debug, Clone)]
pub struct PairLeg<'a> {
    pub account_number: &'a str,
    pub description: String,
}

impl JournalSource {
    /// Creates a debit/credit pair for `amount` under a fresh reference
    ///
    /// # Arguments
    ///
    /// * `debit` - Account and description receiving `+amount`
    /// * `credit` - Account and description receiving `-amount`
    /// * `amount` - Unsigned amount of the pair
    /// * `quantity` - Quantity recorded on both lines
    /// * `document_line_reference` - Document line both lines derive from
    pub fn pair(
        &self,
        debit: PairLeg<'_>,
        credit: PairLeg<'_>,
        amount: Decimal,
        quantity: Decimal,
        document_line_reference: &str,
    ) -> [JournalLine; 2] {
        let reference = JournalLineReference::new();
        [
            self.line(debit, amount, quantity, document_line_reference, reference),
            self.line(credit, -amount, quantity, document_line_reference, reference),
        ]
    }

    fn line(
        &self,
        leg: PairLeg<'_>,
        amount: Decimal,
        quantity: Decimal,
        document_line_reference: &str,
        journal_line_reference: JournalLineReference,
    ) -> JournalLine {
        JournalLine {
            id: JournalLineId::new_v7(),
            journal_id: self.journal_id,
            company_id: self.company_id,
            account_number: leg.account_number.to_string(),
            description: leg.description,
            amount,
            quantity,
            document_type: self.document_type,
            document_id: self.document_id,
            external_document_id: self.external_document_id.clone(),
            document_line_reference: document_line_reference.to_string(),
            journal_line_reference,
        }
    }
}

/// Sums amounts per journal line reference
pub fn reference_totals(lines: &[JournalLine]) -> BTreeMap<Uuid, (JournalLineReference, Decimal)> {
    let mut totals = BTreeMap::new();
    for line in lines {
        let entry = totals
            .entry(*line.journal_line_reference.as_uuid())
            .or_insert((line.journal_line_reference, Decimal::ZERO));
        entry.1 += line.amount;
    }
    totals
}

/// Checks that every journal line reference nets to zero
///
/// # Errors
///
/// Returns `Unbalanced` for the first reference whose amounts do not sum to zero
pub fn ensure_balanced(lines: &[JournalLine]) -> Result<(), PostingError> {
    for (reference, sum) in reference_totals(lines).into_values() {
        if !sum.is_zero() {
            return Err(PostingError::Unbalanced { reference, sum });
        }
    }
    Ok(())
}

/// Net amount per account number
pub fn account_totals(lines: &[JournalLine]) -> BTreeMap<String, Decimal> {
    let mut totals = BTreeMap::new();
    for line in lines {
        *totals.entry(line.account_number.clone()).or_insert(Decimal::ZERO) += line.amount;
    }
    totals
}
