//! Reversal builders
//!
//! Pure derivation of what voiding a posted document writes: negated journal
//! lines under a new journal, negated item ledger entries, tracked entities to
//! restore and the quantity rollbacks owed to the shipment's source document.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use core_kernel::{
    CompanyId, ItemLedgerId, JobId, JournalId, JournalLineId, PurchaseOrderLineId,
    SalesOrderId, SalesOrderLineId, TrackedActivityId, TrackedEntityId, UserId,
    WarehouseTransferId, WarehouseTransferLineId,
};

use crate::builder::{add_invoiced, OrderLineUpdate};
use crate::document::{LineType, SalesInvoiceLine, Shipment, ShipmentLine, ShipmentSource};
use crate::error::PostingError;
use crate::inventory::{ItemLedgerEntry, TrackedActivity, TrackedActivityInput, TrackedEntityRestore};
use crate::journal::{ensure_balanced, Journal, JournalLine};

/// Activity type recorded when a void restores tracked entities
pub const VOID_SHIPMENT_ACTIVITY: &str = "Void Shipment";

/// Ids and dates fixed by the caller for one void run
#[derive(Debug, Clone)]
pub struct ReversalContext {
    pub company_id: CompanyId,
    pub user_id: UserId,
    /// Id of the journal holding the reversing lines
    pub journal_id: JournalId,
    pub posting_date: NaiveDate,
    pub voided_at: DateTime<Utc>,
}

/// Ledger effects a document posted earlier
#[derive(Debug, Clone, Copy)]
pub struct PostedLedger<'a> {
    pub journal: Option<&'a Journal>,
    pub journal_lines: &'a [JournalLine],
    pub item_ledger_entries: &'a [ItemLedgerEntry],
}

/// Ledger effects that cancel a posted document
#[derive(Debug, Clone, Default)]
pub struct LedgerReversal {
    /// Description of the reversing journal, `None` when there is nothing to reverse
    pub journal_description: Option<String>,
    pub journal_lines: Vec<JournalLine>,
    pub item_ledger_entries: Vec<ItemLedgerEntry>,
    pub tracked_entities: Vec<TrackedEntityRestore>,
}

impl LedgerReversal {
    /// Appends another document's reversal into this one
    pub fn merge(&mut self, other: LedgerReversal) {
        if self.journal_description.is_none() {
            self.journal_description = other.journal_description;
        }
        self.journal_lines.extend(other.journal_lines);
        self.item_ledger_entries.extend(other.item_ledger_entries);
        self.tracked_entities.extend(other.tracked_entities);
    }
}

/// Description of the journal that reverses `original`
pub fn void_journal_description(original: &str) -> String {
    format!("VOID {original}")
}

/// Negates journal lines under a new journal
///
/// Account, document line reference and journal line reference are kept so
/// each reversing pair cancels its original pair.
pub fn reverse_journal_lines(original: &[JournalLine], journal_id: JournalId) -> Vec<JournalLine> {
    original
        .iter()
        .map(|line| JournalLine {
            id: JournalLineId::new_v7(),
            journal_id,
            description: format!("VOID: {}", line.description),
            amount: -line.amount,
            quantity: -line.quantity,
            ..line.clone()
        })
        .collect()
}

/// Negates item ledger entries, flipping positive and negative adjustments
pub fn reverse_item_ledger_entries(
    original: &[ItemLedgerEntry],
    posting_date: NaiveDate,
    user_id: UserId,
) -> Vec<ItemLedgerEntry> {
    original
        .iter()
        .map(|entry| ItemLedgerEntry {
            id: ItemLedgerId::new_v7(),
            posting_date,
            quantity: -entry.quantity,
            entry_type: entry.entry_type.reversed(),
            created_by: user_id,
            ..entry.clone()
        })
        .collect()
}

/// Tracked entities moved by the entries, with the quantity each one gets back
///
/// The quantity is added to what the entity still holds, so a batch that was
/// only partly shipped keeps its remainder.
pub fn tracked_entity_restores(entries: &[ItemLedgerEntry]) -> Vec<TrackedEntityRestore> {
    let mut order: Vec<TrackedEntityId> = Vec::new();
    let mut quantities: HashMap<TrackedEntityId, Decimal> = HashMap::new();

    for entry in entries {
        let Some(tracked_entity_id) = entry.tracked_entity_id else {
            continue;
        };
        let quantity = quantities.entry(tracked_entity_id).or_insert_with(|| {
            order.push(tracked_entity_id);
            Decimal::ZERO
        });
        *quantity += entry.quantity.abs();
    }

    order
        .into_iter()
        .map(|tracked_entity_id| TrackedEntityRestore {
            tracked_entity_id,
            quantity: quantities.get(&tracked_entity_id).copied().unwrap_or_default(),
        })
        .collect()
}

/// Builds the full ledger reversal of one posted document
///
/// # Errors
///
/// Returns `Unbalanced` if the original lines did not balance, which would
/// carry over into the reversal
pub fn reverse_ledger(
    posted: &PostedLedger<'_>,
    context: &ReversalContext,
) -> Result<LedgerReversal, PostingError> {
    let journal_lines = reverse_journal_lines(posted.journal_lines, context.journal_id);
    ensure_balanced(&journal_lines)?;

    let journal_description = match (posted.journal, journal_lines.is_empty()) {
        (_, true) => None,
        (Some(journal), false) => Some(void_journal_description(&journal.description)),
        (None, false) => Some(void_journal_description("journal")),
    };

    Ok(LedgerReversal {
        journal_description,
        journal_lines,
        item_ledger_entries: reverse_item_ledger_entries(
            posted.item_ledger_entries,
            context.posting_date,
            context.user_id,
        ),
        tracked_entities: tracked_entity_restores(posted.item_ledger_entries),
    })
}

/// An activity with its input rows
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedActivityRecord {
    pub activity: TrackedActivity,
    pub inputs: Vec<TrackedActivityInput>,
}

/// Audit trail for tracked entities restored by voiding a shipment
///
/// Returns `None` if the shipment moved no tracked entities.
pub fn void_shipment_activity(
    shipment: &Shipment,
    restores: &[TrackedEntityRestore],
    context: &ReversalContext,
) -> Option<TrackedActivityRecord> {
    if restores.is_empty() {
        return None;
    }

    let activity = TrackedActivity {
        id: TrackedActivityId::new_v7(),
        company_id: context.company_id,
        activity_type: VOID_SHIPMENT_ACTIVITY.to_string(),
        source_document: "Shipment".to_string(),
        source_document_id: *shipment.id.as_uuid(),
        attributes: json!({
            "Shipment": shipment.shipment_number,
            "Source Document": shipment.source_document.as_str(),
            "Voided By": context.user_id.as_uuid().to_string(),
            "Voided At": context.voided_at.to_rfc3339(),
        }),
        created_by: context.user_id,
        created_at: context.voided_at,
    };

    let inputs = restores
        .iter()
        .map(|restore| TrackedActivityInput {
            tracked_activity_id: activity.id,
            tracked_entity_id: restore.tracked_entity_id,
            company_id: context.company_id,
            quantity: restore.quantity,
            entity_type: "Shipment".to_string(),
        })
        .collect();

    Some(TrackedActivityRecord { activity, inputs })
}

/// Quantities to give back to the document a shipment fulfilled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRollback {
    SalesOrder {
        sales_order_id: SalesOrderId,
        lines: Vec<(SalesOrderLineId, Decimal)>,
    },
    PurchaseOrder {
        lines: Vec<(PurchaseOrderLineId, Decimal)>,
    },
    OutboundTransfer {
        transfer_id: WarehouseTransferId,
        lines: Vec<(WarehouseTransferLineId, Decimal)>,
    },
}

fn linked_quantities<T: From<uuid::Uuid>>(lines: &[ShipmentLine]) -> Vec<(T, Decimal)> {
    lines
        .iter()
        .filter_map(|line| line.line_id.map(|id| (T::from(id), line.shipped_quantity)))
        .collect()
}

/// Per-source rollback of a voided shipment
///
/// # Errors
///
/// Returns `InvalidState` for shipments generated by a sales invoice; those
/// are voided through the invoice
pub fn source_rollback(source: ShipmentSource, lines: &[ShipmentLine]) -> Result<SourceRollback, PostingError> {
    match source {
        ShipmentSource::SalesOrder(sales_order_id) => Ok(SourceRollback::SalesOrder {
            sales_order_id,
            lines: linked_quantities(lines),
        }),
        ShipmentSource::PurchaseOrder(_) => Ok(SourceRollback::PurchaseOrder {
            lines: linked_quantities(lines),
        }),
        ShipmentSource::OutboundTransfer(transfer_id) => Ok(SourceRollback::OutboundTransfer {
            transfer_id,
            lines: linked_quantities(lines),
        }),
        ShipmentSource::SalesInvoice(invoice_id) => Err(PostingError::invalid_state(format!(
            "shipment was generated by sales invoice {invoice_id}; void the invoice instead"
        ))),
    }
}

/// Shipped quantity to take back from each job, summed per job
pub fn job_rollbacks(lines: &[ShipmentLine]) -> Vec<(JobId, Decimal)> {
    let mut rollbacks: Vec<(JobId, Decimal)> = Vec::new();
    for line in lines {
        let Some(job_id) = line.job_id else { continue };
        match rollbacks.iter_mut().find(|(id, _)| *id == job_id) {
            Some((_, quantity)) => *quantity += line.shipped_quantity,
            None => rollbacks.push((job_id, line.shipped_quantity)),
        }
    }
    rollbacks
}

/// Invoiced quantity to take back from each sales order line
pub fn invoiced_rollbacks(lines: &[SalesInvoiceLine]) -> Vec<OrderLineUpdate> {
    let mut rollbacks = Vec::new();
    for line in lines.iter().filter(|line| line.invoice_line_type != LineType::Comment) {
        if let Some(sales_order_line_id) = line.sales_order_line_id {
            add_invoiced(&mut rollbacks, sales_order_line_id, line.quantity);
        }
    }
    rollbacks
}
