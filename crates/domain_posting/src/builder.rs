//! Ledger line builder
//!
//! Pure derivation of the ledger effects of posting a sales invoice. Nothing
//! in this module performs I/O: every document, item, cost and posting group
//! it needs is fetched beforehand and handed in through
//! [`InvoicePostingInput`].
//!
//! # Amounts
//!
//! For each non-comment line:
//!
//! ```text
//! subtotal         = (quantity * unit_price + shipping_cost + add_on_cost) * exchange_rate
//! total_line_cost  = subtotal * (1 + tax_percent)
//! shipping_share   = invoice shipping allocated pro rata by total_line_cost
//! amount           = total_line_cost + shipping_share
//! ```
//!
//! # Branches
//!
//! * A line not linked to a sales order line and not made to order ships on the
//!   invoice: it gets a line on a generated shipment, a negative adjustment in
//!   the item ledger (inventory items only), an Inventory/COGS pair and a
//!   Sales/Receivables pair, both for `amount`.
//! * Every other item line was shipped earlier: it gets the Sales/Receivables
//!   pair for `amount` and, for inventory items, a COGS/Inventory pair valued at
//!   standard cost.
//! * Service lines only recognise revenue. Comment lines are skipped.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use core_kernel::amount::{allocate_pro_rata, round_amount, CURRENCY_SCALE};
use core_kernel::{
    CompanyId, ItemId, ItemLedgerId, JournalId, SalesOrderLineId, ShipmentId, ShipmentLineId, UserId,
};

use crate::document::{
    LineType, SalesInvoice, SalesInvoiceLine, Shipment, ShipmentLine, ShipmentSourceKind,
    ShipmentStatus,
};
use crate::error::PostingError;
use crate::inventory::{Customer, Item, ItemCost, ItemLedgerEntry, ItemLedgerEntryType};
use crate::journal::{
    document_line_reference, ensure_balanced, DocumentType, JournalLine, JournalSource, PairLeg,
};
use crate::posting_group::{InventoryGroupKey, PostingGroups, SalesGroupKey};

/// Identifiers and dates fixed by the caller for one posting run
#[derive(Debug, Clone)]
pub struct InvoicePostingContext {
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub posting_date: NaiveDate,
    pub journal_id: JournalId,
    /// Id given to the shipment generated for lines shipped on the invoice
    pub shipment_id: ShipmentId,
}

/// Everything the builder reads
#[derive(Debug, Clone, Copy)]
pub struct InvoicePostingInput<'a> {
    pub invoice: &'a SalesInvoice,
    pub lines: &'a [SalesInvoiceLine],
    pub items: &'a HashMap<ItemId, Item>,
    pub item_costs: &'a HashMap<ItemId, ItemCost>,
    pub customer: &'a Customer,
    pub posting_groups: &'a PostingGroups,
}

/// Shipment created for lines shipped straight off the invoice
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedShipment {
    pub shipment: Shipment,
    pub lines: Vec<ShipmentLine>,
}

/// Quantity to add to a sales order line's invoiced quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLineUpdate {
    pub sales_order_line_id: SalesOrderLineId,
    pub quantity_invoiced: Decimal,
}

/// All ledger effects of posting one invoice
#[derive(Debug, Clone, Default)]
pub struct InvoicePostingPlan {
    pub journal_lines: Vec<JournalLine>,
    pub item_ledger_entries: Vec<ItemLedgerEntry>,
    pub shipment: Option<GeneratedShipment>,
    pub order_line_updates: Vec<OrderLineUpdate>,
}

/// Posting groups a single line needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineGroupKeys {
    pub sales: SalesGroupKey,
    pub inventory: Option<InventoryGroupKey>,
}

/// Determines which posting groups a line needs
///
/// Returns `None` for comment lines.
///
/// # Errors
///
/// Returns `Lookup` if an item line has no item
pub fn line_group_keys(
    invoice: &SalesInvoice,
    line: &SalesInvoiceLine,
    item: Option<&Item>,
    customer: &Customer,
) -> Result<Option<LineGroupKeys>, PostingError> {
    let item_posting_group_id = item.and_then(|item| item.item_posting_group_id);
    let sales = SalesGroupKey {
        item_posting_group_id,
        customer_type_id: customer.customer_type_id,
    };

    let inventory = match line.invoice_line_type {
        LineType::Comment => return Ok(None),
        LineType::Service => None,
        LineType::Part | LineType::Material | LineType::Tool | LineType::Consumable | LineType::Fixture => {
            let item = item.ok_or_else(|| PostingError::lookup("item", line_item_label(line)))?;
            if line.ships_on_invoice() || item.is_inventory() {
                Some(InventoryGroupKey {
                    item_posting_group_id,
                    location_id: line.location_id.or(invoice.location_id),
                })
            } else {
                None
            }
        }
    };

    Ok(Some(LineGroupKeys { sales, inventory }))
}

fn line_item_label(line: &SalesInvoiceLine) -> String {
    match line.item_id {
        Some(item_id) => item_id.to_string(),
        None => format!("no item on line {}", line.id),
    }
}

fn leg<'a>(account_number: &'a str, description: &str) -> PairLeg<'a> {
    PairLeg {
        account_number,
        description: description.to_string(),
    }
}

/// Builds the ledger effects of posting a sales invoice
///
/// # Arguments
///
/// * `input` - The invoice, its lines and pre-fetched reference data
/// * `context` - Ids and posting date of this run
///
/// # Returns
///
/// Journal lines that balance per reference, item ledger entries, the
/// generated shipment (if any line ships on the invoice) and the invoiced
/// quantity to add per sales order line
///
/// # Errors
///
/// Returns `Lookup` when an item, item cost or posting group is missing, and
/// `Unbalanced` if the derived lines do not net to zero
pub fn build_invoice_posting(
    input: &InvoicePostingInput<'_>,
    context: &InvoicePostingContext,
) -> Result<InvoicePostingPlan, PostingError> {
    let invoice = input.invoice;
    let rate = invoice.exchange_rate;

    let postable: Vec<&SalesInvoiceLine> = input
        .lines
        .iter()
        .filter(|line| line.invoice_line_type != LineType::Comment)
        .collect();
    let line_costs: Vec<Decimal> = postable.iter().map(|line| line.total_line_cost(rate)).collect();
    let shipping_shares = allocate_pro_rata(invoice.base_shipping_cost(), &line_costs, CURRENCY_SCALE);

    let journal = JournalSource {
        journal_id: context.journal_id,
        company_id: context.company_id,
        document_type: DocumentType::SalesInvoice,
        document_id: *invoice.id.as_uuid(),
        external_document_id: Some(invoice.invoice_number.clone()),
    };

    let mut plan = InvoicePostingPlan::default();
    let mut shipment_lines = Vec::new();

    for ((line, cost), shipping) in postable.iter().zip(&line_costs).zip(&shipping_shares) {
        let amount = round_amount(*cost + *shipping);
        let item = line.item_id.and_then(|id| input.items.get(&id));
        let Some(keys) = line_group_keys(invoice, line, item, input.customer)? else {
            continue;
        };
        let sales = input.posting_groups.sales(&keys.sales)?;
        let line_reference = document_line_reference(DocumentType::SalesInvoice, *line.id.as_uuid());

        let revenue = journal.pair(
            leg(&sales.receivables_account, "Accounts Receivable"),
            leg(&sales.sales_account, "Sales Account"),
            amount,
            line.quantity,
            &line_reference,
        );

        match (line.invoice_line_type, item) {
            (LineType::Comment, _) => continue,
            (LineType::Service, _) => plan.journal_lines.extend(revenue),
            (_, None) => return Err(PostingError::lookup("item", line_item_label(line))),
            (_, Some(item)) => {
                let inventory_key = keys
                    .inventory
                    .map(|key| input.posting_groups.inventory(&key))
                    .transpose()?;
                let quantity = line.inventory_quantity();

                if line.ships_on_invoice() {
                    let Some(inventory) = inventory_key else {
                        return Err(PostingError::lookup("inventory posting group", line.id));
                    };
                    let shipment_line = ShipmentLine {
                        id: ShipmentLineId::new_v7(),
                        shipment_id: context.shipment_id,
                        item_id: item.id,
                        line_id: Some(*line.id.as_uuid()),
                        order_quantity: quantity,
                        shipped_quantity: quantity,
                        location_id: line.location_id.or(invoice.location_id),
                        shelf_id: line.shelf_id,
                        job_id: None,
                        requires_serial_tracking: line.requires_serial_tracking,
                        requires_batch_tracking: line.requires_batch_tracking,
                    };

                    if item.is_inventory() {
                        plan.item_ledger_entries.push(ItemLedgerEntry {
                            id: ItemLedgerId::new_v7(),
                            company_id: context.company_id,
                            posting_date: context.posting_date,
                            item_id: item.id,
                            quantity: -quantity,
                            entry_type: ItemLedgerEntryType::NegativeAdjmt,
                            document_type: DocumentType::SalesShipment,
                            document_id: *context.shipment_id.as_uuid(),
                            document_line_id: Some(*shipment_line.id.as_uuid()),
                            external_document_id: Some(invoice.invoice_number.clone()),
                            tracked_entity_id: None,
                            location_id: shipment_line.location_id,
                            shelf_id: shipment_line.shelf_id,
                            created_by: context.user_id,
                        });
                    }
                    shipment_lines.push(shipment_line);

                    plan.journal_lines.extend(journal.pair(
                        leg(&inventory.inventory_account, "Inventory Account"),
                        leg(&inventory.cost_of_goods_sold_account, "Cost of Goods Sold"),
                        amount,
                        quantity,
                        &line_reference,
                    ));
                    plan.journal_lines.extend(revenue);
                } else {
                    plan.journal_lines.extend(revenue);

                    if let Some(inventory) = inventory_key.filter(|_| item.is_inventory()) {
                        let unit_cost = input
                            .item_costs
                            .get(&item.id)
                            .map(|cost| cost.unit_cost)
                            .ok_or_else(|| PostingError::lookup("item cost", item.id))?;
                        plan.journal_lines.extend(journal.pair(
                            leg(&inventory.cost_of_goods_sold_account, "Cost of Goods Sold"),
                            leg(&inventory.inventory_account, "Inventory Account"),
                            round_amount(quantity * unit_cost),
                            quantity,
                            &line_reference,
                        ));
                    }
                }
            }
        }

        if let Some(sales_order_line_id) = line.sales_order_line_id {
            add_invoiced(&mut plan.order_line_updates, sales_order_line_id, line.quantity);
        }
    }

    if !shipment_lines.is_empty() {
        plan.shipment = Some(GeneratedShipment {
            shipment: Shipment {
                id: context.shipment_id,
                company_id: context.company_id,
                shipment_number: invoice.invoice_number.clone(),
                status: ShipmentStatus::Posted,
                source_document: ShipmentSourceKind::SalesInvoice,
                source_document_id: Some(*invoice.id.as_uuid()),
                location_id: invoice.location_id,
                posting_date: Some(context.posting_date),
                invoiced: true,
                voided_date: None,
                voided_by: None,
                created_by: context.user_id,
            },
            lines: shipment_lines,
        });
    }

    ensure_balanced(&plan.journal_lines)?;
    Ok(plan)
}

pub(crate) fn add_invoiced(updates: &mut Vec<OrderLineUpdate>, sales_order_line_id: SalesOrderLineId, quantity: Decimal) {
    match updates.iter_mut().find(|u| u.sales_order_line_id == sales_order_line_id) {
        Some(update) => update.quantity_invoiced += quantity,
        None => updates.push(OrderLineUpdate {
            sales_order_line_id,
            quantity_invoiced: quantity,
        }),
    }
}
