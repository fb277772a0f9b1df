//! Posting repository
//!
//! Row types and SQL for every table the posting engine reads or writes.
//! Queries take any PostgreSQL executor so the same statement runs against
//! the pool for plain reads and against an open transaction for locked reads
//! and writes.

use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgExecutor, Postgres, QueryBuilder};
use uuid::Uuid;

use domain_posting::{
    Customer, InventoryPostingGroup, Item, ItemCost, ItemLedgerEntry, Job, Journal, JournalLine,
    PurchaseOrderLine, SalesInvoice, SalesInvoiceLine, SalesOrderLine, SalesPostingGroup,
    Shipment, ShipmentLine, TrackedActivityRecord, TrackedEntityRestore, WarehouseTransferLine,
};

use crate::error::DatabaseError;

/// Rows per multi-row INSERT, well below the bind parameter limit
const INSERT_CHUNK: usize = 500;

fn label<T: FromStr>(column: &'static str, value: &str) -> Result<T, DatabaseError> {
    value.parse().map_err(|_| DatabaseError::unmappable(column, value))
}

fn lock_clause(lock: bool) -> &'static str {
    if lock {
        " FOR UPDATE"
    } else {
        ""
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct SalesInvoiceRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub invoice_number: String,
    pub customer_id: Uuid,
    pub location_id: Option<Uuid>,
    pub posting_date: Option<NaiveDate>,
    pub status: String,
    pub shipping_cost: Decimal,
    pub exchange_rate: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<Uuid>,
}

impl TryFrom<SalesInvoiceRow> for SalesInvoice {
    type Error = DatabaseError;

    fn try_from(row: SalesInvoiceRow) -> Result<Self, Self::Error> {
        Ok(SalesInvoice {
            id: row.id.into(),
            company_id: row.company_id.into(),
            invoice_number: row.invoice_number,
            customer_id: row.customer_id.into(),
            location_id: row.location_id.map(Into::into),
            posting_date: row.posting_date,
            status: label("sales_invoice.status", &row.status)?,
            shipping_cost: row.shipping_cost,
            exchange_rate: row.exchange_rate,
            updated_at: row.updated_at,
            updated_by: row.updated_by.map(Into::into),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SalesInvoiceLineRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub invoice_line_type: String,
    pub item_id: Option<Uuid>,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub shipping_cost: Decimal,
    pub add_on_cost: Decimal,
    pub tax_percent: Decimal,
    pub conversion_factor: Decimal,
    pub method_type: String,
    pub sales_order_id: Option<Uuid>,
    pub sales_order_line_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub shelf_id: Option<Uuid>,
    pub requires_serial_tracking: bool,
    pub requires_batch_tracking: bool,
}

impl TryFrom<SalesInvoiceLineRow> for SalesInvoiceLine {
    type Error = DatabaseError;

    fn try_from(row: SalesInvoiceLineRow) -> Result<Self, Self::Error> {
        Ok(SalesInvoiceLine {
            id: row.id.into(),
            invoice_id: row.invoice_id.into(),
            invoice_line_type: label("sales_invoice_line.invoice_line_type", &row.invoice_line_type)?,
            item_id: row.item_id.map(Into::into),
            description: row.description,
            quantity: row.quantity,
            unit_price: row.unit_price,
            shipping_cost: row.shipping_cost,
            add_on_cost: row.add_on_cost,
            tax_percent: row.tax_percent,
            conversion_factor: row.conversion_factor,
            method_type: label("sales_invoice_line.method_type", &row.method_type)?,
            sales_order_id: row.sales_order_id.map(Into::into),
            sales_order_line_id: row.sales_order_line_id.map(Into::into),
            location_id: row.location_id.map(Into::into),
            shelf_id: row.shelf_id.map(Into::into),
            requires_serial_tracking: row.requires_serial_tracking,
            requires_batch_tracking: row.requires_batch_tracking,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CustomerRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub customer_type_id: Option<Uuid>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id.into(),
            company_id: row.company_id.into(),
            name: row.name,
            customer_type_id: row.customer_type_id.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub readable_id: String,
    pub item_posting_group_id: Option<Uuid>,
    pub item_tracking_type: String,
}

impl TryFrom<ItemRow> for Item {
    type Error = DatabaseError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Item {
            id: row.id.into(),
            company_id: row.company_id.into(),
            readable_id: row.readable_id,
            item_posting_group_id: row.item_posting_group_id.map(Into::into),
            item_tracking_type: label("item.item_tracking_type", &row.item_tracking_type)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ItemCostRow {
    pub item_id: Uuid,
    pub company_id: Uuid,
    pub unit_cost: Decimal,
}

impl From<ItemCostRow> for ItemCost {
    fn from(row: ItemCostRow) -> Self {
        ItemCost {
            item_id: row.item_id.into(),
            company_id: row.company_id.into(),
            unit_cost: row.unit_cost,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct InventoryPostingGroupRow {
    pub company_id: Uuid,
    pub item_posting_group_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub inventory_account: String,
    pub cost_of_goods_sold_account: String,
}

impl From<InventoryPostingGroupRow> for InventoryPostingGroup {
    fn from(row: InventoryPostingGroupRow) -> Self {
        InventoryPostingGroup {
            company_id: row.company_id.into(),
            item_posting_group_id: row.item_posting_group_id.map(Into::into),
            location_id: row.location_id.map(Into::into),
            inventory_account: row.inventory_account,
            cost_of_goods_sold_account: row.cost_of_goods_sold_account,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SalesPostingGroupRow {
    pub company_id: Uuid,
    pub item_posting_group_id: Option<Uuid>,
    pub customer_type_id: Option<Uuid>,
    pub sales_account: String,
    pub receivables_account: String,
}

impl From<SalesPostingGroupRow> for SalesPostingGroup {
    fn from(row: SalesPostingGroupRow) -> Self {
        SalesPostingGroup {
            company_id: row.company_id.into(),
            item_posting_group_id: row.item_posting_group_id.map(Into::into),
            customer_type_id: row.customer_type_id.map(Into::into),
            sales_account: row.sales_account,
            receivables_account: row.receivables_account,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ShipmentRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub shipment_number: String,
    pub status: String,
    pub source_document: String,
    pub source_document_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub posting_date: Option<NaiveDate>,
    pub invoiced: bool,
    pub voided_date: Option<DateTime<Utc>>,
    pub voided_by: Option<Uuid>,
    pub created_by: Uuid,
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = DatabaseError;

    fn try_from(row: ShipmentRow) -> Result<Self, Self::Error> {
        Ok(Shipment {
            id: row.id.into(),
            company_id: row.company_id.into(),
            shipment_number: row.shipment_number,
            status: label("shipment.status", &row.status)?,
            source_document: label("shipment.source_document", &row.source_document)?,
            source_document_id: row.source_document_id,
            location_id: row.location_id.map(Into::into),
            posting_date: row.posting_date,
            invoiced: row.invoiced,
            voided_date: row.voided_date,
            voided_by: row.voided_by.map(Into::into),
            created_by: row.created_by.into(),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ShipmentLineRow {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub item_id: Uuid,
    pub line_id: Option<Uuid>,
    pub order_quantity: Decimal,
    pub shipped_quantity: Decimal,
    pub location_id: Option<Uuid>,
    pub shelf_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub requires_serial_tracking: bool,
    pub requires_batch_tracking: bool,
}

impl From<ShipmentLineRow> for ShipmentLine {
    fn from(row: ShipmentLineRow) -> Self {
        ShipmentLine {
            id: row.id.into(),
            shipment_id: row.shipment_id.into(),
            item_id: row.item_id.into(),
            line_id: row.line_id,
            order_quantity: row.order_quantity,
            shipped_quantity: row.shipped_quantity,
            location_id: row.location_id.map(Into::into),
            shelf_id: row.shelf_id.map(Into::into),
            job_id: row.job_id.map(Into::into),
            requires_serial_tracking: row.requires_serial_tracking,
            requires_batch_tracking: row.requires_batch_tracking,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct JournalRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub accounting_period_id: Uuid,
    pub description: String,
    pub posting_date: NaiveDate,
    pub created_by: Uuid,
}

impl From<JournalRow> for Journal {
    fn from(row: JournalRow) -> Self {
        Journal {
            id: row.id.into(),
            company_id: row.company_id.into(),
            accounting_period_id: row.accounting_period_id.into(),
            description: row.description,
            posting_date: row.posting_date,
            created_by: row.created_by.into(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct JournalLineRow {
    pub id: Uuid,
    pub journal_id: Uuid,
    pub company_id: Uuid,
    pub account_number: String,
    pub description: String,
    pub amount: Decimal,
    pub quantity: Decimal,
    pub document_type: String,
    pub document_id: Uuid,
    pub external_document_id: Option<String>,
    pub document_line_reference: String,
    pub journal_line_reference: Uuid,
}

impl TryFrom<JournalLineRow> for JournalLine {
    type Error = DatabaseError;

    fn try_from(row: JournalLineRow) -> Result<Self, Self::Error> {
        Ok(JournalLine {
            id: row.id.into(),
            journal_id: row.journal_id.into(),
            company_id: row.company_id.into(),
            account_number: row.account_number,
            description: row.description,
            amount: row.amount,
            quantity: row.quantity,
            document_type: label("journal_line.document_type", &row.document_type)?,
            document_id: row.document_id,
            external_document_id: row.external_document_id,
            document_line_reference: row.document_line_reference,
            journal_line_reference: row.journal_line_reference.into(),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ItemLedgerRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub posting_date: NaiveDate,
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub entry_type: String,
    pub document_type: String,
    pub document_id: Uuid,
    pub document_line_id: Option<Uuid>,
    pub external_document_id: Option<String>,
    pub tracked_entity_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub shelf_id: Option<Uuid>,
    pub created_by: Uuid,
}

impl TryFrom<ItemLedgerRow> for ItemLedgerEntry {
    type Error = DatabaseError;

    fn try_from(row: ItemLedgerRow) -> Result<Self, Self::Error> {
        Ok(ItemLedgerEntry {
            id: row.id.into(),
            company_id: row.company_id.into(),
            posting_date: row.posting_date,
            item_id: row.item_id.into(),
            quantity: row.quantity,
            entry_type: label("item_ledger.entry_type", &row.entry_type)?,
            document_type: label("item_ledger.document_type", &row.document_type)?,
            document_id: row.document_id,
            document_line_id: row.document_line_id,
            external_document_id: row.external_document_id,
            tracked_entity_id: row.tracked_entity_id.map(Into::into),
            location_id: row.location_id.map(Into::into),
            shelf_id: row.shelf_id.map(Into::into),
            created_by: row.created_by.into(),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SalesOrderLineRow {
    pub id: Uuid,
    pub sales_order_id: Uuid,
    pub company_id: Uuid,
    pub sales_order_line_type: String,
    pub sale_quantity: Decimal,
    pub quantity_to_invoice: Option<Decimal>,
    pub quantity_invoiced: Decimal,
    pub invoiced_complete: bool,
    pub quantity_sent: Decimal,
    pub sent_complete: bool,
    pub sent_date: Option<NaiveDate>,
}

impl TryFrom<SalesOrderLineRow> for SalesOrderLine {
    type Error = DatabaseError;

    fn try_from(row: SalesOrderLineRow) -> Result<Self, Self::Error> {
        Ok(SalesOrderLine {
            id: row.id.into(),
            sales_order_id: row.sales_order_id.into(),
            company_id: row.company_id.into(),
            sales_order_line_type: label("sales_order_line.sales_order_line_type", &row.sales_order_line_type)?,
            sale_quantity: row.sale_quantity,
            quantity_to_invoice: row.quantity_to_invoice,
            quantity_invoiced: row.quantity_invoiced,
            invoiced_complete: row.invoiced_complete,
            quantity_sent: row.quantity_sent,
            sent_complete: row.sent_complete,
            sent_date: row.sent_date,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PurchaseOrderLineRow {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub company_id: Uuid,
    pub quantity_shipped: Decimal,
    pub job_operation_id: Option<Uuid>,
}

impl From<PurchaseOrderLineRow> for PurchaseOrderLine {
    fn from(row: PurchaseOrderLineRow) -> Self {
        PurchaseOrderLine {
            id: row.id.into(),
            purchase_order_id: row.purchase_order_id.into(),
            company_id: row.company_id.into(),
            quantity_shipped: row.quantity_shipped,
            job_operation_id: row.job_operation_id.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct WarehouseTransferLineRow {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub company_id: Uuid,
    pub quantity: Decimal,
    pub shipped_quantity: Decimal,
    pub received_quantity: Decimal,
}

impl From<WarehouseTransferLineRow> for WarehouseTransferLine {
    fn from(row: WarehouseTransferLineRow) -> Self {
        WarehouseTransferLine {
            id: row.id.into(),
            transfer_id: row.transfer_id.into(),
            company_id: row.company_id.into(),
            quantity: row.quantity,
            shipped_quantity: row.shipped_quantity,
            received_quantity: row.received_quantity,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub job_number: String,
    pub quantity: Decimal,
    pub quantity_complete: Decimal,
    pub quantity_shipped: Decimal,
    pub status: String,
}

impl TryFrom<JobRow> for Job {
    type Error = DatabaseError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id.into(),
            company_id: row.company_id.into(),
            job_number: row.job_number,
            quantity: row.quantity,
            quantity_complete: row.quantity_complete,
            quantity_shipped: row.quantity_shipped,
            status: label("job.status", &row.status)?,
        })
    }
}

// ============================================================================
// Reads
// ============================================================================

const SALES_INVOICE_COLUMNS: &str = r#"
    SELECT id, company_id, invoice_number, customer_id, location_id, posting_date,
           status, shipping_cost, exchange_rate, updated_at, updated_by
    FROM sales_invoice
    WHERE company_id = $1 AND id = $2
"#;

/// Reads one invoice, optionally holding a row lock
pub async fn fetch_sales_invoice<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
    lock: bool,
) -> Result<SalesInvoice, DatabaseError> {
    let sql = format!("{SALES_INVOICE_COLUMNS}{}", lock_clause(lock));
    sqlx::query_as::<_, SalesInvoiceRow>(&sql)
        .bind(company_id)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| DatabaseError::not_found("SalesInvoice", id))?
        .try_into()
}

/// Lines of one invoice, in entry order
pub async fn fetch_sales_invoice_lines<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    invoice_id: Uuid,
) -> Result<Vec<SalesInvoiceLine>, DatabaseError> {
    sqlx::query_as::<_, SalesInvoiceLineRow>(
        r#"
        SELECT id, invoice_id, invoice_line_type, item_id, description, quantity, unit_price,
               shipping_cost, add_on_cost, tax_percent, conversion_factor, method_type,
               sales_order_id, sales_order_line_id, location_id, shelf_id,
               requires_serial_tracking, requires_batch_tracking
        FROM sales_invoice_line
        WHERE company_id = $1 AND invoice_id = $2
        ORDER BY created_at, id
        "#,
    )
    .bind(company_id)
    .bind(invoice_id)
    .fetch_all(executor)
    .await?
    .into_iter()
    .map(TryInto::try_into)
    .collect()
}

pub async fn fetch_customer<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
) -> Result<Customer, DatabaseError> {
    let row = sqlx::query_as::<_, CustomerRow>(
        "SELECT id, company_id, name, customer_type_id FROM customer WHERE company_id = $1 AND id = $2",
    )
    .bind(company_id)
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found("Customer", id))?;
    Ok(row.into())
}

pub async fn fetch_item<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
) -> Result<Item, DatabaseError> {
    sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT id, company_id, readable_id, item_posting_group_id, item_tracking_type
        FROM item
        WHERE company_id = $1 AND id = $2
        "#,
    )
    .bind(company_id)
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found("Item", id))?
    .try_into()
}

pub async fn fetch_item_cost<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    item_id: Uuid,
) -> Result<ItemCost, DatabaseError> {
    let row = sqlx::query_as::<_, ItemCostRow>(
        "SELECT item_id, company_id, unit_cost FROM item_cost WHERE company_id = $1 AND item_id = $2",
    )
    .bind(company_id)
    .bind(item_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found("ItemCost", item_id))?;
    Ok(row.into())
}

/// Inventory posting group matching the key exactly, NULL matching NULL
pub async fn fetch_inventory_posting_group<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    item_posting_group_id: Option<Uuid>,
    location_id: Option<Uuid>,
) -> Result<Option<InventoryPostingGroup>, DatabaseError> {
    let row = sqlx::query_as::<_, InventoryPostingGroupRow>(
        r#"
        SELECT company_id, item_posting_group_id, location_id,
               inventory_account, cost_of_goods_sold_account
        FROM posting_group_inventory
        WHERE company_id = $1
          AND item_posting_group_id IS NOT DISTINCT FROM $2
          AND location_id IS NOT DISTINCT FROM $3
        "#,
    )
    .bind(company_id)
    .bind(item_posting_group_id)
    .bind(location_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(Into::into))
}

/// Sales posting group matching the key exactly, NULL matching NULL
pub async fn fetch_sales_posting_group<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    item_posting_group_id: Option<Uuid>,
    customer_type_id: Option<Uuid>,
) -> Result<Option<SalesPostingGroup>, DatabaseError> {
    let row = sqlx::query_as::<_, SalesPostingGroupRow>(
        r#"
        SELECT company_id, item_posting_group_id, customer_type_id,
               sales_account, receivables_account
        FROM posting_group_sales
        WHERE company_id = $1
          AND item_posting_group_id IS NOT DISTINCT FROM $2
          AND customer_type_id IS NOT DISTINCT FROM $3
        "#,
    )
    .bind(company_id)
    .bind(item_posting_group_id)
    .bind(customer_type_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(Into::into))
}

const SHIPMENT_COLUMNS: &str = r#"
    SELECT id, company_id, shipment_number, status, source_document, source_document_id,
           location_id, posting_date, invoiced, voided_date, voided_by, created_by
    FROM shipment
"#;

/// Reads one shipment, optionally holding a row lock
pub async fn fetch_shipment<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
    lock: bool,
) -> Result<Shipment, DatabaseError> {
    let sql = format!("{SHIPMENT_COLUMNS} WHERE company_id = $1 AND id = $2{}", lock_clause(lock));
    sqlx::query_as::<_, ShipmentRow>(&sql)
        .bind(company_id)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Shipment", id))?
        .try_into()
}

pub async fn fetch_shipments_for_source<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    source_document: &str,
    source_document_id: Uuid,
) -> Result<Vec<Shipment>, DatabaseError> {
    let sql = format!(
        "{SHIPMENT_COLUMNS} WHERE company_id = $1 AND source_document = $2 AND source_document_id = $3 ORDER BY shipment_number"
    );
    sqlx::query_as::<_, ShipmentRow>(&sql)
        .bind(company_id)
        .bind(source_document)
        .bind(source_document_id)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(TryInto::try_into)
        .collect()
}

pub async fn fetch_shipment_lines<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    shipment_id: Uuid,
) -> Result<Vec<ShipmentLine>, DatabaseError> {
    let rows = sqlx::query_as::<_, ShipmentLineRow>(
        r#"
        SELECT id, shipment_id, item_id, line_id, order_quantity, shipped_quantity,
               location_id, shelf_id, job_id, requires_serial_tracking, requires_batch_tracking
        FROM shipment_line
        WHERE company_id = $1 AND shipment_id = $2
        ORDER BY created_at, id
        "#,
    )
    .bind(company_id)
    .bind(shipment_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn fetch_journal<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
) -> Result<Journal, DatabaseError> {
    let row = sqlx::query_as::<_, JournalRow>(
        r#"
        SELECT id, company_id, accounting_period_id, description, posting_date, created_by
        FROM journal
        WHERE company_id = $1 AND id = $2
        "#,
    )
    .bind(company_id)
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found("Journal", id))?;
    Ok(row.into())
}

/// Journal lines of one document, in insertion order
pub async fn fetch_journal_lines_for_document<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    document_type: &str,
    document_id: Uuid,
) -> Result<Vec<JournalLine>, DatabaseError> {
    sqlx::query_as::<_, JournalLineRow>(
        r#"
        SELECT id, journal_id, company_id, account_number, description, amount, quantity,
               document_type, document_id, external_document_id,
               document_line_reference, journal_line_reference
        FROM journal_line
        WHERE company_id = $1 AND document_type = $2 AND document_id = $3
        ORDER BY line_number
        "#,
    )
    .bind(company_id)
    .bind(document_type)
    .bind(document_id)
    .fetch_all(executor)
    .await?
    .into_iter()
    .map(TryInto::try_into)
    .collect()
}

/// Item ledger entries of one document, in insertion order
pub async fn fetch_item_ledger_for_document<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    document_type: &str,
    document_id: Uuid,
) -> Result<Vec<ItemLedgerEntry>, DatabaseError> {
    sqlx::query_as::<_, ItemLedgerRow>(
        r#"
        SELECT id, company_id, posting_date, item_id, quantity, entry_type, document_type,
               document_id, document_line_id, external_document_id, tracked_entity_id,
               location_id, shelf_id, created_by
        FROM item_ledger
        WHERE company_id = $1 AND document_type = $2 AND document_id = $3
        ORDER BY line_number
        "#,
    )
    .bind(company_id)
    .bind(document_type)
    .bind(document_id)
    .fetch_all(executor)
    .await?
    .into_iter()
    .map(TryInto::try_into)
    .collect()
}

const SALES_ORDER_LINE_COLUMNS: &str = r#"
    SELECT id, sales_order_id, company_id, sales_order_line_type, sale_quantity,
           quantity_to_invoice, quantity_invoiced, invoiced_complete,
           quantity_sent, sent_complete, sent_date
    FROM sales_order_line
"#;

pub async fn lock_sales_order_line<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
) -> Result<SalesOrderLine, DatabaseError> {
    let sql = format!("{SALES_ORDER_LINE_COLUMNS} WHERE company_id = $1 AND id = $2 FOR UPDATE");
    sqlx::query_as::<_, SalesOrderLineRow>(&sql)
        .bind(company_id)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| DatabaseError::not_found("SalesOrderLine", id))?
        .try_into()
}

pub async fn fetch_sales_order_lines<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    sales_order_id: Uuid,
) -> Result<Vec<SalesOrderLine>, DatabaseError> {
    let sql = format!("{SALES_ORDER_LINE_COLUMNS} WHERE company_id = $1 AND sales_order_id = $2");
    sqlx::query_as::<_, SalesOrderLineRow>(&sql)
        .bind(company_id)
        .bind(sales_order_id)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(TryInto::try_into)
        .collect()
}

pub async fn lock_purchase_order_line<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
) -> Result<PurchaseOrderLine, DatabaseError> {
    let row = sqlx::query_as::<_, PurchaseOrderLineRow>(
        r#"
        SELECT id, purchase_order_id, company_id, quantity_shipped, job_operation_id
        FROM purchase_order_line
        WHERE company_id = $1 AND id = $2
        FOR UPDATE
        "#,
    )
    .bind(company_id)
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found("PurchaseOrderLine", id))?;
    Ok(row.into())
}

const WAREHOUSE_TRANSFER_LINE_COLUMNS: &str = r#"
    SELECT id, transfer_id, company_id, quantity, shipped_quantity, received_quantity
    FROM warehouse_transfer_line
"#;

pub async fn lock_warehouse_transfer_line<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
) -> Result<WarehouseTransferLine, DatabaseError> {
    let sql = format!("{WAREHOUSE_TRANSFER_LINE_COLUMNS} WHERE company_id = $1 AND id = $2 FOR UPDATE");
    let row = sqlx::query_as::<_, WarehouseTransferLineRow>(&sql)
        .bind(company_id)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| DatabaseError::not_found("WarehouseTransferLine", id))?;
    Ok(row.into())
}

pub async fn fetch_warehouse_transfer_lines<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    transfer_id: Uuid,
) -> Result<Vec<WarehouseTransferLine>, DatabaseError> {
    let sql = format!("{WAREHOUSE_TRANSFER_LINE_COLUMNS} WHERE company_id = $1 AND transfer_id = $2");
    let rows = sqlx::query_as::<_, WarehouseTransferLineRow>(&sql)
        .bind(company_id)
        .bind(transfer_id)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn lock_job<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
) -> Result<Job, DatabaseError> {
    sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, company_id, job_number, quantity, quantity_complete, quantity_shipped, status
        FROM job
        WHERE company_id = $1 AND id = $2
        FOR UPDATE
        "#,
    )
    .bind(company_id)
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found("Job", id))?
    .try_into()
}

// ============================================================================
// Writes
// ============================================================================

fn expect_one(entity: &str, id: Uuid, rows_affected: u64) -> Result<(), DatabaseError> {
    if rows_affected == 0 {
        return Err(DatabaseError::not_found(entity, id));
    }
    Ok(())
}

/// Accounting period holding `posting_date`, created for its month when missing
pub async fn ensure_accounting_period<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    posting_date: NaiveDate,
) -> Result<Uuid, DatabaseError> {
    let start_date = posting_date.with_day(1).unwrap_or(posting_date);
    let end_date = start_date
        .checked_add_months(chrono::Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(posting_date);

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO accounting_period (id, company_id, start_date, end_date)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (company_id, start_date) DO UPDATE SET end_date = accounting_period.end_date
        RETURNING id
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(company_id)
    .bind(start_date)
    .bind(end_date)
    .fetch_one(executor)
    .await?;
    Ok(id)
}

pub async fn insert_journal<'e, E: PgExecutor<'e>>(executor: E, journal: &Journal) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO journal (id, company_id, accounting_period_id, description, posting_date, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(journal.id.as_uuid())
    .bind(journal.company_id.as_uuid())
    .bind(journal.accounting_period_id.as_uuid())
    .bind(&journal.description)
    .bind(journal.posting_date)
    .bind(journal.created_by.as_uuid())
    .execute(executor)
    .await?;
    Ok(())
}

/// Multi-row insert of journal lines, preserving their order
pub fn journal_lines_insert(lines: &[JournalLine]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO journal_line (id, journal_id, company_id, account_number, description, amount, \
         quantity, document_type, document_id, external_document_id, document_line_reference, \
         journal_line_reference) ",
    );
    builder.push_values(lines, |mut row, line| {
        row.push_bind(*line.id.as_uuid())
            .push_bind(*line.journal_id.as_uuid())
            .push_bind(*line.company_id.as_uuid())
            .push_bind(&line.account_number)
            .push_bind(&line.description)
            .push_bind(line.amount)
            .push_bind(line.quantity)
            .push_bind(line.document_type.as_str())
            .push_bind(line.document_id)
            .push_bind(&line.external_document_id)
            .push_bind(&line.document_line_reference)
            .push_bind(*line.journal_line_reference.as_uuid());
    });
    builder
}

/// Multi-row insert of item ledger entries, preserving their order
pub fn item_ledger_insert(entries: &[ItemLedgerEntry]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO item_ledger (id, company_id, posting_date, item_id, quantity, entry_type, \
         document_type, document_id, document_line_id, external_document_id, tracked_entity_id, \
         location_id, shelf_id, created_by) ",
    );
    builder.push_values(entries, |mut row, entry| {
        row.push_bind(*entry.id.as_uuid())
            .push_bind(*entry.company_id.as_uuid())
            .push_bind(entry.posting_date)
            .push_bind(*entry.item_id.as_uuid())
            .push_bind(entry.quantity)
            .push_bind(entry.entry_type.as_str())
            .push_bind(entry.document_type.as_str())
            .push_bind(entry.document_id)
            .push_bind(entry.document_line_id)
            .push_bind(&entry.external_document_id)
            .push_bind(entry.tracked_entity_id.map(|id| *id.as_uuid()))
            .push_bind(entry.location_id.map(|id| *id.as_uuid()))
            .push_bind(entry.shelf_id.map(|id| *id.as_uuid()))
            .push_bind(*entry.created_by.as_uuid());
    });
    builder
}

/// Splits a slice into insert-sized chunks
pub fn insert_chunks<T>(rows: &[T]) -> std::slice::Chunks<'_, T> {
    rows.chunks(INSERT_CHUNK)
}

pub async fn insert_shipment<'e, E: PgExecutor<'e>>(executor: E, shipment: &Shipment) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO shipment (id, company_id, shipment_number, status, source_document,
                              source_document_id, location_id, posting_date, invoiced, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(shipment.id.as_uuid())
    .bind(shipment.company_id.as_uuid())
    .bind(&shipment.shipment_number)
    .bind(shipment.status.as_str())
    .bind(shipment.source_document.as_str())
    .bind(shipment.source_document_id)
    .bind(shipment.location_id.map(|id| *id.as_uuid()))
    .bind(shipment.posting_date)
    .bind(shipment.invoiced)
    .bind(shipment.created_by.as_uuid())
    .execute(executor)
    .await?;
    Ok(())
}

/// Multi-row insert of shipment lines for one shipment
pub fn shipment_lines_insert<'a>(company_id: Uuid, lines: &'a [ShipmentLine]) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO shipment_line (id, shipment_id, company_id, item_id, line_id, order_quantity, \
         shipped_quantity, location_id, shelf_id, job_id, requires_serial_tracking, \
         requires_batch_tracking) ",
    );
    builder.push_values(lines, |mut row, line| {
        row.push_bind(*line.id.as_uuid())
            .push_bind(*line.shipment_id.as_uuid())
            .push_bind(company_id)
            .push_bind(*line.item_id.as_uuid())
            .push_bind(line.line_id)
            .push_bind(line.order_quantity)
            .push_bind(line.shipped_quantity)
            .push_bind(line.location_id.map(|id| *id.as_uuid()))
            .push_bind(line.shelf_id.map(|id| *id.as_uuid()))
            .push_bind(line.job_id.map(|id| *id.as_uuid()))
            .push_bind(line.requires_serial_tracking)
            .push_bind(line.requires_batch_tracking);
    });
    builder
}

pub async fn update_sales_order_line<'e, E: PgExecutor<'e>>(
    executor: E,
    line: &SalesOrderLine,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE sales_order_line
        SET quantity_invoiced = $3, invoiced_complete = $4,
            quantity_sent = $5, sent_complete = $6, sent_date = $7
        WHERE company_id = $1 AND id = $2
        "#,
    )
    .bind(line.company_id.as_uuid())
    .bind(line.id.as_uuid())
    .bind(line.quantity_invoiced)
    .bind(line.invoiced_complete)
    .bind(line.quantity_sent)
    .bind(line.sent_complete)
    .bind(line.sent_date)
    .execute(executor)
    .await?;
    expect_one("SalesOrderLine", *line.id.as_uuid(), result.rows_affected())
}

pub async fn update_sales_order_status<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
    status: &str,
    user_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        "UPDATE sales_order SET status = $3, updated_by = $4, updated_at = $5 WHERE company_id = $1 AND id = $2",
    )
    .bind(company_id)
    .bind(id)
    .bind(status)
    .bind(user_id)
    .bind(at)
    .execute(executor)
    .await?;
    expect_one("SalesOrder", id, result.rows_affected())
}

/// Sets `invoiced` on the posted shipments of a sales order
pub async fn set_sales_order_shipments_invoiced<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    sales_order_id: Uuid,
    invoiced: bool,
) -> Result<u64, DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE shipment
        SET invoiced = $4
        WHERE company_id = $1
          AND source_document = $2
          AND source_document_id = $3
          AND status = 'Posted'
          AND invoiced IS DISTINCT FROM $4
        "#,
    )
    .bind(company_id)
    .bind(domain_posting::ShipmentSourceKind::SalesOrder.as_str())
    .bind(sales_order_id)
    .bind(invoiced)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn update_purchase_order_line<'e, E: PgExecutor<'e>>(
    executor: E,
    line: &PurchaseOrderLine,
) -> Result<(), DatabaseError> {
    let result = sqlx::query("UPDATE purchase_order_line SET quantity_shipped = $3 WHERE company_id = $1 AND id = $2")
        .bind(line.company_id.as_uuid())
        .bind(line.id.as_uuid())
        .bind(line.quantity_shipped)
        .execute(executor)
        .await?;
    expect_one("PurchaseOrderLine", *line.id.as_uuid(), result.rows_affected())
}

/// Sets the status column of any company-scoped table keyed by `id`
pub async fn update_status<'e, E: PgExecutor<'e>>(
    executor: E,
    table: &'static str,
    entity: &str,
    company_id: Uuid,
    id: Uuid,
    status: &str,
) -> Result<(), DatabaseError> {
    let sql = format!("UPDATE {table} SET status = $3 WHERE company_id = $1 AND id = $2");
    let result = sqlx::query(&sql)
        .bind(company_id)
        .bind(id)
        .bind(status)
        .execute(executor)
        .await?;
    expect_one(entity, id, result.rows_affected())
}

pub async fn update_warehouse_transfer_line<'e, E: PgExecutor<'e>>(
    executor: E,
    line: &WarehouseTransferLine,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        "UPDATE warehouse_transfer_line SET shipped_quantity = $3 WHERE company_id = $1 AND id = $2",
    )
    .bind(line.company_id.as_uuid())
    .bind(line.id.as_uuid())
    .bind(line.shipped_quantity)
    .execute(executor)
    .await?;
    expect_one("WarehouseTransferLine", *line.id.as_uuid(), result.rows_affected())
}

pub async fn update_job<'e, E: PgExecutor<'e>>(executor: E, job: &Job) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE job
        SET quantity_complete = $3, quantity_shipped = $4, status = $5
        WHERE company_id = $1 AND id = $2
        "#,
    )
    .bind(job.company_id.as_uuid())
    .bind(job.id.as_uuid())
    .bind(job.quantity_complete)
    .bind(job.quantity_shipped)
    .bind(job.status.as_str())
    .execute(executor)
    .await?;
    expect_one("Job", *job.id.as_uuid(), result.rows_affected())
}

pub async fn restore_tracked_entity<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    restore: &TrackedEntityRestore,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        "UPDATE tracked_entity SET status = $3, quantity = quantity + $4 WHERE company_id = $1 AND id = $2",
    )
    .bind(company_id)
    .bind(restore.tracked_entity_id.as_uuid())
    .bind(domain_posting::TrackedEntityStatus::Available.as_str())
    .bind(restore.quantity)
    .execute(executor)
    .await?;
    expect_one("TrackedEntity", *restore.tracked_entity_id.as_uuid(), result.rows_affected())
}

pub async fn insert_tracked_activity<'e, E: PgExecutor<'e>>(
    executor: E,
    record: &TrackedActivityRecord,
) -> Result<(), DatabaseError> {
    let activity = &record.activity;
    sqlx::query(
        r#"
        INSERT INTO tracked_activity (id, company_id, activity_type, source_document,
                                      source_document_id, attributes, created_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(activity.id.as_uuid())
    .bind(activity.company_id.as_uuid())
    .bind(&activity.activity_type)
    .bind(&activity.source_document)
    .bind(activity.source_document_id)
    .bind(&activity.attributes)
    .bind(activity.created_by.as_uuid())
    .bind(activity.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Multi-row insert of the inputs of one tracked activity
pub fn tracked_activity_inputs_insert(record: &TrackedActivityRecord) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO tracked_activity_input (tracked_activity_id, tracked_entity_id, company_id, quantity, entity_type) ",
    );
    builder.push_values(&record.inputs, |mut row, input| {
        row.push_bind(*input.tracked_activity_id.as_uuid())
            .push_bind(*input.tracked_entity_id.as_uuid())
            .push_bind(*input.company_id.as_uuid())
            .push_bind(input.quantity)
            .push_bind(&input.entity_type);
    });
    builder
}

pub async fn mark_sales_invoice<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
    status: &str,
    posting_date: Option<NaiveDate>,
    user_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE sales_invoice
        SET status = $3, posting_date = COALESCE($4, posting_date), updated_by = $5, updated_at = $6
        WHERE company_id = $1 AND id = $2
        "#,
    )
    .bind(company_id)
    .bind(id)
    .bind(status)
    .bind(posting_date)
    .bind(user_id)
    .bind(at)
    .execute(executor)
    .await?;
    expect_one("SalesInvoice", id, result.rows_affected())
}

pub async fn mark_shipment_voided<'e, E: PgExecutor<'e>>(
    executor: E,
    company_id: Uuid,
    id: Uuid,
    user_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE shipment
        SET status = $3, invoiced = FALSE, voided_by = $4, voided_date = $5
        WHERE company_id = $1 AND id = $2
        "#,
    )
    .bind(company_id)
    .bind(id)
    .bind(domain_posting::ShipmentStatus::Voided.as_str())
    .bind(user_id)
    .bind(at)
    .execute(executor)
    .await?;
    expect_one("Shipment", id, result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_posting::{SalesInvoiceStatus, ShipmentSourceKind};
    use rust_decimal_macros::dec;

    fn shipment_row(status: &str, source_document: &str) -> ShipmentRow {
        ShipmentRow {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            shipment_number: "SHP-1".to_string(),
            status: status.to_string(),
            source_document: source_document.to_string(),
            source_document_id: Some(Uuid::new_v4()),
            location_id: None,
            posting_date: None,
            invoiced: false,
            voided_date: None,
            voided_by: None,
            created_by: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_shipment_row_maps_labels() {
        let shipment = Shipment::try_from(shipment_row("Posted", "Outbound Transfer")).unwrap();
        assert_eq!(shipment.source_document, ShipmentSourceKind::OutboundTransfer);
    }

    #[test]
    fn test_unknown_label_is_unmappable() {
        let err = Shipment::try_from(shipment_row("Archived", "Sales Order")).unwrap_err();
        assert!(matches!(err, DatabaseError::Unmappable { column: "shipment.status", .. }));
    }

    #[test]
    fn test_invoice_row_maps_partially_paid() {
        let row = SalesInvoiceRow {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            invoice_number: "SI-1".to_string(),
            customer_id: Uuid::new_v4(),
            location_id: None,
            posting_date: None,
            status: "Partially Paid".to_string(),
            shipping_cost: dec!(0),
            exchange_rate: dec!(1),
            updated_at: None,
            updated_by: None,
        };
        let invoice = SalesInvoice::try_from(row).unwrap();
        assert_eq!(invoice.status, SalesInvoiceStatus::PartiallyPaid);
        assert!(invoice.status.is_posted());
    }

    #[test]
    fn test_lock_clause() {
        assert_eq!(lock_clause(true), " FOR UPDATE");
        assert_eq!(lock_clause(false), "");
    }
}
