//! Posting Domain Ports
//!
//! Port interfaces between the posting engine and the relational store.
//!
//! # Architecture
//!
//! The engine reads everything it needs through [`PostingStore`] before it
//! starts writing, then applies all mutations through one
//! [`LedgerTransaction`]:
//!
//! - **Postgres Adapter**: `infra_db::PostgresPostingStore`
//! - **In-memory Adapter**: [`mock::InMemoryPostingStore`], for tests and local runs
//!
//! A transaction that is dropped without [`LedgerTransaction::commit`] rolls
//! back, so a failing step never leaves a partial posting behind.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut tx = store.begin().await?;
//! let invoice = tx.lock_sales_invoice(company_id, invoice_id).await?;
//! tx.insert_journal(&journal).await?;
//! tx.insert_journal_lines(&lines).await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use core_kernel::{
    AccountingPeriodId, CompanyId, CustomerId, DomainPort, HealthCheckable, ItemId, JobId,
    JobOperationId, JournalId, PortError, PurchaseOrderLineId, SalesInvoiceId, SalesOrderId,
    SalesOrderLineId, ShipmentId, UserId, WarehouseTransferId, WarehouseTransferLineId,
};

use crate::document::{SalesInvoice, SalesInvoiceLine, SalesInvoiceStatus, Shipment, ShipmentLine, ShipmentSource};
use crate::inventory::{Customer, Item, ItemCost, ItemLedgerEntry, TrackedEntityRestore};
use crate::journal::{DocumentType, Journal, JournalLine};
use crate::order::{
    Job, JobOperationStatus, PurchaseOrderLine, SalesOrderLine, SalesOrderStatus,
    WarehouseTransferLine, WarehouseTransferStatus,
};
use crate::posting_group::{InventoryGroupKey, InventoryPostingGroup, SalesGroupKey, SalesPostingGroup};
use crate::reversal::TrackedActivityRecord;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Read access to documents and reference data, plus transaction start
///
/// Every read is scoped by company. A row belonging to another company is
/// reported as `PortError::NotFound`.
#[async_trait]
pub trait PostingStore: DomainPort + HealthCheckable {
    /// Transaction type returned by [`PostingStore::begin`]
    type Tx: LedgerTransaction;

    async fn sales_invoice(&self, company_id: CompanyId, id: SalesInvoiceId) -> Result<SalesInvoice, PortError>;

    async fn sales_invoice_lines(
        &self,
        company_id: CompanyId,
        id: SalesInvoiceId,
    ) -> Result<Vec<SalesInvoiceLine>, PortError>;

    async fn customer(&self, company_id: CompanyId, id: CustomerId) -> Result<Customer, PortError>;

    async fn item(&self, company_id: CompanyId, id: ItemId) -> Result<Item, PortError>;

    async fn item_cost(&self, company_id: CompanyId, id: ItemId) -> Result<ItemCost, PortError>;

    async fn inventory_posting_group(
        &self,
        company_id: CompanyId,
        key: InventoryGroupKey,
    ) -> Result<InventoryPostingGroup, PortError>;

    async fn sales_posting_group(
        &self,
        company_id: CompanyId,
        key: SalesGroupKey,
    ) -> Result<SalesPostingGroup, PortError>;

    async fn shipment(&self, company_id: CompanyId, id: ShipmentId) -> Result<Shipment, PortError>;

    async fn shipment_lines(&self, company_id: CompanyId, id: ShipmentId) -> Result<Vec<ShipmentLine>, PortError>;

    /// Shipments created from the given source document, in any status
    async fn shipments_for_source(
        &self,
        company_id: CompanyId,
        source: ShipmentSource,
    ) -> Result<Vec<Shipment>, PortError>;

    async fn journal(&self, company_id: CompanyId, id: JournalId) -> Result<Journal, PortError>;

    /// Journal lines derived from one document
    async fn journal_lines_for_document(
        &self,
        company_id: CompanyId,
        document_type: DocumentType,
        document_id: Uuid,
    ) -> Result<Vec<JournalLine>, PortError>;

    /// Item ledger entries derived from one document
    async fn item_ledger_entries_for_document(
        &self,
        company_id: CompanyId,
        document_type: DocumentType,
        document_id: Uuid,
    ) -> Result<Vec<ItemLedgerEntry>, PortError>;

    /// Opens the transaction all mutations of one run go through
    async fn begin(&self) -> Result<Self::Tx, PortError>;

    /// Sets an invoice's status outside any transaction
    ///
    /// Used only as the compensating write after a failed posting.
    async fn reset_sales_invoice_status(
        &self,
        company_id: CompanyId,
        id: SalesInvoiceId,
        status: SalesInvoiceStatus,
        user_id: UserId,
    ) -> Result<(), PortError>;
}

/// Writes of one posting or void run
///
/// `lock_*` methods read the row and hold a row lock on it until the
/// transaction ends.
#[async_trait]
pub trait LedgerTransaction: Send + Sized {
    async fn lock_sales_invoice(&mut self, company_id: CompanyId, id: SalesInvoiceId) -> Result<SalesInvoice, PortError>;

    async fn lock_shipment(&mut self, company_id: CompanyId, id: ShipmentId) -> Result<Shipment, PortError>;

    /// Accounting period containing `posting_date`, created when missing
    async fn accounting_period(
        &mut self,
        company_id: CompanyId,
        posting_date: NaiveDate,
    ) -> Result<AccountingPeriodId, PortError>;

    async fn insert_journal(&mut self, journal: &Journal) -> Result<(), PortError>;

    async fn insert_journal_lines(&mut self, lines: &[JournalLine]) -> Result<(), PortError>;

    async fn insert_item_ledger_entries(&mut self, entries: &[ItemLedgerEntry]) -> Result<(), PortError>;

    async fn insert_shipment(&mut self, shipment: &Shipment, lines: &[ShipmentLine]) -> Result<(), PortError>;

    async fn lock_sales_order_line(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderLineId,
    ) -> Result<SalesOrderLine, PortError>;

    async fn update_sales_order_line(&mut self, line: &SalesOrderLine) -> Result<(), PortError>;

    /// Every line of an order, read fresh inside the transaction
    async fn sales_order_lines(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderId,
    ) -> Result<Vec<SalesOrderLine>, PortError>;

    async fn update_sales_order_status(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderId,
        status: SalesOrderStatus,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), PortError>;

    /// Sets `invoiced` on the order's posted shipments, returning how many changed
    async fn set_sales_order_shipments_invoiced(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderId,
        invoiced: bool,
    ) -> Result<u64, PortError>;

    async fn lock_purchase_order_line(
        &mut self,
        company_id: CompanyId,
        id: PurchaseOrderLineId,
    ) -> Result<PurchaseOrderLine, PortError>;

    async fn update_purchase_order_line(&mut self, line: &PurchaseOrderLine) -> Result<(), PortError>;

    async fn update_job_operation_status(
        &mut self,
        company_id: CompanyId,
        id: JobOperationId,
        status: JobOperationStatus,
    ) -> Result<(), PortError>;

    async fn lock_warehouse_transfer_line(
        &mut self,
        company_id: CompanyId,
        id: WarehouseTransferLineId,
    ) -> Result<WarehouseTransferLine, PortError>;

    async fn update_warehouse_transfer_line(&mut self, line: &WarehouseTransferLine) -> Result<(), PortError>;

    async fn warehouse_transfer_lines(
        &mut self,
        company_id: CompanyId,
        id: WarehouseTransferId,
    ) -> Result<Vec<WarehouseTransferLine>, PortError>;

    async fn update_warehouse_transfer_status(
        &mut self,
        company_id: CompanyId,
        id: WarehouseTransferId,
        status: WarehouseTransferStatus,
    ) -> Result<(), PortError>;

    async fn lock_job(&mut self, company_id: CompanyId, id: JobId) -> Result<Job, PortError>;

    async fn update_job(&mut self, job: &Job) -> Result<(), PortError>;

    /// Sets each entity back to Available with the given quantity
    async fn restore_tracked_entities(
        &mut self,
        company_id: CompanyId,
        restores: &[TrackedEntityRestore],
    ) -> Result<(), PortError>;

    async fn insert_tracked_activity(&mut self, record: &TrackedActivityRecord) -> Result<(), PortError>;

    async fn mark_sales_invoice_posted(
        &mut self,
        company_id: CompanyId,
        id: SalesInvoiceId,
        posting_date: NaiveDate,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), PortError>;

    async fn mark_sales_invoice_voided(
        &mut self,
        company_id: CompanyId,
        id: SalesInvoiceId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), PortError>;

    async fn mark_shipment_voided(
        &mut self,
        company_id: CompanyId,
        id: ShipmentId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), PortError>;

    /// Makes every write of the transaction visible at once
    async fn commit(self) -> Result<(), PortError>;
}
