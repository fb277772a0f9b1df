//! PostgreSQL Posting Adapter
//!
//! Implements the posting engine's `PostingStore` and `LedgerTransaction`
//! ports on top of the SQL in [`crate::repositories::posting`].
//!
//! # Overview
//!
//! - Plain reads run directly against the pool
//! - `begin` opens one database transaction per posting or void run
//! - `lock_*` reads use `SELECT ... FOR UPDATE`, so two runs against the same
//!   document serialize on the row lock and the second one sees the status
//!   the first one committed
//! - Dropping a [`PgLedgerTransaction`] without committing rolls it back
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresPostingStore;
//! use domain_posting::PostingEngine;
//! use std::sync::Arc;
//!
//! let store = PostgresPostingStore::new(pool);
//! let engine = PostingEngine::new(Arc::new(store));
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    AccountingPeriodId, AdapterHealth, CompanyId, CustomerId, DomainPort, HealthCheckResult,
    HealthCheckable, ItemId, JobId, JobOperationId, JournalId, PortError, PurchaseOrderLineId,
    SalesInvoiceId, SalesOrderId, SalesOrderLineId, ShipmentId, UserId, WarehouseTransferId,
    WarehouseTransferLineId,
};
use domain_posting::posting_group::{InventoryGroupKey, SalesGroupKey};
use domain_posting::{
    Customer, DocumentType, InventoryPostingGroup, Item, ItemCost, ItemLedgerEntry, Job,
    JobOperationStatus, Journal, JournalLine, LedgerTransaction, PostingStore, PurchaseOrderLine,
    SalesInvoice, SalesInvoiceLine, SalesInvoiceStatus, SalesOrderLine, SalesOrderStatus,
    SalesPostingGroup, Shipment, ShipmentLine, ShipmentSource, TrackedActivityRecord,
    TrackedEntityRestore, WarehouseTransferLine, WarehouseTransferStatus,
};

use crate::error::DatabaseError;
use crate::repositories::posting as repo;

const ADAPTER_ID: &str = "postgres-posting-store";

/// PostgreSQL-backed implementation of the posting store
#[derive(Debug, Clone)]
pub struct PostgresPostingStore {
    pool: PgPool,
}

impl PostgresPostingStore {
    /// Creates a new store over a connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DomainPort for PostgresPostingStore {}

#[async_trait]
impl HealthCheckable for PostgresPostingStore {
    /// Runs `SELECT 1` against the pool
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl PostingStore for PostgresPostingStore {
    type Tx = PgLedgerTransaction;

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %id))]
    async fn sales_invoice(&self, company_id: CompanyId, id: SalesInvoiceId) -> Result<SalesInvoice, PortError> {
        Ok(repo::fetch_sales_invoice(&self.pool, *company_id.as_uuid(), *id.as_uuid(), false).await?)
    }

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %id))]
    async fn sales_invoice_lines(
        &self,
        company_id: CompanyId,
        id: SalesInvoiceId,
    ) -> Result<Vec<SalesInvoiceLine>, PortError> {
        let lines = repo::fetch_sales_invoice_lines(&self.pool, *company_id.as_uuid(), *id.as_uuid()).await?;
        debug!(count = lines.len(), "Fetched invoice lines");
        Ok(lines)
    }

    async fn customer(&self, company_id: CompanyId, id: CustomerId) -> Result<Customer, PortError> {
        Ok(repo::fetch_customer(&self.pool, *company_id.as_uuid(), *id.as_uuid()).await?)
    }

    async fn item(&self, company_id: CompanyId, id: ItemId) -> Result<Item, PortError> {
        Ok(repo::fetch_item(&self.pool, *company_id.as_uuid(), *id.as_uuid()).await?)
    }

    async fn item_cost(&self, company_id: CompanyId, id: ItemId) -> Result<ItemCost, PortError> {
        Ok(repo::fetch_item_cost(&self.pool, *company_id.as_uuid(), *id.as_uuid()).await?)
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn inventory_posting_group(
        &self,
        company_id: CompanyId,
        key: InventoryGroupKey,
    ) -> Result<InventoryPostingGroup, PortError> {
        repo::fetch_inventory_posting_group(
            &self.pool,
            *company_id.as_uuid(),
            key.item_posting_group_id.map(Uuid::from),
            key.location_id.map(Uuid::from),
        )
        .await?
        .ok_or_else(|| PortError::not_found("InventoryPostingGroup", key))
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn sales_posting_group(
        &self,
        company_id: CompanyId,
        key: SalesGroupKey,
    ) -> Result<SalesPostingGroup, PortError> {
        repo::fetch_sales_posting_group(
            &self.pool,
            *company_id.as_uuid(),
            key.item_posting_group_id.map(Uuid::from),
            key.customer_type_id.map(Uuid::from),
        )
        .await?
        .ok_or_else(|| PortError::not_found("SalesPostingGroup", key))
    }

    #[instrument(skip(self), fields(company_id = %company_id, shipment_id = %id))]
    async fn shipment(&self, company_id: CompanyId, id: ShipmentId) -> Result<Shipment, PortError> {
        Ok(repo::fetch_shipment(&self.pool, *company_id.as_uuid(), *id.as_uuid(), false).await?)
    }

    async fn shipment_lines(&self, company_id: CompanyId, id: ShipmentId) -> Result<Vec<ShipmentLine>, PortError> {
        Ok(repo::fetch_shipment_lines(&self.pool, *company_id.as_uuid(), *id.as_uuid()).await?)
    }

    async fn shipments_for_source(
        &self,
        company_id: CompanyId,
        source: ShipmentSource,
    ) -> Result<Vec<Shipment>, PortError> {
        Ok(repo::fetch_shipments_for_source(&self.pool, *company_id.as_uuid(), source.kind().as_str(), source.id())
            .await?)
    }

    async fn journal(&self, company_id: CompanyId, id: JournalId) -> Result<Journal, PortError> {
        Ok(repo::fetch_journal(&self.pool, *company_id.as_uuid(), *id.as_uuid()).await?)
    }

    #[instrument(skip(self), fields(company_id = %company_id, document_type = %document_type))]
    async fn journal_lines_for_document(
        &self,
        company_id: CompanyId,
        document_type: DocumentType,
        document_id: Uuid,
    ) -> Result<Vec<JournalLine>, PortError> {
        Ok(repo::fetch_journal_lines_for_document(&self.pool, *company_id.as_uuid(), document_type.as_str(), document_id)
            .await?)
    }

    #[instrument(skip(self), fields(company_id = %company_id, document_type = %document_type))]
    async fn item_ledger_entries_for_document(
        &self,
        company_id: CompanyId,
        document_type: DocumentType,
        document_id: Uuid,
    ) -> Result<Vec<ItemLedgerEntry>, PortError> {
        Ok(repo::fetch_item_ledger_for_document(&self.pool, *company_id.as_uuid(), document_type.as_str(), document_id)
            .await?)
    }

    async fn begin(&self) -> Result<Self::Tx, PortError> {
        let tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        debug!("Opened posting transaction");
        Ok(PgLedgerTransaction { tx })
    }

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %id, status = %status))]
    async fn reset_sales_invoice_status(
        &self,
        company_id: CompanyId,
        id: SalesInvoiceId,
        status: SalesInvoiceStatus,
        user_id: UserId,
    ) -> Result<(), PortError> {
        repo::mark_sales_invoice(
            &self.pool,
            *company_id.as_uuid(),
            *id.as_uuid(),
            status.as_str(),
            None,
            *user_id.as_uuid(),
            Utc::now(),
        )
        .await?;
        Ok(())
    }
}

/// One open database transaction of a posting or void run
pub struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn lock_sales_invoice(&mut self, company_id: CompanyId, id: SalesInvoiceId) -> Result<SalesInvoice, PortError> {
        Ok(repo::fetch_sales_invoice(&mut *self.tx, *company_id.as_uuid(), *id.as_uuid(), true).await?)
    }

    async fn lock_shipment(&mut self, company_id: CompanyId, id: ShipmentId) -> Result<Shipment, PortError> {
        Ok(repo::fetch_shipment(&mut *self.tx, *company_id.as_uuid(), *id.as_uuid(), true).await?)
    }

    async fn accounting_period(
        &mut self,
        company_id: CompanyId,
        posting_date: NaiveDate,
    ) -> Result<AccountingPeriodId, PortError> {
        let id = repo::ensure_accounting_period(&mut *self.tx, *company_id.as_uuid(), posting_date).await?;
        Ok(id.into())
    }

    async fn insert_journal(&mut self, journal: &Journal) -> Result<(), PortError> {
        Ok(repo::insert_journal(&mut *self.tx, journal).await?)
    }

    #[instrument(skip(self, lines), fields(count = lines.len()))]
    async fn insert_journal_lines(&mut self, lines: &[JournalLine]) -> Result<(), PortError> {
        for chunk in repo::insert_chunks(lines) {
            repo::journal_lines_insert(chunk)
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(DatabaseError::from)?;
        }
        Ok(())
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn insert_item_ledger_entries(&mut self, entries: &[ItemLedgerEntry]) -> Result<(), PortError> {
        for chunk in repo::insert_chunks(entries) {
            repo::item_ledger_insert(chunk)
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(DatabaseError::from)?;
        }
        Ok(())
    }

    #[instrument(skip(self, shipment, lines), fields(shipment_id = %shipment.id, count = lines.len()))]
    async fn insert_shipment(&mut self, shipment: &Shipment, lines: &[ShipmentLine]) -> Result<(), PortError> {
        repo::insert_shipment(&mut *self.tx, shipment).await?;
        let company_id = *shipment.company_id.as_uuid();
        for chunk in repo::insert_chunks(lines) {
            repo::shipment_lines_insert(company_id, chunk)
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(DatabaseError::from)?;
        }
        Ok(())
    }

    async fn lock_sales_order_line(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderLineId,
    ) -> Result<SalesOrderLine, PortError> {
        Ok(repo::lock_sales_order_line(&mut *self.tx, *company_id.as_uuid(), *id.as_uuid()).await?)
    }

    async fn update_sales_order_line(&mut self, line: &SalesOrderLine) -> Result<(), PortError> {
        Ok(repo::update_sales_order_line(&mut *self.tx, line).await?)
    }

    async fn sales_order_lines(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderId,
    ) -> Result<Vec<SalesOrderLine>, PortError> {
        Ok(repo::fetch_sales_order_lines(&mut *self.tx, *company_id.as_uuid(), *id.as_uuid()).await?)
    }

    async fn update_sales_order_status(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderId,
        status: SalesOrderStatus,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), PortError> {
        Ok(repo::update_sales_order_status(
            &mut *self.tx,
            *company_id.as_uuid(),
            *id.as_uuid(),
            status.as_str(),
            *user_id.as_uuid(),
            at,
        )
        .await?)
    }

    async fn set_sales_order_shipments_invoiced(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderId,
        invoiced: bool,
    ) -> Result<u64, PortError> {
        Ok(repo::set_sales_order_shipments_invoiced(&mut *self.tx, *company_id.as_uuid(), *id.as_uuid(), invoiced)
            .await?)
    }

    async fn lock_purchase_order_line(
        &mut self,
        company_id: CompanyId,
        id: PurchaseOrderLineId,
    ) -> Result<PurchaseOrderLine, PortError> {
        Ok(repo::lock_purchase_order_line(&mut *self.tx, *company_id.as_uuid(), *id.as_uuid()).await?)
    }

    async fn update_purchase_order_line(&mut self, line: &PurchaseOrderLine) -> Result<(), PortError> {
        Ok(repo::update_purchase_order_line(&mut *self.tx, line).await?)
    }

    async fn update_job_operation_status(
        &mut self,
        company_id: CompanyId,
        id: JobOperationId,
        status: JobOperationStatus,
    ) -> Result<(), PortError> {
        Ok(repo::update_status(
            &mut *self.tx,
            "job_operation",
            "JobOperation",
            *company_id.as_uuid(),
            *id.as_uuid(),
            status.as_str(),
        )
        .await?)
    }

    async fn lock_warehouse_transfer_line(
        &mut self,
        company_id: CompanyId,
        id: WarehouseTransferLineId,
    ) -> Result<WarehouseTransferLine, PortError> {
        Ok(repo::lock_warehouse_transfer_line(&mut *self.tx, *company_id.as_uuid(), *id.as_uuid()).await?)
    }

    async fn update_warehouse_transfer_line(&mut self, line: &WarehouseTransferLine) -> Result<(), PortError> {
        Ok(repo::update_warehouse_transfer_line(&mut *self.tx, line).await?)
    }

    async fn warehouse_transfer_lines(
        &mut self,
        company_id: CompanyId,
        id: WarehouseTransferId,
    ) -> Result<Vec<WarehouseTransferLine>, PortError> {
        Ok(repo::fetch_warehouse_transfer_lines(&mut *self.tx, *company_id.as_uuid(), *id.as_uuid()).await?)
    }

    async fn update_warehouse_transfer_status(
        &mut self,
        company_id: CompanyId,
        id: WarehouseTransferId,
        status: WarehouseTransferStatus,
    ) -> Result<(), PortError> {
        Ok(repo::update_status(
            &mut *self.tx,
            "warehouse_transfer",
            "WarehouseTransfer",
            *company_id.as_uuid(),
            *id.as_uuid(),
            status.as_str(),
        )
        .await?)
    }

    async fn lock_job(&mut self, company_id: CompanyId, id: JobId) -> Result<Job, PortError> {
        Ok(repo::lock_job(&mut *self.tx, *company_id.as_uuid(), *id.as_uuid()).await?)
    }

    async fn update_job(&mut self, job: &Job) -> Result<(), PortError> {
        Ok(repo::update_job(&mut *self.tx, job).await?)
    }

    async fn restore_tracked_entities(
        &mut self,
        company_id: CompanyId,
        restores: &[TrackedEntityRestore],
    ) -> Result<(), PortError> {
        for restore in restores {
            repo::restore_tracked_entity(&mut *self.tx, *company_id.as_uuid(), restore).await?;
        }
        Ok(())
    }

    async fn insert_tracked_activity(&mut self, record: &TrackedActivityRecord) -> Result<(), PortError> {
        repo::insert_tracked_activity(&mut *self.tx, record).await?;
        if !record.inputs.is_empty() {
            repo::tracked_activity_inputs_insert(record)
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(DatabaseError::from)?;
        }
        Ok(())
    }

    async fn mark_sales_invoice_posted(
        &mut self,
        company_id: CompanyId,
        id: SalesInvoiceId,
        posting_date: NaiveDate,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), PortError> {
        Ok(repo::mark_sales_invoice(
            &mut *self.tx,
            *company_id.as_uuid(),
            *id.as_uuid(),
            SalesInvoiceStatus::Submitted.as_str(),
            Some(posting_date),
            *user_id.as_uuid(),
            at,
        )
        .await?)
    }

    async fn mark_sales_invoice_voided(
        &mut self,
        company_id: CompanyId,
        id: SalesInvoiceId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), PortError> {
        Ok(repo::mark_sales_invoice(
            &mut *self.tx,
            *company_id.as_uuid(),
            *id.as_uuid(),
            SalesInvoiceStatus::Voided.as_str(),
            None,
            *user_id.as_uuid(),
            at,
        )
        .await?)
    }

    async fn mark_shipment_voided(
        &mut self,
        company_id: CompanyId,
        id: ShipmentId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), PortError> {
        Ok(repo::mark_shipment_voided(&mut *self.tx, *company_id.as_uuid(), *id.as_uuid(), *user_id.as_uuid(), at)
            .await?)
    }

    async fn commit(self) -> Result<(), PortError> {
        self.tx.commit().await.map_err(DatabaseError::from)?;
        debug!("Committed posting transaction");
        Ok(())
    }
}
