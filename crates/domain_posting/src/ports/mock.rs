//! In-memory store
//!
//! Keeps every table in one [`StoreState`] behind an async mutex. A
//! transaction takes the mutex for its whole lifetime, works on a copy of
//! the state and swaps the copy in on commit, which gives the same
//! all-or-nothing behaviour as the database adapter. Reads outside a
//! transaction wait for any open transaction to finish.
//!
//! Failure points can be armed to make a given step fail, which is how the
//! engine's rollback and compensation paths are exercised in tests.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use core_kernel::{
    AccountingPeriodId, CompanyId, CustomerId, DomainPort, HealthCheckResult, HealthCheckable,
    ItemId, JobId, JobOperationId, JournalId, PortError, PurchaseOrderLineId, SalesInvoiceId,
    SalesOrderId, SalesOrderLineId, ShipmentId, TrackedEntityId, UserId, WarehouseTransferId,
    WarehouseTransferLineId,
};

use super::{LedgerTransaction, PostingStore};
use crate::document::{
    SalesInvoice, SalesInvoiceLine, SalesInvoiceStatus, Shipment, ShipmentLine, ShipmentSource,
    ShipmentSourceKind, ShipmentStatus,
};
use crate::inventory::{
    Customer, Item, ItemCost, ItemLedgerEntry, TrackedActivity, TrackedActivityInput, TrackedEntity,
    TrackedEntityRestore, TrackedEntityStatus,
};
use crate::journal::{DocumentType, Journal, JournalLine};
use crate::order::{
    Job, JobOperation, JobOperationStatus, PurchaseOrderLine, SalesOrder, SalesOrderLine,
    SalesOrderStatus, WarehouseTransfer, WarehouseTransferLine, WarehouseTransferStatus,
};
use crate::posting_group::{InventoryGroupKey, InventoryPostingGroup, SalesGroupKey, SalesPostingGroup};
use crate::reversal::TrackedActivityRecord;

/// Every table the posting engine touches
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub sales_invoices: HashMap<SalesInvoiceId, SalesInvoice>,
    pub sales_invoice_lines: Vec<SalesInvoiceLine>,
    pub customers: HashMap<CustomerId, Customer>,
    pub items: HashMap<ItemId, Item>,
    pub item_costs: HashMap<ItemId, ItemCost>,
    pub inventory_posting_groups: Vec<InventoryPostingGroup>,
    pub sales_posting_groups: Vec<SalesPostingGroup>,
    pub shipments: HashMap<ShipmentId, Shipment>,
    pub shipment_lines: Vec<ShipmentLine>,
    pub sales_orders: HashMap<SalesOrderId, SalesOrder>,
    pub sales_order_lines: HashMap<SalesOrderLineId, SalesOrderLine>,
    pub purchase_order_lines: HashMap<PurchaseOrderLineId, PurchaseOrderLine>,
    pub warehouse_transfers: HashMap<WarehouseTransferId, WarehouseTransfer>,
    pub warehouse_transfer_lines: HashMap<WarehouseTransferLineId, WarehouseTransferLine>,
    pub jobs: HashMap<JobId, Job>,
    pub job_operations: HashMap<JobOperationId, JobOperation>,
    pub tracked_entities: HashMap<TrackedEntityId, TrackedEntity>,
    pub tracked_activities: Vec<TrackedActivity>,
    pub tracked_activity_inputs: Vec<TrackedActivityInput>,
    pub accounting_periods: HashMap<(CompanyId, i32, u32), AccountingPeriodId>,
    pub journals: Vec<Journal>,
    pub journal_lines: Vec<JournalLine>,
    pub item_ledger_entries: Vec<ItemLedgerEntry>,
}

impl StoreState {
    /// Journal lines of one document, originals and reversals alike
    pub fn journal_lines_for(&self, document_type: DocumentType, document_id: Uuid) -> Vec<&JournalLine> {
        self.journal_lines
            .iter()
            .filter(|line| line.document_type == document_type && line.document_id == document_id)
            .collect()
    }

    /// Item ledger entries of one document, originals and reversals alike
    pub fn item_ledger_entries_for(&self, document_type: DocumentType, document_id: Uuid) -> Vec<&ItemLedgerEntry> {
        self.item_ledger_entries
            .iter()
            .filter(|entry| entry.document_type == document_type && entry.document_id == document_id)
            .collect()
    }
}

/// Steps that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Begin,
    InsertJournalLines,
    InsertItemLedgerEntries,
    UpdateSalesOrderLine,
    RestoreTrackedEntities,
    MarkDocument,
    Commit,
    ResetStatus,
}

impl fmt::Display for FailurePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// In-memory implementation of [`PostingStore`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryPostingStore {
    state: Arc<Mutex<StoreState>>,
    failures: Arc<RwLock<HashSet<FailurePoint>>>,
    posting_group_lookups: Arc<AtomicUsize>,
}

impl InMemoryPostingStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given state
    pub fn with_initial_state(state: StoreState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            ..Self::default()
        }
    }

    /// Runs `f` against the committed state
    pub async fn with_state<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut state = self.state.lock().await;
        f(&mut state)
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> StoreState {
        self.state.lock().await.clone()
    }

    /// Makes the given step fail until disarmed
    pub async fn fail_at(&self, point: FailurePoint) {
        self.failures.write().await.insert(point);
    }

    /// Disarms every failure point
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Number of posting group reads served so far
    pub fn posting_group_lookups(&self) -> usize {
        self.posting_group_lookups.load(Ordering::SeqCst)
    }

    async fn check(&self, point: FailurePoint) -> Result<(), PortError> {
        if self.failures.read().await.contains(&point) {
            return Err(injected(point));
        }
        Ok(())
    }
}

fn injected(point: FailurePoint) -> PortError {
    PortError::internal(format!("injected failure at {point}"))
}

fn scoped<T: Clone>(
    value: Option<&T>,
    company_id: CompanyId,
    owner: impl Fn(&T) -> CompanyId,
    entity: &str,
    id: impl fmt::Display,
) -> Result<T, PortError> {
    match value {
        Some(value) if owner(value) == company_id => Ok(value.clone()),
        _ => Err(PortError::not_found(entity, id)),
    }
}

impl DomainPort for InMemoryPostingStore {}

#[async_trait]
impl HealthCheckable for InMemoryPostingStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("in-memory-posting-store")
    }
}

#[async_trait]
impl PostingStore for InMemoryPostingStore {
    type Tx = InMemoryTransaction;

    async fn sales_invoice(&self, company_id: CompanyId, id: SalesInvoiceId) -> Result<SalesInvoice, PortError> {
        let state = self.state.lock().await;
        scoped(state.sales_invoices.get(&id), company_id, |i| i.company_id, "SalesInvoice", id)
    }

    async fn sales_invoice_lines(
        &self,
        company_id: CompanyId,
        id: SalesInvoiceId,
    ) -> Result<Vec<SalesInvoiceLine>, PortError> {
        let state = self.state.lock().await;
        scoped(state.sales_invoices.get(&id), company_id, |i| i.company_id, "SalesInvoice", id)?;
        Ok(state
            .sales_invoice_lines
            .iter()
            .filter(|line| line.invoice_id == id)
            .cloned()
            .collect())
    }

    async fn customer(&self, company_id: CompanyId, id: CustomerId) -> Result<Customer, PortError> {
        let state = self.state.lock().await;
        scoped(state.customers.get(&id), company_id, |c| c.company_id, "Customer", id)
    }

    async fn item(&self, company_id: CompanyId, id: ItemId) -> Result<Item, PortError> {
        let state = self.state.lock().await;
        scoped(state.items.get(&id), company_id, |i| i.company_id, "Item", id)
    }

    async fn item_cost(&self, company_id: CompanyId, id: ItemId) -> Result<ItemCost, PortError> {
        let state = self.state.lock().await;
        scoped(state.item_costs.get(&id), company_id, |c| c.company_id, "ItemCost", id)
    }

    async fn inventory_posting_group(
        &self,
        company_id: CompanyId,
        key: InventoryGroupKey,
    ) -> Result<InventoryPostingGroup, PortError> {
        self.posting_group_lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        state
            .inventory_posting_groups
            .iter()
            .find(|group| group.company_id == company_id && group.key() == key)
            .cloned()
            .ok_or_else(|| PortError::not_found("InventoryPostingGroup", key))
    }

    async fn sales_posting_group(
        &self,
        company_id: CompanyId,
        key: SalesGroupKey,
    ) -> Result<SalesPostingGroup, PortError> {
        self.posting_group_lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        state
            .sales_posting_groups
            .iter()
            .find(|group| group.company_id == company_id && group.key() == key)
            .cloned()
            .ok_or_else(|| PortError::not_found("SalesPostingGroup", key))
    }

    async fn shipment(&self, company_id: CompanyId, id: ShipmentId) -> Result<Shipment, PortError> {
        let state = self.state.lock().await;
        scoped(state.shipments.get(&id), company_id, |s| s.company_id, "Shipment", id)
    }

    async fn shipment_lines(&self, company_id: CompanyId, id: ShipmentId) -> Result<Vec<ShipmentLine>, PortError> {
        let state = self.state.lock().await;
        scoped(state.shipments.get(&id), company_id, |s| s.company_id, "Shipment", id)?;
        Ok(state
            .shipment_lines
            .iter()
            .filter(|line| line.shipment_id == id)
            .cloned()
            .collect())
    }

    async fn shipments_for_source(
        &self,
        company_id: CompanyId,
        source: ShipmentSource,
    ) -> Result<Vec<Shipment>, PortError> {
        let state = self.state.lock().await;
        Ok(state
            .shipments
            .values()
            .filter(|s| {
                s.company_id == company_id
                    && s.source_document == source.kind()
                    && s.source_document_id == Some(source.id())
            })
            .cloned()
            .collect())
    }

    async fn journal(&self, company_id: CompanyId, id: JournalId) -> Result<Journal, PortError> {
        let state = self.state.lock().await;
        scoped(
            state.journals.iter().find(|journal| journal.id == id),
            company_id,
            |j| j.company_id,
            "Journal",
            id,
        )
    }

    async fn journal_lines_for_document(
        &self,
        company_id: CompanyId,
        document_type: DocumentType,
        document_id: Uuid,
    ) -> Result<Vec<JournalLine>, PortError> {
        let state = self.state.lock().await;
        Ok(state
            .journal_lines_for(document_type, document_id)
            .into_iter()
            .filter(|line| line.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn item_ledger_entries_for_document(
        &self,
        company_id: CompanyId,
        document_type: DocumentType,
        document_id: Uuid,
    ) -> Result<Vec<ItemLedgerEntry>, PortError> {
        let state = self.state.lock().await;
        Ok(state
            .item_ledger_entries_for(document_type, document_id)
            .into_iter()
            .filter(|entry| entry.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn begin(&self) -> Result<Self::Tx, PortError> {
        self.check(FailurePoint::Begin).await?;
        let failures = self.failures.read().await.clone();
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction { guard, working, failures })
    }

    async fn reset_sales_invoice_status(
        &self,
        company_id: CompanyId,
        id: SalesInvoiceId,
        status: SalesInvoiceStatus,
        user_id: UserId,
    ) -> Result<(), PortError> {
        self.check(FailurePoint::ResetStatus).await?;
        let mut state = self.state.lock().await;
        match state.sales_invoices.get_mut(&id) {
            Some(invoice) if invoice.company_id == company_id => {
                invoice.status = status;
                invoice.updated_by = Some(user_id);
                invoice.updated_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(PortError::not_found("SalesInvoice", id)),
        }
    }
}

/// Transaction over [`InMemoryPostingStore`]
///
/// Holds the store's lock until committed or dropped.
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
    failures: HashSet<FailurePoint>,
}

impl fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransaction")
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

impl InMemoryTransaction {
    fn check(&self, point: FailurePoint) -> Result<(), PortError> {
        if self.failures.contains(&point) {
            return Err(injected(point));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn lock_sales_invoice(&mut self, company_id: CompanyId, id: SalesInvoiceId) -> Result<SalesInvoice, PortError> {
        scoped(self.working.sales_invoices.get(&id), company_id, |i| i.company_id, "SalesInvoice", id)
    }

    async fn lock_shipment(&mut self, company_id: CompanyId, id: ShipmentId) -> Result<Shipment, PortError> {
        scoped(self.working.shipments.get(&id), company_id, |s| s.company_id, "Shipment", id)
    }

    async fn accounting_period(
        &mut self,
        company_id: CompanyId,
        posting_date: NaiveDate,
    ) -> Result<AccountingPeriodId, PortError> {
        let key = (company_id, posting_date.year(), posting_date.month());
        Ok(*self
            .working
            .accounting_periods
            .entry(key)
            .or_insert_with(AccountingPeriodId::new_v7))
    }

    async fn insert_journal(&mut self, journal: &Journal) -> Result<(), PortError> {
        self.working.journals.push(journal.clone());
        Ok(())
    }

    async fn insert_journal_lines(&mut self, lines: &[JournalLine]) -> Result<(), PortError> {
        self.check(FailurePoint::InsertJournalLines)?;
        self.working.journal_lines.extend_from_slice(lines);
        Ok(())
    }

    async fn insert_item_ledger_entries(&mut self, entries: &[ItemLedgerEntry]) -> Result<(), PortError> {
        self.check(FailurePoint::InsertItemLedgerEntries)?;
        self.working.item_ledger_entries.extend_from_slice(entries);
        Ok(())
    }

    async fn insert_shipment(&mut self, shipment: &Shipment, lines: &[ShipmentLine]) -> Result<(), PortError> {
        if self.working.shipments.contains_key(&shipment.id) {
            return Err(PortError::conflict(format!("shipment {} already exists", shipment.id)));
        }
        self.working.shipments.insert(shipment.id, shipment.clone());
        self.working.shipment_lines.extend_from_slice(lines);
        Ok(())
    }

    async fn lock_sales_order_line(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderLineId,
    ) -> Result<SalesOrderLine, PortError> {
        scoped(self.working.sales_order_lines.get(&id), company_id, |l| l.company_id, "SalesOrderLine", id)
    }

    async fn update_sales_order_line(&mut self, line: &SalesOrderLine) -> Result<(), PortError> {
        self.check(FailurePoint::UpdateSalesOrderLine)?;
        match self.working.sales_order_lines.get_mut(&line.id) {
            Some(stored) => {
                *stored = line.clone();
                Ok(())
            }
            None => Err(PortError::not_found("SalesOrderLine", line.id)),
        }
    }

    async fn sales_order_lines(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderId,
    ) -> Result<Vec<SalesOrderLine>, PortError> {
        Ok(self
            .working
            .sales_order_lines
            .values()
            .filter(|line| line.sales_order_id == id && line.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn update_sales_order_status(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderId,
        status: SalesOrderStatus,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), PortError> {
        match self.working.sales_orders.get_mut(&id) {
            Some(order) if order.company_id == company_id => {
                order.status = status;
                order.updated_by = Some(user_id);
                order.updated_at = Some(at);
                Ok(())
            }
            _ => Err(PortError::not_found("SalesOrder", id)),
        }
    }

    async fn set_sales_order_shipments_invoiced(
        &mut self,
        company_id: CompanyId,
        id: SalesOrderId,
        invoiced: bool,
    ) -> Result<u64, PortError> {
        let mut changed = 0;
        for shipment in self.working.shipments.values_mut() {
            if shipment.company_id == company_id
                && shipment.source_document == ShipmentSourceKind::SalesOrder
                && shipment.source_document_id == Some(*id.as_uuid())
                && shipment.status == ShipmentStatus::Posted
                && shipment.invoiced != invoiced
            {
                shipment.invoiced = invoiced;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn lock_purchase_order_line(
        &mut self,
        company_id: CompanyId,
        id: PurchaseOrderLineId,
    ) -> Result<PurchaseOrderLine, PortError> {
        scoped(self.working.purchase_order_lines.get(&id), company_id, |l| l.company_id, "PurchaseOrderLine", id)
    }

    async fn update_purchase_order_line(&mut self, line: &PurchaseOrderLine) -> Result<(), PortError> {
        match self.working.purchase_order_lines.get_mut(&line.id) {
            Some(stored) => {
                *stored = line.clone();
                Ok(())
            }
            None => Err(PortError::not_found("PurchaseOrderLine", line.id)),
        }
    }

    async fn update_job_operation_status(
        &mut self,
        company_id: CompanyId,
        id: JobOperationId,
        status: JobOperationStatus,
    ) -> Result<(), PortError> {
        match self.working.job_operations.get_mut(&id) {
            Some(operation) if operation.company_id == company_id => {
                operation.status = status;
                Ok(())
            }
            _ => Err(PortError::not_found("JobOperation", id)),
        }
    }

    async fn lock_warehouse_transfer_line(
        &mut self,
        company_id: CompanyId,
        id: WarehouseTransferLineId,
    ) -> Result<WarehouseTransferLine, PortError> {
        scoped(
            self.working.warehouse_transfer_lines.get(&id),
            company_id,
            |l| l.company_id,
            "WarehouseTransferLine",
            id,
        )
    }

    async fn update_warehouse_transfer_line(&mut self, line: &WarehouseTransferLine) -> Result<(), PortError> {
        match self.working.warehouse_transfer_lines.get_mut(&line.id) {
            Some(stored) => {
                *stored = line.clone();
                Ok(())
            }
            None => Err(PortError::not_found("WarehouseTransferLine", line.id)),
        }
    }

    async fn warehouse_transfer_lines(
        &mut self,
        company_id: CompanyId,
        id: WarehouseTransferId,
    ) -> Result<Vec<WarehouseTransferLine>, PortError> {
        Ok(self
            .working
            .warehouse_transfer_lines
            .values()
            .filter(|line| line.transfer_id == id && line.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn update_warehouse_transfer_status(
        &mut self,
        company_id: CompanyId,
        id: WarehouseTransferId,
        status: WarehouseTransferStatus,
    ) -> Result<(), PortError> {
        match self.working.warehouse_transfers.get_mut(&id) {
            Some(transfer) if transfer.company_id == company_id => {
                transfer.status = status;
                Ok(())
            }
            _ => Err(PortError::not_found("WarehouseTransfer", id)),
        }
    }

    async fn lock_job(&mut self, company_id: CompanyId, id: JobId) -> Result<Job, PortError> {
        scoped(self.working.jobs.get(&id), company_id, |j| j.company_id, "Job", id)
    }

    async fn update_job(&mut self, job: &Job) -> Result<(), PortError> {
        match self.working.jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(PortError::not_found("Job", job.id)),
        }
    }

    async fn restore_tracked_entities(
        &mut self,
        company_id: CompanyId,
        restores: &[TrackedEntityRestore],
    ) -> Result<(), PortError> {
        self.check(FailurePoint::RestoreTrackedEntities)?;
        for restore in restores {
            match self.working.tracked_entities.get_mut(&restore.tracked_entity_id) {
                Some(entity) if entity.company_id == company_id => {
                    entity.status = TrackedEntityStatus::Available;
                    entity.quantity += restore.quantity;
                }
                _ => return Err(PortError::not_found("TrackedEntity", restore.tracked_entity_id)),
            }
        }
        Ok(())
    }

    async fn insert_tracked_activity(&mut self, record: &TrackedActivityRecord) -> Result<(), PortError> {
        self.working.tracked_activities.push(record.activity.clone());
        self.working.tracked_activity_inputs.extend_from_slice(&record.inputs);
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
        self.check(FailurePoint::MarkDocument)?;
        match self.working.sales_invoices.get_mut(&id) {
            Some(invoice) if invoice.company_id == company_id => {
                invoice.status = SalesInvoiceStatus::Submitted;
                invoice.posting_date = Some(posting_date);
                invoice.updated_by = Some(user_id);
                invoice.updated_at = Some(at);
                Ok(())
            }
            _ => Err(PortError::not_found("SalesInvoice", id)),
        }
    }

    async fn mark_sales_invoice_voided(
        &mut self,
        company_id: CompanyId,
        id: SalesInvoiceId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), PortError> {
        self.check(FailurePoint::MarkDocument)?;
        match self.working.sales_invoices.get_mut(&id) {
            Some(invoice) if invoice.company_id == company_id => {
                invoice.status = SalesInvoiceStatus::Voided;
                invoice.updated_by = Some(user_id);
                invoice.updated_at = Some(at);
                Ok(())
            }
            _ => Err(PortError::not_found("SalesInvoice", id)),
        }
    }

    async fn mark_shipment_voided(
        &mut self,
        company_id: CompanyId,
        id: ShipmentId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), PortError> {
        self.check(FailurePoint::MarkDocument)?;
        match self.working.shipments.get_mut(&id) {
            Some(shipment) if shipment.company_id == company_id => {
                shipment.status = ShipmentStatus::Voided;
                shipment.invoiced = false;
                shipment.voided_by = Some(user_id);
                shipment.voided_date = Some(at);
                Ok(())
            }
            _ => Err(PortError::not_found("Shipment", id)),
        }
    }

    async fn commit(self) -> Result<(), PortError> {
        self.check(FailurePoint::Commit)?;
        let InMemoryTransaction { mut guard, working, .. } = self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::LineType;
    use rust_decimal_macros::dec;

    fn order_line(company_id: CompanyId) -> SalesOrderLine {
        SalesOrderLine {
            id: SalesOrderLineId::new(),
            sales_order_id: SalesOrderId::new(),
            company_id,
            sales_order_line_type: LineType::Part,
            sale_quantity: dec!(5),
            quantity_to_invoice: None,
            quantity_invoiced: dec!(0),
            invoiced_complete: false,
            quantity_sent: dec!(0),
            sent_complete: false,
            sent_date: None,
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let company_id = CompanyId::new();
        let line = order_line(company_id);
        let store = InMemoryPostingStore::new();
        store.with_state(|s| s.sales_order_lines.insert(line.id, line.clone())).await;

        {
            let mut tx = store.begin().await.unwrap();
            let mut locked = tx.lock_sales_order_line(company_id, line.id).await.unwrap();
            locked.apply_invoiced(dec!(5));
            tx.update_sales_order_line(&locked).await.unwrap();
        }

        let state = store.snapshot().await;
        assert_eq!(state.sales_order_lines[&line.id].quantity_invoiced, dec!(0));
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let company_id = CompanyId::new();
        let line = order_line(company_id);
        let store = InMemoryPostingStore::new();
        store.with_state(|s| s.sales_order_lines.insert(line.id, line.clone())).await;

        let mut tx = store.begin().await.unwrap();
        let mut locked = tx.lock_sales_order_line(company_id, line.id).await.unwrap();
        locked.apply_invoiced(dec!(5));
        tx.update_sales_order_line(&locked).await.unwrap();
        tx.commit().await.unwrap();

        let state = store.snapshot().await;
        assert!(state.sales_order_lines[&line.id].invoiced_complete);
    }

    #[tokio::test]
    async fn test_accounting_period_is_reused_within_month() {
        let store = InMemoryPostingStore::new();
        let company_id = CompanyId::new();
        let mut tx = store.begin().await.unwrap();

        let may_3 = tx.accounting_period(company_id, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap()).await.unwrap();
        let may_30 = tx.accounting_period(company_id, NaiveDate::from_ymd_opt(2024, 5, 30).unwrap()).await.unwrap();
        let june = tx.accounting_period(company_id, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()).await.unwrap();

        assert_eq!(may_3, may_30);
        assert_ne!(may_3, june);
    }

    #[tokio::test]
    async fn test_other_company_rows_are_not_found() {
        let line = order_line(CompanyId::new());
        let store = InMemoryPostingStore::new();
        store.with_state(|s| s.sales_order_lines.insert(line.id, line.clone())).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx.lock_sales_order_line(CompanyId::new(), line.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_armed_failure_point() {
        let store = InMemoryPostingStore::new();
        store.fail_at(FailurePoint::Commit).await;
        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_err());

        store.clear_failures().await;
        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_ok());
    }
}
