//! Posting engine
//!
//! Runs posting and void operations through a fixed sequence of phases:
//!
//! ```text
//! Fetching -> Building -> Applying -> Committed
//!     \           \           \
//!      +-----------+-----------+--> Aborted
//! ```
//!
//! * **Fetching** reads the document and everything derived from it through
//!   [`PostingStore`], outside any transaction, and checks the document status.
//! * **Building** derives every ledger effect in memory.
//! * **Applying** opens one [`LedgerTransaction`], locks the document row,
//!   re-checks its status and writes all effects. Any failure drops the
//!   transaction, which rolls everything back.
//!
//! When a sales invoice posting fails after its status check passed, the
//! engine resets the invoice to Draft with one best-effort write outside the
//! transaction. Post-commit hooks run last; their failures are logged only.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use core_kernel::{
    CompanyId, HealthCheckResult, JournalId, SalesInvoiceId, SalesOrderId, ShipmentId, UserId,
};

use crate::builder::{
    build_invoice_posting, line_group_keys, InvoicePostingContext, InvoicePostingInput,
};
use crate::document::{SalesInvoiceStatus, ShipmentSource, ShipmentSourceKind, ShipmentStatus};
use crate::error::PostingError;
use crate::hook::{PostingEvent, PostingEventKind, PostingHook};
use crate::journal::{DocumentType, Journal};
use crate::order::{JobOperationStatus, SalesOrderStatus};
use crate::ports::{LedgerTransaction, PostingStore};
use crate::posting_group::PostingGroupResolver;
use crate::reversal::{
    invoiced_rollbacks, job_rollbacks, reverse_ledger, source_rollback, void_shipment_activity,
    LedgerReversal, PostedLedger, ReversalContext, SourceRollback, TrackedActivityRecord,
};
use crate::status::{warehouse_transfer_status, SalesOrderProgress};

/// Phase of one posting or void run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Fetching,
    Building,
    Applying,
    Committed,
    Aborted,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunPhase::Fetching => "fetching",
            RunPhase::Building => "building",
            RunPhase::Applying => "applying",
            RunPhase::Committed => "committed",
            RunPhase::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Input of every engine operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingRequest<Id> {
    pub document_id: Id,
    pub user_id: UserId,
    pub company_id: CompanyId,
}

impl<Id> PostingRequest<Id> {
    pub fn new(document_id: Id, user_id: UserId, company_id: CompanyId) -> Self {
        Self { document_id, user_id, company_id }
    }
}

/// Result of a committed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingOutcome {
    pub phase: RunPhase,
    /// Journal written by the run, if it wrote any journal lines
    pub journal_id: Option<JournalId>,
    pub journal_lines: usize,
    pub item_ledger_entries: usize,
}

/// Tracks and logs the phase of one run
#[derive(Debug)]
struct Run {
    operation: &'static str,
    phase: RunPhase,
    guard_passed: bool,
}

impl Run {
    fn start(operation: &'static str) -> Self {
        debug!(operation, phase = %RunPhase::Fetching, "run started");
        Self { operation, phase: RunPhase::Fetching, guard_passed: false }
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(operation = self.operation, from = %self.phase, to = %phase, "phase transition");
        self.phase = phase;
    }

    fn abort(&mut self, error: &PostingError) {
        if error.is_rejection() {
            warn!(operation = self.operation, phase = %self.phase, kind = error.kind(), %error, "run rejected");
        } else {
            error!(operation = self.operation, phase = %self.phase, kind = error.kind(), %error, "run aborted");
        }
        self.phase = RunPhase::Aborted;
    }
}

/// Object-safe surface of the engine, used where the store type is erased
#[async_trait]
pub trait DocumentPosting: Send + Sync {
    async fn post_sales_invoice(&self, request: PostingRequest<SalesInvoiceId>) -> Result<PostingOutcome, PostingError>;

    async fn void_sales_invoice(&self, request: PostingRequest<SalesInvoiceId>) -> Result<PostingOutcome, PostingError>;

    async fn void_shipment(&self, request: PostingRequest<ShipmentId>) -> Result<PostingOutcome, PostingError>;

    async fn health_check(&self) -> HealthCheckResult;
}

/// Posts and voids documents against a store
pub struct PostingEngine<S: PostingStore> {
    store: Arc<S>,
    hooks: Vec<Arc<dyn PostingHook>>,
}

impl<S: PostingStore> PostingEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, hooks: Vec::new() }
    }

    /// Registers a hook notified after every committed run
    pub fn with_hook(mut self, hook: Arc<dyn PostingHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Posts a Draft or Pending sales invoice
    ///
    /// # Arguments
    ///
    /// * `request` - Invoice, acting user and company
    ///
    /// # Returns
    ///
    /// The committed outcome with the journal written
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the invoice is not Draft or Pending
    /// - `Lookup` if the invoice or any reference data is missing
    /// - `Transaction` if applying the posting failed; nothing was written and
    ///   the invoice has been reset to Draft
    #[instrument(skip(self), fields(company_id = %request.company_id, invoice_id = %request.document_id))]
    pub async fn post_sales_invoice(
        &self,
        request: PostingRequest<SalesInvoiceId>,
    ) -> Result<PostingOutcome, PostingError> {
        let mut run = Run::start("post_sales_invoice");
        match self.run_post_sales_invoice(&request, &mut run).await {
            Ok(outcome) => {
                self.notify(PostingEventKind::SalesInvoicePosted, &request, *request.document_id.as_uuid(), &outcome)
                    .await;
                Ok(outcome)
            }
            Err(error) => {
                run.abort(&error);
                if run.guard_passed && !error.is_rejection() {
                    self.reset_invoice_to_draft(&request).await;
                }
                Err(error)
            }
        }
    }

    /// Voids a posted sales invoice and every shipment it generated
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the invoice is not posted
    /// - `Lookup` if the invoice or its journal is missing
    /// - `Transaction` if applying the reversal failed; nothing was written
    #[instrument(skip(self), fields(company_id = %request.company_id, invoice_id = %request.document_id))]
    pub async fn void_sales_invoice(
        &self,
        request: PostingRequest<SalesInvoiceId>,
    ) -> Result<PostingOutcome, PostingError> {
        let mut run = Run::start("void_sales_invoice");
        match self.run_void_sales_invoice(&request, &mut run).await {
            Ok(outcome) => {
                self.notify(PostingEventKind::SalesInvoiceVoided, &request, *request.document_id.as_uuid(), &outcome)
                    .await;
                Ok(outcome)
            }
            Err(error) => {
                run.abort(&error);
                Err(error)
            }
        }
    }

    /// Voids a posted shipment
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the shipment is not Posted, has no source document,
    ///   or was generated by a sales invoice
    /// - `Lookup` if the shipment is missing
    /// - `Transaction` if applying the reversal failed; nothing was written
    #[instrument(skip(self), fields(company_id = %request.company_id, shipment_id = %request.document_id))]
    pub async fn void_shipment(&self, request: PostingRequest<ShipmentId>) -> Result<PostingOutcome, PostingError> {
        let mut run = Run::start("void_shipment");
        match self.run_void_shipment(&request, &mut run).await {
            Ok(outcome) => {
                self.notify(PostingEventKind::ShipmentVoided, &request, *request.document_id.as_uuid(), &outcome)
                    .await;
                Ok(outcome)
            }
            Err(error) => {
                run.abort(&error);
                Err(error)
            }
        }
    }

    async fn run_post_sales_invoice(
        &self,
        request: &PostingRequest<SalesInvoiceId>,
        run: &mut Run,
    ) -> Result<PostingOutcome, PostingError> {
        let PostingRequest { document_id: invoice_id, user_id, company_id } = *request;
        let store = self.store.as_ref();

        let invoice = store
            .sales_invoice(company_id, invoice_id)
            .await
            .map_err(|e| PostingError::from_read("sales invoice", invoice_id, e))?;
        if !invoice.status.can_post() {
            return Err(PostingError::invalid_state(format!(
                "sales invoice {} is {} and cannot be posted",
                invoice.invoice_number, invoice.status
            )));
        }
        run.guard_passed = true;

        let lines = store
            .sales_invoice_lines(company_id, invoice_id)
            .await
            .map_err(|e| PostingError::from_read("sales invoice lines", invoice_id, e))?;
        let customer = store
            .customer(company_id, invoice.customer_id)
            .await
            .map_err(|e| PostingError::from_read("customer", invoice.customer_id, e))?;

        let mut items = HashMap::new();
        let mut item_costs = HashMap::new();
        for item_id in lines.iter().filter_map(|line| line.item_id) {
            if items.contains_key(&item_id) {
                continue;
            }
            let item = store
                .item(company_id, item_id)
                .await
                .map_err(|e| PostingError::from_read("item", item_id, e))?;
            if item.is_inventory() {
                match store.item_cost(company_id, item_id).await {
                    Ok(cost) => {
                        item_costs.insert(item_id, cost);
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(PostingError::Store(e)),
                }
            }
            items.insert(item_id, item);
        }

        let mut resolver = PostingGroupResolver::new(store, company_id);
        for line in &lines {
            let item = line.item_id.and_then(|id| items.get(&id));
            if let Some(keys) = line_group_keys(&invoice, line, item, &customer)? {
                resolver.sales(keys.sales).await?;
                if let Some(key) = keys.inventory {
                    resolver.inventory(key).await?;
                }
            }
        }
        let posting_groups = resolver.into_groups();

        run.enter(RunPhase::Building);
        let posting_date = invoice.posting_date.unwrap_or_else(today);
        let context = InvoicePostingContext {
            company_id,
            user_id,
            posting_date,
            journal_id: JournalId::new_v7(),
            shipment_id: ShipmentId::new_v7(),
        };
        let plan = build_invoice_posting(
            &InvoicePostingInput {
                invoice: &invoice,
                lines: &lines,
                items: &items,
                item_costs: &item_costs,
                customer: &customer,
                posting_groups: &posting_groups,
            },
            &context,
        )?;

        run.enter(RunPhase::Applying);
        let at = Utc::now();
        let mut tx = store.begin().await?;

        let locked = tx.lock_sales_invoice(company_id, invoice_id).await?;
        if !locked.status.can_post() {
            return Err(PostingError::invalid_state(format!(
                "sales invoice {} became {} while posting",
                locked.invoice_number, locked.status
            )));
        }

        let journal_id = if plan.journal_lines.is_empty() {
            None
        } else {
            let description = format!("Sales Invoice {}", invoice.invoice_number);
            write_journal(&mut tx, &context.journal_id, company_id, user_id, posting_date, description).await?;
            tx.insert_journal_lines(&plan.journal_lines).await?;
            Some(context.journal_id)
        };

        if let Some(generated) = &plan.shipment {
            tx.insert_shipment(&generated.shipment, &generated.lines).await?;
        }
        if !plan.item_ledger_entries.is_empty() {
            tx.insert_item_ledger_entries(&plan.item_ledger_entries).await?;
        }

        let mut orders: Vec<SalesOrderId> = Vec::new();
        for update in &plan.order_line_updates {
            let mut line = tx.lock_sales_order_line(company_id, update.sales_order_line_id).await?;
            line.apply_invoiced(update.quantity_invoiced);
            tx.update_sales_order_line(&line).await?;
            if !orders.contains(&line.sales_order_id) {
                orders.push(line.sales_order_id);
            }
        }
        for order_id in orders {
            let status = propagate_sales_order(&mut tx, company_id, order_id, user_id, at).await?;
            debug!(sales_order_id = %order_id, %status, "sales order status recomputed");
        }

        tx.mark_sales_invoice_posted(company_id, invoice_id, posting_date, user_id, at).await?;
        tx.commit().await?;
        run.enter(RunPhase::Committed);

        info!(
            invoice = %invoice.invoice_number,
            journal_lines = plan.journal_lines.len(),
            item_ledger_entries = plan.item_ledger_entries.len(),
            shipped_on_invoice = plan.shipment.is_some(),
            "sales invoice posted"
        );

        Ok(PostingOutcome {
            phase: RunPhase::Committed,
            journal_id,
            journal_lines: plan.journal_lines.len(),
            item_ledger_entries: plan.item_ledger_entries.len(),
        })
    }

    async fn run_void_sales_invoice(
        &self,
        request: &PostingRequest<SalesInvoiceId>,
        run: &mut Run,
    ) -> Result<PostingOutcome, PostingError> {
        let PostingRequest { document_id: invoice_id, user_id, company_id } = *request;
        let store = self.store.as_ref();

        let invoice = store
            .sales_invoice(company_id, invoice_id)
            .await
            .map_err(|e| PostingError::from_read("sales invoice", invoice_id, e))?;
        if !invoice.status.is_posted() {
            return Err(PostingError::invalid_state(format!(
                "sales invoice {} is {} and cannot be voided",
                invoice.invoice_number, invoice.status
            )));
        }
        run.guard_passed = true;

        let lines = store
            .sales_invoice_lines(company_id, invoice_id)
            .await
            .map_err(|e| PostingError::from_read("sales invoice lines", invoice_id, e))?;
        let journal_lines = store
            .journal_lines_for_document(company_id, DocumentType::SalesInvoice, *invoice_id.as_uuid())
            .await
            .map_err(PostingError::Store)?;
        let journal = match journal_lines.first() {
            Some(line) => Some(
                store
                    .journal(company_id, line.journal_id)
                    .await
                    .map_err(|e| PostingError::from_read("journal", line.journal_id, e))?,
            ),
            None => None,
        };

        let mut shipments = Vec::new();
        for shipment in store
            .shipments_for_source(company_id, ShipmentSource::SalesInvoice(invoice_id))
            .await
            .map_err(PostingError::Store)?
        {
            if shipment.status != ShipmentStatus::Posted {
                continue;
            }
            let entries = store
                .item_ledger_entries_for_document(company_id, DocumentType::SalesShipment, *shipment.id.as_uuid())
                .await
                .map_err(PostingError::Store)?;
            shipments.push((shipment, entries));
        }

        run.enter(RunPhase::Building);
        let context = reversal_context(company_id, user_id);
        let mut reversal = reverse_ledger(
            &PostedLedger { journal: journal.as_ref(), journal_lines: &journal_lines, item_ledger_entries: &[] },
            &context,
        )?;
        let mut activities = Vec::new();
        for (shipment, entries) in &shipments {
            let shipment_reversal = reverse_ledger(
                &PostedLedger { journal: None, journal_lines: &[], item_ledger_entries: entries },
                &context,
            )?;
            activities.extend(void_shipment_activity(shipment, &shipment_reversal.tracked_entities, &context));
            reversal.merge(shipment_reversal);
        }
        let rollbacks = invoiced_rollbacks(&lines);

        run.enter(RunPhase::Applying);
        let mut tx = store.begin().await?;

        let locked = tx.lock_sales_invoice(company_id, invoice_id).await?;
        if !locked.status.is_posted() {
            return Err(PostingError::invalid_state(format!(
                "sales invoice {} became {} while voiding",
                locked.invoice_number, locked.status
            )));
        }

        let journal_id = apply_ledger_reversal(&mut tx, &reversal, &activities, &context).await?;

        for (shipment, _) in &shipments {
            let locked = tx.lock_shipment(company_id, shipment.id).await?;
            if locked.status == ShipmentStatus::Posted {
                tx.mark_shipment_voided(company_id, shipment.id, user_id, context.voided_at).await?;
            }
        }

        let mut orders: Vec<SalesOrderId> = Vec::new();
        for rollback in &rollbacks {
            let mut line = tx.lock_sales_order_line(company_id, rollback.sales_order_line_id).await?;
            line.reverse_invoiced(rollback.quantity_invoiced);
            tx.update_sales_order_line(&line).await?;
            if !orders.contains(&line.sales_order_id) {
                orders.push(line.sales_order_id);
            }
        }
        for order_id in orders {
            let status = propagate_sales_order(&mut tx, company_id, order_id, user_id, context.voided_at).await?;
            debug!(sales_order_id = %order_id, %status, "sales order status recomputed");
        }

        tx.mark_sales_invoice_voided(company_id, invoice_id, user_id, context.voided_at).await?;
        tx.commit().await?;
        run.enter(RunPhase::Committed);

        info!(
            invoice = %invoice.invoice_number,
            journal_lines = reversal.journal_lines.len(),
            item_ledger_entries = reversal.item_ledger_entries.len(),
            shipments_voided = shipments.len(),
            "sales invoice voided"
        );

        Ok(PostingOutcome {
            phase: RunPhase::Committed,
            journal_id,
            journal_lines: reversal.journal_lines.len(),
            item_ledger_entries: reversal.item_ledger_entries.len(),
        })
    }

    async fn run_void_shipment(
        &self,
        request: &PostingRequest<ShipmentId>,
        run: &mut Run,
    ) -> Result<PostingOutcome, PostingError> {
        let PostingRequest { document_id: shipment_id, user_id, company_id } = *request;
        let store = self.store.as_ref();

        let shipment = store
            .shipment(company_id, shipment_id)
            .await
            .map_err(|e| PostingError::from_read("shipment", shipment_id, e))?;
        if shipment.status != ShipmentStatus::Posted {
            return Err(PostingError::invalid_state(format!(
                "shipment {} is {} and cannot be voided",
                shipment.shipment_number, shipment.status
            )));
        }
        let source = shipment.source()?;
        if let ShipmentSource::SalesInvoice(invoice_id) = source {
            return Err(PostingError::invalid_state(format!(
                "shipment {} was generated by sales invoice {invoice_id}; void the invoice instead",
                shipment.shipment_number
            )));
        }
        run.guard_passed = true;

        let document_type = match source.kind() {
            ShipmentSourceKind::OutboundTransfer => DocumentType::TransferShipment,
            ShipmentSourceKind::SalesOrder | ShipmentSourceKind::PurchaseOrder | ShipmentSourceKind::SalesInvoice => {
                DocumentType::SalesShipment
            }
        };

        let lines = store
            .shipment_lines(company_id, shipment_id)
            .await
            .map_err(|e| PostingError::from_read("shipment lines", shipment_id, e))?;
        let journal_lines = store
            .journal_lines_for_document(company_id, document_type, *shipment_id.as_uuid())
            .await
            .map_err(PostingError::Store)?;
        let journal = match journal_lines.first() {
            Some(line) => Some(
                store
                    .journal(company_id, line.journal_id)
                    .await
                    .map_err(|e| PostingError::from_read("journal", line.journal_id, e))?,
            ),
            None => None,
        };
        let entries = store
            .item_ledger_entries_for_document(company_id, document_type, *shipment_id.as_uuid())
            .await
            .map_err(PostingError::Store)?;

        run.enter(RunPhase::Building);
        let context = reversal_context(company_id, user_id);
        let reversal = reverse_ledger(
            &PostedLedger { journal: journal.as_ref(), journal_lines: &journal_lines, item_ledger_entries: &entries },
            &context,
        )?;
        let activities: Vec<TrackedActivityRecord> =
            void_shipment_activity(&shipment, &reversal.tracked_entities, &context).into_iter().collect();
        let rollback = source_rollback(source, &lines)?;
        let jobs = job_rollbacks(&lines);

        run.enter(RunPhase::Applying);
        let mut tx = store.begin().await?;

        let locked = tx.lock_shipment(company_id, shipment_id).await?;
        if locked.status != ShipmentStatus::Posted {
            return Err(PostingError::invalid_state(format!(
                "shipment {} became {} while voiding",
                locked.shipment_number, locked.status
            )));
        }

        let journal_id = apply_ledger_reversal(&mut tx, &reversal, &activities, &context).await?;

        match rollback {
            SourceRollback::SalesOrder { sales_order_id, lines } => {
                for (line_id, quantity) in lines {
                    let mut line = tx.lock_sales_order_line(company_id, line_id).await?;
                    line.reverse_sent(quantity);
                    tx.update_sales_order_line(&line).await?;
                }
                let status = propagate_sales_order(&mut tx, company_id, sales_order_id, user_id, context.voided_at).await?;
                debug!(%sales_order_id, %status, "sales order status recomputed");
            }
            SourceRollback::PurchaseOrder { lines } => {
                for (line_id, quantity) in lines {
                    let mut line = tx.lock_purchase_order_line(company_id, line_id).await?;
                    line.reverse_shipped(quantity);
                    tx.update_purchase_order_line(&line).await?;
                    if let Some(operation_id) = line.job_operation_id {
                        tx.update_job_operation_status(company_id, operation_id, JobOperationStatus::Planned)
                            .await?;
                    }
                }
            }
            SourceRollback::OutboundTransfer { transfer_id, lines } => {
                for (line_id, quantity) in lines {
                    let mut line = tx.lock_warehouse_transfer_line(company_id, line_id).await?;
                    line.reverse_shipped(quantity);
                    tx.update_warehouse_transfer_line(&line).await?;
                }
                let siblings = tx.warehouse_transfer_lines(company_id, transfer_id).await?;
                let status = warehouse_transfer_status(&siblings);
                tx.update_warehouse_transfer_status(company_id, transfer_id, status).await?;
                debug!(%transfer_id, %status, "warehouse transfer status recomputed");
            }
        }

        for (job_id, quantity) in jobs {
            let mut job = tx.lock_job(company_id, job_id).await?;
            job.reverse_shipment(quantity);
            tx.update_job(&job).await?;
        }

        tx.mark_shipment_voided(company_id, shipment_id, user_id, context.voided_at).await?;
        tx.commit().await?;
        run.enter(RunPhase::Committed);

        info!(
            shipment = %shipment.shipment_number,
            source = %source.kind(),
            journal_lines = reversal.journal_lines.len(),
            item_ledger_entries = reversal.item_ledger_entries.len(),
            tracked_entities = reversal.tracked_entities.len(),
            "shipment voided"
        );

        Ok(PostingOutcome {
            phase: RunPhase::Committed,
            journal_id,
            journal_lines: reversal.journal_lines.len(),
            item_ledger_entries: reversal.item_ledger_entries.len(),
        })
    }

    async fn reset_invoice_to_draft(&self, request: &PostingRequest<SalesInvoiceId>) {
        match self
            .store
            .reset_sales_invoice_status(request.company_id, request.document_id, SalesInvoiceStatus::Draft, request.user_id)
            .await
        {
            Ok(()) => info!(invoice_id = %request.document_id, "sales invoice reset to Draft after failed posting"),
            Err(e) => error!(invoice_id = %request.document_id, error = %e, "failed to reset sales invoice to Draft"),
        }
    }

    async fn notify<Id>(
        &self,
        kind: PostingEventKind,
        request: &PostingRequest<Id>,
        document_id: uuid::Uuid,
        outcome: &PostingOutcome,
    ) {
        let event = PostingEvent {
            kind,
            company_id: request.company_id,
            user_id: request.user_id,
            document_id,
            journal_id: outcome.journal_id,
        };
        for hook in &self.hooks {
            if let Err(e) = hook.after_commit(&event).await {
                warn!(hook = hook.name(), error = %e, ?kind, "post-commit hook failed");
            }
        }
    }
}

#[async_trait]
impl<S: PostingStore> DocumentPosting for PostingEngine<S> {
    async fn post_sales_invoice(&self, request: PostingRequest<SalesInvoiceId>) -> Result<PostingOutcome, PostingError> {
        PostingEngine::post_sales_invoice(self, request).await
    }

    async fn void_sales_invoice(&self, request: PostingRequest<SalesInvoiceId>) -> Result<PostingOutcome, PostingError> {
        PostingEngine::void_sales_invoice(self, request).await
    }

    async fn void_shipment(&self, request: PostingRequest<ShipmentId>) -> Result<PostingOutcome, PostingError> {
        PostingEngine::void_shipment(self, request).await
    }

    async fn health_check(&self) -> HealthCheckResult {
        self.store.health_check().await
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn reversal_context(company_id: CompanyId, user_id: UserId) -> ReversalContext {
    let voided_at = Utc::now();
    ReversalContext {
        company_id,
        user_id,
        journal_id: JournalId::new_v7(),
        posting_date: voided_at.date_naive(),
        voided_at,
    }
}

async fn write_journal<T: LedgerTransaction>(
    tx: &mut T,
    journal_id: &JournalId,
    company_id: CompanyId,
    user_id: UserId,
    posting_date: NaiveDate,
    description: String,
) -> Result<(), PostingError> {
    let accounting_period_id = tx.accounting_period(company_id, posting_date).await?;
    tx.insert_journal(&Journal {
        id: *journal_id,
        company_id,
        accounting_period_id,
        description,
        posting_date,
        created_by: user_id,
    })
    .await?;
    Ok(())
}

async fn apply_ledger_reversal<T: LedgerTransaction>(
    tx: &mut T,
    reversal: &LedgerReversal,
    activities: &[TrackedActivityRecord],
    context: &ReversalContext,
) -> Result<Option<JournalId>, PostingError> {
    let journal_id = match &reversal.journal_description {
        Some(description) => {
            write_journal(
                tx,
                &context.journal_id,
                context.company_id,
                context.user_id,
                context.posting_date,
                description.clone(),
            )
            .await?;
            tx.insert_journal_lines(&reversal.journal_lines).await?;
            Some(context.journal_id)
        }
        None => None,
    };

    if !reversal.item_ledger_entries.is_empty() {
        tx.insert_item_ledger_entries(&reversal.item_ledger_entries).await?;
    }
    if !reversal.tracked_entities.is_empty() {
        tx.restore_tracked_entities(context.company_id, &reversal.tracked_entities).await?;
    }
    for record in activities {
        tx.insert_tracked_activity(record).await?;
    }

    Ok(journal_id)
}

/// Re-derives an order's status from all of its lines and writes it
///
/// Posted shipments of the order follow the order's invoiced state.
async fn propagate_sales_order<T: LedgerTransaction>(
    tx: &mut T,
    company_id: CompanyId,
    order_id: SalesOrderId,
    user_id: UserId,
    at: DateTime<Utc>,
) -> Result<SalesOrderStatus, PostingError> {
    let lines = tx.sales_order_lines(company_id, order_id).await?;
    let progress = SalesOrderProgress::from_lines(&lines);
    let status = progress.status();
    tx.update_sales_order_status(company_id, order_id, status, user_id, at).await?;
    tx.set_sales_order_shipments_invoiced(company_id, order_id, progress.all_invoiced).await?;
    Ok(status)
}
