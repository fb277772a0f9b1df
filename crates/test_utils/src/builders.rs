//! Test Data Builders
//!
//! Builders for documents with sensible defaults, plus [`PostingScenario`],
//! which collects a company's reference data and documents into a
//! [`StoreState`] and hands out a seeded in-memory store and engine.

use std::sync::Arc;

use chrono::Datelike;
use rust_decimal::Decimal;
use uuid::Uuid;

use core_kernel::{
    AccountingPeriodId, CompanyId, ItemId, ItemLedgerId, ItemPostingGroupId, JobId, JobOperationId,
    JournalId, LocationId, PurchaseOrderId, PurchaseOrderLineId, SalesInvoiceId,
    SalesInvoiceLineId, SalesOrderId, SalesOrderLineId, ShipmentId, ShipmentLineId,
    TrackedEntityId, UserId, WarehouseTransferId, WarehouseTransferLineId,
};
use domain_posting::journal::{document_line_reference, JournalSource, PairLeg};
use domain_posting::{
    Customer, DocumentType, InMemoryPostingStore, Item, ItemLedgerEntry, ItemLedgerEntryType,
    Job, JobOperation, JobOperationStatus, JobStatus, Journal, LineType, MethodType,
    PostingEngine, PurchaseOrderLine, SalesInvoice, SalesInvoiceLine, SalesInvoiceStatus,
    SalesOrder, SalesOrderLine, SalesOrderStatus, Shipment, ShipmentLine, ShipmentSource,
    ShipmentStatus, StoreState, TrackedEntity, TrackedEntityStatus, WarehouseTransfer,
    WarehouseTransferLine, WarehouseTransferStatus,
};

use crate::fixtures::{AccountFixtures, DateFixtures, PostingGroupFixtures, ReferenceFixtures};

/// Builder for a sales invoice line
#[derive(Debug, Clone)]
pub struct InvoiceLineBuilder {
    line_type: LineType,
    item_id: Option<ItemId>,
    quantity: Decimal,
    unit_price: Decimal,
    shipping_cost: Decimal,
    add_on_cost: Decimal,
    tax_percent: Decimal,
    conversion_factor: Decimal,
    method_type: MethodType,
    sales_order_id: Option<SalesOrderId>,
    sales_order_line_id: Option<SalesOrderLineId>,
    location_id: Option<LocationId>,
}

impl InvoiceLineBuilder {
    /// A Part line for `item`
    pub fn item(item: &Item, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            line_type: LineType::Part,
            item_id: Some(item.id),
            quantity,
            unit_price,
            shipping_cost: Decimal::ZERO,
            add_on_cost: Decimal::ZERO,
            tax_percent: Decimal::ZERO,
            conversion_factor: Decimal::ONE,
            method_type: MethodType::Pick,
            sales_order_id: None,
            sales_order_line_id: None,
            location_id: None,
        }
    }

    /// A Service line without an item
    pub fn service(quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            line_type: LineType::Service,
            item_id: None,
            ..Self::comment()
        }
        .with_amounts(quantity, unit_price)
    }

    /// A Comment line
    pub fn comment() -> Self {
        Self {
            line_type: LineType::Comment,
            item_id: None,
            quantity: Decimal::ZERO,
            unit_price: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            add_on_cost: Decimal::ZERO,
            tax_percent: Decimal::ZERO,
            conversion_factor: Decimal::ONE,
            method_type: MethodType::Pick,
            sales_order_id: None,
            sales_order_line_id: None,
            location_id: None,
        }
    }

    fn with_amounts(mut self, quantity: Decimal, unit_price: Decimal) -> Self {
        self.quantity = quantity;
        self.unit_price = unit_price;
        self
    }

    pub fn with_line_type(mut self, line_type: LineType) -> Self {
        self.line_type = line_type;
        self
    }

    /// Links the line to a sales order line, so it does not ship on the invoice
    pub fn linked_to(mut self, sales_order_id: SalesOrderId, sales_order_line_id: SalesOrderLineId) -> Self {
        self.sales_order_id = Some(sales_order_id);
        self.sales_order_line_id = Some(sales_order_line_id);
        self
    }

    pub fn with_method(mut self, method_type: MethodType) -> Self {
        self.method_type = method_type;
        self
    }

    /// Sets the fractional tax rate
    pub fn with_tax(mut self, tax_percent: Decimal) -> Self {
        self.tax_percent = tax_percent;
        self
    }

    pub fn with_shipping(mut self, shipping_cost: Decimal) -> Self {
        self.shipping_cost = shipping_cost;
        self
    }

    pub fn with_add_on(mut self, add_on_cost: Decimal) -> Self {
        self.add_on_cost = add_on_cost;
        self
    }

    pub fn with_conversion_factor(mut self, conversion_factor: Decimal) -> Self {
        self.conversion_factor = conversion_factor;
        self
    }

    pub fn with_location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    fn build(self, invoice_id: SalesInvoiceId) -> SalesInvoiceLine {
        SalesInvoiceLine {
            id: SalesInvoiceLineId::new(),
            invoice_id,
            invoice_line_type: self.line_type,
            item_id: self.item_id,
            description: None,
            quantity: self.quantity,
            unit_price: self.unit_price,
            shipping_cost: self.shipping_cost,
            add_on_cost: self.add_on_cost,
            tax_percent: self.tax_percent,
            conversion_factor: self.conversion_factor,
            method_type: self.method_type,
            sales_order_id: self.sales_order_id,
            sales_order_line_id: self.sales_order_line_id,
            location_id: self.location_id,
            shelf_id: None,
            requires_serial_tracking: false,
            requires_batch_tracking: false,
        }
    }
}

/// Builder for a sales invoice and its lines
#[derive(Debug, Clone)]
pub struct SalesInvoiceBuilder {
    invoice: SalesInvoice,
    lines: Vec<InvoiceLineBuilder>,
}

impl SalesInvoiceBuilder {
    pub fn new(company_id: CompanyId, customer: &Customer, location_id: Option<LocationId>) -> Self {
        let id = SalesInvoiceId::new();
        Self {
            invoice: SalesInvoice {
                id,
                company_id,
                invoice_number: format!("SI{}", &id.as_uuid().simple().to_string()[..6]),
                customer_id: customer.id,
                location_id,
                posting_date: Some(DateFixtures::posting_date()),
                status: SalesInvoiceStatus::Draft,
                shipping_cost: Decimal::ZERO,
                exchange_rate: Decimal::ONE,
                updated_at: None,
                updated_by: None,
            },
            lines: Vec::new(),
        }
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.invoice.invoice_number = number.into();
        self
    }

    pub fn with_status(mut self, status: SalesInvoiceStatus) -> Self {
        self.invoice.status = status;
        self
    }

    /// Invoice-level shipping, spread over the lines pro rata
    pub fn with_shipping_cost(mut self, shipping_cost: Decimal) -> Self {
        self.invoice.shipping_cost = shipping_cost;
        self
    }

    pub fn with_exchange_rate(mut self, exchange_rate: Decimal) -> Self {
        self.invoice.exchange_rate = exchange_rate;
        self
    }

    pub fn without_posting_date(mut self) -> Self {
        self.invoice.posting_date = None;
        self
    }

    pub fn line(mut self, line: InvoiceLineBuilder) -> Self {
        self.lines.push(line);
        self
    }

    pub fn build(self) -> (SalesInvoice, Vec<SalesInvoiceLine>) {
        let invoice_id = self.invoice.id;
        let lines = self.lines.into_iter().map(|line| line.build(invoice_id)).collect();
        (self.invoice, lines)
    }
}

/// One line of a posted shipment
#[derive(Debug, Clone)]
pub struct ShipmentLineSpec {
    pub item: Item,
    pub quantity: Decimal,
    /// Source document line the shipment fulfilled
    pub line_id: Option<Uuid>,
    pub job_id: Option<JobId>,
    pub tracked_entity_id: Option<TrackedEntityId>,
    /// When set, the shipment also carries a COGS/Inventory journal pair of this amount
    pub cost: Option<Decimal>,
}

impl ShipmentLineSpec {
    pub fn new(item: &Item, quantity: Decimal) -> Self {
        Self {
            item: item.clone(),
            quantity,
            line_id: None,
            job_id: None,
            tracked_entity_id: None,
            cost: None,
        }
    }

    pub fn for_line(mut self, line_id: impl Into<Uuid>) -> Self {
        self.line_id = Some(line_id.into());
        self
    }

    pub fn for_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn tracked(mut self, tracked_entity_id: TrackedEntityId) -> Self {
        self.tracked_entity_id = Some(tracked_entity_id);
        self
    }

    pub fn with_cost(mut self, cost: Decimal) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// Sales order and its line ids
#[derive(Debug, Clone)]
pub struct OrderFixture {
    pub sales_order_id: SalesOrderId,
    pub line_ids: Vec<SalesOrderLineId>,
}

/// A company's reference data and documents, ready to seed a store
#[derive(Debug, Clone)]
pub struct PostingScenario {
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub location_id: LocationId,
    pub item_posting_group_id: ItemPostingGroupId,
    pub customer: Customer,
    state: StoreState,
}

impl Default for PostingScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl PostingScenario {
    /// A company with one customer, one location and posting groups for both
    pub fn new() -> Self {
        let company_id = CompanyId::new();
        let location_id = LocationId::new();
        let item_posting_group_id = ItemPostingGroupId::new();
        let customer = ReferenceFixtures::customer(company_id, None);

        let mut state = StoreState::default();
        state.customers.insert(customer.id, customer.clone());
        state.inventory_posting_groups.push(PostingGroupFixtures::inventory(
            company_id,
            Some(item_posting_group_id),
            Some(location_id),
        ));
        state.sales_posting_groups.push(PostingGroupFixtures::sales(
            company_id,
            Some(item_posting_group_id),
            None,
        ));
        state.sales_posting_groups.push(PostingGroupFixtures::sales(company_id, None, None));

        Self {
            company_id,
            user_id: UserId::new(),
            location_id,
            item_posting_group_id,
            customer,
            state,
        }
    }

    /// Inventory item with a standard unit cost
    pub fn inventory_item(&mut self, unit_cost: Decimal) -> Item {
        let item = ReferenceFixtures::inventory_item(self.company_id, Some(self.item_posting_group_id));
        self.state.item_costs.insert(item.id, ReferenceFixtures::cost(&item, unit_cost));
        self.state.items.insert(item.id, item.clone());
        item
    }

    /// Inventory item that has no cost record
    pub fn uncosted_item(&mut self) -> Item {
        let item = ReferenceFixtures::inventory_item(self.company_id, Some(self.item_posting_group_id));
        self.state.items.insert(item.id, item.clone());
        item
    }

    pub fn non_inventory_item(&mut self) -> Item {
        let item = ReferenceFixtures::non_inventory_item(self.company_id, Some(self.item_posting_group_id));
        self.state.items.insert(item.id, item.clone());
        item
    }

    /// Sales order with one Part line per quantity
    pub fn sales_order(&mut self, quantities: &[Decimal]) -> OrderFixture {
        let lines: Vec<(LineType, Decimal)> = quantities.iter().map(|q| (LineType::Part, *q)).collect();
        self.sales_order_with_lines(&lines)
    }

    pub fn sales_order_with_lines(&mut self, lines: &[(LineType, Decimal)]) -> OrderFixture {
        let sales_order_id = SalesOrderId::new();
        self.state.sales_orders.insert(
            sales_order_id,
            SalesOrder {
                id: sales_order_id,
                company_id: self.company_id,
                sales_order_number: format!("SO{}", &sales_order_id.as_uuid().simple().to_string()[..6]),
                status: SalesOrderStatus::ToShipAndInvoice,
                updated_at: None,
                updated_by: None,
            },
        );

        let mut line_ids = Vec::new();
        for (line_type, quantity) in lines {
            let line = SalesOrderLine {
                id: SalesOrderLineId::new(),
                sales_order_id,
                company_id: self.company_id,
                sales_order_line_type: *line_type,
                sale_quantity: *quantity,
                quantity_to_invoice: None,
                quantity_invoiced: Decimal::ZERO,
                invoiced_complete: false,
                quantity_sent: Decimal::ZERO,
                sent_complete: false,
                sent_date: None,
            };
            line_ids.push(line.id);
            self.state.sales_order_lines.insert(line.id, line);
        }

        OrderFixture { sales_order_id, line_ids }
    }

    /// Marks an order line as already shipped
    pub fn mark_sent(&mut self, line_id: SalesOrderLineId, quantity: Decimal) {
        if let Some(line) = self.state.sales_order_lines.get_mut(&line_id) {
            line.quantity_sent = quantity;
            line.sent_complete = quantity >= line.sale_quantity;
            line.sent_date = Some(DateFixtures::posting_date());
        }
    }

    /// Marks an order line as already invoiced
    pub fn mark_invoiced(&mut self, line_id: SalesOrderLineId, quantity: Decimal) {
        if let Some(line) = self.state.sales_order_lines.get_mut(&line_id) {
            line.apply_invoiced(quantity);
        }
    }

    pub fn purchase_order_line(&mut self, quantity_shipped: Decimal, job_operation_id: Option<JobOperationId>) -> PurchaseOrderLine {
        let line = PurchaseOrderLine {
            id: PurchaseOrderLineId::new(),
            purchase_order_id: PurchaseOrderId::new(),
            company_id: self.company_id,
            quantity_shipped,
            job_operation_id,
        };
        self.state.purchase_order_lines.insert(line.id, line.clone());
        line
    }

    pub fn job(&mut self, quantity: Decimal, quantity_complete: Decimal, quantity_shipped: Decimal, status: JobStatus) -> JobId {
        let id = JobId::new();
        self.state.jobs.insert(
            id,
            Job {
                id,
                company_id: self.company_id,
                job_number: format!("J{}", &id.as_uuid().simple().to_string()[..6]),
                quantity,
                quantity_complete,
                quantity_shipped,
                status,
            },
        );
        id
    }

    pub fn job_operation(&mut self, job_id: JobId, status: JobOperationStatus) -> JobOperationId {
        let id = JobOperationId::new();
        self.state.job_operations.insert(id, JobOperation { id, job_id, company_id: self.company_id, status });
        id
    }

    /// Transfer with one line per `(quantity, shipped, received)`
    pub fn warehouse_transfer(
        &mut self,
        status: WarehouseTransferStatus,
        lines: &[(Decimal, Decimal, Decimal)],
    ) -> (WarehouseTransferId, Vec<WarehouseTransferLineId>) {
        let transfer_id = WarehouseTransferId::new();
        self.state.warehouse_transfers.insert(
            transfer_id,
            WarehouseTransfer {
                id: transfer_id,
                company_id: self.company_id,
                transfer_number: format!("WT{}", &transfer_id.as_uuid().simple().to_string()[..6]),
                status,
            },
        );

        let mut line_ids = Vec::new();
        for (quantity, shipped_quantity, received_quantity) in lines {
            let line = WarehouseTransferLine {
                id: WarehouseTransferLineId::new(),
                transfer_id,
                company_id: self.company_id,
                quantity: *quantity,
                shipped_quantity: *shipped_quantity,
                received_quantity: *received_quantity,
            };
            line_ids.push(line.id);
            self.state.warehouse_transfer_lines.insert(line.id, line);
        }
        (transfer_id, line_ids)
    }

    /// Serial or batch tracked entity consumed by an earlier shipment
    pub fn consumed_entity(&mut self, item: &Item) -> TrackedEntityId {
        let id = TrackedEntityId::new();
        self.state.tracked_entities.insert(
            id,
            TrackedEntity {
                id,
                company_id: self.company_id,
                item_id: item.id,
                status: TrackedEntityStatus::Consumed,
                quantity: Decimal::ZERO,
            },
        );
        id
    }

    /// Batch with `remaining` left after an earlier partial shipment
    pub fn partly_shipped_batch(&mut self, item: &Item, remaining: Decimal) -> TrackedEntityId {
        let id = TrackedEntityId::new();
        self.state.tracked_entities.insert(
            id,
            TrackedEntity {
                id,
                company_id: self.company_id,
                item_id: item.id,
                status: TrackedEntityStatus::Available,
                quantity: remaining,
            },
        );
        id
    }

    /// Draft invoice builder for this scenario's customer and location
    pub fn invoice(&self) -> SalesInvoiceBuilder {
        SalesInvoiceBuilder::new(self.company_id, &self.customer, Some(self.location_id))
    }

    pub fn add_invoice(&mut self, builder: SalesInvoiceBuilder) -> SalesInvoiceId {
        let (invoice, lines) = builder.build();
        let id = invoice.id;
        self.state.sales_invoices.insert(id, invoice);
        self.state.sales_invoice_lines.extend(lines);
        id
    }

    /// Shipment already posted against `source`, with its ledger entries
    ///
    /// Each line writes a negative item ledger entry. Lines with a cost also
    /// write a COGS/Inventory journal pair under one journal.
    pub fn posted_shipment(&mut self, source: ShipmentSource, lines: Vec<ShipmentLineSpec>) -> ShipmentId {
        self.shipment(source, ShipmentStatus::Posted, lines)
    }

    pub fn shipment(&mut self, source: ShipmentSource, status: ShipmentStatus, lines: Vec<ShipmentLineSpec>) -> ShipmentId {
        let shipment_id = ShipmentId::new();
        let shipment_number = format!("SHP{}", &shipment_id.as_uuid().simple().to_string()[..6]);
        let document_type = match source {
            ShipmentSource::OutboundTransfer(_) => DocumentType::TransferShipment,
            _ => DocumentType::SalesShipment,
        };
        let posting_date = DateFixtures::posting_date();

        let journal_id = JournalId::new();
        let journal = JournalSource {
            journal_id,
            company_id: self.company_id,
            document_type,
            document_id: *shipment_id.as_uuid(),
            external_document_id: Some(shipment_number.clone()),
        };

        for spec in lines {
            let line = ShipmentLine {
                id: ShipmentLineId::new(),
                shipment_id,
                item_id: spec.item.id,
                line_id: spec.line_id,
                order_quantity: spec.quantity,
                shipped_quantity: spec.quantity,
                location_id: Some(self.location_id),
                shelf_id: None,
                job_id: spec.job_id,
                requires_serial_tracking: spec.tracked_entity_id.is_some(),
                requires_batch_tracking: false,
            };

            if status == ShipmentStatus::Posted {
                self.state.item_ledger_entries.push(ItemLedgerEntry {
                    id: ItemLedgerId::new(),
                    company_id: self.company_id,
                    posting_date,
                    item_id: spec.item.id,
                    quantity: -spec.quantity,
                    entry_type: if document_type == DocumentType::TransferShipment {
                        ItemLedgerEntryType::Transfer
                    } else {
                        ItemLedgerEntryType::NegativeAdjmt
                    },
                    document_type,
                    document_id: *shipment_id.as_uuid(),
                    document_line_id: Some(*line.id.as_uuid()),
                    external_document_id: Some(shipment_number.clone()),
                    tracked_entity_id: spec.tracked_entity_id,
                    location_id: line.location_id,
                    shelf_id: None,
                    created_by: self.user_id,
                });

                if let Some(cost) = spec.cost {
                    self.state.journal_lines.extend(journal.pair(
                        PairLeg { account_number: AccountFixtures::COST_OF_GOODS_SOLD, description: "Cost of Goods Sold".to_string() },
                        PairLeg { account_number: AccountFixtures::INVENTORY, description: "Inventory Account".to_string() },
                        cost,
                        spec.quantity,
                        &document_line_reference(document_type, *line.id.as_uuid()),
                    ));
                }
            }

            self.state.shipment_lines.push(line);
        }

        if self.state.journal_lines.iter().any(|line| line.journal_id == journal_id) {
            let accounting_period_id = *self
                .state
                .accounting_periods
                .entry((self.company_id, posting_date.year(), posting_date.month()))
                .or_insert_with(AccountingPeriodId::new);
            self.state.journals.push(Journal {
                id: journal_id,
                company_id: self.company_id,
                accounting_period_id,
                description: format!("Shipment {shipment_number}"),
                posting_date,
                created_by: self.user_id,
            });
        }

        self.state.shipments.insert(
            shipment_id,
            Shipment {
                id: shipment_id,
                company_id: self.company_id,
                shipment_number,
                status,
                source_document: source.kind(),
                source_document_id: Some(source.id()),
                location_id: Some(self.location_id),
                posting_date: Some(posting_date),
                invoiced: false,
                voided_date: None,
                voided_by: None,
                created_by: self.user_id,
            },
        );
        shipment_id
    }

    /// The state a store is seeded with
    pub fn state(&self) -> &StoreState {
        &self.state
    }

    /// Direct access to the state before seeding
    pub fn state_mut(&mut self) -> &mut StoreState {
        &mut self.state
    }

    /// In-memory store seeded with this scenario
    pub fn store(&self) -> InMemoryPostingStore {
        InMemoryPostingStore::with_initial_state(self.state.clone())
    }

    /// Engine over a freshly seeded store, plus a handle on that store
    pub fn engine(&self) -> (PostingEngine<InMemoryPostingStore>, InMemoryPostingStore) {
        let store = self.store();
        (PostingEngine::new(Arc::new(store.clone())), store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_invoice_builder_defaults() {
        let scenario = PostingScenario::new();
        let (invoice, lines) = scenario
            .invoice()
            .line(InvoiceLineBuilder::service(dec!(1), dec!(50)))
            .build();

        assert_eq!(invoice.status, SalesInvoiceStatus::Draft);
        assert_eq!(invoice.exchange_rate, Decimal::ONE);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].invoice_id, invoice.id);
        assert_eq!(lines[0].invoice_line_type, LineType::Service);
    }

    #[test]
    fn test_posted_shipment_writes_ledger() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let order = scenario.sales_order(&[dec!(2)]);
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(2)).for_line(order.line_ids[0]).with_cost(dec!(8))],
        );

        let state = scenario.state_mut();
        let entries = state.item_ledger_entries_for(DocumentType::SalesShipment, *shipment_id.as_uuid());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].quantity, dec!(-2));
        assert_eq!(state.journal_lines.len(), 2);
        assert_eq!(state.journals.len(), 1);
    }
}
