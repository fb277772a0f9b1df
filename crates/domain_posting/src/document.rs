//! Business documents that get posted and voided
//!
//! A sales invoice is posted into journal lines (and, for lines shipped
//! straight off the invoice, a generated shipment with inventory movements).
//! A shipment is posted elsewhere and only ever voided by this crate.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{
    CompanyId, CustomerId, ItemId, JobId, LocationId, PurchaseOrderId, SalesInvoiceId,
    SalesInvoiceLineId, SalesOrderId, SalesOrderLineId, ShelfId, ShipmentId, ShipmentLineId,
    UserId, WarehouseTransferId,
};

use crate::error::PostingError;
use crate::labels::labelled_enum;

labelled_enum! {
    /// Sales invoice lifecycle
    pub enum SalesInvoiceStatus ("sales invoice status") {
        Draft => "Draft",
        Pending => "Pending",
        Submitted => "Submitted",
        PartiallyPaid => "Partially Paid",
        Paid => "Paid",
        Overdue => "Overdue",
        Voided => "Voided",
    }
}

impl SalesInvoiceStatus {
    /// Returns true if the invoice has ledger effects that a void must reverse
    pub fn is_posted(&self) -> bool {
        matches!(
            self,
            SalesInvoiceStatus::Submitted
                | SalesInvoiceStatus::PartiallyPaid
                | SalesInvoiceStatus::Paid
                | SalesInvoiceStatus::Overdue
        )
    }

    /// Returns true if the invoice has not been posted yet
    pub fn can_post(&self) -> bool {
        matches!(self, SalesInvoiceStatus::Draft | SalesInvoiceStatus::Pending)
    }
}

labelled_enum! {
    /// Kind of a sales invoice or sales order line
    pub enum LineType ("invoice line type") {
        Part => "Part",
        Material => "Material",
        Tool => "Tool",
        Consumable => "Consumable",
        Fixture => "Fixture",
        Service => "Service",
        Comment => "Comment",
    }
}

impl LineType {
    /// Lines that move an item and may carry inventory effects
    pub fn is_item_line(&self) -> bool {
        !matches!(self, LineType::Service | LineType::Comment)
    }
}

labelled_enum! {
    /// How the item on a line is sourced
    pub enum MethodType ("method type") {
        Buy => "Buy",
        Make => "Make",
        Pick => "Pick",
    }
}

labelled_enum! {
    /// Shipment lifecycle
    pub enum ShipmentStatus ("shipment status") {
        Draft => "Draft",
        Pending => "Pending",
        Posted => "Posted",
        Voided => "Voided",
    }
}

labelled_enum! {
    /// Kind of document a shipment fulfils
    pub enum ShipmentSourceKind ("shipment source document") {
        SalesOrder => "Sales Order",
        PurchaseOrder => "Purchase Order",
        OutboundTransfer => "Outbound Transfer",
        SalesInvoice => "Sales Invoice",
    }
}

/// The document a shipment fulfils, with its typed identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipmentSource {
    SalesOrder(SalesOrderId),
    PurchaseOrder(PurchaseOrderId),
    OutboundTransfer(WarehouseTransferId),
    SalesInvoice(SalesInvoiceId),
}

impl ShipmentSource {
    /// Resolves a stored kind and raw id into a typed source
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the shipment has no source document id
    pub fn resolve(kind: ShipmentSourceKind, id: Option<Uuid>) -> Result<Self, PostingError> {
        let id = id.ok_or_else(|| {
            PostingError::invalid_state(format!("{kind} shipment has no source document id"))
        })?;

        Ok(match kind {
            ShipmentSourceKind::SalesOrder => ShipmentSource::SalesOrder(id.into()),
            ShipmentSourceKind::PurchaseOrder => ShipmentSource::PurchaseOrder(id.into()),
            ShipmentSourceKind::OutboundTransfer => ShipmentSource::OutboundTransfer(id.into()),
            ShipmentSourceKind::SalesInvoice => ShipmentSource::SalesInvoice(id.into()),
        })
    }

    /// The stored kind of this source
    pub fn kind(&self) -> ShipmentSourceKind {
        match self {
            ShipmentSource::SalesOrder(_) => ShipmentSourceKind::SalesOrder,
            ShipmentSource::PurchaseOrder(_) => ShipmentSourceKind::PurchaseOrder,
            ShipmentSource::OutboundTransfer(_) => ShipmentSourceKind::OutboundTransfer,
            ShipmentSource::SalesInvoice(_) => ShipmentSourceKind::SalesInvoice,
        }
    }

    /// The raw source document id
    pub fn id(&self) -> Uuid {
        match self {
            ShipmentSource::SalesOrder(id) => *id.as_uuid(),
            ShipmentSource::PurchaseOrder(id) => *id.as_uuid(),
            ShipmentSource::OutboundTransfer(id) => *id.as_uuid(),
            ShipmentSource::SalesInvoice(id) => *id.as_uuid(),
        }
    }
}

/// A sales invoice header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesInvoice {
    pub id: SalesInvoiceId,
    pub company_id: CompanyId,
    /// Human-readable invoice number
    pub invoice_number: String,
    pub customer_id: CustomerId,
    pub location_id: Option<LocationId>,
    /// Defaults to the posting day when missing
    pub posting_date: Option<NaiveDate>,
    pub status: SalesInvoiceStatus,
    /// Invoice-level shipping, allocated across lines by cost share
    pub shipping_cost: Decimal,
    /// Multiplier converting document currency to base currency
    pub exchange_rate: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
}

impl SalesInvoice {
    /// Invoice shipping converted to base currency
    pub fn base_shipping_cost(&self) -> Decimal {
        self.shipping_cost * self.exchange_rate
    }
}

/// A line on a sales invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesInvoiceLine {
    pub id: SalesInvoiceLineId,
    pub invoice_id: SalesInvoiceId,
    pub invoice_line_type: LineType,
    pub item_id: Option<ItemId>,
    pub description: Option<String>,
    /// Quantity in sales units
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub shipping_cost: Decimal,
    pub add_on_cost: Decimal,
    /// Fractional tax rate (0.2 for 20%)
    pub tax_percent: Decimal,
    /// Inventory units per sales unit
    pub conversion_factor: Decimal,
    pub method_type: MethodType,
    pub sales_order_id: Option<SalesOrderId>,
    pub sales_order_line_id: Option<SalesOrderLineId>,
    pub location_id: Option<LocationId>,
    pub shelf_id: Option<ShelfId>,
    pub requires_serial_tracking: bool,
    pub requires_batch_tracking: bool,
}

impl SalesInvoiceLine {
    /// Quantity expressed in inventory units
    pub fn inventory_quantity(&self) -> Decimal {
        self.quantity * self.conversion_factor
    }

    /// Line cost before tax, converted to base currency
    pub fn subtotal(&self, exchange_rate: Decimal) -> Decimal {
        (self.quantity * self.unit_price + self.shipping_cost + self.add_on_cost) * exchange_rate
    }

    /// Line cost including tax, converted to base currency
    pub fn total_line_cost(&self, exchange_rate: Decimal) -> Decimal {
        self.subtotal(exchange_rate) * (Decimal::ONE + self.tax_percent)
    }

    /// Returns true if the line ships straight off the invoice
    ///
    /// Lines not linked to a sales order line and not made to order have no
    /// earlier shipment, so posting the invoice also ships them.
    pub fn ships_on_invoice(&self) -> bool {
        self.sales_order_line_id.is_none() && self.method_type != MethodType::Make
    }
}

/// A shipment header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: ShipmentId,
    pub company_id: CompanyId,
    /// Human-readable shipment number
    pub shipment_number: String,
    pub status: ShipmentStatus,
    pub source_document: ShipmentSourceKind,
    pub source_document_id: Option<Uuid>,
    pub location_id: Option<LocationId>,
    pub posting_date: Option<NaiveDate>,
    pub invoiced: bool,
    pub voided_date: Option<DateTime<Utc>>,
    pub voided_by: Option<UserId>,
    pub created_by: UserId,
}

impl Shipment {
    /// Typed source document
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the source document id is missing
    pub fn source(&self) -> Result<ShipmentSource, PostingError> {
        ShipmentSource::resolve(self.source_document, self.source_document_id)
    }
}

/// A line on a shipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentLine {
    pub id: ShipmentLineId,
    pub shipment_id: ShipmentId,
    pub item_id: ItemId,
    /// Line on the source document this line fulfils
    pub line_id: Option<Uuid>,
    pub order_quantity: Decimal,
    pub shipped_quantity: Decimal,
    pub location_id: Option<LocationId>,
    pub shelf_id: Option<ShelfId>,
    /// Job the shipped quantity was produced by
    pub job_id: Option<JobId>,
    pub requires_serial_tracking: bool,
    pub requires_batch_tracking: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line() -> SalesInvoiceLine {
        SalesInvoiceLine {
            id: SalesInvoiceLineId::new(),
            invoice_id: SalesInvoiceId::new(),
            invoice_line_type: LineType::Part,
            item_id: Some(ItemId::new()),
            description: None,
            quantity: dec!(4),
            unit_price: dec!(25),
            shipping_cost: dec!(5),
            add_on_cost: dec!(3),
            tax_percent: dec!(0.1),
            conversion_factor: dec!(2),
            method_type: MethodType::Pick,
            sales_order_id: None,
            sales_order_line_id: None,
            location_id: None,
            shelf_id: None,
            requires_serial_tracking: false,
            requires_batch_tracking: false,
        }
    }

    #[test]
    fn test_status_labels_round_trip() {
        for status in SalesInvoiceStatus::ALL {
            assert_eq!(status.as_str().parse::<SalesInvoiceStatus>().unwrap(), *status);
        }
        assert_eq!(SalesInvoiceStatus::PartiallyPaid.to_string(), "Partially Paid");
    }

    #[test]
    fn test_unknown_line_type_is_unsupported() {
        let err = "Fixed Asset".parse::<LineType>().unwrap_err();
        assert!(matches!(err, PostingError::UnsupportedType { .. }));
    }

    #[test]
    fn test_invoice_status_guards() {
        assert!(SalesInvoiceStatus::Draft.can_post());
        assert!(SalesInvoiceStatus::Pending.can_post());
        assert!(!SalesInvoiceStatus::Submitted.can_post());
        assert!(SalesInvoiceStatus::Overdue.is_posted());
        assert!(!SalesInvoiceStatus::Voided.is_posted());
        assert!(!SalesInvoiceStatus::Draft.is_posted());
    }

    #[test]
    fn test_line_costs() {
        let line = line();
        assert_eq!(line.subtotal(dec!(1)), dec!(108));
        assert_eq!(line.total_line_cost(dec!(1)), dec!(118.8));
        assert_eq!(line.subtotal(dec!(2)), dec!(216));
        assert_eq!(line.inventory_quantity(), dec!(8));
    }

    #[test]
    fn test_ships_on_invoice() {
        let mut line = line();
        assert!(line.ships_on_invoice());

        line.method_type = MethodType::Make;
        assert!(!line.ships_on_invoice());

        line.method_type = MethodType::Buy;
        line.sales_order_line_id = Some(SalesOrderLineId::new());
        assert!(!line.ships_on_invoice());
    }

    #[test]
    fn test_shipment_source_requires_id() {
        let err = ShipmentSource::resolve(ShipmentSourceKind::SalesOrder, None).unwrap_err();
        assert!(matches!(err, PostingError::InvalidState(_)));

        let id = Uuid::new_v4();
        let source = ShipmentSource::resolve(ShipmentSourceKind::OutboundTransfer, Some(id)).unwrap();
        assert_eq!(source, ShipmentSource::OutboundTransfer(WarehouseTransferId::from_uuid(id)));
        assert_eq!(source.kind(), ShipmentSourceKind::OutboundTransfer);
        assert_eq!(source.id(), id);
    }
}
