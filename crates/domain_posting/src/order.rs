//! Orders and production records updated as a side effect of posting
//!
//! Quantity changes are applied to freshly read rows inside the apply
//! transaction. Every rollback clamps at zero.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    floor_at_zero, CompanyId, JobId, JobOperationId, PurchaseOrderId, PurchaseOrderLineId,
    SalesOrderId, SalesOrderLineId, UserId, WarehouseTransferId, WarehouseTransferLineId,
};

use crate::document::LineType;
use crate::labels::labelled_enum;

labelled_enum! {
    /// Aggregate sales order status
    pub enum SalesOrderStatus ("sales order status") {
        Draft => "Draft",
        ToShipAndInvoice => "To Ship and Invoice",
        ToShip => "To Ship",
        ToInvoice => "To Invoice",
        Completed => "Completed",
        Cancelled => "Cancelled",
    }
}

/// A sales order header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrder {
    pub id: SalesOrderId,
    pub company_id: CompanyId,
    pub sales_order_number: String,
    pub status: SalesOrderStatus,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
}

/// A line on a sales order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderLine {
    pub id: SalesOrderLineId,
    pub sales_order_id: SalesOrderId,
    pub company_id: CompanyId,
    pub sales_order_line_type: LineType,
    pub sale_quantity: Decimal,
    /// Overrides `sale_quantity` as the quantity to invoice when set
    pub quantity_to_invoice: Option<Decimal>,
    pub quantity_invoiced: Decimal,
    pub invoiced_complete: bool,
    pub quantity_sent: Decimal,
    pub sent_complete: bool,
    pub sent_date: Option<NaiveDate>,
}

impl SalesOrderLine {
    /// Quantity that has to be invoiced before the line counts as invoiced
    pub fn invoice_target(&self) -> Decimal {
        self.quantity_to_invoice.unwrap_or(self.sale_quantity)
    }

    /// Adds an invoiced quantity and recomputes `invoiced_complete`
    pub fn apply_invoiced(&mut self, delta: Decimal) {
        self.quantity_invoiced = floor_at_zero(self.quantity_invoiced + delta);
        self.invoiced_complete = self.quantity_invoiced >= self.invoice_target();
    }

    /// Rolls back an invoiced quantity
    pub fn reverse_invoiced(&mut self, quantity: Decimal) {
        self.apply_invoiced(-quantity);
    }

    /// Rolls back a sent quantity, clearing the sent date once incomplete
    pub fn reverse_sent(&mut self, quantity: Decimal) {
        self.quantity_sent = floor_at_zero(self.quantity_sent - quantity);
        self.sent_complete = self.quantity_sent >= self.sale_quantity;
        if !self.sent_complete {
            self.sent_date = None;
        }
    }

    /// Comment lines never take part in status decisions
    pub fn is_comment(&self) -> bool {
        self.sales_order_line_type == LineType::Comment
    }
}

/// A line on a purchase order that shipped goods out (outside processing)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderLine {
    pub id: PurchaseOrderLineId,
    pub purchase_order_id: PurchaseOrderId,
    pub company_id: CompanyId,
    pub quantity_shipped: Decimal,
    pub job_operation_id: Option<JobOperationId>,
}

impl PurchaseOrderLine {
    pub fn reverse_shipped(&mut self, quantity: Decimal) {
        self.quantity_shipped = floor_at_zero(self.quantity_shipped - quantity);
    }
}

labelled_enum! {
    /// Aggregate warehouse transfer status
    pub enum WarehouseTransferStatus ("warehouse transfer status") {
        Draft => "Draft",
        ToShipAndReceive => "To Ship and Receive",
        ToReceive => "To Receive",
        Completed => "Completed",
        Cancelled => "Cancelled",
    }
}

/// A warehouse transfer header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseTransfer {
    pub id: WarehouseTransferId,
    pub company_id: CompanyId,
    pub transfer_number: String,
    pub status: WarehouseTransferStatus,
}

/// A line on a warehouse transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseTransferLine {
    pub id: WarehouseTransferLineId,
    pub transfer_id: WarehouseTransferId,
    pub company_id: CompanyId,
    pub quantity: Decimal,
    pub shipped_quantity: Decimal,
    pub received_quantity: Decimal,
}

impl WarehouseTransferLine {
    pub fn is_shipped(&self) -> bool {
        self.shipped_quantity >= self.quantity
    }

    pub fn is_received(&self) -> bool {
        self.received_quantity >= self.quantity
    }

    pub fn reverse_shipped(&mut self, quantity: Decimal) {
        self.shipped_quantity = floor_at_zero(self.shipped_quantity - quantity);
    }
}

labelled_enum! {
    /// Production job status
    pub enum JobStatus ("job status") {
        Draft => "Draft",
        Planned => "Planned",
        Ready => "Ready",
        InProgress => "In Progress",
        Paused => "Paused",
        Completed => "Completed",
        Cancelled => "Cancelled",
    }
}

/// A production job whose output can be shipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub company_id: CompanyId,
    pub job_number: String,
    pub quantity: Decimal,
    pub quantity_complete: Decimal,
    pub quantity_shipped: Decimal,
    pub status: JobStatus,
}

impl Job {
    /// Rolls back a shipped quantity
    ///
    /// Shipping consumed completed units, so both counters drop. A completed
    /// job that no longer covers its quantity goes back to In Progress.
    pub fn reverse_shipment(&mut self, quantity: Decimal) {
        self.quantity_shipped = floor_at_zero(self.quantity_shipped - quantity);
        self.quantity_complete = floor_at_zero(self.quantity_complete - quantity);
        if self.status == JobStatus::Completed && self.quantity_shipped < self.quantity {
            self.status = JobStatus::InProgress;
        }
    }
}

labelled_enum! {
    /// Status of a single job operation
    pub enum JobOperationStatus ("job operation status") {
        Planned => "Planned",
        Ready => "Ready",
        InProgress => "In Progress",
        Waiting => "Waiting",
        Done => "Done",
        Canceled => "Canceled",
    }
}

/// One routing step of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOperation {
    pub id: JobOperationId,
    pub job_id: JobId,
    pub company_id: CompanyId,
    pub status: JobOperationStatus,
}
