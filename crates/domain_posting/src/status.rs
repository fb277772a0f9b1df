//! Document status propagation
//!
//! Parent statuses are always re-derived from a full read of the sibling
//! lines, never patched from the line that was touched last.

use crate::order::{SalesOrderLine, SalesOrderStatus, WarehouseTransferLine, WarehouseTransferStatus};

/// Status of a sales order derived from its lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalesOrderProgress {
    pub all_invoiced: bool,
    pub all_shipped: bool,
}

impl SalesOrderProgress {
    /// Classifies all non-comment lines of one order
    pub fn from_lines(lines: &[SalesOrderLine]) -> Self {
        let countable = || lines.iter().filter(|line| !line.is_comment());
        Self {
            all_invoiced: countable().all(|line| line.invoiced_complete),
            all_shipped: countable().all(|line| line.sent_complete),
        }
    }

    pub fn status(&self) -> SalesOrderStatus {
        match (self.all_invoiced, self.all_shipped) {
            (true, true) => SalesOrderStatus::Completed,
            (true, false) => SalesOrderStatus::ToShip,
            (false, true) => SalesOrderStatus::ToInvoice,
            (false, false) => SalesOrderStatus::ToShipAndInvoice,
        }
    }
}

/// Recomputes a sales order's status from all of its lines
pub fn sales_order_status(lines: &[SalesOrderLine]) -> SalesOrderStatus {
    SalesOrderProgress::from_lines(lines).status()
}

/// Recomputes a warehouse transfer's status from all of its lines
pub fn warehouse_transfer_status(lines: &[WarehouseTransferLine]) -> WarehouseTransferStatus {
    let all_shipped = lines.iter().all(WarehouseTransferLine::is_shipped);
    let all_received = lines.iter().all(WarehouseTransferLine::is_received);

    match (all_shipped, all_received) {
        (true, true) => WarehouseTransferStatus::Completed,
        (true, false) => WarehouseTransferStatus::ToReceive,
        _ => WarehouseTransferStatus::ToShipAndReceive,
    }
}
