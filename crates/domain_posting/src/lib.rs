//! Posting Domain
//!
//! This crate turns sales documents into ledger effects and takes them back:
//!
//! - **Post sales invoice**: journal lines, item ledger entries, an optional
//!   shipment generated from the invoice and invoiced quantities on sales orders
//! - **Void sales invoice**: reverses the invoice journal and every shipment it
//!   generated, then rolls invoiced quantities back
//! - **Void shipment**: reverses a posted shipment and gives its quantities back
//!   to the sales order, purchase order or warehouse transfer it fulfilled
//!
//! # Ledger Convention
//!
//! Journal line amounts are signed: debits are positive and credits negative.
//! Every journal line reference groups exactly one debit and one credit, and
//! the pair always nets to zero. A void writes the same pairs negated under a
//! new journal, so an account's total over a document and its void is zero.
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use domain_posting::{PostingEngine, PostingRequest};
//! use domain_posting::ports::mock::InMemoryPostingStore;
//!
//! let engine = PostingEngine::new(Arc::new(InMemoryPostingStore::new()));
//! let outcome = engine
//!     .post_sales_invoice(PostingRequest::new(invoice_id, user_id, company_id))
//!     .await?;
//! assert!(outcome.journal_id.is_some());
//! ```

mod labels;

pub mod document;
pub mod order;
pub mod inventory;
pub mod journal;
pub mod posting_group;
pub mod builder;
pub mod status;
pub mod reversal;
pub mod error;
pub mod ports;
pub mod hook;
pub mod engine;

pub use document::{
    LineType, MethodType, SalesInvoice, SalesInvoiceLine, SalesInvoiceStatus, Shipment,
    ShipmentLine, ShipmentSource, ShipmentSourceKind, ShipmentStatus,
};
pub use order::{
    Job, JobOperation, JobOperationStatus, JobStatus, PurchaseOrderLine, SalesOrder,
    SalesOrderLine, SalesOrderStatus, WarehouseTransfer, WarehouseTransferLine,
    WarehouseTransferStatus,
};
pub use inventory::{
    Customer, Item, ItemCost, ItemLedgerEntry, ItemLedgerEntryType, ItemTrackingType,
    TrackedActivity, TrackedActivityInput, TrackedEntity, TrackedEntityRestore,
    TrackedEntityStatus,
};
pub use journal::{DocumentType, Journal, JournalLine};
pub use posting_group::{
    InventoryGroupKey, InventoryPostingGroup, PostingGroups, SalesGroupKey, SalesPostingGroup,
};
pub use builder::{build_invoice_posting, InvoicePostingPlan};
pub use status::{sales_order_status, warehouse_transfer_status, SalesOrderProgress};
pub use reversal::{LedgerReversal, TrackedActivityRecord};
pub use error::PostingError;
pub use ports::{LedgerTransaction, PostingStore};
pub use hook::{HookError, PostingEvent, PostingEventKind, PostingHook};
pub use engine::{DocumentPosting, PostingEngine, PostingOutcome, PostingRequest, RunPhase};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::{FailurePoint, InMemoryPostingStore, StoreState};
