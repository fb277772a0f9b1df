//! Request and response bodies

pub mod posting;

pub use posting::{ErrorBody, ErrorResponse, PostingAction, PostingResponse, SalesInvoiceActionRequest, ShipmentActionRequest};
