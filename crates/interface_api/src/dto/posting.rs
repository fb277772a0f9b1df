//! Posting DTOs
//!
//! Bodies of the `/functions/*` routes. Identifiers arrive as strings, with
//! or without their display prefix, and are parsed into typed ids before the
//! engine is called.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{CompanyId, SalesInvoiceId, ShipmentId, UserId};
use domain_posting::{PostingOutcome, PostingRequest};

use crate::error::ApiError;

/// What the caller asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostingAction {
    Post,
    Void,
}

impl fmt::Display for PostingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostingAction::Post => f.write_str("post"),
            PostingAction::Void => f.write_str("void"),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SalesInvoiceActionRequest {
    #[serde(rename = "type")]
    pub action: PostingAction,
    #[validate(length(min = 1, message = "invoiceId is required"))]
    pub invoice_id: String,
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,
    #[validate(length(min = 1, message = "companyId is required"))]
    pub company_id: String,
}

impl SalesInvoiceActionRequest {
    pub fn posting_request(&self) -> Result<PostingRequest<SalesInvoiceId>, ApiError> {
        Ok(PostingRequest::new(
            parse_id("invoiceId", &self.invoice_id)?,
            parse_id("userId", &self.user_id)?,
            parse_id::<CompanyId>("companyId", &self.company_id)?,
        ))
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentActionRequest {
    #[serde(rename = "type")]
    pub action: PostingAction,
    #[validate(length(min = 1, message = "shipmentId is required"))]
    pub shipment_id: String,
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,
    #[validate(length(min = 1, message = "companyId is required"))]
    pub company_id: String,
}

impl ShipmentActionRequest {
    /// Shipments can only be voided
    pub fn posting_request(&self) -> Result<PostingRequest<ShipmentId>, ApiError> {
        if self.action != PostingAction::Void {
            return Err(ApiError::BadRequest(format!("shipments cannot be {}ed", self.action)));
        }
        Ok(PostingRequest::new(
            parse_id("shipmentId", &self.shipment_id)?,
            parse_id::<UserId>("userId", &self.user_id)?,
            parse_id("companyId", &self.company_id)?,
        ))
    }
}

fn parse_id<T>(field: &str, value: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{field} is not a valid identifier: {e}")))
}

/// Body of a successful run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingResponse {
    pub success: bool,
    pub outcome: PostingOutcome,
}

impl From<PostingOutcome> for PostingResponse {
    fn from(outcome: PostingOutcome) -> Self {
        Self { success: true, outcome }
    }
}

/// Body of every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}
