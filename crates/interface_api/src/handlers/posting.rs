//! Posting handlers

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use tracing::instrument;
use validator::Validate;

use domain_posting::DocumentPosting;

use crate::dto::{PostingAction, PostingResponse, SalesInvoiceActionRequest, ShipmentActionRequest};
use crate::{error::ApiError, AppState};

/// Posts or voids a sales invoice, depending on the body's `type`
#[instrument(skip_all)]
pub async fn sales_invoice(
    State(state): State<AppState>,
    payload: Result<Json<SalesInvoiceActionRequest>, JsonRejection>,
) -> Result<Json<PostingResponse>, ApiError> {
    let Json(body) = payload?;
    body.validate()?;
    let request = body.posting_request()?;

    let outcome = match body.action {
        PostingAction::Post => state.engine.post_sales_invoice(request).await?,
        PostingAction::Void => state.engine.void_sales_invoice(request).await?,
    };
    Ok(Json(outcome.into()))
}

/// Voids a shipment
#[instrument(skip_all)]
pub async fn shipment(
    State(state): State<AppState>,
    payload: Result<Json<ShipmentActionRequest>, JsonRejection>,
) -> Result<Json<PostingResponse>, ApiError> {
    let Json(body) = payload?;
    body.validate()?;
    let request = body.posting_request()?;

    let outcome = state.engine.void_shipment(request).await?;
    Ok(Json(outcome.into()))
}
