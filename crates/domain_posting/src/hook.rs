//! Post-commit notifications
//!
//! Hooks run after a posting or void has committed. They carry downstream,
//! non-critical work (accounting sync, messaging) and can never roll back or
//! fail the run that triggered them.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use core_kernel::{CompanyId, JournalId, UserId};

/// What was committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingEventKind {
    SalesInvoicePosted,
    SalesInvoiceVoided,
    ShipmentVoided,
}

/// A committed posting or void
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingEvent {
    pub kind: PostingEventKind,
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub document_id: Uuid,
    pub journal_id: Option<JournalId>,
}

/// Failure reported by a hook
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// Receives committed postings
#[async_trait]
pub trait PostingHook: Send + Sync {
    /// Name used when logging the hook's failures
    fn name(&self) -> &str;

    async fn after_commit(&self, event: &PostingEvent) -> Result<(), HookError>;
}
