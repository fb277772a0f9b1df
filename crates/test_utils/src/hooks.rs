//! Test Hooks
//!
//! Post-commit hooks that record or reject events, for checking that the
//! engine notifies after commit and never lets a hook failure leak out.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use domain_posting::{HookError, PostingEvent, PostingHook};

/// Records every event it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingHook {
    events: Arc<Mutex<Vec<PostingEvent>>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<PostingEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl PostingHook for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    async fn after_commit(&self, event: &PostingEvent) -> Result<(), HookError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Fails on every event
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingHook;

#[async_trait]
impl PostingHook for FailingHook {
    fn name(&self) -> &str {
        "failing"
    }

    async fn after_commit(&self, _event: &PostingEvent) -> Result<(), HookError> {
        Err(HookError("downstream unavailable".to_string()))
    }
}
