//! Rollover digest notifications.
//!
//! Delivery (push, chat bots) lives outside this crate. The engine only
//! hands a [`RolloverDigest`] to a [`DigestNotifier`] after each user's
//! rollover, and a failed send never fails the rollover.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::EngineResult;

/// Summary of what rollover did for one user on one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RolloverDigest {
    pub user_id: String,
    pub date: Option<NaiveDate>,
    pub moved_to_overdue: usize,
    pub recurring_completed: usize,
    pub recurring_missed: usize,
    pub generated: usize,
}

impl RolloverDigest {
    pub fn is_empty(&self) -> bool {
        self.moved_to_overdue == 0
            && self.recurring_completed == 0
            && self.recurring_missed == 0
            && self.generated == 0
    }
}

#[async_trait]
pub trait DigestNotifier: Send + Sync {
    async fn notify(&self, digest: &RolloverDigest) -> EngineResult<()>;
}

/// Writes digests to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl DigestNotifier for LogNotifier {
    async fn notify(&self, digest: &RolloverDigest) -> EngineResult<()> {
        if digest.is_empty() {
            return Ok(());
        }
        info!(
            user_id = %digest.user_id,
            date = ?digest.date,
            overdue = digest.moved_to_overdue,
            recurring_completed = digest.recurring_completed,
            recurring_missed = digest.recurring_missed,
            generated = digest.generated,
            "Rollover digest"
        );
        Ok(())
    }
}
