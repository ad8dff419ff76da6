//! Single-backlink check orchestration.
//!
//! One run is: load, check, decide, persist (check row, backlink update and
//! alert row in one transaction), then notify. Runs for different backlinks are
//! independent; callers must not run two checks of the same backlink at once.

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use super::alerts::{AlertDispatcher, DispatchReport};
use super::transition::{check_record, Transition};
use crate::checker::{BacklinkChecker, CheckResult};
use crate::models::{Backlink, BacklinkStatus, NotificationProfile};
use crate::repository::{BacklinkRepository, DbContext, DbError, UserRepository};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Backlink {0} not found")]
    BacklinkNotFound(i32),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

/// Result of one monitor run.
#[derive(Debug, Clone)]
pub struct MonitorOutcome {
    pub backlink: Backlink,
    pub check_id: i32,
    pub previous_status: BacklinkStatus,
    pub result: CheckResult,
    pub alert: Option<DispatchReport>,
}

impl MonitorOutcome {
    pub fn status(&self) -> BacklinkStatus {
        self.backlink.status
    }

    pub fn status_changed(&self) -> bool {
        self.previous_status != self.backlink.status
    }
}

/// Checks backlinks and drives their status.
#[derive(Clone)]
pub struct BacklinkMonitor {
    backlinks: BacklinkRepository,
    users: UserRepository,
    checker: BacklinkChecker,
    dispatcher: AlertDispatcher,
}

impl BacklinkMonitor {
    pub fn new(ctx: &DbContext, checker: BacklinkChecker, dispatcher: AlertDispatcher) -> Self {
        Self {
            backlinks: ctx.backlinks(),
            users: ctx.users(),
            checker,
            dispatcher,
        }
    }

    pub fn checker(&self) -> &BacklinkChecker {
        &self.checker
    }

    /// Check one backlink and apply the outcome.
    ///
    /// The owner's timeout applies; ownerless backlinks use the checker's.
    pub async fn run(&self, backlink_id: i32) -> Result<MonitorOutcome, MonitorError> {
        self.run_inner(backlink_id, None).await
    }

    /// Like `run`, overriding the owner's timeout.
    pub async fn run_with_timeout(
        &self,
        backlink_id: i32,
        timeout: Duration,
    ) -> Result<MonitorOutcome, MonitorError> {
        self.run_inner(backlink_id, Some(timeout)).await
    }

    async fn run_inner(
        &self,
        backlink_id: i32,
        timeout: Option<Duration>,
    ) -> Result<MonitorOutcome, MonitorError> {
        let stored = self
            .backlinks
            .get(backlink_id)
            .await?
            .ok_or(MonitorError::BacklinkNotFound(backlink_id))?;

        let owner = match stored.created_by {
            Some(user_id) => self.users.get(user_id).await?,
            None => None,
        };
        let timeout = timeout
            .or_else(|| owner.as_ref().map(|u| u.fetch_timeout()))
            .unwrap_or(self.checker.settings().timeout);
        let profile = owner.as_ref().map(|u| u.notification_profile());

        let result = self.checker.check_with_timeout(&stored, timeout).await;
        self.apply(stored, result, profile.as_ref()).await
    }

    async fn apply(
        &self,
        stored: Backlink,
        result: CheckResult,
        owner: Option<&NotificationProfile>,
    ) -> Result<MonitorOutcome, MonitorError> {
        let now = Utc::now();
        let transition = Transition::decide(&stored, &result);
        debug!(
            "Backlink {}: {} -> {} ({})",
            stored.id,
            transition.previous,
            transition.next,
            result.outcome.as_str()
        );

        let recorded = self
            .backlinks
            .record_check(
                stored.id,
                check_record(stored.id, &result, now),
                transition.changeset(&stored, &result, now),
                transition.alert_draft(&stored, &result),
            )
            .await?;
        let updated = transition.apply(&stored, &result, now);

        if transition.is_status_change() {
            info!(
                "Backlink {} ({}) is now {}",
                stored.id, stored.source_url, transition.next
            );
        }

        let alert = match recorded.alert {
            Some(alert) => Some(self.dispatcher.notify(&updated, owner, alert).await),
            None => None,
        };

        Ok(MonitorOutcome {
            backlink: updated,
            check_id: recorded.check_id,
            previous_status: transition.previous,
            result,
            alert,
        })
    }
}
