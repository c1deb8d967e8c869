use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::admin::AdminService;
use crate::app::advice::AdviceService;
use crate::app::lifecycle::{FlagKind, ModerationDecision};
use crate::app::sequence::RequestSequence;
use crate::domain::advice::{AdviceItem, AdviceStatus};
use crate::domain::moderation::{
    ActivityDomain, ActivityEntry, AuditEntry, GroupJoinRequest, JoinDecision,
};
use crate::http::ApiError;
use crate::infra::notify::Notifier;

/// Statuses the queue can be filtered by. Approved advice is the public
/// feed, not a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QueueFilter {
    #[default]
    Pending,
    Hold,
    Removed,
}

impl QueueFilter {
    pub fn status(&self) -> AdviceStatus {
        match self {
            Self::Pending => AdviceStatus::Pending,
            Self::Hold => AdviceStatus::Hold,
            Self::Removed => AdviceStatus::Removed,
        }
    }

    pub fn from_status(status: AdviceStatus) -> Option<Self> {
        match status {
            AdviceStatus::Pending => Some(Self::Pending),
            AdviceStatus::Hold => Some(Self::Hold),
            AdviceStatus::Removed => Some(Self::Removed),
            AdviceStatus::Approved => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Collection {
    Queue,
    JoinRequests,
    Activity,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    pub filter: QueueFilter,
    pub items: Vec<AdviceItem>,
    pub join_requests: Vec<GroupJoinRequest>,
    pub activity: Vec<ActivityEntry>,
}

/// Tags both audit streams with their origin and orders them newest first.
pub fn merge_activity(advice: Vec<AuditEntry>, group: Vec<AuditEntry>) -> Vec<ActivityEntry> {
    let mut merged: Vec<ActivityEntry> = advice
        .into_iter()
        .map(|entry| ActivityEntry {
            domain: ActivityDomain::Advice,
            entry,
        })
        .chain(group.into_iter().map(|entry| ActivityEntry {
            domain: ActivityDomain::Group,
            entry,
        }))
        .collect();
    merged.sort_by(|a, b| b.entry.created_at.cmp(&a.entry.created_at));
    merged
}

/// Moderator working set. Local collections are only ever replaced by a
/// fresh load; every action is followed by a reload whatever its outcome.
pub struct ModerationQueue {
    advice: AdviceService,
    admin: AdminService,
    notifier: Arc<dyn Notifier>,
    state: RwLock<QueueSnapshot>,
    sequence: RequestSequence<Collection>,
}

impl ModerationQueue {
    pub fn new(advice: AdviceService, admin: AdminService, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            advice,
            admin,
            notifier,
            state: RwLock::new(QueueSnapshot::default()),
            sequence: RequestSequence::new(),
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.read().clone()
    }

    pub fn filter(&self) -> QueueFilter {
        self.read().filter
    }

    pub fn items(&self) -> Vec<AdviceItem> {
        self.read().items.clone()
    }

    pub fn join_requests(&self) -> Vec<GroupJoinRequest> {
        self.read().join_requests.clone()
    }

    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.read().activity.clone()
    }

    /// Loads all three collections in parallel. Each is applied on its own;
    /// a failing one keeps its previous contents and the first failure is
    /// returned once every load has finished.
    pub async fn load(&self) -> Result<(), ApiError> {
        let (queue, requests, activity) = tokio::join!(
            self.reload_queue(),
            self.reload_join_requests(),
            self.reload_activity()
        );

        let mut first_failure = None;
        for (collection, outcome) in [
            ("queue", queue),
            ("join requests", requests),
            ("activity", activity),
        ] {
            if let Err(err) = outcome {
                warn!(collection, error = %err, "moderation collection failed to load");
                first_failure.get_or_insert(err);
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    /// Changes the filter and reloads the queue for it straight away.
    pub async fn set_filter(&self, filter: QueueFilter) -> Result<(), ApiError> {
        {
            let mut state = self.write();
            if state.filter != filter {
                state.filter = filter;
                state.items.clear();
            }
        }
        self.reload_queue().await
    }

    pub async fn reload_queue(&self) -> Result<(), ApiError> {
        let filter = self.filter();
        let ticket = self.sequence.issue(Collection::Queue);
        let items = self.advice.moderation_queue(filter.status()).await?;

        let mut state = self.write();
        if !self.sequence.is_current(&Collection::Queue, ticket) || state.filter != filter {
            debug!(ticket, filter = ?filter, "stale queue response discarded");
            return Ok(());
        }
        // the server is the authority on status, but never show an item
        // under the wrong filter
        state.items = items
            .into_iter()
            .filter(|item| item.status == filter.status())
            .collect();
        Ok(())
    }

    pub async fn reload_join_requests(&self) -> Result<(), ApiError> {
        let ticket = self.sequence.issue(Collection::JoinRequests);
        let requests = self.admin.join_requests().await?;
        if self.sequence.is_current(&Collection::JoinRequests, ticket) {
            self.write().join_requests = requests;
        } else {
            debug!(ticket, "stale join request response discarded");
        }
        Ok(())
    }

    pub async fn reload_activity(&self) -> Result<(), ApiError> {
        let ticket = self.sequence.issue(Collection::Activity);
        let (advice, group) =
            tokio::try_join!(self.advice.moderation_activity(), self.admin.group_audit())?;
        if self.sequence.is_current(&Collection::Activity, ticket) {
            self.write().activity = merge_activity(advice, group);
        } else {
            debug!(ticket, "stale activity response discarded");
        }
        Ok(())
    }

    pub async fn moderate(
        &self,
        item: &AdviceItem,
        decision: ModerationDecision,
        note: Option<&str>,
    ) -> Result<AdviceItem, ApiError> {
        let outcome = self.advice.moderate(item, decision, note).await;
        self.reload_after_advice_action().await;
        self.report(&outcome, "Moderation decision saved.");
        outcome
    }

    pub async fn toggle_flag(&self, item: &AdviceItem, flag: FlagKind) -> Result<AdviceItem, ApiError> {
        let outcome = self.advice.toggle_flag(item, flag).await;
        self.reload_after_advice_action().await;
        self.report(&outcome, "Flags updated.");
        outcome
    }

    pub async fn decide_join_request(&self, request_id: Uuid, decision: JoinDecision) -> Result<(), ApiError> {
        let outcome = self.admin.decide_join_request(request_id, decision).await;
        let (requests, activity) =
            tokio::join!(self.reload_join_requests(), self.reload_activity());
        log_reload_failure("join requests", requests);
        log_reload_failure("activity", activity);
        self.report(&outcome, "Join request updated.");
        outcome
    }

    async fn reload_after_advice_action(&self) {
        let (queue, activity) = tokio::join!(self.reload_queue(), self.reload_activity());
        log_reload_failure("queue", queue);
        log_reload_failure("activity", activity);
    }

    fn report<T>(&self, outcome: &Result<T, ApiError>, success: &str) {
        match outcome {
            Ok(_) => self.notifier.success(success),
            Err(err) => self.notifier.error(&err.user_message()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, QueueSnapshot> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, QueueSnapshot> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn log_reload_failure(collection: &str, outcome: Result<(), ApiError>) {
    if let Err(err) = outcome {
        warn!(collection, error = %err, "reload after moderation action failed");
    }
}
