use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::lifecycle::{self, FlagKind, ModerationDecision};
use crate::config::limits::{self, Field, MAX_CONTEXT_TAGS};
use crate::config::ClientConfig;
use crate::domain::advice::{
    AdviceItem, AdviceStatus, AdviceThread, BoostReceipt, FlagPatch, IdentityMode,
};
use crate::domain::comment::{Comment, NewComment};
use crate::domain::follow::FollowRelation;
use crate::domain::moderation::AuditEntry;
use crate::domain::user::CurrentUser;
use crate::http::{routes, ApiError, Gateway, RawSubmitter};

/// Feature toggles and boost pricing that shape outgoing payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthoringOptions {
    pub enable_urgent: bool,
    pub enable_smart_matching: bool,
    pub boost_price_cents: i64,
    pub boost_duration_hours: i64,
}

impl AuthoringOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            enable_urgent: config.enable_urgent,
            enable_smart_matching: config.enable_smart_matching,
            boost_price_cents: config.boost_price_cents,
            boost_duration_hours: config.boost_duration_hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdviceDraft {
    pub title: String,
    pub body: String,
    pub category_id: Option<Uuid>,
    pub identity_mode: IdentityMode,
    pub is_urgent: bool,
    pub context_tags: Vec<String>,
}

impl AdviceDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            category_id: None,
            identity_mode: IdentityMode::Anonymous,
            is_urgent: false,
            context_tags: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        limits::check_length(Field::Title, &self.title).map_err(ApiError::Validation)?;
        limits::check_length(Field::Body, &self.body).map_err(ApiError::Validation)?;
        if self.context_tags.len() > MAX_CONTEXT_TAGS {
            return Err(ApiError::validation(format!(
                "at most {} context tags are allowed",
                MAX_CONTEXT_TAGS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewAdvice<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    category_id: Option<Uuid>,
    identity_mode: IdentityMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_urgent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_tags: Option<&'a [String]>,
}

impl<'a> NewAdvice<'a> {
    fn from_draft(draft: &'a AdviceDraft, options: &AuthoringOptions) -> Self {
        Self {
            title: draft.title.trim(),
            body: draft.body.trim(),
            category_id: draft.category_id,
            identity_mode: draft.identity_mode,
            is_urgent: options.enable_urgent.then_some(draft.is_urgent),
            context_tags: options
                .enable_smart_matching
                .then_some(draft.context_tags.as_slice()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModerationRequest<'a> {
    status: AdviceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BoostRequest {
    duration_hours: i64,
    price_cents: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HelpfulResponse {
    helpful_count: i64,
}

#[derive(Clone)]
pub struct AdviceService {
    gateway: Gateway,
    raw: RawSubmitter,
    options: AuthoringOptions,
}

impl AdviceService {
    pub fn new(gateway: Gateway, raw: RawSubmitter, options: AuthoringOptions) -> Self {
        Self {
            gateway,
            raw,
            options,
        }
    }

    pub fn options(&self) -> &AuthoringOptions {
        &self.options
    }

    /// Submits a new advice item for review. If the gateway cannot reach
    /// any address, the same payload goes through the secondary path.
    pub async fn create_advice(&self, draft: &AdviceDraft) -> Result<AdviceItem, ApiError> {
        draft.validate()?;
        let payload = NewAdvice::from_draft(draft, &self.options);

        let created: AdviceItem = match self.gateway.post(routes::ADVICE, &payload).await {
            Err(err) if err.is_connection_failure() => {
                warn!(error = %err, "advice submission unreachable, trying secondary path");
                self.raw.post_json(routes::ADVICE, &payload).await?
            }
            outcome => outcome?,
        };

        if created.status != AdviceStatus::Pending {
            return Err(ApiError::InvalidResponse(format!(
                "new advice came back as {}",
                created.status
            )));
        }

        info!(advice_id = %created.id, "advice submitted for review");
        Ok(created)
    }

    pub async fn list_advice(&self, category: Option<&str>) -> Result<Vec<AdviceItem>, ApiError> {
        self.gateway.get(&routes::advice_list(category)).await
    }

    /// Approved feed in listing order.
    pub async fn ranked_feed(
        &self,
        category: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Vec<AdviceItem>, ApiError> {
        let mut items = self.list_advice(category).await?;
        lifecycle::rank_feed(&mut items, now);
        Ok(items)
    }

    pub async fn get_thread(&self, advice_id: Uuid) -> Result<AdviceThread, ApiError> {
        self.gateway.get(&routes::advice(advice_id)).await
    }

    pub async fn post_comment(
        &self,
        thread: &AdviceThread,
        body: &str,
        parent_id: Option<Uuid>,
    ) -> Result<Comment, ApiError> {
        lifecycle::ensure_open_for_comments(&thread.advice)?;
        limits::check_length(Field::Comment, body).map_err(ApiError::Validation)?;
        if let Some(parent_id) = parent_id {
            if !thread.comments.iter().any(|comment| comment.id == parent_id) {
                return Err(ApiError::validation("the comment you are replying to no longer exists"));
            }
        }

        let request = NewComment {
            body: body.trim().to_string(),
            parent_id,
        };
        let comment: Comment = self
            .gateway
            .post(&routes::advice_comments(thread.advice.id), &request)
            .await?;

        debug!(advice_id = %thread.advice.id, comment_id = %comment.id, "comment posted");
        Ok(comment)
    }

    pub async fn moderation_queue(&self, status: AdviceStatus) -> Result<Vec<AdviceItem>, ApiError> {
        self.gateway.get(&routes::moderation_queue(status)).await
    }

    pub async fn moderate(
        &self,
        item: &AdviceItem,
        decision: ModerationDecision,
        note: Option<&str>,
    ) -> Result<AdviceItem, ApiError> {
        let target = lifecycle::transition(item.status, decision.target())?;
        let request = ModerationRequest {
            status: target,
            note: note.map(str::trim).filter(|note| !note.is_empty()),
        };

        let updated: AdviceItem = self
            .gateway
            .patch(&routes::moderation_advice(item.id), &request)
            .await?;

        if updated.status != target {
            return Err(ApiError::InvalidResponse(format!(
                "moderation to {} returned {}",
                target, updated.status
            )));
        }

        info!(advice_id = %item.id, from = %item.status, to = %target, "advice moderated");
        Ok(updated)
    }

    pub async fn set_flags(&self, advice_id: Uuid, patch: &FlagPatch) -> Result<AdviceItem, ApiError> {
        self.gateway.patch(&routes::moderation_flags(advice_id), patch).await
    }

    pub async fn toggle_flag(&self, item: &AdviceItem, flag: FlagKind) -> Result<AdviceItem, ApiError> {
        let patch = flag.toggle_patch(item);
        let updated = self.set_flags(item.id, &patch).await?;
        info!(advice_id = %item.id, flag = flag.label(), value = flag.is_set(&updated), "advice flag toggled");
        Ok(updated)
    }

    pub async fn moderation_activity(&self) -> Result<Vec<AuditEntry>, ApiError> {
        self.gateway.get(routes::moderation_audit()).await
    }

    pub async fn follow(&self, advice_id: Uuid) -> Result<(), ApiError> {
        self.gateway
            .post::<_, Option<serde_json::Value>>(&routes::advice_follow(advice_id), &serde_json::json!({}))
            .await?;
        Ok(())
    }

    pub async fn unfollow(&self, advice_id: Uuid) -> Result<(), ApiError> {
        self.gateway
            .delete::<Option<serde_json::Value>>(&routes::advice_follow(advice_id))
            .await?;
        Ok(())
    }

    pub async fn follows(&self) -> Result<Vec<FollowRelation>, ApiError> {
        self.gateway.get(routes::MY_FOLLOWS).await
    }

    pub async fn watchlist(&self) -> Result<Vec<AdviceItem>, ApiError> {
        self.gateway.get(routes::MY_WATCHLIST).await
    }

    /// Starts a boost checkout. Eligibility is checked before any request.
    pub async fn boost(
        &self,
        item: &AdviceItem,
        user: &CurrentUser,
        now: OffsetDateTime,
    ) -> Result<BoostReceipt, ApiError> {
        lifecycle::check_boost(item, user)?;
        let request = BoostRequest {
            duration_hours: self.options.boost_duration_hours,
            price_cents: self.options.boost_price_cents,
        };

        let receipt: BoostReceipt = self.gateway.post(&routes::advice_boost(item.id), &request).await?;
        if receipt.boost_expires_at <= now {
            return Err(ApiError::InvalidResponse(
                "boost expiry is not in the future".to_string(),
            ));
        }

        let expected_until = now + Duration::hours(self.options.boost_duration_hours);
        debug!(advice_id = %item.id, expires_at = %receipt.boost_expires_at, expected_until = %expected_until, "boost purchased");
        Ok(receipt)
    }

    /// Lightweight reaction; failures are logged and swallowed.
    pub async fn toggle_helpful(&self, advice_id: Uuid) -> Option<i64> {
        match self
            .gateway
            .post::<_, HelpfulResponse>(&routes::advice_helpful(advice_id), &serde_json::json!({}))
            .await
        {
            Ok(response) => Some(response.helpful_count),
            Err(err) => {
                debug!(advice_id = %advice_id, error = %err, "helpful toggle failed");
                None
            }
        }
    }
}
