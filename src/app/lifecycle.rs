//! Advice status workflow, moderation flags and boost eligibility.
//!
//! ```text
//! PENDING ──► { APPROVED, HOLD, REMOVED }
//! APPROVED ◄──► HOLD ◄──► REMOVED ◄──► APPROVED
//! ```
//!
//! PENDING is the creation state and is never re-entered. Once an item has
//! left it, moderators may move it between the other three freely. Flags
//! are orthogonal to status.

use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::advice::{AdviceItem, AdviceStatus, FlagPatch};
use crate::domain::user::CurrentUser;
use crate::http::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModerationDecision {
    Approve,
    Hold,
    Remove,
}

impl ModerationDecision {
    pub fn target(&self) -> AdviceStatus {
        match self {
            Self::Approve => AdviceStatus::Approved,
            Self::Hold => AdviceStatus::Hold,
            Self::Remove => AdviceStatus::Removed,
        }
    }

    pub fn for_status(status: AdviceStatus) -> Option<Self> {
        match status {
            AdviceStatus::Approved => Some(Self::Approve),
            AdviceStatus::Hold => Some(Self::Hold),
            AdviceStatus::Removed => Some(Self::Remove),
            AdviceStatus::Pending => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("advice cannot be returned to PENDING")]
    PendingNotReenterable,
    #[error("advice is already {0}")]
    Unchanged(AdviceStatus),
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        ApiError::domain(err.to_string())
    }
}

pub fn transition(current: AdviceStatus, target: AdviceStatus) -> Result<AdviceStatus, TransitionError> {
    if target == AdviceStatus::Pending {
        return Err(TransitionError::PendingNotReenterable);
    }
    if current == target {
        return Err(TransitionError::Unchanged(current));
    }
    Ok(target)
}

pub fn can_transition(current: AdviceStatus, target: AdviceStatus) -> bool {
    transition(current, target).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    Locked,
    Featured,
    Spam,
}

impl FlagKind {
    pub fn is_set(&self, item: &AdviceItem) -> bool {
        match self {
            Self::Locked => item.is_locked,
            Self::Featured => item.is_featured,
            Self::Spam => item.is_spam,
        }
    }

    /// Patch that flips this flag and leaves the others alone.
    pub fn toggle_patch(&self, item: &AdviceItem) -> FlagPatch {
        let value = Some(!self.is_set(item));
        match self {
            Self::Locked => FlagPatch {
                is_locked: value,
                ..FlagPatch::default()
            },
            Self::Featured => FlagPatch {
                is_featured: value,
                ..FlagPatch::default()
            },
            Self::Spam => FlagPatch {
                is_spam: value,
                ..FlagPatch::default()
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Featured => "featured",
            Self::Spam => "spam",
        }
    }
}

/// Locked threads take no new comments.
pub fn ensure_open_for_comments(item: &AdviceItem) -> Result<(), ApiError> {
    if item.is_locked {
        return Err(ApiError::domain("This thread is locked and no longer accepts replies."));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BoostRefusal {
    #[error("only approved advice can be boosted")]
    NotApproved,
    #[error("only the author can boost this advice")]
    NotAuthor,
    #[error("this advice is already boosted")]
    AlreadyActive,
}

impl From<BoostRefusal> for ApiError {
    fn from(err: BoostRefusal) -> Self {
        ApiError::domain(err.to_string())
    }
}

/// Whether `user` may buy a boost for `item`. The boost control is enabled
/// exactly when this returns `Ok`.
pub fn check_boost(item: &AdviceItem, user: &CurrentUser) -> Result<(), BoostRefusal> {
    if !user.is_active || !item.is_authored_by(user.id) {
        return Err(BoostRefusal::NotAuthor);
    }
    if item.status != AdviceStatus::Approved {
        return Err(BoostRefusal::NotApproved);
    }
    if item.is_boost_active {
        return Err(BoostRefusal::AlreadyActive);
    }
    Ok(())
}

/// Feed order: live boosts first (higher tier first), then newest first.
pub fn rank_feed(items: &mut [AdviceItem], now: OffsetDateTime) {
    items.sort_by(|a, b| {
        let a_boosted = a.boost_active_at(now);
        let b_boosted = b.boost_active_at(now);
        b_boosted
            .cmp(&a_boosted)
            .then_with(|| {
                if a_boosted && b_boosted {
                    b.priority_tier.cmp(&a.priority_tier)
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}
