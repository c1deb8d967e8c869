use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceItem {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub status: AdviceStatus,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_spam: bool,
    #[serde(default)]
    pub is_boost_active: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub boost_expires_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub priority_tier: i32,
    #[serde(default)]
    pub is_urgent: bool,
    pub identity_mode: IdentityMode,
    pub author: AuthorRef,
    #[serde(default)]
    pub category: Option<CategoryRef>,
    #[serde(default)]
    pub helpful_count: i64,
    #[serde(default)]
    pub follow_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl AdviceItem {
    /// A boost counts only while its expiry is still ahead of `now`; the
    /// server clears `isBoostActive` lazily.
    pub fn boost_active_at(&self, now: OffsetDateTime) -> bool {
        self.is_boost_active
            && self
                .boost_expires_at
                .map(|expires_at| expires_at > now)
                .unwrap_or(false)
    }

    /// Reader-facing boost indicator, e.g. `Boosted, expires in 3h 20m`.
    pub fn boost_label(&self, now: OffsetDateTime) -> Option<String> {
        if !self.boost_active_at(now) {
            return None;
        }
        let remaining = self.boost_expires_at? - now;
        Some(format!("Boosted, expires in {}", format_remaining(remaining)))
    }

    pub fn is_authored_by(&self, user_id: Uuid) -> bool {
        self.author.id == user_id
    }
}

fn format_remaining(remaining: Duration) -> String {
    let minutes = remaining.whole_minutes().max(0);
    let days = minutes / (24 * 60);
    let hours = (minutes % (24 * 60)) / 60;
    let mins = minutes % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        "less than a minute".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdviceStatus {
    Pending,
    Approved,
    Hold,
    Removed,
}

impl AdviceStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "HOLD" => Some(Self::Hold),
            "REMOVED" => Some(Self::Removed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Hold => "HOLD",
            Self::Removed => "REMOVED",
        }
    }
}

impl std::fmt::Display for AdviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityMode {
    Anonymous,
    Public,
}

/// Weak reference to a user; the advice never owns its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRef {
    pub id: Uuid,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRef {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Advice detail as served by `GET /advice/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceThread {
    pub advice: AdviceItem,
    #[serde(default)]
    pub comments: Vec<crate::domain::comment::Comment>,
}

/// Moderator flag patch; absent fields are left untouched server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_featured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_spam: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostReceipt {
    pub advice_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub boost_expires_at: OffsetDateTime,
    pub amount_cents: i64,
    #[serde(default)]
    pub checkout_url: Option<String>,
}
