use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::advice::AuthorRef;

/// Append-only audit record; the client only ever reads these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor: AuthorRef,
    pub target_type: String,
    pub target_id: Uuid,
    pub action: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityDomain {
    Advice,
    Group,
}

/// An audit entry tagged with the action domain it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub domain: ActivityDomain,
    pub entry: AuditEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupJoinRequest {
    pub id: Uuid,
    pub group_id: Uuid,
    pub group_name: String,
    pub user: AuthorRef,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinDecision {
    Approve,
    Reject,
}
