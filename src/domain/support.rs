use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::advice::AuthorRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportTicket {
    pub id: Uuid,
    pub subject: String,
    #[serde(default)]
    pub requester: Option<AuthorRef>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub first_response_due_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub first_response_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub internal_note: Option<String>,
    #[serde(default)]
    pub resolution_summary: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SupportTicket {
    /// True once the SLA deadline has passed without any staff response.
    pub fn is_first_response_overdue(&self, now: OffsetDateTime) -> bool {
        match (self.first_response_at, self.first_response_due_at) {
            (None, Some(due_at)) => due_at < now,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Open => 0,
            Self::InProgress => 1,
            Self::Resolved => 2,
            Self::Closed => 3,
        }
    }

    /// Tickets only move forward, except for an explicit re-open of a
    /// resolved or closed ticket.
    pub fn can_move_to(&self, target: TicketStatus) -> bool {
        if target == TicketStatus::Open {
            return self.can_reopen();
        }
        target.rank() > self.rank()
    }

    pub fn can_reopen(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    pub fn takes_resolution_summary(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    Normal,
    Urgent,
}

impl TicketPriority {
    pub fn next(&self) -> Self {
        match self {
            Self::Low => Self::Normal,
            Self::Normal => Self::Urgent,
            Self::Urgent => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TicketPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_summary: Option<String>,
}
