use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::domain::admin::{
    Badge, BadgeAssignment, Category, Group, GroupStatus, NewCategory, OverviewMetrics, Wallet,
    WalletAdjustment,
};
use crate::domain::moderation::{AuditEntry, GroupJoinRequest, JoinDecision};
use crate::domain::support::{SupportTicket, TicketPatch};
use crate::domain::user::{AdminUser, Role};
use crate::http::{routes, ApiError, Gateway};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleChange {
    role: Role,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActiveChange {
    is_active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupStatusChange {
    status: GroupStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinDecisionRequest {
    decision: JoinDecision,
}

/// Typed calls for the `/admin` namespace. Role checks happen in the
/// workspace; the server enforces them again.
#[derive(Clone)]
pub struct AdminService {
    gateway: Gateway,
}

impl AdminService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn overview(&self) -> Result<OverviewMetrics, ApiError> {
        self.gateway.get(routes::ADMIN_OVERVIEW).await
    }

    pub async fn audit_log(&self) -> Result<Vec<AuditEntry>, ApiError> {
        self.gateway.get(routes::ADMIN_AUDIT).await
    }

    // ------------------------------------------------------------------
    // support inbox

    pub async fn tickets(&self) -> Result<Vec<SupportTicket>, ApiError> {
        self.gateway.get(routes::ADMIN_TICKETS).await
    }

    pub async fn update_ticket(&self, ticket_id: Uuid, patch: &TicketPatch) -> Result<SupportTicket, ApiError> {
        let ticket: SupportTicket = self.gateway.patch(&routes::admin_ticket(ticket_id), patch).await?;
        info!(ticket_id = %ticket_id, status = ticket.status.as_str(), "support ticket updated");
        Ok(ticket)
    }

    // ------------------------------------------------------------------
    // users

    pub async fn users(&self) -> Result<Vec<AdminUser>, ApiError> {
        self.gateway.get(routes::ADMIN_USERS).await
    }

    pub async fn set_role(&self, user_id: Uuid, role: Role) -> Result<AdminUser, ApiError> {
        self.gateway
            .patch(&routes::admin_user_role(user_id), &RoleChange { role })
            .await
    }

    pub async fn set_active(&self, user_id: Uuid, is_active: bool) -> Result<AdminUser, ApiError> {
        self.gateway
            .patch(&routes::admin_user_status(user_id), &ActiveChange { is_active })
            .await
    }

    // ------------------------------------------------------------------
    // wallets and badges

    pub async fn wallets(&self) -> Result<Vec<Wallet>, ApiError> {
        self.gateway.get(routes::ADMIN_WALLETS).await
    }

    pub async fn adjust_wallet(&self, adjustment: &WalletAdjustment) -> Result<Wallet, ApiError> {
        self.gateway.post(routes::ADMIN_WALLET_ADJUSTMENTS, adjustment).await
    }

    pub async fn badges(&self) -> Result<Vec<Badge>, ApiError> {
        self.gateway.get(routes::ADMIN_BADGES).await
    }

    pub async fn assign_badge(&self, assignment: &BadgeAssignment) -> Result<(), ApiError> {
        self.gateway
            .post::<_, Option<serde_json::Value>>(routes::ADMIN_BADGE_ASSIGNMENTS, assignment)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // categories and groups

    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        self.gateway.get(routes::ADMIN_CATEGORIES).await
    }

    pub async fn create_category(&self, category: &NewCategory) -> Result<Category, ApiError> {
        self.gateway.post(routes::ADMIN_CATEGORIES, category).await
    }

    pub async fn set_category_active(&self, category_id: Uuid, is_active: bool) -> Result<Category, ApiError> {
        self.gateway
            .patch(&routes::admin_category(category_id), &ActiveChange { is_active })
            .await
    }

    pub async fn groups(&self) -> Result<Vec<Group>, ApiError> {
        self.gateway.get(routes::ADMIN_GROUPS).await
    }

    pub async fn set_group_status(&self, group_id: Uuid, status: GroupStatus) -> Result<Group, ApiError> {
        self.gateway
            .patch(&routes::admin_group(group_id), &GroupStatusChange { status })
            .await
    }

    pub async fn join_requests(&self) -> Result<Vec<GroupJoinRequest>, ApiError> {
        self.gateway.get(routes::ADMIN_GROUP_REQUESTS).await
    }

    pub async fn decide_join_request(&self, request_id: Uuid, decision: JoinDecision) -> Result<(), ApiError> {
        self.gateway
            .patch::<_, Option<serde_json::Value>>(
                &routes::admin_group_request(request_id),
                &JoinDecisionRequest { decision },
            )
            .await?;
        info!(request_id = %request_id, decision = ?decision, "join request decided");
        Ok(())
    }

    pub async fn group_audit(&self) -> Result<Vec<AuditEntry>, ApiError> {
        self.gateway.get(routes::ADMIN_GROUP_AUDIT).await
    }
}
