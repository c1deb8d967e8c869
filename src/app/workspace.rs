//! Admin workspace: role-gated sections, each loaded and refreshed on its
//! own, and the mutate-then-reload flow shared by every admin action.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::admin::AdminService;
use crate::app::lifecycle::{FlagKind, ModerationDecision};
use crate::app::moderation::ModerationQueue;
use crate::app::sequence::RequestSequence;
use crate::config::limits::{self, Field};
use crate::domain::admin::{
    Badge, BadgeAssignment, Category, Group, GroupStatus, NewCategory, OverviewMetrics, Wallet,
    WalletAdjustment,
};
use crate::domain::advice::AdviceItem;
use crate::domain::moderation::{AuditEntry, JoinDecision};
use crate::domain::support::{SupportTicket, TicketPatch, TicketStatus};
use crate::domain::user::{AdminUser, CurrentUser, Role};
use crate::http::ApiError;
use crate::infra::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Overview,
    Moderation,
    GroupRequests,
    Activity,
    Support,
    Users,
    Wallet,
    Badges,
    Categories,
    Groups,
    AuditLog,
}

impl Section {
    pub const ALL: [Section; 11] = [
        Section::Overview,
        Section::Moderation,
        Section::GroupRequests,
        Section::Activity,
        Section::Support,
        Section::Users,
        Section::Wallet,
        Section::Badges,
        Section::Categories,
        Section::Groups,
        Section::AuditLog,
    ];

    pub fn requires_admin(&self) -> bool {
        !matches!(
            self,
            Section::Overview
                | Section::Moderation
                | Section::GroupRequests
                | Section::Activity
                | Section::Support
        )
    }

    pub fn visible_to(&self, user: &CurrentUser) -> bool {
        if self.requires_admin() {
            user.is_admin()
        } else {
            user.can_moderate()
        }
    }

    /// Sections whose contents move without this client acting, so they are
    /// fetched again whenever they become active.
    pub fn refreshes_on_activate(&self) -> bool {
        matches!(
            self,
            Section::Moderation
                | Section::GroupRequests
                | Section::Activity
                | Section::Support
                | Section::AuditLog
        )
    }
}

/// Sections to fetch again after one action. Each is fetched once, and the
/// overview is always included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadPlan {
    sections: BTreeSet<Section>,
}

impl ReloadPlan {
    pub fn of(sections: impl IntoIterator<Item = Section>) -> Self {
        let mut sections: BTreeSet<Section> = sections.into_iter().collect();
        sections.insert(Section::Overview);
        Self { sections }
    }

    pub fn contains(&self, section: Section) -> bool {
        self.sections.contains(&section)
    }

    pub fn sections(&self) -> impl Iterator<Item = Section> + '_ {
        self.sections.iter().copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletAdjustmentForm {
    pub user_id: Option<Uuid>,
    pub amount_cents: Option<i64>,
    pub justification: String,
}

impl WalletAdjustmentForm {
    pub fn can_submit(&self) -> bool {
        self.to_request().is_some()
    }

    fn to_request(&self) -> Option<WalletAdjustment> {
        let user_id = self.user_id?;
        let amount_cents = self.amount_cents.filter(|amount| *amount != 0)?;
        limits::check_length(Field::Justification, &self.justification).ok()?;
        Some(WalletAdjustment {
            user_id,
            amount_cents,
            reason: self.justification.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BadgeAssignmentForm {
    pub user_id: Option<Uuid>,
    pub badge_id: Option<Uuid>,
    pub justification: String,
}

impl BadgeAssignmentForm {
    pub fn can_submit(&self) -> bool {
        self.to_request().is_some()
    }

    fn to_request(&self) -> Option<BadgeAssignment> {
        limits::check_length(Field::Justification, &self.justification).ok()?;
        Some(BadgeAssignment {
            user_id: self.user_id?,
            badge_id: self.badge_id?,
            reason: self.justification.trim().to_string(),
        })
    }
}

/// Local copies of the admin-owned sections. Moderation, group requests and
/// activity live in the [`ModerationQueue`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceSnapshot {
    pub overview: Option<OverviewMetrics>,
    pub tickets: Vec<SupportTicket>,
    pub users: Vec<AdminUser>,
    pub wallets: Vec<Wallet>,
    pub badges: Vec<Badge>,
    pub categories: Vec<Category>,
    pub groups: Vec<Group>,
    pub audit_log: Vec<AuditEntry>,
}

pub struct AdminWorkspace {
    user: CurrentUser,
    admin: AdminService,
    queue: ModerationQueue,
    notifier: Arc<dyn Notifier>,
    active: RwLock<Section>,
    state: RwLock<WorkspaceSnapshot>,
    sequence: RequestSequence<Section>,
}

impl AdminWorkspace {
    pub fn new(
        user: CurrentUser,
        admin: AdminService,
        queue: ModerationQueue,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            user,
            admin,
            queue,
            notifier,
            active: RwLock::new(Section::Overview),
            state: RwLock::new(WorkspaceSnapshot::default()),
            sequence: RequestSequence::new(),
        }
    }

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn queue(&self) -> &ModerationQueue {
        &self.queue
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn active_section(&self) -> Section {
        *self.active.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn visible_sections(&self) -> Vec<Section> {
        Section::ALL
            .into_iter()
            .filter(|section| section.visible_to(&self.user))
            .collect()
    }

    /// Fetches every visible section in parallel. A failing section keeps
    /// its previous contents and is returned so the caller can flag it.
    pub async fn mount(&self) -> Vec<(Section, ApiError)> {
        let sections = self.visible_sections();
        let results = join_all(sections.iter().map(|section| self.load_section(*section))).await;

        sections
            .into_iter()
            .zip(results)
            .filter_map(|(section, result)| {
                result.err().map(|err| {
                    warn!(section = ?section, error = %err, "workspace section failed to load");
                    (section, err)
                })
            })
            .collect()
    }

    pub async fn activate(&self, section: Section) -> Result<(), ApiError> {
        self.ensure_visible(section)?;
        *self.active.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = section;
        if section.refreshes_on_activate() {
            self.load_section(section).await?;
        }
        Ok(())
    }

    pub async fn load_section(&self, section: Section) -> Result<(), ApiError> {
        self.ensure_visible(section)?;
        match section {
            Section::Overview => {
                self.fetch(section, self.admin.overview(), |state, metrics| {
                    state.overview = Some(metrics)
                })
                .await
            }
            Section::Moderation => self.queue.reload_queue().await,
            Section::GroupRequests => self.queue.reload_join_requests().await,
            Section::Activity => self.queue.reload_activity().await,
            Section::Support => {
                self.fetch(section, self.admin.tickets(), |state, tickets| {
                    state.tickets = tickets
                })
                .await
            }
            Section::Users => {
                self.fetch(section, self.admin.users(), |state, users| state.users = users)
                    .await
            }
            Section::Wallet => {
                self.fetch(section, self.admin.wallets(), |state, wallets| {
                    state.wallets = wallets
                })
                .await
            }
            Section::Badges => {
                self.fetch(section, self.admin.badges(), |state, badges| {
                    state.badges = badges
                })
                .await
            }
            Section::Categories => {
                self.fetch(section, self.admin.categories(), |state, categories| {
                    state.categories = categories
                })
                .await
            }
            Section::Groups => {
                self.fetch(section, self.admin.groups(), |state, groups| {
                    state.groups = groups
                })
                .await
            }
            Section::AuditLog => {
                self.fetch(section, self.admin.audit_log(), |state, entries| {
                    state.audit_log = entries
                })
                .await
            }
        }
    }

    // ------------------------------------------------------------------
    // support inbox

    pub async fn move_ticket(
        &self,
        ticket: &SupportTicket,
        target: TicketStatus,
        resolution_summary: Option<&str>,
    ) -> Result<SupportTicket, ApiError> {
        let patch = if ticket.status.can_move_to(target) {
            Ok(TicketPatch {
                status: Some(target),
                resolution_summary: resolution_summary
                    .filter(|_| target.takes_resolution_summary())
                    .map(str::trim)
                    .filter(|summary| !summary.is_empty())
                    .map(str::to_string),
                ..TicketPatch::default()
            })
        } else {
            Err(ApiError::domain(format!(
                "A {} ticket cannot move to {}.",
                ticket.status.as_str(),
                target.as_str()
            )))
        };

        self.perform(
            Section::Support,
            ReloadPlan::of([Section::Support]),
            "Ticket updated.",
            async move { self.admin.update_ticket(ticket.id, &patch?).await },
        )
        .await
    }

    pub async fn reopen_ticket(&self, ticket: &SupportTicket) -> Result<SupportTicket, ApiError> {
        self.move_ticket(ticket, TicketStatus::Open, None).await
    }

    pub async fn cycle_priority(&self, ticket: &SupportTicket) -> Result<SupportTicket, ApiError> {
        let patch = TicketPatch {
            priority: Some(ticket.priority.next()),
            ..TicketPatch::default()
        };
        self.perform(
            Section::Support,
            ReloadPlan::of([Section::Support]),
            "Ticket priority updated.",
            self.admin.update_ticket(ticket.id, &patch),
        )
        .await
    }

    pub async fn save_ticket_note(&self, ticket_id: Uuid, note: &str) -> Result<SupportTicket, ApiError> {
        let patch = TicketPatch {
            internal_note: Some(note.trim().to_string()),
            ..TicketPatch::default()
        };
        self.perform(
            Section::Support,
            ReloadPlan::of([Section::Support]),
            "Internal note saved.",
            self.admin.update_ticket(ticket_id, &patch),
        )
        .await
    }

    // ------------------------------------------------------------------
    // users, wallets, badges

    pub async fn set_role(&self, user_id: Uuid, role: Role) -> Result<AdminUser, ApiError> {
        self.perform(
            Section::Users,
            ReloadPlan::of([Section::Users]),
            "Role updated.",
            self.admin.set_role(user_id, role),
        )
        .await
    }

    pub async fn set_active(&self, user_id: Uuid, is_active: bool) -> Result<AdminUser, ApiError> {
        self.perform(
            Section::Users,
            ReloadPlan::of([Section::Users]),
            if is_active {
                "Account reactivated."
            } else {
                "Account suspended."
            },
            self.admin.set_active(user_id, is_active),
        )
        .await
    }

    pub async fn adjust_wallet(&self, form: &WalletAdjustmentForm) -> Result<Wallet, ApiError> {
        let request = form.to_request().ok_or_else(|| {
            ApiError::validation(
                "Choose a user and a non-zero amount, and give a justification of at least 10 characters.",
            )
        })?;
        self.perform(
            Section::Wallet,
            ReloadPlan::of([Section::Wallet, Section::AuditLog]),
            "Wallet balance adjusted.",
            self.admin.adjust_wallet(&request),
        )
        .await
    }

    pub async fn assign_badge(&self, form: &BadgeAssignmentForm) -> Result<(), ApiError> {
        let request = form.to_request().ok_or_else(|| {
            ApiError::validation(
                "Choose a user and a badge, and give a justification of at least 10 characters.",
            )
        })?;
        self.perform(
            Section::Badges,
            ReloadPlan::of([Section::Badges, Section::AuditLog]),
            "Badge assigned.",
            self.admin.assign_badge(&request),
        )
        .await
    }

    // ------------------------------------------------------------------
    // categories and groups

    pub async fn create_category(&self, category: &NewCategory) -> Result<Category, ApiError> {
        if category.name.trim().is_empty() || category.slug.trim().is_empty() {
            return Err(ApiError::validation("Category name and slug are required."));
        }
        self.perform(
            Section::Categories,
            ReloadPlan::of([Section::Categories]),
            "Category created.",
            self.admin.create_category(category),
        )
        .await
    }

    pub async fn set_category_active(&self, category_id: Uuid, is_active: bool) -> Result<Category, ApiError> {
        self.perform(
            Section::Categories,
            ReloadPlan::of([Section::Categories]),
            "Category updated.",
            self.admin.set_category_active(category_id, is_active),
        )
        .await
    }

    pub async fn set_group_status(&self, group_id: Uuid, status: GroupStatus) -> Result<Group, ApiError> {
        self.perform(
            Section::Groups,
            ReloadPlan::of([Section::Groups, Section::Activity]),
            "Group status updated.",
            self.admin.set_group_status(group_id, status),
        )
        .await
    }

    // ------------------------------------------------------------------
    // moderation, delegated to the queue which notifies and reloads itself

    pub async fn moderate(
        &self,
        item: &AdviceItem,
        decision: ModerationDecision,
        note: Option<&str>,
    ) -> Result<AdviceItem, ApiError> {
        self.ensure_visible(Section::Moderation)?;
        let outcome = self.queue.moderate(item, decision, note).await;
        self.reload_overview().await;
        outcome
    }

    pub async fn toggle_flag(&self, item: &AdviceItem, flag: FlagKind) -> Result<AdviceItem, ApiError> {
        self.ensure_visible(Section::Moderation)?;
        let outcome = self.queue.toggle_flag(item, flag).await;
        self.reload_overview().await;
        outcome
    }

    pub async fn decide_join_request(&self, request_id: Uuid, decision: JoinDecision) -> Result<(), ApiError> {
        self.ensure_visible(Section::GroupRequests)?;
        let outcome = self.queue.decide_join_request(request_id, decision).await;
        self.reload_overview().await;
        outcome
    }

    // ------------------------------------------------------------------

    fn ensure_visible(&self, section: Section) -> Result<(), ApiError> {
        if section.visible_to(&self.user) {
            Ok(())
        } else {
            Err(ApiError::domain(if section.requires_admin() {
                "This section is only available to administrators."
            } else {
                "This section is only available to moderators."
            }))
        }
    }

    /// Runs one mutating action: gate, invoke, reload what it touched plus
    /// the overview, then notify. Nothing local changes when the action fails.
    async fn perform<T, Fut>(
        &self,
        owner: Section,
        plan: ReloadPlan,
        success: &str,
        action: Fut,
    ) -> Result<T, ApiError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if let Err(err) = self.ensure_visible(owner) {
            self.notifier.error(&err.user_message());
            return Err(err);
        }

        match action.await {
            Ok(value) => {
                self.reload(&plan).await;
                self.notifier.success(success);
                Ok(value)
            }
            Err(err) => {
                self.notifier.error(&err.user_message());
                Err(err)
            }
        }
    }

    async fn reload(&self, plan: &ReloadPlan) {
        let sections: Vec<Section> = plan
            .sections()
            .filter(|section| section.visible_to(&self.user))
            .collect();
        let results = join_all(sections.iter().map(|section| self.load_section(*section))).await;
        for (section, result) in sections.into_iter().zip(results) {
            if let Err(err) = result {
                warn!(section = ?section, error = %err, "reload after admin action failed");
            }
        }
    }

    async fn reload_overview(&self) {
        if let Err(err) = self.load_section(Section::Overview).await {
            warn!(error = %err, "overview reload failed");
        }
    }

    async fn fetch<T, Fut>(
        &self,
        section: Section,
        request: Fut,
        apply: impl FnOnce(&mut WorkspaceSnapshot, T),
    ) -> Result<(), ApiError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let ticket = self.sequence.issue(section);
        let value = request.await?;
        if self.sequence.is_current(&section, ticket) {
            let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            apply(&mut state, value);
        } else {
            debug!(section = ?section, ticket, "stale section response discarded");
        }
        Ok(())
    }
}
