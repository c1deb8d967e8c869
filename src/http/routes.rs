//! Backend paths, relative to a base address.

use uuid::Uuid;

use crate::domain::advice::AdviceStatus;

pub const LOGIN: &str = "/auth/login";
pub const REGISTER: &str = "/auth/register";
pub const LOGOUT: &str = "/auth/logout";
pub const REFRESH: &str = "/auth/refresh";
pub const ME: &str = "/auth/me";

pub const ADVICE: &str = "/advice";
pub const MY_FOLLOWS: &str = "/users/me/follows";
pub const MY_WATCHLIST: &str = "/users/me/watchlist";

pub const ADMIN_OVERVIEW: &str = "/admin/overview";
pub const ADMIN_AUDIT: &str = "/admin/audit";
pub const ADMIN_TICKETS: &str = "/admin/support/tickets";
pub const ADMIN_USERS: &str = "/admin/users";
pub const ADMIN_WALLETS: &str = "/admin/wallets";
pub const ADMIN_WALLET_ADJUSTMENTS: &str = "/admin/wallets/adjustments";
pub const ADMIN_BADGES: &str = "/admin/badges";
pub const ADMIN_BADGE_ASSIGNMENTS: &str = "/admin/badges/assignments";
pub const ADMIN_CATEGORIES: &str = "/admin/categories";
pub const ADMIN_GROUPS: &str = "/admin/groups";
pub const ADMIN_GROUP_REQUESTS: &str = "/admin/groups/requests";
pub const ADMIN_GROUP_AUDIT: &str = "/admin/groups/audit";

pub fn advice_list(category: Option<&str>) -> String {
    match category {
        Some(slug) => {
            let slug: String = url::form_urlencoded::byte_serialize(slug.as_bytes()).collect();
            format!("{}?category={}", ADVICE, slug)
        }
        None => ADVICE.to_string(),
    }
}

pub fn advice(id: Uuid) -> String {
    format!("{}/{}", ADVICE, id)
}

pub fn advice_comments(id: Uuid) -> String {
    format!("{}/{}/comments", ADVICE, id)
}

pub fn advice_follow(id: Uuid) -> String {
    format!("{}/{}/follow", ADVICE, id)
}

pub fn advice_helpful(id: Uuid) -> String {
    format!("{}/{}/helpful", ADVICE, id)
}

pub fn advice_boost(id: Uuid) -> String {
    format!("{}/{}/boost", ADVICE, id)
}

pub fn moderation_queue(status: AdviceStatus) -> String {
    format!("/moderation/advice?status={}", status.as_str())
}

pub fn moderation_advice(id: Uuid) -> String {
    format!("/moderation/advice/{}", id)
}

pub fn moderation_flags(id: Uuid) -> String {
    format!("/moderation/advice/{}/flags", id)
}

pub fn moderation_audit() -> &'static str {
    "/moderation/audit"
}

pub fn admin_user_role(id: Uuid) -> String {
    format!("{}/{}/role", ADMIN_USERS, id)
}

pub fn admin_user_status(id: Uuid) -> String {
    format!("{}/{}/status", ADMIN_USERS, id)
}

pub fn admin_ticket(id: Uuid) -> String {
    format!("{}/{}", ADMIN_TICKETS, id)
}

pub fn admin_category(id: Uuid) -> String {
    format!("{}/{}", ADMIN_CATEGORIES, id)
}

pub fn admin_group(id: Uuid) -> String {
    format!("{}/{}", ADMIN_GROUPS, id)
}

pub fn admin_group_request(id: Uuid) -> String {
    format!("{}/{}", ADMIN_GROUP_REQUESTS, id)
}
