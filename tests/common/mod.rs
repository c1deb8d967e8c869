#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use quandary::config::ClientConfig;
use quandary::domain::admin::{Badge, Category, Group, GroupStatus, Wallet};
use quandary::domain::advice::{AdviceItem, AdviceStatus, AuthorRef, IdentityMode};
use quandary::domain::comment::Comment;
use quandary::domain::moderation::{AuditEntry, GroupJoinRequest};
use quandary::domain::support::{SupportTicket, TicketPriority, TicketStatus};
use quandary::domain::user::{AdminUser, CurrentUser, Role};
use quandary::http::FallbackPolicy;
use quandary::infra::notify::Notifier;
use quandary::infra::session::Session;
use quandary::AppState;

pub const PASSWORD: &str = "correct horse battery";

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Note {
    Success(String),
    Error(String),
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notes: Mutex<Vec<Note>>,
}

impl RecordingNotifier {
    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap().clone()
    }

    pub fn successes(&self) -> Vec<String> {
        self.notes()
            .into_iter()
            .filter_map(|note| match note {
                Note::Success(message) => Some(message),
                Note::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notes()
            .into_iter()
            .filter_map(|note| match note {
                Note::Error(message) => Some(message),
                Note::Success(_) => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.notes.lock().unwrap().push(Note::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.notes.lock().unwrap().push(Note::Error(message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

pub struct TestClient {
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestClient {
    pub fn new(config: ClientConfig, policy: FallbackPolicy) -> Self {
        Self::with_session(config, policy, Session::in_memory())
    }

    pub fn with_session(config: ClientConfig, policy: FallbackPolicy, session: Session) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::with_policy(config, policy, Arc::new(session), notifier.clone())
            .expect("client builds");
        Self { state, notifier }
    }

    pub fn session(&self) -> &Session {
        &self.state.session
    }
}

/// A base address nothing listens on.
pub async fn dead_base() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/api", port)
}

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SeedUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

impl SeedUser {
    fn new(email: &str, display_name: &str, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            role,
        }
    }

    fn current(&self, is_active: bool) -> CurrentUser {
        CurrentUser {
            id: self.id,
            role: self.role,
            is_active,
            display_name: Some(self.display_name.clone()),
            email: Some(self.email.clone()),
        }
    }

    fn author_ref(&self) -> AuthorRef {
        AuthorRef {
            id: self.id,
            display_name: Some(self.display_name.clone()),
            avatar_url: None,
        }
    }
}

#[derive(Default)]
struct BackendState {
    users: Vec<(SeedUser, bool)>,
    tokens: HashMap<String, Uuid>,
    advice: Vec<AdviceItem>,
    comments: Vec<Comment>,
    follows: BTreeSet<(Uuid, Uuid)>,
    tickets: Vec<SupportTicket>,
    wallets: Vec<Wallet>,
    badges: Vec<Badge>,
    badge_assignments: Vec<Value>,
    categories: Vec<Category>,
    groups: Vec<Group>,
    join_requests: Vec<GroupJoinRequest>,
    advice_audit: Vec<AuditEntry>,
    group_audit: Vec<AuditEntry>,
    admin_audit: Vec<AuditEntry>,
    last_advice_payload: Option<Value>,
    approve_on_create: bool,
    hits: Vec<String>,
    failing: HashMap<String, StatusCode>,
    delays: HashMap<String, std::time::Duration>,
}

impl BackendState {
    fn user(&self, id: Uuid) -> Option<&(SeedUser, bool)> {
        self.users.iter().find(|(user, _)| user.id == id)
    }

    fn caller(&self, headers: &HeaderMap) -> Result<(SeedUser, bool), Response> {
        let token = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "missing credential"))?;
        let user_id = self
            .tokens
            .get(token)
            .ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "invalid credential"))?;
        let (user, active) = self
            .user(*user_id)
            .cloned()
            .ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "unknown user"))?;
        if !active {
            return Err(fail(StatusCode::FORBIDDEN, "account suspended"));
        }
        Ok((user, active))
    }

    fn staff(&self, headers: &HeaderMap) -> Result<SeedUser, Response> {
        let (user, _) = self.caller(headers)?;
        if !user.role.is_staff() {
            return Err(fail(StatusCode::FORBIDDEN, "moderators only"));
        }
        Ok(user)
    }

    fn admin(&self, headers: &HeaderMap) -> Result<SeedUser, Response> {
        let (user, _) = self.caller(headers)?;
        if user.role != Role::Admin {
            return Err(fail(StatusCode::FORBIDDEN, "administrators only"));
        }
        Ok(user)
    }

    fn issue_grant(&mut self, user: &SeedUser, active: bool) -> Value {
        let token = format!("token-{}", Uuid::new_v4());
        self.tokens.insert(token.clone(), user.id);
        json!({ "token": token, "user": user.current(active) })
    }

    fn audit(actor: &SeedUser, target_type: &str, target_id: Uuid, action: String, note: Option<String>) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            actor: actor.author_ref(),
            target_type: target_type.to_string(),
            target_id,
            action,
            note,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn admin_user(&self, id: Uuid) -> Option<AdminUser> {
        self.user(id).map(|(user, active)| AdminUser {
            id: user.id,
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            role: user.role,
            is_active: *active,
            created_at: OffsetDateTime::UNIX_EPOCH,
        })
    }
}

type Shared = Arc<Mutex<BackendState>>;

fn fail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn ok<T: serde::Serialize>(value: T) -> Response {
    Json(value).into_response()
}

macro_rules! attempt {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(response) => return response,
        }
    };
}

pub struct Backend {
    shared: Shared,
    pub addr: SocketAddr,
    pub member: SeedUser,
    pub other_member: SeedUser,
    pub moderator: SeedUser,
    pub admin: SeedUser,
}

impl Backend {
    pub async fn start() -> Self {
        let member = SeedUser::new("member@example.com", "Member", Role::Member);
        let other_member = SeedUser::new("other@example.com", "Other", Role::Member);
        let moderator = SeedUser::new("mod@example.com", "Moderator", Role::Moderator);
        let admin = SeedUser::new("admin@example.com", "Admin", Role::Admin);

        let mut state = BackendState::default();
        for user in [&member, &other_member, &moderator, &admin] {
            state.users.push((user.clone(), true));
            state.wallets.push(Wallet {
                user_id: user.id,
                display_name: user.display_name.clone(),
                balance_cents: 1_000,
            });
        }
        let shared: Shared = Arc::new(Mutex::new(state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .nest("/api", api_routes())
            .layer(from_fn_with_state(shared.clone(), record))
            .with_state(shared.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            shared,
            addr,
            member,
            other_member,
            moderator,
            admin,
        }
    }

    pub fn base(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::for_base_url(self.base());
        config.request_timeout_seconds = 5;
        config
    }

    pub fn client(&self) -> TestClient {
        self.client_with(self.config())
    }

    pub fn client_with(&self, config: ClientConfig) -> TestClient {
        TestClient::new(config, FallbackPolicy::new([self.base()]))
    }

    pub async fn signed_in(&self, user: &SeedUser) -> (TestClient, CurrentUser) {
        let client = self.client();
        let current = client
            .state
            .auth()
            .login(&user.email, PASSWORD)
            .await
            .expect("seed user logs in");
        (client, current)
    }

    // ------------------------------------------------------------------
    // Inspection and fault injection
    // ------------------------------------------------------------------

    pub fn hits(&self, method: &str, path: &str) -> usize {
        let key = format!("{} /api{}", method, path);
        self.shared.lock().unwrap().hits.iter().filter(|hit| **hit == key).count()
    }

    pub fn reset_hits(&self) {
        self.shared.lock().unwrap().hits.clear();
    }

    pub fn fail(&self, method: &str, path: &str, status: StatusCode) {
        let key = format!("{} /api{}", method, path);
        self.shared.lock().unwrap().failing.insert(key, status);
    }

    pub fn heal(&self, method: &str, path: &str) {
        let key = format!("{} /api{}", method, path);
        self.shared.lock().unwrap().failing.remove(&key);
    }

    /// Holds back the next response to `path` (query included) by `millis`.
    pub fn delay_once(&self, method: &str, path: &str, millis: u64) {
        let key = format!("{} /api{}", method, path);
        self.shared
            .lock()
            .unwrap()
            .delays
            .insert(key, std::time::Duration::from_millis(millis));
    }

    /// Reads the live hit count for one route, for use from inside callbacks.
    pub fn hit_counter(&self, method: &str, path: &str) -> impl Fn() -> usize + Send + Sync + 'static {
        let key = format!("{} /api{}", method, path);
        let shared = self.shared.clone();
        move || shared.lock().unwrap().hits.iter().filter(|hit| **hit == key).count()
    }

    /// Makes the backend misreport newly created advice as approved.
    pub fn approve_on_create(&self) {
        self.shared.lock().unwrap().approve_on_create = true;
    }

    pub fn last_advice_payload(&self) -> Option<Value> {
        self.shared.lock().unwrap().last_advice_payload.clone()
    }

    pub fn advice(&self, id: Uuid) -> AdviceItem {
        self.shared
            .lock()
            .unwrap()
            .advice
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .expect("advice exists")
    }

    pub fn update_advice(&self, id: Uuid, change: impl FnOnce(&mut AdviceItem)) {
        let mut state = self.shared.lock().unwrap();
        let item = state.advice.iter_mut().find(|item| item.id == id).expect("advice exists");
        change(item);
    }

    pub fn follows_of(&self, user_id: Uuid) -> Vec<Uuid> {
        self.shared
            .lock()
            .unwrap()
            .follows
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, advice)| *advice)
            .collect()
    }

    pub fn wallet_balance(&self, user_id: Uuid) -> i64 {
        self.shared
            .lock()
            .unwrap()
            .wallets
            .iter()
            .find(|wallet| wallet.user_id == user_id)
            .map(|wallet| wallet.balance_cents)
            .unwrap_or_default()
    }

    pub fn badge_assignments(&self) -> Vec<Value> {
        self.shared.lock().unwrap().badge_assignments.clone()
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn seed_advice(&self, author: &SeedUser, status: AdviceStatus, title: &str) -> AdviceItem {
        let mut state = self.shared.lock().unwrap();
        let created_at = OffsetDateTime::now_utc() + Duration::seconds(state.advice.len() as i64);
        let item = AdviceItem {
            id: Uuid::new_v4(),
            title: title.to_string(),
            body: format!("{} in more detail than the title gives", title),
            status,
            is_locked: false,
            is_featured: false,
            is_spam: false,
            is_boost_active: false,
            boost_expires_at: None,
            priority_tier: 0,
            is_urgent: false,
            identity_mode: IdentityMode::Anonymous,
            author: author.author_ref(),
            category: None,
            helpful_count: 0,
            follow_count: 0,
            created_at,
            updated_at: created_at,
        };
        state.advice.push(item.clone());
        item
    }

    pub fn seed_comment(&self, advice_id: Uuid, parent_id: Option<Uuid>, body: &str) -> Comment {
        let mut state = self.shared.lock().unwrap();
        let author = state.users[0].0.author_ref();
        let comment = Comment {
            id: Uuid::new_v4(),
            advice_id,
            body: body.to_string(),
            parent_id,
            author,
            created_at: OffsetDateTime::now_utc() + Duration::seconds(state.comments.len() as i64),
        };
        state.comments.push(comment.clone());
        comment
    }

    pub fn seed_ticket(&self, subject: &str, status: TicketStatus, priority: TicketPriority) -> SupportTicket {
        let now = OffsetDateTime::now_utc();
        let ticket = SupportTicket {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            requester: Some(self.member.author_ref()),
            status,
            priority,
            first_response_due_at: Some(now + Duration::hours(4)),
            first_response_at: None,
            internal_note: None,
            resolution_summary: None,
            created_at: now,
        };
        self.shared.lock().unwrap().tickets.push(ticket.clone());
        ticket
    }

    pub fn seed_badge(&self, name: &str) -> Badge {
        let badge = Badge {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
        };
        self.shared.lock().unwrap().badges.push(badge.clone());
        badge
    }

    pub fn seed_group(&self, name: &str) -> Group {
        let group = Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: GroupStatus::Active,
            member_count: 3,
        };
        self.shared.lock().unwrap().groups.push(group.clone());
        group
    }

    pub fn seed_join_request(&self, group: &Group, user: &SeedUser) -> GroupJoinRequest {
        let request = GroupJoinRequest {
            id: Uuid::new_v4(),
            group_id: group.id,
            group_name: group.name.clone(),
            user: user.author_ref(),
            message: Some("let me in".to_string()),
            created_at: OffsetDateTime::now_utc(),
        };
        self.shared.lock().unwrap().join_requests.push(request.clone());
        request
    }

    pub fn seed_audit(&self, group_domain: bool, action: &str, created_at: OffsetDateTime) -> AuditEntry {
        let mut entry = BackendState::audit(&self.moderator, "advice", Uuid::new_v4(), action.to_string(), None);
        entry.created_at = created_at;
        let mut state = self.shared.lock().unwrap();
        if group_domain {
            state.group_audit.push(entry.clone());
        } else {
            state.advice_audit.push(entry.clone());
        }
        entry
    }
}

async fn record(State(shared): State<Shared>, request: Request, next: Next) -> Response {
    let key = format!("{} {}", request.method(), request.uri().path());
    let delay_key = format!(
        "{} {}",
        request.method(),
        request.uri().path_and_query().map(|target| target.as_str()).unwrap_or_default()
    );
    let (forced, delay) = {
        let mut state = shared.lock().unwrap();
        state.hits.push(key.clone());
        (state.failing.get(&key).copied(), state.delays.remove(&delay_key))
    };
    if let Some(status) = forced {
        return fail(status, "forced failure");
    }
    // the handler answers from current state; only delivery is late
    let response = next.run(request).await;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    response
}

fn api_routes() -> Router<Shared> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/advice", get(list_advice).post(create_advice))
        .route("/advice/:id", get(advice_thread))
        .route("/advice/:id/comments", post(create_comment))
        .route("/advice/:id/follow", post(follow).delete(unfollow))
        .route("/advice/:id/helpful", post(helpful))
        .route("/advice/:id/boost", post(boost))
        .route("/users/me/follows", get(my_follows))
        .route("/users/me/watchlist", get(my_watchlist))
        .route("/moderation/advice", get(moderation_queue))
        .route("/moderation/advice/:id", patch(moderate))
        .route("/moderation/advice/:id/flags", patch(set_flags))
        .route("/moderation/audit", get(moderation_audit))
        .route("/admin/overview", get(overview))
        .route("/admin/audit", get(admin_audit))
        .route("/admin/support/tickets", get(tickets))
        .route("/admin/support/tickets/:id", patch(update_ticket))
        .route("/admin/users", get(users))
        .route("/admin/users/:id/role", patch(set_role))
        .route("/admin/users/:id/status", patch(set_status))
        .route("/admin/wallets", get(wallets))
        .route("/admin/wallets/adjustments", post(adjust_wallet))
        .route("/admin/badges", get(badges))
        .route("/admin/badges/assignments", post(assign_badge))
        .route("/admin/categories", get(categories).post(create_category))
        .route("/admin/categories/:id", patch(update_category))
        .route("/admin/groups", get(groups))
        .route("/admin/groups/requests", get(join_requests))
        .route("/admin/groups/requests/:id", patch(decide_join_request))
        .route("/admin/groups/audit", get(group_audit))
        .route("/admin/groups/:id", patch(update_group))
}

// ---------------------------------------------------------------------------
// Handlers: auth
// ---------------------------------------------------------------------------

async fn login(State(shared): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = shared.lock().unwrap();
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let found = state.users.iter().find(|(user, _)| user.email == email).cloned();
    match found {
        Some((user, active)) if password == PASSWORD => ok(state.issue_grant(&user, active)),
        _ => fail(StatusCode::UNAUTHORIZED, "invalid email or password"),
    }
}

async fn register(State(shared): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = shared.lock().unwrap();
    let email = body["email"].as_str().unwrap_or_default();
    if state.users.iter().any(|(user, _)| user.email == email) {
        return fail(StatusCode::CONFLICT, "an account with this email already exists");
    }
    let user = SeedUser::new(email, body["displayName"].as_str().unwrap_or_default(), Role::Member);
    state.users.push((user.clone(), true));
    ok(state.issue_grant(&user, true))
}

async fn refresh(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = shared.lock().unwrap();
    let (user, active) = attempt!(state.caller(&headers));
    ok(state.issue_grant(&user, active))
}

async fn logout(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = shared.lock().unwrap();
    if let Some(token) = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        state.tokens.remove(token);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn me(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    let (user, active) = attempt!(state.caller(&headers));
    ok(user.current(active))
}

// ---------------------------------------------------------------------------
// Handlers: advice
// ---------------------------------------------------------------------------

async fn list_advice(State(shared): State<Shared>, Query(query): Query<HashMap<String, String>>) -> Response {
    let state = shared.lock().unwrap();
    let items: Vec<&AdviceItem> = state
        .advice
        .iter()
        .filter(|item| item.status == AdviceStatus::Approved)
        .filter(|item| match query.get("category") {
            Some(slug) => item
                .category
                .as_ref()
                .and_then(|category| category.slug.as_deref())
                == Some(slug.as_str()),
            None => true,
        })
        .collect();
    ok(items)
}

async fn create_advice(State(shared): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut state = shared.lock().unwrap();
    let (user, _) = attempt!(state.caller(&headers));
    state.last_advice_payload = Some(body.clone());

    let title = body["title"].as_str().unwrap_or_default();
    let text = body["body"].as_str().unwrap_or_default();
    if title.chars().count() < 5 || text.chars().count() < 10 {
        return fail(StatusCode::BAD_REQUEST, "title or body too short");
    }
    let now = OffsetDateTime::now_utc();
    let item = AdviceItem {
        id: Uuid::new_v4(),
        title: title.to_string(),
        body: text.to_string(),
        status: if state.approve_on_create {
            AdviceStatus::Approved
        } else {
            AdviceStatus::Pending
        },
        is_locked: false,
        is_featured: false,
        is_spam: false,
        is_boost_active: false,
        boost_expires_at: None,
        priority_tier: 0,
        is_urgent: body["isUrgent"].as_bool().unwrap_or(false),
        identity_mode: serde_json::from_value(body["identityMode"].clone()).unwrap_or(IdentityMode::Anonymous),
        author: user.author_ref(),
        category: None,
        helpful_count: 0,
        follow_count: 0,
        created_at: now,
        updated_at: now,
    };
    state.advice.push(item.clone());
    (StatusCode::CREATED, Json(item)).into_response()
}

async fn advice_thread(State(shared): State<Shared>, Path(id): Path<Uuid>) -> Response {
    let state = shared.lock().unwrap();
    let Some(advice) = state.advice.iter().find(|item| item.id == id).cloned() else {
        return fail(StatusCode::NOT_FOUND, "advice not found");
    };
    let comments: Vec<&Comment> = state.comments.iter().filter(|comment| comment.advice_id == id).collect();
    ok(json!({ "advice": advice, "comments": comments }))
}

async fn create_comment(
    State(shared): State<Shared>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = shared.lock().unwrap();
    let (user, _) = attempt!(state.caller(&headers));
    let Some(advice) = state.advice.iter().find(|item| item.id == id) else {
        return fail(StatusCode::NOT_FOUND, "advice not found");
    };
    if advice.is_locked {
        return fail(StatusCode::LOCKED, "This thread is locked.");
    }
    let parent_id: Option<Uuid> = serde_json::from_value(body["parentId"].clone()).unwrap_or(None);
    if let Some(parent_id) = parent_id {
        if !state.comments.iter().any(|comment| comment.id == parent_id && comment.advice_id == id) {
            return fail(StatusCode::BAD_REQUEST, "parent comment not found");
        }
    }
    let comment = Comment {
        id: Uuid::new_v4(),
        advice_id: id,
        body: body["body"].as_str().unwrap_or_default().to_string(),
        parent_id,
        author: user.author_ref(),
        created_at: OffsetDateTime::now_utc(),
    };
    state.comments.push(comment.clone());
    (StatusCode::CREATED, Json(comment)).into_response()
}

async fn follow(State(shared): State<Shared>, Path(id): Path<Uuid>, headers: HeaderMap) -> Response {
    let mut state = shared.lock().unwrap();
    let (user, _) = attempt!(state.caller(&headers));
    state.follows.insert((user.id, id));
    ok(json!({ "following": true }))
}

async fn unfollow(State(shared): State<Shared>, Path(id): Path<Uuid>, headers: HeaderMap) -> Response {
    let mut state = shared.lock().unwrap();
    let (user, _) = attempt!(state.caller(&headers));
    state.follows.remove(&(user.id, id));
    StatusCode::NO_CONTENT.into_response()
}

async fn helpful(State(shared): State<Shared>, Path(id): Path<Uuid>, headers: HeaderMap) -> Response {
    let mut state = shared.lock().unwrap();
    attempt!(state.caller(&headers));
    let Some(item) = state.advice.iter_mut().find(|item| item.id == id) else {
        return fail(StatusCode::NOT_FOUND, "advice not found");
    };
    item.helpful_count += 1;
    ok(json!({ "helpfulCount": item.helpful_count }))
}

async fn boost(
    State(shared): State<Shared>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = shared.lock().unwrap();
    let (user, _) = attempt!(state.caller(&headers));
    let Some(item) = state.advice.iter_mut().find(|item| item.id == id) else {
        return fail(StatusCode::NOT_FOUND, "advice not found");
    };
    if item.author.id != user.id {
        return fail(StatusCode::FORBIDDEN, "only the author can boost");
    }
    if item.status != AdviceStatus::Approved || item.is_boost_active {
        return fail(StatusCode::CONFLICT, "advice cannot be boosted right now");
    }
    let hours = body["durationHours"].as_i64().unwrap_or(24);
    let expires_at = OffsetDateTime::now_utc() + Duration::hours(hours);
    item.is_boost_active = true;
    item.boost_expires_at = Some(expires_at);
    item.priority_tier = 1;
    ok(json!({
        "adviceId": id,
        "boostExpiresAt": expires_at.format(&time::format_description::well_known::Rfc3339).unwrap(),
        "amountCents": body["priceCents"].as_i64().unwrap_or_default(),
        "checkoutUrl": format!("https://pay.example.test/checkout/{}", id),
    }))
}

async fn my_follows(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    let (user, _) = attempt!(state.caller(&headers));
    let relations: Vec<Value> = state
        .follows
        .iter()
        .filter(|(follower, _)| *follower == user.id)
        .map(|(follower, advice)| json!({ "userId": follower, "adviceId": advice }))
        .collect();
    ok(relations)
}

async fn my_watchlist(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    let (user, _) = attempt!(state.caller(&headers));
    let items: Vec<&AdviceItem> = state
        .advice
        .iter()
        .filter(|item| state.follows.contains(&(user.id, item.id)))
        .collect();
    ok(items)
}

// ---------------------------------------------------------------------------
// Handlers: moderation
// ---------------------------------------------------------------------------

async fn moderation_queue(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.staff(&headers));
    let status = query
        .get("status")
        .and_then(|status| AdviceStatus::parse(status))
        .unwrap_or(AdviceStatus::Pending);
    let items: Vec<&AdviceItem> = state.advice.iter().filter(|item| item.status == status).collect();
    ok(items)
}

async fn moderate(
    State(shared): State<Shared>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = shared.lock().unwrap();
    let actor = attempt!(state.staff(&headers));
    let Some(status) = body["status"].as_str().and_then(AdviceStatus::parse) else {
        return fail(StatusCode::BAD_REQUEST, "unknown status");
    };
    let note = body["note"].as_str().map(str::to_string);
    let Some(item) = state.advice.iter_mut().find(|item| item.id == id) else {
        return fail(StatusCode::NOT_FOUND, "advice not found");
    };
    item.status = status;
    item.updated_at = OffsetDateTime::now_utc();
    let updated = item.clone();
    let entry = BackendState::audit(&actor, "advice", id, format!("status:{}", status), note);
    state.advice_audit.push(entry);
    ok(updated)
}

async fn set_flags(
    State(shared): State<Shared>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = shared.lock().unwrap();
    let actor = attempt!(state.staff(&headers));
    let Some(item) = state.advice.iter_mut().find(|item| item.id == id) else {
        return fail(StatusCode::NOT_FOUND, "advice not found");
    };
    if let Some(value) = body["isLocked"].as_bool() {
        item.is_locked = value;
    }
    if let Some(value) = body["isFeatured"].as_bool() {
        item.is_featured = value;
    }
    if let Some(value) = body["isSpam"].as_bool() {
        item.is_spam = value;
    }
    let updated = item.clone();
    let entry = BackendState::audit(&actor, "advice", id, "flags".to_string(), Some(body.to_string()));
    state.advice_audit.push(entry);
    ok(updated)
}

async fn moderation_audit(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.staff(&headers));
    ok(&state.advice_audit)
}

// ---------------------------------------------------------------------------
// Handlers: admin
// ---------------------------------------------------------------------------

async fn overview(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.staff(&headers));
    let count_status = |status: AdviceStatus| state.advice.iter().filter(|item| item.status == status).count();
    ok(json!({
        "pendingAdvice": count_status(AdviceStatus::Pending),
        "heldAdvice": count_status(AdviceStatus::Hold),
        "openTickets": state
            .tickets
            .iter()
            .filter(|ticket| matches!(ticket.status, TicketStatus::Open | TicketStatus::InProgress))
            .count(),
        "urgentTickets": state
            .tickets
            .iter()
            .filter(|ticket| ticket.priority == TicketPriority::Urgent)
            .count(),
        "activeBoosts": state.advice.iter().filter(|item| item.is_boost_active).count(),
        "totalUsers": state.users.len(),
        "pendingJoinRequests": state.join_requests.len(),
    }))
}

async fn admin_audit(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.admin(&headers));
    ok(&state.admin_audit)
}

async fn tickets(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.staff(&headers));
    ok(&state.tickets)
}

async fn update_ticket(
    State(shared): State<Shared>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = shared.lock().unwrap();
    attempt!(state.staff(&headers));
    let Some(ticket) = state.tickets.iter_mut().find(|ticket| ticket.id == id) else {
        return fail(StatusCode::NOT_FOUND, "ticket not found");
    };
    if let Ok(status) = serde_json::from_value::<TicketStatus>(body["status"].clone()) {
        ticket.status = status;
        if ticket.first_response_at.is_none() {
            ticket.first_response_at = Some(OffsetDateTime::now_utc());
        }
    }
    if let Ok(priority) = serde_json::from_value::<TicketPriority>(body["priority"].clone()) {
        ticket.priority = priority;
    }
    if let Some(note) = body["internalNote"].as_str() {
        ticket.internal_note = Some(note.to_string());
    }
    if let Some(summary) = body["resolutionSummary"].as_str() {
        ticket.resolution_summary = Some(summary.to_string());
    }
    ok(ticket.clone())
}

async fn users(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.admin(&headers));
    let users: Vec<AdminUser> = state
        .users
        .iter()
        .filter_map(|(user, _)| state.admin_user(user.id))
        .collect();
    ok(users)
}

async fn set_role(
    State(shared): State<Shared>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = shared.lock().unwrap();
    attempt!(state.admin(&headers));
    let Ok(role) = serde_json::from_value::<Role>(body["role"].clone()) else {
        return fail(StatusCode::BAD_REQUEST, "unknown role");
    };
    let Some((user, _)) = state.users.iter_mut().find(|(user, _)| user.id == id) else {
        return fail(StatusCode::NOT_FOUND, "user not found");
    };
    user.role = role;
    ok(state.admin_user(id))
}

async fn set_status(
    State(shared): State<Shared>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = shared.lock().unwrap();
    attempt!(state.admin(&headers));
    let Some(entry) = state.users.iter_mut().find(|(user, _)| user.id == id) else {
        return fail(StatusCode::NOT_FOUND, "user not found");
    };
    entry.1 = body["isActive"].as_bool().unwrap_or(entry.1);
    ok(state.admin_user(id))
}

async fn wallets(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.admin(&headers));
    ok(&state.wallets)
}

async fn adjust_wallet(State(shared): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut state = shared.lock().unwrap();
    let actor = attempt!(state.admin(&headers));
    let Ok(user_id) = serde_json::from_value::<Uuid>(body["userId"].clone()) else {
        return fail(StatusCode::BAD_REQUEST, "userId is required");
    };
    let amount = body["amountCents"].as_i64().unwrap_or_default();
    let Some(wallet) = state.wallets.iter_mut().find(|wallet| wallet.user_id == user_id) else {
        return fail(StatusCode::NOT_FOUND, "wallet not found");
    };
    wallet.balance_cents += amount;
    let updated = wallet.clone();
    let reason = body["reason"].as_str().map(str::to_string);
    let entry = BackendState::audit(&actor, "wallet", user_id, format!("adjust:{}", amount), reason);
    state.admin_audit.push(entry);
    ok(updated)
}

async fn badges(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.admin(&headers));
    ok(&state.badges)
}

async fn assign_badge(State(shared): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut state = shared.lock().unwrap();
    attempt!(state.admin(&headers));
    state.badge_assignments.push(body);
    StatusCode::NO_CONTENT.into_response()
}

async fn categories(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.admin(&headers));
    ok(&state.categories)
}

async fn create_category(State(shared): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut state = shared.lock().unwrap();
    attempt!(state.admin(&headers));
    let slug = body["slug"].as_str().unwrap_or_default().to_string();
    if state.categories.iter().any(|category| category.slug == slug) {
        return fail(StatusCode::CONFLICT, "A category with this slug already exists.");
    }
    let category = Category {
        id: Uuid::new_v4(),
        name: body["name"].as_str().unwrap_or_default().to_string(),
        slug,
        is_active: true,
    };
    state.categories.push(category.clone());
    (StatusCode::CREATED, Json(category)).into_response()
}

async fn update_category(
    State(shared): State<Shared>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = shared.lock().unwrap();
    attempt!(state.admin(&headers));
    let Some(category) = state.categories.iter_mut().find(|category| category.id == id) else {
        return fail(StatusCode::NOT_FOUND, "category not found");
    };
    category.is_active = body["isActive"].as_bool().unwrap_or(category.is_active);
    ok(category.clone())
}

async fn groups(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.admin(&headers));
    ok(&state.groups)
}

async fn update_group(
    State(shared): State<Shared>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = shared.lock().unwrap();
    let actor = attempt!(state.admin(&headers));
    let Ok(status) = serde_json::from_value::<GroupStatus>(body["status"].clone()) else {
        return fail(StatusCode::BAD_REQUEST, "unknown status");
    };
    let Some(group) = state.groups.iter_mut().find(|group| group.id == id) else {
        return fail(StatusCode::NOT_FOUND, "group not found");
    };
    group.status = status;
    let updated = group.clone();
    let entry = BackendState::audit(&actor, "group", id, format!("status:{:?}", status), None);
    state.group_audit.push(entry);
    ok(updated)
}

async fn join_requests(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.staff(&headers));
    ok(&state.join_requests)
}

async fn decide_join_request(
    State(shared): State<Shared>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = shared.lock().unwrap();
    let actor = attempt!(state.staff(&headers));
    let Some(position) = state.join_requests.iter().position(|request| request.id == id) else {
        return fail(StatusCode::NOT_FOUND, "join request not found");
    };
    let request = state.join_requests.remove(position);
    let decision = body["decision"].as_str().unwrap_or("APPROVE").to_ascii_lowercase();
    let entry = BackendState::audit(&actor, "group", request.group_id, format!("join:{}", decision), None);
    state.group_audit.push(entry);
    StatusCode::NO_CONTENT.into_response()
}

async fn group_audit(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = shared.lock().unwrap();
    attempt!(state.staff(&headers));
    ok(&state.group_audit)
}

// ---------------------------------------------------------------------------
// Flaky front door
// ---------------------------------------------------------------------------

/// A base address whose first `drop_first` connections are closed without a
/// response. Later connections are relayed to `backend`.
pub async fn flaky_base(backend: &Backend, drop_first: usize) -> String {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let upstream = backend.addr;
    let accepted = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        loop {
            let Ok((mut inbound, _)) = listener.accept().await else {
                return;
            };
            if accepted.fetch_add(1, Ordering::SeqCst) < drop_first {
                drop(inbound);
                continue;
            }
            tokio::spawn(async move {
                if let Ok(mut outbound) = tokio::net::TcpStream::connect(upstream).await {
                    let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                }
            });
        }
    });

    format!("http://{}/api", addr)
}
