pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use std::sync::Arc;

use crate::app::{
    admin::AdminService,
    advice::{AdviceService, AuthoringOptions},
    auth::AuthService,
    follows::FollowRegistry,
    moderation::ModerationQueue,
    threads::ThreadView,
    workspace::AdminWorkspace,
};
use crate::config::ClientConfig;
use crate::domain::user::CurrentUser;
use crate::http::{ApiError, FallbackPolicy, Gateway, RawSubmitter};
use crate::infra::{notify::Notifier, session::Session};

/// Shared handles every service is built from.
#[derive(Clone)]
pub struct AppState {
    pub config: ClientConfig,
    pub session: Arc<Session>,
    pub gateway: Gateway,
    pub raw: RawSubmitter,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(
        config: ClientConfig,
        session: Arc<Session>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ApiError> {
        let policy = FallbackPolicy::from_config(&config);
        Self::with_policy(config, policy, session, notifier)
    }

    /// Like [`AppState::new`] with an explicit address list.
    pub fn with_policy(
        config: ClientConfig,
        policy: FallbackPolicy,
        session: Arc<Session>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ApiError> {
        let timeout = config.request_timeout();
        let gateway = Gateway::with_policy(policy.clone(), timeout, session.clone())?;
        let raw = RawSubmitter::new(policy, timeout, session.clone());

        Ok(Self {
            config,
            session,
            gateway,
            raw,
            notifier,
        })
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.gateway.clone())
    }

    pub fn advice(&self) -> AdviceService {
        AdviceService::new(
            self.gateway.clone(),
            self.raw.clone(),
            AuthoringOptions::from_config(&self.config),
        )
    }

    pub fn admin(&self) -> AdminService {
        AdminService::new(self.gateway.clone())
    }

    pub fn follows(&self) -> FollowRegistry {
        FollowRegistry::new(self.advice())
    }

    pub fn thread_view(&self) -> ThreadView {
        ThreadView::new(self.advice())
    }

    pub fn moderation_queue(&self) -> ModerationQueue {
        ModerationQueue::new(self.advice(), self.admin(), self.notifier.clone())
    }

    pub fn workspace(&self, user: CurrentUser) -> AdminWorkspace {
        AdminWorkspace::new(user, self.admin(), self.moderation_queue(), self.notifier.clone())
    }
}
