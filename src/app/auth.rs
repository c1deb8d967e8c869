use serde::Serialize;
use tracing::{info, warn};

use crate::domain::user::{AuthGrant, CurrentUser, RegisterRequest};
use crate::http::{routes, ApiError, Gateway};

const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// The only writer of the session credential.
#[derive(Clone)]
pub struct AuthService {
    gateway: Gateway,
}

impl AuthService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, ApiError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ApiError::validation("email and password are required"));
        }

        let grant: AuthGrant = self
            .gateway
            .post(routes::LOGIN, &LoginRequest { email, password })
            .await?;
        Ok(self.accept(grant))
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<CurrentUser, ApiError> {
        if request.email.trim().is_empty() || request.display_name.trim().is_empty() {
            return Err(ApiError::validation("email and display name are required"));
        }
        if request.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(ApiError::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_CHARS
            )));
        }

        let grant: AuthGrant = self.gateway.post(routes::REGISTER, request).await?;
        Ok(self.accept(grant))
    }

    pub async fn refresh(&self) -> Result<CurrentUser, ApiError> {
        let grant: AuthGrant = self
            .gateway
            .post(routes::REFRESH, &serde_json::json!({}))
            .await?;
        Ok(self.accept(grant))
    }

    /// Signs out locally even when the server cannot be told.
    pub async fn logout(&self) {
        if let Err(err) = self
            .gateway
            .post::<_, Option<serde_json::Value>>(routes::LOGOUT, &serde_json::json!({}))
            .await
        {
            warn!(error = %err, "logout request failed, clearing local session anyway");
        }
        self.gateway.session().clear();
        info!("signed out");
    }

    /// Current identity, or `None` when signed out. A rejected credential is
    /// dropped from the session.
    pub async fn me(&self) -> Result<Option<CurrentUser>, ApiError> {
        if !self.gateway.session().is_authenticated() {
            return Ok(None);
        }
        match self.gateway.get::<CurrentUser>(routes::ME).await {
            Ok(user) => Ok(Some(user)),
            Err(err) if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED) => {
                warn!("stored credential rejected, clearing session");
                self.gateway.session().clear();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn accept(&self, grant: AuthGrant) -> CurrentUser {
        self.gateway.session().set_token(grant.token);
        info!(user_id = %grant.user.id, role = ?grant.user.role, "signed in");
        grant.user
    }
}
