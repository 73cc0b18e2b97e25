use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::models::{AuthResponse, LoginRequest, OtpRequest, SignupRequest, User};
use super::token;
use crate::error::{ApiError, AppError, AuthError};
use crate::gateway::{ApiClient, CallOptions};
use crate::session::SessionTerminator;
use crate::storage::{Store, AUTH_TOKEN_KEY, INACTIVITY_WARNING_KEY, RETURN_URL_KEY, USER_DETAILS_KEY};
use crate::Result;

pub const DEFAULT_LANDING: &str = "/dashboard";

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Authenticated(User),
    /// Password accepted; the backend sent a one-time password to the user.
    OtpRequired,
}

/// Who is signed in, and the persisted session behind it.
///
/// Created once at startup, restored from the store, torn down on logout.
pub struct AuthContext {
    client: Arc<ApiClient>,
    store: Arc<dyn Store>,
    current: RwLock<Option<User>>,
    leeway: Duration,
}

impl AuthContext {
    pub fn new(client: Arc<ApiClient>, leeway: Duration) -> Self {
        let store = client.store().clone();
        Self {
            client,
            store,
            current: RwLock::new(None),
            leeway,
        }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub async fn current_user(&self) -> Option<User> {
        self.current.read().await.clone()
    }

    pub async fn token(&self) -> Result<Option<String>> {
        Ok(self.store.get(AUTH_TOKEN_KEY).await?)
    }

    /// Picks up a session left in the store by a previous run.
    pub async fn restore(&self) -> Result<Option<User>> {
        match self.validate_session_at(Utc::now()).await {
            Ok(user) => {
                info!("Restored session for {}", user.email);
                Ok(Some(user))
            }
            Err(AppError::AuthError(e)) => {
                info!("No usable stored session: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        info!("Login attempt for {}", email);
        let body = json!(LoginRequest { email, password });
        let response: AuthResponse = self
            .client
            .call_strict("auth/login", CallOptions::post(body).unauthenticated())
            .await
            .map_err(credentials_error)?;

        if response.otp_required {
            info!("One-time password required for {}", email);
            return Ok(LoginOutcome::OtpRequired);
        }

        let token = response
            .auth_token
            .ok_or_else(|| AuthError::UnexpectedResponse("missing authToken".into()))?;
        let user = self.establish(&token).await?;
        Ok(LoginOutcome::Authenticated(user))
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<User> {
        let body = json!(OtpRequest { email, otp });
        let response: AuthResponse = self
            .client
            .call_strict("auth/verify-otp", CallOptions::post(body).unauthenticated())
            .await
            .map_err(credentials_error)?;

        let token = response
            .auth_token
            .ok_or_else(|| AuthError::UnexpectedResponse("missing authToken".into()))?;
        self.establish(&token).await
    }

    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<User> {
        info!("Signing up {}", email);
        let body = json!(SignupRequest { name, email, password });
        let response: AuthResponse = self
            .client
            .call_strict("auth/signup", CallOptions::post(body).unauthenticated())
            .await?;

        let token = response
            .auth_token
            .ok_or_else(|| AuthError::UnexpectedResponse("missing authToken".into()))?;
        self.establish(&token).await
    }

    /// Stores a freshly issued token and loads the user behind it.
    async fn establish(&self, auth_token: &str) -> Result<User> {
        token::check_expiry(auth_token, Utc::now(), self.leeway)?;
        self.store.set(AUTH_TOKEN_KEY, auth_token).await?;

        let user = match self.refresh_user().await {
            Ok(user) => user,
            Err(e) => {
                error!("Could not load user after login: {}", e);
                self.clear_session().await?;
                return Err(e);
            }
        };

        info!("Logged in as {} ({:?})", user.email, user.role);
        Ok(user)
    }

    /// Reloads the user from the backend and caches it.
    pub async fn refresh_user(&self) -> Result<User> {
        let user: User = self.client.call_strict("auth/me", CallOptions::get()).await?;
        self.store.set(USER_DETAILS_KEY, &serde_json::to_string(&user).map_err(|e| AppError::InternalError(e.to_string()))?).await?;
        *self.current.write().await = Some(user.clone());
        Ok(user)
    }

    /// Checks the stored token against `now` and returns the cached user.
    /// An unusable token clears the session.
    pub async fn validate_session_at(&self, now: DateTime<Utc>) -> Result<User> {
        let Some(auth_token) = self.store.get(AUTH_TOKEN_KEY).await? else {
            return Err(AuthError::NotAuthenticated.into());
        };

        if let Err(e) = token::check_expiry(&auth_token, now, self.leeway) {
            warn!("Stored token rejected: {}", e);
            self.clear_session().await?;
            return Err(e.into());
        }

        if let Some(user) = self.current_user().await {
            return Ok(user);
        }

        let cached = self.store.get(USER_DETAILS_KEY).await?;
        match cached.as_deref().map(serde_json::from_str::<User>) {
            Some(Ok(user)) => {
                *self.current.write().await = Some(user.clone());
                Ok(user)
            }
            Some(Err(e)) => {
                warn!("Discarding unreadable cached user: {}", e);
                self.refresh_user().await
            }
            None => self.refresh_user().await,
        }
    }

    pub async fn logout(&self) -> Result<()> {
        if let Some(user) = self.current_user().await {
            info!("Logging out {}", user.email);
        }
        self.clear_session().await
    }

    async fn clear_session(&self) -> Result<()> {
        *self.current.write().await = None;
        self.store.remove(AUTH_TOKEN_KEY).await?;
        self.store.remove(USER_DETAILS_KEY).await?;
        self.store.remove(INACTIVITY_WARNING_KEY).await?;
        Ok(())
    }

    pub async fn save_return_url(&self, path: &str) -> Result<()> {
        Ok(self.store.set(RETURN_URL_KEY, path).await?)
    }

    /// Where to go after login; consumed on read.
    pub async fn take_return_url(&self) -> Result<String> {
        let saved = self.store.get(RETURN_URL_KEY).await?;
        self.store.remove(RETURN_URL_KEY).await?;
        Ok(saved.unwrap_or_else(|| DEFAULT_LANDING.to_string()))
    }
}

#[async_trait]
impl SessionTerminator for AuthContext {
    async fn terminate(&self) {
        if let Err(e) = self.logout().await {
            error!("Forced logout failed: {}", e);
        }
    }
}

fn credentials_error(err: ApiError) -> AppError {
    match err {
        ApiError::Status { status: 401 | 403, .. } => AuthError::InvalidCredentials.into(),
        other => other.into(),
    }
}
