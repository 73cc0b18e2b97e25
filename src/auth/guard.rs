use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::context::{AuthContext, DEFAULT_LANDING};
use super::models::{Role, User};
use crate::error::AppError;

pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Granted(User),
    Redirect(String),
}

/// Gatekeeper for protected paths.
pub struct RouteGuard {
    auth: Arc<AuthContext>,
}

impl RouteGuard {
    pub fn new(auth: Arc<AuthContext>) -> Self {
        Self { auth }
    }

    pub async fn check(&self, path: &str, required: Option<Role>) -> Access {
        self.check_at(path, required, Utc::now()).await
    }

    pub async fn check_at(&self, path: &str, required: Option<Role>, now: DateTime<Utc>) -> Access {
        let user = match self.auth.validate_session_at(now).await {
            Ok(user) => user,
            Err(e) => {
                match &e {
                    AppError::AuthError(reason) => info!("Access to {} denied: {}", path, reason),
                    other => warn!("Session check for {} failed: {}", path, other),
                }
                if let Err(e) = self.auth.save_return_url(path).await {
                    warn!("Could not remember return path {}: {}", path, e);
                }
                return Access::Redirect(LOGIN_PATH.to_string());
            }
        };

        match required {
            Some(role) if !user.has_role(role) => {
                warn!("{} lacks role {:?} for {}", user.email, role, path);
                Access::Redirect(DEFAULT_LANDING.to_string())
            }
            _ => Access::Granted(user),
        }
    }
}
