pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod payments;
pub mod relationships;
pub mod session;
pub mod storage;

use std::sync::Arc;

use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{Access, AuthContext, LoginOutcome, Role, RouteGuard, User};
pub use gateway::{ApiClient, ApiResponse, CallOptions, RateLimitConfig, RateLimiter};
pub use relationships::{Relationship, RelationshipResolver};
pub use session::{SessionConfig, SessionEvent, SessionHandle};

use storage::{FileStore, SealedStore, Sealer, Store};

/// Everything a signed-in client needs, wired from one `Settings`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub client: Arc<ApiClient>,
    pub auth: Arc<AuthContext>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let file = FileStore::open(&config.storage.path).await?;
        let store: Arc<dyn Store> = match &config.storage.passphrase {
            Some(passphrase) => Arc::new(SealedStore::new(file, Sealer::from_passphrase(passphrase))),
            None => Arc::new(file),
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: Settings, store: Arc<dyn Store>) -> Result<Self> {
        let client = Arc::new(ApiClient::new(
            &config.api,
            RateLimitConfig::from(&config.rate_limit),
            store,
        )?);
        let leeway = chrono::Duration::seconds(config.auth.token_leeway_secs);
        let auth = Arc::new(AuthContext::new(client.clone(), leeway));

        Ok(Self {
            config: Arc::new(config),
            client,
            auth,
        })
    }

    pub fn route_guard(&self) -> RouteGuard {
        RouteGuard::new(self.auth.clone())
    }

    pub fn payments(&self) -> payments::PaymentService {
        payments::PaymentService::new(self.client.clone(), self.config.payments.clone())
    }

    /// Starts the inactivity monitor for the current login.
    pub fn start_session(&self) -> Result<SessionHandle> {
        let session = SessionConfig::from(&self.config.session);
        session.validate()?;
        info!("Watching for inactivity: warn after {:?}, log out after {:?}", session.warning_after, session.timeout_after);
        Ok(session::spawn_monitor(session, self.auth.clone(), self.client.store().clone()))
    }
}
