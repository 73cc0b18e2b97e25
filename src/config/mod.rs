use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::{OverflowMode, RateLimitConfig};
use crate::session::SessionConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    pub window_ms: u64,
    pub max_requests: u32,
    pub mode: OverflowMode,
    pub max_queued: usize,
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(s: &RateLimitSettings) -> Self {
        RateLimitConfig {
            window: Duration::from_millis(s.window_ms),
            max_requests: s.max_requests,
            mode: s.mode,
            max_queued: s.max_queued,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionSettings {
    pub warning_after_secs: u64,
    pub timeout_after_secs: u64,
}

impl From<&SessionSettings> for SessionConfig {
    fn from(s: &SessionSettings) -> Self {
        SessionConfig {
            warning_after: Duration::from_secs(s.warning_after_secs),
            timeout_after: Duration::from_secs(s.timeout_after_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub token_leeway_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// When set, values are sealed with a key derived from this passphrase.
    pub passphrase: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub api: ApiConfig,
    pub rate_limit: RateLimitSettings,
    pub session: SessionSettings,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub payments: PaymentsConfig,
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    environment: &str,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    builder
        .set_default("environment", environment)?
        .set_default("api.base_url", "https://x8ki-letl-twmt.n7.xano.io/api:estate")?
        .set_default("api.timeout_secs", 30)?
        .set_default("rate_limit.window_ms", 60_000)?
        .set_default("rate_limit.max_requests", 60)?
        .set_default("rate_limit.mode", "queue")?
        .set_default("rate_limit.max_queued", 100)?
        .set_default("session.warning_after_secs", 25 * 60)?
        .set_default("session.timeout_after_secs", 30 * 60)?
        .set_default("auth.token_leeway_secs", 30)?
        .set_default("storage.path", ".estate/session.json")?
        .set_default("payments.success_url", "http://localhost:5173/payment?payment=success&session_id={CHECKOUT_SESSION_ID}")?
        .set_default("payments.cancel_url", "http://localhost:5173/payment?payment=cancelled")
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = with_defaults(Config::builder(), "development")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // E.g., `APP_API__BASE_URL=http://localhost:9000` sets `Settings.api.base_url`
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults only, pointed at the given backend. No files, no environment.
    pub fn for_base_url(base_url: &str) -> Result<Self, ConfigError> {
        let settings: Settings = with_defaults(Config::builder(), "test")?
            .set_override("api.base_url", base_url)?
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::Message("rate_limit.max_requests must be positive".into()));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(ConfigError::Message("rate_limit.window_ms must be positive".into()));
        }
        if self.session.warning_after_secs >= self.session.timeout_after_secs {
            return Err(ConfigError::Message(
                "session.warning_after_secs must be below session.timeout_after_secs".into(),
            ));
        }
        Ok(())
    }
}
