//! Stripe Checkout handshake.
//!
//! The backend creates the hosted checkout session; the browser is sent to
//! Stripe and comes back on the success or cancel URL.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use crate::config::PaymentsConfig;
use crate::error::ApiError;
use crate::gateway::{ApiClient, CallOptions};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    #[serde(other)]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentVerification {
    pub status: PaymentStatus,
    #[serde(default)]
    pub plan: Option<String>,
}

/// Where the checkout redirect landed the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutReturn {
    Success { session_id: String },
    Cancelled,
    Unknown,
}

impl CheckoutReturn {
    pub fn from_url(url: &Url) -> Self {
        let mut payment = None;
        let mut session_id = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "payment" => payment = Some(value.into_owned()),
                "session_id" => session_id = Some(value.into_owned()),
                _ => {}
            }
        }

        match (payment.as_deref(), session_id) {
            (Some("success"), Some(session_id)) if !session_id.is_empty() => CheckoutReturn::Success { session_id },
            (Some("cancelled" | "canceled"), _) => CheckoutReturn::Cancelled,
            _ => CheckoutReturn::Unknown,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        Ok(Self::from_url(&Url::parse(raw)?))
    }
}

pub struct PaymentService {
    client: Arc<ApiClient>,
    config: PaymentsConfig,
}

impl PaymentService {
    pub fn new(client: Arc<ApiClient>, config: PaymentsConfig) -> Self {
        Self { client, config }
    }

    pub async fn create_checkout(&self, plan: &str) -> Result<CheckoutSession, ApiError> {
        let body = json!({
            "plan": plan,
            "success_url": self.config.success_url,
            "cancel_url": self.config.cancel_url,
        });
        let session: CheckoutSession = self
            .client
            .call_strict("payments/create-checkout-session", CallOptions::post(body))
            .await?;
        info!("Created checkout session {} for plan {}", session.session_id, plan);
        Ok(session)
    }

    pub async fn verify(&self, session_id: &str) -> Result<PaymentVerification, ApiError> {
        let verification: PaymentVerification = self
            .client
            .call_strict("payments/verify", CallOptions::get().query("session_id", session_id))
            .await?;
        if verification.status != PaymentStatus::Paid {
            warn!("Checkout session {} is {:?}", session_id, verification.status);
        }
        Ok(verification)
    }
}
