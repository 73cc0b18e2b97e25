use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuthError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Option<Value>, // backend user id, number or string
    pub exp: Option<i64>,   // Expiration time
    pub iat: Option<i64>,   // Issued at
}

/// Reads the claims of a bearer token without checking its signature.
///
/// The signing secret never leaves the backend; the client only needs
/// `exp` to decide whether the session is still worth using.
pub fn read_claims(token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|_| AuthError::InvalidToken)?;

    Ok(data.claims)
}

pub fn expires_at(token: &str) -> Result<DateTime<Utc>, AuthError> {
    let exp = read_claims(token)?.exp.ok_or(AuthError::InvalidToken)?;
    Utc.timestamp_opt(exp, 0).single().ok_or(AuthError::InvalidToken)
}

/// Fails with `TokenExpired` once `now + leeway` has reached the expiry.
pub fn check_expiry(token: &str, now: DateTime<Utc>, leeway: Duration) -> Result<DateTime<Utc>, AuthError> {
    let expiry = expires_at(token)?;
    if now + leeway >= expiry {
        return Err(AuthError::TokenExpired);
    }
    Ok(expiry)
}
