//! Rate-limited gateway to the backend REST API.
//!
//! Every call passes the sliding-window limiter, picks up the bearer
//! token from the store and comes back as an [`ApiResponse`].

mod client;
mod rate_limit;

pub use client::{ApiClient, ApiResponse, CallOptions};
pub use rate_limit::{OverflowMode, RateLimitConfig, RateLimitState, RateLimiter};
