//! Authentication for the estate client
//!
//! This module holds the auth context (current user, token lifecycle,
//! OTP login), token expiry checks and the protected-route guard.

mod context;
mod guard;
mod models;
pub mod token;

pub use context::{AuthContext, LoginOutcome, DEFAULT_LANDING};
pub use guard::{Access, RouteGuard, LOGIN_PATH};
pub use models::{Role, User};
