pub mod auth_service;
pub mod login_limiter;

pub use auth_service::{AuthError, AuthService};
pub use login_limiter::LoginRateLimiter;
