//! Security middleware — CORS, CSRF protection, and rate limiting.
//!
//! Each of these is an ordinary [`Middleware`](crate::middleware::Middleware)
//! implementation; register them at the router or group level like any other
//! layer. All state is instance-owned — there are no process-wide token sets
//! or limiters, so independent routers can carry independent policies.

pub mod cors;
pub mod csrf;
pub mod rate_limit;

pub use cors::Cors;
pub use csrf::{CsrfIssue, CsrfProtect, CsrfTokens};
pub use rate_limit::RateLimiter;
