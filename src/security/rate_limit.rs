//! Token-bucket rate limiting middleware.

use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use tokio::time::Instant;

use crate::{
    Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

// Bucket state: fractional tokens plus the instant of the last refill.
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter middleware.
///
/// The bucket holds up to `burst` tokens and refills at `rate` tokens per
/// second. Each request consumes one token; a request arriving with the
/// bucket empty is rejected with a `429` JSON error envelope
/// (`{"error":"Too many requests"}`) without reaching the handler.
///
/// The limiter is instance-owned: register one at the router level for a
/// global policy, or per group/route for scoped policies.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rill::{Router, middleware::from_middleware, security::RateLimiter};
///
/// let mut router = Router::new();
/// router.use_middleware(from_middleware(Arc::new(RateLimiter::new(50.0, 100))));
/// ```
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    rate: f64,
    burst: f64,
}

impl RateLimiter {
    /// Creates a limiter refilling at `rate` tokens per second with a
    /// capacity of `burst`. The bucket starts full.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
            rate,
            burst: f64::from(burst),
        }
    }

    /// Attempts to take one token, refilling the bucket by elapsed time first.
    /// Returns `false` when the bucket is empty.
    pub fn allow(&self) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl Middleware for RateLimiter {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        if !self.allow() {
            return Box::pin(async {
                Response::json_error(StatusCode::TooManyRequests, "Too many requests")
            });
        }
        Box::pin(next.run(ctx))
    }
}
