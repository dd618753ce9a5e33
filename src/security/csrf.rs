//! CSRF protection — token issuance and validation middleware.
//!
//! Tokens live in a [`CsrfTokens`] store owned by the integrator and shared
//! (via `Arc`) between the issuing and validating middleware. The store's key
//! set is guarded by a reader/writer lock: validation on the hot path takes
//! the read side, issuance the write side.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::{
    Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

/// Number of random characters in a generated CSRF token.
pub const CSRF_TOKEN_LENGTH: usize = 43;

/// Request/response header carrying the CSRF token.
pub const CSRF_TOKEN_HEADER: &str = "X-CSRF-Token";

/// A concurrent set of valid CSRF tokens.
///
/// Construct one per server instance and share it between [`CsrfIssue`] and
/// [`CsrfProtect`]; there is deliberately no process-wide store.
///
/// # Examples
///
/// ```
/// use rill::security::CsrfTokens;
///
/// let tokens = CsrfTokens::new();
/// let token = tokens.issue();
/// assert!(tokens.validate(&token));
/// assert!(!tokens.validate("forged"));
/// ```
#[derive(Default)]
pub struct CsrfTokens {
    tokens: RwLock<HashSet<String>>,
}

impl CsrfTokens {
    /// Creates an empty token store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a new random token, records it as valid, and returns it.
    pub fn issue(&self) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CSRF_TOKEN_LENGTH)
            .map(char::from)
            .collect();
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone());
        token
    }

    /// Returns `true` if `token` was issued by this store.
    pub fn validate(&self, token: &str) -> bool {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(token)
    }

    /// Returns the number of outstanding tokens.
    pub fn len(&self) -> usize {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no tokens have been issued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Middleware that mints a CSRF token per request and exposes it in the
/// `X-CSRF-Token` response header for the client to echo back.
pub struct CsrfIssue {
    tokens: Arc<CsrfTokens>,
}

impl CsrfIssue {
    /// Creates the issuing middleware over a shared token store.
    pub fn new(tokens: Arc<CsrfTokens>) -> Self {
        Self { tokens }
    }
}

impl Middleware for CsrfIssue {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let token = self.tokens.issue();
        Box::pin(async move {
            let mut response = next.run(ctx).await;
            response.add_header(CSRF_TOKEN_HEADER, token);
            response
        })
    }
}

/// Middleware that rejects state-mutating requests (POST, PUT, DELETE,
/// PATCH) whose `X-CSRF-Token` header is missing or was not issued by the
/// shared store. Safe methods pass through unchallenged.
pub struct CsrfProtect {
    tokens: Arc<CsrfTokens>,
}

impl CsrfProtect {
    /// Creates the validating middleware over a shared token store.
    pub fn new(tokens: Arc<CsrfTokens>) -> Self {
        Self { tokens }
    }
}

impl Middleware for CsrfProtect {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        if ctx.request().method().is_mutating() {
            let valid = ctx
                .request()
                .headers()
                .get(CSRF_TOKEN_HEADER)
                .is_some_and(|token| self.tokens.validate(token));
            if !valid {
                return Box::pin(async {
                    Response::new(StatusCode::Forbidden).body("CSRF token invalid")
                });
            }
        }
        Box::pin(next.run(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;
    use crate::middleware::{MiddlewareHandler, from_middleware};

    fn make_ctx(method: &str, token: Option<&str>) -> Context {
        let token_header = token
            .map(|t| format!("{CSRF_TOKEN_HEADER}: {t}\r\n"))
            .unwrap_or_default();
        let raw = format!("{method} /form HTTP/1.1\r\nHost: x\r\n{token_header}\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    fn ok_terminal() -> MiddlewareHandler {
        Arc::new(|_ctx, _next| Box::pin(async { Response::new(StatusCode::Ok) }))
    }

    #[test]
    fn issued_tokens_validate() {
        let tokens = CsrfTokens::new();
        let a = tokens.issue();
        let b = tokens.issue();
        assert_ne!(a, b);
        assert_eq!(a.len(), CSRF_TOKEN_LENGTH);
        assert!(tokens.validate(&a));
        assert!(tokens.validate(&b));
        assert!(!tokens.validate("forged"));
        assert_eq!(tokens.len(), 2);
    }

    #[tokio::test]
    async fn issue_middleware_sets_response_header() {
        let tokens = Arc::new(CsrfTokens::new());
        let chain = vec![
            from_middleware(Arc::new(CsrfIssue::new(Arc::clone(&tokens)))),
            ok_terminal(),
        ];
        let res = Next::new(chain).run(make_ctx("GET", None)).await;

        let issued = res.headers().get("x-csrf-token").unwrap();
        assert!(tokens.validate(issued));
    }

    #[tokio::test]
    async fn mutating_request_without_token_rejected() {
        let tokens = Arc::new(CsrfTokens::new());
        let chain = vec![
            from_middleware(Arc::new(CsrfProtect::new(tokens))),
            ok_terminal(),
        ];
        let res = Next::new(chain).run(make_ctx("POST", None)).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
    }

    #[tokio::test]
    async fn mutating_request_with_issued_token_passes() {
        let tokens = Arc::new(CsrfTokens::new());
        let token = tokens.issue();
        let chain = vec![
            from_middleware(Arc::new(CsrfProtect::new(tokens))),
            ok_terminal(),
        ];
        let res = Next::new(chain).run(make_ctx("POST", Some(&token))).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn safe_methods_pass_unchallenged() {
        let tokens = Arc::new(CsrfTokens::new());
        let chain = vec![
            from_middleware(Arc::new(CsrfProtect::new(tokens))),
            ok_terminal(),
        ];
        let res = Next::new(chain).run(make_ctx("GET", None)).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }
}
