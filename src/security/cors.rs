//! Cross-Origin Resource Sharing middleware.

use std::pin::Pin;

use crate::{
    Response,
    context::Context,
    middleware::{Middleware, Next},
};

/// CORS middleware — validates the `Origin` header against an allow-list,
/// short-circuits preflight requests, and injects `Access-Control-*` headers.
///
/// # Behavior
///
/// - No `Origin` header → the request passes through unmodified; CORS does
///   not apply to same-origin traffic.
/// - Origin not in the allow-list → `403 Forbidden` short-circuit; the
///   downstream handler is **not** called.
/// - `OPTIONS` preflight from an allowed origin → `204 No Content`
///   short-circuit with the `Access-Control-Allow-*` headers and
///   `Access-Control-Allow-Credentials: true`.
/// - Any other request from an allowed origin → the handler runs normally
///   and the `Access-Control-Allow-*` headers are appended to its response,
///   echoing the request origin.
///
/// The allow-list entry `"*"` accepts every origin.
///
/// # Examples
///
/// ```rust,no_run
/// use rill::security::Cors;
///
/// let cors = Cors::new()
///     .allow_origin("https://app.example.com")
///     .allow_method("PATCH")
///     .allow_header("X-Request-Id");
/// ```
pub struct Cors {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
}

impl Default for Cors {
    fn default() -> Self {
        Self::new()
    }
}

impl Cors {
    /// Creates a CORS policy with an empty origin allow-list, common methods,
    /// and common headers. Add origins with [`allow_origin`](Self::allow_origin)
    /// (or `"*"` for all).
    pub fn new() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
                "DELETE".to_string(),
            ],
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
        }
    }

    /// Adds an allowed origin. Pass `"*"` to permit all origins.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Adds an allowed HTTP method, sent verbatim in
    /// `Access-Control-Allow-Methods`.
    #[must_use]
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.push(method.into());
        self
    }

    /// Adds an allowed request header, sent verbatim in
    /// `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed == origin)
    }
}

impl Middleware for Cors {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let Some(origin) = ctx.request().headers().get("origin").map(str::to_owned) else {
            return Box::pin(next.run(ctx));
        };

        if !self.origin_allowed(&origin) {
            return Box::pin(async {
                Response::new(crate::StatusCode::Forbidden).body("CORS origin not allowed")
            });
        }

        let methods = self.allowed_methods.join(",");
        let headers = self.allowed_headers.join(",");

        Box::pin(async move {
            if ctx.request().method() == &crate::Method::Options {
                return Response::new(crate::StatusCode::NoContent)
                    .header("Access-Control-Allow-Origin", &origin)
                    .header("Access-Control-Allow-Methods", &methods)
                    .header("Access-Control-Allow-Headers", &headers)
                    .header("Access-Control-Allow-Credentials", "true");
            }

            let mut response = next.run(ctx).await;
            response.add_header("Access-Control-Allow-Origin", &origin);
            response.add_header("Access-Control-Allow-Methods", &methods);
            response.add_header("Access-Control-Allow-Headers", &headers);
            response
        })
    }
}
