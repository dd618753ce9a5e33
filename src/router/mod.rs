//! Request routing — map URL patterns and HTTP methods to handler functions,
//! with scoped dependency injection and layered middleware.
//!
//! This module provides [`Router`], which dispatches incoming HTTP requests
//! based on method and path. Two pattern styles are supported:
//!
//! | Pattern       | Example match | Captured params |
//! |---------------|---------------|-----------------|
//! | `/users`      | `/users`      | *(none)*        |
//! | `/users/:id`  | `/users/42`   | `id → "42"`     |
//!
//! Segment counts are fixed per pattern; there are no wildcards. Dispatch
//! probes an exact (method, literal path) entry first — a hit skips pattern
//! matching entirely — and otherwise scans the method's routes in
//! registration order, first structurally matching pattern wins. No
//! most-specific-match resolution is performed within the scan; with
//! overlapping parameterized patterns, registration order decides. Whole-path
//! literals do take precedence through the exact probe. Registering the same
//! (method, pattern) twice replaces the earlier handler (last write wins).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, Params};
use crate::middleware::{MiddlewareHandler, Next};
use crate::registry::DependencyRegistry;
use crate::{Method, Request, Response, StatusCode};

mod group;

pub use group::RouteGroup;

/// Type-erased, heap-allocated async handler that processes a [`Context`] and
/// returns a [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be cloned and
/// shared across threads without copying the underlying closure. In practice
/// you never construct this type directly — use [`Router::get`],
/// [`Router::post`], and the other method-specific helpers instead.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically via the
/// blanket impl below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
//
// Paths are compared segment-for-segment with no trailing-slash
// normalization, so `/users` and `/users/` are distinct.
#[derive(Debug, Clone)]
enum Pattern {
    // Matches one exact path string, e.g. `/users`.
    Exact(String),
    // Matches the same number of segments where some are named captures, e.g. `/users/:id`.
    Parameterized { segments: Vec<Segment> },
}

impl Pattern {
    // Parse a route pattern string. A pattern containing `:` anywhere is
    // parameterized; everything else is an exact literal.
    fn parse(pattern: &str) -> Self {
        if !pattern.contains(':') {
            return Pattern::Exact(pattern.to_string());
        }

        let segments = pattern
            .split('/')
            .map(|s| {
                if let Some(name) = s.strip_prefix(':') {
                    Segment::Parameter(name.to_string())
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();

        Pattern::Parameterized { segments }
    }

    // Try to match `path` against this pattern, returning extracted [`Params`]
    // on success. Segment counts must be equal; literal segments must match
    // exactly; parameter segments bind the corresponding request segment.
    fn matches(&self, path: &str) -> Option<Params> {
        match self {
            Pattern::Exact(p) => (p == path).then(Params::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = Params::new();
                for (segment, path_segment) in segments.iter().zip(path_segments) {
                    match segment {
                        Segment::Literal(s) => {
                            if s != path_segment {
                                return None;
                            }
                        }
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_segment);
                        }
                    }
                }
                Some(params)
            }
        }
    }
}

// A registered route: compiled pattern, handler, the dependency registry
// that applies to it (global-only routes carry none), and route/group-level
// middleware in composition order.
struct RouteEntry {
    pattern: Pattern,
    handler: Handler,
    registry: Option<Arc<DependencyRegistry>>,
    middleware: Vec<MiddlewareHandler>,
}

// Per-method route table: entries in registration order plus an index from
// the raw pattern string to its slot, used both for the exact-match probe
// and for last-write-wins replacement.
#[derive(Default)]
struct MethodTable {
    entries: Vec<RouteEntry>,
    index: HashMap<String, usize>,
}

/// HTTP request router with scoped dependency injection and layered middleware.
///
/// The router owns the global [`DependencyRegistry`]; route groups created
/// through [`Router::group`] attach their own. Registration is expected to
/// happen single-threaded before serving; dispatch is read-only and safe for
/// any number of concurrent in-flight requests.
///
/// # Examples
///
/// ```rust,no_run
/// use rill::{Context, Router, Response, StatusCode};
///
/// let mut router = Router::new();
/// router.dependencies().provide("db", "connection".to_owned());
///
/// router.get("/users/:id", |ctx: Context| async move {
///     let id = ctx.params().get_int("id");
///     Response::new(StatusCode::Ok).body(id.to_string())
/// });
/// ```
pub struct Router {
    routes: HashMap<Method, MethodTable>,
    middleware: Vec<MiddlewareHandler>,
    global_dependencies: Arc<DependencyRegistry>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a new, empty `Router` with no registered routes and an empty
    /// global dependency registry.
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            middleware: Vec::new(),
            global_dependencies: Arc::new(DependencyRegistry::new()),
        }
    }

    /// Returns the global dependency registry.
    ///
    /// Bindings made here are visible to every route; a group binding for the
    /// same key shadows them on that group's routes.
    pub fn dependencies(&self) -> &DependencyRegistry {
        &self.global_dependencies
    }

    /// Appends a router-level middleware layer.
    ///
    /// Router-level middleware runs ahead of all group- and route-level
    /// middleware, and also observes requests that match no route.
    pub fn use_middleware(&mut self, middleware: MiddlewareHandler) {
        self.middleware.push(middleware);
    }

    /// Creates a route group with the given path prefix.
    ///
    /// The group carries its own middleware list and dependency registry;
    /// sub-groups share the registry by reference.
    pub fn group(&mut self, prefix: impl Into<String>) -> RouteGroup<'_> {
        RouteGroup::new(self, prefix.into())
    }

    /// Registers a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Registers a handler for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Registers a handler for `PUT` requests matching `path`.
    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Put, path, handler);
    }

    /// Registers a handler for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    /// Registers a handler for `PATCH` requests matching `path`.
    pub fn patch(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Patch, path, handler);
    }

    /// Registers a handler for `OPTIONS` requests matching `path`.
    pub fn options(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Options, path, handler);
    }

    /// Registers a route with no route-level middleware.
    ///
    /// The route resolves dependencies from the global registry only.
    pub fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        self.add_route_with_middleware(method, path, handler, Vec::new());
    }

    /// Registers a route with route-level middleware, composed after any
    /// router-level middleware.
    pub fn add_route_with_middleware(
        &mut self,
        method: Method,
        path: &str,
        handler: impl IntoHandler,
        middleware: Vec<MiddlewareHandler>,
    ) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.register(method, path, handler, None, middleware);
    }

    // Shared registration path for router- and group-originated routes.
    // Re-registering an identical (method, pattern) replaces the earlier
    // entry in place: last write wins, position in scan order is kept.
    pub(crate) fn register(
        &mut self,
        method: Method,
        path: &str,
        handler: Handler,
        registry: Option<Arc<DependencyRegistry>>,
        middleware: Vec<MiddlewareHandler>,
    ) {
        let entry = RouteEntry {
            pattern: Pattern::parse(path),
            handler,
            registry,
            middleware,
        };

        let table = self.routes.entry(method).or_default();
        match table.index.get(path) {
            Some(&slot) => table.entries[slot] = entry,
            None => {
                table.index.insert(path.to_owned(), table.entries.len());
                table.entries.push(entry);
            }
        }
    }

    /// Returns the number of registered routes across all methods.
    pub fn len(&self) -> usize {
        self.routes.values().map(|t| t.entries.len()).sum()
    }

    /// Returns `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Resolves (method, path) to a route entry. The exact probe consults the
    // pattern index with the request path itself; on a miss, entries are
    // scanned in registration order and the first structural match wins,
    // yielding its extracted parameters.
    fn resolve(&self, method: &Method, path: &str) -> Option<(&RouteEntry, Option<Params>)> {
        let table = self.routes.get(method)?;

        if let Some(&slot) = table.index.get(path) {
            return Some((&table.entries[slot], None));
        }

        table
            .entries
            .iter()
            .find_map(|entry| entry.pattern.matches(path).map(|params| (entry, Some(params))))
    }

    /// Dispatches `request` through the full routing state machine and
    /// returns the response.
    ///
    /// Per request: seed the context with positional parameters and parsed
    /// query parameters; probe for an exact route, falling back to the
    /// in-order pattern scan (a pattern match overwrites the seeded
    /// parameters); merge the global registry's bindings and then the matched
    /// route's registry so group bindings shadow global ones; compose
    /// router-level middleware ahead of route/group middleware around the
    /// handler; invoke. When nothing matches, router-level middleware still
    /// observes the request, no dependency merge is performed, and a
    /// `404 Not Found` response is returned — this path never falls through
    /// to a handler.
    pub async fn dispatch(&self, request: Request) -> Response {
        let mut ctx = Context::new(request);
        let method = ctx.request().method().clone();
        let path = ctx.request().path().to_owned();

        match self.resolve(&method, &path) {
            Some((entry, extracted)) => {
                if let Some(params) = extracted {
                    ctx.set_params(params);
                }

                let mut dependencies = HashMap::new();
                self.global_dependencies.copy_into(&mut dependencies);
                if let Some(registry) = &entry.registry {
                    registry.copy_into(&mut dependencies);
                }
                ctx.set_dependencies(dependencies);

                let mut chain =
                    Vec::with_capacity(self.middleware.len() + entry.middleware.len() + 1);
                chain.extend(self.middleware.iter().cloned());
                chain.extend(entry.middleware.iter().cloned());
                let handler = Arc::clone(&entry.handler);
                chain.push(Arc::new(move |ctx, _next| handler(ctx)) as MiddlewareHandler);

                Next::new(chain).run(ctx).await
            }
            None => {
                let mut chain = self.middleware.clone();
                chain.push(Arc::new(|_ctx, _next: Next| {
                    Box::pin(async {
                        Response::new(StatusCode::NotFound).body("404 page not found")
                    }) as Pin<Box<dyn Future<Output = Response> + Send>>
                }) as MiddlewareHandler);

                Next::new(chain).run(ctx).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn tagging(tag: &'static str, log: Arc<Mutex<Vec<String>>>) -> MiddlewareHandler {
        Arc::new(move |ctx, next| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push(tag.to_owned());
                next.run(ctx).await
            })
        })
    }

    // ── Pattern ───────────────────────────────────────────────────────────────

    #[test]
    fn pattern_literal_round_trip() {
        let pat = Pattern::parse("/users");
        assert!(pat.matches("/users").is_some());
        assert!(pat.matches("/posts").is_none());
        // no trailing-slash normalization
        assert!(pat.matches("/users/").is_none());
    }

    #[test]
    fn pattern_binds_named_segments() {
        let pat = Pattern::parse("/users/:id/posts/:post_id");
        let params = pat.matches("/users/7/posts/99").unwrap();
        assert_eq!(params.get("id"), "7");
        assert_eq!(params.get("post_id"), "99");
    }

    #[test]
    fn pattern_requires_equal_segment_count() {
        let pat = Pattern::parse("/users/:id");
        assert!(pat.matches("/users").is_none());
        assert!(pat.matches("/users/42/extra").is_none());
    }

    #[test]
    fn pattern_rejects_literal_mismatch() {
        let pat = Pattern::parse("/users/:id");
        assert!(pat.matches("/posts/42").is_none());
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_router_returns_404() {
        let router = Router::new();
        let res = router.dispatch(make_request("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn literal_route_matches() {
        let mut router = Router::new();
        router.get("/hello", |_ctx| async { Response::new(StatusCode::Ok) });
        let res = router.dispatch(make_request("GET", "/hello")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn method_mismatch_is_404() {
        let mut router = Router::new();
        router.get("/hello", |_ctx| async { Response::new(StatusCode::Ok) });
        let res = router.dispatch(make_request("POST", "/hello")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn pattern_route_receives_params() {
        let mut router = Router::new();
        router.get("/admin/user/:id", |ctx: Context| async move {
            Response::new(StatusCode::Ok).body(ctx.params().get("id").to_owned())
        });
        let res = router.dispatch(make_request("GET", "/admin/user/42")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_as_bytes(), b"42");
    }

    #[tokio::test]
    async fn encoded_path_segments_bind_decoded() {
        // The request path is percent-decoded before matching, so the bound
        // parameter carries the decoded value.
        let mut router = Router::new();
        router.get("/files/:name", |ctx: Context| async move {
            Response::new(StatusCode::Ok).body(ctx.params().get("name").to_owned())
        });

        let res = router
            .dispatch(make_request("GET", "/files/hello%20world"))
            .await;
        assert_eq!(res.body_as_bytes(), b"hello world");
    }

    #[tokio::test]
    async fn exact_probe_beats_pattern_scan() {
        // `/users/:id` is registered first; the literal still wins because the
        // exact probe short-circuits before any pattern is consulted.
        let mut router = Router::new();
        router.get("/users/:id", |_ctx| async {
            Response::new(StatusCode::Ok).body("pattern")
        });
        router.get("/users/new", |_ctx| async {
            Response::new(StatusCode::Ok).body("literal")
        });

        let res = router.dispatch(make_request("GET", "/users/new")).await;
        assert_eq!(res.body_as_bytes(), b"literal");
    }

    #[tokio::test]
    async fn overlapping_patterns_first_registered_wins() {
        let mut router = Router::new();
        router.get("/users/:id", |_ctx| async {
            Response::new(StatusCode::Ok).body("id")
        });
        router.get("/users/:name", |_ctx| async {
            Response::new(StatusCode::Ok).body("name")
        });

        let res = router.dispatch(make_request("GET", "/users/jo")).await;
        assert_eq!(res.body_as_bytes(), b"id");
    }

    #[tokio::test]
    async fn reregistering_same_route_replaces_handler() {
        let mut router = Router::new();
        router.get("/path", |_ctx| async { Response::new(StatusCode::Ok) });
        router.get("/path", |_ctx| async {
            Response::new(StatusCode::Accepted)
        });

        assert_eq!(router.len(), 1);
        let res = router.dispatch(make_request("GET", "/path")).await;
        assert_eq!(res.status(), StatusCode::Accepted);
    }

    #[tokio::test]
    async fn unmatched_request_runs_no_handler_and_merges_nothing() {
        let invoked = Arc::new(Mutex::new(false));
        let mut router = Router::new();
        router.dependencies().provide("db", "connection".to_owned());
        {
            let invoked = Arc::clone(&invoked);
            router.get("/real", move |_ctx| {
                let invoked = Arc::clone(&invoked);
                async move {
                    *invoked.lock().unwrap() = true;
                    Response::new(StatusCode::Ok)
                }
            });
        }

        let res = router.dispatch(make_request("DELETE", "/ghost")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert!(!*invoked.lock().unwrap());
    }

    #[tokio::test]
    async fn router_middleware_observes_unmatched_requests() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router.use_middleware(tagging("router", Arc::clone(&log)));

        let res = router.dispatch(make_request("GET", "/ghost")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(*log.lock().unwrap(), vec!["router"]);
    }

    #[tokio::test]
    async fn router_middleware_runs_before_route_middleware() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router.use_middleware(tagging("router", Arc::clone(&log)));
        router.add_route_with_middleware(
            Method::Get,
            "/r",
            |_ctx| async { Response::new(StatusCode::Ok) },
            vec![tagging("route", Arc::clone(&log))],
        );

        router.dispatch(make_request("GET", "/r")).await;
        assert_eq!(*log.lock().unwrap(), vec!["router", "route"]);
    }

    #[tokio::test]
    async fn global_dependencies_reach_handlers() {
        let mut router = Router::new();
        router.dependencies().provide("greeting", "hello".to_owned());
        router.get("/greet", |ctx: Context| async move {
            match ctx.dependency::<String>("greeting") {
                Ok(greeting) => Response::new(StatusCode::Ok).body(greeting.clone()),
                Err(e) => Response::json_error(StatusCode::InternalServerError, &e.to_string()),
            }
        });

        let res = router.dispatch(make_request("GET", "/greet")).await;
        assert_eq!(res.body_as_bytes(), b"hello");
    }

    #[tokio::test]
    async fn exact_match_keeps_positional_params() {
        // A literal route never rebinds params; the positional seeding from
        // the raw path is what the handler observes.
        let mut router = Router::new();
        router.get("/user/42", |ctx: Context| async move {
            Response::new(StatusCode::Ok).body(ctx.params().get("user").to_owned())
        });

        let res = router.dispatch(make_request("GET", "/user/42")).await;
        assert_eq!(res.body_as_bytes(), b"42");
    }

    #[tokio::test]
    async fn method_helper_variants_register() {
        let mut router = Router::new();
        router.put("/r", |_ctx| async { Response::new(StatusCode::Ok) });
        router.delete("/r", |_ctx| async { Response::new(StatusCode::Ok) });
        router.patch("/r", |_ctx| async { Response::new(StatusCode::Ok) });
        router.options("/r", |_ctx| async { Response::new(StatusCode::Ok) });
        router.post("/r", |_ctx| async { Response::new(StatusCode::Ok) });
        assert_eq!(router.len(), 5);

        for method in ["PUT", "DELETE", "PATCH", "OPTIONS", "POST"] {
            let res = router.dispatch(make_request(method, "/r")).await;
            assert_eq!(res.status(), StatusCode::Ok, "{method} failed");
        }
    }
}
