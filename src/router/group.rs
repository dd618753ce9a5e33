//! Route groups — prefix- and scope-bound route registration.

use std::sync::Arc;

use crate::middleware::MiddlewareHandler;
use crate::registry::DependencyRegistry;
use crate::router::{Handler, IntoHandler, Router};
use crate::Method;

/// A builder facade for registering related routes against a [`Router`] under
/// a common path prefix, with group-scoped middleware and dependencies.
///
/// A group owns its middleware list and a [`DependencyRegistry`]. Every route
/// registered through the group carries both: the registry's bindings shadow
/// global ones on those routes, and the middleware runs after router-level
/// middleware but ahead of route-local middleware.
///
/// Sub-groups created with [`RouteGroup::group`] concatenate prefixes,
/// inherit the parent's middleware list by copy, and share the parent's
/// registry by reference — a `provide` on either is visible to both. Create
/// an independent group from the router when that sharing is not wanted.
///
/// # Examples
///
/// ```rust,no_run
/// use rill::{Router, Response, StatusCode};
///
/// let mut router = Router::new();
/// let mut admin = router.group("/admin");
/// admin.provide("role", "admin".to_owned());
/// admin.get("/dashboard", |_ctx| async { Response::new(StatusCode::Ok) });
/// ```
pub struct RouteGroup<'r> {
    router: &'r mut Router,
    prefix: String,
    middleware: Vec<MiddlewareHandler>,
    registry: Arc<DependencyRegistry>,
}

impl<'r> RouteGroup<'r> {
    pub(crate) fn new(router: &'r mut Router, prefix: String) -> Self {
        Self {
            router,
            prefix,
            middleware: Vec::new(),
            registry: Arc::new(DependencyRegistry::new()),
        }
    }

    /// Creates a sub-group whose prefix is this group's prefix followed by
    /// `prefix`, sharing this group's dependency registry.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            router: &mut *self.router,
            prefix: format!("{}{}", self.prefix, prefix),
            middleware: self.middleware.clone(),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Appends a group-level middleware layer.
    ///
    /// Only routes registered *after* this call carry the layer.
    pub fn use_middleware(&mut self, middleware: MiddlewareHandler) {
        self.middleware.push(middleware);
    }

    /// Binds a group-local dependency, shadowing any global binding of the
    /// same key on this group's routes.
    pub fn provide<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.registry.provide(key, value);
    }

    /// Registers a handler for `GET` requests under the group prefix.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.route(Method::Get, path, handler);
    }

    /// Registers a handler for `POST` requests under the group prefix.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.route(Method::Post, path, handler);
    }

    /// Registers a handler for `PUT` requests under the group prefix.
    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.route(Method::Put, path, handler);
    }

    /// Registers a handler for `DELETE` requests under the group prefix.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.route(Method::Delete, path, handler);
    }

    /// Registers a route under the group prefix with no route-local middleware.
    pub fn route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        self.route_with_middleware(method, path, handler, Vec::new());
    }

    /// Registers a route under the group prefix with route-local middleware,
    /// composed after the group's own layers.
    pub fn route_with_middleware(
        &mut self,
        method: Method,
        path: &str,
        handler: impl IntoHandler,
        middleware: Vec<MiddlewareHandler>,
    ) {
        let mut layers = self.middleware.clone();
        layers.extend(middleware);

        let full_path = format!("{}{}", self.prefix, path);
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.router.register(
            method,
            &full_path,
            handler,
            Some(Arc::clone(&self.registry)),
            layers,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::http::Request;
    use crate::{Response, StatusCode};
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

    #[tokio::test]
    async fn group_prefixes_routes() {
        let mut router = Router::new();
        let mut api = router.group("/api");
        api.get("/users", |_ctx| async { Response::new(StatusCode::Ok) });
        api.post("/users", |_ctx| async { Response::new(StatusCode::Created) });

        let res = router.dispatch(make_request("GET", "/api/users")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        let res = router.dispatch(make_request("POST", "/api/users")).await;
        assert_eq!(res.status(), StatusCode::Created);
        // the unprefixed path is not registered
        let res = router.dispatch(make_request("GET", "/users")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn group_dependency_shadows_global() {
        let mut router = Router::new();
        router.dependencies().provide("role", "anonymous".to_owned());

        let mut admin = router.group("/admin");
        admin.provide("role", "admin".to_owned());
        admin.get("/dashboard", |ctx: Context| async move {
            let role = ctx.dependency::<String>("role").cloned().unwrap_or_default();
            Response::new(StatusCode::Ok).body(role)
        });

        router.get("/home", |ctx: Context| async move {
            let role = ctx.dependency::<String>("role").cloned().unwrap_or_default();
            Response::new(StatusCode::Ok).body(role)
        });

        let res = router.dispatch(make_request("GET", "/admin/dashboard")).await;
        assert_eq!(res.body_as_bytes(), b"admin");
        let res = router.dispatch(make_request("GET", "/home")).await;
        assert_eq!(res.body_as_bytes(), b"anonymous");
    }

    #[tokio::test]
    async fn subgroup_concatenates_prefix_and_shares_registry() {
        let mut router = Router::new();
        let mut api = router.group("/api");
        api.provide("version", 1u32);
        {
            let mut v1 = api.group("/v1");
            // provided through the sub-group, visible via the shared registry
            v1.provide("flag", true);
            v1.get("/status", |ctx: Context| async move {
                let version = ctx.dependency::<u32>("version").copied().unwrap_or(0);
                let flag = ctx.dependency::<bool>("flag").copied().unwrap_or(false);
                Response::new(StatusCode::Ok).body(format!("{version}:{flag}"))
            });
        }
        // the parent group's routes see the sub-group's binding too
        api.get("/status", |ctx: Context| async move {
            let flag = ctx.dependency::<bool>("flag").copied().unwrap_or(false);
            Response::new(StatusCode::Ok).body(flag.to_string())
        });

        let res = router.dispatch(make_request("GET", "/api/v1/status")).await;
        assert_eq!(res.body_as_bytes(), b"1:true");
        let res = router.dispatch(make_request("GET", "/api/status")).await;
        assert_eq!(res.body_as_bytes(), b"true");
    }

    #[tokio::test]
    async fn group_middleware_wraps_only_group_routes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        {
            let mut api = router.group("/api");
            api.use_middleware(tagging("group", Arc::clone(&log)));
            api.get("/users", |_ctx| async { Response::new(StatusCode::Ok) });
        }
        router.get("/plain", |_ctx| async { Response::new(StatusCode::Ok) });

        router.dispatch(make_request("GET", "/api/users")).await;
        assert_eq!(*log.lock().unwrap(), vec!["group"]);

        log.lock().unwrap().clear();
        router.dispatch(make_request("GET", "/plain")).await;
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inherited_middleware_precedes_group_local() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router.use_middleware(tagging("router", Arc::clone(&log)));

        let mut api = router.group("/api");
        api.use_middleware(tagging("parent", Arc::clone(&log)));
        let mut v1 = api.group("/v1");
        v1.use_middleware(tagging("child", Arc::clone(&log)));
        v1.route_with_middleware(
            Method::Get,
            "/r",
            |_ctx| async { Response::new(StatusCode::Ok) },
            vec![tagging("route", Arc::clone(&log))],
        );

        router.dispatch(make_request("GET", "/api/v1/r")).await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["router", "parent", "child", "route"]
        );
    }

    #[tokio::test]
    async fn group_pattern_routes_extract_params() {
        let mut router = Router::new();
        let mut admin = router.group("/admin");
        admin.get("/users/:id", |ctx: Context| async move {
            Response::new(StatusCode::Ok).body(ctx.params().get("id").to_owned())
        });

        let res = router.dispatch(make_request("GET", "/admin/users/42")).await;
        assert_eq!(res.body_as_bytes(), b"42");
    }
}
