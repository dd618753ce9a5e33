//! Minimal rill application: routes, groups, dependencies, middleware.
//!
//! Run with `cargo run --example hello_world`, then try:
//!
//! ```text
//! curl http://127.0.0.1:8080/
//! curl http://127.0.0.1:8080/api/health
//! curl "http://127.0.0.1:8080/admin/users/42?verbose=1"
//! ```

use std::sync::Arc;

use rill::middleware::{Logger, from_middleware};
use rill::server::{Server, ServerConfig};
use rill::{Context, Response, Router, StatusCode};

#[derive(Clone)]
struct AppName(String);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut router = Router::new();
    router.use_middleware(from_middleware(Arc::new(Logger)));
    router
        .dependencies()
        .provide("app", AppName("hello-world".to_owned()));

    router.get("/", |ctx: Context| async move {
        match ctx.dependency::<AppName>("app") {
            Ok(app) => Response::new(StatusCode::Ok).body(format!("Welcome to {}", app.0)),
            Err(e) => Response::json_error(StatusCode::InternalServerError, &e.to_string()),
        }
    });

    let mut api = router.group("/api");
    api.get("/health", |_ctx| async {
        Response::json(StatusCode::Ok, &serde_json::json!({ "status": "ok" }))
    });

    let mut admin = router.group("/admin");
    admin.provide("role", "admin".to_owned());
    admin.get("/users/:id", |ctx: Context| async move {
        let id = ctx.params().get_int("id");
        let verbose = ctx.query().get("verbose") == "1";
        let role = match ctx.dependency::<String>("role") {
            Ok(role) => role.clone(),
            Err(e) => return Response::json_error(StatusCode::InternalServerError, &e.to_string()),
        };
        Response::json(
            StatusCode::Ok,
            &serde_json::json!({ "id": id, "role": role, "verbose": verbose }),
        )
    });

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    let server = Server::bind(config).await?;
    server.run(router).await?;
    Ok(())
}
