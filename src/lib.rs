//! # rill
//!
//! A lightweight async HTTP router and micro-framework built on [Tokio],
//! with scoped dependency injection and layered middleware.
//!
//! ## Features
//!
//! - **Pattern routing** — literal paths and `:name` captures, dispatched by
//!   method with an exact-match fast path
//! - **Scoped dependencies** — a global registry on the router plus
//!   per-group registries that shadow it, resolved by key and downcast to
//!   concrete types in handlers
//! - **Layered middleware** — router-, group-, and route-level layers
//!   composed outermost-first around the handler
//! - **Route groups** — shared path prefixes carrying their own middleware
//!   and dependencies, nestable
//! - **HTTP/1.1 server** — persistent connections, deadlines, optional TLS,
//!   graceful shutdown
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use rill::{Context, Router, Response, StatusCode};
//! use rill::server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.dependencies().provide("motd", "welcome".to_owned());
//!
//!     router.get("/users/:id", |ctx: Context| async move {
//!         let id = ctx.params().get_int("id");
//!         Response::json(StatusCode::Ok, &serde_json::json!({ "id": id }))
//!     });
//!
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run(router).await?;
//!     Ok(())
//! }
//! ```
//!
//! [Tokio]: https://tokio.rs

pub mod context;
pub mod http;
pub mod middleware;
pub mod registry;
pub mod router;
pub mod security;
pub mod server;

pub use context::{Context, Params, QueryParams};
pub use http::{Cookie, Headers, Method, Request, Response, StatusCode};
pub use registry::{Dependency, DependencyError, DependencyRegistry};
pub use router::{Handler, IntoHandler, RouteGroup, Router};
pub use server::{Server, ServerConfig, ServerError};
