//! # Waypoint Core
//!
//! Request-routing core for the Waypoint web framework: maps an HTTP method
//! and path to a registered action, wraps it in the route's middleware, and
//! turns failures into status-coded error pages.
//!
//! ## Architecture
//!
//! The [`Router`] is built once at bootstrap, then shared read-only by every
//! request. Dispatch runs the matched action inside an onion of
//! [`Middleware`]; whatever escapes is classified by the
//! [`ErrorClassifier`]. [`Server`] wires both behind hyper.
//!
//! ## Modules
//!
//! - `router` - Registration, groups, reverse lookup and dispatch
//! - `table` - Per-method route buckets in registration order
//! - `route` - Route records, actions and extracted parameters
//! - `pattern` - URI template to regular expression compiler
//! - `middleware` - Middleware capability, chain builder, registry and built-ins
//! - `controller` - Controller capability and registry
//! - `handler` - Terminal handler type
//! - `classifier` - Failure classification and error pages
//! - `request` / `response` - Request and response values
//! - `server` - HTTP server built on Hyper
//! - `config` - Router and server configuration
//! - `logging` - Tracing subscriber bootstrap
//! - `json` - JSON parsing with simd-json
//! - `validation` - Structured validation errors
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod handler;
pub mod json;
pub mod logging;
pub mod middleware;
pub mod pattern;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod table;
pub mod validation;

pub use classifier::{ErrorClassifier, ErrorKind, ErrorPage, ErrorRenderer, JsonErrorRenderer};
pub use config::{RouterConfig, ServerConfig};
pub use controller::{Controller, ControllerRegistry, MethodTable};
pub use error::{Error, Result};
pub use handler::{handler, BoxFuture, Handler};
pub use json::{parse_json, to_json};
pub use logging::init_tracing;
pub use middleware::{
    build_chain, CorsMiddleware, IntoMiddlewareList, LoggingMiddleware, Middleware,
    MiddlewareRef, MiddlewareRegistry, Next, RateLimitMiddleware, TimingMiddleware,
};
pub use request::Request;
pub use response::Response;
pub use route::{Action, Constraints, RouteParams, RouteRecord};
pub use router::{GroupAttributes, Method, RouteHandle, Router, NO_PARAMS};
pub use server::Server;
pub use validation::ValidationErrors;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
