//! # Terminal Handlers
//!
//! The invocable at the end of every middleware chain.

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed, sendable future used across the routing core
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler function type (async)
///
/// Receives the request with its route parameters already attached.
pub type Handler = Arc<dyn Fn(Request) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// Wrap an async function or closure into a [`Handler`]
///
/// ```ignore
/// let show = handler(|req: Request| async move {
///     let id = req.param("id").unwrap_or_default().to_string();
///     Ok(Response::text(id))
/// });
/// ```
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}
