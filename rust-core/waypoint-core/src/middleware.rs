//! # Middleware System
//!
//! Onion-style middleware: each layer receives the request and a [`Next`]
//! continuation standing for the rest of the chain, and decides whether and
//! when to call it. Code after `next.run(..)` runs on the way back out.
//!
//! Routes refer to middleware by [`MiddlewareRef`]: either an identifier
//! (alias or registered type name) or an inline instance. Aliases are
//! resolved when a route is registered; identifiers are looked up in the
//! [`MiddlewareRegistry`] when a request is dispatched.

use crate::error::{Error, Result};
use crate::handler::{BoxFuture, Handler};
use crate::request::Request;
use crate::response::Response;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Middleware capability
///
/// ```ignore
/// struct RequireJson;
///
/// impl Middleware for RequireJson {
///     fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
///         Box::pin(async move {
///             if req.header("content-type") != Some("application/json") {
///                 return Err(Error::BadRequest { message: "JSON only".into() });
///             }
///             next.run(req).await
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    /// Handle `req`, optionally delegating to the rest of the chain
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>>;

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// The rest of the chain: the next middleware, or the terminal handler
pub struct Next<'a> {
    inner: Box<dyn FnOnce(Request) -> BoxFuture<'a, Result<Response>> + Send + 'a>,
}

impl<'a> Next<'a> {
    fn new<F>(f: F) -> Self
    where
        F: FnOnce(Request) -> BoxFuture<'a, Result<Response>> + Send + 'a,
    {
        Self { inner: Box::new(f) }
    }

    /// Continue down the chain
    pub fn run(self, req: Request) -> BoxFuture<'a, Result<Response>> {
        (self.inner)(req)
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next(..)")
    }
}

/// Compose `middleware` around `endpoint`
///
/// Folds from the last layer to the first, so `middleware[0]` is the
/// outermost wrapper: it runs first on the way in and last on the way out.
pub fn build_chain<'a>(middleware: &'a [Arc<dyn Middleware>], endpoint: Handler) -> Next<'a> {
    let terminal = Next::new(move |req: Request| -> BoxFuture<'a, Result<Response>> { endpoint(req) });

    middleware.iter().rev().fold(terminal, |next, layer| {
        Next::new(move |req: Request| layer.handle(req, next))
    })
}

/// A route's reference to a middleware
#[derive(Clone)]
pub enum MiddlewareRef {
    /// Alias or registered type identifier
    Named(String),
    /// An instance attached directly to the route
    Inline(Arc<dyn Middleware>),
}

impl MiddlewareRef {
    /// Attach `middleware` inline, bypassing the registry
    pub fn inline<M: Middleware + 'static>(middleware: M) -> Self {
        Self::Inline(Arc::new(middleware))
    }
}

impl fmt::Display for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(id) => f.write_str(id),
            Self::Inline(m) => write!(f, "<inline {}>", m.name()),
        }
    }
}

impl fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MiddlewareRef({self})")
    }
}

impl From<&str> for MiddlewareRef {
    fn from(id: &str) -> Self {
        Self::Named(id.to_string())
    }
}

impl From<String> for MiddlewareRef {
    fn from(id: String) -> Self {
        Self::Named(id)
    }
}

impl From<Arc<dyn Middleware>> for MiddlewareRef {
    fn from(middleware: Arc<dyn Middleware>) -> Self {
        Self::Inline(middleware)
    }
}

/// One middleware reference or a list of them
pub trait IntoMiddlewareList {
    /// Normalise into an ordered list
    fn into_middleware_list(self) -> Vec<MiddlewareRef>;
}

impl IntoMiddlewareList for &str {
    fn into_middleware_list(self) -> Vec<MiddlewareRef> {
        vec![self.into()]
    }
}

impl IntoMiddlewareList for String {
    fn into_middleware_list(self) -> Vec<MiddlewareRef> {
        vec![self.into()]
    }
}

impl IntoMiddlewareList for MiddlewareRef {
    fn into_middleware_list(self) -> Vec<MiddlewareRef> {
        vec![self]
    }
}

impl<T: Into<MiddlewareRef>> IntoMiddlewareList for Vec<T> {
    fn into_middleware_list(self) -> Vec<MiddlewareRef> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<MiddlewareRef>, const N: usize> IntoMiddlewareList for [T; N] {
    fn into_middleware_list(self) -> Vec<MiddlewareRef> {
        self.into_iter().map(Into::into).collect()
    }
}

/// Registered middleware types and the alias table pointing at them
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    types: HashMap<String, Arc<dyn Middleware>>,
    aliases: HashMap<String, String>,
}

impl MiddlewareRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the stateless built-ins under their names
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(LoggingMiddleware.name(), LoggingMiddleware::new());
        registry.register(TimingMiddleware.name(), TimingMiddleware::new());
        registry.register(CorsMiddleware::new().name(), CorsMiddleware::new());
        registry
    }

    /// Register a middleware implementation under a type identifier
    ///
    /// The instance is shared by every request that passes through it.
    pub fn register<M: Middleware + 'static>(&mut self, type_id: impl Into<String>, middleware: M) {
        self.types.insert(type_id.into(), Arc::new(middleware));
    }

    /// Point `alias` at a type identifier
    ///
    /// The target does not need to be registered yet; a dangling alias
    /// surfaces as `Error::InvalidMiddleware` on dispatch.
    pub fn register_alias(&mut self, alias: impl Into<String>, type_id: impl Into<String>) {
        self.aliases.insert(alias.into(), type_id.into());
    }

    /// Whether `type_id` names a registered implementation
    #[must_use]
    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    /// Replace aliases with the type identifiers they stand for
    ///
    /// # Errors
    ///
    /// `Error::MiddlewareNotFound` for an identifier that is neither an alias
    /// nor a registered type.
    pub fn resolve_aliases(&self, middleware: Vec<MiddlewareRef>) -> Result<Vec<MiddlewareRef>> {
        middleware
            .into_iter()
            .map(|entry| match entry {
                MiddlewareRef::Named(id) => {
                    if let Some(type_id) = self.aliases.get(&id) {
                        Ok(MiddlewareRef::Named(type_id.clone()))
                    } else if self.types.contains_key(&id) {
                        Ok(MiddlewareRef::Named(id))
                    } else {
                        Err(Error::MiddlewareNotFound { identifier: id })
                    }
                }
                inline @ MiddlewareRef::Inline(_) => Ok(inline),
            })
            .collect()
    }

    /// Look up the implementations behind a route's middleware list
    ///
    /// # Errors
    ///
    /// `Error::InvalidMiddleware` naming the first identifier without a
    /// registered implementation.
    pub fn instantiate(&self, middleware: &[MiddlewareRef]) -> Result<Vec<Arc<dyn Middleware>>> {
        middleware
            .iter()
            .map(|entry| match entry {
                MiddlewareRef::Named(id) => {
                    self.types
                        .get(id)
                        .cloned()
                        .ok_or_else(|| Error::InvalidMiddleware {
                            identifier: id.clone(),
                        })
                }
                MiddlewareRef::Inline(m) => Ok(Arc::clone(m)),
            })
            .collect()
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .finish()
    }
}

/// Logging middleware - logs requests and their outcome
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Create a new logging middleware
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for LoggingMiddleware {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            let method = req.method;
            let path = req.path.clone();
            let request_id = req.header("x-request-id").unwrap_or("-").to_string();
            info!(%method, %path, %request_id, "Request received");

            let result = next.run(req).await;
            match &result {
                Ok(res) => info!(%method, %path, status = res.status, %request_id, "Response sent"),
                Err(e) => warn!(%method, %path, status = e.status_code(), %request_id, "Request failed"),
            }
            result
        })
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}

/// Timing middleware - measures time spent in the inner chain
#[derive(Debug, Default)]
pub struct TimingMiddleware;

impl TimingMiddleware {
    /// Create a new timing middleware
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for TimingMiddleware {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            let method = req.method;
            let path = req.path.clone();
            let start = Instant::now();
            let result = next.run(req).await;
            debug!(
                %method,
                %path,
                duration_ms = %start.elapsed().as_millis(),
                "Request timing"
            );
            result
        })
    }

    fn name(&self) -> &'static str {
        "TimingMiddleware"
    }
}

/// CORS middleware - adds Cross-Origin Resource Sharing headers
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
        }
    }
}

impl CorsMiddleware {
    /// Create a new CORS middleware with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed origin
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow_origin = origin.into();
        self
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.allow_methods = methods.into();
        self
    }

    /// Set allowed headers
    #[must_use]
    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.allow_headers = headers.into();
        self
    }

    /// Get the Access-Control-Allow-Origin header value
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.allow_origin
    }
}

impl Middleware for CorsMiddleware {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            let mut res = next.run(req).await?;
            res.set_header("Access-Control-Allow-Origin", &self.allow_origin);
            res.set_header("Access-Control-Allow-Methods", &self.allow_methods);
            res.set_header("Access-Control-Allow-Headers", &self.allow_headers);
            Ok(res)
        })
    }

    fn name(&self) -> &'static str {
        "CorsMiddleware"
    }
}

/// Token bucket rate limiting middleware
///
/// Buckets are keyed by the `x-client-ip` header the server stamps on
/// every network request; requests without it share one bucket. An empty
/// bucket fails with `Error::RateLimited`.
#[derive(Debug)]
pub struct RateLimitMiddleware {
    /// Maximum burst capacity
    capacity: u64,
    /// Tokens refilled per second
    refill_per_sec: u64,
    /// Per-key buckets
    state: Mutex<HashMap<String, Bucket>>,
}

#[derive(Debug)]
struct Bucket {
    tokens: u64,
    last_refill: Instant,
}

/// Client count above which idle, full buckets are dropped
const SWEEP_THRESHOLD: usize = 1024;

impl RateLimitMiddleware {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(capacity: u64, refill_per_sec: u64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(HashMap::new()),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn refill(&self, bucket: &Bucket, now: Instant) -> u64 {
        let elapsed = now.duration_since(bucket.last_refill);
        (elapsed.as_secs_f64() * self.refill_per_sec as f64) as u64
    }

    fn allow(&self, key: &str) -> bool {
        let mut map = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        // a bucket that has refilled to capacity is indistinguishable from a new one
        if map.len() >= SWEEP_THRESHOLD && !map.contains_key(key) {
            map.retain(|_, b| b.tokens.saturating_add(self.refill(b, now)) < self.capacity);
        }
        let bucket = map.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let refill = self.refill(bucket, now);
        if refill > 0 {
            bucket.tokens = (bucket.tokens + refill).min(self.capacity);
            bucket.last_refill = now;
        }
        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }
}

impl Middleware for RateLimitMiddleware {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        let key = req.header("x-client-ip").unwrap_or("unknown").to_string();
        if self.allow(&key) {
            next.run(req)
        } else {
            Box::pin(async move {
                Err(Error::RateLimited {
                    message: format!("Too many requests from {key}"),
                })
            })
        }
    }

    fn name(&self) -> &'static str {
        "RateLimitMiddleware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use crate::router::Method;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        label: &'static str,
        journal: Journal,
    }

    impl Middleware for Recorder {
        fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
            Box::pin(async move {
                self.journal.lock().unwrap().push(format!("{} before", self.label));
                let res = next.run(req).await;
                self.journal.lock().unwrap().push(format!("{} after", self.label));
                res
            })
        }
    }

    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        fn handle<'a>(&'a self, _req: Request, _next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
            Box::pin(async { Ok(Response::text("blocked").with_status(403)) })
        }
    }

    fn journaling_endpoint(journal: &Journal) -> Handler {
        let journal = Arc::clone(journal);
        handler(move |_req| {
            let journal = Arc::clone(&journal);
            async move {
                journal.lock().unwrap().push("handler".to_string());
                Ok(Response::text("done"))
            }
        })
    }

    #[tokio::test]
    async fn test_onion_order() {
        let journal: Journal = Arc::default();
        let layers: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Recorder { label: "A", journal: Arc::clone(&journal) }),
            Arc::new(Recorder { label: "B", journal: Arc::clone(&journal) }),
        ];

        let res = build_chain(&layers, journaling_endpoint(&journal))
            .run(Request::new(Method::Get, "/"))
            .await
            .unwrap();

        assert_eq!(res.body, "done");
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["A before", "B before", "handler", "B after", "A after"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let journal: Journal = Arc::default();
        let layers: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Recorder { label: "A", journal: Arc::clone(&journal) }),
            Arc::new(ShortCircuit),
            Arc::new(Recorder { label: "C", journal: Arc::clone(&journal) }),
        ];

        let res = build_chain(&layers, journaling_endpoint(&journal))
            .run(Request::new(Method::Get, "/"))
            .await
            .unwrap();

        assert_eq!(res.status, 403);
        assert_eq!(*journal.lock().unwrap(), vec!["A before", "A after"]);
    }

    #[tokio::test]
    async fn test_empty_chain_calls_endpoint() {
        let journal: Journal = Arc::default();
        let res = build_chain(&[], journaling_endpoint(&journal))
            .run(Request::new(Method::Get, "/"))
            .await
            .unwrap();
        assert_eq!(res.body, "done");
    }

    #[test]
    fn test_resolve_aliases() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("app::Timing", TimingMiddleware::new());
        registry.register_alias("timing", "app::Timing");

        let resolved = registry
            .resolve_aliases(["timing", "app::Timing"].into_middleware_list())
            .unwrap();
        let ids: Vec<String> = resolved.iter().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["app::Timing", "app::Timing"]);

        let err = registry
            .resolve_aliases("missing".into_middleware_list())
            .unwrap_err();
        assert!(matches!(err, Error::MiddlewareNotFound { ref identifier } if identifier == "missing"));
    }

    #[test]
    fn test_instantiate_reports_dangling_identifier() {
        let mut registry = MiddlewareRegistry::new();
        registry.register_alias("auth", "app::Auth");
        let refs = registry.resolve_aliases(vec!["auth".into()]).unwrap();

        let err = registry.instantiate(&refs).err().unwrap();
        assert!(matches!(err, Error::InvalidMiddleware { ref identifier } if identifier == "app::Auth"));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_inline_passes_through() {
        let registry = MiddlewareRegistry::new();
        let refs = registry
            .resolve_aliases(vec![MiddlewareRef::inline(CorsMiddleware::new())])
            .unwrap();
        assert_eq!(registry.instantiate(&refs).unwrap().len(), 1);
        assert_eq!(refs[0].to_string(), "<inline CorsMiddleware>");
    }

    #[tokio::test]
    async fn test_cors_headers_added() {
        let layers: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(CorsMiddleware::new().allow_origin("https://example.com"))];
        let endpoint = handler(|_req| async { Ok(Response::text("ok")) });

        let res = build_chain(&layers, endpoint)
            .run(Request::new(Method::Get, "/"))
            .await
            .unwrap();
        assert_eq!(
            res.header("access-control-allow-origin"),
            Some("https://example.com")
        );
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion() {
        let layers: Vec<Arc<dyn Middleware>> = vec![Arc::new(RateLimitMiddleware::new(1, 0))];
        let endpoint = handler(|_req| async { Ok(Response::text("ok")) });
        let req = || Request::new(Method::Get, "/").with_header("x-client-ip", "10.0.0.1");

        assert!(build_chain(&layers, Arc::clone(&endpoint)).run(req()).await.is_ok());
        let err = build_chain(&layers, endpoint).run(req()).await.unwrap_err();
        assert_eq!(err.status_code(), 429);
    }

    #[test]
    fn test_rate_limit_forgets_refilled_clients() {
        let limiter = RateLimitMiddleware::new(1, 1_000_000);
        for i in 0..SWEEP_THRESHOLD {
            assert!(limiter.allow(&format!("client-{i}")));
        }
        assert_eq!(limiter.state.lock().unwrap().len(), SWEEP_THRESHOLD);

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(limiter.allow("newcomer"));
        assert_eq!(limiter.state.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_rate_limit_keeps_drained_clients() {
        let limiter = RateLimitMiddleware::new(1, 0);
        for i in 0..SWEEP_THRESHOLD {
            assert!(limiter.allow(&format!("client-{i}")));
        }
        assert!(limiter.allow("newcomer"));
        assert!(!limiter.allow("client-0"));
        assert_eq!(limiter.state.lock().unwrap().len(), SWEEP_THRESHOLD + 1);
    }

    #[test]
    fn test_builtins_registered_by_name() {
        let registry = MiddlewareRegistry::with_builtins();
        assert!(registry.contains("LoggingMiddleware"));
        assert!(registry.contains("TimingMiddleware"));
        assert!(registry.contains("CorsMiddleware"));
        assert!(!registry.contains("RateLimitMiddleware"));
    }

    #[test]
    fn test_middleware_names() {
        assert_eq!(LoggingMiddleware::new().name(), "LoggingMiddleware");
        assert_eq!(TimingMiddleware::new().name(), "TimingMiddleware");
        assert_eq!(CorsMiddleware::new().origin(), "*");
    }
}
