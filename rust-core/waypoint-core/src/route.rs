//! # Route Records
//!
//! One [`RouteRecord`] per (method, URI template) pair, plus the values that
//! travel with it: the [`Action`] to invoke, per-placeholder [`Constraints`]
//! and the [`RouteParams`] extracted at dispatch time.

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::middleware::MiddlewareRef;
use crate::pattern::CompiledPattern;
use crate::router::Method;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Placeholder name → regular-expression pattern
pub type Constraints = HashMap<String, String>;

/// What a route invokes once matched
#[derive(Clone)]
pub enum Action {
    /// A plain invocable
    Handler(Handler),
    /// A (controller, method) pair looked up in the controller registry
    Controller {
        /// Registered controller identifier
        controller: String,
        /// Method exposed by the controller
        method: String,
    },
    /// A textual reference, expected in `Controller@method` form
    Reference(String),
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Action::Handler(..)"),
            Self::Controller { controller, method } => {
                write!(f, "Action::Controller({controller}, {method})")
            }
            Self::Reference(reference) => write!(f, "Action::Reference({reference})"),
        }
    }
}

impl From<Handler> for Action {
    fn from(handler: Handler) -> Self {
        Self::Handler(handler)
    }
}

impl From<&str> for Action {
    fn from(reference: &str) -> Self {
        Self::Reference(reference.to_string())
    }
}

impl From<String> for Action {
    fn from(reference: String) -> Self {
        Self::Reference(reference)
    }
}

impl<C: Into<String>, M: Into<String>> From<(C, M)> for Action {
    fn from((controller, method): (C, M)) -> Self {
        Self::Controller {
            controller: controller.into(),
            method: method.into(),
        }
    }
}

/// Parameters extracted from a matched path
///
/// Pairs keep the order in which placeholders appear in the template, so
/// they can be consumed by name or positionally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    pairs: Vec<(String, String)>,
}

impl RouteParams {
    /// Value of parameter `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse parameter `name` into `T`
    ///
    /// # Errors
    ///
    /// `Error::BadRequest` if the parameter is missing or does not parse.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T> {
        let raw = self.get(name).ok_or_else(|| Error::BadRequest {
            message: format!("Missing route parameter [{name}]"),
        })?;
        raw.parse().map_err(|_| Error::BadRequest {
            message: format!("Route parameter [{name}] has an invalid value"),
        })
    }

    /// Values in template order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(_, v)| v.as_str())
    }

    /// `(name, value)` pairs in template order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the route had no placeholders
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RouteParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// A registered route
///
/// The compiled pattern is built on first match and cached; every
/// registration-time mutation drops the cache.
#[derive(Debug, Clone)]
pub struct RouteRecord {
    method: Method,
    uri: String,
    action: Action,
    name: Option<String>,
    constraints: Constraints,
    middleware: Vec<MiddlewareRef>,
    compiled: OnceLock<CompiledPattern>,
    relaxed: OnceLock<CompiledPattern>,
}

impl RouteRecord {
    pub(crate) fn new(method: Method, uri: String, action: Action, constraints: Constraints) -> Self {
        Self {
            method,
            uri,
            action,
            name: None,
            constraints,
            middleware: Vec::new(),
            compiled: OnceLock::new(),
            relaxed: OnceLock::new(),
        }
    }

    /// HTTP method
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// URI template, including any group prefixes
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The action invoked on match
    #[must_use]
    pub const fn action(&self) -> &Action {
        &self.action
    }

    /// Route name, if one was assigned
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Per-placeholder constraints
    #[must_use]
    pub const fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Middleware, outermost first
    #[must_use]
    pub fn middleware(&self) -> &[MiddlewareRef] {
        &self.middleware
    }

    /// Compiled pattern honouring the constraints
    ///
    /// # Errors
    ///
    /// `Error::InvalidRoutePattern` if a constraint does not compile.
    pub fn pattern(&self) -> Result<&CompiledPattern> {
        if let Some(compiled) = self.compiled.get() {
            return Ok(compiled);
        }
        let compiled = CompiledPattern::compile(&self.uri, &self.constraints)?;
        Ok(self.compiled.get_or_init(|| compiled))
    }

    /// Compiled pattern with every placeholder at the default pattern
    pub(crate) fn relaxed_pattern(&self) -> Result<&CompiledPattern> {
        if let Some(compiled) = self.relaxed.get() {
            return Ok(compiled);
        }
        let compiled = CompiledPattern::compile(&self.uri, &Constraints::new())?;
        Ok(self.relaxed.get_or_init(|| compiled))
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    pub(crate) fn set_constraints(&mut self, constraints: Constraints) {
        self.constraints = constraints;
        self.compiled = OnceLock::new();
    }

    pub(crate) fn extend_middleware(&mut self, middleware: impl IntoIterator<Item = MiddlewareRef>) {
        self.middleware.extend(middleware);
    }

    /// Re-root the record under a group prefix and its middleware
    pub(crate) fn nest(&mut self, prefix: &str, middleware: &[MiddlewareRef]) {
        self.uri = format!("{prefix}{}", self.uri);
        let own = std::mem::take(&mut self.middleware);
        self.middleware = middleware.iter().cloned().chain(own).collect();
        self.compiled = OnceLock::new();
        self.relaxed = OnceLock::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use crate::response::Response;

    fn noop() -> Action {
        Action::from(handler(|_req| async { Ok(Response::text("")) }))
    }

    #[test]
    fn test_action_conversions() {
        assert!(matches!(Action::from("UserController@show"), Action::Reference(_)));
        assert!(matches!(
            Action::from(("UserController", "show")),
            Action::Controller { .. }
        ));
        assert!(matches!(noop(), Action::Handler(_)));
        assert_eq!(
            format!("{:?}", Action::from(("Users", "index"))),
            "Action::Controller(Users, index)"
        );
    }

    #[test]
    fn test_route_params_access() {
        let params: RouteParams = [("user", "ada"), ("id", "7")].into_iter().collect();
        assert_eq!(params.get("user"), Some("ada"));
        assert_eq!(params.parse::<u32>("id").unwrap(), 7);
        assert_eq!(params.values().collect::<Vec<_>>(), vec!["ada", "7"]);
        assert!(params.parse::<u32>("user").is_err());
        assert!(params.parse::<u32>("missing").is_err());
    }

    #[test]
    fn test_pattern_cache_reset_on_constraints() {
        let mut record = RouteRecord::new(Method::Get, "/users/{id}".into(), noop(), Constraints::new());
        assert!(record.pattern().unwrap().is_match("/users/abc"));

        record.set_constraints([("id".to_string(), "[0-9]+".to_string())].into_iter().collect());
        assert!(!record.pattern().unwrap().is_match("/users/abc"));
        assert!(record.relaxed_pattern().unwrap().is_match("/users/abc"));
    }

    #[test]
    fn test_nest_prepends_prefix_and_middleware() {
        let mut record = RouteRecord::new(Method::Get, "/ping".into(), noop(), Constraints::new());
        record.extend_middleware([MiddlewareRef::from("inner")]);
        record.nest("/api", &[MiddlewareRef::from("outer")]);

        assert_eq!(record.uri(), "/api/ping");
        let ids: Vec<String> = record.middleware().iter().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["outer", "inner"]);
        assert!(record.pattern().unwrap().is_match("/api/ping"));
    }
}
