//! # Router
//!
//! Registration, group scoping, reverse lookup and dispatch over a
//! [`RouteTable`].
//!
//! ## Matching
//!
//! Templates are tried in registration order and the first full match
//! wins, so specific templates must be registered before general ones
//! that would also match:
//!
//! ```ignore
//! router.get("/users/new", new_form);
//! router.get("/users/{id}", show).where_("id", "[0-9]+");
//! ```
//!
//! ## Registration handles
//!
//! [`Router::add_route`] returns a [`RouteHandle`] bound to the record it
//! just created; `middleware`, `name` and `where_` act on that record and
//! can be chained freely.
//!
//! The router is built once and then shared read-only (typically behind an
//! `Arc`) by every request.

use crate::config::RouterConfig;
use crate::controller::{Controller, ControllerRegistry};
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::middleware::{build_chain, IntoMiddlewareList, Middleware, MiddlewareRef, MiddlewareRegistry};
use crate::request::Request;
use crate::response::Response;
use crate::route::{Action, Constraints, RouteParams, RouteRecord};
use crate::table::{Bucket, RouteTable};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
}

impl Method {
    /// Every supported method
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Patch,
        Self::Head,
        Self::Options,
    ];

    /// Canonical upper-case token
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Convert from hyper's method type
    ///
    /// # Errors
    ///
    /// `Error::UnsupportedMethod` for verbs outside the supported set.
    pub fn from_hyper(method: &hyper::Method) -> Result<Self> {
        method.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnsupportedMethod {
                method: s.to_string(),
            })
    }
}

/// Attributes of a route group
#[derive(Debug, Clone, Default)]
pub struct GroupAttributes {
    prefix: String,
    middleware: Vec<MiddlewareRef>,
}

impl GroupAttributes {
    /// Empty attributes: no prefix, no middleware
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix prepended to every URI registered in the group
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Middleware prepended to every route registered in the group
    #[must_use]
    pub fn middleware(mut self, middleware: impl IntoMiddlewareList) -> Self {
        self.middleware.extend(middleware.into_middleware_list());
        self
    }
}

/// Snapshot of the groups enclosing the routes being registered
///
/// Each entry holds the accumulated prefix and middleware of its group and
/// every group around it. Entries are never mutated once pushed.
#[derive(Debug, Clone, Default)]
pub struct GroupScope {
    prefix: String,
    middleware: Vec<MiddlewareRef>,
}

impl GroupScope {
    /// Accumulated prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Accumulated middleware, outermost first
    #[must_use]
    pub fn middleware(&self) -> &[MiddlewareRef] {
        &self.middleware
    }
}

/// Outcome of route resolution
pub struct ResolvedRoute<'r> {
    /// The matched record
    pub record: &'r RouteRecord,
    /// Parameters extracted from the path
    pub params: RouteParams,
    /// The action, resolved into an invocable
    pub handler: Handler,
}

impl fmt::Debug for ResolvedRoute<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRoute")
            .field("record", self.record)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Use with [`Router::url_for`] for routes without placeholders
pub const NO_PARAMS: [(&str, &str); 0] = [];

/// The routing core
#[derive(Debug)]
pub struct Router {
    routes: RouteTable,
    /// URI template → constraints recorded with `where_`
    constraints: HashMap<String, Constraints>,
    /// Route name → URI template
    names: HashMap<String, String>,
    middleware: MiddlewareRegistry,
    controllers: ControllerRegistry,
    scopes: Vec<GroupScope>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create an empty router with the built-in middleware registered
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: RouteTable::new(),
            constraints: HashMap::new(),
            names: HashMap::new(),
            middleware: MiddlewareRegistry::with_builtins(),
            controllers: ControllerRegistry::new(),
            scopes: Vec::new(),
        }
    }

    /// Create a router with the alias table from `config`
    #[must_use]
    pub fn with_config(config: &RouterConfig) -> Self {
        let mut router = Self::new();
        for (alias, type_id) in &config.middleware {
            router.register_middleware_alias(alias.as_str(), type_id.as_str());
        }
        router
    }

    /// Register a middleware implementation under a type identifier
    pub fn register_middleware<M: Middleware + 'static>(&mut self, type_id: impl Into<String>, middleware: M) {
        self.middleware.register(type_id, middleware);
    }

    /// Point a middleware alias at a type identifier
    pub fn register_middleware_alias(&mut self, alias: impl Into<String>, type_id: impl Into<String>) {
        self.middleware.register_alias(alias, type_id);
    }

    /// Register a controller for `(controller, method)` actions
    pub fn register_controller<C: Controller + 'static>(&mut self, name: impl Into<String>, controller: C) {
        self.controllers.register(name, controller);
    }

    /// Register a route, overwriting any previous one for the same method and URI
    ///
    /// Constraints already recorded for `uri` apply to the new record.
    pub fn add_route(&mut self, method: Method, uri: &str, action: impl Into<Action>) -> RouteHandle<'_> {
        let constraints = self.constraints.get(uri).cloned().unwrap_or_default();
        self.routes
            .insert(RouteRecord::new(method, uri.to_string(), action.into(), constraints));
        debug!(%method, uri, depth = self.scopes.len(), "Route registered");

        RouteHandle {
            router: self,
            method,
            uri: uri.to_string(),
        }
    }

    /// Convenience method to add a GET route
    pub fn get(&mut self, uri: &str, action: impl Into<Action>) -> RouteHandle<'_> {
        self.add_route(Method::Get, uri, action)
    }

    /// Convenience method to add a POST route
    pub fn post(&mut self, uri: &str, action: impl Into<Action>) -> RouteHandle<'_> {
        self.add_route(Method::Post, uri, action)
    }

    /// Convenience method to add a PUT route
    pub fn put(&mut self, uri: &str, action: impl Into<Action>) -> RouteHandle<'_> {
        self.add_route(Method::Put, uri, action)
    }

    /// Convenience method to add a PATCH route
    pub fn patch(&mut self, uri: &str, action: impl Into<Action>) -> RouteHandle<'_> {
        self.add_route(Method::Patch, uri, action)
    }

    /// Convenience method to add a DELETE route
    pub fn delete(&mut self, uri: &str, action: impl Into<Action>) -> RouteHandle<'_> {
        self.add_route(Method::Delete, uri, action)
    }

    /// Convenience method to add an OPTIONS route
    pub fn options(&mut self, uri: &str, action: impl Into<Action>) -> RouteHandle<'_> {
        self.add_route(Method::Options, uri, action)
    }

    /// Register the routes added by `routes` under a prefix and middleware
    ///
    /// Routes land in a scratch table while `routes` runs, then each one is
    /// re-rooted under the group's prefix, gets the group's middleware in
    /// front of its own, and is merged into the enclosing table. Groups nest.
    ///
    /// ```ignore
    /// router.group(GroupAttributes::new().prefix("/api").middleware("auth"), |r| {
    ///     r.get("/ping", ping);
    ///     Ok(())
    /// })?;
    /// ```
    ///
    /// # Errors
    ///
    /// `Error::MiddlewareNotFound` for an unknown group middleware alias, or
    /// whatever `routes` returns. On failure nothing registered inside the
    /// group is kept.
    pub fn group<F>(&mut self, attributes: GroupAttributes, routes: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let GroupAttributes { prefix, middleware } = attributes;
        let middleware = self.middleware.resolve_aliases(middleware)?;

        let scope = match self.scopes.last() {
            Some(outer) => GroupScope {
                prefix: format!("{}{prefix}", outer.prefix),
                middleware: outer.middleware.iter().chain(&middleware).cloned().collect(),
            },
            None => GroupScope {
                prefix: prefix.clone(),
                middleware: middleware.clone(),
            },
        };
        debug!(prefix = %scope.prefix, "Entering route group");
        self.scopes.push(scope);

        let outer_routes = std::mem::take(&mut self.routes);
        let outer_constraints = std::mem::take(&mut self.constraints);

        let outcome = routes(self);

        let inner_routes = std::mem::replace(&mut self.routes, outer_routes);
        let inner_constraints = std::mem::replace(&mut self.constraints, outer_constraints);
        self.scopes.pop();
        outcome?;

        for (uri, constraints) in inner_constraints {
            let prefixed = format!("{prefix}{uri}");
            let merged = self.constraints.entry(prefixed.clone()).or_default();
            merged.extend(constraints);
            let merged = merged.clone();
            for record in self.routes.records_for_uri_mut(&prefixed) {
                record.set_constraints(merged.clone());
            }
        }

        let index_names = self.scopes.is_empty();
        for mut record in inner_routes.into_records() {
            record.nest(&prefix, &middleware);
            if let Some(constraints) = self.constraints.get(record.uri()) {
                record.set_constraints(constraints.clone());
            }
            if index_names {
                if let Some(name) = record.name() {
                    self.names.insert(name.to_string(), record.uri().to_string());
                }
            }
            self.routes.insert(record);
        }
        Ok(())
    }

    /// Build the URL of a named route by substituting `{param}` placeholders
    ///
    /// Substitution is literal; values are not encoded.
    ///
    /// # Errors
    ///
    /// `Error::NamedRouteNotFound` if no route carries `name`.
    pub fn url_for<I, K, V>(&self, name: &str, params: I) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: fmt::Display,
    {
        let template = self
            .names
            .get(name)
            .ok_or_else(|| Error::NamedRouteNotFound {
                name: name.to_string(),
            })?;

        let mut url = template.clone();
        for (key, value) in params {
            url = url.replace(&format!("{{{}}}", key.as_ref()), &value.to_string());
        }
        Ok(url)
    }

    /// A `302 Found` response pointing at a named route, or at `target`
    /// itself when it is already a path
    ///
    /// # Errors
    ///
    /// `Error::NamedRouteNotFound` if `target` is neither a path nor a known name.
    pub fn redirect<I, K, V>(&self, target: &str, params: I) -> Result<Response>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: fmt::Display,
    {
        let location = if target.starts_with('/') {
            target.to_string()
        } else {
            self.url_for(target, params)?
        };
        Ok(Response::redirect(&location, 302))
    }

    /// Find the route for `method` and `path` and resolve its action
    ///
    /// # Errors
    ///
    /// - `Error::MethodNotAllowed` when nothing of this method matches but other
    ///   methods claim the path
    /// - `Error::BadRequest` when the path only matches once constraints are ignored,
    ///   or a constrained parameter fails its pattern
    /// - `Error::RouteNotFound` when nothing matches
    /// - configuration errors for malformed constraints or unusable actions
    pub fn resolve(&self, method: Method, path: &str) -> Result<ResolvedRoute<'_>> {
        let bucket = self.routes.bucket(method);
        if let Some(bucket) = bucket {
            if let Some((record, params)) = Self::first_match(bucket, path)? {
                record.pattern()?.validate(&params)?;
                let handler = self.resolve_action(record.action())?;
                debug!(%method, path, uri = record.uri(), "Route matched");
                return Ok(ResolvedRoute {
                    record,
                    params,
                    handler,
                });
            }
        }

        // a path claimed by another method outranks a constraint miss
        let allowed = self.allowed_methods(method, path)?;
        if !allowed.is_empty() {
            return Err(Error::MethodNotAllowed {
                method,
                path: path.to_string(),
                allowed,
            });
        }
        if let Some(bucket) = bucket {
            Self::check_relaxed(bucket, path)?;
        }
        Err(Error::RouteNotFound {
            method,
            path: path.to_string(),
        })
    }

    fn first_match<'b>(bucket: &'b Bucket, path: &str) -> Result<Option<(&'b RouteRecord, RouteParams)>> {
        for record in bucket.iter() {
            if let Some(params) = record.pattern()?.captures(path) {
                return Ok(Some((record, params)));
            }
        }
        Ok(None)
    }

    /// Fail with `BadRequest` if a constrained route would match without its constraints
    fn check_relaxed(bucket: &Bucket, path: &str) -> Result<()> {
        for record in bucket.iter().filter(|r| !r.constraints().is_empty()) {
            if let Some(params) = record.relaxed_pattern()?.captures(path) {
                record.pattern()?.validate(&params)?;
                return Err(Error::BadRequest {
                    message: format!("Path [{path}] does not satisfy the constraints of [{}].", record.uri()),
                });
            }
        }
        Ok(())
    }

    /// Other methods under which `path` is registered, literally or by pattern
    fn allowed_methods(&self, method: Method, path: &str) -> Result<Vec<Method>> {
        let mut allowed = Vec::new();
        for (other, bucket) in self.routes.buckets() {
            if other == method {
                continue;
            }
            if bucket.contains(path) {
                allowed.push(other);
                continue;
            }
            for record in bucket.iter() {
                if record.pattern()?.is_match(path) {
                    allowed.push(other);
                    break;
                }
            }
        }
        Ok(allowed)
    }

    fn resolve_action(&self, action: &Action) -> Result<Handler> {
        match action {
            Action::Handler(handler) => Ok(handler.clone()),
            Action::Controller { controller, method } => self.controllers.resolve(controller, method),
            Action::Reference(reference) => match reference.split_once('@') {
                Some((controller, method)) if !controller.is_empty() && !method.is_empty() => {
                    self.controllers.resolve(controller, method)
                }
                _ => Err(Error::InvalidAction {
                    action: reference.clone(),
                }),
            },
        }
    }

    /// Resolve `req`, run it through the route's middleware and action
    ///
    /// Failures propagate unchanged; turning them into responses is the
    /// caller's job (see [`ErrorClassifier`](crate::classifier::ErrorClassifier)).
    ///
    /// # Errors
    ///
    /// Anything [`Router::resolve`] returns, `Error::InvalidMiddleware` for a
    /// middleware identifier without an implementation, or any failure raised
    /// by the middleware or action.
    pub async fn dispatch(&self, mut req: Request) -> Result<Response> {
        let ResolvedRoute {
            record,
            params,
            handler,
        } = self.resolve(req.method, &req.path)?;
        let layers = self.middleware.instantiate(record.middleware())?;
        req.set_params(params);

        build_chain(&layers, handler).run(req).await
    }

    /// Dispatch a bare method and path
    ///
    /// # Errors
    ///
    /// `Error::UnsupportedMethod` for an unknown verb, otherwise as [`Router::dispatch`].
    pub async fn dispatch_path(&self, method: &str, path: &str) -> Result<Response> {
        let method = method.parse()?;
        self.dispatch(Request::new(method, path)).await
    }

    /// Route name → URI template
    #[must_use]
    pub const fn named_routes(&self) -> &HashMap<String, String> {
        &self.names
    }

    /// Routes registered for `method`, in precedence order
    pub fn routes(&self, method: Method) -> impl Iterator<Item = &RouteRecord> {
        self.routes.bucket(method).into_iter().flat_map(Bucket::iter)
    }

    /// Total number of registered routes
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// The innermost enclosing group while routes are being registered
    #[must_use]
    pub fn current_scope(&self) -> Option<&GroupScope> {
        self.scopes.last()
    }
}

/// Handle on a just-registered route
///
/// Holds the router mutably until dropped, so registration and the
/// follow-up calls cannot interleave with other registrations.
pub struct RouteHandle<'r> {
    router: &'r mut Router,
    method: Method,
    uri: String,
}

impl<'r> RouteHandle<'r> {
    /// Append middleware to the route, resolving aliases
    ///
    /// # Errors
    ///
    /// `Error::MiddlewareNotFound` for an identifier that is neither an alias
    /// nor a registered type.
    pub fn middleware(self, middleware: impl IntoMiddlewareList) -> Result<Self> {
        let resolved = self
            .router
            .middleware
            .resolve_aliases(middleware.into_middleware_list())?;
        if let Some(record) = self.router.routes.get_mut(self.method, &self.uri) {
            record.extend_middleware(resolved);
        }
        Ok(self)
    }

    /// Name the route for reverse lookup
    pub fn name(self, name: impl Into<String>) -> Self {
        let name = name.into();
        if let Some(record) = self.router.routes.get_mut(self.method, &self.uri) {
            record.set_name(name.clone());
        }
        // group routes are indexed once their prefix is known
        if self.router.scopes.is_empty() {
            self.router.names.insert(name, self.uri.clone());
        }
        self
    }

    /// Constrain placeholder `parameter` to `pattern`
    ///
    /// Applies to every method registered under this URI, and to routes
    /// registered under it later.
    pub fn where_(self, parameter: impl Into<String>, pattern: impl Into<String>) -> Self {
        let constraints = self.router.constraints.entry(self.uri.clone()).or_default();
        constraints.insert(parameter.into(), pattern.into());
        let constraints = constraints.clone();

        for record in self.router.routes.records_for_uri_mut(&self.uri) {
            record.set_constraints(constraints.clone());
        }
        self
    }

    /// HTTP method of the route
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// URI template as registered (without enclosing group prefixes)
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl fmt::Debug for RouteHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandle")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .finish()
    }
}
