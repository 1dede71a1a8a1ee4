//! Per-vhost handler registry: an insertion-ordered list of routes matched
//! by compiled regex against the normalized request path.

use crate::errors::RegistryError;
use crate::executor::HandlerFn;
use regex::Regex;
use tokio::sync::RwLock;

/// HTTP method a route slot is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    Get,
    Post,
}

/// A single (pattern, GET handler, POST handler) entry.
///
/// `built_in` routes (the admin endpoints) refuse [`Registry::drop_route`].
pub struct Route {
    pattern: String,
    regex: Regex,
    get: Option<HandlerFn>,
    post: Option<HandlerFn>,
    built_in: bool,
    pub(crate) success_count: u64,
    pub(crate) failure_count: u64,
}

impl Route {
    fn handler_for(&self, method: RouteMethod) -> Option<&HandlerFn> {
        match method {
            RouteMethod::Get => self.get.as_ref(),
            RouteMethod::Post => self.post.as_ref(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_built_in(&self) -> bool {
        self.built_in
    }

    pub fn handler(&self, method: RouteMethod) -> Option<&HandlerFn> {
        self.handler_for(method)
    }
}

/// Ordered, RW-locked collection of [`Route`]s for one virtual host.
///
/// Lookup is a linear first-match scan (§4.4); the registry is read on every
/// request and written only by the reload/admin path, so a `tokio::sync`
/// reader-writer lock (rather than a plain mutex) lets concurrent requests
/// look routes up without blocking each other.
pub struct Registry {
    routes: RwLock<Vec<Route>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
        }
    }

    /// Registers `handler` for `pattern`/`method`. If the pattern already
    /// exists, the method's slot is updated in place (leaving the other
    /// method's handler, if any, untouched); otherwise a new route is
    /// appended at the end of the list.
    pub async fn add(
        &self,
        method: RouteMethod,
        pattern: &str,
        handler: HandlerFn,
        built_in: bool,
    ) -> Result<(), RegistryError> {
        let mut routes = self.routes.write().await;

        if let Some(route) = routes.iter_mut().find(|r| r.pattern == pattern) {
            match method {
                RouteMethod::Get => route.get = Some(handler),
                RouteMethod::Post => route.post = Some(handler),
            }
            return Ok(());
        }

        let regex = Regex::new(pattern)?;
        let mut route = Route {
            pattern: pattern.to_string(),
            regex,
            get: None,
            post: None,
            built_in,
            success_count: 0,
            failure_count: 0,
        };
        match method {
            RouteMethod::Get => route.get = Some(handler),
            RouteMethod::Post => route.post = Some(handler),
        }
        routes.push(route);
        Ok(())
    }

    /// Drops the `method` slot of the route matching `pattern` exactly.
    /// Refuses if the route is `built_in`. If clearing the slot leaves the
    /// other method populated, the entry is kept; otherwise it is erased.
    pub async fn drop_route(
        &self,
        method: RouteMethod,
        pattern: &str,
    ) -> Result<(), RegistryError> {
        let mut routes = self.routes.write().await;

        let idx = routes
            .iter()
            .position(|r| r.pattern == pattern)
            .ok_or(RegistryError::NotFound)?;

        if routes[idx].built_in {
            return Err(RegistryError::BuiltIn);
        }

        match method {
            RouteMethod::Get => routes[idx].get = None,
            RouteMethod::Post => routes[idx].post = None,
        }

        if routes[idx].get.is_none() && routes[idx].post.is_none() {
            routes.remove(idx);
        }

        Ok(())
    }

    /// Exact pattern-string match, irrespective of method.
    pub async fn exists(&self, pattern: &str) -> bool {
        self.routes.read().await.iter().any(|r| r.pattern == pattern)
    }

    /// First regex-matching route (against the normalized `path`) whose
    /// `method` slot is populated.
    pub async fn find(&self, method: RouteMethod, path: &str) -> Option<RouteStats> {
        let routes = self.routes.read().await;
        routes
            .iter()
            .find(|r| r.handler_for(method).is_some() && r.regex.is_match(path))
            .map(|r| RouteStats {
                pattern: r.pattern.clone(),
                handler: r.handler_for(method).cloned(),
            })
    }

    /// Records a handler invocation's outcome against its route, by pattern.
    pub async fn record_outcome(&self, pattern: &str, success: bool) {
        let mut routes = self.routes.write().await;
        if let Some(route) = routes.iter_mut().find(|r| r.pattern == pattern) {
            if success {
                route.success_count += 1;
            } else {
                route.failure_count += 1;
            }
        }
    }

    /// Snapshot of `(pattern, successes, failures)` for status reporting.
    pub async fn stats(&self) -> Vec<(String, u64, u64)> {
        self.routes
            .read()
            .await
            .iter()
            .map(|r| (r.pattern.clone(), r.success_count, r.failure_count))
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolved route handle: the matched pattern (for stats bookkeeping) plus
/// the handler to invoke.
pub struct RouteStats {
    pub pattern: String,
    pub handler: Option<HandlerFn>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn noop_handler() -> HandlerFn {
        Arc::new(|_req| Box::pin(async { crate::executor::HandlerOutcome::ok(Vec::new()) }))
    }

    #[tokio::test]
    async fn first_match_wins() {
        let registry = Registry::new();
        registry
            .add(RouteMethod::Get, "^/a/.*$", noop_handler(), false)
            .await
            .unwrap();
        registry
            .add(RouteMethod::Get, "^/a/b$", noop_handler(), false)
            .await
            .unwrap();

        let found = registry.find(RouteMethod::Get, "/a/b").await.unwrap();
        assert_eq!(found.pattern, "^/a/.*$");
    }

    #[tokio::test]
    async fn built_in_route_refuses_drop() {
        let registry = Registry::new();
        registry
            .add(RouteMethod::Get, "^/internal/status$", noop_handler(), true)
            .await
            .unwrap();

        let err = registry
            .drop_route(RouteMethod::Get, "^/internal/status$")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::BuiltIn));
        assert!(registry.exists("^/internal/status$").await);
    }

    #[tokio::test]
    async fn drop_missing_route_errors() {
        let registry = Registry::new();
        let err = registry
            .drop_route(RouteMethod::Get, "^/nope$")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound));
    }

    #[tokio::test]
    async fn add_same_pattern_updates_slot_in_place() {
        let registry = Registry::new();
        registry
            .add(RouteMethod::Get, "^/x$", noop_handler(), false)
            .await
            .unwrap();
        registry
            .add(RouteMethod::Post, "^/x$", noop_handler(), false)
            .await
            .unwrap();

        assert!(registry.find(RouteMethod::Get, "/x").await.is_some());
        assert!(registry.find(RouteMethod::Post, "/x").await.is_some());
    }
}
