//! Named route modules.
//!
//! A [`RouteCatalog`] is the plugin table workers consult when the startup
//! context names the modules to load. Resolution is a map lookup; an unknown
//! name is an ordinary registration failure, not a panic.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use crate::process::BoxError;
use crate::routing::{builtin, RouteContext, RouteError};

/// A loadable set of HTTP handlers.
#[async_trait]
pub trait RouteModule: Send + Sync + 'static {
    /// Build this module's handlers for one worker.
    ///
    /// The returned router is merged into the worker's shared router.
    async fn register(&self, ctx: RouteContext) -> Result<Router, BoxError>;
}

/// Closure-backed [`RouteModule`].
pub struct FnRoute<F> {
    f: F,
}

impl<F> FnRoute<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> RouteModule for FnRoute<F>
where
    F: Fn(RouteContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Router, BoxError>> + Send + 'static,
{
    async fn register(&self, ctx: RouteContext) -> Result<Router, BoxError> {
        (self.f)(ctx).await
    }
}

/// Name → module table shared read-only with every worker.
#[derive(Clone, Default)]
pub struct RouteCatalog {
    modules: BTreeMap<String, Arc<dyn RouteModule>>,
}

impl RouteCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the built-in `health` and `identity` modules.
    pub fn with_builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert(builtin::HEALTH, builtin::Health);
        catalog.insert(builtin::IDENTITY, builtin::Identity);
        catalog
    }

    /// Add or replace a module.
    pub fn insert(&mut self, name: impl Into<String>, module: impl RouteModule) -> &mut Self {
        self.modules.insert(name.into(), Arc::new(module));
        self
    }

    /// Add or replace a closure-backed module.
    pub fn insert_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(RouteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Router, BoxError>> + Send + 'static,
    {
        self.insert(name, FnRoute::new(f))
    }

    /// Look up a module by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn RouteModule>, RouteError> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| RouteError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for RouteCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteCatalog")
            .field("modules", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_lists_modules() {
        let catalog = RouteCatalog::with_builtin();
        assert_eq!(catalog.names(), vec!["health", "identity"]);
    }

    #[test]
    fn unknown_module_is_not_found() {
        let catalog = RouteCatalog::new();
        assert!(matches!(
            catalog.resolve("orders"),
            Err(RouteError::NotFound(name)) if name == "orders"
        ));
    }

    #[test]
    fn insert_fn_registers_closure() {
        let mut catalog = RouteCatalog::new();
        catalog.insert_fn("noop", |_ctx| async { Ok(Router::new()) });
        assert!(catalog.contains("noop"));
        assert!(catalog.resolve("noop").is_ok());
    }
}
