//! Provider registry
//!
//! A provider is an opaque handle (an exchange client, a data feed) exposing
//! named functions. Tasks bind to one function by name once, at engine
//! construction, and call it on every pass without knowing whether it is
//! synchronous or asynchronous.

use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Keyword arguments handed to a task function
pub type Kwargs = Map<String, Value>;

/// A callable bound to a task
#[async_trait]
pub trait TaskFunction: Send + Sync {
    /// Call the function with evaluated arguments
    async fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> anyhow::Result<Value>;
}

/// Shared handle to a bound function
pub type BoundFunction = Arc<dyn TaskFunction>;

/// A named source of task functions
#[async_trait]
pub trait Provider: Send + Sync {
    /// Look up a function by name
    fn resolve(&self, function: &str) -> Option<BoundFunction>;

    /// Release held resources at shutdown
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A provider together with the name it is registered under
#[derive(Clone)]
pub struct ProviderHandle {
    pub name: String,
    pub provider: Arc<dyn Provider>,
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

struct SyncFn<F>(F);

#[async_trait]
impl<F> TaskFunction for SyncFn<F>
where
    F: Fn(Vec<Value>, Kwargs) -> anyhow::Result<Value> + Send + Sync,
{
    async fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> anyhow::Result<Value> {
        (self.0)(args, kwargs)
    }
}

struct AsyncFn<F>(F);

#[async_trait]
impl<F, Fut> TaskFunction for AsyncFn<F>
where
    F: Fn(Vec<Value>, Kwargs) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> anyhow::Result<Value> {
        (self.0)(args, kwargs).await
    }
}

/// Wrap a synchronous closure as a task function
pub fn sync_fn<F>(f: F) -> BoundFunction
where
    F: Fn(Vec<Value>, Kwargs) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(SyncFn(f))
}

/// Wrap an asynchronous closure as a task function
pub fn async_fn<F, Fut>(f: F) -> BoundFunction
where
    F: Fn(Vec<Value>, Kwargs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(AsyncFn(f))
}

/// In-memory provider backed by a table of named functions
#[derive(Default, Clone)]
pub struct FunctionTable {
    functions: HashMap<String, BoundFunction>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function
    pub fn with_function(mut self, name: impl Into<String>, function: BoundFunction) -> Self {
        self.functions.insert(name.into(), function);
        self
    }

    /// Registered function names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl Provider for FunctionTable {
    fn resolve(&self, function: &str) -> Option<BoundFunction> {
        self.functions.get(function).cloned()
    }
}

/// Factory building a provider from its configuration entry
pub type ProviderFactory =
    Box<dyn Fn(&ProviderConfig) -> anyhow::Result<Arc<dyn Provider>> + Send + Sync>;

/// Known provider kinds
#[derive(Default)]
pub struct ProviderCatalog {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a provider kind
    pub fn register<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ProviderConfig) -> anyhow::Result<Arc<dyn Provider>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
        self
    }

    /// Check whether a kind is known
    pub fn supports(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    fn build(&self, config: &ProviderConfig) -> anyhow::Result<Option<Arc<dyn Provider>>> {
        match self.factories.get(&config.kind()) {
            Some(factory) => factory(config).map(Some),
            None => Ok(None),
        }
    }
}

/// Name → provider mapping, built once at startup
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured provider
    ///
    /// Unknown kinds and failing factories are logged and skipped; tasks bound
    /// to a skipped provider run without a function.
    pub fn from_config(configs: &[ProviderConfig], catalog: &ProviderCatalog) -> Self {
        let mut registry = ProviderRegistry::new();
        for config in configs {
            match catalog.build(config) {
                Ok(Some(provider)) => {
                    info!("Provider initialized: {}", config.name);
                    registry.providers.insert(config.name.clone(), provider);
                }
                Ok(None) => error!(
                    "Provider {} has unsupported kind '{}'",
                    config.name,
                    config.kind()
                ),
                Err(e) => error!("Failed to initialize provider {}: {:#}", config.name, e),
            }
        }
        registry
    }

    /// Register a provider under a name
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    /// Look up a provider; absent when unknown
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve a provider function; absent when either part is unknown
    pub fn resolve(&self, provider: &str, function: &str) -> Option<BoundFunction> {
        self.providers.get(provider)?.resolve(function)
    }

    /// Registered provider names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Close every provider, logging failures
    pub async fn close_all(&self) {
        for (name, provider) in &self.providers {
            match provider.close().await {
                Ok(()) => info!("Provider closed: {}", name),
                Err(e) => warn!("Error closing provider {}: {:#}", name, e),
            }
        }
    }
}
