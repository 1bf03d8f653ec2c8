//! Task engine
//!
//! The engine owns every [`TaskUnit`], the provider registry, the result sink
//! and the action runner. Dependencies are pulled lazily: a unit asks the
//! engine for a dependency by name, which delegates to that unit's
//! cache-first read and may run it.

use crate::config::{detect_circular_dependencies, validate_config, AppConfig};
use crate::error::{ConfigError, ConfigResult, ExecutionError, ExecutionResult};
use crate::runner::action::{ActionRunner, LogActionRunner};
use crate::runner::sink::{NullSink, ResultEvent, ResultSink};
use crate::runner::task::{TaskDefinition, TaskUnit};
use crate::runner::{Context, ProviderCatalog, ProviderHandle, ProviderRegistry};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tasks currently being resolved on one call path, outermost first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionChain {
    names: Vec<String>,
}

impl ResolutionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the chain with one more task
    pub fn with(&self, name: &str) -> Self {
        let mut names = self.names.clone();
        names.push(name.to_string());
        ResolutionChain { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn depth(&self) -> usize {
        self.names.len()
    }
}

impl fmt::Display for ResolutionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names.join(" -> "))
    }
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    definitions: Vec<TaskDefinition>,
    providers: ProviderRegistry,
    constants: HashMap<String, Value>,
    sink: Arc<dyn ResultSink>,
    action_runner: Arc<dyn ActionRunner>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        EngineBuilder {
            definitions: Vec::new(),
            providers: ProviderRegistry::new(),
            constants: HashMap::new(),
            sink: Arc::new(NullSink),
            action_runner: Arc::new(LogActionRunner),
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a parsed configuration
    ///
    /// The configuration is validated, providers are built through `catalog`
    /// and constants are bound into every task context.
    pub fn from_config(config: AppConfig, catalog: &ProviderCatalog) -> ConfigResult<Self> {
        validate_config(&config)?;

        let providers = ProviderRegistry::from_config(&config.providers, catalog);
        let definitions = config
            .tasks
            .into_iter()
            .map(TaskDefinition::from_config)
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(EngineBuilder::new()
            .tasks(definitions)
            .providers(providers)
            .constants(config.constants))
    }

    pub fn task(mut self, definition: TaskDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn tasks(mut self, definitions: impl IntoIterator<Item = TaskDefinition>) -> Self {
        self.definitions.extend(definitions);
        self
    }

    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    pub fn constant(mut self, name: impl Into<String>, value: Value) -> Self {
        self.constants.insert(name.into(), value);
        self
    }

    pub fn constants(mut self, constants: HashMap<String, Value>) -> Self {
        self.constants.extend(constants);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn action_runner(mut self, runner: Arc<dyn ActionRunner>) -> Self {
        self.action_runner = runner;
        self
    }

    /// Check the task graph and bind every task to its function
    pub fn build(self) -> ConfigResult<Engine> {
        let mut seen = HashSet::new();
        for def in &self.definitions {
            if !seen.insert(def.name.as_str()) {
                return Err(ConfigError::DuplicateTask(def.name.clone()));
            }
        }

        detect_circular_dependencies(
            self.definitions
                .iter()
                .map(|def| (def.name.as_str(), def.dependencies.as_slice())),
        )?;

        let mut order = Vec::with_capacity(self.definitions.len());
        let mut tasks = HashMap::with_capacity(self.definitions.len());
        for def in self.definitions {
            let (function, provider) = bind(&def, &self.providers);
            if let Some(interval) = def.interval {
                info!(task = %def.name, "Task scheduled (every {}s)", interval.as_secs_f64());
            }
            order.push(def.name.clone());
            tasks.insert(def.name.clone(), TaskUnit::new(def, function, provider));
        }

        Ok(Engine {
            tasks,
            order,
            providers: self.providers,
            constants: self.constants,
            sink: self.sink,
            action_runner: self.action_runner,
        })
    }
}

/// Resolve a task's function once; failures leave the task unbound
fn bind(
    def: &TaskDefinition,
    providers: &ProviderRegistry,
) -> (Option<crate::runner::BoundFunction>, Option<ProviderHandle>) {
    let Some(provider_name) = def.provider.as_deref() else {
        if def.function.is_some() {
            warn!(task = %def.name, "Task has a function but no provider; skipping function binding");
        } else {
            debug!(task = %def.name, "Task has no provider; skipping function binding");
        }
        return (None, None);
    };

    let Some(provider) = providers.get(provider_name) else {
        error!(
            task = %def.name,
            "Provider {} not found or failed to initialize", provider_name
        );
        return (None, None);
    };
    let handle = ProviderHandle {
        name: provider_name.to_string(),
        provider,
    };

    let Some(function_name) = def.function.as_deref() else {
        return (None, Some(handle));
    };
    match handle.provider.resolve(function_name) {
        Some(function) => {
            info!(
                task = %def.name,
                "Task bound to function {} of provider {}", function_name, provider_name
            );
            (Some(function), Some(handle))
        }
        None => {
            error!(
                task = %def.name,
                "Function {} not found in provider {}", function_name, provider_name
            );
            (None, Some(handle))
        }
    }
}

/// Registry of task units and their collaborators
pub struct Engine {
    tasks: HashMap<String, TaskUnit>,
    order: Vec<String>,
    providers: ProviderRegistry,
    constants: HashMap<String, Value>,
    sink: Arc<dyn ResultSink>,
    action_runner: Arc<dyn ActionRunner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("tasks", &self.order)
            .field("providers", &self.providers.names())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Run a fresh pass of a task; the trigger entry point
    pub async fn execute(&self, name: &str) -> ExecutionResult<Value> {
        let unit = self
            .tasks
            .get(name)
            .ok_or_else(|| ExecutionError::TaskNotFound(name.to_string()))?;
        unit.execute(self, &ResolutionChain::new()).await
    }

    /// Cache-first read of a task's result; `Null` for unknown tasks
    pub async fn get_data(&self, name: &str) -> Value {
        self.resolve(name, &ResolutionChain::new()).await
    }

    /// Dependency lookup along a resolution chain
    pub(crate) fn resolve<'a>(
        &'a self,
        name: &'a str,
        chain: &'a ResolutionChain,
    ) -> BoxFuture<'a, Value> {
        async move {
            match self.tasks.get(name) {
                Some(unit) => unit.get_result(self, chain).await,
                None => {
                    error!(chain = %chain, "Dependency task {} not found", name);
                    Value::Null
                }
            }
        }
        .boxed()
    }

    /// Provider handle by name
    pub fn get_provider(&self, name: &str) -> Option<ProviderHandle> {
        self.providers.get(name).map(|provider| ProviderHandle {
            name: name.to_string(),
            provider,
        })
    }

    /// Task unit by name
    pub fn task(&self, name: &str) -> Option<&TaskUnit> {
        self.tasks.get(name)
    }

    /// Task units in definition order
    pub fn tasks(&self) -> impl Iterator<Item = &TaskUnit> {
        self.order.iter().filter_map(|name| self.tasks.get(name))
    }

    /// Name and interval of every task an external trigger should drive
    pub fn scheduled(&self) -> Vec<(&str, Duration)> {
        self.tasks()
            .filter_map(|unit| unit.definition().interval.map(|i| (unit.name(), i)))
            .collect()
    }

    pub fn constants(&self) -> &HashMap<String, Value> {
        &self.constants
    }

    /// Close every provider
    pub async fn shutdown(&self) {
        info!("Shutting down engine");
        self.providers.close_all().await;
    }

    /// Fresh expression context holding the configured constants
    pub(crate) fn base_context(&self) -> Context {
        Context::new().with_vars(self.constants.clone())
    }

    pub(crate) fn record(&self, event: ResultEvent) {
        self.sink.record(event);
    }

    /// Dispatch an action without waiting for it
    pub(crate) fn dispatch_action(
        &self,
        task: &str,
        path: &Path,
        provider: Option<ProviderHandle>,
        context: Context,
    ) {
        info!(task = %task, "Triggering action: {}", path.display());
        let runner = self.action_runner.clone();
        let task = task.to_string();
        let path = path.to_path_buf();
        tokio::spawn(async move {
            if let Err(error) = runner.run(&task, &path, provider, context).await {
                let error = ExecutionError::Action { path, error };
                error!(task = %task, "{:#}", error);
            }
        });
    }
}
