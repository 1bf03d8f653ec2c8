//! Task definitions and their runtime units
//!
//! A [`TaskDefinition`] is the immutable description of a task. A
//! [`TaskUnit`] owns one definition together with its bound function, its
//! result cache and its execution lock, and lives for the whole process.

use crate::config::TaskConfig;
use crate::error::{ConfigError, ConfigResult, ExecutionError, ExecutionResult};
use crate::runner::cache::{ResultCache, DEFAULT_TTL};
use crate::runner::context::{LAST_BINDING, THIS_BINDING};
use crate::runner::engine::{Engine, ResolutionChain};
use crate::runner::sink::{Provenance, ResultEvent};
use crate::runner::{
    evaluate, evaluate_condition, render, BoundFunction, Context, Kwargs, ProviderHandle,
};
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Log target for rendered task log lines
pub const TASK_LOG_TARGET: &str = "cryptom::task_log";

/// Immutable task description
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    /// Unique task name; also the name the result is bound under
    pub name: String,

    /// Provider the function is resolved against
    pub provider: Option<String>,

    /// Function name on the provider
    pub function: Option<String>,

    /// Positional arguments; strings are evaluated as expressions
    pub args: Vec<Value>,

    /// Keyword arguments; string values are evaluated as expressions
    pub kwargs: Kwargs,

    /// Tasks read before this one computes its result
    pub dependencies: Vec<String>,

    /// Trigger cadence; absent for reactive tasks
    pub interval: Option<Duration>,

    /// Expression reshaping the raw function result
    pub return_expr: Option<String>,

    /// Gate for the log line and the action
    pub condition: Option<String>,

    /// Log template
    pub log: Option<String>,

    /// Action dispatched when the condition holds
    pub action: Option<PathBuf>,
}

impl TaskDefinition {
    /// Create a definition with nothing but a name
    pub fn new(name: impl Into<String>) -> Self {
        TaskDefinition {
            name: name.into(),
            provider: None,
            function: None,
            args: Vec::new(),
            kwargs: Kwargs::new(),
            dependencies: Vec::new(),
            interval: None,
            return_expr: None,
            condition: None,
            log: None,
            action: None,
        }
    }

    /// Convert a configuration entry, folding legacy `params` into arguments
    pub fn from_config(mut config: TaskConfig) -> ConfigResult<Self> {
        config.normalize_params();

        let interval = match config.interval {
            Some(0) => {
                return Err(ConfigError::Invalid(format!(
                    "Task '{}' interval must be greater than zero",
                    config.name
                )))
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(TaskDefinition {
            name: config.name,
            provider: config.provider,
            function: config.function,
            args: config.args,
            kwargs: config.kwargs,
            dependencies: config.dependencies,
            interval,
            return_expr: config.return_expr,
            condition: config.condition,
            log: config.log,
            action: config.action.map(PathBuf::from),
        })
    }

    pub fn with_function(mut self, provider: impl Into<String>, function: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.function = Some(function.into());
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_return(mut self, expr: impl Into<String>) -> Self {
        self.return_expr = Some(expr.into());
        self
    }

    pub fn with_condition(mut self, expr: impl Into<String>) -> Self {
        self.condition = Some(expr.into());
        self
    }

    pub fn with_log(mut self, template: impl Into<String>) -> Self {
        self.log = Some(template.into());
        self
    }

    pub fn with_action(mut self, path: impl Into<PathBuf>) -> Self {
        self.action = Some(path.into());
        self
    }

    /// Cache validity window: the interval, or [`DEFAULT_TTL`] for reactive tasks
    pub fn ttl(&self) -> Duration {
        self.interval.unwrap_or(DEFAULT_TTL)
    }
}

/// Evaluate call arguments in an empty context
///
/// Arguments never see dependency results. A string that does not evaluate
/// (`BTC/USDT`, a bare word) is passed through as a literal.
pub fn evaluate_arguments(args: &[Value], kwargs: &Kwargs) -> (Vec<Value>, Kwargs) {
    let empty = Context::new();
    let eval_one = |value: &Value| match value {
        Value::String(source) => evaluate(source, &empty).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    };

    let args = args.iter().map(eval_one).collect();
    let kwargs = kwargs
        .iter()
        .map(|(key, value)| (key.clone(), eval_one(value)))
        .collect();
    (args, kwargs)
}

/// Symbol a call is about: `kwargs["symbol"]`, else the first string argument
pub fn symbol_hint(args: &[Value], kwargs: &Kwargs) -> Option<String> {
    if let Some(Value::String(symbol)) = kwargs.get("symbol") {
        return Some(symbol.clone());
    }
    args.iter().find_map(|arg| arg.as_str().map(str::to_string))
}

/// Clears the running flag when a pass ends, including on cancellation
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        RunningGuard(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runtime state of one task
pub struct TaskUnit {
    definition: TaskDefinition,
    function: Option<BoundFunction>,
    provider: Option<ProviderHandle>,
    cache: RwLock<ResultCache>,
    lock: Mutex<()>,
    running: AtomicBool,
    executed_once: AtomicBool,
}

impl std::fmt::Debug for TaskUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskUnit")
            .field("name", &self.definition.name)
            .field("bound", &self.function.is_some())
            .field("running", &self.is_running())
            .field("executed_once", &self.has_executed())
            .finish_non_exhaustive()
    }
}

impl TaskUnit {
    /// Create a unit from a definition and its bindings
    pub fn new(
        definition: TaskDefinition,
        function: Option<BoundFunction>,
        provider: Option<ProviderHandle>,
    ) -> Self {
        let ttl = definition.ttl();
        TaskUnit {
            definition,
            function,
            provider,
            cache: RwLock::new(ResultCache::new(ttl)),
            lock: Mutex::new(()),
            running: AtomicBool::new(false),
            executed_once: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    pub fn ttl(&self) -> Duration {
        self.cache.read().ttl()
    }

    /// Whether a function was bound at construction
    pub fn is_bound(&self) -> bool {
        self.function.is_some()
    }

    /// True while a pass is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True once any pass has completed, successfully or not
    pub fn has_executed(&self) -> bool {
        self.executed_once.load(Ordering::SeqCst)
    }

    /// Last committed value regardless of age
    pub fn cached(&self) -> Option<Value> {
        self.cache.read().get_force().cloned()
    }

    /// Last committed value while it is still valid
    pub fn cached_valid(&self) -> Option<Value> {
        self.cache.read().get().cloned()
    }

    fn best_effort(&self) -> Value {
        self.cached().unwrap_or(Value::Null)
    }

    /// Cache-first read used by dependents
    ///
    /// A valid cache is returned without locking. While a pass is in flight
    /// and an earlier one has completed, the current (possibly stale) value
    /// is returned instead of queueing. Otherwise the caller takes the lock,
    /// re-checks, and runs a pass if the cache is still invalid.
    pub async fn get_result(&self, engine: &Engine, chain: &ResolutionChain) -> Value {
        let fresh = self.cached_valid();
        if let Some(value) = fresh {
            return value;
        }

        if self.is_running() && self.has_executed() {
            debug!(task = %self.name(), "Pass in flight, serving cached value");
            return self.best_effort();
        }

        if chain.contains(self.name()) {
            warn!(
                task = %self.name(),
                chain = %chain,
                "Task depends on itself, serving cached value"
            );
            return self.best_effort();
        }

        let _guard = self.lock.lock().await;
        let fresh = self.cached_valid();
        if let Some(value) = fresh {
            return value;
        }

        // Failures are logged by the pass; readers fall back to the cache
        let _ = self.run_locked(engine, chain).await;
        self.best_effort()
    }

    /// Run a fresh pass under the lock, ignoring cache validity
    pub async fn execute(&self, engine: &Engine, chain: &ResolutionChain) -> ExecutionResult<Value> {
        let _guard = self.lock.lock().await;
        self.run_locked(engine, chain).await
    }

    /// Run one pass; the caller holds `self.lock`
    async fn run_locked(&self, engine: &Engine, chain: &ResolutionChain) -> ExecutionResult<Value> {
        let _running = RunningGuard::enter(&self.running);
        let result = self.core_execute(engine, chain).await;
        self.executed_once.store(true, Ordering::SeqCst);
        result
    }

    async fn core_execute(&self, engine: &Engine, chain: &ResolutionChain) -> ExecutionResult<Value> {
        let name = self.name();
        info!(task = %name, "Executing task");

        let mut ctx = engine.base_context();
        ctx.set_var(LAST_BINDING, self.best_effort());
        ctx.set_var(name, Value::Null);

        let chain = chain.with(name);
        for dependency in &self.definition.dependencies {
            let value = engine.resolve(dependency, &chain).await;
            ctx.set_var(dependency.clone(), value);
        }

        let (args, kwargs) = evaluate_arguments(&self.definition.args, &self.definition.kwargs);
        let provenance = Provenance {
            provider: self.definition.provider.clone(),
            symbol: symbol_hint(&args, &kwargs),
            function: self.definition.function.clone(),
        };

        let raw = match &self.function {
            Some(function) => match function.call(args, kwargs).await {
                Ok(value) => value,
                Err(error) => {
                    let error = ExecutionError::FunctionFailed {
                        task: name.to_string(),
                        error,
                    };
                    error!(task = %name, "{:#}", error);
                    return Err(error);
                }
            },
            None => Value::Null,
        };
        ctx.set_var(name, raw.clone());
        ctx.set_var(THIS_BINDING, raw.clone());

        let result = match &self.definition.return_expr {
            Some(expr) => self.apply_return(expr, &ctx)?,
            None => raw,
        };
        ctx.set_var(name, result.clone());
        ctx.set_var(THIS_BINDING, result.clone());

        self.cache.write().update(result.clone());
        engine.record(ResultEvent {
            task: name.to_string(),
            value: result.clone(),
            timestamp: Utc::now(),
            provenance,
        });

        match evaluate_condition(self.definition.condition.as_deref(), &ctx) {
            Ok(true) => {}
            Ok(false) => {
                debug!(task = %name, "Condition not met");
                return Ok(result);
            }
            Err(e) => {
                error!(task = %name, "Condition check error: {}", e);
                return Ok(result);
            }
        }

        if let Some(template) = &self.definition.log {
            match render(template, &ctx) {
                Ok(line) => info!(target: TASK_LOG_TARGET, task = %name, "{}", line),
                Err(e) => error!(task = %name, "Log format error: {}", e),
            }
        }

        if let Some(path) = &self.definition.action {
            engine.dispatch_action(name, path, self.provider.clone(), ctx);
        }

        Ok(result)
    }

    /// Evaluate the return expression; a string result is evaluated once more
    fn apply_return(&self, expr: &str, ctx: &Context) -> ExecutionResult<Value> {
        let value = evaluate(expr, ctx).map_err(|error| {
            let error = ExecutionError::ReturnExpression {
                task: self.name().to_string(),
                error,
            };
            error!(task = %self.name(), "{}", error);
            error
        })?;

        match value {
            Value::String(inner) => Ok(evaluate(&inner, ctx).unwrap_or(Value::String(inner))),
            other => Ok(other),
        }
    }
}
