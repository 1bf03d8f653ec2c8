//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use cryptom::runner::{
    async_fn, sync_fn, ActionRunner, BoundFunction, Context, FunctionTable, ProviderHandle,
    ProviderRegistry,
};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::Layer;

/// Create a temporary directory with a cryptom.yaml file
pub fn create_test_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("cryptom.yaml");
    fs::write(&config_path, content).unwrap();
    (temp_dir, config_path)
}

/// Call counters shared with a test function
#[derive(Debug, Default)]
pub struct Calls {
    total: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> usize {
        let n = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        n
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Synchronous function returning a fixed value
pub fn constant_fn(value: Value) -> (BoundFunction, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let counter = calls.clone();
    let function = sync_fn(move |_, _| {
        counter.enter();
        counter.leave();
        Ok(value.clone())
    });
    (function, calls)
}

/// Function built from the call number (1-based), sleeping `delay` first
pub fn sequence_fn<F>(delay: Duration, respond: F) -> (BoundFunction, Arc<Calls>)
where
    F: Fn(usize) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    let calls = Arc::new(Calls::default());
    let counter = calls.clone();
    let respond = Arc::new(respond);
    let function = async_fn(move |_, _| {
        let counter = counter.clone();
        let respond = respond.clone();
        async move {
            let n = counter.enter();
            tokio::time::sleep(delay).await;
            counter.leave();
            respond(n)
        }
    });
    (function, calls)
}

/// Function echoing its arguments back
pub fn echo_fn() -> BoundFunction {
    sync_fn(|args, kwargs| Ok(json!({"args": args, "kwargs": kwargs})))
}

/// Registry with a single provider built from named functions
pub fn registry(provider: &str, functions: Vec<(&str, BoundFunction)>) -> ProviderRegistry {
    let table = functions
        .into_iter()
        .fold(FunctionTable::new(), |table, (name, f)| table.with_function(name, f));
    ProviderRegistry::new().with_provider(provider, Arc::new(table))
}

/// An action dispatch captured by [`RecordingActionRunner`]
#[derive(Debug, Clone)]
pub struct RecordedAction {
    pub task: String,
    pub path: PathBuf,
    pub provider: Option<String>,
    pub context: Context,
}

/// Action runner forwarding every dispatch to a channel
pub struct RecordingActionRunner {
    tx: mpsc::UnboundedSender<RecordedAction>,
    fail: bool,
}

impl RecordingActionRunner {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RecordedAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(RecordingActionRunner { tx, fail: false }), rx)
    }

    /// Records the dispatch, then reports failure
    pub fn failing() -> (Arc<Self>, mpsc::UnboundedReceiver<RecordedAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(RecordingActionRunner { tx, fail: true }), rx)
    }
}

#[async_trait]
impl ActionRunner for RecordingActionRunner {
    async fn run(
        &self,
        task: &str,
        path: &Path,
        provider: Option<ProviderHandle>,
        context: Context,
    ) -> anyhow::Result<()> {
        let _ = self.tx.send(RecordedAction {
            task: task.to_string(),
            path: path.to_path_buf(),
            provider: provider.map(|p| p.name),
            context,
        });
        if self.fail {
            anyhow::bail!("action failed");
        }
        Ok(())
    }
}

/// A log event captured by [`CaptureLayer`]
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    pub target: String,
    pub message: String,
    pub task: Option<String>,
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    task: Option<String>,
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "task" => self.task = Some(format!("{:?}", value)),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "task" => self.task = Some(value.to_string()),
            _ => {}
        }
    }
}

/// Layer recording every event it sees
#[derive(Clone, Default)]
pub struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureLayer {
    /// Events logged on `target` so far
    pub fn on_target(&self, target: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.target == target)
            .cloned()
            .collect()
    }

    /// Whether any event message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|event| event.message.contains(needle))
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        self.events.lock().push(CapturedEvent {
            target: event.metadata().target().to_string(),
            message: visitor.message,
            task: visitor.task,
        });
    }
}

/// Capture events logged on the current thread until the guard drops
///
/// Tests using this run on tokio's current-thread runtime, so every poll
/// of the engine happens on the thread the subscriber is installed on.
pub fn capture_logs() -> (CaptureLayer, tracing::subscriber::DefaultGuard) {
    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    (layer, tracing::subscriber::set_default(subscriber))
}
