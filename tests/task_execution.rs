//! Integration tests for task execution

mod common;

use common::{capture_logs, constant_fn, echo_fn, registry, sequence_fn, RecordingActionRunner};
use cryptom::error::ExecutionError;
use cryptom::runner::{
    ChannelSink, Engine, JsonLinesSink, ResolutionChain, StoredRecord, TaskDefinition, DEFAULT_TTL,
    TASK_LOG_TARGET,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{advance, Instant};

const SLOW: Duration = Duration::from_millis(100);

fn price_task(name: &str, symbol: &str) -> TaskDefinition {
    TaskDefinition::new(name)
        .with_function("OKX", "fetch_ticker")
        .with_args(vec![json!(symbol)])
        .with_interval(Duration::from_secs(5))
}

#[tokio::test(start_paused = true)]
async fn test_cached_result_served_within_ttl() {
    let (ticker, calls) = constant_fn(json!({"last": 42000}));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price_btc", "BTC/USDT").with_return("price_btc[\"last\"]"))
        .build()
        .unwrap();

    assert_eq!(engine.execute("price_btc").await.unwrap(), json!(42000));

    advance(Duration::from_secs(2)).await;
    assert_eq!(engine.get_data("price_btc").await, json!(42000));
    assert_eq!(calls.total(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_cache_triggers_fresh_pass() {
    let (ticker, calls) = sequence_fn(Duration::ZERO, |n| Ok(json!(41000 + n as i64)));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price_btc", "BTC/USDT"))
        .build()
        .unwrap();

    assert_eq!(engine.get_data("price_btc").await, json!(41001));
    advance(Duration::from_secs(5)).await;
    assert_eq!(engine.get_data("price_btc").await, json!(41002));
    assert_eq!(calls.total(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reactive_task_uses_default_ttl() {
    let (ticker, calls) = constant_fn(json!(1));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(TaskDefinition::new("reactive").with_function("OKX", "fetch_ticker"))
        .build()
        .unwrap();

    assert_eq!(engine.task("reactive").unwrap().ttl(), DEFAULT_TTL);
    engine.get_data("reactive").await;
    advance(DEFAULT_TTL - Duration::from_millis(1)).await;
    engine.get_data("reactive").await;
    assert_eq!(calls.total(), 1);

    advance(Duration::from_millis(1)).await;
    engine.get_data("reactive").await;
    assert_eq!(calls.total(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_execute_ignores_valid_cache() {
    let (ticker, calls) = constant_fn(json!(1));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price_btc", "BTC/USDT"))
        .build()
        .unwrap();

    engine.execute("price_btc").await.unwrap();
    engine.execute("price_btc").await.unwrap();
    assert_eq!(calls.total(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_condition_false_still_commits() {
    let (btc, _) = constant_fn(json!({"last": 42050}));
    let (eth, _) = constant_fn(json!({"last": 42000}));
    let (runner, mut actions) = RecordingActionRunner::new();

    let engine = Engine::builder()
        .providers(registry("OKX", vec![("btc", btc), ("eth", eth)]))
        .task(TaskDefinition::new("price_btc").with_function("OKX", "btc"))
        .task(TaskDefinition::new("price_eth").with_function("OKX", "eth"))
        .task(
            TaskDefinition::new("spread")
                .with_dependencies(["price_btc", "price_eth"])
                .with_return("price_btc['last'] - price_eth['last']")
                .with_condition("spread > 100")
                .with_log("spread={spread}")
                .with_action("notify.sh"),
        )
        .action_runner(runner)
        .build()
        .unwrap();

    assert_eq!(engine.execute("spread").await.unwrap(), json!(50));
    assert_eq!(engine.task("spread").unwrap().cached(), Some(json!(50)));

    tokio::task::yield_now().await;
    assert!(actions.try_recv().is_err());
}

fn spread_engine(btc_last: i64) -> Engine {
    let (btc, _) = constant_fn(json!({"last": btc_last}));
    let (eth, _) = constant_fn(json!({"last": 42000}));
    Engine::builder()
        .providers(registry("OKX", vec![("btc", btc), ("eth", eth)]))
        .task(TaskDefinition::new("price_btc").with_function("OKX", "btc"))
        .task(TaskDefinition::new("price_eth").with_function("OKX", "eth"))
        .task(
            TaskDefinition::new("spread")
                .with_dependencies(["price_btc", "price_eth"])
                .with_return("price_btc['last'] - price_eth['last']")
                .with_condition("spread > 100")
                .with_log("spread={spread}"),
        )
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_log_line_emitted_when_condition_holds() {
    let (logs, _guard) = capture_logs();
    let engine = spread_engine(42150);

    assert_eq!(engine.execute("spread").await.unwrap(), json!(150));

    let lines = logs.on_target(TASK_LOG_TARGET);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].message, "spread=150");
    assert_eq!(lines[0].task.as_deref(), Some("spread"));
}

#[tokio::test(start_paused = true)]
async fn test_log_line_suppressed_when_condition_fails() {
    let (logs, _guard) = capture_logs();
    let engine = spread_engine(42050);

    assert_eq!(engine.execute("spread").await.unwrap(), json!(50));
    assert!(logs.on_target(TASK_LOG_TARGET).is_empty());
    assert!(!logs.contains("spread=50"));
}

#[tokio::test(start_paused = true)]
async fn test_oversized_format_precision_is_non_fatal() {
    let (logs, _guard) = capture_logs();
    let engine = Engine::builder()
        .task(TaskDefinition::new("t").with_return("1.5").with_log("{t:.70000f}"))
        .build()
        .unwrap();

    assert_eq!(engine.execute("t").await.unwrap(), json!(1.5));
    assert_eq!(engine.task("t").unwrap().cached(), Some(json!(1.5)));
    assert!(logs.on_target(TASK_LOG_TARGET).is_empty());
    assert!(logs.contains("Log format error"));
}

#[tokio::test(start_paused = true)]
async fn test_action_receives_full_context() {
    let (btc, _) = constant_fn(json!({"last": 42200}));
    let (eth, _) = constant_fn(json!({"last": 42000}));
    let (runner, mut actions) = RecordingActionRunner::new();

    let engine = Engine::builder()
        .providers(registry("OKX", vec![("btc", btc), ("eth", eth)]))
        .constant("threshold", json!(100))
        .task(TaskDefinition::new("price_btc").with_function("OKX", "btc"))
        .task(TaskDefinition::new("price_eth").with_function("OKX", "eth"))
        .task(
            TaskDefinition::new("alert")
                .with_function("OKX", "btc")
                .with_dependencies(["price_btc", "price_eth"])
                .with_return("price_btc['last'] - price_eth['last']")
                .with_condition("alert > threshold")
                .with_action("notify.sh"),
        )
        .action_runner(runner)
        .build()
        .unwrap();

    engine.execute("alert").await.unwrap();

    let action = actions.recv().await.unwrap();
    assert_eq!(action.task, "alert");
    assert_eq!(action.path.to_str(), Some("notify.sh"));
    assert_eq!(action.provider.as_deref(), Some("OKX"));
    assert_eq!(action.context.get_var("alert"), Some(&json!(200)));
    assert_eq!(action.context.get_var("this"), Some(&json!(200)));
    assert_eq!(action.context.get_var("price_btc"), Some(&json!({"last": 42200})));
    assert_eq!(action.context.get_var("price_eth"), Some(&json!({"last": 42000})));
    assert_eq!(action.context.get_var("threshold"), Some(&json!(100)));
    assert_eq!(action.context.get_var("last"), Some(&Value::Null));
}

#[tokio::test(start_paused = true)]
async fn test_action_failure_is_isolated() {
    let (runner, mut actions) = RecordingActionRunner::failing();
    let engine = Engine::builder()
        .task(
            TaskDefinition::new("alert")
                .with_return("1")
                .with_action("notify.sh"),
        )
        .action_runner(runner)
        .build()
        .unwrap();

    assert_eq!(engine.execute("alert").await.unwrap(), json!(1));
    actions.recv().await.unwrap();
    assert_eq!(engine.execute("alert").await.unwrap(), json!(1));
    actions.recv().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_call_preserves_previous_value() {
    let (ticker, calls) = sequence_fn(Duration::ZERO, |n| match n {
        1 => Ok(json!(41000)),
        _ => anyhow::bail!("exchange unavailable"),
    });
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("ticker_x", "X/USDT"))
        .task(TaskDefinition::new("watcher").with_dependencies(["ticker_x"]).with_return("ticker_x"))
        .build()
        .unwrap();

    assert_eq!(engine.execute("ticker_x").await.unwrap(), json!(41000));
    assert!(matches!(
        engine.execute("ticker_x").await,
        Err(ExecutionError::FunctionFailed { .. })
    ));

    let unit = engine.task("ticker_x").unwrap();
    assert!(unit.has_executed());
    assert!(!unit.is_running());
    assert_eq!(unit.cached(), Some(json!(41000)));

    // Once expired, the failing refresh still leaves the old value readable
    advance(Duration::from_secs(6)).await;
    assert_eq!(engine.execute("watcher").await.unwrap(), json!(41000));
    assert_eq!(calls.total(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_shared_dependency_runs_once() {
    let (ticker, calls) = sequence_fn(SLOW, |_| Ok(json!(42000)));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(TaskDefinition::new("shared").with_function("OKX", "fetch_ticker"))
        .task(TaskDefinition::new("left").with_dependencies(["shared"]).with_return("shared"))
        .task(TaskDefinition::new("right").with_dependencies(["shared"]).with_return("shared"))
        .build()
        .unwrap();

    let (left, right) = tokio::join!(engine.execute("left"), engine.execute("right"));
    assert_eq!(left.unwrap(), json!(42000));
    assert_eq!(right.unwrap(), json!(42000));
    assert_eq!(calls.total(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_executes_are_serialized() {
    let (ticker, calls) = sequence_fn(SLOW, |n| Ok(json!(n)));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price_btc", "BTC/USDT"))
        .build()
        .unwrap();

    let (first, second) = tokio::join!(engine.execute("price_btc"), engine.execute("price_btc"));
    assert_eq!(first.unwrap(), json!(1));
    assert_eq!(second.unwrap(), json!(2));
    assert_eq!(calls.total(), 2);
    assert_eq!(calls.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reader_gets_stale_value_during_refresh() {
    let (ticker, _) = sequence_fn(SLOW, |n| Ok(json!(n)));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price_btc", "BTC/USDT"))
        .build()
        .unwrap();

    engine.execute("price_btc").await.unwrap();
    advance(Duration::from_secs(6)).await;

    let (refreshed, read) = tokio::join!(engine.execute("price_btc"), async {
        let started = Instant::now();
        let value = engine.get_data("price_btc").await;
        (value, started.elapsed())
    });

    assert_eq!(refreshed.unwrap(), json!(2));
    assert_eq!(read.0, json!(1));
    assert_eq!(read.1, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_first_reader_waits_for_first_pass() {
    let (ticker, calls) = sequence_fn(SLOW, |n| Ok(json!(n)));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price_btc", "BTC/USDT"))
        .build()
        .unwrap();

    let (executed, read) =
        tokio::join!(engine.execute("price_btc"), engine.get_data("price_btc"));
    assert_eq!(executed.unwrap(), json!(1));
    assert_eq!(read, json!(1));
    assert_eq!(calls.total(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_arguments_do_not_see_dependencies() {
    let (btc, _) = constant_fn(json!(42000));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("btc", btc), ("echo", echo_fn())]))
        .task(TaskDefinition::new("price_btc").with_function("OKX", "btc"))
        .task(
            TaskDefinition::new("order")
                .with_function("OKX", "echo")
                .with_dependencies(["price_btc"])
                .with_args(vec![json!("price_btc"), json!("1 + 1"), json!(true)])
                .with_kwarg("amount", json!("price_btc / 2"))
                .with_kwarg("side", json!("'buy'")),
        )
        .build()
        .unwrap();

    let result = engine.execute("order").await.unwrap();
    assert_eq!(result["args"], json!(["price_btc", 2, true]));
    assert_eq!(result["kwargs"], json!({"amount": "price_btc / 2", "side": "buy"}));
}

#[tokio::test(start_paused = true)]
async fn test_failed_return_expression_keeps_cache() {
    let (ticker, _) = sequence_fn(Duration::ZERO, |n| match n {
        1 => Ok(json!({"last": 1})),
        _ => Ok(json!({})),
    });
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price", "BTC/USDT").with_return("price['last']"))
        .build()
        .unwrap();

    assert_eq!(engine.execute("price").await.unwrap(), json!(1));
    advance(Duration::from_secs(1)).await;
    assert!(matches!(
        engine.execute("price").await,
        Err(ExecutionError::ReturnExpression { .. })
    ));

    let unit = engine.task("price").unwrap();
    assert_eq!(unit.cached(), Some(json!(1)));
    // The original commit time stands, so the value expires on schedule
    advance(Duration::from_secs(3)).await;
    assert_eq!(unit.cached_valid(), Some(json!(1)));
    advance(Duration::from_secs(1)).await;
    assert_eq!(unit.cached_valid(), None);
}

#[tokio::test(start_paused = true)]
async fn test_missing_dependency_is_null() {
    let engine = Engine::builder()
        .task(
            TaskDefinition::new("watcher")
                .with_dependencies(["ghost"])
                .with_return("ghost == None"),
        )
        .build()
        .unwrap();

    assert_eq!(engine.execute("watcher").await.unwrap(), json!(true));
}

#[tokio::test(start_paused = true)]
async fn test_unbound_task_derives_from_return() {
    let engine = Engine::builder()
        .task(
            TaskDefinition::new("derived")
                .with_function("nowhere", "fetch_ticker")
                .with_return("derived == None and last == None"),
        )
        .task(TaskDefinition::new("empty"))
        .build()
        .unwrap();

    assert_eq!(engine.execute("derived").await.unwrap(), json!(true));
    assert_eq!(engine.execute("empty").await.unwrap(), Value::Null);
    // A null result never counts as cached
    assert_eq!(engine.task("empty").unwrap().cached_valid(), None);
}

#[tokio::test(start_paused = true)]
async fn test_previous_value_bound_as_last() {
    let (ticker, _) = sequence_fn(Duration::ZERO, |n| Ok(json!(n * 10)));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price", "BTC/USDT").with_return("[last, price]"))
        .build()
        .unwrap();

    assert_eq!(engine.execute("price").await.unwrap(), json!([null, 10]));
    assert_eq!(engine.execute("price").await.unwrap(), json!([[null, 10], 20]));
}

#[tokio::test(start_paused = true)]
async fn test_string_return_is_evaluated_again() {
    let engine = Engine::builder()
        .constant("formula", json!("2 * 21"))
        .task(TaskDefinition::new("answer").with_return("formula"))
        .task(TaskDefinition::new("symbol").with_return("'BTC/USDT'"))
        .build()
        .unwrap();

    assert_eq!(engine.execute("answer").await.unwrap(), json!(42));
    // Not an expression, kept as the string
    assert_eq!(engine.execute("symbol").await.unwrap(), json!("BTC/USDT"));
}

#[tokio::test(start_paused = true)]
async fn test_condition_and_log_errors_are_not_fatal() {
    let (runner, mut actions) = RecordingActionRunner::new();
    let engine = Engine::builder()
        .task(
            TaskDefinition::new("bad_condition")
                .with_return("1")
                .with_condition("undefined > 1")
                .with_action("notify.sh"),
        )
        .task(
            TaskDefinition::new("bad_log")
                .with_return("2")
                .with_log("value={undefined}")
                .with_action("notify.sh"),
        )
        .action_runner(runner)
        .build()
        .unwrap();

    assert_eq!(engine.execute("bad_condition").await.unwrap(), json!(1));
    assert_eq!(engine.task("bad_condition").unwrap().cached(), Some(json!(1)));

    // A broken log line does not stop the action
    assert_eq!(engine.execute("bad_log").await.unwrap(), json!(2));
    let action = actions.recv().await.unwrap();
    assert_eq!(action.task, "bad_log");
    assert!(actions.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_results_reach_sink_with_provenance() {
    let (ticker, _) = constant_fn(json!({"last": 42000}));
    let (sink, mut events) = ChannelSink::channel();
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price_btc", "BTC/USDT"))
        .task(TaskDefinition::new("broken").with_return("missing"))
        .sink(Arc::new(sink))
        .build()
        .unwrap();

    engine.execute("price_btc").await.unwrap();
    let _ = engine.execute("broken").await;

    let event = events.recv().await.unwrap();
    assert_eq!(event.task, "price_btc");
    assert_eq!(event.value, json!({"last": 42000}));
    assert_eq!(event.numeric_value(), Some(42000.0));
    assert_eq!(event.provenance.provider.as_deref(), Some("OKX"));
    assert_eq!(event.provenance.symbol.as_deref(), Some("BTC/USDT"));
    assert_eq!(event.provenance.function.as_deref(), Some("fetch_ticker"));

    // Aborted passes are not reported
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_pass_releases_unit() {
    let (ticker, calls) = sequence_fn(SLOW, |n| Ok(json!(n)));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price_btc", "BTC/USDT"))
        .build()
        .unwrap();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(10), engine.execute("price_btc")).await;
    assert!(cancelled.is_err());

    let unit = engine.task("price_btc").unwrap();
    assert!(!unit.is_running());
    assert!(!unit.has_executed());
    assert_eq!(unit.cached(), None);

    assert_eq!(engine.execute("price_btc").await.unwrap(), json!(2));
    assert_eq!(calls.total(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_self_reference_serves_cached_value() {
    let (ticker, calls) = constant_fn(json!(1));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price_btc", "BTC/USDT"))
        .build()
        .unwrap();

    let unit = engine.task("price_btc").unwrap();
    let chain = ResolutionChain::new().with("price_btc");
    assert_eq!(unit.get_result(&engine, &chain).await, Value::Null);
    assert_eq!(calls.total(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deep_dependency_chain() {
    let (base, calls) = constant_fn(json!(10));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("base", base)]))
        .task(TaskDefinition::new("a").with_function("OKX", "base"))
        .task(TaskDefinition::new("b").with_dependencies(["a"]).with_return("a + 1"))
        .task(TaskDefinition::new("c").with_dependencies(["b"]).with_return("b * 2"))
        .task(TaskDefinition::new("d").with_dependencies(["a", "c"]).with_return("c - a"))
        .build()
        .unwrap();

    assert_eq!(engine.get_data("d").await, json!(12));
    assert_eq!(calls.total(), 1);
}

#[tokio::test]
async fn test_results_stored_as_json_lines() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("results.jsonl");
    let sink = Arc::new(JsonLinesSink::open(&path).await.unwrap());

    let (ticker, _) = constant_fn(json!({"last": 42000}));
    let engine = Engine::builder()
        .providers(registry("OKX", vec![("fetch_ticker", ticker)]))
        .task(price_task("price_btc", "BTC/USDT"))
        .sink(sink.clone())
        .build()
        .unwrap();

    engine.execute("price_btc").await.unwrap();
    engine.execute("price_btc").await.unwrap();
    sink.flush().await;

    let contents = std::fs::read_to_string(&path).unwrap();
    let records: Vec<StoredRecord> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].task, "price_btc");
    assert_eq!(records[0].value_num, Some(42000.0));
    assert_eq!(records[0].provenance.symbol.as_deref(), Some("BTC/USDT"));
}
