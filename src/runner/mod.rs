//! Task execution core
//!
//! This module holds the expression language, the per-task cache and
//! execution units, the engine resolving dependencies between them, and the
//! contracts of the collaborators the engine calls out to.

pub mod action;
pub mod cache;
pub mod condition;
pub mod context;
pub mod engine;
pub mod evaluate;
pub mod expression;
pub mod provider;
pub mod sink;
pub mod task;
pub mod template;

// Re-export main types
pub use action::{ActionRunner, LogActionRunner, ScriptActionRunner};
pub use cache::{ResultCache, DEFAULT_TTL};
pub use condition::*;
pub use context::*;
pub use engine::{Engine, EngineBuilder, ResolutionChain};
pub use evaluate::{evaluate, is_truthy, BUILTINS};
pub use expression::{Expression, KEYWORDS};
pub use provider::*;
pub use sink::{
    ChannelSink, JsonLinesSink, NullSink, Provenance, ResultEvent, ResultSink, StoredRecord,
};
pub use task::{TaskDefinition, TaskUnit, TASK_LOG_TARGET};
pub use template::{render, Template};
