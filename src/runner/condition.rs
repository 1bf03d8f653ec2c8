//! Condition evaluation
//!
//! A task's condition gates its log line and its action. An absent
//! condition always holds.

use crate::error::ExpressionResult;
use crate::runner::{evaluate, is_truthy, Context};

/// Condition used when a task configures none
pub const DEFAULT_CONDITION: &str = "True";

/// Evaluate an optional condition against the context
///
/// The result is interpreted by truthiness, so `spread` alone holds for any
/// non-zero spread.
pub fn evaluate_condition(condition: Option<&str>, ctx: &Context) -> ExpressionResult<bool> {
    match condition {
        None => Ok(true),
        Some(expr) if expr.trim().is_empty() => Ok(true),
        Some(expr) => evaluate(expr, ctx).map(|value| is_truthy(&value)),
    }
}
