//! Configuration validation
//!
//! This module provides validation logic for configuration files.

use crate::config::types::{AppConfig, TaskConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::runner::context::{LAST_BINDING, THIS_BINDING};
use crate::runner::{Expression, Template, KEYWORDS};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tracing::warn;

fn task_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("task name regex is valid"))
}

/// Validate a complete configuration
pub fn validate_config(config: &AppConfig) -> ConfigResult<()> {
    let mut providers = HashSet::new();
    for provider in &config.providers {
        if provider.name.trim().is_empty() {
            return Err(ConfigError::Invalid("Provider name must not be empty".to_string()));
        }
        if !providers.insert(provider.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Provider '{}' is defined more than once",
                provider.name
            )));
        }
    }

    let mut names = HashSet::new();
    for task in &config.tasks {
        validate_task(task)?;
        if !names.insert(task.name.as_str()) {
            return Err(ConfigError::DuplicateTask(task.name.clone()));
        }
    }

    for task in &config.tasks {
        if let Some(provider) = &task.provider {
            if !providers.contains(provider.as_str()) {
                warn!(task = %task.name, "Provider '{}' is not configured", provider);
            }
        }
        for dependency in &task.dependencies {
            if !names.contains(dependency.as_str()) {
                warn!(task = %task.name, "Dependency '{}' is not defined", dependency);
            }
        }
        if config.constants.contains_key(&task.name) {
            warn!(task = %task.name, "Task result shadows the constant of the same name");
        }
    }

    // Check for circular dependencies between tasks
    detect_circular_dependencies(
        config
            .tasks
            .iter()
            .map(|task| (task.name.as_str(), task.dependencies.as_slice())),
    )?;

    Ok(())
}

/// Validate a single task
pub fn validate_task(task: &TaskConfig) -> ConfigResult<()> {
    validate_task_name(&task.name)?;

    if task.interval == Some(0) {
        return Err(ConfigError::Invalid(format!(
            "Task '{}' interval must be greater than zero",
            task.name
        )));
    }

    if task.function.is_some() && task.provider.is_none() {
        warn!(task = %task.name, "Function configured without a provider");
    }

    check_expression(&task.name, "return expression", task.return_expr.as_deref())?;
    check_expression(&task.name, "condition", task.condition.as_deref())?;
    if let Some(log) = &task.log {
        Template::parse(log).map_err(|error| ConfigError::ExpressionSyntax {
            task: task.name.clone(),
            field: "log template",
            error,
        })?;
    }

    Ok(())
}

/// Task names are bound as expression names, so they must be identifiers
pub fn validate_task_name(name: &str) -> ConfigResult<()> {
    if !task_name_pattern().is_match(name) {
        return Err(ConfigError::InvalidTaskName(name.to_string()));
    }
    if name == LAST_BINDING || name == THIS_BINDING || KEYWORDS.contains(&name) {
        return Err(ConfigError::ReservedName(name.to_string()));
    }
    Ok(())
}

fn check_expression(task: &str, field: &'static str, source: Option<&str>) -> ConfigResult<()> {
    match source {
        Some(source) if !source.trim().is_empty() => Expression::parse(source)
            .map(|_| ())
            .map_err(|error| ConfigError::ExpressionSyntax {
                task: task.to_string(),
                field,
                error,
            }),
        _ => Ok(()),
    }
}

/// Detect circular dependencies between tasks
///
/// Takes `(name, dependencies)` pairs in definition order. Dependencies on
/// unknown tasks are ignored here.
pub fn detect_circular_dependencies<'a, I>(tasks: I) -> ConfigResult<()>
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let tasks: Vec<(&str, &[String])> = tasks.into_iter().collect();
    let graph: HashMap<&str, &[String]> = tasks.iter().copied().collect();

    let mut visited = HashSet::new();
    for &(name, _) in &tasks {
        let mut stack = Vec::new();
        check_task_cycle(&graph, name, &mut visited, &mut stack)?;
    }
    Ok(())
}

/// Recursively check for cycles in task dependencies
fn check_task_cycle<'a>(
    graph: &HashMap<&'a str, &'a [String]>,
    task_name: &'a str,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> ConfigResult<()> {
    // Check if we've found a cycle
    if let Some(start) = stack.iter().position(|name| *name == task_name) {
        let mut cycle: Vec<&str> = stack[start..].to_vec();
        cycle.push(task_name);
        return Err(ConfigError::CircularDependency(cycle.join(" -> ")));
    }

    // Skip if already fully processed
    if visited.contains(task_name) {
        return Ok(());
    }

    let Some(&dependencies) = graph.get(task_name) else {
        return Ok(());
    };

    stack.push(task_name);
    for dependency in dependencies {
        check_task_cycle(graph, dependency.as_str(), visited, stack)?;
    }

    // Remove from stack and mark as visited
    stack.pop();
    visited.insert(task_name);

    Ok(())
}
