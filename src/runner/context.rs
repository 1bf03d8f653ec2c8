//! Expression context
//!
//! The context is the only namespace an expression can see. Nothing is
//! resolved from ambient state: a name is either bound here or undefined.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Name bound to the task's previous cached value
pub const LAST_BINDING: &str = "last";

/// Alias bound to the task's own current result
pub const THIS_BINDING: &str = "this";

/// Mapping from name to value used to evaluate expressions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    /// Bound names
    pub vars: HashMap<String, Value>,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Context {
            vars: HashMap::new(),
        }
    }

    /// Replace all bindings
    pub fn with_vars(mut self, vars: HashMap<String, Value>) -> Self {
        self.vars = vars;
        self
    }

    /// Add a single binding
    pub fn with_var(mut self, key: impl Into<String>, value: Value) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    /// Set a single binding, replacing any previous value
    pub fn set_var(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    /// Get a bound value
    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Check whether a name is bound (a binding to `null` counts)
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Remove a binding
    pub fn remove_var(&mut self, key: &str) -> Option<Value> {
        self.vars.remove(key)
    }

    /// Bound names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Snapshot the context as a JSON object (handed to action runners)
    pub fn to_json(&self) -> Value {
        let mut names: Vec<&String> = self.vars.keys().collect();
        names.sort();
        let map: Map<String, Value> = names
            .into_iter()
            .map(|name| (name.clone(), self.vars[name].clone()))
            .collect();
        Value::Object(map)
    }
}

impl From<HashMap<String, Value>> for Context {
    fn from(vars: HashMap<String, Value>) -> Self {
        Context { vars }
    }
}
