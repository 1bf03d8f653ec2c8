//! Core configuration types
//!
//! This module defines the data structures that represent a cryptom.yaml configuration file.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Providers (exchanges, data feeds) tasks bind their functions against
    #[serde(default, alias = "exchanges", skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderConfig>,

    /// Literal values bound into every task context
    #[serde(default, alias = "vars", skip_serializing_if = "HashMap::is_empty")]
    pub constants: HashMap<String, Value>,

    /// Tasks, in definition order
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl AppConfig {
    /// Look up a provider entry by name
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Look up a task entry by name
    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// A provider entry
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Name tasks refer to
    pub name: String,

    /// Implementation to build; defaults to the lower-cased name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Every other key, handed to the provider factory
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl ProviderConfig {
    /// Effective provider kind
    pub fn kind(&self) -> String {
        match &self.kind {
            Some(kind) => kind.clone(),
            None => self.name.to_lowercase(),
        }
    }

    /// Get a raw setting
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Get a string setting
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }
}

/// A task entry
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TaskConfig {
    /// Unique task name
    pub name: String,

    /// Provider to resolve the function against
    #[serde(default, alias = "exchange", skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Function name on the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    /// Positional arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,

    /// Keyword arguments
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub kwargs: Map<String, Value>,

    /// Legacy argument form: a scalar, a list or a mapping
    #[serde(default, skip_serializing)]
    pub params: Option<Value>,

    /// Tasks read before this one runs
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_string_or_list"
    )]
    pub dependencies: Vec<String>,

    /// Trigger cadence in seconds; absent for reactive tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,

    /// Expression reshaping the raw result
    #[serde(rename = "return", default, skip_serializing_if = "Option::is_none")]
    pub return_expr: Option<String>,

    /// Condition gating log and action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Log template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,

    /// Action script path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl TaskConfig {
    /// Fold legacy `params` into `args`/`kwargs`
    ///
    /// A list is appended to the positional arguments, a scalar is pushed,
    /// a mapping is merged into the keyword arguments.
    pub fn normalize_params(&mut self) {
        match self.params.take() {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => self.args.extend(items),
            Some(Value::Object(map)) => self.kwargs.extend(map),
            Some(scalar) => self.args.push(scalar),
        }
    }
}

/// Custom deserializer for fields that accept a single string or a list
fn deserialize_string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::String(s) => Ok(vec![s]),
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(D::Error::custom("dependencies must be task names")),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("dependencies must be a string or array")),
    }
}
