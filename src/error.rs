//! Error types for Cryptom

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Cryptom operations
pub type Result<T> = std::result::Result<T, CryptomError>;

/// Main error type for Cryptom
#[derive(Error, Debug)]
pub enum CryptomError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Task execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Expression evaluation errors
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Environment interpolation errors
    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Task '{0}' is defined more than once")]
    DuplicateTask(String),

    #[error("Task name '{0}' is not a valid identifier")]
    InvalidTaskName(String),

    #[error("Task name '{0}' is reserved")]
    ReservedName(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Task '{task}' has an invalid {field}: {error}")]
    ExpressionSyntax {
        task: String,
        field: &'static str,
        error: ExpressionError,
    },

    #[error("Failed to expand '{path}': {error}")]
    Interpolation {
        path: PathBuf,
        error: InterpolationError,
    },
}

/// Task execution errors
///
/// Every variant aborts the pass it was raised in before the cache commit.
/// None of them escape the task boundary as a panic.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Task '{0}' is not defined")]
    TaskNotFound(String),

    #[error("Task '{task}' function call failed: {error}")]
    FunctionFailed { task: String, error: anyhow::Error },

    #[error("Task '{task}' return expression failed: {error}")]
    ReturnExpression {
        task: String,
        error: ExpressionError,
    },

    #[error("Action '{path}' failed: {error}")]
    Action { path: PathBuf, error: anyhow::Error },
}

/// Expression parsing and evaluation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Name '{0}' is not defined")]
    UndefinedName(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Key '{0}' not found")]
    KeyNotFound(String),

    #[error("Index {0} out of range")]
    IndexOutOfRange(i64),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Result is not a finite number")]
    InvalidNumber,

    #[error("Invalid format spec '{0}'")]
    Format(String),
}

/// Environment interpolation errors
#[derive(Error, Debug)]
pub enum InterpolationError {
    #[error("Variable '{0}' is not defined")]
    UndefinedVariable(String),

    #[error("Invalid interpolation syntax: {0}")]
    InvalidSyntax(String),

    #[error("Recursive interpolation detected")]
    RecursiveInterpolation,
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for expression operations
pub type ExpressionResult<T> = std::result::Result<T, ExpressionError>;

/// Specialized result type for interpolation operations
pub type InterpolationResult<T> = std::result::Result<T, InterpolationError>;

impl ExpressionError {
    /// Helper to build a syntax error at a byte offset
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        ExpressionError::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Helper to build a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        ExpressionError::Type(message.into())
    }
}
