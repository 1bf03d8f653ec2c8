//! Cryptom - a dependency-aware, self-caching task engine
//!
//! Tasks are declared in YAML, bound to provider functions (exchange APIs,
//! data feeds) at startup, and evaluated against a small expression
//! language. Results are cached per task with a time-to-live, dependencies
//! are pulled on demand, and a task's condition gates its log line and its
//! action.

// Public modules
pub mod config;
pub mod error;
pub mod runner;

// Re-export commonly used types
pub use config::{parse_config, parse_config_file, AppConfig};
pub use error::{CryptomError, Result};
pub use runner::{Engine, EngineBuilder, TaskDefinition};

/// Current version of Cryptom
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
