//! Configuration file parsing and discovery

use crate::config::interpolate::{env_lookup, interpolate_value};
use crate::config::types::AppConfig;
use crate::error::{ConfigError, ConfigResult, CryptomError, InterpolationError};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default configuration file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &["cryptom.yaml", "cryptom.yml", "config.yaml"];

/// Find the configuration file by searching current and parent directories
pub fn find_config_file() -> ConfigResult<PathBuf> {
    find_config_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?)
}

/// Find the configuration file starting from a specific directory
pub fn find_config_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in CONFIG_FILE_NAMES {
            let config_path = current_dir.join(file_name);
            searched_paths.push(config_path.display().to_string());

            if config_path.is_file() {
                return Ok(config_path);
            }
        }

        // Try parent directory
        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse a configuration file from a path
///
/// A `.env` file next to the configuration is loaded first; variables
/// already set in the environment take precedence.
pub fn parse_config_file(path: &Path) -> Result<AppConfig, CryptomError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read {}: {}", path.display(), e)))?;

    load_dotenv(path);
    parse_config(&contents, Some(path))
}

/// Parse configuration from a string
///
/// `${VAR}` placeholders in provider settings and constants are expanded
/// from the environment; an undefined variable is an error.
pub fn parse_config(yaml: &str, config_path: Option<&Path>) -> Result<AppConfig, CryptomError> {
    let mut config: AppConfig = serde_yaml::from_str(yaml)?;
    let source = config_path.map(Path::to_path_buf).unwrap_or_default();

    for task in &mut config.tasks {
        task.normalize_params();
    }

    expand_environment(&mut config, &source)?;
    Ok(config)
}

/// Parse configuration with automatic file discovery
pub fn parse_config_auto() -> Result<(AppConfig, PathBuf), CryptomError> {
    let config_path = find_config_file()?;
    let config = parse_config_file(&config_path)?;
    Ok((config, config_path))
}

fn expand_environment(config: &mut AppConfig, source: &Path) -> ConfigResult<()> {
    let wrap = |error: InterpolationError| ConfigError::Interpolation {
        path: source.to_path_buf(),
        error,
    };

    for provider in &mut config.providers {
        for value in provider.settings.values_mut() {
            interpolate_value(value, &env_lookup).map_err(wrap)?;
        }
    }
    for value in config.constants.values_mut() {
        interpolate_value(value, &env_lookup).map_err(wrap)?;
    }
    Ok(())
}

/// Load the `.env` file sitting next to the configuration, if any
fn load_dotenv(config_path: &Path) {
    let Some(dir) = config_path.parent() else {
        return;
    };
    let dotenv = dir.join(".env");
    if !dotenv.is_file() {
        return;
    }

    match dotenvy::from_path(&dotenv) {
        Ok(()) => debug!("Loaded environment from {}", dotenv.display()),
        Err(e) => warn!("Failed to load {}: {}", dotenv.display(), e),
    }
}
