//! Action dispatch
//!
//! When a task's condition holds and it names an action, the engine hands the
//! action path, the task's provider and the full expression context to an
//! [`ActionRunner`]. Failures are logged by the engine and never touch the
//! task's cache.

use crate::runner::{Context, ProviderHandle};
use anyhow::{bail, Context as _};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Interpreter used for scripts when none is configured
pub const DEFAULT_INTERPRETER: &[&str] = &["sh", "-c"];

/// Capability to run an external action
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Run the action at `path` on behalf of `task`
    async fn run(
        &self,
        task: &str,
        path: &Path,
        provider: Option<ProviderHandle>,
        context: Context,
    ) -> anyhow::Result<()>;
}

/// Runner that only logs triggered actions
#[derive(Debug, Default, Clone, Copy)]
pub struct LogActionRunner;

#[async_trait]
impl ActionRunner for LogActionRunner {
    async fn run(
        &self,
        task: &str,
        path: &Path,
        provider: Option<ProviderHandle>,
        _context: Context,
    ) -> anyhow::Result<()> {
        info!(
            task = %task,
            provider = provider.as_ref().map(|p| p.name.as_str()).unwrap_or("-"),
            "Triggering action: {}",
            path.display()
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CachedScript {
    modified: SystemTime,
    source: Arc<str>,
}

/// Runs action scripts through an interpreter
///
/// Script sources are cached by path and modification time, so an edited
/// script is picked up on its next dispatch without restarting the engine.
/// The script receives the context as JSON on stdin.
#[derive(Debug)]
pub struct ScriptActionRunner {
    interpreter: Vec<String>,
    base_dir: PathBuf,
    scripts: Mutex<HashMap<PathBuf, CachedScript>>,
}

impl ScriptActionRunner {
    /// Create a runner resolving relative paths against `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        ScriptActionRunner {
            interpreter: DEFAULT_INTERPRETER.iter().map(|s| s.to_string()).collect(),
            base_dir: base_dir.into(),
            scripts: Mutex::new(HashMap::new()),
        }
    }

    /// Use a different interpreter (e.g. `["bash", "-c"]`)
    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        if !interpreter.is_empty() {
            self.interpreter = interpreter;
        }
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Number of script sources currently cached
    pub fn cached_scripts(&self) -> usize {
        self.scripts.lock().len()
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Load a script, reusing the cached source while its mtime is unchanged
    async fn load(&self, path: &Path) -> anyhow::Result<Arc<str>> {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Script not found: {}", path.display()))?;
        let modified = metadata.modified()?;

        let cached = self.scripts.lock().get(path).cloned();
        if let Some(cached) = cached {
            if cached.modified == modified {
                return Ok(cached.source);
            }
            info!("Script changed, reloading: {}", path.display());
        }

        let source: Arc<str> = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read script {}", path.display()))?
            .into();
        self.scripts.lock().insert(
            path.to_path_buf(),
            CachedScript {
                modified,
                source: source.clone(),
            },
        );
        Ok(source)
    }
}

#[async_trait]
impl ActionRunner for ScriptActionRunner {
    async fn run(
        &self,
        task: &str,
        path: &Path,
        provider: Option<ProviderHandle>,
        context: Context,
    ) -> anyhow::Result<()> {
        let path = self.resolve_path(path);
        let source = self.load(&path).await?;
        let payload = serde_json::to_vec(&context.to_json())?;

        let Some((program, interpreter_args)) = self.interpreter.split_first() else {
            bail!("No interpreter configured");
        };
        let mut command = Command::new(program);
        command
            .args(interpreter_args)
            .arg(&*source)
            .current_dir(&self.base_dir)
            .env("CRYPTOM_ACTION_PATH", &path)
            .env("CRYPTOM_TASK", task)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(provider) = &provider {
            command.env("CRYPTOM_PROVIDER", &provider.name);
        }

        debug!(task = %task, "Running action script {}", path.display());
        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start interpreter '{}'", program))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A script that never reads stdin closes the pipe early
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(task = %task, "Action script did not read context: {}", e);
            }
        }

        let output = child.wait_with_output().await?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            info!(task = %task, action = %path.display(), "{}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if !stderr.is_empty() {
                warn!(task = %task, action = %path.display(), "{}", stderr);
            }
            bail!("Script exited with {}", output.status);
        }

        Ok(())
    }
}
