// config.rs - Run configuration loaded from config.yaml
// Purpose: Timeouts, thread counts, extra tool directories and per-tool overrides

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub settings: Settings,
    /// Per-tool overrides keyed by tool name (e.g. `subfinder`)
    pub tools: HashMap<String, ToolOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Per-task timeout in seconds for parallel phases
    pub process_timeout: u64,
    /// Passed through to tools that manage their own concurrency
    pub threads: usize,
    /// Extra directories searched for tool binaries, before everything else
    pub tool_dirs: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            process_timeout: 600,
            threads: 50,
            tool_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOverride {
    pub enabled: bool,
    /// Replacement command template; `{target}`, `{threads}` and `{output}` are substituted
    pub command: Option<String>,
}

impl Default for ToolOverride {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
        }
    }
}

impl Config {
    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.process_timeout)
    }

    pub fn threads(&self) -> usize {
        self.settings.threads
    }

    pub fn tool_override(&self, name: &str) -> Option<&ToolOverride> {
        self.tools.get(name)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Option<Config> =
            serde_yaml::from_str(content).context("Invalid configuration YAML")?;
        let config = config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// A zero timeout would kill every parallel worker on its first poll
    fn validate(&self) -> Result<()> {
        if self.settings.process_timeout == 0 {
            bail!("settings.process_timeout must be at least 1 second");
        }
        if self.settings.threads == 0 {
            bail!("settings.threads must be at least 1");
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))
    }

    /// Load an explicit path (must exist) or look for `config.yaml` in the
    /// working directory and its parent, falling back to built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let candidates = [
            PathBuf::from(DEFAULT_CONFIG_FILE),
            Path::new("..").join(DEFAULT_CONFIG_FILE),
        ];
        for candidate in candidates {
            if candidate.is_file() {
                return Ok((Self::load(&candidate)?, Some(candidate)));
            }
        }

        Ok((Self::default(), None))
    }
}
