// task.rs - Units of work: one external tool invocation each
// Purpose: Task abstraction consumed by the parallel runner and the pipeline

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::artifact::{read_lines, split_lines};
use crate::config::Config;
use crate::executor::{execute, ExecError};
use crate::progress::ProgressTracker;
use crate::tools::SearchPath;

/// Scan subject handed to every task: a domain for the first phase, the path
/// of the upstream artifact afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target(Arc<str>);

impl Target {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<&std::path::Path> for Target {
    fn from(value: &std::path::Path) -> Self {
        Self::new(value.to_string_lossy())
    }
}

/// A stateless unit of work. `Ok(None)` and `Ok(Some(empty))` both mean
/// "no results".
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, target: &Target, config: &Config) -> Result<Option<Vec<String>>>;
}

/// Where a tool gets its input from besides its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinSource {
    None,
    /// Contents of the file named by the target
    TargetFile,
}

/// Static description of one external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    /// Command template; `{target}`, `{threads}` and `{output}` are substituted
    pub command: String,
    pub stdin: StdinSource,
    /// File the tool writes its results to (absolute, already resolved
    /// against the output directory)
    pub raw_output: Option<PathBuf>,
}

impl ToolSpec {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            stdin: StdinSource::None,
            raw_output: None,
        }
    }

    pub fn with_stdin(mut self, stdin: StdinSource) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_raw_output(mut self, path: PathBuf) -> Self {
        self.raw_output = Some(path);
        self
    }

    pub fn render(&self, target: &Target, config: &Config) -> String {
        let output = self
            .raw_output
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.command
            .replace("{target}", &quote(target.as_str()))
            .replace("{threads}", &config.threads().to_string())
            .replace("{output}", &quote(&output))
    }
}

fn quote(value: &str) -> String {
    shlex::try_quote(value)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// A [`ToolSpec`] bound to the search path and status reporting.
pub struct ToolTask {
    spec: ToolSpec,
    search_path: Arc<SearchPath>,
    progress: ProgressTracker,
    timeout: Option<Duration>,
}

impl ToolTask {
    pub fn new(spec: ToolSpec, search_path: Arc<SearchPath>, progress: ProgressTracker) -> Self {
        Self {
            spec,
            search_path,
            progress,
            timeout: None,
        }
    }

    /// Executor-level timeout. Parallel phases rely on the runner's limit
    /// instead and leave this unset.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run the tool once. Executor failures are reported and turned into
    /// whatever usable output exists; they never escape as errors.
    pub async fn invoke(&self, target: &Target, config: &Config) -> Vec<String> {
        let command = self.spec.render(target, config);
        self.progress.tool_started(&self.spec.name, target.as_str());

        if let Some(raw) = &self.spec.raw_output {
            if let Some(parent) = raw.parent() {
                fs::create_dir_all(parent).ok();
            }
            // Results from an earlier run must not leak into this one
            fs::remove_file(raw).ok();
        }

        let stdin_data = match self.spec.stdin {
            StdinSource::None => None,
            StdinSource::TargetFile => match fs::read_to_string(target.as_str()) {
                Ok(content) => Some(content),
                Err(e) => {
                    self.progress.tool_failed(
                        &self.spec.name,
                        &format!("input file {} unreadable: {}", target, e),
                    );
                    return Vec::new();
                }
            },
        };

        let stdout = match execute(&command, stdin_data.as_deref(), self.timeout, &self.search_path).await {
            Ok(stdout) => stdout,
            Err(err) => {
                match &err {
                    ExecError::Timeout { after, .. } => self.progress.tool_timed_out(&self.spec.name, after.as_secs()),
                    other => self.progress.tool_failed(&self.spec.name, &other.to_string()),
                }
                err.usable_stdout().unwrap_or_default().to_string()
            }
        };

        let lines = match &self.spec.raw_output {
            Some(raw) => read_lines(raw).unwrap_or_else(|e| {
                self.progress.tool_failed(&self.spec.name, &format!("{:#}", e));
                Vec::new()
            }),
            None => split_lines(&stdout),
        };

        self.progress.tool_completed(&self.spec.name, lines.len());
        lines
    }
}

#[async_trait]
impl Task for ToolTask {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn run(&self, target: &Target, config: &Config) -> Result<Option<Vec<String>>> {
        let lines = self.invoke(target, config).await;
        Ok((!lines.is_empty()).then_some(lines))
    }
}
