// pipeline.rs - Four-phase recon pipeline
// Purpose: Subdomains -> live hosts -> URLs -> vulnerabilities, each phase
//          handing a sorted, deduplicated artifact to the next one and
//          running its prerequisite first when that artifact is missing

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::artifact::{self, Artifact};
use crate::config::Config;
use crate::metrics::{PhaseMetrics, PhaseStatus, ScanMetrics};
use crate::progress::ProgressTracker;
use crate::task::{Target, Task, ToolSpec, ToolTask};
use crate::task_runner::TaskRunner;
use crate::tools::{is_parallel_phase, phase_tools, SearchPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    SubdomainEnumeration,
    HostDiscovery,
    Crawling,
    VulnScanning,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::SubdomainEnumeration,
        Phase::HostDiscovery,
        Phase::Crawling,
        Phase::VulnScanning,
    ];

    /// The phase whose artifact this phase consumes
    pub fn upstream(self) -> Option<Phase> {
        match self {
            Phase::SubdomainEnumeration => None,
            Phase::HostDiscovery => Some(Phase::SubdomainEnumeration),
            Phase::Crawling => Some(Phase::HostDiscovery),
            Phase::VulnScanning => Some(Phase::Crawling),
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Phase::SubdomainEnumeration => 1,
            Phase::HostDiscovery => 2,
            Phase::Crawling => 3,
            Phase::VulnScanning => 4,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Phase::SubdomainEnumeration => "SUBDOMAIN ENUMERATION",
            Phase::HostDiscovery => "LIVE HOST DISCOVERY",
            Phase::Crawling => "CRAWLING & URL GATHERING",
            Phase::VulnScanning => "VULNERABILITY SCANNING",
        }
    }

    /// Artifact location relative to the output directory
    pub fn artifact_file(self) -> &'static str {
        match self {
            Phase::SubdomainEnumeration => "subs/all_subdomains.txt",
            Phase::HostDiscovery => "hosts/live_hosts.txt",
            Phase::Crawling => "urls/all_urls.txt",
            Phase::VulnScanning => "vulns/all_vulns.txt",
        }
    }

    pub fn artifact_name(self) -> &'static str {
        match self {
            Phase::SubdomainEnumeration => "Subdomain list",
            Phase::HostDiscovery => "Live host list",
            Phase::Crawling => "URL list",
            Phase::VulnScanning => "Vulnerability list",
        }
    }

    pub fn data_label(self) -> &'static str {
        match self {
            Phase::SubdomainEnumeration => "subdomains",
            Phase::HostDiscovery => "live hosts",
            Phase::Crawling => "URLs",
            Phase::VulnScanning => "vulnerabilities",
        }
    }

    pub fn start_percentage(self) -> f32 {
        f32::from(self.number() - 1) * 25.0
    }

    pub fn end_percentage(self) -> f32 {
        f32::from(self.number()) * 25.0
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phase {} ({})", self.number(), self.title())
    }
}

/// Why a phase produced nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The prerequisite phase ran and found nothing
    UpstreamEmpty(Phase),
    /// Every tool of the phase is disabled in the configuration
    NoTools,
    /// All tools failed, timed out or returned no lines
    NoResults,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::UpstreamEmpty(upstream) => write!(
                f,
                "Phase {} did not find any {}",
                upstream.number(),
                upstream.data_label()
            ),
            AbortReason::NoTools => write!(f, "no tools enabled for this phase"),
            AbortReason::NoResults => write!(f, "all tools failed, timed out or found nothing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Complete(Artifact),
    Aborted { phase: Phase, reason: AbortReason },
}

impl PhaseOutcome {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseOutcome::Complete(artifact) => artifact.phase,
            PhaseOutcome::Aborted { phase, .. } => *phase,
        }
    }

    /// Result lines; empty for an aborted phase
    pub fn lines(&self) -> &[String] {
        match self {
            PhaseOutcome::Complete(artifact) => &artifact.lines,
            PhaseOutcome::Aborted { .. } => &[],
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, PhaseOutcome::Complete(_))
    }
}

/// Result of running the whole chain
#[derive(Debug)]
pub struct FullScanReport {
    pub completed: Vec<Artifact>,
    /// First phase that produced nothing, if the chain stopped early
    pub stopped_at: Option<(Phase, AbortReason)>,
}

pub struct Pipeline {
    domain: Target,
    config: Arc<Config>,
    output_dir: PathBuf,
    search_path: Arc<SearchPath>,
    progress: ProgressTracker,
    metrics: Mutex<ScanMetrics>,
}

impl Pipeline {
    pub fn new(
        domain: Target,
        config: Arc<Config>,
        output_dir: PathBuf,
        search_path: Arc<SearchPath>,
        progress: ProgressTracker,
        metrics: ScanMetrics,
    ) -> Self {
        Self {
            domain,
            config,
            output_dir,
            search_path,
            progress,
            metrics: Mutex::new(metrics),
        }
    }

    pub fn artifact_path(&self, phase: Phase) -> PathBuf {
        self.output_dir.join(phase.artifact_file())
    }

    pub fn metrics(&self) -> ScanMetrics {
        match self.metrics.lock() {
            Ok(metrics) => metrics.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Run phases 1 to 4 in order, stopping at the first phase that comes
    /// back empty.
    pub async fn run_full(&self) -> Result<FullScanReport> {
        let mut completed = Vec::new();
        for phase in Phase::ALL {
            match self.run_phase(phase).await? {
                PhaseOutcome::Complete(artifact) => completed.push(artifact),
                PhaseOutcome::Aborted { phase, reason } => {
                    return Ok(FullScanReport {
                        completed,
                        stopped_at: Some((phase, reason)),
                    });
                }
            }
        }
        Ok(FullScanReport {
            completed,
            stopped_at: None,
        })
    }

    /// Run one phase, producing its prerequisite first when needed.
    ///
    /// Empty phases are reported through [`PhaseOutcome::Aborted`]; errors are
    /// reserved for an interrupt and for failures writing the artifact.
    pub async fn run_phase(&self, phase: Phase) -> Result<PhaseOutcome> {
        self.progress.phase_started(phase);
        let started_at = Utc::now();
        let clock = Instant::now();

        let input = match self.resolve_upstream(phase).await? {
            Ok(input) => input,
            Err(reason) => {
                self.progress.phase_aborted(phase, &reason.to_string());
                self.record(phase, None, Some(&reason), Vec::new(), started_at, clock);
                return Ok(PhaseOutcome::Aborted { phase, reason });
            }
        };

        let specs = phase_tools(phase, &self.config, &self.output_dir);
        let tool_names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();

        if specs.is_empty() {
            return Ok(self.abort_empty(phase, AbortReason::NoTools, tool_names, started_at, clock));
        }

        let lines = self.execute_tools(phase, specs, &input).await?;
        if lines.is_empty() {
            return Ok(self.abort_empty(phase, AbortReason::NoResults, tool_names, started_at, clock));
        }

        let path = self.artifact_path(phase);
        let lines = artifact::write_lines(&path, lines)?;
        self.progress.phase_completed(phase, lines.len(), &path);
        self.record(phase, Some(lines.len()), None, tool_names, started_at, clock);

        Ok(PhaseOutcome::Complete(Artifact { phase, path, lines }))
    }

    /// Dependency resolution: the input for `phase`, running the upstream
    /// phase when its artifact is absent or empty.
    async fn resolve_upstream(&self, phase: Phase) -> Result<Result<Target, AbortReason>> {
        let Some(upstream) = phase.upstream() else {
            return Ok(Ok(self.domain.clone()));
        };

        let path = self.artifact_path(upstream);
        if artifact::is_complete(&path) {
            return Ok(Ok(Target::from(path.as_path())));
        }

        self.progress.phase_backfill(phase, upstream);
        let outcome = Box::pin(self.run_phase(upstream)).await?;
        if outcome.lines().is_empty() || !artifact::is_complete(&path) {
            return Ok(Err(AbortReason::UpstreamEmpty(upstream)));
        }
        Ok(Ok(Target::from(path.as_path())))
    }

    /// Several tools go through the parallel runner; a single tool is invoked
    /// directly. Raw output files are folded in afterwards, which also keeps
    /// whatever a killed tool had already written.
    async fn execute_tools(&self, phase: Phase, specs: Vec<ToolSpec>, input: &Target) -> Result<Vec<String>> {
        let raw_files: Vec<PathBuf> = specs.iter().filter_map(|s| s.raw_output.clone()).collect();

        let mut lines = match <[ToolSpec; 1]>::try_from(specs) {
            Ok([spec]) => {
                let mut task = ToolTask::new(spec, Arc::clone(&self.search_path), self.progress.clone());
                // The others are disabled; keep the limit the runner would have applied
                if is_parallel_phase(phase) {
                    task = task.with_timeout(self.config.process_timeout());
                }
                task.invoke(input, &self.config).await
            }
            Err(specs) => {
                let tasks: Vec<Arc<dyn Task>> = specs
                    .into_iter()
                    .map(|spec| {
                        Arc::new(ToolTask::new(spec, Arc::clone(&self.search_path), self.progress.clone()))
                            as Arc<dyn Task>
                    })
                    .collect();
                TaskRunner::new(self.config.process_timeout(), self.progress.clone())
                    .run_parallel(
                        tasks,
                        input,
                        &self.config,
                        &format!("Running {}...", phase.title().to_lowercase()),
                    )
                    .await?
            }
        };

        lines.extend(artifact::merge_raw_files(&raw_files));
        Ok(artifact::normalize(lines))
    }

    fn abort_empty(
        &self,
        phase: Phase,
        reason: AbortReason,
        tools: Vec<String>,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
    ) -> PhaseOutcome {
        // A stale artifact from an earlier run would make the next phase
        // believe this one succeeded
        let path = self.artifact_path(phase);
        if path.exists() {
            fs::remove_file(&path).ok();
        }
        self.progress.phase_aborted(phase, &reason.to_string());
        self.record(phase, None, Some(&reason), tools, started_at, clock);
        PhaseOutcome::Aborted { phase, reason }
    }

    fn record(
        &self,
        phase: Phase,
        results: Option<usize>,
        reason: Option<&AbortReason>,
        tools: Vec<String>,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
    ) {
        let entry = PhaseMetrics {
            phase,
            status: if results.is_some() { PhaseStatus::Completed } else { PhaseStatus::Aborted },
            reason: reason.map(|r| r.to_string()),
            results: results.unwrap_or(0),
            tools,
            started_at,
            duration_seconds: clock.elapsed().as_secs_f64(),
        };
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record_phase(entry);
        }
    }
}
