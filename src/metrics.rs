use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::pipeline::Phase;

/// Summary of one reconnaissance run, saved as `scan_metrics.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetrics {
    pub scan_id: String,
    pub target: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub phases: Vec<PhaseMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhaseStatus {
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub reason: Option<String>,
    pub results: usize,
    pub tools: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl ScanMetrics {
    pub fn new(scan_id: String, target: String) -> Self {
        Self {
            scan_id,
            target,
            start_time: Utc::now(),
            end_time: None,
            duration_seconds: 0.0,
            phases: Vec::new(),
        }
    }

    pub fn record_phase(&mut self, metrics: PhaseMetrics) {
        self.phases.push(metrics);
    }

    pub fn finalize(&mut self) {
        let end = Utc::now();
        self.duration_seconds = (end - self.start_time).num_milliseconds() as f64 / 1000.0;
        self.end_time = Some(end);
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write metrics: {}", path.display()))?;
        Ok(())
    }

    pub fn print_summary(&self) {
        println!("\n{}", "═══════════════════════════════════════════════════════════════".cyan().bold());
        println!("{}", format!("  SCAN SUMMARY: {}", self.target).cyan().bold());
        println!("{}", "═══════════════════════════════════════════════════════════════".cyan().bold());
        for phase in &self.phases {
            let line = format!(
                "  Phase {} {:<28} {:>6} results  ({:.1}s)",
                phase.phase.number(),
                phase.phase.title(),
                phase.results,
                phase.duration_seconds
            );
            match phase.status {
                PhaseStatus::Completed => println!("{}", line.green()),
                PhaseStatus::Aborted => println!(
                    "{}",
                    format!("{}  aborted: {}", line, phase.reason.as_deref().unwrap_or("unknown")).yellow()
                ),
            }
        }
        println!("{}", format!("  Duration: {:.1}s", self.duration_seconds).cyan());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(phase: Phase, results: usize) -> PhaseMetrics {
        PhaseMetrics {
            phase,
            status: PhaseStatus::Completed,
            reason: None,
            results,
            tools: vec!["subfinder".into()],
            started_at: Utc::now(),
            duration_seconds: 1.5,
        }
    }

    #[test]
    fn test_phases_recorded_in_run_order() {
        let mut metrics = ScanMetrics::new("id".into(), "example.com".into());
        metrics.record_phase(phase(Phase::SubdomainEnumeration, 3));
        metrics.record_phase(phase(Phase::HostDiscovery, 2));
        assert!(metrics.end_time.is_none());

        metrics.finalize();
        let order: Vec<(Phase, usize)> = metrics.phases.iter().map(|p| (p.phase, p.results)).collect();
        assert_eq!(order, vec![(Phase::SubdomainEnumeration, 3), (Phase::HostDiscovery, 2)]);
        assert!(metrics.end_time.is_some() && metrics.duration_seconds >= 0.0);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_metrics.json");
        let mut metrics = ScanMetrics::new("id".into(), "example.com".into());
        metrics.record_phase(phase(Phase::HostDiscovery, 2));
        metrics.finalize();
        metrics.save_to_file(&path).unwrap();

        let loaded: ScanMetrics = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.phases.len(), 1);
        assert!(loaded.end_time.is_some());
    }
}
