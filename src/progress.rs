use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::pipeline::Phase;

/// One status event, persisted as a JSON line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub timestamp: DateTime<Utc>,
    pub scan_id: String,
    pub target: String,
    pub event_type: EventType,
    pub message: String,
    pub progress_percentage: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventType {
    ScanStarted,
    PhaseStarted { phase: Phase },
    PhaseBackfill { phase: Phase, upstream: Phase },
    ToolStarted { tool_name: String },
    ToolCompleted { tool_name: String, results: usize },
    ToolFailed { tool_name: String, error: String },
    ToolTimedOut { tool_name: String, timeout_secs: u64 },
    DataFound { data_type: String, count: usize },
    PhaseCompleted { phase: Phase, results: usize },
    PhaseAborted { phase: Phase, reason: String },
    ScanCompleted,
    ScanFailed { error: String },
}

/// Console status lines plus a `progress.jsonl` trail in the output directory.
/// Cheap to clone; clones share the event list.
#[derive(Clone)]
pub struct ProgressTracker {
    scan_id: String,
    target: String,
    output_dir: Option<PathBuf>,
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl ProgressTracker {
    pub fn new(scan_id: String, target: String, output_dir: PathBuf) -> Self {
        fs::create_dir_all(&output_dir).ok();
        Self {
            scan_id,
            target,
            output_dir: Some(output_dir),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Tracker that only prints and keeps events in memory
    pub fn console_only(target: String) -> Self {
        Self {
            scan_id: String::new(),
            target,
            output_dir: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_event(&self, event_type: EventType, message: String, progress: f32) {
        let event = ProgressEvent {
            timestamp: Utc::now(),
            scan_id: self.scan_id.clone(),
            target: self.target.clone(),
            event_type,
            message,
            progress_percentage: progress,
        };

        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }

        self.save_to_file(&event);
    }

    fn save_to_file(&self, event: &ProgressEvent) {
        let Some(output_dir) = &self.output_dir else {
            return;
        };
        let progress_file = output_dir.join("progress.jsonl");

        if let Ok(json) = serde_json::to_string(event) {
            if let Ok(mut file) = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&progress_file)
            {
                use std::io::Write;
                writeln!(file, "{}", json).ok();
            }
        }

        self.save_current_status(output_dir);
    }

    fn save_current_status(&self, output_dir: &Path) {
        let status_file = output_dir.join("current_status.json");

        if let Ok(events) = self.events.lock() {
            if let Some(event) = events.last() {
                let status = serde_json::json!({
                    "scan_id": self.scan_id,
                    "target": self.target,
                    "last_update": event.timestamp,
                    "progress": event.progress_percentage,
                    "current_message": event.message,
                    "event_type": event.event_type,
                    "total_events": events.len(),
                });

                if let Ok(json) = serde_json::to_string_pretty(&status) {
                    fs::write(&status_file, json).ok();
                }
            }
        }
    }

    pub fn scan_started(&self) {
        println!("{}", format!("[*] Starting reconnaissance of {}", self.target).cyan().bold());
        self.add_event(EventType::ScanStarted, format!("Starting scan of {}", self.target), 0.0);
    }

    pub fn phase_started(&self, phase: Phase) {
        println!("\n{}", "═══════════════════════════════════════════════════════════════".blue().bold());
        println!("{}", format!("  STARTING PHASE {}: {}", phase.number(), phase.title()).blue().bold());
        println!("{}", "═══════════════════════════════════════════════════════════════".blue().bold());
        self.add_event(
            EventType::PhaseStarted { phase },
            format!("Phase {} started: {}", phase.number(), phase.title()),
            phase.start_percentage(),
        );
    }

    pub fn phase_backfill(&self, phase: Phase, upstream: Phase) {
        println!(
            "{}",
            format!(
                "[!] {} not found. Running Phase {} first...",
                upstream.artifact_name(),
                upstream.number()
            )
            .yellow()
        );
        self.add_event(
            EventType::PhaseBackfill { phase, upstream },
            format!("Phase {} needs {}; running it first", phase.number(), upstream.title()),
            phase.start_percentage(),
        );
    }

    pub fn tool_started(&self, tool_name: &str, target: &str) {
        println!("{}", format!("[*] Running {} on {}...", tool_name, target).yellow());
        self.add_event(
            EventType::ToolStarted { tool_name: tool_name.to_string() },
            format!("Running {}", tool_name),
            0.0,
        );
    }

    pub fn tool_completed(&self, tool_name: &str, results: usize) {
        if results > 0 {
            println!("{}", format!("[+] {} found {} results.", tool_name, results).green().bold());
        } else {
            println!("{}", format!("[!] {} produced no results.", tool_name).yellow());
        }
        self.add_event(
            EventType::ToolCompleted { tool_name: tool_name.to_string(), results },
            format!("{} finished with {} results", tool_name, results),
            0.0,
        );
    }

    pub fn tool_failed(&self, tool_name: &str, error: &str) {
        println!("{}", format!("[!] Warning: {} failed: {}", tool_name, error).yellow());
        self.add_event(
            EventType::ToolFailed {
                tool_name: tool_name.to_string(),
                error: error.to_string(),
            },
            format!("{} failed: {}", tool_name, error),
            0.0,
        );
    }

    pub fn tool_timed_out(&self, tool_name: &str, timeout_secs: u64) {
        println!(
            "{}",
            format!("[!] {} timed out after {} seconds. Terminating.", tool_name, timeout_secs).red().bold()
        );
        self.add_event(
            EventType::ToolTimedOut {
                tool_name: tool_name.to_string(),
                timeout_secs,
            },
            format!("{} timed out after {}s", tool_name, timeout_secs),
            0.0,
        );
    }

    pub fn data_found(&self, data_type: &str, count: usize, progress: f32) {
        self.add_event(
            EventType::DataFound {
                data_type: data_type.to_string(),
                count,
            },
            format!("Found {} {}", count, data_type),
            progress,
        );
    }

    pub fn phase_completed(&self, phase: Phase, results: usize, artifact: &Path) {
        println!(
            "{}",
            format!("[+] Combined and saved {} unique results to {}", results, artifact.display())
                .green()
                .bold()
        );
        println!("{}", format!("  PHASE {}: {} COMPLETE", phase.number(), phase.title()).blue().bold());
        self.data_found(phase.data_label(), results, phase.end_percentage());
        self.add_event(
            EventType::PhaseCompleted { phase, results },
            format!("Phase {} complete with {} results", phase.number(), results),
            phase.end_percentage(),
        );
    }

    pub fn phase_aborted(&self, phase: Phase, reason: &str) {
        println!(
            "{}",
            format!("[!] Phase {} ({}) aborted: {}", phase.number(), phase.title(), reason).red().bold()
        );
        self.add_event(
            EventType::PhaseAborted {
                phase,
                reason: reason.to_string(),
            },
            format!("Phase {} aborted: {}", phase.number(), reason),
            phase.end_percentage(),
        );
    }

    pub fn scan_completed(&self) {
        println!("\n{}", "*** Full Scan Workflow Complete ***".magenta().bold());
        self.add_event(
            EventType::ScanCompleted,
            format!("Scan of {} complete", self.target),
            100.0,
        );
    }

    pub fn scan_failed(&self, error: &str) {
        eprintln!("{}", format!("[!] Scan failed: {}", error).red().bold());
        self.add_event(
            EventType::ScanFailed { error: error.to_string() },
            format!("Scan failed: {}", error),
            0.0,
        );
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_jsonl(path: &Path) -> Vec<ProgressEvent> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_events_are_persisted_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ProgressTracker::new("scan-1".into(), "example.com".into(), dir.path().to_path_buf());

        tracker.scan_started();
        tracker.phase_started(Phase::SubdomainEnumeration);
        tracker.tool_timed_out("findomain", 600);

        let events = read_jsonl(&dir.path().join("progress.jsonl"));
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, EventType::ScanStarted);
        assert_eq!(
            events[1].event_type,
            EventType::PhaseStarted { phase: Phase::SubdomainEnumeration }
        );
        assert!(dir.path().join("current_status.json").exists());
    }

    #[test]
    fn test_clones_share_events() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ProgressTracker::new("scan-1".into(), "example.com".into(), dir.path().to_path_buf());
        tracker.clone().tool_failed("gau", "exited with code 1");
        tracker.tool_completed("katana", 4);

        let status: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("current_status.json")).unwrap()).unwrap();
        assert_eq!(status["total_events"], 2);
        assert_eq!(read_jsonl(&dir.path().join("progress.jsonl")).len(), 2);
    }
}
