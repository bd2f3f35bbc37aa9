// main.rs - ReconChain - Multi-phase reconnaissance orchestrator
// Purpose: Chain subdomain enumeration, live host discovery, crawling and
//          vulnerability scanning, each phase feeding the next

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reconchain::config::Config;
use reconchain::metrics::ScanMetrics;
use reconchain::pipeline::{Phase, Pipeline};
use reconchain::progress::ProgressTracker;
use reconchain::task::Target;
use reconchain::task_runner::RunnerError;
use reconchain::tools::{check_tools_status, SearchPath};

/// Exit code when the requested work stopped at an empty phase
const EXIT_PHASE_EMPTY: i32 = 2;
/// Conventional exit code after Ctrl-C
const EXIT_INTERRUPTED: i32 = 130;

/// ReconChain - chained reconnaissance with external tools
#[derive(Parser, Debug)]
#[command(
    name = "reconchain",
    version,
    about = "Chained reconnaissance: subdomains -> live hosts -> URLs -> vulnerabilities",
    long_about = r#"
ReconChain runs external recon tools in four dependent phases:

  1. SUBDOMAIN ENUMERATION   subfinder, assetfinder, findomain (parallel)
  2. LIVE HOST DISCOVERY     httpx
  3. CRAWLING                katana, gau (parallel)
  4. VULNERABILITY SCANNING  nuclei

Asking for a later phase runs the earlier ones first when their results are
missing from the output directory.

OUTPUT FILES:

  recon_<domain>_<timestamp>/
  ├── subs/all_subdomains.txt
  ├── hosts/live_hosts.txt
  ├── urls/all_urls.txt
  ├── vulns/all_vulns.txt
  ├── progress.jsonl
  └── scan_metrics.json
"#
)]
struct Args {
    /// Target domain (e.g., example.com)
    #[arg(value_name = "DOMAIN", required_unless_present = "check_tools")]
    domain: Option<String>,

    /// Phase to run; earlier phases are run on demand
    #[arg(short, long, value_enum, default_value_t = PhaseArg::Full)]
    phase: PhaseArg,

    /// Configuration file (default: ./config.yaml or ../config.yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output directory (default: recon_<domain>_<YYYYmmddHHMM>)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Per-task timeout in seconds for parallel phases (overrides settings.process_timeout)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Thread count passed to httpx and nuclei (overrides settings.threads)
    #[arg(long, value_name = "N", value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    threads: Option<usize>,

    /// Show which tools are installed and exit
    #[arg(long)]
    check_tools: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PhaseArg {
    /// Phase 1: subdomain enumeration
    Subs,
    /// Phase 2: live host discovery
    Hosts,
    /// Phase 3: crawling & URL gathering
    Crawl,
    /// Phase 4: vulnerability scanning
    Vulns,
    /// All four phases in order
    Full,
}

impl PhaseArg {
    fn phase(self) -> Option<Phase> {
        match self {
            PhaseArg::Subs => Some(Phase::SubdomainEnumeration),
            PhaseArg::Hosts => Some(Phase::HostDiscovery),
            PhaseArg::Crawl => Some(Phase::Crawling),
            PhaseArg::Vulns => Some(Phase::VulnScanning),
            PhaseArg::Full => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    print_banner();

    let (mut config, config_path) = Config::discover(args.config.as_deref())?;
    match &config_path {
        Some(path) => println!("{}", format!("[+] Configuration loaded from {}", path.display()).green()),
        None => println!("{}", "[*] No config.yaml found, using defaults".cyan()),
    }
    if let Some(timeout) = args.timeout {
        config.settings.process_timeout = timeout;
    }
    if let Some(threads) = args.threads {
        config.settings.threads = threads;
    }

    let search_path = Arc::new(SearchPath::from_env(&config.settings.tool_dirs));

    if args.check_tools {
        check_tools_status(&search_path);
        return Ok(());
    }

    let Some(domain) = args.domain.as_deref() else {
        anyhow::bail!("a target domain is required");
    };

    let output_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => default_output_dir(domain),
    };
    create_output_directory(&output_dir)?;

    let scan_id = uuid::Uuid::new_v4().to_string();
    println!("{}", format!("[*] Output directory: {}/", output_dir.display()).cyan());
    println!("{}", format!("[*] Scan ID: {}", scan_id).cyan());

    let progress = ProgressTracker::new(scan_id.clone(), domain.to_string(), output_dir.clone());
    let pipeline = Pipeline::new(
        Target::new(domain),
        Arc::new(config),
        output_dir.clone(),
        search_path,
        progress.clone(),
        ScanMetrics::new(scan_id, domain.to_string()),
    );

    progress.scan_started();
    // Single-tool phases are not covered by the runner's own interrupt
    // handling; dropping the run kills whatever tool is active
    let result = tokio::select! {
        result = run(&pipeline, args.phase) => result,
        _ = tokio::signal::ctrl_c() => Err(RunnerError::Interrupted.into()),
    };

    let mut metrics = pipeline.metrics();
    metrics.finalize();
    if let Err(e) = metrics.save_to_file(&output_dir.join("scan_metrics.json")) {
        eprintln!("{}", format!("[!] {:#}", e).yellow());
    }
    metrics.print_summary();

    match result {
        Ok(true) => {
            progress.scan_completed();
            Ok(())
        }
        Ok(false) => std::process::exit(EXIT_PHASE_EMPTY),
        Err(e) if e.downcast_ref::<RunnerError>().is_some() => {
            progress.scan_failed("interrupted by user");
            std::process::exit(EXIT_INTERRUPTED);
        }
        Err(e) => {
            progress.scan_failed(&format!("{:#}", e));
            Err(e)
        }
    }
}

/// Run the requested phase (or the full chain). `Ok(false)` means the run
/// stopped at a phase that produced nothing.
async fn run(pipeline: &Pipeline, requested: PhaseArg) -> Result<bool> {
    match requested.phase() {
        Some(phase) => {
            let outcome = pipeline.run_phase(phase).await?;
            Ok(outcome.is_complete())
        }
        None => {
            println!("\n{}", "[*] Starting Full & Deep Scan Methodology...".yellow());
            let report = pipeline.run_full().await?;
            match &report.stopped_at {
                Some((phase, reason)) => {
                    println!(
                        "{}",
                        format!("[!] Full scan stopped at {}: {}", phase, reason).red().bold()
                    );
                    Ok(false)
                }
                None => Ok(true),
            }
        }
    }
}

fn default_output_dir(domain: &str) -> PathBuf {
    PathBuf::from(format!(
        "recon_{}_{}",
        domain.replace('.', "_"),
        chrono::Local::now().format("%Y%m%d%H%M")
    ))
}

fn create_output_directory(base: &Path) -> Result<()> {
    for sub in ["subs", "hosts", "urls", "vulns", "misc"] {
        let dir = base.join(sub);
        fs::create_dir_all(&dir).context(format!("Failed to create output directory: {}", dir.display()))?;
    }
    Ok(())
}

/// Print application banner
fn print_banner() {
    println!("{}", "═══════════════════════════════════════════════════════════════".blue().bold());
    println!("{}", "  ██████╗ ███████╗ ██████╗ ██████╗ ███╗   ██╗".blue().bold());
    println!("{}", "  ██╔══██╗██╔════╝██╔════╝██╔═══██╗████╗  ██║".blue().bold());
    println!("{}", "  ██████╔╝█████╗  ██║     ██║   ██║██╔██╗ ██║".blue().bold());
    println!("{}", "  ██╔══██╗██╔══╝  ██║     ██║   ██║██║╚██╗██║".blue().bold());
    println!("{}", "  ██║  ██║███████╗╚██████╗╚██████╔╝██║ ╚████║".blue().bold());
    println!("{}", "  ╚═╝  ╚═╝╚══════╝ ╚═════╝ ╚═════╝ ╚═╝  ╚═══╝".blue().bold());
    println!("{}", "═══════════════════════════════════════════════════════════════".blue().bold());
    println!("{}", format!("  ReconChain v{} - Chained Reconnaissance", env!("CARGO_PKG_VERSION")).white().bold());
    println!("{}", "═══════════════════════════════════════════════════════════════\n".blue().bold());
}
