// tools.rs - Tool discovery and the default tool catalog
// Purpose: Resolve tool binaries against an explicit search path and
//          describe which tools each phase runs

use colored::*;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::pipeline::Phase;
use crate::task::{StdinSource, ToolSpec};

/// Ordered list of directories searched for tool binaries.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        let mut path = Self::default();
        for dir in dirs {
            path.push(dir);
        }
        path
    }

    /// Configured extra dirs first, then the inherited PATH, then the
    /// directories security tools usually get installed into.
    pub fn from_env(extra_dirs: &[PathBuf]) -> Self {
        let mut path = Self::new(extra_dirs.to_vec());
        if let Some(inherited) = env::var_os("PATH") {
            for dir in env::split_paths(&inherited) {
                path.push(dir);
            }
        }
        for dir in common_tool_dirs() {
            path.push(dir);
        }
        path
    }

    fn push(&mut self, dir: PathBuf) {
        if !dir.as_os_str().is_empty() && !self.dirs.contains(&dir) {
            self.dirs.push(dir);
        }
    }

    /// Find the executable for `program`. Names with a path separator are
    /// checked as-is.
    pub fn resolve(&self, program: &str) -> Option<PathBuf> {
        if program.is_empty() {
            return None;
        }
        if program.contains(std::path::MAIN_SEPARATOR) {
            let candidate = PathBuf::from(program);
            return is_executable(&candidate).then_some(candidate);
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }

    /// Value handed to child processes as their PATH.
    pub fn to_env_value(&self) -> OsString {
        env::join_paths(&self.dirs).unwrap_or_default()
    }
}

/// Common paths where security tools may be installed
fn common_tool_dirs() -> Vec<PathBuf> {
    let home = env::var("HOME").unwrap_or_else(|_| "/root".to_string());
    let gopath = env::var("GOPATH").unwrap_or_else(|_| format!("{}/go", home));

    vec![
        PathBuf::from(format!("{}/bin", gopath)),
        PathBuf::from(format!("{}/go/bin", home)),
        PathBuf::from("/usr/local/go/bin"),
        PathBuf::from(format!("{}/.cargo/bin", home)),
        PathBuf::from(format!("{}/.local/bin", home)),
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/usr/bin"),
        PathBuf::from("/bin"),
        PathBuf::from("/snap/bin"),
        PathBuf::from("/home/linuxbrew/.linuxbrew/bin"),
        PathBuf::from(format!("{}/.nix-profile/bin", home)),
        PathBuf::from("/opt/tools"),
        PathBuf::from("/opt/bin"),
    ]
}

fn is_executable(candidate: &Path) -> bool {
    if !candidate.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(candidate)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TOOL INVENTORY
// ═══════════════════════════════════════════════════════════════════════════

/// Tool definition with installation info
pub struct ToolInfo {
    pub name: &'static str,
    pub binary: &'static str,
    pub description: &'static str,
    pub phase: Phase,
    pub install_cmd: &'static str,
    /// Default command template
    pub command: &'static str,
    pub stdin: StdinSource,
    /// Raw output file relative to the output directory
    pub raw_output: Option<&'static str>,
}

pub fn tools_list() -> Vec<ToolInfo> {
    vec![
        ToolInfo {
            name: "subfinder",
            binary: "subfinder",
            description: "Passive subdomain discovery",
            phase: Phase::SubdomainEnumeration,
            install_cmd: "go install -v github.com/projectdiscovery/subfinder/v2/cmd/subfinder@latest",
            command: "subfinder -d {target} -silent",
            stdin: StdinSource::None,
            raw_output: None,
        },
        ToolInfo {
            name: "assetfinder",
            binary: "assetfinder",
            description: "Subdomain discovery from public sources",
            phase: Phase::SubdomainEnumeration,
            install_cmd: "go install -v github.com/tomnomnom/assetfinder@latest",
            command: "assetfinder --subs-only {target}",
            stdin: StdinSource::None,
            raw_output: None,
        },
        ToolInfo {
            name: "findomain",
            binary: "findomain",
            description: "Certificate transparency subdomain finder",
            phase: Phase::SubdomainEnumeration,
            install_cmd: "cargo install findomain || apt-get install -y findomain",
            command: "findomain -t {target} -q",
            stdin: StdinSource::None,
            raw_output: None,
        },
        ToolInfo {
            name: "httpx",
            binary: "httpx",
            description: "HTTP probing and validation",
            phase: Phase::HostDiscovery,
            install_cmd: "go install -v github.com/projectdiscovery/httpx/cmd/httpx@latest",
            command: "httpx -l {target} -silent -threads {threads} -o {output}",
            stdin: StdinSource::None,
            raw_output: Some("hosts/httpx_raw.txt"),
        },
        ToolInfo {
            name: "katana",
            binary: "katana",
            description: "Fast web crawler",
            phase: Phase::Crawling,
            install_cmd: "go install -v github.com/projectdiscovery/katana/cmd/katana@latest",
            command: "katana -list {target} -silent -jc -d 2 -o {output}",
            stdin: StdinSource::None,
            raw_output: Some("urls/katana_raw.txt"),
        },
        ToolInfo {
            name: "gau",
            binary: "gau",
            description: "Fetch URLs from web archives",
            phase: Phase::Crawling,
            install_cmd: "go install -v github.com/lc/gau/v2/cmd/gau@latest",
            command: "gau --o {output}",
            stdin: StdinSource::TargetFile,
            raw_output: Some("urls/gau_raw.txt"),
        },
        ToolInfo {
            name: "nuclei",
            binary: "nuclei",
            description: "Vulnerability scanner",
            phase: Phase::VulnScanning,
            install_cmd: "go install -v github.com/projectdiscovery/nuclei/v3/cmd/nuclei@latest",
            command: "nuclei -l {target} -c {threads} -bs 25 -silent -o {output}",
            stdin: StdinSource::None,
            raw_output: Some("vulns/nuclei_results.txt"),
        },
    ]
}

/// Whether the phase normally runs several tools through the parallel runner
pub fn is_parallel_phase(phase: Phase) -> bool {
    tools_list().iter().filter(|tool| tool.phase == phase).count() > 1
}

/// Tool specs for `phase`, in catalog order, with configuration overrides
/// applied and disabled tools left out.
pub fn phase_tools(phase: Phase, config: &Config, output_dir: &Path) -> Vec<ToolSpec> {
    tools_list()
        .into_iter()
        .filter(|tool| tool.phase == phase)
        .filter_map(|tool| {
            let overridden = config.tool_override(tool.name);
            if overridden.is_some_and(|o| !o.enabled) {
                return None;
            }
            let command = overridden
                .and_then(|o| o.command.as_deref())
                .unwrap_or(tool.command);

            let mut spec = ToolSpec::new(tool.name, command).with_stdin(tool.stdin);
            if let Some(raw) = tool.raw_output {
                spec = spec.with_raw_output(output_dir.join(raw));
            }
            Some(spec)
        })
        .collect()
}

/// Print found/missing status for every known tool. Returns the number of
/// missing tools.
pub fn check_tools_status(search_path: &SearchPath) -> usize {
    println!("{}", "── TOOL STATUS ──".cyan().bold());

    let tools = tools_list();
    let mut missing = 0;

    for tool in &tools {
        match search_path.resolve(tool.binary) {
            Some(path) => println!(
                "    {} {:<12} {} → {}",
                "✓".green(),
                tool.name.green(),
                format!("[phase {}]", tool.phase.number()).dimmed(),
                path.display().to_string().dimmed()
            ),
            None => {
                missing += 1;
                println!(
                    "    {} {:<12} {} - {}",
                    "✗".red(),
                    tool.name.red(),
                    format!("[phase {}]", tool.phase.number()).dimmed(),
                    tool.description
                );
                println!("      {} {}", "Install:".yellow(), tool.install_cmd);
            }
        }
    }

    println!();
    if missing == 0 {
        println!("{}", format!("[+] All {} tools found", tools.len()).green().bold());
    } else {
        println!(
            "{}",
            format!("[!] {}/{} tools missing; their tasks will yield no results", missing, tools.len())
                .yellow()
        );
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_shell() {
        let path = SearchPath::new(vec![PathBuf::from("/bin"), PathBuf::from("/usr/bin")]);
        let sh = path.resolve("sh").expect("sh should exist on unix");
        assert!(sh.ends_with("sh"));
    }

    #[test]
    fn test_missing_tool() {
        let path = SearchPath::from_env(&[]);
        assert!(path.resolve("no-such-tool-xyz").is_none());
        assert!(path.resolve("").is_none());
    }

    #[test]
    fn test_absolute_program() {
        let path = SearchPath::new(Vec::new());
        assert!(path.resolve("/bin/sh").is_some());
        assert!(path.resolve("/nonexistent/bin/tool").is_none());
    }

    #[test]
    fn test_extra_dirs_first_and_deduplicated() {
        let path = SearchPath::from_env(&[PathBuf::from("/opt/custom"), PathBuf::from("/opt/custom")]);
        let dirs: Vec<PathBuf> = env::split_paths(&path.to_env_value()).collect();
        assert_eq!(dirs[0], PathBuf::from("/opt/custom"));
        assert_eq!(dirs.iter().filter(|d| d.as_path() == Path::new("/opt/custom")).count(), 1);
    }

    #[test]
    fn test_non_executable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plainfile"), "data").unwrap();
        let path = SearchPath::new(vec![dir.path().to_path_buf()]);
        assert!(path.resolve("plainfile").is_none());
    }

    #[test]
    fn test_phase_tools_defaults() {
        let out = Path::new("/tmp/recon_example_com");
        let subs = phase_tools(Phase::SubdomainEnumeration, &Config::default(), out);
        let names: Vec<&str> = subs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["subfinder", "assetfinder", "findomain"]);
        assert!(subs.iter().all(|s| s.raw_output.is_none()));

        let crawl = phase_tools(Phase::Crawling, &Config::default(), out);
        assert_eq!(crawl.len(), 2);
        assert_eq!(crawl[1].stdin, StdinSource::TargetFile);
        assert_eq!(crawl[0].raw_output, Some(out.join("urls/katana_raw.txt")));
        assert_ne!(crawl[0].raw_output, crawl[1].raw_output);

        assert_eq!(phase_tools(Phase::HostDiscovery, &Config::default(), out).len(), 1);
        assert_eq!(phase_tools(Phase::VulnScanning, &Config::default(), out).len(), 1);
    }

    #[test]
    fn test_phase_tools_overrides() {
        let config = Config::from_yaml(
            "tools:\n  findomain:\n    enabled: false\n  subfinder:\n    command: \"echo sub.{target}\"\n",
        )
        .unwrap();
        let subs = phase_tools(Phase::SubdomainEnumeration, &config, Path::new("out"));
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].command, "echo sub.{target}");
        assert_eq!(subs[1].name, "assetfinder");
    }

    #[test]
    fn test_inventory_covers_every_phase() {
        let tools = tools_list();
        for phase in Phase::ALL {
            assert!(tools.iter().any(|t| t.phase == phase));
        }
        assert!(is_parallel_phase(Phase::SubdomainEnumeration));
        assert!(is_parallel_phase(Phase::Crawling));
        assert!(!is_parallel_phase(Phase::HostDiscovery));
        assert!(!is_parallel_phase(Phase::VulnScanning));
    }
}
