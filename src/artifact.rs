// artifact.rs - Phase artifacts: sorted, deduplicated line files
// Purpose: The on-disk contract between adjacent pipeline phases

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::pipeline::Phase;

/// Output of a completed phase, handed to the next phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub phase: Phase,
    pub path: PathBuf,
    pub lines: Vec<String>,
}

/// A phase counts as complete only when its artifact exists with content.
pub fn is_complete(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

/// Sort, deduplicate and write one entry per line. Returns the written lines.
pub fn write_lines<I, S>(path: &Path, lines: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let unique = normalize(lines);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let mut content = String::new();
    for line in &unique {
        content.push_str(line);
        content.push('\n');
    }
    fs::write(path, content).with_context(|| format!("Failed to write artifact: {}", path.display()))?;

    Ok(unique)
}

/// Trimmed, non-empty lines of `path`. A missing file reads as empty.
/// Invalid UTF-8 is replaced rather than failing the whole file.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(split_lines(&String::from_utf8_lossy(&bytes)))
}

/// Union of the lines of every raw output file that exists.
pub fn merge_raw_files(paths: &[PathBuf]) -> Vec<String> {
    let mut merged = BTreeSet::new();
    for path in paths {
        match read_lines(path) {
            Ok(lines) => merged.extend(lines),
            Err(e) => eprintln!("[!] Warning: could not read lines from {}: {:#}", path.display(), e),
        }
    }
    merged.into_iter().collect()
}

/// Split tool output into clean lines (trimmed, ANSI colours removed, blanks dropped).
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| strip_ansi_codes(l.trim()).trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Sorted, deduplicated, with blank entries removed.
pub fn normalize<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|l| l.as_ref().trim().to_string())
        .filter(|l| !l.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Strip ANSI escape codes from a string
pub fn strip_ansi_codes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            // ESC [ ... final_byte
            if chars.peek() == Some(&'[') {
                chars.next();
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_sorts_and_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs").join("all_subdomains.txt");

        let written = write_lines(&path, ["b.example.com", "a.example.com", "b.example.com", "", "  "]).unwrap();
        assert_eq!(written, vec!["a.example.com", "b.example.com"]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "a.example.com\nb.example.com\n");
    }

    #[test]
    fn test_rewrite_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");

        write_lines(&path, ["https://b.example.com/x", "https://a.example.com/"]).unwrap();
        let first = fs::read(&path).unwrap();
        write_lines(&path, ["https://a.example.com/", "https://b.example.com/x", "https://a.example.com/"]).unwrap();
        assert_eq!(first, fs::read(&path).unwrap());
    }

    #[test]
    fn test_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live_hosts.txt");
        assert!(!is_complete(&path));

        fs::write(&path, "").unwrap();
        assert!(!is_complete(&path));

        fs::write(&path, "https://example.com\n").unwrap();
        assert!(is_complete(&path));
        assert!(!is_complete(dir.path()));
    }

    #[test]
    fn test_merge_raw_files_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let katana = dir.path().join("katana.txt");
        let gau = dir.path().join("gau.txt");
        fs::write(&katana, "https://example.com/b\nhttps://example.com/a\n").unwrap();
        fs::write(&gau, "https://example.com/a\n\nhttps://example.com/c\n").unwrap();

        let merged = merge_raw_files(&[katana, dir.path().join("missing.txt"), gau]);
        assert_eq!(
            merged,
            vec!["https://example.com/a", "https://example.com/b", "https://example.com/c"]
        );
    }

    #[test]
    fn test_invalid_utf8_keeps_valid_lines() {
        let dir = tempfile::tempdir().unwrap();
        let katana = dir.path().join("katana_raw.txt");
        fs::write(&katana, b"https://example.com/a\nhttps://example.com/b\nhttps://example.com/\xff\xfe\n").unwrap();

        let merged = merge_raw_files(&[katana]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[..2], ["https://example.com/a", "https://example.com/b"]);
        assert_eq!(merged[2], "https://example.com/\u{FFFD}\u{FFFD}");
    }

    #[test]
    fn test_split_lines_strips_colours() {
        let text = "\x1b[92m[cve-2021-1234]\x1b[0m https://example.com\n\n  plain  \n";
        assert_eq!(split_lines(text), vec!["[cve-2021-1234] https://example.com", "plain"]);
    }

    #[test]
    fn test_read_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_lines(&dir.path().join("nope.txt")).unwrap().is_empty());
    }
}
