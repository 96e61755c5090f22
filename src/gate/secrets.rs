//! Secret scanning of staged files
//!
//! The gate consumes this through [`SecretScanner`] only on `git commit`.
//! A scanner that cannot run never blocks a commit.

use crate::gate::config::SecretsConfig;
use crate::gate::ScanError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use tracing::debug;

/// One suspected secret in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMatch {
    /// Path relative to the repository root
    pub file_path: String,
    /// 1-based line number
    pub line_number: usize,
    pub pattern_name: String,
    pub matched_text: String,
}

/// Finds secrets in the files a commit would record
pub trait SecretScanner: Send + Sync {
    /// Files staged for commit in `repo_root`
    fn staged_files(&self, repo_root: &Path) -> Result<Vec<PathBuf>, ScanError>;

    /// Scan `paths` (relative to `repo_root`)
    fn scan(&self, paths: &[PathBuf], repo_root: &Path) -> Result<Vec<SecretMatch>, ScanError>;

    /// Mask a secret for display
    fn mask_secret(&self, text: &str, visible: usize) -> String {
        mask_secret(text, visible)
    }
}

/// Reveal the first `visible` characters followed by `***`.
///
/// Text no longer than `visible` is masked completely.
pub fn mask_secret(text: &str, visible: usize) -> String {
    let len = text.chars().count();
    if len > visible {
        let prefix: String = text.chars().take(visible).collect();
        format!("{}***", prefix)
    } else {
        "*".repeat(len)
    }
}

static SECRET_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("AWS Access Key ID", r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b"),
        ("GitHub Token", r"\bgh[pousr]_[A-Za-z0-9]{36,}"),
        ("GitHub Fine-Grained Token", r"\bgithub_pat_[A-Za-z0-9_]{22,}"),
        ("Anthropic API Key", r"\bsk-ant-[A-Za-z0-9_\-]{20,}"),
        ("OpenAI API Key", r"\bsk-(?:proj-)?[A-Za-z0-9]{20,}"),
        ("Stripe Secret Key", r"\b[sr]k_live_[A-Za-z0-9]{20,}"),
        ("Google API Key", r"\bAIza[0-9A-Za-z_\-]{35}"),
        ("Slack Token", r"\bxox[baprs]-[A-Za-z0-9\-]{10,}"),
        (
            "Private Key",
            r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |PGP )?PRIVATE KEY(?: BLOCK)?-----",
        ),
        (
            "Generic API Key",
            r#"(?i)\b(?:api[_-]?key|apikey)\s*[:=]\s*["']?[A-Za-z0-9_\-]{16,}"#,
        ),
        (
            "Generic Secret",
            r#"(?i)\b(?:client_secret|secret_key|secret)\s*[:=]\s*["'][^"'\s]{8,}["']"#,
        ),
        (
            "Password Assignment",
            r#"(?i)\bpassword\s*[:=]\s*["'][^"'\s]{8,}["']"#,
        ),
        (
            "Database URL with Credentials",
            r"(?i)\b(?:postgres(?:ql)?|mysql|mongodb(?:\+srv)?|redis)://[^:\s/]+:[^@\s]+@",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| {
        (
            name,
            Regex::new(pattern).expect("secret pattern compilation failed"),
        )
    })
    .collect()
});

/// Ignore-file rules: `*.ext`, directory prefixes and exact paths
#[derive(Debug, Default)]
struct IgnoreRules {
    patterns: Vec<String>,
}

impl IgnoreRules {
    fn load(path: &Path) -> Self {
        let patterns = std::fs::read_to_string(path)
            .map(|content| {
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(|line| line.trim_start_matches("./").to_string())
                    .collect()
            })
            .unwrap_or_default();
        Self { patterns }
    }

    fn is_ignored(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            if let Some(ext) = pattern.strip_prefix('*') {
                path.ends_with(ext)
            } else {
                path == pattern || path.starts_with(pattern.as_str())
            }
        })
    }
}

/// NUL-separated paths from `git diff -z`, which never quotes or escapes them
fn parse_name_list(stdout: &[u8]) -> Vec<PathBuf> {
    stdout
        .split(|byte| *byte == 0)
        .filter(|name| !name.is_empty())
        .map(|name| PathBuf::from(String::from_utf8_lossy(name).into_owned()))
        .collect()
}

/// Line-oriented regex scanner over staged files
#[derive(Debug, Clone)]
pub struct RegexSecretScanner {
    ignore_file: String,
    max_file_bytes: u64,
}

impl RegexSecretScanner {
    pub fn new(ignore_file: impl Into<String>, max_file_bytes: u64) -> Self {
        Self {
            ignore_file: ignore_file.into(),
            max_file_bytes,
        }
    }

    pub fn from_config(config: &SecretsConfig) -> Self {
        Self::new(config.ignore_file.clone(), config.max_file_bytes)
    }

    /// Scan text already in memory
    pub fn scan_text(&self, file_path: &str, content: &str) -> Vec<SecretMatch> {
        let mut matches = Vec::new();
        for (index, line) in content.lines().enumerate() {
            for (name, regex) in SECRET_PATTERNS.iter() {
                if let Some(found) = regex.find(line) {
                    matches.push(SecretMatch {
                        file_path: file_path.to_string(),
                        line_number: index + 1,
                        pattern_name: name.to_string(),
                        matched_text: found.as_str().to_string(),
                    });
                }
            }
        }
        matches
    }
}

impl Default for RegexSecretScanner {
    fn default() -> Self {
        Self::from_config(&SecretsConfig::default())
    }
}

impl SecretScanner for RegexSecretScanner {
    fn staged_files(&self, repo_root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        let output = Command::new("git")
            .args(["diff", "--cached", "--name-only", "--diff-filter=ACM", "-z"])
            .current_dir(repo_root)
            .output()
            .map_err(|e| ScanError::Unavailable(format!("could not run git: {}", e)))?;

        if !output.status.success() {
            return Err(ScanError::Unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(parse_name_list(&output.stdout))
    }

    fn scan(&self, paths: &[PathBuf], repo_root: &Path) -> Result<Vec<SecretMatch>, ScanError> {
        let ignore = IgnoreRules::load(&repo_root.join(&self.ignore_file));
        let mut matches = Vec::new();

        for path in paths {
            let shown = path.to_string_lossy().replace('\\', "/");
            if ignore.is_ignored(&shown) {
                debug!(file = %shown, "skipping ignored file");
                continue;
            }

            let full_path = repo_root.join(path);
            let metadata = match std::fs::metadata(&full_path) {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            if metadata.len() > self.max_file_bytes {
                debug!(file = %shown, size = metadata.len(), "skipping large file");
                continue;
            }

            // binary and non-UTF-8 files are not scanned
            let content = match std::fs::read_to_string(&full_path) {
                Ok(content) => content,
                Err(_) => continue,
            };
            matches.extend(self.scan_text(&shown, &content));
        }

        Ok(matches)
    }
}
