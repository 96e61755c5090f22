//! `git commit` secret gate

use crate::gate::validators::{each_invocation, CommandValidator, ValidationContext};
use crate::gate::{InvokedCommand, SecretMatch, SecretScanner, Verdict};
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters of a matched secret revealed in the block reason
pub const DEFAULT_VISIBLE_PREFIX: usize = 12;

/// Global options that consume the following word
const GIT_OPTIONS_WITH_VALUE: &[&str] = &[
    "-C",
    "-c",
    "--git-dir",
    "--work-tree",
    "--namespace",
    "--super-prefix",
    "--config-env",
];

/// Runs the secret scanner over staged files before `git commit`
pub struct GitCommitValidator {
    scanner: Option<Arc<dyn SecretScanner>>,
    visible_prefix: usize,
}

impl GitCommitValidator {
    pub fn new(scanner: Option<Arc<dyn SecretScanner>>, visible_prefix: usize) -> Self {
        Self {
            scanner,
            visible_prefix,
        }
    }

    fn report(&self, scanner: &dyn SecretScanner, matches: &[SecretMatch]) -> String {
        let mut by_file: Vec<(&str, Vec<&SecretMatch>)> = Vec::new();
        for found in matches {
            match by_file.iter_mut().find(|(file, _)| *file == found.file_path) {
                Some((_, group)) => group.push(found),
                None => by_file.push((found.file_path.as_str(), vec![found])),
            }
        }

        let mut lines = vec![
            "SECRETS DETECTED - COMMIT BLOCKED".to_string(),
            String::new(),
            "The following potential secrets were found in staged files:".to_string(),
            String::new(),
        ];

        for (file, group) in by_file {
            lines.push(format!("File: {}", file));
            for found in group {
                lines.push(format!("  Line {}: {}", found.line_number, found.pattern_name));
                lines.push(format!(
                    "    Found: {}",
                    scanner.mask_secret(&found.matched_text, self.visible_prefix)
                ));
            }
            lines.push(String::new());
        }

        lines.extend(
            [
                "ACTION REQUIRED:",
                "",
                "1. Move secrets to environment variables:",
                "   - Add the secret value to .env (create if needed)",
                "   - Update the code to use os.environ.get('VAR_NAME') or process.env.VAR_NAME",
                "   - Add the variable name (not value) to .env.example",
                "",
                "2. Example fix:",
                "   BEFORE: api_key = 'sk-abc123...'",
                "   AFTER:  api_key = os.environ.get('API_KEY')",
                "",
                "3. If this is a FALSE POSITIVE (test data, example, mock):",
                "   - Add the file pattern to .secretsignore",
                "   - Example: echo 'tests/fixtures/' >> .secretsignore",
                "",
                "After fixing, stage the changes with 'git add .' and retry the commit.",
            ]
            .map(String::from),
        );

        lines.join("\n")
    }
}

impl CommandValidator for GitCommitValidator {
    fn name(&self) -> &str {
        "git-commit"
    }

    fn commands(&self) -> &[&'static str] {
        &["git"]
    }

    fn validate(&self, segment: &str, context: &ValidationContext) -> Verdict {
        each_invocation(segment, self.commands(), "git", |argv| {
            if InvokedCommand::from_word(&argv[0]) != "git" {
                return Verdict::Allow;
            }

            let mut repo_root = context.project_dir.clone();
            let mut subcommand = None;
            let mut args = argv[1..].iter();
            while let Some(arg) = args.next() {
                if GIT_OPTIONS_WITH_VALUE.contains(&arg.as_str()) {
                    let value = args.next();
                    if arg == "-C" {
                        if let Some(dir) = value {
                            repo_root = repo_root.join(dir);
                        }
                    }
                } else if !arg.starts_with('-') {
                    subcommand = Some(arg.as_str());
                    break;
                }
            }

            if subcommand != Some("commit") {
                return Verdict::Allow;
            }

            let scanner = match &self.scanner {
                Some(scanner) => scanner,
                None => return Verdict::Allow,
            };

            let staged = match scanner.staged_files(&repo_root) {
                Ok(staged) => staged,
                Err(e) => {
                    warn!(error = %e, "secret scanner unavailable, allowing commit");
                    return Verdict::Allow;
                }
            };
            if staged.is_empty() {
                return Verdict::Allow;
            }

            let matches = match scanner.scan(&staged, &repo_root) {
                Ok(matches) => matches,
                Err(e) => {
                    warn!(error = %e, "secret scan failed, allowing commit");
                    return Verdict::Allow;
                }
            };
            if matches.is_empty() {
                debug!(files = staged.len(), "no secrets in staged files");
                return Verdict::Allow;
            }

            Verdict::block(self.report(scanner.as_ref(), &matches))
        })
    }
}
