//! Process signalling validators: `pkill`, `killall` and `kill`

use crate::gate::validators::{each_invocation, CommandValidator, ValidationContext};
use crate::gate::Verdict;
use std::collections::BTreeSet;

/// Development tool processes that may be killed by name
pub const DEV_PROCESS_NAMES: &[&str] = &[
    // Node.js ecosystem
    "node", "npm", "npx", "yarn", "pnpm", "bun", "deno", "vite", "next", "nuxt", "webpack",
    "esbuild", "rollup", "tsx", "ts-node",
    // Python ecosystem
    "python", "python3", "flask", "uvicorn", "gunicorn", "django", "celery", "streamlit",
    "gradio", "pytest", "mypy", "ruff",
    // other runtimes
    "cargo", "rustc", "go", "ruby", "rails", "php",
    // local databases
    "postgres", "mysql", "mongod", "redis-server",
];

/// Names shown in the block reason before the ellipsis
const REASON_PREVIEW: usize = 10;

/// `pkill`/`killall`: only dev-tool process names
pub struct ProcessNameValidator {
    allowed: BTreeSet<&'static str>,
}

impl ProcessNameValidator {
    pub fn new() -> Self {
        Self {
            allowed: DEV_PROCESS_NAMES.iter().copied().collect(),
        }
    }
}

impl Default for ProcessNameValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandValidator for ProcessNameValidator {
    fn name(&self) -> &str {
        "pkill"
    }

    fn commands(&self) -> &[&'static str] {
        &["pkill", "killall"]
    }

    fn validate(&self, segment: &str, _context: &ValidationContext) -> Verdict {
        each_invocation(segment, self.commands(), "pkill", |argv| {
            let target = match argv.iter().skip(1).filter(|a| !a.starts_with('-')).last() {
                Some(target) => target,
                None => return Verdict::block("pkill requires a process name"),
            };

            // a `-f` pattern is a full command line; its first word is the program
            let target = target.split_whitespace().next().unwrap_or(target);

            if self.allowed.contains(target) {
                return Verdict::Allow;
            }

            let preview: Vec<&str> = self.allowed.iter().copied().take(REASON_PREVIEW).collect();
            Verdict::block(format!(
                "pkill only allowed for dev processes: {}...",
                preview.join(", ")
            ))
        })
    }
}

/// `kill`: PIDs are fine, process-group wildcards are not
pub struct KillValidator;

impl CommandValidator for KillValidator {
    fn name(&self) -> &str {
        "kill"
    }

    fn commands(&self) -> &[&'static str] {
        &["kill"]
    }

    fn validate(&self, segment: &str, _context: &ValidationContext) -> Verdict {
        each_invocation(segment, self.commands(), "kill", |argv| {
            if argv
                .iter()
                .skip(1)
                .any(|arg| matches!(arg.as_str(), "-1" | "0" | "-0"))
            {
                return Verdict::block("kill -1 and kill 0 are not allowed (affects all processes)");
            }

            Verdict::Allow
        })
    }
}
