//! Core types for the command gate

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a gate, allowlist or validator decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    /// The command may run
    Allow,

    /// The command must not run; the reason is shown to the agent
    Block(String),
}

impl Verdict {
    /// Create a block verdict
    pub fn block(reason: impl Into<String>) -> Self {
        Self::Block(reason.into())
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_blocked(&self) -> bool {
        !self.is_allowed()
    }

    /// Block reason, empty for `Allow`
    pub fn reason(&self) -> &str {
        match self {
            Self::Allow => "",
            Self::Block(reason) => reason,
        }
    }

    /// `(allowed, reason)` pair for the direct-call surface
    pub fn into_parts(self) -> (bool, String) {
        match self {
            Self::Allow => (true, String::new()),
            Self::Block(reason) => (false, reason),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Block(reason) => write!(f, "block: {}", reason),
        }
    }
}

/// One shell execution unit reachable without crossing `&&`, `||` or a top-level `;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSegment {
    text: String,
}

impl CommandSegment {
    pub(crate) fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Original command text of this segment, trimmed
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for CommandSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Base name of a program in command position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvokedCommand(String);

impl InvokedCommand {
    /// Strip any leading path, so `/usr/bin/python3` becomes `python3`
    pub fn from_word(word: &str) -> Self {
        let base = word.rsplit('/').next().unwrap_or(word);
        if base.is_empty() {
            // "dir/" keeps its text so it cannot alias an allowed name
            Self(word.to_string())
        } else {
            Self(base.to_string())
        }
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvokedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for InvokedCommand {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for InvokedCommand {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
