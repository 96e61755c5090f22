//! Command gate
//!
//! Decides whether a shell command issued by a coding agent may run. A
//! command string is split into segments, every invoked program is checked
//! against the project's security profile, and high-risk programs get a
//! command-specific inspection of their arguments.

pub mod allowlist;
pub mod analyzer;
pub mod config;
pub mod engine;
pub mod errors;
pub mod hook;
pub mod parser;
pub mod profile;
pub mod secrets;
pub mod types;
pub mod validators;

// Re-export commonly used types
pub use self::analyzer::ProjectAnalyzer;
pub use self::config::{AllowlistConfig, EngineConfig, GateConfig, LoggingConfig, SecretsConfig};
pub use self::engine::CommandGate;
pub use self::errors::{GateError, GateResult, ParseError, ProfileError, ScanError};
pub use self::hook::{BashSecurityHook, HookResponse, PreToolUseHook, ToolInput, ToolInvocation};
pub use self::parser::{extract_commands, split_segments, split_words, try_extract_commands};
pub use self::profile::{ProfileBuilder, ProfileCache, SecurityProfile, BASE_COMMANDS};
pub use self::secrets::{mask_secret, RegexSecretScanner, SecretMatch, SecretScanner};
pub use self::types::{CommandSegment, InvokedCommand, Verdict};
pub use self::validators::{CommandValidator, ValidationContext, ValidatorRegistry};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        BashSecurityHook, CommandGate, CommandValidator, GateConfig, GateError, GateResult,
        PreToolUseHook, ProfileBuilder, ProjectAnalyzer, SecurityProfile, ToolInvocation,
        ValidationContext, ValidatorRegistry, Verdict,
    };
}
