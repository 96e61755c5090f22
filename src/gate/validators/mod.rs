//! Deep validators for high-risk commands
//!
//! A validator runs only after the allowlist has accepted the command name.
//! It receives the text of the segment that invoked the command and decides
//! from the arguments. Every validator blocks when the segment cannot be
//! tokenized.

pub mod database;
pub mod filesystem;
pub mod git;
pub mod process;

pub use database::{
    DropObjectValidator, MongoShellValidator, MysqladminValidator, RedisCliValidator,
    SqlClientValidator,
};
pub use filesystem::{ChmodValidator, InitScriptValidator, RmValidator};
pub use git::GitCommitValidator;
pub use process::{KillValidator, ProcessNameValidator};

use crate::gate::parser::command_argvs;
use crate::gate::{GateError, GateResult, SecretScanner, Verdict};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Ambient information available to validators
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Resolved project directory, also the repository root for `git commit`
    pub project_dir: PathBuf,
}

impl ValidationContext {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }
}

/// Command-specific inspection applied after allowlisting
pub trait CommandValidator: Send + Sync {
    /// Validator name, for logs
    fn name(&self) -> &str;

    /// Command names this validator handles
    fn commands(&self) -> &[&'static str];

    /// Inspect one segment
    fn validate(&self, segment: &str, context: &ValidationContext) -> Verdict;
}

/// Run `check` on every invocation of the validator's commands inside
/// `segment`, stopping at the first block.
///
/// `label` names the command in the parse-failure and empty reasons.
pub(crate) fn each_invocation<F>(
    segment: &str,
    names: &[&str],
    label: &str,
    mut check: F,
) -> Verdict
where
    F: FnMut(&[String]) -> Verdict,
{
    let invocations = match command_argvs(segment, names) {
        Ok(invocations) => invocations,
        Err(_) => return Verdict::block(format!("Could not parse {} command", label)),
    };
    if invocations.is_empty() {
        return Verdict::block(format!("Empty {} command", label));
    }

    invocations
        .iter()
        .map(|argv| check(argv.as_slice()))
        .find(Verdict::is_blocked)
        .unwrap_or(Verdict::Allow)
}

/// Maps command names to validators
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn CommandValidator>>,
}

impl ValidatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in validator.
    ///
    /// Without a scanner, `git commit` is always allowed.
    pub fn with_defaults(scanner: Option<Arc<dyn SecretScanner>>) -> Self {
        Self::with_defaults_and_prefix(scanner, git::DEFAULT_VISIBLE_PREFIX)
    }

    /// Like [`with_defaults`](Self::with_defaults) with a custom secret mask length
    pub fn with_defaults_and_prefix(
        scanner: Option<Arc<dyn SecretScanner>>,
        visible_prefix: usize,
    ) -> Self {
        let defaults: Vec<Arc<dyn CommandValidator>> = vec![
            Arc::new(ProcessNameValidator::new()),
            Arc::new(KillValidator),
            Arc::new(ChmodValidator),
            Arc::new(RmValidator),
            Arc::new(InitScriptValidator),
            Arc::new(GitCommitValidator::new(scanner, visible_prefix)),
            Arc::new(DropObjectValidator::dropdb()),
            Arc::new(DropObjectValidator::dropuser()),
            Arc::new(SqlClientValidator::psql()),
            Arc::new(SqlClientValidator::mysql()),
            Arc::new(RedisCliValidator),
            Arc::new(MongoShellValidator),
            Arc::new(MysqladminValidator),
        ];

        let mut registry = Self::new();
        for validator in defaults {
            for command in validator.commands() {
                registry
                    .validators
                    .insert(command.to_string(), Arc::clone(&validator));
            }
        }
        registry
    }

    /// Register a validator for all of its commands.
    ///
    /// Fails without changing the registry if any command already has one.
    pub fn register(&mut self, validator: Arc<dyn CommandValidator>) -> GateResult<()> {
        if let Some(taken) = validator
            .commands()
            .iter()
            .find(|command| self.validators.contains_key(**command))
        {
            return Err(GateError::RegistrationFailed(format!(
                "Validator for '{}' already registered",
                taken
            )));
        }

        for command in validator.commands() {
            self.validators
                .insert(command.to_string(), Arc::clone(&validator));
        }
        Ok(())
    }

    /// Register a validator, replacing any existing one for its commands
    pub fn replace(&mut self, validator: Arc<dyn CommandValidator>) {
        for command in validator.commands() {
            self.validators
                .insert(command.to_string(), Arc::clone(&validator));
        }
    }

    /// Validator for a command name
    pub fn get(&self, command: &str) -> Option<Arc<dyn CommandValidator>> {
        self.validators.get(command).cloned()
    }

    /// Sorted command names that have a validator
    pub fn commands(&self) -> Vec<&str> {
        let mut commands: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        commands.sort_unstable();
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyAll;

    impl CommandValidator for DenyAll {
        fn name(&self) -> &str {
            "deny-all"
        }

        fn commands(&self) -> &[&'static str] {
            &["terraform"]
        }

        fn validate(&self, segment: &str, _context: &ValidationContext) -> Verdict {
            Verdict::block(format!("terraform is never allowed: {}", segment))
        }
    }

    struct RmOverride;

    impl CommandValidator for RmOverride {
        fn name(&self) -> &str {
            "rm-override"
        }

        fn commands(&self) -> &[&'static str] {
            &["rm"]
        }

        fn validate(&self, _segment: &str, _context: &ValidationContext) -> Verdict {
            Verdict::Allow
        }
    }

    #[test]
    fn test_defaults_cover_high_risk_commands() {
        let registry = ValidatorRegistry::with_defaults(None);
        assert_eq!(
            registry.commands(),
            vec![
                "chmod", "dropdb", "dropuser", "git", "init.sh", "kill", "killall", "mariadb",
                "mongo", "mongosh", "mysql", "mysqladmin", "pkill", "psql", "redis-cli", "rm",
            ]
        );
        assert!(registry.get("ls").is_none());
    }

    #[test]
    fn test_register_and_duplicate() {
        let mut registry = ValidatorRegistry::with_defaults(None);
        registry.register(Arc::new(DenyAll)).unwrap();

        let ctx = ValidationContext::new("/tmp");
        let verdict = registry.get("terraform").unwrap().validate("terraform apply", &ctx);
        assert!(verdict.is_blocked());

        let err = registry.register(Arc::new(RmOverride)).unwrap_err();
        assert!(matches!(err, GateError::RegistrationFailed(_)));
        assert_eq!(registry.get("rm").unwrap().name(), "rm");
    }

    #[test]
    fn test_replace() {
        let mut registry = ValidatorRegistry::with_defaults(None);
        registry.replace(Arc::new(RmOverride));

        let ctx = ValidationContext::new("/tmp");
        let validator = registry.get("rm").unwrap();
        assert_eq!(validator.name(), "rm-override");
        assert!(validator.validate("rm -rf /", &ctx).is_allowed());
    }

    #[test]
    fn test_invocation_errors() {
        let allow = |_: &[String]| Verdict::Allow;
        assert_eq!(
            each_invocation("rm 'oops", &["rm"], "rm", allow),
            Verdict::block("Could not parse rm command")
        );
        assert_eq!(
            each_invocation("", &["rm"], "rm", allow),
            Verdict::block("Empty rm command")
        );
    }

    #[test]
    fn test_each_invocation_checks_all() {
        let mut seen = Vec::new();
        let verdict = each_invocation("rm a | rm b & rm c", &["rm"], "rm", |argv| {
            seen.push(argv[1].clone());
            Verdict::Allow
        });
        assert_eq!(verdict, Verdict::Allow);
        assert_eq!(seen, vec!["a", "b", "c"]);

        let verdict = each_invocation("rm a | rm b & rm c", &["rm"], "rm", |argv| {
            if argv[1] == "b" {
                Verdict::block("b")
            } else {
                Verdict::Allow
            }
        });
        assert_eq!(verdict, Verdict::block("b"));
    }
}
