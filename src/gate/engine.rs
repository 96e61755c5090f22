//! Gate orchestrator
//!
//! Sequences profile resolution, command extraction, allowlisting and deep
//! validation into one verdict per command string. The first block wins.

use crate::gate::allowlist::{self, DEFAULT_PREVIEW_LIMIT};
use crate::gate::parser::{split_segments, try_extract_commands};
use crate::gate::profile::canonical_project_dir;
use crate::gate::validators::{ValidationContext, ValidatorRegistry};
use crate::gate::{
    extract_commands, CommandSegment, GateConfig, InvokedCommand, ProfileBuilder, ProfileCache,
    ProfileError, ProjectAnalyzer, RegexSecretScanner, SecretScanner, SecurityProfile, Verdict,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pre-execution gate for shell commands
pub struct CommandGate {
    cache: ProfileCache,
    validators: ValidatorRegistry,
    preview_limit: usize,
}

impl CommandGate {
    /// Create a gate from a profile builder and a validator registry
    pub fn new(builder: Arc<dyn ProfileBuilder>, validators: ValidatorRegistry) -> Self {
        Self {
            cache: ProfileCache::new(builder),
            validators,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }

    /// Create a gate with the project analyzer, the built-in validators and
    /// the regex secret scanner, as configured
    pub fn from_config(config: &GateConfig) -> Self {
        let analyzer = ProjectAnalyzer::new()
            .with_custom_commands(config.allowlist.custom_commands.iter().cloned());
        let scanner: Option<Arc<dyn SecretScanner>> = if config.secrets.enabled {
            Some(Arc::new(RegexSecretScanner::from_config(&config.secrets)))
        } else {
            None
        };

        Self::new(
            Arc::new(analyzer),
            ValidatorRegistry::with_defaults_and_prefix(scanner, config.secrets.visible_prefix),
        )
        .with_preview_limit(config.gate.preview_limit)
    }

    /// Set how many permitted names a "not allowed" reason previews
    pub fn with_preview_limit(mut self, preview_limit: usize) -> Self {
        self.preview_limit = preview_limit;
        self
    }

    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }

    pub fn validators_mut(&mut self) -> &mut ValidatorRegistry {
        &mut self.validators
    }

    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    /// Forget the cached profile so the next call re-analyzes the project
    pub fn reset(&self) {
        self.cache.reset();
    }

    /// Profile for `project_dir`, or the base-only profile if it cannot be built
    pub fn profile_for(&self, project_dir: &Path, spec_dir: Option<&Path>) -> Arc<SecurityProfile> {
        match self.cache.resolve(project_dir, spec_dir) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(
                    project_dir = %project_dir.display(),
                    error = %e,
                    "could not load security profile, falling back to base commands"
                );
                Arc::new(SecurityProfile::base_only(canonical_project_dir(project_dir)))
            }
        }
    }

    /// Sorted permitted commands for a project.
    ///
    /// Unlike [`evaluate`](Self::evaluate) this reports a failing builder.
    pub fn allowed_commands(&self, project_dir: &Path) -> Result<Vec<String>, ProfileError> {
        let profile = self.cache.resolve(project_dir, None)?;
        Ok(profile
            .all_allowed_commands()
            .into_iter()
            .map(String::from)
            .collect())
    }

    /// Decide whether `command` may run in `project_dir`
    pub fn evaluate(&self, command: &str, project_dir: &Path) -> Verdict {
        self.evaluate_with_spec(command, project_dir, None)
    }

    /// Like [`evaluate`](Self::evaluate), passing a spec directory to the builder
    pub fn evaluate_with_spec(
        &self,
        command: &str,
        project_dir: &Path,
        spec_dir: Option<&Path>,
    ) -> Verdict {
        let profile = self.profile_for(project_dir, spec_dir);

        let commands = match try_extract_commands(command) {
            Ok(commands) if !commands.is_empty() => commands,
            result => {
                if let Err(e) = result {
                    debug!(command, error = %e, "tokenization failed");
                }
                let verdict = Verdict::block(format!(
                    "Could not parse command for security validation: {}",
                    command
                ));
                info!(command, reason = verdict.reason(), "command blocked");
                return verdict;
            }
        };

        let segments = split_segments(command);
        let located = locate_segments(&commands, &segments);
        let context = ValidationContext::new(canonical_project_dir(project_dir));

        for (invoked, segment) in commands.iter().zip(located) {
            let verdict = allowlist::is_allowed(invoked.name(), &profile, self.preview_limit);
            if verdict.is_blocked() {
                info!(command, reason = verdict.reason(), "command blocked");
                return verdict;
            }

            if let Some(validator) = self.validators.get(invoked.name()) {
                let segment = segment.map(CommandSegment::as_str).unwrap_or(command);
                debug!(validator = validator.name(), segment, "running deep validator");

                let verdict = validator.validate(segment, &context);
                if verdict.is_blocked() {
                    info!(
                        command,
                        validator = validator.name(),
                        reason = verdict.reason(),
                        "command blocked"
                    );
                    return verdict;
                }
            }
        }

        info!(command, "command allowed");
        Verdict::Allow
    }

    /// Direct-call variant returning `(allowed, reason)`.
    ///
    /// Without a project directory the current directory is used.
    pub fn validate_command(&self, command: &str, project_dir: Option<&Path>) -> (bool, String) {
        let verdict = match project_dir {
            Some(dir) => self.evaluate(command, dir),
            None => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| ".".into());
                self.evaluate(command, &cwd)
            }
        };
        verdict.into_parts()
    }
}

/// Pair every invoked command with the segment that runs it.
///
/// Normally each segment's own commands concatenate to the full list, which
/// maps repeated names to their own segment. Otherwise each command falls
/// back to the first segment that mentions it.
fn locate_segments<'a>(
    commands: &[InvokedCommand],
    segments: &'a [CommandSegment],
) -> Vec<Option<&'a CommandSegment>> {
    let per_segment: Vec<(Vec<InvokedCommand>, &CommandSegment)> = segments
        .iter()
        .map(|segment| (extract_commands(segment.as_str()), segment))
        .collect();

    let flattened: Vec<(&InvokedCommand, &CommandSegment)> = per_segment
        .iter()
        .flat_map(|(invoked, segment)| invoked.iter().map(move |c| (c, *segment)))
        .collect();

    if flattened.len() == commands.len()
        && flattened.iter().zip(commands).all(|((a, _), b)| *a == b)
    {
        return flattened.into_iter().map(|(_, segment)| Some(segment)).collect();
    }

    commands
        .iter()
        .map(|command| {
            per_segment
                .iter()
                .find(|(invoked, _)| invoked.contains(command))
                .map(|(_, segment)| *segment)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::validators::CommandValidator;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    struct FixedBuilder(Vec<&'static str>);

    impl ProfileBuilder for FixedBuilder {
        fn build(
            &self,
            project_dir: &Path,
            _spec_dir: Option<&Path>,
        ) -> Result<SecurityProfile, ProfileError> {
            Ok(SecurityProfile::base_only(project_dir).with_stack(self.0.iter().copied()))
        }
    }

    struct FailingBuilder;

    impl ProfileBuilder for FailingBuilder {
        fn build(
            &self,
            _project_dir: &Path,
            _spec_dir: Option<&Path>,
        ) -> Result<SecurityProfile, ProfileError> {
            Err(ProfileError::analyzer("analyzer crashed"))
        }
    }

    fn gate(stack: Vec<&'static str>) -> CommandGate {
        CommandGate::new(
            Arc::new(FixedBuilder(stack)),
            ValidatorRegistry::with_defaults(None),
        )
    }

    #[test]
    fn test_allow_and_block_by_name() {
        let project = TempDir::new().unwrap();
        let gate = gate(vec!["cargo"]);

        assert_eq!(gate.evaluate("cargo test && ls -la", project.path()), Verdict::Allow);
        let verdict = gate.evaluate("ls | docker ps", project.path());
        assert!(verdict.reason().starts_with("Command 'docker' is not in the allowed commands"));
    }

    #[test]
    fn test_unparseable_blocks() {
        let project = TempDir::new().unwrap();
        let gate = gate(vec![]);

        assert_eq!(
            gate.evaluate("echo 'oops", project.path()),
            Verdict::block("Could not parse command for security validation: echo 'oops")
        );
        assert!(gate.evaluate("", project.path()).is_blocked());
        assert!(gate.evaluate("FOO=bar", project.path()).is_blocked());
    }

    #[test]
    fn test_chained_short_circuit() {
        let project = TempDir::new().unwrap();
        let gate = gate(vec![]);

        assert_eq!(
            gate.evaluate("ls && rm /", project.path()),
            Verdict::block("rm target '/' is not allowed for safety")
        );
        // the disallowed name comes first and wins
        let verdict = gate.evaluate("docker ps; rm -rf /", project.path());
        assert!(verdict.reason().contains("'docker'"));
    }

    #[test]
    fn test_repeated_command_validates_own_segment() {
        let project = TempDir::new().unwrap();
        let gate = gate(vec![]);

        assert!(gate.evaluate("rm a.txt; rm -rf /", project.path()).is_blocked());
        assert!(gate.evaluate("rm a.txt; rm b.txt", project.path()).is_allowed());
    }

    #[test]
    fn test_substitution_is_validated() {
        let project = TempDir::new().unwrap();
        let gate = gate(vec![]);

        assert!(gate.evaluate("echo $(rm -rf /)", project.path()).is_blocked());
        assert!(gate.evaluate("echo `docker ps`", project.path()).is_blocked());
    }

    #[test]
    fn test_repeated_command_within_segment() {
        let project = TempDir::new().unwrap();
        let gate = gate(vec![]);
        let dir = project.path();

        assert!(gate.evaluate("rm a.txt | rm -rf /", dir).is_blocked());
        assert!(gate.evaluate("rm a.txt & rm -rf /", dir).is_blocked());
        assert!(gate.evaluate("echo $(rm x) $(rm -rf /)", dir).is_blocked());
        assert!(gate.evaluate("chmod +x a | chmod 777 b", dir).is_blocked());
        assert!(gate.evaluate("kill 123 & kill -9 -1", dir).is_blocked());
    }

    #[test]
    fn test_wrapped_programs_are_checked() {
        let project = TempDir::new().unwrap();
        let gate = gate(vec![]);
        let dir = project.path();

        assert!(gate.evaluate("timeout 5 rm -rf /", dir).is_blocked());
        assert!(gate.evaluate("time rm -rf /", dir).is_blocked());
        assert!(gate.evaluate("xargs rm -rf / < /dev/null", dir).is_blocked());
        assert!(gate
            .evaluate("env docker ps", dir)
            .reason()
            .contains("'docker'"));
        assert!(gate.evaluate("./x=y/docker ps", dir).is_blocked());
        assert!(gate.evaluate("timeout 30 ls -la", dir).is_allowed());
    }

    #[test]
    fn test_heredoc_commit_message_allowed() {
        let project = TempDir::new().unwrap();
        let gate = gate(vec![]);
        let dir = project.path();

        let command = "git commit -m \"$(cat <<'EOF'\nFix the parser\n\nIt's done.\nEOF\n)\"";
        assert!(gate.evaluate(command, dir).is_allowed());
        assert!(gate.evaluate("cat <<EOF > notes.txt\nit's done\nEOF", dir).is_allowed());
        assert!(gate
            .evaluate("cat <<EOF\n$(rm -rf /)\nEOF", dir)
            .is_blocked());
    }

    #[test]
    fn test_validate_command_parts() {
        let project = TempDir::new().unwrap();
        let gate = gate(vec![]);

        assert_eq!(
            gate.validate_command("kill 1234", Some(project.path())),
            (true, String::new())
        );
        let (allowed, reason) = gate.validate_command("kill -9 -1", Some(project.path()));
        assert!(!allowed);
        assert!(reason.contains("kill -1"));
    }

    #[test]
    #[traced_test]
    fn test_builder_failure_falls_back_to_base() {
        let project = TempDir::new().unwrap();
        let gate = CommandGate::new(Arc::new(FailingBuilder), ValidatorRegistry::with_defaults(None));

        assert!(gate.evaluate("ls -la", project.path()).is_allowed());
        assert!(gate.evaluate("cargo build", project.path()).is_blocked());
        assert!(logs_contain("falling back to base commands"));
        assert!(gate.allowed_commands(project.path()).is_err());
    }

    #[test]
    fn test_validator_receives_project_context() {
        struct RecordingValidator(std::sync::Mutex<Vec<PathBuf>>);

        impl CommandValidator for RecordingValidator {
            fn name(&self) -> &str {
                "recording"
            }

            fn commands(&self) -> &[&'static str] {
                &["make"]
            }

            fn validate(&self, _segment: &str, context: &ValidationContext) -> Verdict {
                self.0.lock().unwrap().push(context.project_dir.clone());
                Verdict::Allow
            }
        }

        let project = TempDir::new().unwrap();
        let recorder = Arc::new(RecordingValidator(Default::default()));
        let mut gate = gate(vec!["make"]);
        gate.validators_mut().register(recorder.clone()).unwrap();

        assert!(gate.evaluate("make all", project.path()).is_allowed());
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[canonical_project_dir(project.path())]
        );
    }
}
