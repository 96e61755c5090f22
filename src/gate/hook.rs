//! Pre-tool-use hook surface
//!
//! The agent sends one [`ToolInvocation`] per tool call and waits for a
//! [`HookResponse`]. Only `Bash` invocations are gated.

use crate::gate::{CommandGate, GateConfig, GateResult, Verdict};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

/// Tool name whose invocations carry shell commands
pub const BASH_TOOL: &str = "Bash";

/// Tool-specific input; only the shell command is read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInput {
    #[serde(default)]
    pub command: String,
}

/// A tool call awaiting approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,

    #[serde(default)]
    pub tool_input: ToolInput,

    /// Working directory of the agent, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
}

impl ToolInvocation {
    /// Create a `Bash` invocation
    pub fn bash(command: impl Into<String>) -> Self {
        Self {
            tool_name: BASH_TOOL.to_string(),
            tool_input: ToolInput {
                command: command.into(),
            },
            cwd: None,
            tool_use_id: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookDecision {
    Block,
}

/// Hook answer: `{}` allows, `{"decision":"block","reason":...}` blocks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<HookDecision>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HookResponse {
    pub fn allow() -> Self {
        Self::default()
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: Some(HookDecision::Block),
            reason: Some(reason.into()),
        }
    }

    pub fn is_block(&self) -> bool {
        self.decision == Some(HookDecision::Block)
    }
}

impl From<Verdict> for HookResponse {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Allow => Self::allow(),
            Verdict::Block(reason) => Self::block(reason),
        }
    }
}

/// Trait for asynchronous pre-tool-use hooks
#[async_trait]
pub trait PreToolUseHook: Send + Sync {
    /// Decide on one invocation
    async fn execute(&self, invocation: &ToolInvocation) -> HookResponse;

    /// Get the hook name
    fn name(&self) -> &str;

    /// Check if the hook applies to the invocation
    fn should_run(&self, _invocation: &ToolInvocation) -> bool {
        true
    }
}

/// Gates `Bash` invocations through a [`CommandGate`].
///
/// The gate is synchronous, so it runs on the blocking pool under a time
/// budget. Exceeding the budget or a panicking evaluation blocks.
pub struct BashSecurityHook {
    gate: Arc<CommandGate>,
    budget: Duration,
}

impl BashSecurityHook {
    pub fn new(gate: Arc<CommandGate>, budget: Duration) -> Self {
        Self { gate, budget }
    }
}

#[async_trait]
impl PreToolUseHook for BashSecurityHook {
    async fn execute(&self, invocation: &ToolInvocation) -> HookResponse {
        if !self.should_run(invocation) {
            return HookResponse::allow();
        }

        let command = invocation.tool_input.command.clone();
        if command.trim().is_empty() {
            return HookResponse::allow();
        }

        let cwd = invocation
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        debug!(
            tool_use_id = invocation.tool_use_id.as_deref().unwrap_or("-"),
            cwd = %cwd.display(),
            "evaluating bash command"
        );

        let gate = self.gate.clone();
        let evaluation = tokio::task::spawn_blocking(move || gate.evaluate(&command, &cwd));

        match timeout(self.budget, evaluation).await {
            Ok(Ok(verdict)) => verdict.into(),
            Ok(Err(e)) => {
                error!(error = %e, "security evaluation failed");
                HookResponse::block(format!("Security validation failed: {}", e))
            }
            Err(_) => {
                error!(budget_ms = self.budget.as_millis() as u64, "security evaluation timed out");
                HookResponse::block(format!(
                    "Security validation timed out after {}ms",
                    self.budget.as_millis()
                ))
            }
        }
    }

    fn name(&self) -> &str {
        "bash-security"
    }

    fn should_run(&self, invocation: &ToolInvocation) -> bool {
        invocation.tool_name == BASH_TOOL
    }
}

/// Answer one raw hook request.
///
/// Blocks when the configuration could not be loaded or the input is not a
/// tool invocation, so a broken setup never lets a command through.
pub async fn answer(config: GateResult<GateConfig>, input: &str) -> HookResponse {
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "security configuration could not be loaded");
            return HookResponse::block(format!(
                "Security configuration could not be loaded: {}",
                e
            ));
        }
    };

    let invocation = match serde_json::from_str::<ToolInvocation>(input) {
        Ok(invocation) => invocation,
        Err(e) => {
            error!(error = %e, "invalid hook input");
            return HookResponse::block(format!("Invalid hook input: {}", e));
        }
    };
    debug!(tool = %invocation.tool_name, "hook invocation");

    let gate = Arc::new(CommandGate::from_config(&config));
    let hook = BashSecurityHook::new(gate, Duration::from_millis(config.gate.hook_timeout_ms));
    hook.execute(&invocation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::validators::ValidatorRegistry;
    use crate::gate::{GateError, ProfileBuilder, ProfileError, SecurityProfile};
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    struct BaseBuilder;

    impl ProfileBuilder for BaseBuilder {
        fn build(
            &self,
            project_dir: &Path,
            _spec_dir: Option<&Path>,
        ) -> Result<SecurityProfile, ProfileError> {
            Ok(SecurityProfile::base_only(project_dir))
        }
    }

    struct SlowBuilder;

    impl ProfileBuilder for SlowBuilder {
        fn build(
            &self,
            project_dir: &Path,
            _spec_dir: Option<&Path>,
        ) -> Result<SecurityProfile, ProfileError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(SecurityProfile::base_only(project_dir))
        }
    }

    fn hook(builder: Arc<dyn ProfileBuilder>, budget: Duration) -> BashSecurityHook {
        let gate = CommandGate::new(builder, ValidatorRegistry::with_defaults(None));
        BashSecurityHook::new(Arc::new(gate), budget)
    }

    #[test]
    fn test_response_serialization() {
        assert_eq!(serde_json::to_value(HookResponse::allow()).unwrap(), json!({}));
        assert_eq!(
            serde_json::to_value(HookResponse::block("nope")).unwrap(),
            json!({"decision": "block", "reason": "nope"})
        );
    }

    #[test]
    fn test_invocation_deserialization() {
        let invocation: ToolInvocation = serde_json::from_value(json!({
            "tool_name": "Bash",
            "tool_input": {"command": "ls", "description": "list files"},
            "tool_use_id": "toolu_01"
        }))
        .unwrap();
        assert_eq!(invocation.tool_input.command, "ls");
        assert_eq!(invocation.cwd, None);

        let other: ToolInvocation =
            serde_json::from_value(json!({"tool_name": "Read", "tool_input": {"file_path": "x"}}))
                .unwrap();
        assert_eq!(other.tool_input.command, "");
    }

    #[tokio::test]
    async fn test_non_bash_and_empty_allow() {
        let project = TempDir::new().unwrap();
        let hook = hook(Arc::new(BaseBuilder), Duration::from_secs(5));

        let mut read = ToolInvocation::bash("rm -rf /");
        read.tool_name = "Read".to_string();
        assert_eq!(hook.execute(&read).await, HookResponse::allow());

        let empty = ToolInvocation::bash("").with_cwd(project.path());
        assert_eq!(hook.execute(&empty).await, HookResponse::allow());
    }

    #[tokio::test]
    async fn test_bash_verdicts() {
        let project = TempDir::new().unwrap();
        let hook = hook(Arc::new(BaseBuilder), Duration::from_secs(5));

        let allowed = ToolInvocation::bash("ls -la && git status").with_cwd(project.path());
        assert_eq!(hook.execute(&allowed).await, HookResponse::allow());

        let blocked = ToolInvocation::bash("rm -rf /").with_cwd(project.path());
        let response = hook.execute(&blocked).await;
        assert!(response.is_block());
        assert_eq!(
            response.reason.as_deref(),
            Some("rm target '/' is not allowed for safety")
        );
    }

    #[tokio::test]
    async fn test_timeout_blocks() {
        let project = TempDir::new().unwrap();
        let hook = hook(Arc::new(SlowBuilder), Duration::from_millis(20));

        let response = hook
            .execute(&ToolInvocation::bash("ls").with_cwd(project.path()))
            .await;
        assert!(response.is_block());
        assert!(response.reason.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_answer_blocks_on_config_error() {
        let input = json!({"tool_name": "Bash", "tool_input": {"command": "ls"}}).to_string();
        let loaded = Err(GateError::invalid_config("hook_timeout_ms must be > 0"));
        let response = answer(loaded, &input).await;
        assert_eq!(
            response,
            HookResponse::block(
                "Security configuration could not be loaded: Invalid configuration: hook_timeout_ms must be > 0"
            )
        );
    }

    #[tokio::test]
    async fn test_answer_input_handling() {
        let project = TempDir::new().unwrap();

        let response = answer(Ok(GateConfig::default()), "not json").await;
        assert!(response.is_block());
        assert!(response.reason.unwrap().starts_with("Invalid hook input: "));

        let input = json!({
            "tool_name": "Bash",
            "tool_input": {"command": "rm -rf /"},
            "cwd": project.path(),
        })
        .to_string();
        let response = answer(Ok(GateConfig::default()), &input).await;
        assert_eq!(
            response.reason.as_deref(),
            Some("rm target '/' is not allowed for safety")
        );
    }
}
