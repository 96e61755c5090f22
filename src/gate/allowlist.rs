//! Allowlist decision engine
//!
//! A pure lookup against a profile's union view. No I/O happens here, so it
//! runs inline for every invoked command.

use crate::gate::{SecurityProfile, Verdict};

/// Default number of permitted names shown in a block reason
pub const DEFAULT_PREVIEW_LIMIT: usize = 20;

/// Decide whether `command` may run under `profile`.
///
/// A block reason names the command and previews up to `preview_limit`
/// permitted names in sorted order.
pub fn is_allowed(command: &str, profile: &SecurityProfile, preview_limit: usize) -> Verdict {
    if profile.permits(command) {
        return Verdict::Allow;
    }

    let allowed = profile.all_allowed_commands();
    let preview: Vec<&str> = allowed.iter().copied().take(preview_limit).collect();
    let remaining = allowed.len().saturating_sub(preview.len());

    let mut reason = format!(
        "Command '{}' is not in the allowed commands for this project. Allowed: {}",
        command,
        preview.join(", ")
    );
    if remaining > 0 {
        reason.push_str(&format!(" ... ({} more)", remaining));
    }

    Verdict::block(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_is_allowed() {
        let profile = SecurityProfile::base_only("/p").with_stack(["cargo"]);
        assert_eq!(is_allowed("cargo", &profile, 5), Verdict::Allow);
        assert_eq!(is_allowed("ls", &profile, 5), Verdict::Allow);
    }

    #[test]
    fn test_block_reason_names_command_and_previews() {
        let profile = SecurityProfile::base_only("/p");
        let total = profile.all_allowed_commands().len();

        let verdict = is_allowed("docker", &profile, 3);
        let reason = verdict.reason();
        assert!(reason.starts_with("Command 'docker' is not in the allowed commands"));
        assert!(reason.ends_with(&format!("({} more)", total - 3)));
    }

    #[test]
    fn test_small_profile_lists_everything() {
        let mut profile = SecurityProfile::base_only("/p");
        profile.base_commands.clear();
        let profile = profile.with_custom(["make", "ls"]);

        let verdict = is_allowed("rm", &profile, 20);
        assert_eq!(
            verdict.reason(),
            "Command 'rm' is not in the allowed commands for this project. Allowed: ls, make"
        );
    }
}
