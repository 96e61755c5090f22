//! Filesystem validators: `chmod`, `rm` and the project `init.sh`

use crate::gate::validators::{each_invocation, CommandValidator, ValidationContext};
use crate::gate::{InvokedCommand, Verdict};

/// Modes `chmod` may apply besides the `[ugoa]*+x` family
pub const SAFE_CHMOD_MODES: &[&str] = &[
    "+x", "a+x", "u+x", "g+x", "o+x", "ug+x", "755", "644", "700", "600", "775", "664",
];

/// Top-level directories `rm` may never target
const PROTECTED_DIRS: &[&str] = &["/home", "/usr", "/etc", "/var", "/bin", "/lib", "/opt"];

fn is_exec_grant(mode: &str) -> bool {
    mode.strip_suffix("+x")
        .map(|who| who.chars().all(|c| matches!(c, 'u' | 'g' | 'o' | 'a')))
        .unwrap_or(false)
}

/// `chmod`: executable bits and a few common numeric modes only
pub struct ChmodValidator;

impl CommandValidator for ChmodValidator {
    fn name(&self) -> &str {
        "chmod"
    }

    fn commands(&self) -> &[&'static str] {
        &["chmod"]
    }

    fn validate(&self, segment: &str, _context: &ValidationContext) -> Verdict {
        each_invocation(segment, self.commands(), "chmod", |argv| {
            if InvokedCommand::from_word(&argv[0]) != "chmod" {
                return Verdict::block("Not a chmod command");
            }

            let mut mode = None;
            let mut files = Vec::new();
            for arg in &argv[1..] {
                if arg == "-R" || arg == "--recursive" {
                    continue;
                }
                if arg.starts_with('-') {
                    return Verdict::block(format!("chmod flag '{}' is not allowed", arg));
                }
                if mode.is_none() {
                    mode = Some(arg.as_str());
                } else {
                    files.push(arg);
                }
            }

            let mode = match mode {
                Some(mode) => mode,
                None => return Verdict::block("chmod requires a mode"),
            };
            if files.is_empty() {
                return Verdict::block("chmod requires at least one file");
            }

            if SAFE_CHMOD_MODES.contains(&mode) || is_exec_grant(mode) {
                Verdict::Allow
            } else {
                Verdict::block(format!(
                    "chmod only allowed with executable modes (+x, 755, etc.), got: {}",
                    mode
                ))
            }
        })
    }
}

fn is_dangerous_rm_target(target: &str) -> bool {
    if target.starts_with("../") {
        return true;
    }

    let trimmed = target.trim_end_matches('/');
    // "/" and "//" trim to nothing
    let normalized = if trimmed.is_empty() && !target.is_empty() {
        "/"
    } else {
        trimmed
    };

    matches!(normalized, "/" | ".." | "~" | "*" | "/*") || PROTECTED_DIRS.contains(&normalized)
}

/// `rm`: never the root, home, parent or system directories
pub struct RmValidator;

impl CommandValidator for RmValidator {
    fn name(&self) -> &str {
        "rm"
    }

    fn commands(&self) -> &[&'static str] {
        &["rm"]
    }

    fn validate(&self, segment: &str, _context: &ValidationContext) -> Verdict {
        each_invocation(segment, self.commands(), "rm", |argv| {
            match argv[1..]
                .iter()
                .filter(|arg| !arg.starts_with('-'))
                .find(|arg| is_dangerous_rm_target(arg))
            {
                Some(target) => {
                    Verdict::block(format!("rm target '{}' is not allowed for safety", target))
                }
                None => Verdict::Allow,
            }
        })
    }
}

/// `init.sh`: only the project's own script, invoked by path
pub struct InitScriptValidator;

impl CommandValidator for InitScriptValidator {
    fn name(&self) -> &str {
        "init.sh"
    }

    fn commands(&self) -> &[&'static str] {
        &["init.sh"]
    }

    fn validate(&self, segment: &str, _context: &ValidationContext) -> Verdict {
        each_invocation(segment, self.commands(), "init script", |argv| {
            let script = &argv[0];
            if script == "./init.sh" || script.ends_with("/init.sh") {
                Verdict::Allow
            } else {
                Verdict::block(format!("Only ./init.sh is allowed, got: {}", script))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ValidationContext {
        ValidationContext::new("/tmp/project")
    }

    #[test]
    fn test_chmod_safe_modes() {
        let validator = ChmodValidator;
        for command in [
            "chmod +x script.sh",
            "chmod u+x a b",
            "chmod -R 755 bin",
            "chmod ugo+x run.sh",
            "/bin/chmod 644 README.md",
        ] {
            assert!(validator.validate(command, &ctx()).is_allowed(), "{}", command);
        }
    }

    #[test]
    fn test_chmod_rejections() {
        let validator = ChmodValidator;
        assert_eq!(
            validator.validate("chmod 777 file", &ctx()).reason(),
            "chmod only allowed with executable modes (+x, 755, etc.), got: 777"
        );
        assert_eq!(
            validator.validate("chmod -v +x file", &ctx()).reason(),
            "chmod flag '-v' is not allowed"
        );
        assert_eq!(
            validator.validate("chmod -w file", &ctx()).reason(),
            "chmod flag '-w' is not allowed"
        );
        assert!(validator.validate("chmod go-rwx secret", &ctx()).is_blocked());
        assert_eq!(
            validator.validate("chmod", &ctx()).reason(),
            "chmod requires a mode"
        );
        assert_eq!(
            validator.validate("chmod +x", &ctx()).reason(),
            "chmod requires at least one file"
        );
    }

    #[test]
    fn test_rm_dangerous_targets() {
        let validator = RmValidator;
        for command in [
            "rm /",
            "rm -rf /",
            "rm ..",
            "rm ~",
            "rm /etc",
            "rm -rf /etc/",
            "rm '*'",
            "rm -rf /*",
            "rm -r ../sibling",
            "rm -rf //",
        ] {
            assert!(validator.validate(command, &ctx()).is_blocked(), "{}", command);
        }
        assert_eq!(
            validator.validate("rm -rf /usr", &ctx()).reason(),
            "rm target '/usr' is not allowed for safety"
        );
    }

    #[test]
    fn test_rm_project_paths() {
        let validator = RmValidator;
        assert!(validator.validate("rm -rf ./build", &ctx()).is_allowed());
        assert!(validator.validate("rm old.txt", &ctx()).is_allowed());
        assert!(validator.validate("rm -f /etc-backup/x", &ctx()).is_allowed());
        assert!(validator.validate("rm -rf node_modules dist", &ctx()).is_allowed());
    }

    #[test]
    fn test_init_script() {
        let validator = InitScriptValidator;
        assert!(validator.validate("./init.sh", &ctx()).is_allowed());
        assert!(validator.validate("/tmp/project/init.sh --fast", &ctx()).is_allowed());
        assert_eq!(
            validator.validate("init.sh", &ctx()).reason(),
            "Only ./init.sh is allowed, got: init.sh"
        );
    }

    #[test]
    fn test_every_invocation_in_segment_is_checked() {
        let rm = RmValidator;
        assert!(rm.validate("rm a.txt | rm -rf /", &ctx()).is_blocked());
        assert!(rm.validate("rm a.txt & rm -rf /", &ctx()).is_blocked());
        assert!(rm.validate("echo $(rm x) $(rm -rf /)", &ctx()).is_blocked());
        assert!(rm.validate("timeout 5 rm -rf /", &ctx()).is_blocked());
        assert!(rm.validate("find . -name '*.o' | xargs rm -f", &ctx()).is_allowed());

        let chmod = ChmodValidator;
        assert_eq!(
            chmod.validate("chmod +x a | chmod 777 b", &ctx()).reason(),
            "chmod only allowed with executable modes (+x, 755, etc.), got: 777"
        );
        assert!(chmod.validate("chmod +x a | chmod 755 b", &ctx()).is_allowed());
    }
}
