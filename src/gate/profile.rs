//! Security profiles and the single-slot profile cache

use crate::gate::ProfileError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Core utilities every profile permits
pub const BASE_COMMANDS: &[&str] = &[
    // navigation and inspection
    "ls", "pwd", "cd", "cat", "head", "tail", "less", "more", "wc", "file", "stat", "tree",
    "find", "grep", "egrep", "fgrep", "rg", "which", "whereis", "type", "du", "df",
    // text processing
    "echo", "printf", "sort", "uniq", "cut", "tr", "sed", "awk", "diff", "comm", "tee",
    "xargs", "basename", "dirname", "realpath", "readlink", "jq",
    // file operations
    "mkdir", "touch", "cp", "mv", "rm", "rmdir", "ln", "chmod", "tar", "gzip", "gunzip",
    "zip", "unzip",
    // shell builtins and environment
    "true", "false", "test", "[", "env", "export", "set", "unset", "source", ".", "sleep",
    "date", "whoami", "id", "uname", "hostname", "time", "timeout", "exit", "wait",
    // processes
    "ps", "kill", "pkill", "killall", "pgrep", "lsof",
    // network inspection
    "curl", "wget", "ping", "nc",
    // version control
    "git",
];

/// Permitted command names for one project, in three tiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityProfile {
    /// Project directory the profile was built for
    pub project_dir: PathBuf,

    /// Build time
    pub created_at: DateTime<Utc>,

    /// Always-permitted core utilities
    pub base_commands: BTreeSet<String>,

    /// Commands inferred from project contents
    #[serde(default)]
    pub stack_commands: BTreeSet<String>,

    /// User-declared commands
    #[serde(default)]
    pub custom_commands: BTreeSet<String>,
}

impl SecurityProfile {
    /// Create a profile with only the base tier
    pub fn base_only(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            created_at: Utc::now(),
            base_commands: BASE_COMMANDS.iter().map(|c| c.to_string()).collect(),
            stack_commands: BTreeSet::new(),
            custom_commands: BTreeSet::new(),
        }
    }

    /// Add stack-tier commands
    pub fn with_stack<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stack_commands.extend(commands.into_iter().map(Into::into));
        self
    }

    /// Add custom-tier commands
    pub fn with_custom<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_commands.extend(commands.into_iter().map(Into::into));
        self
    }

    /// Union of all three tiers
    pub fn all_allowed_commands(&self) -> BTreeSet<&str> {
        self.base_commands
            .iter()
            .chain(&self.stack_commands)
            .chain(&self.custom_commands)
            .map(String::as_str)
            .collect()
    }

    /// Membership in the union view
    pub fn permits(&self, command: &str) -> bool {
        self.base_commands.contains(command)
            || self.stack_commands.contains(command)
            || self.custom_commands.contains(command)
    }
}

/// Builds a profile for a project directory.
///
/// Implementations may touch the filesystem; failures are reported as
/// [`ProfileError`] and never panic.
pub trait ProfileBuilder: Send + Sync {
    fn build(
        &self,
        project_dir: &Path,
        spec_dir: Option<&Path>,
    ) -> Result<SecurityProfile, ProfileError>;
}

/// Resolve a directory to the key used by the cache
pub fn canonical_project_dir(project_dir: &Path) -> PathBuf {
    project_dir
        .canonicalize()
        .or_else(|_| std::path::absolute(project_dir))
        .unwrap_or_else(|_| project_dir.to_path_buf())
}

/// Memoizes the profile for the most recently resolved project directory
pub struct ProfileCache {
    builder: Arc<dyn ProfileBuilder>,
    slot: Mutex<Option<(PathBuf, Arc<SecurityProfile>)>>,
}

impl ProfileCache {
    /// Create an empty cache around a builder
    pub fn new(builder: Arc<dyn ProfileBuilder>) -> Self {
        Self {
            builder,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached profile for `project_dir`, building it on a miss.
    ///
    /// The lock is held across the build so concurrent first resolutions of
    /// one path build once. A different path evicts the previous entry.
    pub fn resolve(
        &self,
        project_dir: &Path,
        spec_dir: Option<&Path>,
    ) -> Result<Arc<SecurityProfile>, ProfileError> {
        let key = canonical_project_dir(project_dir);
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some((cached_dir, profile)) = slot.as_ref() {
            if *cached_dir == key {
                debug!(project_dir = %key.display(), "profile cache hit");
                return Ok(Arc::clone(profile));
            }
        }

        debug!(project_dir = %key.display(), "building security profile");
        let profile = Arc::new(self.builder.build(&key, spec_dir)?);
        *slot = Some((key, Arc::clone(&profile)));
        Ok(profile)
    }

    /// Drop the cached entry
    pub fn reset(&self) {
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }

    /// Directory of the live entry, if any
    pub fn cached_dir(&self) -> Option<PathBuf> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|(dir, _)| dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct CountingBuilder {
        builds: AtomicUsize,
        delay: Duration,
    }

    impl ProfileBuilder for CountingBuilder {
        fn build(
            &self,
            project_dir: &Path,
            _spec_dir: Option<&Path>,
        ) -> Result<SecurityProfile, ProfileError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(SecurityProfile::base_only(project_dir).with_stack(["cargo"]))
        }
    }

    fn counting_cache() -> (Arc<CountingBuilder>, ProfileCache) {
        slow_counting_cache(Duration::ZERO)
    }

    fn slow_counting_cache(delay: Duration) -> (Arc<CountingBuilder>, ProfileCache) {
        let builder = Arc::new(CountingBuilder {
            builds: AtomicUsize::new(0),
            delay,
        });
        let cache = ProfileCache::new(builder.clone());
        (builder, cache)
    }

    #[test]
    fn test_profile_union() {
        let profile = SecurityProfile::base_only("/tmp/project")
            .with_stack(["cargo", "rustc"])
            .with_custom(["deploy-preview"]);

        let all = profile.all_allowed_commands();
        assert!(all.contains("ls"));
        assert!(all.contains("cargo"));
        assert!(all.contains("deploy-preview"));
        assert!(!all.contains("docker"));
        assert!(profile.permits("rustc"));
        assert!(!profile.permits("psql"));
    }

    #[test]
    fn test_profile_serialization() {
        let profile = SecurityProfile::base_only("/tmp/project").with_stack(["npm"]);
        let json = serde_json::to_string(&profile).unwrap();
        let back: SecurityProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_cache_hit_returns_same_instance() {
        let dir = TempDir::new().unwrap();
        let (builder, cache) = counting_cache();

        let first = cache.resolve(dir.path(), None).unwrap();
        let second = cache.resolve(dir.path(), None).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_relative_and_absolute_share_entry() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("app")).unwrap();
        let (builder, cache) = counting_cache();

        let absolute = cache.resolve(&dir.path().join("app"), None).unwrap();
        let dotted = cache
            .resolve(&dir.path().join("app").join("..").join("app"), None)
            .unwrap();

        assert!(Arc::ptr_eq(&absolute, &dotted));
        assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_evicts_and_resets() {
        let first_dir = TempDir::new().unwrap();
        let second_dir = TempDir::new().unwrap();
        let (builder, cache) = counting_cache();

        let first = cache.resolve(first_dir.path(), None).unwrap();
        cache.resolve(second_dir.path(), None).unwrap();
        assert_eq!(
            cache.cached_dir(),
            Some(canonical_project_dir(second_dir.path()))
        );

        let again = cache.resolve(first_dir.path(), None).unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(builder.builds.load(Ordering::SeqCst), 3);

        cache.reset();
        assert!(cache.cached_dir().is_none());
        let rebuilt = cache.resolve(first_dir.path(), None).unwrap();
        assert!(!Arc::ptr_eq(&again, &rebuilt));
        assert_eq!(builder.builds.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_concurrent_resolve_builds_once() {
        let project = TempDir::new().unwrap();
        let (builder, cache) = slow_counting_cache(Duration::from_millis(50));

        let profiles: Vec<Arc<SecurityProfile>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.resolve(project.path(), None).unwrap()))
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
        assert!(profiles.iter().all(|profile| Arc::ptr_eq(profile, &profiles[0])));
    }
}
