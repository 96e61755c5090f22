//! Default profile builder
//!
//! Infers the stack tier from marker files in the project root and from
//! services named in compose files or `.env`. The custom tier comes from the
//! project's `.command-gate.toml` plus any configured extras.

use crate::gate::{ProfileBuilder, ProfileError, SecurityProfile};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Project-level allowlist file
pub const PROJECT_ALLOWLIST_FILE: &str = ".command-gate.toml";

/// Persisted profile inside a spec directory
pub const PROFILE_FILE: &str = "security-profile.json";

/// Marker files and the commands they unlock
const STACK_MARKERS: &[(&str, &[&str])] = &[
    ("Cargo.toml", &["cargo", "rustc", "rustup", "rustfmt"]),
    ("package.json", &["node", "npm", "npx"]),
    ("yarn.lock", &["yarn"]),
    ("pnpm-lock.yaml", &["pnpm"]),
    ("bun.lockb", &["bun"]),
    ("bun.lock", &["bun"]),
    ("deno.json", &["deno"]),
    ("pyproject.toml", &["python", "python3", "pip", "pip3", "pytest"]),
    ("requirements.txt", &["python", "python3", "pip", "pip3", "pytest"]),
    ("setup.py", &["python", "python3", "pip", "pip3", "pytest"]),
    ("Pipfile", &["python", "python3", "pipenv"]),
    ("poetry.lock", &["poetry"]),
    ("uv.lock", &["uv"]),
    ("go.mod", &["go", "gofmt"]),
    ("Gemfile", &["ruby", "bundle", "gem", "rake"]),
    ("composer.json", &["php", "composer"]),
    ("Makefile", &["make"]),
    ("Dockerfile", &["docker"]),
    ("docker-compose.yml", &["docker", "docker-compose"]),
    ("docker-compose.yaml", &["docker", "docker-compose"]),
    ("compose.yml", &["docker", "docker-compose"]),
    ("compose.yaml", &["docker", "docker-compose"]),
    ("init.sh", &["init.sh"]),
];

/// Files scanned for service names
const SERVICE_SOURCES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
    ".env",
    ".env.example",
];

/// Service keywords and the client commands they unlock
const SERVICE_CLIENTS: &[(&str, &[&str])] = &[
    (
        "postgres",
        &["psql", "pg_dump", "pg_restore", "createdb", "dropdb", "createuser", "dropuser"],
    ),
    ("mysql", &["mysql", "mysqladmin", "mysqldump"]),
    ("mariadb", &["mariadb", "mysql", "mysqladmin"]),
    ("redis", &["redis-cli"]),
    ("mongo", &["mongosh", "mongo"]),
];

#[derive(Debug, Default, Deserialize)]
struct ProjectAllowlist {
    #[serde(default)]
    allowlist: ProjectAllowlistSection,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectAllowlistSection {
    #[serde(default)]
    commands: Vec<String>,
}

/// Builds profiles from project contents
#[derive(Debug, Clone, Default)]
pub struct ProjectAnalyzer {
    custom_commands: Vec<String>,
}

impl ProjectAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add names to the custom tier of every profile built
    pub fn with_custom_commands(mut self, commands: impl IntoIterator<Item = String>) -> Self {
        self.custom_commands.extend(commands);
        self
    }

    /// Analyze `project_dir` without touching any spec directory
    pub fn analyze(&self, project_dir: &Path) -> Result<SecurityProfile, ProfileError> {
        if !project_dir.is_dir() {
            return Err(ProfileError::analyzer(format!(
                "project directory does not exist: {}",
                project_dir.display()
            )));
        }

        let stack = detect_stack(project_dir).chain(detect_services(project_dir)?);
        let custom = read_project_allowlist(project_dir)?;

        Ok(SecurityProfile::base_only(project_dir)
            .with_stack(stack)
            .with_custom(custom)
            .with_custom(self.custom_commands.iter().cloned()))
    }
}

fn detect_stack(project_dir: &Path) -> impl Iterator<Item = &'static str> + '_ {
    STACK_MARKERS
        .iter()
        .filter(move |(marker, _)| project_dir.join(marker).exists())
        .flat_map(|(_, commands)| commands.iter().copied())
}

fn detect_services(project_dir: &Path) -> Result<Vec<&'static str>, ProfileError> {
    let mut commands = Vec::new();
    for source in SERVICE_SOURCES {
        let path = project_dir.join(source);
        if !path.is_file() {
            continue;
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ProfileError::io(&path, e))?
            .to_lowercase();
        for (service, clients) in SERVICE_CLIENTS {
            if content.contains(service) {
                debug!(service, source, "detected service");
                commands.extend(clients.iter().copied());
            }
        }
    }
    Ok(commands)
}

fn read_project_allowlist(project_dir: &Path) -> Result<Vec<String>, ProfileError> {
    let path = project_dir.join(PROJECT_ALLOWLIST_FILE);
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(&path).map_err(|e| ProfileError::io(&path, e))?;
    let parsed: ProjectAllowlist =
        toml::from_str(&content).map_err(|e| ProfileError::InvalidAllowlist {
            path: path.clone(),
            message: e.to_string(),
        })?;

    Ok(parsed
        .allowlist
        .commands
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect())
}

impl ProfileBuilder for ProjectAnalyzer {
    /// With a spec directory, reuse its persisted profile for the same
    /// project or analyze and persist a new one.
    fn build(
        &self,
        project_dir: &Path,
        spec_dir: Option<&Path>,
    ) -> Result<SecurityProfile, ProfileError> {
        let spec_dir = match spec_dir {
            Some(spec_dir) => spec_dir,
            None => return self.analyze(project_dir),
        };

        let profile_path = spec_dir.join(PROFILE_FILE);
        if profile_path.is_file() {
            let content = std::fs::read_to_string(&profile_path)
                .map_err(|e| ProfileError::io(&profile_path, e))?;
            let persisted: SecurityProfile =
                serde_json::from_str(&content).map_err(|source| ProfileError::InvalidProfile {
                    path: profile_path.clone(),
                    source,
                })?;
            if persisted.project_dir == project_dir {
                debug!(path = %profile_path.display(), "loaded persisted profile");
                return Ok(persisted);
            }
        }

        let profile = self.analyze(project_dir)?;
        match serde_json::to_string_pretty(&profile) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&profile_path, json) {
                    warn!(path = %profile_path.display(), error = %e, "could not persist profile");
                }
            }
            Err(e) => warn!(error = %e, "could not serialize profile"),
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detects_stack_and_services() {
        let project = TempDir::new().unwrap();
        std::fs::write(project.path().join("Cargo.toml"), "[package]\n").unwrap();
        std::fs::write(project.path().join("package.json"), "{}").unwrap();
        std::fs::write(project.path().join("pnpm-lock.yaml"), "").unwrap();
        std::fs::write(
            project.path().join("docker-compose.yml"),
            "services:\n  db:\n    image: postgres:16\n  cache:\n    image: redis:7\n",
        )
        .unwrap();

        let profile = ProjectAnalyzer::new().analyze(project.path()).unwrap();
        for command in ["cargo", "npm", "pnpm", "docker", "psql", "dropdb", "redis-cli"] {
            assert!(profile.stack_commands.contains(command), "{}", command);
        }
        assert!(!profile.permits("yarn"));
        assert!(!profile.permits("mongosh"));
        assert!(profile.permits("ls"));
    }

    #[test]
    fn test_custom_tier() {
        let project = TempDir::new().unwrap();
        std::fs::write(
            project.path().join(PROJECT_ALLOWLIST_FILE),
            "[allowlist]\ncommands = [\"terraform\", \" \"]\n",
        )
        .unwrap();

        let profile = ProjectAnalyzer::new()
            .with_custom_commands(vec!["helm".to_string()])
            .analyze(project.path())
            .unwrap();
        assert_eq!(
            profile.custom_commands.iter().collect::<Vec<_>>(),
            vec!["helm", "terraform"]
        );
    }

    #[test]
    fn test_invalid_allowlist_and_missing_dir() {
        let project = TempDir::new().unwrap();
        std::fs::write(project.path().join(PROJECT_ALLOWLIST_FILE), "[allowlist\n").unwrap();
        assert!(matches!(
            ProjectAnalyzer::new().analyze(project.path()),
            Err(ProfileError::InvalidAllowlist { .. })
        ));

        let missing = project.path().join("nope");
        assert!(matches!(
            ProjectAnalyzer::new().analyze(&missing),
            Err(ProfileError::Analyzer(_))
        ));
    }

    #[test]
    fn test_spec_dir_get_or_create() {
        let project = TempDir::new().unwrap();
        let spec = TempDir::new().unwrap();
        std::fs::write(project.path().join("go.mod"), "module x\n").unwrap();

        let analyzer = ProjectAnalyzer::new();
        let created = analyzer.build(project.path(), Some(spec.path())).unwrap();
        assert!(spec.path().join(PROFILE_FILE).is_file());
        assert!(created.permits("go"));

        // the persisted copy wins over a fresh analysis
        std::fs::remove_file(project.path().join("go.mod")).unwrap();
        let loaded = analyzer.build(project.path(), Some(spec.path())).unwrap();
        assert_eq!(loaded, created);

        std::fs::write(spec.path().join(PROFILE_FILE), "{not json").unwrap();
        assert!(matches!(
            analyzer.build(project.path(), Some(spec.path())),
            Err(ProfileError::InvalidProfile { .. })
        ));
    }
}
