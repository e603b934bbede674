//! Configuration resolution for Shogun.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config_dir>/shogun/settings.json`)
//! 3. Workspace config (`<workspace>/config/settings.json`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::role::{DEFAULT_LABORER_COUNT, Role};

/// Complete Shogun configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the shared queue, reports and dashboard live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root: Option<PathBuf>,
    pub laborer_count: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            laborer_count: DEFAULT_LABORER_COUNT,
        }
    }
}

/// External runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path or name of the `claude` CLI.
    pub claude_bin: PathBuf,
    /// Bound on one job round-trip through the pool.
    pub job_timeout_secs: u64,
    /// Bound on one CLI invocation inside a runner process.
    pub runner_job_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            claude_bin: PathBuf::from("claude"),
            job_timeout_secs: 120,
            runner_job_timeout_secs: 600,
        }
    }
}

/// Optional model identifiers passed alongside jobs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ModelConfig {
    pub default: Option<String>,
    pub commander: Option<String>,
    pub steward: Option<String>,
    pub laborer: Option<String>,
}

impl ModelConfig {
    /// Model for `role`, falling back to the default model. Blank values
    /// count as unset.
    pub fn for_role(&self, role: Role) -> Option<&str> {
        let specific = match role {
            Role::Commander => self.commander.as_deref(),
            Role::Steward => self.steward.as_deref(),
            Role::Laborer(_) => self.laborer.as_deref(),
        };
        specific
            .filter(|m| !m.trim().is_empty())
            .or_else(|| self.default.as_deref().filter(|m| !m.trim().is_empty()))
    }
}

/// Keywords used to locate dashboard sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub in_progress: String,
    pub results: String,
    pub skill_candidates: String,
    pub action_required: String,
    pub last_updated_marker: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            in_progress: "In Progress".to_string(),
            results: "Results".to_string(),
            skill_candidates: "Skill Candidates".to_string(),
            action_required: "Action Required".to_string(),
            last_updated_marker: "Last Updated".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration source priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    Default = 0,
    Global = 1,
    Workspace = 2,
    Environment = 3,
    Cli = 4,
}

/// Load configuration with hierarchical resolution.
///
/// `workspace` is the workspace root when already known (e.g. from a CLI
/// flag); otherwise the root named by the global file or `SHOGUN_WORKSPACE`
/// is used to locate the workspace file.
pub fn load_config(workspace: Option<&Path>) -> Result<Config> {
    let mut layered = Value::Object(Map::new());

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        merge_values(&mut layered, load_config_file(&global_path)?);
    }

    let env_root = std::env::var_os("SHOGUN_WORKSPACE").map(PathBuf::from);
    let root = match (workspace, env_root) {
        (Some(dir), _) => Some(dir.to_path_buf()),
        (None, Some(dir)) => Some(dir),
        (None, None) => resolve(&layered)?.workspace.root,
    };
    if let Some(dir) = root.as_deref() {
        let workspace_path = workspace_config_path(dir);
        if workspace_path.exists() {
            merge_values(&mut layered, load_config_file(&workspace_path)?);
        }
    }

    let mut config = resolve(&layered)?;
    apply_env_overrides(&mut config);
    if workspace.is_some() {
        config.workspace.root = root;
    }

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("shogun").join("settings.json"))
}

/// Workspace-level config file path.
pub fn workspace_config_path(root: &Path) -> PathBuf {
    root.join("config").join("settings.json")
}

/// Read one config layer as raw JSON, checked against [`Config`] so a bad
/// file is reported by name.
fn load_config_file(path: &Path) -> Result<Value> {
    tracing::debug!(path = %path.display(), "Loading config file");
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    Config::deserialize(&value).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    Ok(value)
}

fn resolve(layered: &Value) -> Result<Config> {
    Config::deserialize(layered)
        .map_err(|e| Error::Config(format!("Invalid merged configuration: {e}")))
}

/// Overlay one config layer onto another. Objects merge key by key at every
/// depth; any other value replaces what was there.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("SHOGUN_WORKSPACE") {
        config.workspace.root = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("SHOGUN_LABORER_COUNT")
        && let Ok(n) = val.parse()
    {
        config.workspace.laborer_count = n;
    }
    if let Ok(val) = std::env::var("SHOGUN_CLAUDE_BIN") {
        config.runtime.claude_bin = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("SHOGUN_JOB_TIMEOUT_SECS")
        && let Ok(n) = val.parse()
    {
        config.runtime.job_timeout_secs = n;
    }
    if let Ok(val) = std::env::var("SHOGUN_LOG_LEVEL") {
        config.logging.level = val;
    }
    if let Ok(val) = std::env::var("SHOGUN_MODEL_COMMANDER") {
        config.models.commander = Some(val);
    }
    if let Ok(val) = std::env::var("SHOGUN_MODEL_STEWARD") {
        config.models.steward = Some(val);
    }
    if let Ok(val) = std::env::var("SHOGUN_MODEL_LABORER") {
        config.models.laborer = Some(val);
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_eight_laborers_and_120s_jobs() {
        let config = Config::default();
        assert_eq!(config.workspace.laborer_count, 8);
        assert_eq!(config.runtime.job_timeout_secs, 120);
    }

    #[test]
    fn model_for_role_falls_back_to_default() {
        let models = ModelConfig {
            default: Some("base".into()),
            steward: Some("big".into()),
            laborer: Some("  ".into()),
            ..ModelConfig::default()
        };
        assert_eq!(models.for_role(Role::Steward), Some("big"));
        assert_eq!(models.for_role(Role::Commander), Some("base"));
        assert_eq!(models.for_role(Role::Laborer(3)), Some("base"));
        assert_eq!(ModelConfig::default().for_role(Role::Steward), None);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"runtime":{"job_timeout_secs":30}}"#).unwrap();
        assert_eq!(config.runtime.job_timeout_secs, 30);
        assert_eq!(config.runtime.claude_bin, PathBuf::from("claude"));
        assert_eq!(config.dashboard.results, "Results");
    }

    #[test]
    fn workspace_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(
            workspace_config_path(dir.path()),
            r#"{"workspace":{"laborer_count":3},"models":{"steward":"s-model"}}"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path())).unwrap();
        assert_eq!(config.workspace.laborer_count, 3);
        assert_eq!(config.models.for_role(Role::Steward), Some("s-model"));
        assert_eq!(config.workspace.root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn later_layer_keeps_unset_fields_of_earlier_layer() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.json");
        let local = dir.path().join("local.json");
        std::fs::write(
            &global,
            r#"{"runtime":{"claude_bin":"/opt/claude","job_timeout_secs":60},
                "dashboard":{"results":"Outcomes"},"models":{"default":"base"}}"#,
        )
        .unwrap();
        std::fs::write(
            &local,
            r#"{"runtime":{"job_timeout_secs":30},"models":{"steward":"big"}}"#,
        )
        .unwrap();

        let mut layered = load_config_file(&global).unwrap();
        merge_values(&mut layered, load_config_file(&local).unwrap());
        let config = resolve(&layered).unwrap();

        assert_eq!(config.runtime.job_timeout_secs, 30);
        assert_eq!(config.runtime.claude_bin, PathBuf::from("/opt/claude"));
        assert_eq!(config.dashboard.results, "Outcomes");
        assert_eq!(config.models.for_role(Role::Steward), Some("big"));
        assert_eq!(config.models.for_role(Role::Laborer(1)), Some("base"));
        assert_eq!(config.workspace.laborer_count, 8);
    }

    #[test]
    fn mistyped_field_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"runtime":{"job_timeout_secs":"soon"}}"#).unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(err.to_string().contains("settings.json"));
    }

    #[test]
    fn broken_workspace_file_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(workspace_config_path(dir.path()), "{ nope").unwrap();

        let err = load_config(Some(dir.path())).unwrap_err();
        assert!(err.to_string().contains("settings.json"));
    }
}
