use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BatonError, Result};

/// Marker phrase an agent includes in its reply to end the workflow.
pub const DEFAULT_COMPLETION_MARKER: &str = "WORKFLOW COMPLETE";

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub history: Option<HistoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// The conventionally-designated entry agent.
    #[serde(default = "default_lead_agent")]
    pub lead_agent: String,
    /// Explicit entry override; wins over `lead_agent` when registered.
    #[serde(default)]
    pub initial_agent: Option<String>,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Substring of an agent reply that signals completion.
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            lead_agent: default_lead_agent(),
            initial_agent: None,
            max_steps: default_max_steps(),
            completion_marker: default_completion_marker(),
        }
    }
}

fn default_lead_agent() -> String {
    "lead".to_string()
}

fn default_max_steps() -> usize {
    50
}

fn default_completion_marker() -> String {
    DEFAULT_COMPLETION_MARKER.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name; thread ids are derived from it.
    #[serde(default = "default_project_name")]
    pub name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
        }
    }
}

fn default_project_name() -> String {
    "baton".to_string()
}

/// Run history persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Enable history persistence (default: true when section is present).
    #[serde(default = "default_history_enabled")]
    pub enabled: bool,
    /// Directory for history files. Default: ~/.baton/history
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

fn default_history_enabled() -> bool {
    true
}

impl HistoryConfig {
    /// Resolve the history directory (expand ~).
    pub fn resolved_dir(&self) -> PathBuf {
        let dir = self.dir.as_deref().unwrap_or("~/.baton/history");
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }
}

impl EngineConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| BatonError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| BatonError::Config(e.to_string()))
    }

    /// Whether this configuration asks for run history persistence.
    pub fn history_enabled(&self) -> bool {
        self.history.as_ref().is_some_and(|h| h.enabled)
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Expand `${ENV_VAR}` patterns in a string. Unset variables pass
/// through untouched.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
