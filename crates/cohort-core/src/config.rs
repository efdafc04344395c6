use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RolloutError;
use crate::graph::DuplicateNeighborPolicy;

/// File name looked up in the working directory when no `--config` is given.
pub const PROJECT_CONFIG_FILE: &str = "cohort.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub limited: LimitedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub duplicate_neighbors: DuplicateNeighborPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitedConfig {
    /// Fraction of all members targeted when neither a count nor a fraction
    /// is given on the command line.
    #[serde(default = "default_fraction")]
    pub default_fraction: f64,
    /// Tolerance, as a fraction of the target, when none is given.
    #[serde(default = "default_tolerance")]
    pub default_tolerance: f64,
}

impl Default for LimitedConfig {
    fn default() -> Self {
        Self {
            default_fraction: default_fraction(),
            default_tolerance: default_tolerance(),
        }
    }
}

/// Per-user settings from `<config dir>/cohort/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    /// Preferred output format; unrecognized names are ignored.
    #[serde(default)]
    pub output: Option<String>,
}

/// How command results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Pretty,
    Text,
    Json,
}

impl OutputFormat {
    /// Lenient name lookup; `human` is an alias for `pretty`.
    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some(Self::Pretty),
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Everything the CLI needs before dispatching a command.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub output: OutputFormat,
}

/// Load the project config.
///
/// An explicit path must exist. Without one, `cohort.toml` in
/// `project_root` is used if present, otherwise defaults apply.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or
/// [`RolloutError::Config`] if it cannot be parsed.
pub fn load_project_config(
    project_root: &Path,
    explicit: Option<&Path>,
) -> Result<ProjectConfig, RolloutError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = project_root.join(PROJECT_CONFIG_FILE);
            if !path.exists() {
                return Ok(ProjectConfig::default());
            }
            path
        }
    };

    let mut config: ProjectConfig = read_toml(&path)?;
    if config.store.path.is_relative() {
        if let Some(base) = path.parent() {
            config.store.path = base.join(&config.store.path);
        }
    }
    Ok(config)
}

/// Load `<config dir>/cohort/config.toml`, or defaults if it is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig, RolloutError> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("cohort/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }
    read_toml(&path)
}

/// Resolve project config, user config, and output mode together.
///
/// # Errors
///
/// Propagates config load failures.
pub fn resolve_config(
    project_root: &Path,
    explicit: Option<&Path>,
    cli_json: bool,
) -> Result<EffectiveConfig, RolloutError> {
    let project = load_project_config(project_root, explicit)?;
    let user = load_user_config()?;
    let output = pick_output(
        cli_json,
        env::var("FORMAT").ok().as_deref(),
        user.output.as_deref(),
        std::io::stdout().is_terminal(),
    );
    Ok(EffectiveConfig { project, output })
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, RolloutError> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str::<T>(&content).map_err(|source| RolloutError::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// `--json` wins, then `FORMAT`, then the user config, then pretty on a
/// terminal and text otherwise.
fn pick_output(
    cli_json: bool,
    env_format: Option<&str>,
    user_output: Option<&str>,
    stdout_is_tty: bool,
) -> OutputFormat {
    if cli_json {
        return OutputFormat::Json;
    }
    env_format
        .and_then(OutputFormat::from_name)
        .or_else(|| user_output.and_then(OutputFormat::from_name))
        .unwrap_or(if stdout_is_tty {
            OutputFormat::Pretty
        } else {
            OutputFormat::Text
        })
}

fn default_store_path() -> PathBuf {
    PathBuf::from("users.tsv")
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}

const fn default_fraction() -> f64 {
    0.1
}

const fn default_tolerance() -> f64 {
    0.05
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir");
        let cfg = load_project_config(root.path(), None).expect("load should succeed");
        assert_eq!(cfg.store.path, PathBuf::from("users.tsv"));
        assert_eq!(cfg.store.lock_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.graph.duplicate_neighbors, DuplicateNeighborPolicy::Preserve);
        assert!((cfg.limited.default_fraction - 0.1).abs() < f64::EPSILON);
        assert!((cfg.limited.default_tolerance - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn project_config_parses_sections() {
        let root = tempfile::tempdir().expect("temp dir");
        std::fs::write(
            root.path().join(PROJECT_CONFIG_FILE),
            r#"
[store]
path = "data/members.tsv"
lock_timeout_ms = 250

[graph]
duplicate_neighbors = "collapse"

[limited]
default_tolerance = 0.0
"#,
        )
        .expect("write config");

        let cfg = load_project_config(root.path(), None).expect("parse");
        assert_eq!(cfg.store.path, root.path().join("data/members.tsv"));
        assert_eq!(cfg.store.lock_timeout_ms, 250);
        assert_eq!(cfg.graph.duplicate_neighbors, DuplicateNeighborPolicy::Collapse);
        assert!((cfg.limited.default_fraction - 0.1).abs() < f64::EPSILON);
        assert!(cfg.limited.default_tolerance.abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_project_config_is_a_config_error() {
        let root = tempfile::tempdir().expect("temp dir");
        let path = root.path().join("broken.toml");
        std::fs::write(&path, "[graph]\nduplicate_neighbors = \"sometimes\"\n").expect("write");

        let err = load_project_config(root.path(), Some(&path)).unwrap_err();
        assert!(matches!(err, RolloutError::Config { .. }));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let root = tempfile::tempdir().expect("temp dir");
        let missing = root.path().join("nope.toml");
        assert!(load_project_config(root.path(), Some(&missing)).is_err());
    }

    #[test]
    fn json_flag_beats_everything() {
        assert_eq!(
            pick_output(true, Some("pretty"), Some("text"), true),
            OutputFormat::Json
        );
    }

    #[test]
    fn env_format_beats_user_config() {
        assert_eq!(
            pick_output(false, Some("human"), Some("json"), false),
            OutputFormat::Pretty
        );
        assert_eq!(
            pick_output(false, Some("bogus"), Some("json"), false),
            OutputFormat::Json
        );
    }

    #[test]
    fn terminal_decides_when_nothing_is_set() {
        assert_eq!(pick_output(false, None, None, true), OutputFormat::Pretty);
        assert_eq!(pick_output(false, None, Some("?"), false), OutputFormat::Text);
    }
}
