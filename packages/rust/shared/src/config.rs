//! Application configuration for coursegrade.
//!
//! Lookup order: an explicit `--config` path, then `./coursegrade.toml`,
//! then `~/.coursegrade/coursegrade.toml`, then built-in defaults.
//! CLI flags override config file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GradeError, Result};
use crate::types::DEFAULT_NOTEBOOK_PATH;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "coursegrade.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".coursegrade";

// ---------------------------------------------------------------------------
// Config structs (matching coursegrade.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Output and scratch locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// How team repositories are built and executed.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Column names for labels and predictions.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Leaderboard page settings.
    #[serde(default)]
    pub site: SiteConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where team repositories are checked out.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    /// Leaderboard CSV.
    #[serde(default = "default_leaderboard")]
    pub leaderboard: PathBuf,

    /// Rendered leaderboard page.
    #[serde(default = "default_site_out")]
    pub site_out: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            leaderboard: default_leaderboard(),
            site_out: default_site_out(),
        }
    }
}

fn default_workdir() -> PathBuf {
    "faculty_workdir".into()
}
fn default_leaderboard() -> PathBuf {
    PathBuf::from("leaderboard").join("leaderboard.csv")
}
fn default_site_out() -> PathBuf {
    PathBuf::from("docs").join("index.html")
}

/// `[runner]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Base python interpreter.
    #[serde(default = "default_python")]
    pub python: String,

    /// Create a virtualenv per team.
    #[serde(default)]
    pub use_venv: bool,

    /// Per-cell timeout handed to nbconvert.
    #[serde(default = "default_notebook_timeout")]
    pub notebook_timeout_secs: u64,

    /// Wall-clock limit for any single external command.
    #[serde(default = "default_process_timeout")]
    pub process_timeout_secs: u64,

    /// Notebook used when a submission row leaves `nb_path` blank.
    #[serde(default = "default_notebook")]
    pub default_notebook: String,

    /// Script that rewrites a notebook down to its submission section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            use_venv: false,
            notebook_timeout_secs: default_notebook_timeout(),
            process_timeout_secs: default_process_timeout(),
            default_notebook: default_notebook(),
            extractor: None,
        }
    }
}

fn default_python() -> String {
    "python3".into()
}
fn default_notebook_timeout() -> u64 {
    1200
}
fn default_process_timeout() -> u64 {
    3600
}
fn default_notebook() -> String {
    DEFAULT_NOTEBOOK_PATH.into()
}

/// `[scoring]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Row identifier shared by labels and predictions.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Binary label column in the hidden labels file.
    #[serde(default = "default_label_column")]
    pub label_column: String,

    /// Probability column in the predictions file.
    #[serde(default = "default_prediction_column")]
    pub prediction_column: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            id_column: default_id_column(),
            label_column: default_label_column(),
            prediction_column: default_prediction_column(),
        }
    }
}

fn default_id_column() -> String {
    "row_id".into()
}
fn default_label_column() -> String {
    "readmit30".into()
}
fn default_prediction_column() -> String {
    "prob".into()
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Page title and heading.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
        }
    }
}

fn default_title() -> String {
    "Readmit30 Leaderboard".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.coursegrade/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| GradeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the user config file (`~/.coursegrade/coursegrade.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Find the config file to use, if any.
///
/// An explicit path must exist. Otherwise the working directory is checked
/// before the user config directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(GradeError::config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(Some(local));
    }

    // A missing home directory only means there is no user config.
    match config_file_path() {
        Ok(path) if path.exists() => Ok(Some(path)),
        _ => Ok(None),
    }
}

/// Load the application config. Returns defaults if no file is found.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match resolve_config_path(explicit)? {
        Some(path) => load_config_from(&path),
        None => {
            tracing::debug!("config file not found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GradeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| GradeError::config(format!("failed to parse {}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "loaded config");
    validate_config(&config)?;
    Ok(config)
}

/// Reject settings the runner cannot work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.runner.python.trim().is_empty() {
        return Err(GradeError::config("runner.python must not be empty"));
    }
    if config.runner.notebook_timeout_secs == 0 || config.runner.process_timeout_secs == 0 {
        return Err(GradeError::config("runner timeouts must be greater than zero"));
    }
    let scoring = &config.scoring;
    if scoring.id_column == scoring.label_column || scoring.id_column == scoring.prediction_column
    {
        return Err(GradeError::config(
            "scoring.id_column must differ from the label and prediction columns",
        ));
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GradeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GradeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GradeError::io(&path, e))?;
    tracing::info!(path = %path.display(), "created default config file");

    Ok(path)
}
