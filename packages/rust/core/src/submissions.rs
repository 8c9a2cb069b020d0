//! The submissions registry: which team's repo and ref to grade.
//!
//! ```text
//! team,repo_url,ref,nb_path
//! TeamA,https://git.example.edu/course/team-a.git,final_week6,notebooks/submission.ipynb
//! ```

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument};

use coursegrade_shared::{GradeError, Result, Submission};

static UNSAFE_DIR_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));

/// Raw CSV row; every column may be absent or blank.
#[derive(Debug, Deserialize)]
struct SubmissionRow {
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    repo_url: Option<String>,
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,
    #[serde(default)]
    nb_path: Option<String>,
}

/// Load the submissions registry. Blank `nb_path` falls back to `default_nb`.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_submissions(path: &Path, default_nb: &str) -> Result<Vec<Submission>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| GradeError::csv(path, e))?;

    let mut submissions = Vec::new();
    for (i, row) in reader.deserialize::<SubmissionRow>().enumerate() {
        let row = row.map_err(|e| GradeError::csv(path, e))?;
        let line = i + 2;

        let team = required(row.team, "team", path, line)?;
        let repo_url = required(row.repo_url, "repo_url", path, line)?;
        let git_ref = required(row.git_ref, "ref", path, line)?;
        let nb_path = row
            .nb_path
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_nb.to_string());

        submissions.push(Submission {
            team,
            repo_url,
            git_ref,
            nb_path,
        });
    }

    debug!(count = submissions.len(), "loaded submissions");
    Ok(submissions)
}

fn required(value: Option<String>, column: &str, path: &Path, line: usize) -> Result<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            GradeError::validation(format!(
                "{} line {line}: missing {column}",
                path.display()
            ))
        })
}

/// Directory name for a team's checkout inside the workdir.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`, so names cannot escape the
/// workdir or collide with `.` and `..`.
pub fn team_dir_name(team: &str) -> String {
    let name = UNSAFE_DIR_CHARS.replace_all(team.trim(), "_").into_owned();
    if name.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        name
    }
}
