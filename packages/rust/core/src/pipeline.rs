//! End-to-end batch run: registry → per-team grading → leaderboard → site.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use tracing::{Instrument, info, info_span, instrument, warn};

use coursegrade_leaderboard::{LeaderboardRecord, upsert};
use coursegrade_scoring::score_predictions;
use coursegrade_shared::{
    GradeError, Result, RunId, RunnerConfig, Scores, ScoringConfig, Submission,
};
use coursegrade_site::{SiteOptions, SiteResult, build_site};

use crate::runner::{
    NotebookEnv, NotebookRun, ProcessRunner, execute_notebook, git_checkout, git_clone,
    prepare_python,
};
use crate::submissions::{load_submissions, team_dir_name};

/// Configuration for one batch run, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Submissions registry CSV.
    pub submissions: PathBuf,
    /// Faculty-only features CSV.
    pub hidden_test: PathBuf,
    /// Faculty-only labels CSV.
    pub hidden_labels: PathBuf,
    /// Override for `TRAIN_PATH`.
    pub train_path: Option<PathBuf>,
    /// Override for `DEV_PATH`.
    pub dev_path: Option<PathBuf>,
    /// Where team repositories are checked out.
    pub workdir: PathBuf,
    /// Leaderboard CSV.
    pub leaderboard: PathBuf,
    /// Rebuild the site after grading.
    pub make_site: bool,
    /// Rendered page location.
    pub site_out: PathBuf,
    pub site: SiteOptions,
    pub runner: RunnerConfig,
    pub scoring: ScoringConfig,
}

/// Result of a batch run.
#[derive(Debug)]
pub struct BatchResult {
    pub run_id: RunId,
    /// Records written this run, in registry order.
    pub records: Vec<LeaderboardRecord>,
    pub ok: usize,
    pub failed: usize,
    pub leaderboard: PathBuf,
    /// Present when the site was rebuilt.
    pub site: Option<SiteResult>,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting batch status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a submission is graded (`current` is 1-based).
    fn team_started(&self, submission: &Submission, current: usize, total: usize);
    /// Called after a submission's record is on the leaderboard.
    fn team_finished(&self, record: &LeaderboardRecord);
    /// Called when the batch completes.
    fn done(&self, result: &BatchResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn team_started(&self, _submission: &Submission, _current: usize, _total: usize) {}
    fn team_finished(&self, _record: &LeaderboardRecord) {}
    fn done(&self, _result: &BatchResult) {}
}

/// Run the full batch.
///
/// 1. Load the registry and check the hidden data exists
/// 2. Grade each submission in turn; failures become `ERROR` rows
/// 3. Upsert every record as soon as it is known
/// 4. Rebuild the site if requested
#[instrument(skip_all, fields(submissions = %config.submissions.display()))]
pub async fn run_batch(
    config: &BatchConfig,
    progress: &dyn ProgressReporter,
) -> Result<BatchResult> {
    let start = Instant::now();
    let run_id = RunId::new();

    progress.phase("Loading submissions");
    let submissions = load_submissions(&config.submissions, &config.runner.default_notebook)?;
    for hidden in [&config.hidden_test, &config.hidden_labels] {
        if !hidden.exists() {
            return Err(GradeError::validation(format!(
                "hidden data file not found: {}",
                hidden.display()
            )));
        }
    }
    std::fs::create_dir_all(&config.workdir)
        .map_err(|e| GradeError::io(&config.workdir, e))?;

    info!(%run_id, count = submissions.len(), "starting batch");

    let runner = ProcessRunner::from_config(&config.runner);
    let total = submissions.len();
    let mut records = Vec::with_capacity(total);

    for (i, submission) in submissions.iter().enumerate() {
        progress.team_started(submission, i + 1, total);

        let span = info_span!("submission", %run_id, team = %submission.team, git_ref = %submission.git_ref);
        let record = grade_submission(config, &runner, submission)
            .instrument(span)
            .await;

        upsert(&config.leaderboard, record.clone())?;
        progress.team_finished(&record);
        records.push(record);
    }

    let site = if config.make_site {
        progress.phase("Rebuilding site");
        Some(build_site(&config.leaderboard, &config.site_out, &config.site)?)
    } else {
        None
    };

    let ok = records.iter().filter(|r| r.status.is_ok()).count();
    let result = BatchResult {
        run_id,
        failed: records.len() - ok,
        ok,
        records,
        leaderboard: config.leaderboard.clone(),
        site,
        elapsed: start.elapsed(),
    };

    info!(
        ok = result.ok,
        failed = result.failed,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "batch complete"
    );
    progress.done(&result);
    Ok(result)
}

/// Grade one submission. Never fails: errors end up in the record's notes.
async fn grade_submission(
    config: &BatchConfig,
    runner: &ProcessRunner,
    submission: &Submission,
) -> LeaderboardRecord {
    let record = LeaderboardRecord::pending(&submission.team, &submission.git_ref, Utc::now());

    match try_grade(config, runner, submission).await {
        Ok(scores) => {
            info!(auroc = scores.auroc, n = scores.n, "submission scored");
            record.with_scores(&scores)
        }
        Err(e) => {
            warn!(error = %e, "submission failed");
            record.with_error(&e.to_string())
        }
    }
}

async fn try_grade(
    config: &BatchConfig,
    runner: &ProcessRunner,
    submission: &Submission,
) -> Result<Scores> {
    let team_dir = config.workdir.join(team_dir_name(&submission.team));
    if team_dir.exists() {
        std::fs::remove_dir_all(&team_dir).map_err(|e| GradeError::io(&team_dir, e))?;
    }

    git_clone(runner, &submission.repo_url, &team_dir).await?;
    git_checkout(runner, &team_dir, &submission.git_ref).await?;

    let python_exe = prepare_python(
        runner,
        &team_dir,
        &config.runner.python,
        config.runner.use_venv,
    )
    .await?;

    let env = NotebookEnv::resolve(
        &team_dir,
        python_exe,
        &config.hidden_test,
        config.train_path.as_deref(),
        config.dev_path.as_deref(),
    )?;

    let out_nb = team_dir.join("executed.ipynb");
    let run = NotebookRun {
        repo_dir: &team_dir,
        nb_relpath: &submission.nb_path,
        cell_timeout_secs: config.runner.notebook_timeout_secs,
        out_nb: &out_nb,
        extractor: config.runner.extractor.as_deref(),
        base_python: &config.runner.python,
    };
    execute_notebook(runner, &run, &env).await?;

    score_predictions(&config.hidden_labels, &env.out_path, &config.scoring)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
