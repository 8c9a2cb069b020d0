//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use coursegrade_core::pipeline::{BatchConfig, BatchResult, ProgressReporter, run_batch};
use coursegrade_leaderboard::LeaderboardRecord;
use coursegrade_shared::{AppConfig, Submission, init_config, load_config, resolve_config_path};
use coursegrade_site::{SiteOptions, build_site};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Grade course leaderboard submissions against hidden test data.
///
/// Without a subcommand, runs the batch: every team in the submissions file
/// is cloned, executed, scored, and written to the leaderboard.
#[derive(Parser)]
#[command(
    name = "batch-score-submissions",
    version,
    about = "Grade course leaderboard submissions against hidden test data.",
    long_about = None,
    subcommand_negates_reqs = true,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./coursegrade.toml, then ~/.coursegrade/coursegrade.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub batch: BatchArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Flags for the batch run.
#[derive(Args, Debug)]
pub(crate) struct BatchArgs {
    /// CSV with team repo refs (team, repo_url, ref, nb_path).
    #[arg(long, required = true)]
    pub submissions: Option<PathBuf>,

    /// Faculty-only features CSV (includes row_id).
    #[arg(long, required = true)]
    pub hidden_test: Option<PathBuf>,

    /// Faculty-only labels CSV (row_id, readmit30).
    #[arg(long, required = true)]
    pub hidden_labels: Option<PathBuf>,

    /// Override for TRAIN_PATH passed to notebooks.
    #[arg(long)]
    pub train_path: Option<PathBuf>,

    /// Override for DEV_PATH passed to notebooks.
    #[arg(long)]
    pub dev_path: Option<PathBuf>,

    /// Per-cell notebook timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Where to check out repos.
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Create a per-team virtualenv for isolation (slower).
    #[arg(long)]
    pub use_venv: bool,

    /// Base python to use.
    #[arg(long)]
    pub python: Option<String>,

    /// Leaderboard CSV to update.
    #[arg(long)]
    pub leaderboard: Option<PathBuf>,

    /// Rebuild the leaderboard page after scoring.
    #[arg(long)]
    pub make_site: bool,

    /// Output path for the leaderboard page.
    #[arg(long)]
    pub site_out: Option<PathBuf>,

    /// Script that trims each notebook to its submission section before execution.
    #[arg(long)]
    pub extractor: Option<PathBuf>,
}

impl BatchArgs {
    /// True when no batch flag at all was given.
    fn is_empty(&self) -> bool {
        let Self {
            submissions,
            hidden_test,
            hidden_labels,
            train_path,
            dev_path,
            timeout,
            workdir,
            use_venv,
            python,
            leaderboard,
            make_site,
            site_out,
            extractor,
        } = self;

        [
            submissions,
            hidden_test,
            hidden_labels,
            train_path,
            dev_path,
            workdir,
            leaderboard,
            site_out,
            extractor,
        ]
        .iter()
        .all(|p| p.is_none())
            && timeout.is_none()
            && python.is_none()
            && !use_venv
            && !make_site
    }
}

/// Subcommands besides the default batch run.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Rebuild the leaderboard page from the leaderboard CSV.
    Site {
        /// Leaderboard CSV to render.
        #[arg(long)]
        leaderboard: Option<PathBuf>,

        /// Output HTML file.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Score a single predictions file against the hidden labels.
    Evaluate {
        /// Hidden labels CSV.
        #[arg(long)]
        labels: PathBuf,

        /// Predictions CSV.
        #[arg(long)]
        predictions: PathBuf,

        /// Print the scores as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize the user config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

const LOG_TARGETS: [&str; 6] = [
    "batch_score_submissions",
    "coursegrade_core",
    "coursegrade_shared",
    "coursegrade_scoring",
    "coursegrade_leaderboard",
    "coursegrade_site",
];

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Some(Command::Config {
        action: ConfigAction::Init,
    }) = &cli.command
    {
        return cmd_config_init().await;
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        None => cmd_batch(&config, cli.batch).await,
        Some(_) if !cli.batch.is_empty() => Err(eyre!(
            "batch flags (--submissions, --make-site, --workdir, ...) cannot be combined with a subcommand"
        )),
        Some(Command::Site { leaderboard, out }) => {
            cmd_site(&config, leaderboard.as_deref(), out.as_deref()).await
        }
        Some(Command::Evaluate {
            labels,
            predictions,
            json,
        }) => cmd_evaluate(&config, &labels, &predictions, json).await,
        Some(Command::Config { action }) => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config, cli.config.as_deref()).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Merge CLI flags over the loaded config. Flags win.
fn batch_config(config: &AppConfig, args: BatchArgs) -> Result<BatchConfig> {
    let submissions = args
        .submissions
        .ok_or_else(|| eyre!("--submissions is required"))?;
    let hidden_test = args
        .hidden_test
        .ok_or_else(|| eyre!("--hidden-test is required"))?;
    let hidden_labels = args
        .hidden_labels
        .ok_or_else(|| eyre!("--hidden-labels is required"))?;

    let mut runner = config.runner.clone();
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err(eyre!("--timeout must be greater than zero"));
        }
        runner.notebook_timeout_secs = timeout;
    }
    if let Some(python) = args.python {
        runner.python = python;
    }
    runner.use_venv |= args.use_venv;
    if args.extractor.is_some() {
        runner.extractor = args.extractor;
    }

    let leaderboard = args
        .leaderboard
        .unwrap_or_else(|| config.paths.leaderboard.clone());

    Ok(BatchConfig {
        submissions,
        hidden_test,
        hidden_labels,
        train_path: args.train_path,
        dev_path: args.dev_path,
        workdir: args.workdir.unwrap_or_else(|| config.paths.workdir.clone()),
        site: SiteOptions::new(&config.site, &leaderboard),
        leaderboard,
        make_site: args.make_site,
        site_out: args.site_out.unwrap_or_else(|| config.paths.site_out.clone()),
        runner,
        scoring: config.scoring.clone(),
    })
}

async fn cmd_batch(config: &AppConfig, args: BatchArgs) -> Result<()> {
    let batch = batch_config(config, args)?;

    info!(
        submissions = %batch.submissions.display(),
        workdir = %batch.workdir.display(),
        use_venv = batch.runner.use_venv,
        "grading submissions"
    );

    let reporter = CliProgress::new();
    let result = run_batch(&batch, &reporter).await?;

    println!();
    println!("  Graded:  {}", result.records.len());
    println!("  OK:      {}", result.ok);
    println!("  Errors:  {}", result.failed);
    println!("  Time:    {:.1}s", result.elapsed.as_secs_f64());
    if let Some(site) = &result.site {
        println!("  Site:    {}", site.path.display());
    }
    println!();
    println!("Done. Leaderboard: {}", result.leaderboard.display());

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn team_started(&self, submission: &Submission, current: usize, total: usize) {
        self.spinner
            .println(format!("== {} :: {} ==", submission.team, submission.git_ref));
        self.spinner.set_message(format!(
            "Grading [{current}/{total}] {}",
            submission.team
        ));
    }

    fn team_finished(&self, record: &LeaderboardRecord) {
        let line = match record.auroc {
            Some(auroc) if record.status.is_ok() => format!(
                "  OK: auroc={auroc:.4} auprc={:.4} brier={:.4} n={}",
                record.auprc.unwrap_or(f64::NAN),
                record.brier.unwrap_or(f64::NAN),
                record.n.unwrap_or_default()
            ),
            _ => format!("  {}: {}", record.status, record.notes),
        };
        self.spinner.println(line);
    }

    fn done(&self, _result: &BatchResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Other commands
// ---------------------------------------------------------------------------

async fn cmd_site(config: &AppConfig, leaderboard: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let leaderboard = leaderboard.unwrap_or(config.paths.leaderboard.as_path());
    let out = out.unwrap_or(config.paths.site_out.as_path());
    let opts = SiteOptions::new(&config.site, leaderboard);

    let result = build_site(leaderboard, out, &opts)?;
    if result.rows == 0 {
        println!("Wrote {} (empty)", result.path.display());
    } else {
        println!("Wrote {} ({} rows)", result.path.display(), result.rows);
    }
    Ok(())
}

async fn cmd_evaluate(
    config: &AppConfig,
    labels: &Path,
    predictions: &Path,
    json: bool,
) -> Result<()> {
    let scores = coursegrade_scoring::score_predictions(labels, predictions, &config.scoring)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scores)?);
    } else {
        println!("  AUROC:  {:.4}", scores.auroc);
        println!("  AUPRC:  {:.4}", scores.auprc);
        println!("  Brier:  {:.4}", scores.brier);
        println!("  Rows:   {}", scores.n);
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig, explicit: Option<&Path>) -> Result<()> {
    match resolve_config_path(explicit)? {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# no config file found, showing defaults"),
    }
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn batch_flags_parse() {
        let cli = Cli::try_parse_from([
            "batch-score-submissions",
            "--submissions",
            "faculty/submissions.csv",
            "--hidden-test",
            "hidden_test.csv",
            "--hidden-labels",
            "hidden_labels.csv",
            "--train-path",
            "data/train.csv",
            "--dev-path",
            "data/dev.csv",
            "--workdir",
            "grading",
            "--make-site",
        ])
        .unwrap();

        assert!(cli.command.is_none());
        assert!(cli.batch.make_site);
        assert_eq!(cli.batch.workdir, Some(PathBuf::from("grading")));

        let batch = batch_config(&AppConfig::default(), cli.batch).unwrap();
        assert_eq!(batch.train_path, Some(PathBuf::from("data/train.csv")));
        assert_eq!(batch.workdir, PathBuf::from("grading"));
        assert_eq!(batch.runner.notebook_timeout_secs, 1200);
        assert_eq!(batch.leaderboard, AppConfig::default().paths.leaderboard);
    }

    #[test]
    fn batch_requires_hidden_data() {
        let result = Cli::try_parse_from([
            "batch-score-submissions",
            "--submissions",
            "submissions.csv",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn subcommands_do_not_need_batch_flags() {
        let cli = Cli::try_parse_from(["batch-score-submissions", "site", "--out", "x.html"])
            .unwrap();
        assert!(matches!(cli.command, Some(Command::Site { .. })));
        assert!(cli.batch.is_empty());
    }

    #[test]
    fn optional_batch_flags_count_as_batch_usage() {
        let cli = Cli::try_parse_from([
            "batch-score-submissions",
            "--make-site",
            "--workdir",
            "x",
            "site",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Site { .. })));
        assert!(!cli.batch.is_empty());

        let cli =
            Cli::try_parse_from(["batch-score-submissions", "--timeout", "5", "site"]).unwrap();
        assert!(!cli.batch.is_empty());
    }

    #[test]
    fn flags_override_config() {
        let mut config = AppConfig::default();
        config.runner.python = "/opt/py/bin/python".into();
        config.runner.use_venv = true;

        let cli = Cli::try_parse_from([
            "batch-score-submissions",
            "--submissions",
            "s.csv",
            "--hidden-test",
            "t.csv",
            "--hidden-labels",
            "l.csv",
            "--timeout",
            "60",
            "--python",
            "python3.12",
        ])
        .unwrap();

        let batch = batch_config(&config, cli.batch).unwrap();
        assert_eq!(batch.runner.notebook_timeout_secs, 60);
        assert_eq!(batch.runner.python, "python3.12");
        assert!(batch.runner.use_venv);
    }
}
