//! batch-score-submissions: grade course leaderboard submissions.
//!
//! Clones each team's repository, executes its notebook against the hidden
//! test set, scores the predictions, and maintains the leaderboard.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
