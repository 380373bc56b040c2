use std::io::{self, BufWriter};

use anyhow::Context;
use clap::Parser;
use flatgit_repo::Repository;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod error;
mod session;

/// Log filter variable; stdout belongs to git, so logs go to stderr.
const LOG_ENV: &str = "FLATGIT_LOG";

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = cli::Cli::parse();
    debug!(pid = std::process::id(), remote = ?cli.remote_name(), "spawned");
    let config = cli.repo_config()?;
    let repo = Repository::open(&config)
        .with_context(|| format!("opening repository for remote {:?}", cli.remote))?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut input = stdin.lock();
    let mut output = BufWriter::new(stdout.lock());
    let mut session = session::Session::new(&repo);
    if let Err(e) = session.run(&mut input, &mut output) {
        error!(error = %e, "session failed");
        return Err(e.into());
    }
    Ok(())
}
