use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use flatgit_repo::RepoConfig;

/// Invoked by git as `git-remote-flatgit <remote> [<url>]`.
#[derive(Debug, Parser)]
#[command(
    name = "git-remote-flatgit",
    about = "git remote helper for repositories stored in a key-value service",
    version
)]
pub struct Cli {
    /// Remote name, or the address itself when git has no named remote.
    pub remote: String,

    /// Storage connection string, `scheme://[id[:secret]@]bucket[:prefix]`.
    pub url: Option<String>,

    /// TOML repository settings; the URL argument overrides `location`.
    #[arg(long, env = "FLATGIT_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Named remote. Git passes a name only as the first of two differing
    /// arguments; a lone argument or a repeated address leaves it unnamed.
    pub fn remote_name(&self) -> Option<&str> {
        match &self.url {
            Some(url) if *url != self.remote => Some(&self.remote),
            _ => None,
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn repo_config(&self) -> anyhow::Result<RepoConfig> {
        let mut config = match &self.config {
            Some(path) => RepoConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
            None => RepoConfig::default(),
        };
        if let Some(address) = self.address() {
            config.location = address.to_string();
        }
        if config.location.is_empty() {
            bail!("no address for remote {:?}; pass a URL or set location in FLATGIT_CONFIG", self.remote);
        }
        Ok(config)
    }
}
