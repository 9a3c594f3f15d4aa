use std::path::PathBuf;

use crate::cli::{Cli, Command};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub command: Command,
    pub root: PathBuf,
    pub config: Option<PathBuf>,
    /// Resolved against `root`.
    pub project: PathBuf,
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            command: cli.command,
            project: cli.root.join(&cli.project),
            config: cli.config,
            root: cli.root,
        }
    }
}
