use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::data::LogLevel;

pub const DEFAULT_PROJECT_FILE: &str = "web-ide-project.json";

/// Edit and run exported web IDE projects from the terminal.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[clap(long, short, default_value = "warn", value_enum, global = true)]
    pub log_level: LogLevel,

    /// Config file to use instead of scratchpad.yaml in the root directory
    #[clap(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// The root directory of the project
    #[clap(long, short, default_value = ".", global = true)]
    pub root: PathBuf,

    /// Project document, relative to the root directory
    #[clap(long, short, default_value = DEFAULT_PROJECT_FILE, global = true)]
    pub project: PathBuf,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write a starter project document
    New {
        /// Replace an existing document
        #[clap(long)]
        force: bool,
    },
    /// Print the project tree
    Tree,
    /// Print the content of a file
    Cat { path: String },
    /// Replace the content of a file
    Write { path: String, content: String },
    /// Add an empty file or directory
    Create {
        path: String,
        #[clap(long, short)]
        directory: bool,
    },
    /// Remove a file or directory with everything below it
    Rm { path: String },
    /// Run a file of the project in the sandbox
    Run {
        /// Defaults to src/index.js
        path: Option<String>,
    },
    /// Run a script given on the command line
    Exec { source: String },
    /// Add the nodes of a generated structure (a JSON file) that are missing
    Scaffold { structure: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_options_after_the_subcommand() {
        let cli = Cli::try_parse_from(["scratchpad", "run", "src/app.js", "-l", "debug"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Run {
                path: Some("src/app.js".into())
            }
        );
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.project, PathBuf::from(DEFAULT_PROJECT_FILE));
    }

    #[test]
    fn create_takes_a_directory_flag() {
        let cli =
            Cli::try_parse_from(["scratchpad", "-p", "p.json", "create", "-d", "lib"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Create {
                path: "lib".into(),
                directory: true
            }
        );
        assert_eq!(cli.project, PathBuf::from("p.json"));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["scratchpad"]).is_err());
    }
}
