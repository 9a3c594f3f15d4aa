mod cli;

pub use cli::{Cli, Command, DEFAULT_PROJECT_FILE};
