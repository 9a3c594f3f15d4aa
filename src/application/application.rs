use std::path::Path;

use compio::fs;
use snafu::Snafu;
use snafu::prelude::*;
use tracing::{debug, info};

use super::RuntimeConfig;
use super::output::print_transcript;
use crate::assistant::StructureNode;
use crate::cli::Command;
use crate::config::{ConfigError, IdeConfig};
use crate::filesystem::NodeKind;
use crate::project::{ProjectDocument, ProjectError};
use crate::sandbox::{Engine, Outcome, Transcript};
use crate::workspace::Workspace;

pub struct Application;

impl Application {
    pub async fn run(runtime: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let runtime: RuntimeConfig = runtime.into();
        let config = match &runtime.config {
            Some(path) => IdeConfig::from_path(path.clone()).await,
            None => IdeConfig::read(&runtime.root).await,
        }
        .context(ConfigSnafu)?;
        debug!("Loaded config: {:?}", config);
        let engine = Engine::new(config.limits);

        match runtime.command {
            Command::New { force } => {
                if !force && fs::metadata(&runtime.project).await.is_ok() {
                    return ProjectExistsSnafu {
                        file_path: runtime.project.display().to_string(),
                    }
                    .fail();
                }
                let workspace = Workspace::new(engine, config.editor);
                save_workspace(&workspace, &runtime.project).await?;
                info!("Wrote starter project to {}", runtime.project.display());
            }
            Command::Exec { source } => report(engine.run(&source))?,
            command => {
                let mut workspace = load_workspace(&runtime.project, engine).await?;
                if apply(&mut workspace, command).await? {
                    save_workspace(&workspace, &runtime.project).await?;
                }
            }
        }
        Ok(())
    }
}

/// Runs a project command. Returns whether the project changed.
async fn apply(workspace: &mut Workspace, command: Command) -> Result<bool, ApplicationError> {
    match command {
        Command::Tree => {
            print!("{}", workspace.tree());
            Ok(false)
        }
        Command::Cat { path } => {
            let content = workspace
                .tree()
                .try_read(&path)
                .context(NoSuchFileSnafu { path: path.clone() })?;
            println!("{content}");
            Ok(false)
        }
        Command::Write { path, content } => {
            ensure!(workspace.write(&path, &content), NoSuchFileSnafu { path });
            Ok(true)
        }
        Command::Create { path, directory } => {
            let kind = if directory {
                NodeKind::Directory
            } else {
                NodeKind::File
            };
            ensure!(workspace.create(&path, kind), CreateRefusedSnafu { path });
            Ok(true)
        }
        Command::Rm { path } => {
            ensure!(workspace.delete(&path), NothingAtPathSnafu { path });
            Ok(true)
        }
        Command::Run { path } => {
            let path = path.unwrap_or_else(Workspace::default_file);
            ensure!(
                workspace.tree().try_read(&path).is_some(),
                NoSuchFileSnafu { path: path.clone() }
            );
            report(workspace.run(&path))?;
            Ok(false)
        }
        Command::Scaffold { structure } => {
            let nodes = read_structure(&structure).await?;
            let created = workspace.apply_structure(&nodes);
            println!("Created {created} nodes");
            Ok(created > 0)
        }
        Command::New { .. } | Command::Exec { .. } => Ok(false),
    }
}

fn report(transcript: Transcript) -> Result<(), ApplicationError> {
    print_transcript(&transcript);
    let outcome = transcript.outcome();
    ensure!(outcome == Outcome::Completed, ScriptFailedSnafu { outcome });
    Ok(())
}

async fn read_text(path: &Path) -> Result<String, ApplicationError> {
    let file_path = path.display().to_string();
    let bytes = fs::read(path).await.context(ReadSnafu {
        file_path: file_path.clone(),
    })?;
    String::from_utf8(bytes).context(EncodingSnafu { file_path })
}

async fn load_workspace(path: &Path, engine: Engine) -> Result<Workspace, ApplicationError> {
    let text = read_text(path).await?;
    let document = ProjectDocument::from_json(&text).context(InvalidProjectSnafu {
        file_path: path.display().to_string(),
    })?;
    Ok(Workspace::from_document(document, engine))
}

async fn save_workspace(workspace: &Workspace, path: &Path) -> Result<(), ApplicationError> {
    let json = workspace.export_json().context(InvalidProjectSnafu {
        file_path: path.display().to_string(),
    })?;
    fs::write(path, json.into_bytes())
        .await
        .0
        .context(WriteSnafu {
            file_path: path.display().to_string(),
        })?;
    debug!("Saved project to {}", path.display());
    Ok(())
}

async fn read_structure(path: &Path) -> Result<Vec<StructureNode>, ApplicationError> {
    let text = read_text(path).await?;
    serde_json::from_str(&text).context(MalformedStructureSnafu {
        file_path: path.display().to_string(),
    })
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered during configuration stage"))]
    ConfigError { source: ConfigError },
    #[snafu(display("Failed to read {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("{} is not valid UTF-8", file_path))]
    EncodingError {
        file_path: String,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Failed to write {}", file_path))]
    WriteError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Invalid project document {}", file_path))]
    InvalidProject {
        file_path: String,
        source: ProjectError,
    },
    #[snafu(display("{} already exists, pass --force to replace it", file_path))]
    ProjectExists { file_path: String },
    #[snafu(display("{} is not a generated file structure", file_path))]
    MalformedStructure {
        file_path: String,
        source: serde_json::Error,
    },
    #[snafu(display("No file at '{}'", path))]
    NoSuchFile { path: String },
    #[snafu(display("Nothing at '{}'", path))]
    NothingAtPath { path: String },
    #[snafu(display("Cannot create '{}'", path))]
    CreateRefused { path: String },
    #[snafu(display("Script {}", outcome))]
    ScriptFailed { outcome: Outcome },
}
