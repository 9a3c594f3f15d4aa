use std::collections::HashSet;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tracing::debug;

use super::settings::EditorSettings;
use crate::filesystem::{FileNode, NodeKind, Tree, path};

#[derive(Debug, Snafu)]
pub enum ProjectError {
    #[snafu(display("Project document is malformed"))]
    MalformedImport { source: serde_json::Error },
    #[snafu(display("Invalid node '{}': {}", path, problem))]
    InvalidNode { path: String, problem: NodeProblem },
    #[snafu(display("'{}' appears more than once in the same directory", path))]
    DuplicateName { path: String },
    #[snafu(display("Failed to serialise project document"))]
    ExportFailed { source: serde_json::Error },
}

/// Structural defects a single imported node can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum NodeProblem {
    #[display("name is empty")]
    EmptyName,
    #[display("name contains '/'")]
    NameWithSeparator,
    #[display("a file cannot have children")]
    FileWithChildren,
    #[display("a directory cannot have content")]
    DirectoryWithContent,
}

/// Exported project: the nested file tree plus the editor settings.
///
/// ```json
/// {
///   "files": [ { "name": "src", "type": "directory", "children": [ ... ] } ],
///   "settings": { "language": "javascript", "theme": "vs-dark" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub files: Vec<FileNode>,
    pub settings: EditorSettings,
}

impl ProjectDocument {
    pub fn new(tree: &Tree, settings: EditorSettings) -> Self {
        Self {
            files: tree.to_nodes(),
            settings,
        }
    }

    /// Parses and validates an exported document.
    pub fn from_json(text: &str) -> Result<Self, ProjectError> {
        let document: Self = serde_json::from_str(text).context(MalformedImportSnafu)?;
        validate_level(&document.files, "")?;
        debug!(
            "Imported project with {} top-level entries",
            document.files.len()
        );
        Ok(document)
    }

    /// Pretty-printed JSON with two-space indentation. Refuses documents that
    /// [`ProjectDocument::from_json`] would reject, such as a tree built with
    /// [`Tree::create`] that holds two siblings of the same name.
    pub fn to_json(&self) -> Result<String, ProjectError> {
        validate_level(&self.files, "")?;
        serde_json::to_string_pretty(self).context(ExportFailedSnafu)
    }

    pub fn tree(&self) -> Tree {
        Tree::from_nodes(&self.files)
    }
}

fn validate_level(nodes: &[FileNode], parent: &str) -> Result<(), ProjectError> {
    let mut names = HashSet::new();
    for node in nodes {
        let node_path = path::join(parent, &node.name);
        let problem = if node.name.is_empty() {
            Some(NodeProblem::EmptyName)
        } else if node.name.contains(path::SEPARATOR) {
            Some(NodeProblem::NameWithSeparator)
        } else {
            match node.kind {
                NodeKind::File if node.children.is_some() => Some(NodeProblem::FileWithChildren),
                NodeKind::Directory if node.content.is_some() => {
                    Some(NodeProblem::DirectoryWithContent)
                }
                _ => None,
            }
        };
        if let Some(problem) = problem {
            return InvalidNodeSnafu {
                path: node_path,
                problem,
            }
            .fail();
        }

        if !names.insert(node.name.as_str()) {
            return DuplicateNameSnafu { path: node_path }.fail();
        }
        if let Some(children) = &node.children {
            validate_level(children, &node_path)?;
        }
    }
    Ok(())
}
