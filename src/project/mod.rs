mod document;
mod settings;

pub use document::{NodeProblem, ProjectDocument, ProjectError};
pub use settings::{EditorSettings, Language, Theme};
