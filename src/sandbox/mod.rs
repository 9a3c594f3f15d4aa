//! Sandboxed execution of a small JavaScript subset.
//!
//! [`Engine::run`] parses a script, evaluates it against a fresh global scope
//! holding `console`, `Math`, `JSON` and a few other globals, and returns the
//! captured [`Transcript`]. Evaluation is bounded by [`ExecutionLimits`].
//!
//! The script cannot see host state, but this is not a security boundary.

mod ast;
mod builtins;
mod engine;
mod interpreter;
mod parser;
mod transcript;
mod value;

pub use engine::{Engine, ExecutionLimits};
pub use parser::CompileError;
pub use transcript::{Outcome, Severity, Transcript, TranscriptLine};
