//! In-memory project tree with path-addressed, copy-on-write mutations.
//!
//! Nodes are stored in an id-keyed arena owned by a [`Tree`]. Paths are the
//! only public addressing mechanism; operations on paths that do not exist
//! degrade to no-ops or empty reads instead of failing.

mod node;
pub mod path;
mod tree;

pub use node::{FileNode, Node, NodeId, NodeKind};
pub use tree::{STARTER_CONTENT, STARTER_DIRECTORY, STARTER_FILE, Tree, WalkEntry};
