use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Stable identifier of a node inside a [`Tree`](super::Tree) arena.
///
/// Ids are never reused within one tree lineage, so an id taken from an older
/// tree value never aliases a different node in a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
pub struct NodeId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[display("file")]
    File,
    #[display("directory")]
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeBody {
    File { content: String },
    Directory { children: Vec<NodeId> },
}

/// One arena entry: a named file with content or a named directory holding
/// the ids of its children in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    body: NodeBody,
}

impl Node {
    pub(crate) fn file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: NodeBody::File {
                content: content.into(),
            },
        }
    }

    pub(crate) fn directory(name: impl Into<String>, children: Vec<NodeId>) -> Self {
        Self {
            name: name.into(),
            body: NodeBody::Directory { children },
        }
    }

    pub(crate) fn empty(name: impl Into<String>, kind: NodeKind) -> Self {
        match kind {
            NodeKind::File => Self::file(name, String::new()),
            NodeKind::Directory => Self::directory(name, Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::File { .. } => NodeKind::File,
            NodeBody::Directory { .. } => NodeKind::Directory,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind() == NodeKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind() == NodeKind::Directory
    }

    /// File content, `None` for directories.
    pub fn content(&self) -> Option<&str> {
        match &self.body {
            NodeBody::File { content } => Some(content),
            NodeBody::Directory { .. } => None,
        }
    }

    /// Child ids in display order. Always empty for files.
    pub fn children(&self) -> &[NodeId] {
        match &self.body {
            NodeBody::File { .. } => &[],
            NodeBody::Directory { children } => children,
        }
    }

    /// Returns a copy of this file with its content replaced, or `None` for a
    /// directory.
    pub(crate) fn with_content(&self, content: String) -> Option<Self> {
        match self.body {
            NodeBody::File { .. } => Some(Self::file(self.name.clone(), content)),
            NodeBody::Directory { .. } => None,
        }
    }

    /// Returns a copy of this directory with a new child list, or `None` for a
    /// file.
    pub(crate) fn with_children(&self, children: Vec<NodeId>) -> Option<Self> {
        match self.body {
            NodeBody::File { .. } => None,
            NodeBody::Directory { .. } => Some(Self::directory(self.name.clone(), children)),
        }
    }
}

/// Nested, serialisable form of a node as it appears in exported projects:
///
/// ```json
/// { "name": "src", "type": "directory", "children": [
///     { "name": "index.js", "type": "file", "content": "// Start coding here..." }
/// ] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

impl FileNode {
    pub fn file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File,
            content: Some(content.into()),
            children: None,
        }
    }

    pub fn directory(name: impl Into<String>, children: Vec<FileNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Directory,
            content: None,
            children: Some(children),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_node_serializes_with_type_tag() {
        let node = FileNode::directory("src", vec![FileNode::file("a.js", "1")]);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "directory");
        assert_eq!(json["children"][0]["type"], "file");
        assert_eq!(json["children"][0]["content"], "1");
        assert!(json.get("content").is_none());
    }

    #[test]
    fn directory_has_no_content_and_file_has_no_children() {
        let file = Node::file("a", "x");
        let dir = Node::directory("d", vec![NodeId::from(3)]);
        assert!(file.children().is_empty());
        assert_eq!(dir.content(), None);
        assert!(dir.with_content("y".into()).is_none());
        assert!(file.with_children(vec![]).is_none());
    }
}
