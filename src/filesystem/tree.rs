use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::node::{FileNode, Node, NodeId, NodeKind};
use super::path;

pub const STARTER_DIRECTORY: &str = "src";
pub const STARTER_FILE: &str = "index.js";
pub const STARTER_CONTENT: &str = "// Start coding here...";

/// The level a path walk is positioned at: the root sequence or the children
/// of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Root,
    Directory(NodeId),
}

/// In-memory project tree.
///
/// Nodes live in an id-keyed arena; directories keep ordered child id lists.
/// Every mutation returns a new `Tree` and leaves `self` untouched: the index
/// is copied on write (a table of `Arc` pointers) and only the entries that
/// actually change are rebuilt, so readers of an older value never see a
/// half-applied edit.
///
/// Operations never fail. A path that addresses nothing reads as `""` and
/// makes mutations a no-op; the `try_*` variants expose whether the edit
/// landed.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    roots: Vec<NodeId>,
    nodes: Arc<HashMap<NodeId, Arc<Node>>>,
    next_id: u64,
}

/// One step of a depth-first walk over the tree.
#[derive(Debug, Clone)]
pub struct WalkEntry<'a> {
    pub path: String,
    pub depth: usize,
    pub id: NodeId,
    pub node: &'a Node,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// The project every new editor session starts with.
    pub fn starter() -> Self {
        Self::from_nodes(&[FileNode::directory(
            STARTER_DIRECTORY,
            vec![FileNode::file(STARTER_FILE, STARTER_CONTENT)],
        )])
    }

    /// Builds a tree from its nested form. Node kinds decide the shape:
    /// children of a file and content of a directory are dropped.
    pub fn from_nodes(nodes: &[FileNode]) -> Self {
        let mut table = HashMap::new();
        let mut next_id = 0;
        let roots = nodes
            .iter()
            .map(|node| Self::insert_nested(&mut table, &mut next_id, node))
            .collect();

        Self {
            roots,
            nodes: Arc::new(table),
            next_id,
        }
    }

    fn insert_nested(
        table: &mut HashMap<NodeId, Arc<Node>>,
        next_id: &mut u64,
        node: &FileNode,
    ) -> NodeId {
        let id = Self::allocate(next_id);
        let entry = match node.kind {
            NodeKind::File => Node::file(&node.name, node.content.clone().unwrap_or_default()),
            NodeKind::Directory => {
                let children = node
                    .children
                    .iter()
                    .flatten()
                    .map(|child| Self::insert_nested(table, next_id, child))
                    .collect();
                Node::directory(&node.name, children)
            }
        };
        table.insert(id, Arc::new(entry));
        id
    }

    fn allocate(next_id: &mut u64) -> NodeId {
        let id = NodeId::from(*next_id);
        *next_id += 1;
        id
    }

    /// Nested form of the whole tree, in display order.
    pub fn to_nodes(&self) -> Vec<FileNode> {
        self.roots
            .iter()
            .filter_map(|id| self.snapshot(*id))
            .collect()
    }

    fn snapshot(&self, id: NodeId) -> Option<FileNode> {
        let node = self.node(id)?;
        Some(match node.kind() {
            NodeKind::File => FileNode::file(node.name(), node.content().unwrap_or_default()),
            NodeKind::Directory => FileNode::directory(
                node.name(),
                node.children()
                    .iter()
                    .filter_map(|child| self.snapshot(*child))
                    .collect(),
            ),
        })
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id).map(Arc::as_ref)
    }

    /// Number of nodes in the tree, at any depth.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Finds the node a path addresses. Intermediate segments only match
    /// directories; the last segment matches the first sibling with that name.
    pub fn resolve(&self, path: &str) -> Option<NodeId> {
        let segments = path::split(path)?;
        let (leaf, parents) = segments.split_last()?;
        let level = self.resolve_level(parents)?;
        self.find_child(level, leaf)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    pub fn kind_of(&self, path: &str) -> Option<NodeKind> {
        self.resolve(path)
            .and_then(|id| self.node(id))
            .map(Node::kind)
    }

    /// Content of the file at `path`, `None` when no file lives there.
    pub fn try_read(&self, path: &str) -> Option<&str> {
        self.resolve(path)
            .and_then(|id| self.node(id))
            .and_then(Node::content)
    }

    /// Content of the file at `path`. A missing path reads as an empty string,
    /// indistinguishable from an empty file; use [`Tree::try_read`] when the
    /// difference matters.
    pub fn read(&self, path: &str) -> String {
        self.try_read(path).unwrap_or_default().to_string()
    }

    /// Replaces the content of an existing file. `None` when `path` does not
    /// name a file.
    pub fn try_update(&self, path: &str, content: impl Into<String>) -> Option<Tree> {
        let id = self.resolve(path)?;
        let replacement = self.node(id)?.with_content(content.into())?;

        let mut next = self.clone();
        next.put(id, replacement);
        Some(next)
    }

    pub fn update(&self, path: &str, content: impl Into<String>) -> Tree {
        match self.try_update(path, content) {
            Some(tree) => {
                debug!("Updated content of '{}'", path);
                tree
            }
            None => {
                debug!("Skipped update of '{}': no such file", path);
                self.clone()
            }
        }
    }

    /// Appends an empty node of `kind` under the parent directory of `path`.
    /// `None` when the parent does not exist or is not a directory. Sibling
    /// name clashes are not checked.
    pub fn try_create(&self, path: &str, kind: NodeKind) -> Option<Tree> {
        let (parents, leaf) = path::split_leaf(path)?;
        let level = self.resolve_level(&parents)?;

        let mut next = self.clone();
        let id = Self::allocate(&mut next.next_id);
        next.put(id, Node::empty(leaf, kind));
        let mut children = next.children_of(level).to_vec();
        children.push(id);
        next.set_children(level, children)?;
        Some(next)
    }

    pub fn create(&self, path: &str, kind: NodeKind) -> Tree {
        match self.try_create(path, kind) {
            Some(tree) => {
                debug!("Created {} '{}'", kind, path);
                tree
            }
            None => {
                debug!("Skipped creating {} '{}': parent directory missing", kind, path);
                self.clone()
            }
        }
    }

    /// Removes every node named like the last segment of `path` from its
    /// parent level, together with all descendants. `None` when nothing
    /// matched.
    pub fn try_delete(&self, path: &str) -> Option<Tree> {
        let (parents, leaf) = path::split_leaf(path)?;
        let level = self.resolve_level(&parents)?;

        let (doomed, kept): (Vec<NodeId>, Vec<NodeId>) = self
            .children_of(level)
            .iter()
            .copied()
            .partition(|id| self.node(*id).is_some_and(|node| node.name() == leaf));
        if doomed.is_empty() {
            return None;
        }

        let mut next = self.clone();
        next.set_children(level, kept)?;
        let table = Arc::make_mut(&mut next.nodes);
        for id in doomed.iter().flat_map(|id| self.subtree(*id)) {
            table.remove(&id);
        }
        Some(next)
    }

    pub fn delete(&self, path: &str) -> Tree {
        match self.try_delete(path) {
            Some(tree) => {
                debug!("Deleted '{}'", path);
                tree
            }
            None => {
                debug!("Skipped delete of '{}': nothing at path", path);
                self.clone()
            }
        }
    }

    /// Depth-first walk in display order.
    pub fn walk(&self) -> impl Iterator<Item = WalkEntry<'_>> {
        let mut entries = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(NodeId, String, usize)> = self
            .roots
            .iter()
            .rev()
            .map(|id| (*id, String::new(), 0))
            .collect();

        while let Some((id, parent, depth)) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            let path = path::join(&parent, node.name());
            stack.extend(
                node.children()
                    .iter()
                    .rev()
                    .map(|child| (*child, path.clone(), depth + 1)),
            );
            entries.push(WalkEntry {
                path,
                depth,
                id,
                node,
            });
        }

        entries.into_iter()
    }

    fn resolve_level(&self, segments: &[&str]) -> Option<Level> {
        segments.iter().try_fold(Level::Root, |level, segment| {
            self.children_of(level)
                .iter()
                .copied()
                .find(|id| {
                    self.node(*id)
                        .is_some_and(|node| node.is_directory() && node.name() == *segment)
                })
                .map(Level::Directory)
        })
    }

    fn find_child(&self, level: Level, name: &str) -> Option<NodeId> {
        self.children_of(level)
            .iter()
            .copied()
            .find(|id| self.node(*id).is_some_and(|node| node.name() == name))
    }

    fn children_of(&self, level: Level) -> &[NodeId] {
        match level {
            Level::Root => &self.roots,
            Level::Directory(id) => self.node(id).map(Node::children).unwrap_or_default(),
        }
    }

    fn set_children(&mut self, level: Level, children: Vec<NodeId>) -> Option<()> {
        match level {
            Level::Root => self.roots = children,
            Level::Directory(id) => {
                let replacement = self.node(id)?.with_children(children)?;
                self.put(id, replacement);
            }
        }
        Some(())
    }

    fn put(&mut self, id: NodeId, node: Node) {
        Arc::make_mut(&mut self.nodes).insert(id, Arc::new(node));
    }

    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.node(id) {
                stack.extend_from_slice(node.children());
            }
            ids.push(id);
        }
        ids
    }
}

/// Structural equality: names, kinds, contents and child order. Node ids are
/// an arena detail and do not take part.
impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.to_nodes() == other.to_nodes()
    }
}

impl Eq for Tree {}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.walk() {
            let suffix = if entry.node.is_directory() { "/" } else { "" };
            writeln!(
                f,
                "{}{}{}",
                "  ".repeat(entry.depth),
                entry.node.name(),
                suffix
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[fixture]
    fn starter() -> Tree {
        Tree::starter()
    }

    fn sample() -> Tree {
        Tree::from_nodes(&[
            FileNode::directory(
                "src",
                vec![
                    FileNode::file("index.js", "main"),
                    FileNode::directory("lib", vec![FileNode::file("util.js", "util")]),
                ],
            ),
            FileNode::file("README.md", "readme"),
        ])
    }

    #[rstest]
    fn starter_contains_index_file(starter: Tree) {
        assert_eq!(starter.read("src/index.js"), STARTER_CONTENT);
        assert_eq!(starter.kind_of("src"), Some(NodeKind::Directory));
        assert_eq!(starter.len(), 2);
    }

    #[rstest]
    #[case("missing.js")]
    #[case("src/missing.js")]
    #[case("src/lib/missing.js")]
    #[case("src/index.js/deeper")]
    #[case("nope/index.js")]
    #[case("")]
    #[case("src//index.js")]
    fn missing_paths_obey_no_op_laws(#[case] path: &str) {
        let tree = sample();
        assert_eq!(tree.read(path), "");
        assert_eq!(tree.try_read(path), None);
        assert_eq!(tree.update(path, "changed"), tree);
        assert!(tree.try_update(path, "changed").is_none());
        assert_eq!(tree.delete(path), tree);
        assert!(tree.try_delete(path).is_none());
    }

    #[rstest]
    #[case("src/index.js", "main")]
    #[case("src/lib/util.js", "util")]
    #[case("README.md", "readme")]
    #[case("src", "")]
    #[case("src/lib", "")]
    fn reads_files_by_path(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(sample().read(path), expected);
    }

    #[rstest]
    #[case("src/index.js")]
    #[case("src/lib/util.js")]
    #[case("README.md")]
    fn write_then_read_returns_written_content(#[case] path: &str) {
        let tree = sample();
        let updated = tree.update(path, "fresh");
        assert_eq!(updated.read(path), "fresh");
        assert_ne!(tree.read(path), "fresh");
    }

    #[test]
    fn update_leaves_other_files_alone() {
        let tree = sample().update("src/lib/util.js", "changed");
        assert_eq!(tree.read("src/index.js"), "main");
        assert_eq!(tree.read("README.md"), "readme");
    }

    #[test]
    fn update_of_directory_is_a_no_op() {
        let tree = sample();
        assert!(tree.try_update("src/lib", "text").is_none());
        assert_eq!(tree.update("src/lib", "text"), tree);
    }

    #[test]
    fn update_does_not_touch_the_previous_value() {
        let tree = sample();
        let _updated = tree.update("src/index.js", "new");
        assert_eq!(tree.read("src/index.js"), "main");
    }

    #[rstest]
    #[case("src/new.js")]
    #[case("src/lib/new.js")]
    #[case("new.js")]
    fn create_then_delete_restores_tree(#[case] path: &str) {
        let tree = sample();
        let created = tree.create(path, NodeKind::File);
        assert_ne!(created, tree);
        assert_eq!(created.try_read(path), Some(""));
        assert_eq!(created.delete(path), tree);
    }

    #[test]
    fn directory_then_file_creation() {
        let tree = Tree::starter()
            .create("src/components", NodeKind::Directory)
            .create("src/components/x", NodeKind::File);

        assert_eq!(tree.read("src/components/x"), "");
        let dir = tree.resolve("src/components").unwrap();
        let children = tree.node(dir).unwrap().children();
        assert_eq!(children.len(), 1);
        assert_eq!(tree.node(children[0]).unwrap().name(), "x");
    }

    #[test]
    fn create_appends_after_existing_children() {
        let tree = sample().create("src/z.js", NodeKind::File);
        let names: Vec<_> = tree
            .walk()
            .filter(|entry| entry.depth == 1 && entry.path.starts_with("src/"))
            .map(|entry| entry.node.name().to_string())
            .collect();
        assert_eq!(names, vec!["index.js", "lib", "z.js"]);
    }

    #[rstest]
    #[case("missing/new.js")]
    #[case("README.md/new.js")]
    #[case("src/index.js/new.js")]
    #[case("src/")]
    fn create_without_parent_directory_is_a_no_op(#[case] path: &str) {
        let tree = sample();
        assert!(tree.try_create(path, NodeKind::File).is_none());
        assert_eq!(tree.create(path, NodeKind::File), tree);
    }

    #[test]
    fn create_allows_duplicate_names() {
        let tree = sample().create("README.md", NodeKind::File);
        assert_eq!(tree.roots().len(), 3);
        // first match wins on reads
        assert_eq!(tree.read("README.md"), "readme");
    }

    #[test]
    fn delete_removes_whole_subtree() {
        let tree = sample();
        let deleted = tree.delete("src");
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted.read("src/lib/util.js"), "");
        assert_eq!(deleted.read("README.md"), "readme");
    }

    #[test]
    fn delete_removes_all_siblings_with_the_name() {
        let tree = sample()
            .create("src/dup", NodeKind::File)
            .create("src/dup", NodeKind::Directory);
        let deleted = tree.delete("src/dup");
        assert!(!deleted.contains("src/dup"));
        assert_eq!(deleted, sample());
    }

    #[test]
    fn nested_round_trip_preserves_structure() {
        let tree = sample();
        assert_eq!(Tree::from_nodes(&tree.to_nodes()), tree);
        assert_eq!(tree.to_nodes().len(), 2);
    }

    #[test]
    fn walk_is_depth_first_in_display_order() {
        let paths: Vec<_> = sample().walk().map(|entry| entry.path).collect();
        assert_eq!(
            paths,
            vec![
                "src",
                "src/index.js",
                "src/lib",
                "src/lib/util.js",
                "README.md"
            ]
        );
    }

    #[test]
    fn display_renders_indented_listing() {
        assert_eq!(
            sample().to_string(),
            "src/\n  index.js\n  lib/\n    util.js\nREADME.md\n"
        );
    }

    #[test]
    fn node_ids_are_not_reused_after_delete() {
        let tree = sample().delete("README.md").create("README.md", NodeKind::File);
        let ids: Vec<_> = tree.walk().map(|entry| entry.id).collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn tree_values_can_cross_threads() {
        let tree = sample();
        let handle = std::thread::spawn(move || tree.read("src/index.js"));
        assert_eq!(handle.join().unwrap(), "main");
    }
}
