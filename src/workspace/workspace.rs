use tracing::{debug, info, warn};

use crate::assistant::{
    Assistant, AssistantError, PlanStep, ProjectType, Provider, StructureNode, Transport,
};
use crate::filesystem::{NodeKind, STARTER_DIRECTORY, STARTER_FILE, Tree, path};
use crate::project::{EditorSettings, ProjectDocument, ProjectError};
use crate::sandbox::{Engine, Transcript};

/// A development plan step together with its completion mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanItem {
    pub step: PlanStep,
    pub completed: bool,
}

/// Single-writer editing session: the project tree, the file being edited,
/// the editor settings, the development plan and the engine that runs code.
#[derive(Debug)]
pub struct Workspace {
    tree: Tree,
    settings: EditorSettings,
    current: String,
    plan: Vec<PlanItem>,
    engine: Engine,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(Engine::default(), EditorSettings::default())
    }
}

impl Workspace {
    /// Path selected in a fresh or freshly imported workspace.
    pub fn default_file() -> String {
        path::join(STARTER_DIRECTORY, STARTER_FILE)
    }

    /// Starts from the starter project.
    pub fn new(engine: Engine, settings: EditorSettings) -> Self {
        Self::with_tree(Tree::starter(), settings, engine)
    }

    pub fn from_document(document: ProjectDocument, engine: Engine) -> Self {
        Self::with_tree(document.tree(), document.settings, engine)
    }

    fn with_tree(tree: Tree, settings: EditorSettings, engine: Engine) -> Self {
        Self {
            tree,
            settings,
            current: Self::default_file(),
            plan: Vec::new(),
            engine,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn settings(&self) -> EditorSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: EditorSettings) {
        self.settings = settings;
    }

    pub fn current_file(&self) -> &str {
        &self.current
    }

    pub fn current_content(&self) -> String {
        self.tree.read(&self.current)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Makes `path` the current file and returns its content.
    pub fn select(&mut self, path: &str) -> String {
        self.current = path.to_string();
        self.current_content()
    }

    /// Writes `content` into the current file. `false` when the current path
    /// does not name a file.
    pub fn save(&mut self, content: &str) -> bool {
        self.write(&self.current.clone(), content)
    }

    pub fn write(&mut self, path: &str, content: &str) -> bool {
        match self.tree.try_update(path, content) {
            Some(tree) => {
                self.tree = tree;
                debug!("Saved '{}'", path);
                true
            }
            None => {
                warn!("Cannot save '{}': no such file", path);
                false
            }
        }
    }

    /// Adds an empty node. A path that already exists is refused. A newly
    /// created file becomes the current file.
    pub fn create(&mut self, path: &str, kind: NodeKind) -> bool {
        if self.tree.contains(path) {
            warn!("Cannot create '{}': it already exists", path);
            return false;
        }
        let Some(tree) = self.tree.try_create(path, kind) else {
            warn!("Cannot create '{}': parent directory missing", path);
            return false;
        };
        self.tree = tree;
        info!("Created {} '{}'", kind, path);
        if kind == NodeKind::File {
            self.current = path.to_string();
        }
        true
    }

    /// Removes `path` and its descendants. When that takes the current file
    /// away, the selection falls back to the default file.
    pub fn delete(&mut self, path: &str) -> bool {
        let Some(tree) = self.tree.try_delete(path) else {
            warn!("Cannot delete '{}': nothing at path", path);
            return false;
        };
        self.tree = tree;
        info!("Deleted '{}'", path);
        if !self.tree.contains(&self.current) {
            debug!("Current file '{}' went away", self.current);
            self.current = Self::default_file();
        }
        true
    }

    pub fn run_current(&self) -> Transcript {
        self.run(&self.current)
    }

    pub fn run(&self, path: &str) -> Transcript {
        debug!("Running '{}'", path);
        self.engine.run(&self.tree.read(path))
    }

    /// Replaces the current file's content with generated code.
    pub fn apply_code(&mut self, code: &str) -> bool {
        self.save(code)
    }

    /// Replaces the plan; every step starts uncompleted.
    pub fn apply_plan(&mut self, steps: Vec<PlanStep>) {
        self.plan = steps
            .into_iter()
            .map(|step| PlanItem {
                step,
                completed: false,
            })
            .collect();
    }

    pub fn plan(&self) -> &[PlanItem] {
        &self.plan
    }

    /// Flips the completion mark of one step. `false` for an index past the
    /// end of the plan.
    pub fn toggle_step(&mut self, index: usize) -> bool {
        match self.plan.get_mut(index) {
            Some(item) => {
                item.completed = !item.completed;
                true
            }
            None => false,
        }
    }

    /// Creates the nodes of a generated structure that are not in the tree
    /// yet. Existing nodes are kept as they are. Returns how many nodes were
    /// created.
    pub fn apply_structure(&mut self, nodes: &[StructureNode]) -> usize {
        let created = self.materialise("", nodes);
        info!("Materialised {} nodes from generated structure", created);
        created
    }

    fn materialise(&mut self, parent: &str, nodes: &[StructureNode]) -> usize {
        let mut created = 0;
        for node in nodes {
            if node.name.is_empty() || node.name.contains(path::SEPARATOR) {
                warn!("Skipping generated node with invalid name '{}'", node.name);
                continue;
            }
            let node_path = path::join(parent, &node.name);
            if !self.tree.contains(&node_path) {
                match self.tree.try_create(&node_path, node.kind) {
                    Some(tree) => {
                        self.tree = tree;
                        created += 1;
                    }
                    None => {
                        warn!("Cannot create generated '{}'", node_path);
                        continue;
                    }
                }
            }
            created += self.materialise(&node_path, &node.children);
        }
        created
    }

    /// Replaces tree and settings with an exported document. On error the
    /// workspace is left untouched.
    pub fn import_json(&mut self, text: &str) -> Result<(), ProjectError> {
        let document = ProjectDocument::from_json(text)?;
        self.tree = document.tree();
        self.settings = document.settings;
        self.current = Self::default_file();
        info!("Imported project with {} nodes", self.tree.len());
        Ok(())
    }

    pub fn document(&self) -> ProjectDocument {
        ProjectDocument::new(&self.tree, self.settings)
    }

    pub fn export_json(&self) -> Result<String, ProjectError> {
        self.document().to_json()
    }

    /// Requests a plan for `prompt` and installs it. Local projects also get a
    /// suggested structure, which is returned for the caller to apply.
    pub fn generate_plan<T: Transport>(
        &mut self,
        assistant: &Assistant<T>,
        prompt: &str,
        provider: Provider,
        project: ProjectType,
    ) -> Result<Vec<StructureNode>, AssistantError> {
        let steps = assistant.plan(&project.plan_context(prompt), provider)?;
        let structure = if project.wants_structure() {
            assistant.structure(prompt, provider)?
        } else {
            Vec::new()
        };
        self.apply_plan(steps);
        Ok(structure)
    }

    pub fn generate_structure<T: Transport>(
        &self,
        assistant: &Assistant<T>,
        prompt: &str,
        provider: Provider,
    ) -> Result<Vec<StructureNode>, AssistantError> {
        assistant.structure(prompt, provider)
    }

    /// Generates code for `prompt` and writes it into the current file.
    pub fn generate_code<T: Transport>(
        &mut self,
        assistant: &Assistant<T>,
        prompt: &str,
        provider: Provider,
    ) -> Result<bool, AssistantError> {
        let code = assistant.code(prompt, provider)?;
        Ok(self.apply_code(&code))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use rstest::rstest;

    use super::*;
    use crate::assistant::{GenerationKind, GenerationRequest, ProxyResponse, TransportError};
    use crate::filesystem::STARTER_CONTENT;
    use crate::project::{Language, Theme};
    use crate::sandbox::Outcome;

    /// Answers every request kind with a fixed reply.
    struct Canned {
        plan: &'static str,
        structure: &'static str,
        code: &'static str,
        sent: RefCell<Vec<GenerationRequest>>,
    }

    impl Canned {
        fn new() -> Self {
            Self {
                plan: r#"{"result":[{"description":"Write code","prompt":"Print hello"}]}"#,
                structure: r#"{"result":[{"name":"src","type":"directory","children":[{"name":"util.js","type":"file"}]}]}"#,
                code: r#"{"result":"console.log('generated')"}"#,
                sent: RefCell::default(),
            }
        }
    }

    impl Transport for Canned {
        fn send(&self, request: &GenerationRequest) -> Result<ProxyResponse, TransportError> {
            self.sent.borrow_mut().push(request.clone());
            let body = match request.kind {
                GenerationKind::Plan => self.plan,
                GenerationKind::Structure => self.structure,
                GenerationKind::Code => self.code,
            };
            Ok(ProxyResponse::new(200, body))
        }

        fn credentials(&self) -> Result<ProxyResponse, TransportError> {
            Ok(ProxyResponse::new(200, "{}"))
        }
    }

    #[test]
    fn starts_on_the_starter_file() {
        let workspace = Workspace::default();
        assert_eq!(workspace.current_file(), "src/index.js");
        assert_eq!(workspace.current_content(), STARTER_CONTENT);
        assert!(workspace.run_current().lines().is_empty());
    }

    #[test]
    fn save_then_run_prints_the_file_output() {
        let mut workspace = Workspace::default();
        assert!(workspace.save("console.log('hello')"));
        let transcript = workspace.run_current();
        assert_eq!(transcript.to_string(), "hello");
        assert_eq!(transcript.outcome(), Outcome::Completed);
    }

    #[test]
    fn created_files_become_current() {
        let mut workspace = Workspace::default();
        assert!(workspace.create("src/lib", NodeKind::Directory));
        assert_eq!(workspace.current_file(), "src/index.js");

        assert!(workspace.create("src/lib/a.js", NodeKind::File));
        assert_eq!(workspace.current_file(), "src/lib/a.js");
        assert!(workspace.save("1"));
        assert_eq!(workspace.tree().read("src/lib/a.js"), "1");
    }

    #[rstest]
    #[case::duplicate("src/index.js")]
    #[case::duplicate_directory("src")]
    #[case::missing_parent("lib/a.js")]
    #[case::empty_path("")]
    fn refused_creates_leave_the_tree_alone(#[case] target: &str) {
        let mut workspace = Workspace::default();
        let before = workspace.tree().clone();
        assert!(!workspace.create(target, NodeKind::File));
        assert_eq!(workspace.tree(), &before);
        assert_eq!(workspace.current_file(), "src/index.js");
    }

    #[test]
    fn deleting_the_current_file_resets_selection() {
        let mut workspace = Workspace::default();
        workspace.create("notes.txt", NodeKind::File);
        assert_eq!(workspace.current_file(), "notes.txt");

        assert!(workspace.delete("notes.txt"));
        assert_eq!(workspace.current_file(), "src/index.js");
        assert!(!workspace.delete("notes.txt"));
    }

    #[test]
    fn deleting_an_ancestor_of_the_current_file_resets_selection() {
        let mut workspace = Workspace::default();
        workspace.create("lib", NodeKind::Directory);
        workspace.create("lib/a.js", NodeKind::File);
        workspace.delete("lib");
        assert_eq!(workspace.current_file(), "src/index.js");
    }

    #[test]
    fn deleting_another_file_keeps_selection() {
        let mut workspace = Workspace::default();
        workspace.create("a.js", NodeKind::File);
        workspace.select("src/index.js");
        workspace.delete("a.js");
        assert_eq!(workspace.current_file(), "src/index.js");
    }

    #[test]
    fn saving_a_directory_is_refused() {
        let mut workspace = Workspace::default();
        assert_eq!(workspace.select("src"), "");
        assert!(!workspace.save("x"));
    }

    #[test]
    fn plan_steps_toggle_individually() {
        let mut workspace = Workspace::default();
        workspace.apply_plan(vec![
            PlanStep {
                description: "a".into(),
                prompt: "pa".into(),
            },
            PlanStep {
                description: "b".into(),
                prompt: "pb".into(),
            },
        ]);
        assert!(workspace.toggle_step(1));
        let marks: Vec<bool> = workspace.plan().iter().map(|item| item.completed).collect();
        assert_eq!(marks, [false, true]);
        assert!(workspace.toggle_step(1));
        assert!(!workspace.plan()[1].completed);
        assert!(!workspace.toggle_step(2));
    }

    #[test]
    fn structure_only_adds_missing_nodes() {
        let mut workspace = Workspace::default();
        workspace.save("keep me");
        let structure = vec![
            StructureNode::directory(
                "src",
                vec![
                    StructureNode::file("index.js"),
                    StructureNode::directory("components", vec![StructureNode::file("app.js")]),
                ],
            ),
            StructureNode::file("package.json"),
            StructureNode::file("bad/name"),
        ];

        assert_eq!(workspace.apply_structure(&structure), 3);
        assert_eq!(workspace.tree().read("src/index.js"), "keep me");
        assert_eq!(
            workspace.tree().kind_of("src/components/app.js"),
            Some(NodeKind::File)
        );
        assert!(workspace.tree().contains("package.json"));
        assert_eq!(workspace.apply_structure(&structure), 0);
    }

    #[test]
    fn import_replaces_everything_and_resets_selection() {
        let mut source = Workspace::default();
        source.create("lib", NodeKind::Directory);
        source.create("lib/x.js", NodeKind::File);
        source.save("console.log('x')");
        source.set_settings(EditorSettings {
            language: Language::Css,
            theme: Theme::Light,
        });
        let exported = source.export_json().unwrap();

        let mut target = Workspace::default();
        target.create("other.js", NodeKind::File);
        target.import_json(&exported).unwrap();

        assert_eq!(target.tree(), source.tree());
        assert_eq!(target.settings(), source.settings());
        assert_eq!(target.current_file(), "src/index.js");
        assert_eq!(target.run("lib/x.js").to_string(), "x");
    }

    #[test]
    fn failed_import_changes_nothing() {
        let mut workspace = Workspace::default();
        workspace.create("a.js", NodeKind::File);
        let before = workspace.tree().clone();

        let result = workspace.import_json(r#"{"files":[{"name":"","type":"file"}],"settings":{"language":"json","theme":"light"}}"#);
        assert!(result.is_err());
        assert_eq!(workspace.tree(), &before);
        assert_eq!(workspace.current_file(), "a.js");
        assert_eq!(workspace.settings(), EditorSettings::default());
    }

    #[test]
    fn local_plans_come_with_a_structure() {
        let assistant = Assistant::new(Canned::new());
        let mut workspace = Workspace::default();
        let structure = workspace
            .generate_plan(&assistant, "a counter", Provider::Groq, ProjectType::Local)
            .unwrap();

        assert_eq!(workspace.plan().len(), 1);
        assert!(!workspace.plan()[0].completed);
        assert_eq!(structure[0].name, "src");

        let sent = assistant.transport().sent.borrow();
        assert_eq!(
            sent[0].prompt,
            "Create a local application with the following requirements: a counter"
        );
        assert_eq!(sent[1].kind, GenerationKind::Structure);
        assert_eq!(sent[1].prompt, "a counter");
    }

    #[test]
    fn web_plans_skip_the_structure_request() {
        let assistant = Assistant::new(Canned::new());
        let mut workspace = Workspace::default();
        let structure = workspace
            .generate_plan(&assistant, "a blog", Provider::Gemini, ProjectType::Web)
            .unwrap();
        assert!(structure.is_empty());
        assert_eq!(assistant.transport().sent.borrow().len(), 1);
    }

    #[test]
    fn generated_code_lands_in_the_current_file() {
        let assistant = Assistant::new(Canned::new());
        let mut workspace = Workspace::default();
        assert!(
            workspace
                .generate_code(&assistant, "log something", Provider::Mistral)
                .unwrap()
        );
        assert_eq!(workspace.run_current().to_string(), "generated");

        let structure = workspace
            .generate_structure(&assistant, "x", Provider::Mistral)
            .unwrap();
        assert_eq!(workspace.apply_structure(&structure), 1);
    }

    #[test]
    fn failed_generation_keeps_the_old_plan() {
        let mut canned = Canned::new();
        canned.structure = r#"{"result":"oops"}"#;
        let assistant = Assistant::new(canned);
        let mut workspace = Workspace::default();
        workspace.apply_plan(vec![PlanStep {
            description: "old".into(),
            prompt: "old".into(),
        }]);

        let result = workspace.generate_plan(&assistant, "x", Provider::Groq, ProjectType::Local);
        assert!(result.is_err());
        assert_eq!(workspace.plan()[0].step.description, "old");
    }
}
