use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize};
use snafu::Snafu;

use crate::filesystem::NodeKind;

/// Language model backend the proxy forwards a request to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    #[display("gemini")]
    Gemini,
    #[display("mistral")]
    Mistral,
    #[display("groq")]
    Groq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    #[display("plan")]
    Plan,
    #[display("structure")]
    Structure,
    #[display("code")]
    Code,
}

/// Body of a `POST` to the generation proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: Provider,
    #[serde(rename = "type")]
    pub kind: GenerationKind,
}

/// Raw proxy reply: HTTP status plus the undecoded JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: String,
}

impl ProxyResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("Proxy unreachable: {}", reason))]
pub struct TransportError {
    reason: String,
}

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        TransportSnafu {
            reason: reason.into(),
        }
        .build()
    }
}

/// Carries requests to the generation proxy.
///
/// The crate ships no HTTP client; embedders provide one.
pub trait Transport {
    /// Posts a generation request.
    fn send(&self, request: &GenerationRequest) -> Result<ProxyResponse, TransportError>;

    /// Fetches which provider credentials the proxy holds.
    fn credentials(&self) -> Result<ProxyResponse, TransportError>;
}

/// One step of a generated development plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    pub prompt: String,
}

/// One node of a generated file structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StructureNode>,
}

impl StructureNode {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File,
            children: Vec::new(),
        }
    }

    pub fn directory(name: impl Into<String>, children: Vec<StructureNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Directory,
            children,
        }
    }
}

/// Which provider keys the proxy has configured. Key values are never read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CredentialStatus {
    #[serde(rename = "geminiKey", default, deserialize_with = "present")]
    pub gemini: bool,
    #[serde(rename = "mistralKey", default, deserialize_with = "present")]
    pub mistral: bool,
    #[serde(rename = "groqKey", default, deserialize_with = "present")]
    pub groq: bool,
}

impl CredentialStatus {
    pub fn is_configured(&self, provider: Provider) -> bool {
        match provider {
            Provider::Gemini => self.gemini,
            Provider::Mistral => self.mistral,
            Provider::Groq => self.groq,
        }
    }
}

/// A credential entry as proxies report it: the key itself or a flag.
#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialEntry {
    Flag(bool),
    Key(String),
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let entry = Option::<CredentialEntry>::deserialize(deserializer)?;
    Ok(match entry {
        Some(CredentialEntry::Flag(flag)) => flag,
        Some(CredentialEntry::Key(key)) => !key.is_empty(),
        None => false,
    })
}

/// Where the generated project is meant to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum ProjectType {
    #[default]
    #[display("web")]
    Web,
    #[display("local")]
    Local,
}

impl ProjectType {
    /// Wraps a user prompt into the plan request context.
    pub fn plan_context(self, prompt: &str) -> String {
        let target = match self {
            ProjectType::Web => "serverless web application",
            ProjectType::Local => "local application",
        };
        format!("Create a {target} with the following requirements: {prompt}")
    }

    pub fn wants_structure(self) -> bool {
        self == ProjectType::Local
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn request_uses_proxy_field_names() {
        let request = GenerationRequest {
            prompt: "todo app".into(),
            model: Provider::Groq,
            kind: GenerationKind::Structure,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"prompt":"todo app","model":"groq","type":"structure"}"#
        );
    }

    #[rstest]
    #[case(r#"{"geminiKey":"abc","mistralKey":null,"groqKey":""}"#, [true, false, false])]
    #[case(r#"{"geminiKey":null,"mistralKey":"k","groqKey":"k"}"#, [false, true, true])]
    #[case("{}", [false, false, false])]
    #[case(r#"{"geminiKey":true,"mistralKey":false,"groqKey":null}"#, [true, false, false])]
    fn credentials_only_report_presence(#[case] json: &str, #[case] expected: [bool; 3]) {
        let status: CredentialStatus = serde_json::from_str(json).unwrap();
        let actual = [Provider::Gemini, Provider::Mistral, Provider::Groq]
            .map(|provider| status.is_configured(provider));
        assert_eq!(actual, expected);
    }

    #[test]
    fn structure_children_are_optional() {
        let json = r#"[{"name":"src","type":"directory","children":[{"name":"main.py","type":"file"}]},{"name":"README.md","type":"file"}]"#;
        let nodes: Vec<StructureNode> = serde_json::from_str(json).unwrap();
        assert_eq!(
            nodes,
            vec![
                StructureNode::directory("src", vec![StructureNode::file("main.py")]),
                StructureNode::file("README.md"),
            ]
        );
    }

    #[rstest]
    #[case(
        ProjectType::Web,
        "Create a serverless web application with the following requirements: chat"
    )]
    #[case(
        ProjectType::Local,
        "Create a local application with the following requirements: chat"
    )]
    fn plan_context_names_the_target(#[case] project: ProjectType, #[case] expected: &str) {
        assert_eq!(project.plan_context("chat"), expected);
    }
}
