use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, error};

use super::protocol::{
    CredentialStatus, GenerationKind, GenerationRequest, PlanStep, Provider, ProxyResponse,
    StructureNode, Transport, TransportError,
};

#[derive(Debug, Snafu)]
pub enum AssistantError {
    #[snafu(display("Prompt is empty"))]
    EmptyPrompt,
    #[snafu(display("Failed to reach the generation proxy"))]
    Unreachable { source: TransportError },
    #[snafu(display("Proxy rejected the request with status {}: {}", status, detail))]
    Rejected { status: u16, detail: String },
    #[snafu(display("Proxy reply is not valid JSON"))]
    MalformedBody { source: serde_json::Error },
    #[snafu(display("Generated {} has an unexpected shape", kind))]
    MalformedResult {
        kind: GenerationKind,
        source: serde_json::Error,
    },
}

impl AssistantError {
    /// Text safe to show to the user. Details stay in the log.
    pub fn user_message(&self, kind: GenerationKind) -> String {
        match self {
            AssistantError::EmptyPrompt => "Please describe what you want to generate.".into(),
            _ => format!("Failed to generate {kind}. Please check your API keys and try again."),
        }
    }
}

#[derive(Deserialize)]
struct Reply {
    result: Json,
}

#[derive(Deserialize)]
struct Rejection {
    error: Option<String>,
}

/// Typed client of the generation proxy.
pub struct Assistant<T> {
    transport: T,
}

impl<T: Transport> Assistant<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn plan(&self, prompt: &str, provider: Provider) -> Result<Vec<PlanStep>, AssistantError> {
        let result = self.request(prompt, provider, GenerationKind::Plan)?;
        decode_structured(result, GenerationKind::Plan)
    }

    pub fn structure(
        &self,
        prompt: &str,
        provider: Provider,
    ) -> Result<Vec<StructureNode>, AssistantError> {
        let result = self.request(prompt, provider, GenerationKind::Structure)?;
        decode_structured(result, GenerationKind::Structure)
    }

    /// Generated source text. Non-string results are returned JSON-encoded.
    pub fn code(&self, prompt: &str, provider: Provider) -> Result<String, AssistantError> {
        let result = self.request(prompt, provider, GenerationKind::Code)?;
        Ok(match result {
            Json::String(code) => code,
            other => other.to_string(),
        })
    }

    pub fn credentials(&self) -> Result<CredentialStatus, AssistantError> {
        let response = self
            .transport
            .credentials()
            .context(UnreachableSnafu)
            .inspect_err(|err| error!("Error fetching credential status: {}", err))?;
        let body = successful_body(response)?;
        serde_json::from_str(&body).context(MalformedBodySnafu)
    }

    fn request(
        &self,
        prompt: &str,
        provider: Provider,
        kind: GenerationKind,
    ) -> Result<Json, AssistantError> {
        ensure!(!prompt.trim().is_empty(), EmptyPromptSnafu);
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            model: provider,
            kind,
        };
        debug!("Requesting {} from {}", kind, provider);
        self.exchange(&request)
            .inspect_err(|err| error!("Error generating {} with {}: {}", kind, provider, err))
    }

    fn exchange(&self, request: &GenerationRequest) -> Result<Json, AssistantError> {
        let response = self.transport.send(request).context(UnreachableSnafu)?;
        let body = successful_body(response)?;
        let reply: Reply = serde_json::from_str(&body).context(MalformedBodySnafu)?;
        Ok(reply.result)
    }
}

fn successful_body(response: ProxyResponse) -> Result<String, AssistantError> {
    if response.is_success() {
        return Ok(response.body);
    }
    let detail = serde_json::from_str::<Rejection>(&response.body)
        .ok()
        .and_then(|rejection| rejection.error)
        .unwrap_or_else(|| format!("HTTP error! status: {}", response.status));
    RejectedSnafu {
        status: response.status,
        detail,
    }
    .fail()
}

/// Providers sometimes return the payload as a JSON string rather than data.
fn decode_structured<D: DeserializeOwned>(
    result: Json,
    kind: GenerationKind,
) -> Result<D, AssistantError> {
    let decoded = match result {
        Json::String(text) => serde_json::from_str(&text),
        other => serde_json::from_value(other),
    };
    decoded.context(MalformedResultSnafu { kind })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use rstest::rstest;

    use super::*;

    /// Replays canned replies and records what was sent.
    #[derive(Default)]
    struct Scripted {
        replies: RefCell<VecDeque<Result<ProxyResponse, TransportError>>>,
        sent: RefCell<Vec<GenerationRequest>>,
    }

    impl Scripted {
        fn replying(status: u16, body: &str) -> Self {
            let scripted = Self::default();
            scripted
                .replies
                .borrow_mut()
                .push_back(Ok(ProxyResponse::new(status, body)));
            scripted
        }

        fn failing(reason: &str) -> Self {
            let scripted = Self::default();
            scripted
                .replies
                .borrow_mut()
                .push_back(Err(TransportError::new(reason)));
            scripted
        }

        fn next(&self) -> Result<ProxyResponse, TransportError> {
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::new("no reply scripted")))
        }
    }

    impl Transport for Scripted {
        fn send(&self, request: &GenerationRequest) -> Result<ProxyResponse, TransportError> {
            self.sent.borrow_mut().push(request.clone());
            self.next()
        }

        fn credentials(&self) -> Result<ProxyResponse, TransportError> {
            self.next()
        }
    }

    const STEPS: &str = r#"[{"description":"Set up","prompt":"Create index.js"}]"#;

    #[rstest]
    #[case::structured(format!(r#"{{"result":{STEPS}}}"#))]
    #[case::stringified(serde_json::json!({ "result": STEPS }).to_string())]
    fn plan_accepts_data_or_encoded_data(#[case] body: String) {
        let assistant = Assistant::new(Scripted::replying(200, &body));
        let steps = assistant.plan("todo app", Provider::Mistral).unwrap();
        assert_eq!(
            steps,
            vec![PlanStep {
                description: "Set up".into(),
                prompt: "Create index.js".into(),
            }]
        );

        let sent = assistant.transport().sent.borrow();
        assert_eq!(sent[0].kind, GenerationKind::Plan);
        assert_eq!(sent[0].model, Provider::Mistral);
        assert_eq!(sent[0].prompt, "todo app");
    }

    #[test]
    fn structure_decodes_nested_nodes() {
        let body = r#"{"result":"[{\"name\":\"src\",\"type\":\"directory\",\"children\":[{\"name\":\"app.js\",\"type\":\"file\"}]}]"}"#;
        let assistant = Assistant::new(Scripted::replying(200, body));
        let nodes = assistant.structure("x", Provider::Gemini).unwrap();
        assert_eq!(
            nodes,
            vec![StructureNode::directory(
                "src",
                vec![StructureNode::file("app.js")]
            )]
        );
    }

    #[rstest]
    #[case(r#"{"result":"console.log(1);"}"#, "console.log(1);")]
    #[case(r#"{"result":{"code":1}}"#, r#"{"code":1}"#)]
    fn code_is_text_or_encoded_json(#[case] body: &str, #[case] expected: &str) {
        let assistant = Assistant::new(Scripted::replying(200, body));
        assert_eq!(assistant.code("x", Provider::Groq).unwrap(), expected);
    }

    #[test]
    fn empty_prompt_never_reaches_the_transport() {
        let assistant = Assistant::new(Scripted::default());
        let err = assistant.code("   \n", Provider::Gemini).unwrap_err();
        assert!(matches!(err, AssistantError::EmptyPrompt));
        assert!(assistant.transport().sent.borrow().is_empty());
    }

    #[rstest]
    #[case(400, r#"{"error":"Missing required parameters"}"#, "Missing required parameters")]
    #[case(500, r#"{"error":"Internal server error"}"#, "Internal server error")]
    #[case(502, "<html>bad gateway</html>", "HTTP error! status: 502")]
    fn rejections_carry_status_and_detail(
        #[case] status: u16,
        #[case] body: &str,
        #[case] expected: &str,
    ) {
        let assistant = Assistant::new(Scripted::replying(status, body));
        match assistant.plan("x", Provider::Gemini) {
            Err(AssistantError::Rejected {
                status: actual,
                detail,
            }) => {
                assert_eq!(actual, status);
                assert_eq!(detail, expected);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn undecodable_replies_are_reported() {
        let assistant = Assistant::new(Scripted::replying(200, "not json"));
        assert!(matches!(
            assistant.code("x", Provider::Gemini),
            Err(AssistantError::MalformedBody { .. })
        ));

        let assistant = Assistant::new(Scripted::replying(200, r#"{"result":"not a plan"}"#));
        assert!(matches!(
            assistant.plan("x", Provider::Gemini),
            Err(AssistantError::MalformedResult {
                kind: GenerationKind::Plan,
                ..
            })
        ));
    }

    #[test]
    fn user_message_hides_details() {
        let assistant = Assistant::new(Scripted::failing("connection refused"));
        let err = assistant.plan("x", Provider::Gemini).unwrap_err();
        assert!(matches!(err, AssistantError::Unreachable { .. }));
        let message = err.user_message(GenerationKind::Plan);
        assert_eq!(
            message,
            "Failed to generate plan. Please check your API keys and try again."
        );
        assert!(!message.contains("refused"));
    }

    #[test]
    fn credentials_are_fetched_from_the_proxy() {
        let body = r#"{"geminiKey":"secret","mistralKey":null,"groqKey":null}"#;
        let assistant = Assistant::new(Scripted::replying(200, body));
        let status = assistant.credentials().unwrap();
        assert!(status.is_configured(Provider::Gemini));
        assert!(!status.is_configured(Provider::Groq));
    }
}
