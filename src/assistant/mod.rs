//! Client side of the LLM generation proxy.
//!
//! Requests go out as `{prompt, model, type}` through a [`Transport`]; replies
//! are `{result}` on success and `{error}` otherwise.

mod client;
mod protocol;

pub use client::{Assistant, AssistantError};
pub use protocol::{
    CredentialStatus, GenerationKind, GenerationRequest, PlanStep, ProjectType, Provider,
    ProxyResponse, StructureNode, Transport, TransportError,
};
