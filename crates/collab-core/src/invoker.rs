//! Boundary to the agents themselves.
//!
//! The orchestrator never knows how an agent computes its answer. It builds an
//! [`AgentRequest`], hands it to an [`AgentInvoker`], and records whatever
//! comes back. Transport, retries and agent runtimes live behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::task::Payload;

/// Request sent to one agent on behalf of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub task_id: String,
    /// Task description; the body the agent is asked to work on.
    pub content: String,
    pub role_name: String,
    pub responsibilities: Vec<String>,
    pub task_input_data: Payload,
    /// Snapshot of the shared context at the moment the request was built.
    pub shared_context: Payload,
    pub correlation_id: Uuid,
}

/// Reply from an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    /// Expected in `0.0..=1.0`.
    pub confidence: f64,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub next_actions: Vec<String>,
    /// Merged into the shared context when the agent succeeds.
    #[serde(default)]
    pub metadata: Payload,
}

impl AgentResponse {
    pub fn new(content: impl Into<String>, confidence: f64) -> Self {
        Self {
            content: content.into(),
            confidence,
            suggestions: Vec::new(),
            next_actions: Vec::new(),
            metadata: Payload::new(),
        }
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_next_actions<I, S>(mut self, next_actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_actions = next_actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// A response is usable only when its confidence is a number in `0..=1`.
    pub fn is_well_formed(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
    }
}

/// Transport-level failures reported by an [`AgentInvoker`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvokeError {
    #[error("transport error talking to agent {agent_id}: {reason}")]
    Transport { agent_id: String, reason: String },

    #[error("agent {agent_id} timed out after {after_ms}ms")]
    Timeout { agent_id: String, after_ms: u64 },

    #[error("agent {0} is not available")]
    Unavailable(String),
}

/// Capability to deliver a request to an agent and wait for its reply.
///
/// `Ok(None)` means the agent answered with nothing; the orchestrator treats
/// that as a soft failure, the same as an `Err`.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn send(
        &self,
        agent_id: &str,
        request: AgentRequest,
    ) -> Result<Option<AgentResponse>, InvokeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_confidence_bounds() {
        assert!(AgentResponse::new("ok", 0.0).is_well_formed());
        assert!(AgentResponse::new("ok", 1.0).is_well_formed());
        assert!(!AgentResponse::new("too sure", 1.2).is_well_formed());
        assert!(!AgentResponse::new("negative", -0.1).is_well_formed());
        assert!(!AgentResponse::new("nan", f64::NAN).is_well_formed());
    }

    #[test]
    fn test_response_defaults_on_deserialize() {
        let resp: AgentResponse =
            serde_json::from_str(r#"{"content":"hi","confidence":0.5}"#).unwrap();
        assert!(resp.suggestions.is_empty());
        assert!(resp.next_actions.is_empty());
        assert!(resp.metadata.is_empty());
    }

    #[test]
    fn test_invoke_error_display() {
        let err = InvokeError::Timeout {
            agent_id: "market".to_string(),
            after_ms: 1500,
        };
        assert!(err.to_string().contains("market"));
        assert!(err.to_string().contains("1500"));
    }
}
