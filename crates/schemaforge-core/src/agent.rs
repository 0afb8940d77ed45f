use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::state::{ArtifactSnapshot, DiagramArtifact, MermaidArtifact, SchemaArtifact};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// One successful chat turn, in the controller's vocabulary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentReply {
    pub reply: String,
    pub options: Vec<String>,
    pub artifacts: ArtifactSnapshot,
    pub schema_proposed: bool,
}

/// The remote schema design agent.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn chat(&self, message: &str) -> Result<AgentReply, AgentError>;

    async fn reset(&self) -> Result<(), AgentError>;

    /// Artifacts the server currently holds for this session, `None` when it
    /// has no schema yet.
    async fn current_schema(&self) -> Result<Option<ArtifactSnapshot>, AgentError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    diagram_html: Option<String>,
    #[serde(default)]
    schema_data: Option<Value>,
    #[serde(default)]
    mermaid_code: Option<String>,
    #[serde(default)]
    is_schema_proposed: bool,
}

#[derive(Deserialize)]
struct SchemaResponse {
    #[serde(default)]
    schema_data: Option<Value>,
    #[serde(default)]
    diagram_html: Option<String>,
    #[serde(default)]
    mermaid_code: Option<String>,
}

fn snapshot(
    diagram_html: Option<String>,
    schema_data: Option<Value>,
    mermaid_code: Option<String>,
) -> ArtifactSnapshot {
    ArtifactSnapshot {
        diagram: diagram_html.and_then(DiagramArtifact::new),
        schema: schema_data.and_then(SchemaArtifact::new),
        mermaid: mermaid_code.and_then(MermaidArtifact::new),
    }
}

impl From<ChatResponse> for AgentReply {
    fn from(response: ChatResponse) -> Self {
        Self {
            reply: response.response,
            options: response.options.unwrap_or_default(),
            artifacts: snapshot(
                response.diagram_html,
                response.schema_data,
                response.mermaid_code,
            ),
            schema_proposed: response.is_schema_proposed,
        }
    }
}

fn unreachable(err: reqwest::Error) -> AgentError {
    AgentError::Unreachable(err.to_string())
}

/// HTTP client for the SchemaForge backend.
#[derive(Clone)]
pub struct HttpAgentClient {
    client: Client,
    base_url: String,
    session_id: Option<String>,
}

impl HttpAgentClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn chat(&self, message: &str) -> Result<AgentReply, AgentError> {
        let url = format!("{}/chat", self.base_url);

        let request = ChatRequest {
            message,
            session_id: self.session_id.as_deref(),
        };

        debug!(%url, "sending chat message");
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(unreachable)?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "chat request rejected");
            return Err(AgentError::Unreachable(format!(
                "chat request failed with status: {}",
                response.status()
            )));
        }

        let chat_response: ChatResponse = response.json().await.map_err(unreachable)?;
        Ok(chat_response.into())
    }

    async fn reset(&self) -> Result<(), AgentError> {
        let url = format!("{}/reset", self.base_url);

        let mut request = self.client.post(&url);
        if let Some(session_id) = &self.session_id {
            request = request.query(&[("session_id", session_id)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::ResetFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::ResetFailed(format!(
                "reset request failed with status: {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn current_schema(&self) -> Result<Option<ArtifactSnapshot>, AgentError> {
        let url = format!("{}/schema", self.base_url);

        let response = self.client.get(&url).send().await.map_err(unreachable)?;

        if !response.status().is_success() {
            return Err(AgentError::Unreachable(format!(
                "schema request failed with status: {}",
                response.status()
            )));
        }

        let schema_response: SchemaResponse = response.json().await.map_err(unreachable)?;
        let snapshot = snapshot(
            schema_response.diagram_html,
            schema_response.schema_data,
            schema_response.mermaid_code,
        );
        if snapshot.schema.is_none() {
            debug!("server holds no schema");
            return Ok(None);
        }
        Ok(Some(snapshot))
    }
}
