//! HTTP transport for the `streamAssist` method.

use async_trait::async_trait;
use eventsource_stream::Eventsource as _;
use futures_util::StreamExt as _;
use serde_json::{Value, json};
use wifassist_config::AssistantConfig;
use wifassist_types::{
    AssistChunk, AssistTransport, ChunkStream, StreamAssistRequest, WifError, traits::Result,
};

/// Calls `POST {base}/v1/{assistant}:streamAssist?alt=sse` and decodes each
/// server-sent event into an [`AssistChunk`].
#[derive(Debug, Clone)]
pub struct StreamAssistClient {
    http: reqwest::Client,
    base_url: String,
    resource: String,
    quota_project: Option<String>,
}

impl StreamAssistClient {
    pub fn new(base_url: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            resource: resource.into(),
            quota_project: None,
        }
    }

    /// # Errors
    ///
    /// Returns [`WifError::Config`] if the project or engine id is missing.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let mut client = Self::new(config.base_url(), config.resource_name()?);
        client.quota_project.clone_from(&config.quota_project);
        Ok(client)
    }

    #[must_use]
    pub fn with_quota_project(mut self, project: impl Into<String>) -> Self {
        self.quota_project = Some(project.into());
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1/{}:streamAssist?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.resource
        )
    }

    /// JSON body for one request; `session` is omitted on the first turn.
    #[must_use]
    pub fn request_body(request: &StreamAssistRequest) -> Value {
        let mut body = json!({ "query": { "text": request.query } });
        if let Some(session) = &request.session {
            body["session"] = Value::String(session.clone());
        }
        body
    }
}

fn decode_event(data: &str) -> Option<Result<AssistChunk>> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(
        serde_json::from_str(data)
            .map_err(|e| WifError::Stream(format!("invalid chunk: {e}: {data}"))),
    )
}

#[async_trait]
impl AssistTransport for StreamAssistClient {
    async fn stream_assist(&self, request: StreamAssistRequest) -> Result<ChunkStream> {
        let mut builder = self
            .http
            .post(self.endpoint())
            .header("Accept", "text/event-stream")
            .json(&Self::request_body(&request));
        if let Some(credential) = &request.credential {
            builder = builder.header("Authorization", credential.authorization());
        }
        if let Some(project) = &self.quota_project {
            builder = builder.header("x-goog-user-project", project);
        }

        tracing::debug!(
            resource = %self.resource,
            session = request.session.as_deref().unwrap_or("-"),
            "streamAssist request"
        );
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "streamAssist rejected");
            return Err(WifError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let chunks = resp
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => decode_event(&event.data),
                    Err(e) => Some(Err(WifError::Stream(e.to_string()))),
                }
            });
        Ok(Box::pin(chunks))
    }
}
