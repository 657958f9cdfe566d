//! Turns a StreamAssist chunk stream into partial outputs and one final answer.

use futures_core::Stream;
use futures_util::{StreamExt as _, stream::try_unfold};
use std::pin::Pin;
use std::sync::Arc;
use wifassist_config::AssistantConfig;
use wifassist_types::{
    AssistEvent, AssistTransport, BearerToken, ChunkStream, FinalAnswer, StreamAssistRequest,
    ToolDeclaration, ToolExtraction, WifError, traits::Result,
};

use crate::{
    client::StreamAssistClient,
    convention::{FencedJsonConvention, OutputConvention},
    session::StreamSession,
};

/// Output of one invocation: zero or more [`AssistEvent::Partial`] followed by
/// exactly one [`AssistEvent::Final`], unless an error ends it early.
pub type AssistStream = Pin<Box<dyn Stream<Item = Result<AssistEvent>> + Send>>;

/// Wraps every assistant call: injects tool instructions, carries the sticky
/// session id, and decides between a tool call and plain text at the end.
pub struct StreamingAggregator {
    transport: Arc<dyn AssistTransport>,
    convention: Arc<dyn OutputConvention>,
    session: StreamSession,
    extraction: ToolExtraction,
}

impl StreamingAggregator {
    /// Aggregator with the fenced-JSON convention and a fresh session.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Config`] if the convention cannot be built.
    pub fn new(transport: Arc<dyn AssistTransport>) -> Result<Self> {
        Ok(Self {
            transport,
            convention: Arc::new(FencedJsonConvention::new()?),
            session: StreamSession::new(),
            extraction: ToolExtraction::default(),
        })
    }

    /// Aggregator talking to the configured assistant over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Config`] if the project or engine id is missing.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let client = StreamAssistClient::from_config(config)?;
        Ok(Self::new(Arc::new(client))?.with_extraction(config.tool_extraction))
    }

    #[must_use]
    pub fn with_convention(mut self, convention: Arc<dyn OutputConvention>) -> Self {
        self.convention = convention;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: StreamSession) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn with_extraction(mut self, extraction: ToolExtraction) -> Self {
        self.extraction = extraction;
        self
    }

    #[must_use]
    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Start a new conversation on the next call.
    pub fn reset_session(&self) {
        self.session.reset();
    }

    /// Query text as sent, with the tool instruction appended when tools
    /// are declared.
    #[must_use]
    pub fn build_query(&self, query: &str, tools: &[ToolDeclaration]) -> String {
        match self.convention.instruction(tools) {
            Some(instruction) => format!("{query}{instruction}"),
            None => query.to_string(),
        }
    }

    /// Issue one call and stream its outputs.
    ///
    /// Each chunk with non-empty text becomes a partial, in arrival order.
    /// When the chunks end, the accumulated text is scanned for a tool call
    /// and a single final answer is emitted.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the call cannot be started. Errors
    /// while streaming are yielded as the last item.
    pub async fn invoke(
        &self,
        query: &str,
        tools: &[ToolDeclaration],
        credential: Option<BearerToken>,
    ) -> Result<AssistStream> {
        let request = StreamAssistRequest {
            query: self.build_query(query, tools),
            session: self.session.id(),
            credential,
        };
        let chunks = self.transport.stream_assist(request).await?;
        let scan = match self.extraction {
            ToolExtraction::Always => true,
            ToolExtraction::WhenToolsDeclared => !tools.is_empty(),
        };
        Ok(aggregate(
            chunks,
            self.session.clone(),
            Arc::clone(&self.convention),
            scan,
        ))
    }
}

struct State {
    chunks: ChunkStream,
    session: StreamSession,
    convention: Arc<dyn OutputConvention>,
    scan: bool,
    buffer: String,
    done: bool,
}

fn aggregate(
    chunks: ChunkStream,
    session: StreamSession,
    convention: Arc<dyn OutputConvention>,
    scan: bool,
) -> AssistStream {
    Box::pin(try_unfold(
        State {
            chunks,
            session,
            convention,
            scan,
            buffer: String::new(),
            done: false,
        },
        |mut s| async move {
            if s.done {
                return Ok(None);
            }
            loop {
                let Some(chunk) = s.chunks.next().await else {
                    s.done = true;
                    let text = std::mem::take(&mut s.buffer);
                    let answer = match s.scan.then(|| s.convention.decode(&text)).flatten() {
                        Some(call) => {
                            tracing::debug!(tool = %call.name, "reply decoded as tool call");
                            FinalAnswer::ToolCall(call)
                        }
                        None => FinalAnswer::Text(text),
                    };
                    return Ok(Some((AssistEvent::Final(answer), s)));
                };
                let chunk = chunk?;
                if let Some(id) = chunk.session() {
                    s.session.set(id);
                }
                if !chunk.has_answer() {
                    continue;
                }
                let text = chunk.reply_text();
                if text.is_empty() {
                    continue;
                }
                s.buffer.push_str(&text);
                return Ok(Some((AssistEvent::Partial(text), s)));
            }
        },
    ))
}

/// Drain an invocation, returning its partial texts and final answer.
///
/// # Errors
///
/// Returns the first streaming error, or [`WifError::Stream`] if the
/// stream ends without a final answer.
pub async fn collect(mut stream: AssistStream) -> Result<(Vec<String>, FinalAnswer)> {
    let mut partials = Vec::new();
    while let Some(event) = stream.next().await {
        match event? {
            AssistEvent::Partial(text) => partials.push(text),
            AssistEvent::Final(answer) => return Ok((partials, answer)),
        }
    }
    Err(WifError::Stream("stream ended without a final answer".into()))
}
