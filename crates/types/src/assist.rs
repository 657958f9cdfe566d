//! StreamAssist wire shapes and the aggregator's output model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ── Wire shapes ───────────────────────────────────────────────────────────────

/// One frame of a StreamAssist response stream.
///
/// Every field is optional on the wire; frames lacking the expected shape
/// simply contribute no text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssistChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<AssistAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_info: Option<SessionInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssistAnswer {
    pub replies: Vec<AssistReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssistReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounded_content: Option<GroundedContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundedContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ReplyContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl AssistChunk {
    /// A frame carrying a single text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            answer: Some(AssistAnswer {
                replies: vec![AssistReply {
                    grounded_content: Some(GroundedContent {
                        content: Some(ReplyContent {
                            text: Some(text.into()),
                        }),
                    }),
                }],
                state: None,
            }),
            session_info: None,
        }
    }

    /// Attach a server-assigned session name.
    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session_info = Some(SessionInfo {
            session: Some(session.into()),
        });
        self
    }

    /// The session name carried by this frame, if any.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.session_info
            .as_ref()
            .and_then(|s| s.session.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// `true` when the frame carries an answer with at least one reply.
    #[must_use]
    pub fn has_answer(&self) -> bool {
        self.answer.as_ref().is_some_and(|a| !a.replies.is_empty())
    }

    /// Concatenated text of every reply in the frame.
    #[must_use]
    pub fn reply_text(&self) -> String {
        let Some(answer) = &self.answer else {
            return String::new();
        };
        answer
            .replies
            .iter()
            .filter_map(|r| r.grounded_content.as_ref()?.content.as_ref()?.text.as_deref())
            .collect()
    }
}

// ── Tool emulation ────────────────────────────────────────────────────────────

/// A tool the model may ask the caller to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Parameter names, in declaration order.
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, parameters: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: parameters.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// `name(p1, p2)`
    #[must_use]
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.parameters.join(", "))
    }
}

impl std::str::FromStr for ToolDeclaration {
    type Err = crate::WifError;

    /// Parse `name`, `name:p1,p2` or `name:p1,p2:description`.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Config`](crate::WifError::Config) if the name is empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(crate::WifError::Config(format!(
                "invalid tool declaration '{s}': missing name"
            )));
        }
        let parameters = parts
            .next()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        let description = parts.next().unwrap_or_default().trim().to_string();
        Ok(Self {
            name: name.to_string(),
            description,
            parameters,
        })
    }
}

/// A structured tool call recovered from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub parameters: Map<String, Value>,
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, Value::Object(self.parameters.clone()))
    }
}

/// When the aggregator scans the final text for a tool call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolExtraction {
    /// Scan every invocation, whether or not tools were declared.
    #[default]
    Always,
    /// Scan only invocations that declared at least one tool.
    WhenToolsDeclared,
}

// ── Aggregator output ─────────────────────────────────────────────────────────

/// The single terminal result of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalAnswer {
    Text(String),
    ToolCall(ToolInvocation),
}

/// One item of an invocation's output sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistEvent {
    /// Text of one chunk, emitted as soon as it arrives.
    Partial(String),
    /// Emitted exactly once, after the last chunk.
    Final(FinalAnswer),
}

impl AssistEvent {
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final(_))
    }

    /// Text carried by the event; `None` for a tool call.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Partial(t) | Self::Final(FinalAnswer::Text(t)) => Some(t),
            Self::Final(FinalAnswer::ToolCall(_)) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_deserializes_camel_case() {
        let raw = json!({
            "answer": {
                "state": "IN_PROGRESS",
                "replies": [
                    {"groundedContent": {"content": {"text": "Hello, "}}},
                    {"groundedContent": {"content": {"text": "world"}}}
                ]
            },
            "sessionInfo": {"session": "projects/p/locations/global/sessions/42"}
        });
        let chunk: AssistChunk = serde_json::from_value(raw).unwrap();
        assert_eq!(chunk.reply_text(), "Hello, world");
        assert_eq!(
            chunk.session(),
            Some("projects/p/locations/global/sessions/42")
        );
        assert!(chunk.has_answer());
    }

    #[test]
    fn test_chunk_without_text_shape() {
        let raw = json!({"answer": {"replies": [{"groundedContent": {}}, {}]}});
        let chunk: AssistChunk = serde_json::from_value(raw).unwrap();
        assert!(chunk.has_answer());
        assert_eq!(chunk.reply_text(), "");
    }

    #[test]
    fn test_chunk_empty_session_is_ignored() {
        let chunk: AssistChunk =
            serde_json::from_value(json!({"sessionInfo": {"session": ""}})).unwrap();
        assert_eq!(chunk.session(), None);
        assert!(!chunk.has_answer());
    }

    #[test]
    fn test_tool_declaration_from_str() {
        let t: ToolDeclaration = "get_current_weather:location,unit:Get the weather"
            .parse()
            .unwrap();
        assert_eq!(t.name, "get_current_weather");
        assert_eq!(t.parameters, vec!["location", "unit"]);
        assert_eq!(t.description, "Get the weather");
        assert_eq!(t.signature(), "get_current_weather(location, unit)");

        let bare: ToolDeclaration = "ping".parse().unwrap();
        assert!(bare.parameters.is_empty());
        assert!(":x".parse::<ToolDeclaration>().is_err());
    }

    #[test]
    fn test_event_text() {
        assert_eq!(AssistEvent::Partial("a".into()).text(), Some("a"));
        assert!(!AssistEvent::Partial("a".into()).is_final());
        let call = AssistEvent::Final(FinalAnswer::ToolCall(ToolInvocation {
            name: "f".into(),
            parameters: Map::new(),
        }));
        assert!(call.is_final());
        assert_eq!(call.text(), None);
    }

    #[test]
    fn test_tool_extraction_serde() {
        let v: ToolExtraction = serde_json::from_str("\"when_tools_declared\"").unwrap();
        assert_eq!(v, ToolExtraction::WhenToolsDeclared);
        assert_eq!(ToolExtraction::default(), ToolExtraction::Always);
    }
}
