use serde::{Deserialize, Serialize};
use serde_json::Value;

// ================================================================================================
// DECODER OUTPUT
// ================================================================================================

/// One decoded `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    pub payload: Value,
}

/// How a frame stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The `[DONE]` sentinel was seen.
    Sentinel,
    /// The source closed without a sentinel. Any unterminated tail was dropped.
    EndOfStream { discarded_bytes: usize },
    /// The source returned a read error.
    Failed,
}

impl Completion {
    /// Only an explicit sentinel proves the backend finished the reply.
    pub fn completed_normally(&self) -> bool {
        matches!(self, Completion::Sentinel)
    }
}

/// A `data:` line whose body was not valid JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedFrame {
    pub line: String,
    pub error: String,
}

// ================================================================================================
// AGENT BACKEND (WIRE)
// ================================================================================================

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub app_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessageRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionQuery {
    pub user_id: String,
}

/// A message as the backend keeps it for a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionMessage {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

/// Catalog entry for an agent the backend can run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_agent_icon")]
    pub icon: String,
}

fn default_agent_icon() -> String {
    "🤖".to_string()
}

/// Payload shape the agent backend puts in each frame. Everything is optional
/// because the decoder hands over arbitrary JSON.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AgentEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<AgentContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AgentContent {
    #[serde(default)]
    pub parts: Vec<AgentPart>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AgentPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl AgentEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(AgentContent {
                parts: vec![AgentPart {
                    text: Some(text.into()),
                }],
            }),
            error: None,
        }
    }

    /// Concatenated text of all parts, or `None` if there is none.
    pub fn joined_text(&self) -> Option<String> {
        let parts = &self.content.as_ref()?.parts;
        let mut out = String::new();
        let mut any = false;
        for part in parts {
            if let Some(text) = &part.text {
                out.push_str(text);
                any = true;
            }
        }
        any.then_some(out)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub session_id: String,
    pub sequence_index: i64,
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agent_event_joins_parts() {
        let event: AgentEvent = serde_json::from_value(json!({
            "content": { "parts": [{ "text": "Hel" }, { "inline_data": {} }, { "text": "lo" }] }
        }))
        .unwrap();
        assert_eq!(event.joined_text().as_deref(), Some("Hello"));
    }

    #[test]
    fn test_agent_event_without_text() {
        let event: AgentEvent =
            serde_json::from_value(json!({ "content": { "parts": [] } })).unwrap();
        assert_eq!(event.joined_text(), None);

        let event: AgentEvent = serde_json::from_value(json!({ "error": "boom" })).unwrap();
        assert_eq!(event.error.as_deref(), Some("boom"));
        assert_eq!(event.joined_text(), None);
    }

    #[test]
    fn test_agent_info_default_icon() {
        let agent: AgentInfo = serde_json::from_value(json!({
            "id": "financial_agent",
            "name": "Financial Analysis Agent",
            "description": "Analyze financial statements"
        }))
        .unwrap();
        assert_eq!(agent.icon, "🤖");
        assert!(agent.tags.is_empty());
    }

    #[test]
    fn test_completion_normality() {
        assert!(Completion::Sentinel.completed_normally());
        assert!(!Completion::EndOfStream { discarded_bytes: 0 }.completed_normally());
        assert!(!Completion::Failed.completed_normally());
    }
}
