use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque identifier of a message inside one conversation
pub type MessageId = u64;

/// Who a message in the conversation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Error,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Error => "error",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A citation attached to an assistant answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub content_snippet: String,
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub chunk_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Source {
    pub fn snippet(content_snippet: impl Into<String>) -> Self {
        Self {
            content_snippet: content_snippet.into(),
            chunk_id: None,
            document_id: None,
            metadata: None,
        }
    }
}

/// One entry of the message list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            sources: Vec::new(),
            timestamp: Utc::now(),
            id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            sources,
            ..Self::new(Role::Assistant, content)
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Error, content)
    }

    /// Empty assistant message that streamed events fill in later.
    pub fn placeholder(id: MessageId) -> Self {
        Self {
            id: Some(id),
            ..Self::new(Role::Assistant, String::new())
        }
    }

    pub fn is_empty_placeholder(&self) -> bool {
        self.role == Role::Assistant && self.content.is_empty()
    }
}

/// Retrieval scope requested from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatMode {
    FullBook,
    SelectedText,
}

/// Which request body shape to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Book shape for single responses, thread shape for streams
    #[default]
    Auto,
    Book,
    Thread,
}

impl PayloadFormat {
    pub fn resolve(self, streaming: bool) -> PayloadFormat {
        match self {
            PayloadFormat::Auto if streaming => PayloadFormat::Thread,
            PayloadFormat::Auto => PayloadFormat::Book,
            other => other,
        }
    }
}

/// `{session_id, message, mode}` request body
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BookChatRequest {
    pub session_id: String,
    pub message: String,
    pub mode: ChatMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
}

/// `{thread_id, session_id, input, message}` request body
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ThreadChatRequest {
    pub thread_id: String,
    pub session_id: String,
    pub input: String,
    pub message: String,
}

/// Body of a chat POST
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ChatPayload {
    Book(BookChatRequest),
    Thread(ThreadChatRequest),
}

impl ChatPayload {
    /// Builds the request body for a question, optionally grounded in a
    /// piece of selected text.
    pub fn build(
        format: PayloadFormat,
        streaming: bool,
        session_id: &str,
        question: &str,
        context: Option<&str>,
    ) -> Self {
        let context = context.map(str::trim).filter(|c| !c.is_empty());
        let message = match context {
            Some(ctx) => format!("{} - Context: {}", question, ctx),
            None => question.to_string(),
        };

        match format.resolve(streaming) {
            PayloadFormat::Thread => ChatPayload::Thread(ThreadChatRequest {
                thread_id: session_id.to_string(),
                session_id: session_id.to_string(),
                input: message.clone(),
                message,
            }),
            _ => ChatPayload::Book(BookChatRequest {
                session_id: session_id.to_string(),
                message,
                mode: if context.is_some() {
                    ChatMode::SelectedText
                } else {
                    ChatMode::FullBook
                },
                selected_text: context.map(str::to_string),
            }),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ChatPayload::Book(req) => &req.message,
            ChatPayload::Thread(req) => &req.message,
        }
    }
}

/// Single JSON answer from the chat endpoint
#[derive(Deserialize, Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One `data: ` line of a streamed answer
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Full text of the answer so far; replaces what was shown before
    #[serde(rename = "assistant.response")]
    AssistantResponse {
        #[serde(default)]
        content: String,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        content: String,
    },
    #[serde(other)]
    Unknown,
}

/// Stored message as returned by the history endpoint
#[derive(Deserialize, Debug, Clone)]
pub struct HistoryEntry {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<Source>,
}

impl HistoryEntry {
    /// Converts the stored entry into a displayable message.
    ///
    /// Unknown roles become `error` so they stand out instead of passing
    /// for an answer.
    pub fn to_message(&self) -> Message {
        let role = match self.role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Error,
        };
        Message {
            role,
            content: self.content.clone(),
            sources: self.sources.clone(),
            timestamp: self
                .timestamp
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            id: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct HistoryResponse {
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<HistoryEntry>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DeleteSessionResponse {
    pub status: String,
    pub message: String,
}

/// Accepts RFC 3339 as well as naive ISO-8601 timestamps (treated as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_book_payload_without_context() {
        let payload = ChatPayload::build(PayloadFormat::Auto, false, "abc", "What is ROS 2?", None);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"session_id": "abc", "message": "What is ROS 2?", "mode": "full-book"})
        );
    }

    #[test]
    fn test_book_payload_with_selected_text() {
        let payload = ChatPayload::build(
            PayloadFormat::Book,
            true,
            "abc",
            "Explain this",
            Some("  digital twins  "),
        );
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "session_id": "abc",
                "message": "Explain this - Context: digital twins",
                "mode": "selected-text",
                "selected_text": "digital twins"
            })
        );
    }

    #[test]
    fn test_thread_payload_duplicates_fields() {
        let payload = ChatPayload::build(PayloadFormat::Auto, true, "s1", "hi", Some("   "));
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"thread_id": "s1", "session_id": "s1", "input": "hi", "message": "hi"})
        );
        assert_eq!(payload.message(), "hi");
    }

    #[test]
    fn test_chat_response_sources_default_to_empty() {
        let missing: ChatResponse = serde_json::from_str(r#"{"response": "ok"}"#).unwrap();
        assert!(missing.sources.is_empty());

        let null: ChatResponse =
            serde_json::from_str(r#"{"response": "ok", "sources": null}"#).unwrap();
        assert!(null.sources.is_empty());
    }

    #[test]
    fn test_source_accepts_backend_extras() {
        let source: Source = serde_json::from_value(json!({
            "chunk_id": 42,
            "content_snippet": "Humanoids balance using...",
            "document_id": "module-3",
            "metadata": {"page": 7}
        }))
        .unwrap();
        assert_eq!(source.chunk_id.as_deref(), Some("42"));
        assert_eq!(source.document_id.as_deref(), Some("module-3"));
        assert_eq!(source.metadata, Some(json!({"page": 7})));
    }

    #[test]
    fn test_stream_event_tags() {
        let token: StreamEvent =
            serde_json::from_str(r#"{"type": "assistant.response", "content": "Hello"}"#).unwrap();
        assert_eq!(
            token,
            StreamEvent::AssistantResponse {
                content: "Hello".to_string()
            }
        );

        let other: StreamEvent =
            serde_json::from_str(r#"{"type": "thread.created", "id": "t1"}"#).unwrap();
        assert_eq!(other, StreamEvent::Unknown);
    }

    #[test]
    fn test_history_entry_to_message() {
        let entry: HistoryEntry = serde_json::from_value(json!({
            "message_id": "m1",
            "session_id": "s1",
            "role": "assistant",
            "content": "Answer",
            "timestamp": "2024-05-01T10:15:30.123456",
            "sources": [{"content_snippet": "snippet"}]
        }))
        .unwrap();
        let message = entry.to_message();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.sources.len(), 1);
        assert_eq!(message.timestamp.to_rfc3339(), "2024-05-01T10:15:30.123456+00:00");
    }

    #[test]
    fn test_message_serializes_empty_sources() {
        let value = serde_json::to_value(Message::assistant("hi", Vec::new())).unwrap();
        assert_eq!(value["sources"], json!([]));
        assert_eq!(value["role"], json!("assistant"));
    }
}
