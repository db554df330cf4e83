//! Poe server-bot protocol types and SSE event encoding

use axum::response::sse::Event;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::pipeline::{ChatMessage, ChatRequest};

/// Every request Poe sends to the bot endpoint
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoeRequest {
    Query(QueryRequest),
    Settings(SettingsRequest),
    ReportFeedback(ReportRequest),
    ReportReaction(ReportRequest),
    ReportError(ReportRequest),
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub version: String,
    pub query: Vec<ProtocolMessage>,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub conversation_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsRequest {
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub feedback_type: Option<String>,
    #[serde(default)]
    pub reaction: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub allow_attachments: bool,
    pub introduction_message: String,
}

impl From<QueryRequest> for ChatRequest {
    fn from(query: QueryRequest) -> Self {
        Self {
            message_id: query.message_id,
            messages: query
                .query
                .into_iter()
                .map(|message| ChatMessage {
                    role: message.role,
                    content: message.content,
                })
                .collect(),
        }
    }
}

pub fn meta_event() -> Event {
    Event::default().event("meta").data(
        json!({
            "content_type": "text/markdown",
            "linkify": true,
            "suggested_replies": false,
        })
        .to_string(),
    )
}

pub fn text_event(text: &str) -> Event {
    Event::default()
        .event("text")
        .data(json!({ "text": text }).to_string())
}

pub fn done_event() -> Event {
    Event::default().event("done").data("{}")
}
