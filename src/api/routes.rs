//! HTTP routes: the Poe bot endpoint and a health probe

use axum::{
    body::Bytes,
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::api::protocol::{self, PoeRequest, QueryRequest, SettingsResponse};
use crate::error::Result;
use crate::middleware::auth::AuthLayer;
use crate::pipeline::{ChatRequest, PartialResponse};
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {

    Router::new()
        .route("/", post(handle_poe_request))
        .route("/health", get(health))
        .layer(AuthLayer::new(state.settings.auth.access_key.as_str()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn handle_poe_request(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response> {
    let request: PoeRequest = serde_json::from_slice(&body)?;

    let response = match request {
        PoeRequest::Query(query) => stream_query(state, query),
        PoeRequest::Settings(_) => Json(SettingsResponse {
            allow_attachments: false,
            introduction_message: state.settings.poe.introduction_message.clone(),
        })
        .into_response(),
        PoeRequest::ReportFeedback(report) => {
            info!(message_id = ?report.message_id, feedback = ?report.feedback_type, "Feedback reported");
            Json(json!({})).into_response()
        }
        PoeRequest::ReportReaction(report) => {
            info!(message_id = ?report.message_id, reaction = ?report.reaction, "Reaction reported");
            Json(json!({})).into_response()
        }
        PoeRequest::ReportError(report) => {
            warn!(message = ?report.message, metadata = ?report.metadata, "Poe reported an error");
            Json(json!({})).into_response()
        }
    };

    Ok(response)
}

fn stream_query(state: Arc<AppState>, query: QueryRequest) -> Response {
    info!(
        message_id = %query.message_id,
        conversation_id = %query.conversation_id,
        turns = query.query.len(),
        "Received query"
    );

    let responses = state.bot.clone().respond(ChatRequest::from(query));

    let events = stream::once(async { protocol::meta_event() })
        .chain(responses.filter_map(|response| async move {
            match response {
                PartialResponse::Text(text) => Some(protocol::text_event(&text)),
                PartialResponse::Attachment(attachment) => {
                    debug!(filename = %attachment.filename, "Attachment already delivered");
                    None
                }
            }
        }))
        .chain(stream::once(async { protocol::done_event() }))
        .map(Ok::<Event, Infallible>);

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}
