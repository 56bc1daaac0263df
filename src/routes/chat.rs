//! NeuroBot chat API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use super::session_from_jar;
use crate::error::ApiError;
use crate::llm::types::Message;
use crate::services::chat as chat_svc;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    prompt: String,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    messages: Vec<Message>,
}

/// `GET /api/chat`: the session's transcript.
pub async fn history(State(state): State<AppState>, jar: CookieJar) -> Response {
    let (jar, session_id) = session_from_jar(jar);
    let messages = chat_svc::history(&state.sessions, &session_id).await;
    (jar, Json(HistoryResponse { messages })).into_response()
}

/// `POST /api/chat`: relay one prompt and return both turns.
pub async fn send(State(state): State<AppState>, jar: CookieJar, Json(body): Json<ChatRequest>) -> Response {
    let (jar, session_id) = session_from_jar(jar);
    match chat_svc::submit(&state.sessions, &session_id, state.llm.as_deref(), &body.prompt).await {
        Ok(turn) => (jar, Json(turn)).into_response(),
        Err(e) => (jar, ApiError::from_err(StatusCode::BAD_REQUEST, &e)).into_response(),
    }
}
