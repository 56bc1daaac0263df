//! HTML pages, embedded at compile time.

use axum::extract::State;
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;

use super::session_from_jar;
use crate::services::chat as chat_svc;
use crate::state::AppState;

pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../templates/index.html"))
}

/// NeuroBot chat page. Loading it discards the session's transcript, so a
/// reload starts a fresh conversation.
pub async fn chat(State(state): State<AppState>, jar: CookieJar) -> Response {
    let (jar, session_id) = session_from_jar(jar);
    chat_svc::reset(&state.sessions, &session_id).await;
    (jar, Html(include_str!("../../templates/chat.html"))).into_response()
}

/// Tractography viewer page.
pub async fn tract() -> Html<&'static str> {
    Html(include_str!("../../templates/tract.html"))
}
