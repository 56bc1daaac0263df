//! NeuroBot chat relay.
//!
//! DESIGN
//! ======
//! Each prompt is sent as a single-turn request under a fixed system
//! instruction; earlier turns are shown to the user but never replayed to
//! the model. Any failure, including an unconfigured LLM, collapses into
//! [`FALLBACK_REPLY`]. The user turn is recorded before the remote call so
//! it survives a failure.

use pulldown_cmark::{Event, Options, Parser, html};
use serde::Serialize;
use tracing::{info, warn};

use super::session::{self, SessionStore, with_session};
use crate::error::ErrorCode;
use crate::llm::types::{LlmChat, Message};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant knowledgeable in brain diseases.";
pub const FALLBACK_REPLY: &str = "OOOOOOOPPPPPSSSSSS! Sorry, I'm having trouble right now. Try again after sometime.";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("prompt must not be empty")]
    EmptyPrompt,
}

impl ErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "E_EMPTY_PROMPT",
        }
    }
}

/// One completed exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub user: Message,
    pub assistant: Message,
    /// The reply rendered from markdown, raw HTML stripped.
    pub assistant_html: String,
}

/// Render model markdown to HTML for display.
#[must_use]
pub fn render_markdown_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    // Model output never gets to inject markup of its own.
    let parser = Parser::new_ext(markdown, options).filter_map(|event| match event {
        Event::Html(_) | Event::InlineHtml(_) => None,
        other => Some(other),
    });

    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// Send `prompt` to the model and return its reply, or the fallback.
pub async fn relay(llm: Option<&dyn LlmChat>, prompt: &str) -> String {
    let Some(llm) = llm else {
        warn!("chat: LLM not configured");
        return FALLBACK_REPLY.to_owned();
    };
    match llm.chat(SYSTEM_PROMPT, &[Message::user(prompt)]).await {
        Ok(resp) => {
            info!(model = %resp.model, input_tokens = resp.input_tokens, output_tokens = resp.output_tokens, "chat: reply");
            resp.text
        }
        Err(e) => {
            warn!(error = %e, code = e.error_code(), "chat: relay failed");
            FALLBACK_REPLY.to_owned()
        }
    }
}

/// Record the user turn, relay, record the reply.
///
/// # Errors
///
/// Returns [`ChatError::EmptyPrompt`] for blank input; the transcript is
/// left untouched in that case.
pub async fn submit(
    sessions: &SessionStore,
    session_id: &str,
    llm: Option<&dyn LlmChat>,
    prompt: &str,
) -> Result<ChatTurn, ChatError> {
    if prompt.trim().is_empty() {
        return Err(ChatError::EmptyPrompt);
    }
    let user = Message::user(prompt);
    with_session(sessions, session_id, |s| s.messages.push(user.clone())).await;

    let assistant = Message::assistant(relay(llm, prompt).await);
    with_session(sessions, session_id, |s| s.messages.push(assistant.clone())).await;

    let assistant_html = render_markdown_html(&assistant.content);
    Ok(ChatTurn { user, assistant, assistant_html })
}

/// Transcript for a session; empty if the session is unknown.
pub async fn history(sessions: &SessionStore, session_id: &str) -> Vec<Message> {
    sessions
        .read()
        .await
        .get(session_id)
        .map(|s| s.messages.clone())
        .unwrap_or_default()
}

/// Start a new transcript: each load of the chat page begins empty.
pub async fn reset(sessions: &SessionStore, session_id: &str) {
    session::remove(sessions, session_id).await;
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
