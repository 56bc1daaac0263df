use std::sync::Mutex;

use super::*;
use crate::llm::types::{ChatResponse, LlmError};
use crate::services::session::new_store;

// =========================================================================
// Mocks
// =========================================================================

struct MockLlm {
    reply: String,
    seen: Mutex<Vec<(String, Vec<Message>)>>,
}

impl MockLlm {
    fn new(reply: &str) -> Self {
        Self { reply: reply.into(), seen: Mutex::new(Vec::new()) }
    }
}

#[async_trait::async_trait]
impl LlmChat for MockLlm {
    async fn chat(&self, system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        self.seen.lock().unwrap().push((system.to_owned(), messages.to_vec()));
        Ok(ChatResponse { text: self.reply.clone(), model: "mock".into(), input_tokens: 3, output_tokens: 4 })
    }
}

struct FailingLlm;

#[async_trait::async_trait]
impl LlmChat for FailingLlm {
    async fn chat(&self, _system: &str, _messages: &[Message]) -> Result<ChatResponse, LlmError> {
        Err(LlmError::ApiParse("chat_completions: missing choices[0]".into()))
    }
}

// =========================================================================
// relay
// =========================================================================

#[tokio::test]
async fn relay_sends_single_turn_with_system_prompt() {
    let mock = MockLlm::new("The hippocampus.");
    let reply = relay(Some(&mock), "Where is memory formed?").await;
    assert_eq!(reply, "The hippocampus.");
    let seen = mock.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, SYSTEM_PROMPT);
    assert_eq!(seen[0].1, vec![Message::user("Where is memory formed?")]);
}

#[tokio::test]
async fn relay_failure_returns_fallback() {
    assert_eq!(relay(Some(&FailingLlm), "hello").await, FALLBACK_REPLY);
}

#[tokio::test]
async fn relay_without_llm_returns_fallback() {
    assert_eq!(relay(None, "hello").await, FALLBACK_REPLY);
}

// =========================================================================
// submit / history
// =========================================================================

#[tokio::test]
async fn submit_appends_both_turns() {
    let store = new_store();
    let mock = MockLlm::new("Answer");
    let turn = submit(&store, "s1", Some(&mock), "Question").await.unwrap();
    assert_eq!(turn.user, Message::user("Question"));
    assert_eq!(turn.assistant, Message::assistant("Answer"));
    assert_eq!(history(&store, "s1").await, vec![Message::user("Question"), Message::assistant("Answer")]);
}

#[tokio::test]
async fn failed_relay_still_records_user_turn() {
    let store = new_store();
    let turn = submit(&store, "s1", Some(&FailingLlm), "Question").await.unwrap();
    assert_eq!(turn.assistant.content, FALLBACK_REPLY);
    let log = history(&store, "s1").await;
    assert_eq!(log.len(), 2);
    assert_eq!(log[0], Message::user("Question"));
}

#[tokio::test]
async fn only_the_new_prompt_reaches_the_model() {
    let store = new_store();
    let mock = MockLlm::new("ok");
    submit(&store, "s1", Some(&mock), "first").await.unwrap();
    submit(&store, "s1", Some(&mock), "second").await.unwrap();
    let seen = mock.seen.lock().unwrap();
    assert_eq!(seen[1].1, vec![Message::user("second")]);
    drop(seen);
    assert_eq!(history(&store, "s1").await.len(), 4);
}

#[tokio::test]
async fn empty_prompt_is_rejected_without_mutation() {
    let store = new_store();
    let err = submit(&store, "s1", None, "   ").await.unwrap_err();
    assert_eq!(err.error_code(), "E_EMPTY_PROMPT");
    assert!(history(&store, "s1").await.is_empty());
    assert!(store.read().await.is_empty());
}

#[tokio::test]
async fn history_of_unknown_session_is_empty() {
    assert!(history(&new_store(), "nobody").await.is_empty());
}

#[tokio::test]
async fn reset_starts_a_fresh_transcript() {
    let store = new_store();
    submit(&store, "s1", None, "Question").await.unwrap();
    submit(&store, "s2", None, "Other").await.unwrap();
    reset(&store, "s1").await;
    assert!(history(&store, "s1").await.is_empty());
    assert_eq!(history(&store, "s2").await.len(), 2);
}

// =========================================================================
// markdown
// =========================================================================

#[test]
fn markdown_reply_renders_as_html() {
    let html = render_markdown_html("**MS** affects:\n\n- myelin\n- `nerves`");
    assert!(html.contains("<strong>MS</strong>"));
    assert!(html.contains("<li>myelin</li>"));
    assert!(html.contains("<code>nerves</code>"));
}

#[test]
fn raw_html_in_reply_is_dropped() {
    let html = render_markdown_html("hi <script>alert(1)</script>\n\n<div onclick=x>block</div>");
    assert!(!html.contains("<script"));
    assert!(!html.contains("<div"));
    assert!(html.contains("hi"));
}

#[tokio::test]
async fn submit_returns_rendered_reply() {
    let store = new_store();
    let mock = MockLlm::new("# Title");
    let turn = submit(&store, "s1", Some(&mock), "q").await.unwrap();
    assert_eq!(turn.assistant_html.trim(), "<h1>Title</h1>");
    assert_eq!(history(&store, "s1").await[1].content, "# Title");
}
