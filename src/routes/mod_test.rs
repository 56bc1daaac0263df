use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use super::*;
use crate::llm::types::{ChatResponse, LlmChat, LlmError, Message};
use crate::services::chat::FALLBACK_REPLY;
use crate::state::test_helpers;

struct EchoLlm;

#[async_trait::async_trait]
impl LlmChat for EchoLlm {
    async fn chat(&self, _system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        Ok(ChatResponse {
            text: format!("echo: {}", messages[0].content),
            model: "mock".into(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn session_cookie(resp: &axum::response::Response) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(SESSION_COOKIE))
        .and_then(|v| v.split(';').next())
        .map(str::to_owned)
}

fn post_chat(prompt: &str, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::post("/api/chat").header(header::CONTENT_TYPE, "application/json");
    if let Some(c) = cookie {
        req = req.header(header::COOKIE, c);
    }
    req.body(Body::from(serde_json::json!({ "prompt": prompt }).to_string())).unwrap()
}

// =============================================================================
// pages and health
// =============================================================================

#[tokio::test]
async fn healthz_ok() {
    let resp = app(test_helpers::test_app_state())
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn pages_are_html() {
    for (path, needle) in [("/", "NeuroBot"), ("/chat", "NeuroBot"), ("/tract", "Tractography")] {
        let resp = app(test_helpers::test_app_state())
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
        let ct = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_owned();
        assert!(ct.starts_with("text/html"), "{path}: {ct}");
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains(needle), "{path}");
    }
}

#[tokio::test]
async fn unknown_route_is_404() {
    let resp = app(test_helpers::test_app_state())
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// session cookie
// =============================================================================

#[test]
fn session_from_jar_issues_cookie_once() {
    let (jar, id) = session_from_jar(CookieJar::new());
    assert_eq!(id.len(), 64);
    assert_eq!(jar.get(SESSION_COOKIE).map(Cookie::value), Some(id.as_str()));

    let (_, again) = session_from_jar(jar);
    assert_eq!(again, id);
}

// =============================================================================
// chat API
// =============================================================================

#[tokio::test]
async fn chat_round_trip_keeps_transcript_per_cookie() {
    let state = test_helpers::test_app_state_with_llm(Arc::new(EchoLlm));

    let resp = app(state.clone()).oneshot(post_chat("What is MS?", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie(&resp).expect("session cookie issued");
    let body = body_json(resp).await;
    assert_eq!(body["user"]["content"], "What is MS?");
    assert_eq!(body["assistant"]["role"], "assistant");
    assert_eq!(body["assistant"]["content"], "echo: What is MS?");
    assert_eq!(body["assistant_html"].as_str().unwrap().trim(), "<p>echo: What is MS?</p>");

    let resp = app(state.clone())
        .oneshot(Request::get("/api/chat").header(header::COOKIE, &cookie).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);

    let resp = app(state)
        .oneshot(Request::get("/api/chat").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert!(body["messages"].as_array().unwrap().is_empty(), "new browser, new transcript");
}

#[tokio::test]
async fn reloading_chat_page_starts_empty_transcript() {
    let state = test_helpers::test_app_state_with_llm(Arc::new(EchoLlm));
    let resp = app(state.clone()).oneshot(post_chat("first", None)).await.unwrap();
    let cookie = session_cookie(&resp).expect("session cookie issued");
    app(state.clone()).oneshot(post_chat("second", Some(&cookie))).await.unwrap();

    let resp = app(state.clone())
        .oneshot(Request::get("/chat").header(header::COOKIE, &cookie).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app(state)
        .oneshot(Request::get("/api/chat").header(header::COOKIE, &cookie).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(body_json(resp).await["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn chat_page_issues_session_cookie() {
    let resp = app(test_helpers::test_app_state())
        .oneshot(Request::get("/chat").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(session_cookie(&resp).is_some());
}

#[tokio::test]
async fn chat_without_llm_returns_fallback() {
    let resp = app(test_helpers::test_app_state()).oneshot(post_chat("hello", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["assistant"]["content"], FALLBACK_REPLY);
}

#[tokio::test]
async fn blank_prompt_is_400() {
    let state = test_helpers::test_app_state();
    let resp = app(state.clone()).oneshot(post_chat("  ", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["code"], "E_EMPTY_PROMPT");
    assert!(state.sessions.read().await.is_empty());
}
