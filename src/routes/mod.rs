//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the three HTML pages, the JSON APIs behind them
//! and a health check. Pages are static HTML; all dynamic content is fetched
//! from `/api/*` by the page scripts.

pub mod chat;
pub mod pages;
pub mod tract;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::session;
use crate::state::AppState;

pub(crate) const SESSION_COOKIE: &str = "neurolab_session";

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let upload_limit = state.config.upload_max_bytes;

    Router::new()
        .route("/", get(pages::index))
        .route("/chat", get(pages::chat))
        .route("/tract", get(pages::tract))
        .route("/api/chat", get(chat::history).post(chat::send))
        .route("/api/tract", post(tract::analyze))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Session id from the cookie jar, issuing a fresh cookie when absent.
pub(crate) fn session_from_jar(jar: CookieJar) -> (CookieJar, String) {
    if let Some(existing) = jar.get(SESSION_COOKIE).map(Cookie::value).filter(|v| !v.is_empty()) {
        let id = existing.to_owned();
        return (jar, id);
    }
    let id = session::generate_token();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), id)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
