//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the optional LLM client, the in-memory session store, the bounded
//! scan bundle cache and the parsed configuration. Clone is required by Axum; every field is cheap to clone.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::LlmChat;
use crate::services::session::{self, SessionStore};
use crate::services::tract::{self as tract_svc, BundleCache};

#[derive(Clone)]
pub struct AppState {
    /// `None` when no API key is configured; chat then always falls back.
    pub llm: Option<Arc<dyn LlmChat>>,
    pub sessions: SessionStore,
    pub bundles: BundleCache,
    pub config: Arc<AppConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, llm: Option<Arc<dyn LlmChat>>) -> Self {
        let bundles = tract_svc::new_bundle_cache(config.tract.bundle_cache_size);
        Self { llm, sessions: session::new_store(), bundles, config: Arc::new(config) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
