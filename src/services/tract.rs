//! Tractography request handling: bundle cache, pipeline run, figures.
//!
//! DESIGN
//! ======
//! Loading and the pipeline are CPU-bound and run on the blocking pool.
//! Successfully validated bundles are kept in one small process-wide LRU
//! keyed by upload digest, so an identical resubmission skips reparsing.
//! The LRU capacity bounds how many decoded volumes stay resident. Pipeline
//! outputs are never cached: every request recomputes them.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::TractConfig;
use crate::dmri::bundle::{self, BundleError, BundleUpload, ScanBundle};
use crate::dmri::pipeline::{self, PipelineError};
use crate::error::ErrorCode;
use crate::viz;

pub const NO_STREAMLINES_MESSAGE: &str = "No streamlines were generated. Try adjusting FA threshold or mask.";

// =============================================================================
// BUNDLE CACHE
// =============================================================================

/// Validated bundles by upload digest, least recently used evicted first.
pub type BundleCache = Arc<Mutex<LruCache<String, Arc<ScanBundle>>>>;

/// A cache holding at most `capacity` bundles (minimum one).
#[must_use]
pub fn new_bundle_cache(capacity: usize) -> BundleCache {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Arc::new(Mutex::new(LruCache::new(capacity)))
}

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TractError {
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl ErrorCode for TractError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Bundle(e) => e.error_code(),
            Self::Pipeline(e) => e.error_code(),
            Self::Worker(_) => "E_PIPELINE",
        }
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Rendered figures for a run that produced streamlines.
#[derive(Debug, Clone, Serialize)]
pub struct TractView {
    pub streamline_count: usize,
    pub rendered_count: usize,
    /// `true` when the bundle came from the bundle cache.
    pub bundle_cached: bool,
    pub tract_figure: Value,
    pub age_figure: Value,
    pub hemisphere_figure: Value,
}

#[derive(Debug, Clone)]
pub enum TractOutcome {
    Rendered(TractView),
    /// Valid bundle, zero streamlines: warn instead of drawing an empty scene.
    NoStreamlines { message: &'static str },
}

// =============================================================================
// ANALYZE
// =============================================================================

/// Validate `upload`, run the pipeline and build the page's figures.
///
/// # Errors
///
/// Returns [`TractError::Bundle`] when the upload is unreadable or its
/// gradient table disagrees with the image (the pipeline never runs), and
/// [`TractError::Pipeline`] / [`TractError::Worker`] when a stage fails.
pub async fn analyze(
    bundles: &BundleCache,
    upload: BundleUpload,
    config: &TractConfig,
) -> Result<TractOutcome, TractError> {
    let digest = upload.digest();
    let cached = bundles.lock().await.get(&digest).map(Arc::clone);

    let bundle_cached = cached.is_some();
    let scan = match cached {
        Some(scan) => {
            info!(digest = %&digest[..12], "tract: reusing cached bundle");
            scan
        }
        None => {
            let options = config.load_options();
            let scan = Arc::new(blocking(move || bundle::load_bundle(&upload, &options)).await??);
            let evicted = bundles.lock().await.push(digest.clone(), Arc::clone(&scan));
            if let Some((evicted, _)) = evicted.filter(|(k, _)| *k != digest) {
                info!(digest = %&evicted[..12], "tract: evicted cached bundle");
            }
            scan
        }
    };

    let params = config.pipeline.clone();
    let result = blocking(move || pipeline::run(&scan, &params)).await?.inspect_err(|e| {
        error!(error = %e, code = e.error_code(), "tract: pipeline failed");
    })?;

    if result.streamlines.is_empty() {
        info!(seeds = result.seed_count, "tract: no streamlines");
        return Ok(TractOutcome::NoStreamlines { message: NO_STREAMLINES_MESSAGE });
    }

    let shown = viz::decimate(&result.streamlines, config.max_traces);
    let view = TractView {
        streamline_count: result.streamlines.len(),
        rendered_count: shown.len(),
        bundle_cached,
        tract_figure: viz::tract_figure(&shown),
        age_figure: viz::age_figure(),
        hemisphere_figure: viz::hemisphere_figure(&mut rand::rng()),
    };
    info!(streamlines = view.streamline_count, rendered = view.rendered_count, "tract: rendered");
    Ok(TractOutcome::Rendered(view))
}

async fn blocking<T, F>(f: F) -> Result<T, TractError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TractError::Worker(e.to_string()))
}

#[cfg(test)]
#[path = "tract_test.rs"]
mod tests;
