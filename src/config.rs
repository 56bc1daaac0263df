//! Server configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Every knob has a compiled-in default so the server starts with an empty
//! environment. LLM settings live in `llm::config`; this module covers the
//! HTTP listener, upload limits and the tractography parameters.

use crate::dmri::bundle::{DEFAULT_B0_THRESHOLD, LoadOptions};
use crate::dmri::nifti::DEFAULT_MAX_IMAGE_BYTES;
use crate::dmri::pipeline::PipelineParams;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_UPLOAD_MAX_BYTES: usize = 512 * 1024 * 1024;
pub const DEFAULT_MAX_TRACES: usize = 100;
pub const DEFAULT_BUNDLE_CACHE_SIZE: usize = 2;

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Tractography settings: pipeline parameters plus display decimation.
#[derive(Debug, Clone, PartialEq)]
pub struct TractConfig {
    pub pipeline: PipelineParams,
    /// Upper bound on rendered 3D traces.
    pub max_traces: usize,
    /// Volumes with a b-value at or below this are treated as b0.
    pub b0_threshold: f64,
    /// Cap on the decompressed DWI image.
    pub max_image_bytes: usize,
    /// Validated bundles kept in memory across requests.
    pub bundle_cache_size: usize,
}

impl TractConfig {
    /// - `TRACT_SEED_FA`: FA above which voxels are seeded (default 0.3)
    /// - `TRACT_STOP_FA`: FA at or below which tracking stops (default 0.2)
    /// - `TRACT_STEP_SIZE`: tracking step in world units (default 0.5)
    /// - `TRACT_MAX_TRACES`: rendered streamline cap (default 100)
    /// - `TRACT_B0_THRESHOLD`: b0 cutoff (default 50)
    /// - `TRACT_MAX_IMAGE_BYTES`: decompressed image cap (default 1 GiB)
    /// - `TRACT_BUNDLE_CACHE`: cached bundle count (default 2, minimum 1)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = PipelineParams::default();
        let pipeline = PipelineParams {
            seed_fa_threshold: env_parse("TRACT_SEED_FA", defaults.seed_fa_threshold),
            stop_fa_threshold: env_parse("TRACT_STOP_FA", defaults.stop_fa_threshold),
            step_size: env_parse("TRACT_STEP_SIZE", defaults.step_size),
            ..defaults
        };
        Self {
            pipeline,
            max_traces: env_parse("TRACT_MAX_TRACES", DEFAULT_MAX_TRACES).max(1),
            b0_threshold: env_parse("TRACT_B0_THRESHOLD", DEFAULT_B0_THRESHOLD),
            max_image_bytes: env_parse("TRACT_MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES),
            bundle_cache_size: env_parse("TRACT_BUNDLE_CACHE", DEFAULT_BUNDLE_CACHE_SIZE).max(1),
        }
    }

    #[must_use]
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions { b0_threshold: self.b0_threshold, max_image_bytes: self.max_image_bytes }
    }
}

impl Default for TractConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineParams::default(),
            max_traces: DEFAULT_MAX_TRACES,
            b0_threshold: DEFAULT_B0_THRESHOLD,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            bundle_cache_size: DEFAULT_BUNDLE_CACHE_SIZE,
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    /// Request body limit applied to the upload route.
    pub upload_max_bytes: usize,
    pub tract: TractConfig,
}

impl AppConfig {
    /// Build config from `PORT`, `UPLOAD_MAX_BYTES` and the `TRACT_*` variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            upload_max_bytes: env_parse("UPLOAD_MAX_BYTES", DEFAULT_UPLOAD_MAX_BYTES),
            tract: TractConfig::from_env(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT, upload_max_bytes: DEFAULT_UPLOAD_MAX_BYTES, tract: TractConfig::default() }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
