//! The fixed tractography pipeline.
//!
//! DESIGN
//! ======
//! Stages run strictly in order over one validated bundle:
//!
//! ```text
//! mean b0 ─► median_otsu mask ─► tensor fit (FA) ─► seeds (FA > seed threshold)
//!         ─► tensor-ODF peaks ─► deterministic tracking ─► world-space streamlines
//! ```
//!
//! Every intermediate lives only for the duration of [`run`]. The caller gets
//! the streamlines and a few summary counts; any stage error aborts the run
//! and discards everything computed so far.

use tracing::info;

use super::bundle::ScanBundle;
use super::mask;
use super::peaks::{self, PeakSettings};
use super::sphere;
use super::tensor::{TensorError, TensorModel};
use super::tracking::{self, LocalTracker, TrackingSettings};

pub const DEFAULT_SEED_FA: f64 = 0.3;
pub const DEFAULT_STOP_FA: f64 = 0.2;
pub const DEFAULT_STEP_SIZE: f64 = 0.5;

// =============================================================================
// PARAMETERS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineParams {
    pub seed_fa_threshold: f64,
    pub stop_fa_threshold: f64,
    /// World units per tracking step.
    pub step_size: f64,
    pub relative_peak_threshold: f64,
    /// Degrees.
    pub min_separation_angle: f64,
    pub npeaks: usize,
    /// Maximum turn per step, degrees.
    pub max_angle: f64,
    /// Steps per direction from a seed.
    pub max_steps: usize,
    pub median_radius: usize,
    pub numpass: usize,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            seed_fa_threshold: DEFAULT_SEED_FA,
            stop_fa_threshold: DEFAULT_STOP_FA,
            step_size: DEFAULT_STEP_SIZE,
            relative_peak_threshold: 0.8,
            min_separation_angle: 15.0,
            npeaks: 5,
            max_angle: 60.0,
            max_steps: 500,
            median_radius: 2,
            numpass: 1,
        }
    }
}

impl PipelineParams {
    fn peak_settings(&self) -> PeakSettings {
        PeakSettings {
            relative_peak_threshold: self.relative_peak_threshold,
            min_separation_angle: self.min_separation_angle,
            npeaks: self.npeaks,
        }
    }

    fn tracking_settings(&self) -> TrackingSettings {
        TrackingSettings {
            step_size: self.step_size,
            max_angle: self.max_angle,
            stop_fa: self.stop_fa_threshold,
            max_steps: self.max_steps,
        }
    }
}

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no b0 volumes found for brain extraction")]
    NoB0Volumes,
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error("image affine is not invertible")]
    SingularAffine,
}

impl crate::error::ErrorCode for PipelineError {
    fn error_code(&self) -> &'static str {
        "E_PIPELINE"
    }
}

// =============================================================================
// RUN
// =============================================================================

/// Streamlines plus summary statistics for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TractographyResult {
    /// World-space point sequences.
    pub streamlines: Vec<Vec<[f64; 3]>>,
    pub seed_count: usize,
    pub mask_voxels: usize,
    /// Mean FA over the brain mask.
    pub mean_fa: f64,
}

/// Run every stage over `bundle`.
///
/// # Errors
///
/// Returns [`PipelineError`] when a stage cannot proceed; nothing computed
/// before the failure is returned.
#[allow(clippy::cast_precision_loss)]
pub fn run(bundle: &ScanBundle, params: &PipelineParams) -> Result<TractographyResult, PipelineError> {
    let volume = &bundle.volume;
    let grid = volume.grid;

    let b0 = mask::mean_b0(&volume.data, grid, &bundle.gtab.b0s_mask()).ok_or(PipelineError::NoB0Volumes)?;
    let (_, brain) = mask::median_otsu(&b0, grid, params.median_radius, params.numpass);
    let mask_voxels = brain.iter().filter(|m| **m).count();
    info!(mask_voxels, total = grid.len(), "pipeline: brain mask");

    let model = TensorModel::new(&bundle.gtab)?;
    let fit = model.fit(volume, &brain);
    let mean_fa = if mask_voxels == 0 {
        0.0
    } else {
        fit.fa.iter().zip(&brain).filter(|(_, m)| **m).map(|(v, _)| v).sum::<f64>() / mask_voxels as f64
    };
    info!(mean_fa, "pipeline: tensor fit");

    let seeds = tracking::seeds_from_fa(&fit.fa, grid, &volume.affine, params.seed_fa_threshold);
    info!(seeds = seeds.len(), threshold = params.seed_fa_threshold, "pipeline: seeds");

    let field = peaks::peaks_from_fit(&fit, &brain, sphere::default_sphere(), &params.peak_settings());
    info!(voxels = field.voxels_with_peaks(), "pipeline: peaks");

    let tracker = LocalTracker::new(&field, &fit.fa, volume.affine, &params.tracking_settings())
        .ok_or(PipelineError::SingularAffine)?;
    let streamlines = tracker.track(&seeds);
    info!(streamlines = streamlines.len(), "pipeline: tracking");

    Ok(TractographyResult { streamlines, seed_count: seeds.len(), mask_voxels, mean_fa })
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
