//! Scan bundle loading and validation.
//!
//! DESIGN
//! ======
//! An upload is three byte streams: the DWI image, b-vectors and b-values.
//! The image is buffered to a temporary file for the duration of one load,
//! parsed, and the gradient files are checked against its volume count.
//! Any mismatch is terminal for the bundle: nothing downstream runs.
//!
//! The SHA-256 digest of the triple lets callers skip reloading when the same
//! files are submitted again.

use std::io::Write as _;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::gradients::{self, GradientError, GradientTable};
use super::nifti::{self, NiftiError, Volume};

pub const DEFAULT_B0_THRESHOLD: f64 = 50.0;
pub const MISMATCH_MESSAGE: &str = "Mismatch between DWI volumes and gradient table!";

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("failed to buffer upload: {0}")]
    Buffer(#[from] std::io::Error),
    #[error(transparent)]
    Nifti(#[from] NiftiError),
    #[error("{file}: {source}")]
    Gradient {
        file: &'static str,
        #[source]
        source: GradientError,
    },
    #[error("{file} is not valid UTF-8 text")]
    Encoding { file: &'static str },
    #[error("{}", MISMATCH_MESSAGE)]
    Mismatch { volumes: usize, bvecs: usize, bvals: usize },
}

impl crate::error::ErrorCode for BundleError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "E_UPLOAD_IO",
            Self::Nifti(e) => e.error_code(),
            Self::Gradient { source, .. } => source.error_code(),
            Self::Encoding { .. } => "E_GRADIENT_FORMAT",
            Self::Mismatch { .. } => "E_GRADIENT_MISMATCH",
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// Raw uploaded files.
#[derive(Debug, Clone, Default)]
pub struct BundleUpload {
    pub dwi: Vec<u8>,
    pub bvecs: Vec<u8>,
    pub bvals: Vec<u8>,
}

impl BundleUpload {
    /// Hex SHA-256 over the three files, length-prefixed so boundaries matter.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.dwi, &self.bvecs, &self.bvals] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        hex::encode(hasher.finalize())
    }
}

/// Knobs for [`load_bundle`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    /// Volumes with a b-value at or below this are treated as b0.
    pub b0_threshold: f64,
    /// Cap on the decompressed image size.
    pub max_image_bytes: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { b0_threshold: DEFAULT_B0_THRESHOLD, max_image_bytes: nifti::DEFAULT_MAX_IMAGE_BYTES }
    }
}

/// A validated scan: image plus matching gradient table.
#[derive(Debug, Clone)]
pub struct ScanBundle {
    pub volume: Volume,
    pub gtab: GradientTable,
}

// =============================================================================
// LOADING
// =============================================================================

/// Load and validate an uploaded bundle.
///
/// # Errors
///
/// Returns [`BundleError::Mismatch`] when the gradient counts disagree with
/// the image's volume count, and other variants for unreadable inputs.
pub fn load_bundle(upload: &BundleUpload, options: &LoadOptions) -> Result<ScanBundle, BundleError> {
    let volume = load_volume(&upload.dwi, options.max_image_bytes)?;

    let bvecs_text = std::str::from_utf8(&upload.bvecs).map_err(|_| BundleError::Encoding { file: "bvecs" })?;
    let bvals_text = std::str::from_utf8(&upload.bvals).map_err(|_| BundleError::Encoding { file: "bvals" })?;
    let bvecs = gradients::parse_bvecs(bvecs_text).map_err(|source| BundleError::Gradient { file: "bvecs", source })?;
    let bvals = gradients::parse_bvals(bvals_text).map_err(|source| BundleError::Gradient { file: "bvals", source })?;

    if bvecs.len() != volume.n_volumes || bvals.len() != volume.n_volumes {
        warn!(volumes = volume.n_volumes, bvecs = bvecs.len(), bvals = bvals.len(), "bundle: gradient table mismatch");
        return Err(BundleError::Mismatch { volumes: volume.n_volumes, bvecs: bvecs.len(), bvals: bvals.len() });
    }

    let gtab = GradientTable::new(bvals, bvecs, options.b0_threshold)
        .map_err(|source| BundleError::Gradient { file: "bvals", source })?;
    info!(
        dims = ?volume.grid.dims,
        volumes = volume.n_volumes,
        b0s = gtab.b0s_mask().iter().filter(|b| **b).count(),
        "bundle: loaded"
    );
    Ok(ScanBundle { volume, gtab })
}

/// Buffer image bytes to a temp file and read them back as NIfTI.
fn load_volume(bytes: &[u8], max_bytes: usize) -> Result<Volume, BundleError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("neurolab-dwi-")
        .suffix(".nii.gz")
        .tempfile()?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    Ok(nifti::read_nifti(tmp.path(), max_bytes)?)
}

#[cfg(test)]
#[path = "bundle_test.rs"]
mod tests;
