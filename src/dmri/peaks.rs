//! Peak extraction from sampled ODFs.
//!
//! DESIGN
//! ======
//! For each masked voxel the tensor ODF is evaluated on every sphere vertex.
//! Peaks are the discrete local maxima, filtered in three steps:
//!
//! 1. keep maxima whose height above the ODF floor is at least
//!    `relative_peak_threshold` of the tallest one,
//! 2. drop any maximum within `min_separation_angle` of a stronger one
//!    (antipodes count as the same axis),
//! 3. keep at most `npeaks`.

use super::grid::Grid;
use super::sphere::Sphere;
use super::tensor::{TensorFit, dot};

/// Peak-selection thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakSettings {
    pub relative_peak_threshold: f64,
    pub min_separation_angle: f64,
    pub npeaks: usize,
}

/// Local maxima of `odf` over the sphere graph, strongest first.
///
/// A vertex is a maximum when no neighbor is strictly larger. Plateaus keep
/// every tied vertex.
#[must_use]
pub fn local_maxima(odf: &[f64], neighbors: &[Vec<usize>]) -> Vec<(f64, usize)> {
    let mut maxima: Vec<(f64, usize)> = odf
        .iter()
        .enumerate()
        .filter(|(i, v)| neighbors[*i].iter().all(|&j| odf[j] <= **v))
        .map(|(i, v)| (*v, i))
        .collect();
    maxima.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    maxima
}

/// Indices of `dirs` that survive angular de-duplication, in input order.
///
/// Each direction is kept unless it lies within `min_angle_deg` of an
/// already kept one, treating `v` and `-v` as equal.
#[must_use]
pub fn remove_similar(dirs: &[[f64; 3]], min_angle_deg: f64) -> Vec<usize> {
    let cos_limit = min_angle_deg.to_radians().cos();
    let mut kept: Vec<usize> = Vec::new();
    for (i, d) in dirs.iter().enumerate() {
        if kept.iter().all(|&k| dot(dirs[k], *d).abs() < cos_limit) {
            kept.push(i);
        }
    }
    kept
}

/// Peak directions of one ODF sampled on `sphere`.
#[must_use]
pub fn peak_directions(odf: &[f64], sphere: &Sphere, settings: &PeakSettings) -> Vec<[f64; 3]> {
    let maxima = local_maxima(odf, &sphere.neighbors);
    match maxima.first() {
        None => return Vec::new(),
        Some((top, _)) if *top < 0.0 => return Vec::new(),
        Some((_, idx)) if maxima.len() == 1 => return vec![sphere.vertices[*idx]],
        Some(_) => {}
    }

    let floor = odf.iter().copied().fold(f64::INFINITY, f64::min).max(0.0);
    let cutoff = (maxima[0].0 - floor) * settings.relative_peak_threshold;
    let candidates: Vec<[f64; 3]> = maxima
        .iter()
        .take_while(|(v, _)| v - floor >= cutoff)
        .map(|(_, i)| sphere.vertices[*i])
        .collect();

    remove_similar(&candidates, settings.min_separation_angle)
        .into_iter()
        .take(settings.npeaks)
        .map(|i| candidates[i])
        .collect()
}

// =============================================================================
// PEAK FIELD
// =============================================================================

/// Per-voxel peak directions in voxel orientation.
#[derive(Debug, Clone)]
pub struct PeakField {
    pub grid: Grid,
    pub peaks: Vec<Vec<[f64; 3]>>,
}

impl PeakField {
    /// Peaks of the voxel nearest to voxel-space point `p`; empty outside.
    #[must_use]
    pub fn at(&self, p: [f64; 3]) -> &[[f64; 3]] {
        self.grid.nearest(p).map_or(&[], |i| self.peaks[i].as_slice())
    }

    /// Number of voxels carrying at least one peak.
    #[must_use]
    pub fn voxels_with_peaks(&self) -> usize {
        self.peaks.iter().filter(|p| !p.is_empty()).count()
    }
}

/// Evaluate the tensor ODF of every masked voxel and extract its peaks.
#[must_use]
pub fn peaks_from_fit(fit: &TensorFit, mask: &[bool], sphere: &Sphere, settings: &PeakSettings) -> PeakField {
    let mut odf = vec![0.0; sphere.len()];
    let peaks = fit
        .tensors
        .iter()
        .zip(mask)
        .map(|(tensor, inside)| match tensor {
            Some(t) if *inside => {
                for (o, v) in odf.iter_mut().zip(&sphere.vertices) {
                    *o = t.odf(*v);
                }
                peak_directions(&odf, sphere, settings)
            }
            _ => Vec::new(),
        })
        .collect();
    PeakField { grid: fit.grid, peaks }
}

#[cfg(test)]
#[path = "peaks_test.rs"]
mod tests;
