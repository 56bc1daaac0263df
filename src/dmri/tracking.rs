//! Seeding and deterministic local tracking.
//!
//! DESIGN
//! ======
//! Tracking runs in voxel space. Seeds arrive in world space and are mapped
//! through the inverse affine; finished streamlines are mapped back. Each
//! step moves `step_size` world units along the chosen peak, scaled per axis
//! by the voxel size.
//!
//! From every seed, each peak at the seed voxel starts one streamline, traced
//! forward along the peak and backward along its negation. A direction is
//! continued with the peak closest to the incoming direction; if the closest
//! one turns more than `max_angle` the trace ends there.
//!
//! Stopping per point: trilinear FA above `stop_fa` keeps tracking, otherwise
//! the point is kept as an endpoint and the trace ends. A point outside the
//! image ends the trace and is discarded.

use super::grid::{Affine, Grid};
use super::peaks::PeakField;
use super::tensor::dot;

/// Local tracking settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSettings {
    pub step_size: f64,
    pub max_angle: f64,
    pub stop_fa: f64,
    pub max_steps: usize,
}

/// World-space seed at each voxel center where `fa > threshold`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn seeds_from_fa(fa: &[f64], grid: Grid, affine: &Affine, threshold: f64) -> Vec<[f64; 3]> {
    fa.iter()
        .enumerate()
        .filter(|(_, v)| **v > threshold)
        .map(|(i, _)| {
            let [x, y, z] = grid.coords(i);
            affine.apply([x as f64, y as f64, z as f64])
        })
        .collect()
}

/// Result of checking a new point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointStatus {
    Track,
    Endpoint,
    Outside,
}

pub struct LocalTracker<'a> {
    peaks: &'a PeakField,
    fa: &'a [f64],
    affine: Affine,
    inverse: Affine,
    /// Per-axis voxel displacement for one unit of world step.
    step: [f64; 3],
    cos_max_angle: f64,
    stop_fa: f64,
    max_steps: usize,
}

impl<'a> LocalTracker<'a> {
    /// Returns `None` when the affine is singular.
    #[must_use]
    pub fn new(peaks: &'a PeakField, fa: &'a [f64], affine: Affine, settings: &TrackingSettings) -> Option<Self> {
        let inverse = affine.inverse()?;
        let vs = affine.voxel_size();
        if vs.iter().any(|v| *v <= 0.0 || !v.is_finite()) {
            return None;
        }
        Some(Self {
            peaks,
            fa,
            affine,
            inverse,
            step: [settings.step_size / vs[0], settings.step_size / vs[1], settings.step_size / vs[2]],
            cos_max_angle: settings.max_angle.to_radians().cos(),
            stop_fa: settings.stop_fa,
            max_steps: settings.max_steps,
        })
    }

    /// Track from every seed. Streamlines shorter than two points are dropped.
    #[must_use]
    pub fn track(&self, seeds: &[[f64; 3]]) -> Vec<Vec<[f64; 3]>> {
        let mut out = Vec::new();
        for seed in seeds {
            let start = self.inverse.apply(*seed);
            for first in self.peaks.at(start) {
                let forward = self.trace(start, *first);
                let backward = self.trace(start, [-first[0], -first[1], -first[2]]);
                if forward.len() + backward.len() == 0 {
                    continue;
                }
                let line: Vec<[f64; 3]> = backward
                    .iter()
                    .rev()
                    .chain(std::iter::once(&start))
                    .chain(forward.iter())
                    .map(|p| self.affine.apply(*p))
                    .collect();
                out.push(line);
            }
        }
        out
    }

    /// Follow peaks from `start` along `direction`, excluding `start` itself.
    fn trace(&self, start: [f64; 3], direction: [f64; 3]) -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        let mut point = start;
        let mut dir = direction;
        for _ in 0..self.max_steps {
            let Some(next) = self.closest_peak(point, dir) else {
                break;
            };
            dir = next;
            for axis in 0..3 {
                point[axis] += dir[axis] * self.step[axis];
            }
            match self.check(point) {
                PointStatus::Track => points.push(point),
                PointStatus::Endpoint => {
                    points.push(point);
                    break;
                }
                PointStatus::Outside => break,
            }
        }
        points
    }

    /// Peak at `point` closest to `prev`, flipped to agree with it.
    fn closest_peak(&self, point: [f64; 3], prev: [f64; 3]) -> Option<[f64; 3]> {
        let (best, cos) = self
            .peaks
            .at(point)
            .iter()
            .map(|p| (*p, dot(*p, prev)))
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))?;
        if cos.abs() < self.cos_max_angle {
            return None;
        }
        Some(if cos < 0.0 { [-best[0], -best[1], -best[2]] } else { best })
    }

    fn check(&self, point: [f64; 3]) -> PointStatus {
        match self.peaks.grid.trilinear(self.fa, point) {
            None => PointStatus::Outside,
            Some(v) if v > self.stop_fa => PointStatus::Track,
            Some(_) => PointStatus::Endpoint,
        }
    }
}

#[cfg(test)]
#[path = "tracking_test.rs"]
mod tests;
