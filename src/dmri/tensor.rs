//! Diffusion tensor model: log-linear least-squares fit, eigen-decomposition,
//! fractional anisotropy and the tensor ODF.
//!
//! DESIGN
//! ======
//! The signal model is `ln S = ln S0 - b gᵀ D g`. The 7-column design matrix
//! (six tensor elements plus `ln S0`) depends only on the gradient table, so
//! its pseudo-inverse is computed once and reused for every voxel. b-values
//! are divided by the largest b before solving to keep the normal matrix well
//! conditioned; the scale is undone on the way out.

use std::f64::consts::PI;

use super::gradients::GradientTable;
use super::grid::Grid;
use super::nifti::Volume;

const N_COEFFS: usize = 7;
const MIN_SIGNAL: f64 = 1e-4;
const MIN_DIRECTIONS: usize = 6;
const DIFFUSIVITY_TOL: f64 = 1e-6;
const JACOBI_SWEEPS: usize = 50;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    #[error("tensor fit needs at least {MIN_DIRECTIONS} diffusion-weighted volumes, found {0}")]
    TooFewDirections(usize),
    #[error("gradient directions do not span the tensor model (design matrix is singular)")]
    SingularDesign,
}

// =============================================================================
// TENSOR
// =============================================================================

/// Eigen-decomposed diffusion tensor for one voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tensor {
    /// Eigenvalues, descending.
    pub evals: [f64; 3],
    /// `evecs[k]` is the unit eigenvector for `evals[k]`.
    pub evecs: [[f64; 3]; 3],
}

impl Tensor {
    /// Build from the six unique elements `[xx, yy, zz, xy, xz, yz]`.
    #[must_use]
    pub fn from_elements(d: [f64; 6], min_diffusivity: f64) -> Self {
        let m = [[d[0], d[3], d[4]], [d[3], d[1], d[5]], [d[4], d[5], d[2]]];
        let (mut evals, evecs) = eigh3(m);
        for v in &mut evals {
            if !v.is_finite() || *v < min_diffusivity {
                *v = min_diffusivity;
            }
        }
        Self { evals, evecs }
    }

    #[must_use]
    pub fn fa(&self) -> f64 {
        fractional_anisotropy(self.evals)
    }

    /// Principal diffusion direction.
    #[must_use]
    pub fn principal_direction(&self) -> [f64; 3] {
        self.evecs[0]
    }

    /// Tensor orientation distribution function at unit direction `u`.
    #[must_use]
    pub fn odf(&self, u: [f64; 3]) -> f64 {
        let [l1, l2, l3] = self.evals;
        let lower = 4.0 * PI * (l1 * l2 * l3).sqrt();
        let quad: f64 = (0..3).map(|k| dot(u, self.evecs[k]).powi(2) / self.evals[k]).sum();
        1.0 / (lower * quad.powf(1.5))
    }
}

/// FA from eigenvalues, clipped to `[0, 1]`; 0 for degenerate input.
#[must_use]
pub fn fractional_anisotropy(evals: [f64; 3]) -> f64 {
    let [l1, l2, l3] = evals;
    let denom = l1 * l1 + l2 * l2 + l3 * l3;
    if denom <= 0.0 || !denom.is_finite() {
        return 0.0;
    }
    let fa = (0.5 * ((l1 - l2).powi(2) + (l2 - l3).powi(2) + (l3 - l1).powi(2)) / denom).sqrt();
    if fa.is_finite() { fa.clamp(0.0, 1.0) } else { 0.0 }
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

// =============================================================================
// MODEL
// =============================================================================

/// Precomputed least-squares solver for a gradient table.
#[derive(Debug, Clone)]
pub struct TensorModel {
    /// Pseudo-inverse columns: `pinv[i]` weights the log-signal of volume `i`.
    pinv: Vec<[f64; N_COEFFS]>,
    b_scale: f64,
    min_diffusivity: f64,
}

impl TensorModel {
    /// # Errors
    ///
    /// Returns [`TensorError`] if fewer than six diffusion-weighted volumes
    /// exist or their directions do not determine a tensor.
    pub fn new(gtab: &GradientTable) -> Result<Self, TensorError> {
        let dw = gtab.b0s_mask().iter().filter(|b| !**b).count();
        if dw < MIN_DIRECTIONS {
            return Err(TensorError::TooFewDirections(dw));
        }
        let b_scale = gtab.max_bval();
        let rows: Vec<[f64; N_COEFFS]> = gtab
            .bvals
            .iter()
            .zip(&gtab.bvecs)
            .map(|(b, g)| design_row(b / b_scale, *g))
            .collect();

        let mut xtx = [[0.0; N_COEFFS]; N_COEFFS];
        for row in &rows {
            for i in 0..N_COEFFS {
                for j in 0..N_COEFFS {
                    xtx[i][j] += row[i] * row[j];
                }
            }
        }
        let inv = invert(xtx).ok_or(TensorError::SingularDesign)?;
        let pinv = rows
            .iter()
            .map(|row| {
                let mut col = [0.0; N_COEFFS];
                for (i, c) in col.iter_mut().enumerate() {
                    *c = (0..N_COEFFS).map(|j| inv[i][j] * row[j]).sum();
                }
                col
            })
            .collect();

        Ok(Self { pinv, b_scale, min_diffusivity: DIFFUSIVITY_TOL / b_scale })
    }

    /// Fit one voxel from its per-volume signals.
    #[must_use]
    pub fn fit_voxel(&self, signals: impl Iterator<Item = f64>) -> Tensor {
        let mut beta = [0.0; N_COEFFS];
        for (col, s) in self.pinv.iter().zip(signals) {
            let y = s.max(MIN_SIGNAL).ln();
            for (b, w) in beta.iter_mut().zip(col) {
                *b += w * y;
            }
        }
        let d = [
            beta[0] / self.b_scale,
            beta[1] / self.b_scale,
            beta[2] / self.b_scale,
            beta[3] / self.b_scale,
            beta[4] / self.b_scale,
            beta[5] / self.b_scale,
        ];
        Tensor::from_elements(d, self.min_diffusivity)
    }

    /// Fit every voxel inside `mask`.
    #[must_use]
    pub fn fit(&self, volume: &Volume, mask: &[bool]) -> TensorFit {
        let grid = volume.grid;
        let mut tensors = vec![None; grid.len()];
        let mut fa = vec![0.0; grid.len()];
        for (voxel, inside) in mask.iter().enumerate() {
            if !inside {
                continue;
            }
            let signals = (0..volume.n_volumes).map(|v| f64::from(volume.value(voxel, v)));
            let tensor = self.fit_voxel(signals);
            fa[voxel] = tensor.fa();
            tensors[voxel] = Some(tensor);
        }
        TensorFit { grid, tensors, fa }
    }
}

/// Per-voxel tensors and FA; voxels outside the mask have no tensor and FA 0.
#[derive(Debug, Clone)]
pub struct TensorFit {
    pub grid: Grid,
    pub tensors: Vec<Option<Tensor>>,
    pub fa: Vec<f64>,
}

fn design_row(b: f64, g: [f64; 3]) -> [f64; N_COEFFS] {
    [
        -b * g[0] * g[0],
        -b * g[1] * g[1],
        -b * g[2] * g[2],
        -2.0 * b * g[0] * g[1],
        -2.0 * b * g[0] * g[2],
        -2.0 * b * g[1] * g[2],
        1.0,
    ]
}

/// Gauss-Jordan inverse with partial pivoting.
fn invert<const N: usize>(mut a: [[f64; N]; N]) -> Option<[[f64; N]; N]> {
    let mut inv = [[0.0; N]; N];
    for (i, row) in inv.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    let scale = a
        .iter()
        .flat_map(|r| r.iter())
        .fold(0.0f64, |m, v| m.max(v.abs()));
    if scale == 0.0 {
        return None;
    }
    let tol = scale * 1e-10;

    for col in 0..N {
        let pivot = (col..N).max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))?;
        if a[pivot][col].abs() < tol {
            return None;
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);
        let p = a[col][col];
        for j in 0..N {
            a[col][j] /= p;
            inv[col][j] /= p;
        }
        for r in 0..N {
            if r == col {
                continue;
            }
            let f = a[r][col];
            if f == 0.0 {
                continue;
            }
            for j in 0..N {
                a[r][j] -= f * a[col][j];
                inv[r][j] -= f * inv[col][j];
            }
        }
    }
    Some(inv)
}

/// Symmetric 3×3 eigen-decomposition by cyclic Jacobi rotations.
///
/// Returns eigenvalues in descending order with matching unit eigenvectors.
#[must_use]
pub fn eigh3(m: [[f64; 3]; 3]) -> ([f64; 3], [[f64; 3]; 3]) {
    let mut a = m;
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let scale = a.iter().flat_map(|r| r.iter()).fold(0.0f64, |s, x| s.max(x.abs()));

    for _ in 0..JACOBI_SWEEPS {
        let off = a[0][1].powi(2) + a[0][2].powi(2) + a[1][2].powi(2);
        if off <= (scale * 1e-15).powi(2) {
            break;
        }
        for (p, q) in [(0, 1), (0, 2), (1, 2)] {
            if a[p][q] == 0.0 {
                continue;
            }
            let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;
            for k in 0..3 {
                let (akp, akq) = (a[k][p], a[k][q]);
                a[k][p] = c * akp - s * akq;
                a[k][q] = s * akp + c * akq;
            }
            for k in 0..3 {
                let (apk, aqk) = (a[p][k], a[q][k]);
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            for row in &mut v {
                let (vkp, vkq) = (row[p], row[q]);
                row[p] = c * vkp - s * vkq;
                row[q] = s * vkp + c * vkq;
            }
        }
    }

    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| a[j][j].total_cmp(&a[i][i]));
    let evals = [a[order[0]][order[0]], a[order[1]][order[1]], a[order[2]][order[2]]];
    let evecs = order.map(|k| [v[0][k], v[1][k], v[2][k]]);
    (evals, evecs)
}

#[cfg(test)]
#[path = "tensor_test.rs"]
mod tests;
