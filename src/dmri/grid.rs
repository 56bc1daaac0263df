//! Voxel grid indexing and the voxel-to-world affine.

/// A 3D voxel grid in NIfTI (Fortran) order: x varies fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub dims: [usize; 3],
}

impl Grid {
    #[must_use]
    pub fn new(dims: [usize; 3]) -> Self {
        Self { dims }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.dims[0] * (y + self.dims[1] * z)
    }

    #[must_use]
    pub fn coords(&self, index: usize) -> [usize; 3] {
        let x = index % self.dims[0];
        let rest = index / self.dims[0];
        [x, rest % self.dims[1], rest / self.dims[1]]
    }

    /// Nearest voxel to a continuous voxel-space point, or `None` outside
    /// the `[-0.5, dim - 0.5)` extent.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn nearest(&self, p: [f64; 3]) -> Option<usize> {
        let mut c = [0usize; 3];
        for axis in 0..3 {
            let v = (p[axis] + 0.5).floor();
            if v < 0.0 || v >= self.dims[axis] as f64 {
                return None;
            }
            c[axis] = v as usize;
        }
        Some(self.index(c[0], c[1], c[2]))
    }

    /// Trilinear interpolation of a scalar map at a voxel-space point.
    ///
    /// Returns `None` outside the `[-0.5, dim - 0.5)` extent; corner indices
    /// are clamped to the grid so the half-voxel border reuses edge values.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn trilinear(&self, values: &[f64], p: [f64; 3]) -> Option<f64> {
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        let mut frac = [0f64; 3];
        for axis in 0..3 {
            let dim = self.dims[axis] as f64;
            if p[axis] < -0.5 || p[axis] >= dim - 0.5 {
                return None;
            }
            let clamped = p[axis].clamp(0.0, dim - 1.0);
            let base = clamped.floor();
            frac[axis] = clamped - base;
            lo[axis] = base as usize;
            hi[axis] = (lo[axis] + 1).min(self.dims[axis] - 1);
        }

        let mut acc = 0.0;
        for corner in 0..8u8 {
            let pick = |axis: usize| (corner >> axis) & 1 == 1;
            let mut w = 1.0;
            let mut c = [0usize; 3];
            for axis in 0..3 {
                if pick(axis) {
                    w *= frac[axis];
                    c[axis] = hi[axis];
                } else {
                    w *= 1.0 - frac[axis];
                    c[axis] = lo[axis];
                }
            }
            if w > 0.0 {
                acc += w * values[self.index(c[0], c[1], c[2])];
            }
        }
        Some(acc)
    }
}

// =============================================================================
// AFFINE
// =============================================================================

/// 4×4 voxel-to-world transform (last row is `[0, 0, 0, 1]`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(pub [[f64; 4]; 4]);

impl Affine {
    #[must_use]
    pub fn identity() -> Self {
        Self::from_rows([[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]])
    }

    /// Build from the three top rows (`srow_x`, `srow_y`, `srow_z`).
    #[must_use]
    pub fn from_rows(rows: [[f64; 4]; 3]) -> Self {
        Self([rows[0], rows[1], rows[2], [0.0, 0.0, 0.0, 1.0]])
    }

    /// Diagonal scaling affine, used when the header carries no orientation.
    #[must_use]
    pub fn scaling(voxel_size: [f64; 3]) -> Self {
        Self::from_rows([
            [voxel_size[0], 0.0, 0.0, 0.0],
            [0.0, voxel_size[1], 0.0, 0.0],
            [0.0, 0.0, voxel_size[2], 0.0],
        ])
    }

    #[must_use]
    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            m[0][0] * p[0] + m[0][1] * p[1] + m[0][2] * p[2] + m[0][3],
            m[1][0] * p[0] + m[1][1] * p[1] + m[1][2] * p[2] + m[1][3],
            m[2][0] * p[0] + m[2][1] * p[1] + m[2][2] * p[2] + m[2][3],
        ]
    }

    /// Apply only the linear part (for directions).
    #[must_use]
    pub fn apply_linear(&self, d: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            m[0][0] * d[0] + m[0][1] * d[1] + m[0][2] * d[2],
            m[1][0] * d[0] + m[1][1] * d[1] + m[1][2] * d[2],
            m[2][0] * d[0] + m[2][1] * d[1] + m[2][2] * d[2],
        ]
    }

    /// Length of each voxel axis in world units (column norms).
    #[must_use]
    pub fn voxel_size(&self) -> [f64; 3] {
        let m = &self.0;
        let mut out = [0.0; 3];
        for (col, v) in out.iter_mut().enumerate() {
            *v = (m[0][col].powi(2) + m[1][col].powi(2) + m[2][col].powi(2)).sqrt();
        }
        out
    }

    /// Inverse transform, or `None` when the linear part is singular.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        let m = &self.0;
        let (a, b, c) = (m[0][0], m[0][1], m[0][2]);
        let (d, e, f) = (m[1][0], m[1][1], m[1][2]);
        let (g, h, i) = (m[2][0], m[2][1], m[2][2]);
        let det = a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g);
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let inv = [
            [(e * i - f * h) / det, (c * h - b * i) / det, (b * f - c * e) / det],
            [(f * g - d * i) / det, (a * i - c * g) / det, (c * d - a * f) / det],
            [(d * h - e * g) / det, (b * g - a * h) / det, (a * e - b * d) / det],
        ];
        let t = [m[0][3], m[1][3], m[2][3]];
        let mut rows = [[0.0; 4]; 3];
        for r in 0..3 {
            rows[r][..3].copy_from_slice(&inv[r]);
            rows[r][3] = -(inv[r][0] * t[0] + inv[r][1] * t[1] + inv[r][2] * t[2]);
        }
        Some(Self::from_rows(rows))
    }
}
