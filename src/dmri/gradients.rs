//! Gradient table: b-values, b-vectors and the b0 mask.
//!
//! Text parsing follows FSL conventions: whitespace (or comma) separated
//! numbers, one row per line, `#` comments. b-vectors may arrive as 3×N
//! (FSL) or N×3; the N×3 form is transposed on load.

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GradientError {
    #[error("invalid number {token:?} on line {line}")]
    InvalidNumber { line: usize, token: String },
    #[error("ragged rows: line {line} has {found} values, expected {expected}")]
    Ragged { line: usize, expected: usize, found: usize },
    #[error("gradient file is empty")]
    Empty,
    #[error("b-vectors must have 3 rows or 3 columns, got {rows}x{cols}")]
    BadShape { rows: usize, cols: usize },
    #[error("{bvals} b-values but {bvecs} b-vectors")]
    LengthMismatch { bvals: usize, bvecs: usize },
    #[error("b-values must be finite and non-negative")]
    NegativeBValue,
}

impl crate::error::ErrorCode for GradientError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidNumber { .. } | Self::Ragged { .. } | Self::Empty => "E_GRADIENT_FORMAT",
            Self::BadShape { .. } => "E_GRADIENT_SHAPE",
            Self::LengthMismatch { .. } => "E_GRADIENT_MISMATCH",
            Self::NegativeBValue => "E_GRADIENT_FORMAT",
        }
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a whitespace/comma separated numeric matrix, one row per line.
///
/// # Errors
///
/// Returns [`GradientError`] on non-numeric tokens, ragged rows, or when no
/// numbers are present.
pub fn parse_matrix(text: &str) -> Result<Vec<Vec<f64>>, GradientError> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let row = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<f64>()
                    .map_err(|_| GradientError::InvalidNumber { line: i + 1, token: t.to_string() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(GradientError::Ragged { line: i + 1, expected: first.len(), found: row.len() });
            }
        }
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(GradientError::Empty);
    }
    Ok(rows)
}

/// Parse b-values. Any row/column layout is flattened in reading order.
///
/// # Errors
///
/// See [`parse_matrix`].
pub fn parse_bvals(text: &str) -> Result<Vec<f64>, GradientError> {
    Ok(parse_matrix(text)?.into_iter().flatten().collect())
}

/// Parse b-vectors into one `[x, y, z]` per volume.
///
/// A matrix with 3 rows is read column-wise (FSL layout); otherwise it must
/// have 3 columns and is transposed.
///
/// # Errors
///
/// Returns [`GradientError::BadShape`] when neither dimension is 3.
pub fn parse_bvecs(text: &str) -> Result<Vec<[f64; 3]>, GradientError> {
    let rows = parse_matrix(text)?;
    let cols = rows[0].len();
    if rows.len() == 3 {
        return Ok((0..cols)
            .map(|c| [rows[0][c], rows[1][c], rows[2][c]])
            .collect());
    }
    if cols == 3 {
        return Ok(rows.into_iter().map(|r| [r[0], r[1], r[2]]).collect());
    }
    Err(GradientError::BadShape { rows: rows.len(), cols })
}

// =============================================================================
// GRADIENT TABLE
// =============================================================================

/// Paired diffusion-encoding strengths and unit directions.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientTable {
    pub bvals: Vec<f64>,
    /// Unit vectors; zero for b0 volumes or zero-length input vectors.
    pub bvecs: Vec<[f64; 3]>,
    pub b0_threshold: f64,
}

impl GradientTable {
    /// # Errors
    ///
    /// Returns [`GradientError::LengthMismatch`] when the counts differ and
    /// [`GradientError::NegativeBValue`] for negative or non-finite b-values.
    pub fn new(bvals: Vec<f64>, bvecs: Vec<[f64; 3]>, b0_threshold: f64) -> Result<Self, GradientError> {
        if bvals.len() != bvecs.len() {
            return Err(GradientError::LengthMismatch { bvals: bvals.len(), bvecs: bvecs.len() });
        }
        if bvals.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(GradientError::NegativeBValue);
        }
        let bvecs = bvecs.into_iter().map(normalize).collect();
        Ok(Self { bvals, bvecs, b0_threshold })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bvals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bvals.is_empty()
    }

    /// `true` for volumes acquired without diffusion weighting.
    #[must_use]
    pub fn b0s_mask(&self) -> Vec<bool> {
        self.bvals.iter().map(|b| *b <= self.b0_threshold).collect()
    }

    /// Largest b-value in the table.
    #[must_use]
    pub fn max_bval(&self) -> f64 {
        self.bvals.iter().copied().fold(0.0, f64::max)
    }
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if n > 1e-12 { [v[0] / n, v[1] / n, v[2] / n] } else { [0.0; 3] }
}

#[cfg(test)]
#[path = "gradients_test.rs"]
mod tests;
