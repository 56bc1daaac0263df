//! Brain extraction: median filter followed by an Otsu threshold.
//!
//! Median filtering uses reflected borders (`d c b a | a b c d`). The Otsu
//! threshold is the center of the lower-class bin that maximizes
//! between-class variance over a 256-bin histogram.

use super::grid::Grid;

pub const OTSU_BINS: usize = 256;

/// Mean of the b0 volumes per voxel.
///
/// Returns `None` when `b0s` selects no volume.
#[must_use]
pub fn mean_b0(data: &[f32], grid: Grid, b0s: &[bool]) -> Option<Vec<f64>> {
    let picked: Vec<usize> = b0s
        .iter()
        .enumerate()
        .filter_map(|(i, b)| b.then_some(i))
        .collect();
    if picked.is_empty() {
        return None;
    }
    let n = grid.len();
    #[allow(clippy::cast_precision_loss)]
    let count = picked.len() as f64;
    let mut out = vec![0.0; n];
    for vol in &picked {
        for (acc, v) in out.iter_mut().zip(&data[vol * n..(vol + 1) * n]) {
            *acc += f64::from(*v);
        }
    }
    for v in &mut out {
        *v /= count;
    }
    Some(out)
}

/// Median-filter `numpass` times, then threshold with Otsu.
///
/// Returns the filtered image and the binary mask.
#[must_use]
pub fn median_otsu(image: &[f64], grid: Grid, median_radius: usize, numpass: usize) -> (Vec<f64>, Vec<bool>) {
    let mut filtered = image.to_vec();
    for _ in 0..numpass {
        filtered = median_filter(&filtered, grid, median_radius);
    }
    let thresh = otsu(&filtered);
    let mask = filtered.iter().map(|v| *v > thresh).collect();
    (filtered, mask)
}

/// Cubic median filter of side `2 * radius + 1` with reflected borders.
#[must_use]
pub fn median_filter(image: &[f64], grid: Grid, radius: usize) -> Vec<f64> {
    if radius == 0 || grid.is_empty() {
        return image.to_vec();
    }
    let [nx, ny, nz] = grid.dims;
    let r = isize::try_from(radius).unwrap_or(0);
    let mut window = Vec::with_capacity((2 * radius + 1).pow(3));
    let mut out = vec![0.0; image.len()];

    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                window.clear();
                for dz in -r..=r {
                    let zz = reflect(z, dz, nz);
                    for dy in -r..=r {
                        let yy = reflect(y, dy, ny);
                        for dx in -r..=r {
                            let xx = reflect(x, dx, nx);
                            window.push(image[grid.index(xx, yy, zz)]);
                        }
                    }
                }
                let mid = window.len() / 2;
                let (_, median, _) = window.select_nth_unstable_by(mid, f64::total_cmp);
                out[grid.index(x, y, z)] = *median;
            }
        }
    }
    out
}

/// Reflect `i + d` into `[0, n)` using half-sample symmetric padding.
fn reflect(i: usize, d: isize, n: usize) -> usize {
    let n = isize::try_from(n).unwrap_or(isize::MAX);
    let mut j = isize::try_from(i).unwrap_or(0) + d;
    let period = 2 * n;
    j = j.rem_euclid(period);
    if j >= n {
        j = period - 1 - j;
    }
    usize::try_from(j).unwrap_or(0)
}

/// Otsu threshold over a 256-bin histogram.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn otsu(image: &[f64]) -> f64 {
    let (lo, hi) = image
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if !lo.is_finite() || hi <= lo {
        return if lo.is_finite() { lo } else { 0.0 };
    }

    let width = (hi - lo) / OTSU_BINS as f64;
    let mut hist = [0.0f64; OTSU_BINS];
    for v in image.iter().filter(|v| v.is_finite()) {
        let bin = (((v - lo) / width) as usize).min(OTSU_BINS - 1);
        hist[bin] += 1.0;
    }
    let centers: Vec<f64> = (0..OTSU_BINS)
        .map(|i| lo + width * (i as f64 + 0.5))
        .collect();

    // Cumulative weights and means from both ends.
    let mut weight1 = [0.0; OTSU_BINS];
    let mut mean1 = [0.0; OTSU_BINS];
    let (mut w, mut m) = (0.0, 0.0);
    for i in 0..OTSU_BINS {
        w += hist[i];
        m += hist[i] * centers[i];
        weight1[i] = w;
        mean1[i] = if w > 0.0 { m / w } else { 0.0 };
    }
    let mut weight2 = [0.0; OTSU_BINS];
    let mut mean2 = [0.0; OTSU_BINS];
    let (mut w, mut m) = (0.0, 0.0);
    for i in (0..OTSU_BINS).rev() {
        w += hist[i];
        m += hist[i] * centers[i];
        weight2[i] = w;
        mean2[i] = if w > 0.0 { m / w } else { 0.0 };
    }

    let mut best = 0;
    let mut best_var = f64::NEG_INFINITY;
    for i in 0..OTSU_BINS - 1 {
        let var = weight1[i] * weight2[i + 1] * (mean1[i] - mean2[i + 1]).powi(2);
        if var > best_var {
            best_var = var;
            best = i;
        }
    }
    centers[best]
}

#[cfg(test)]
#[path = "mask_test.rs"]
mod tests;
