//! Plotly figure builders for the tractography page.
//!
//! DESIGN
//! ======
//! Figures are plain `{ "data": [...], "layout": {...} }` JSON consumed by
//! Plotly.js in the browser, so the server never rasterizes anything. The
//! age and hemisphere plots are synthetic placeholders; they never look at
//! the uploaded scan.

use rand::Rng;
use serde_json::{Value, json};

pub const TRACT_TITLE: &str = "3D Tractography Visualization";
pub const AGE_TITLE: &str = "FA Changes with Age";
pub const HEMISPHERE_TITLE: &str = "FA Across Corpus Callosum";
const SAMPLES: usize = 100;

/// `n` evenly spaced values from `start` to `end`, both included.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Exactly `min(len, max)` items, spread evenly from index 0.
#[must_use]
pub fn decimate<T>(items: &[T], max: usize) -> Vec<&T> {
    let n = items.len();
    if n <= max {
        return items.iter().collect();
    }
    (0..max).map(|i| &items[i * n / max]).collect()
}

// =============================================================================
// FIGURES
// =============================================================================

/// One `scatter3d` line trace per streamline.
#[must_use]
pub fn tract_figure(streamlines: &[&Vec<[f64; 3]>]) -> Value {
    let data: Vec<Value> = streamlines
        .iter()
        .map(|s| {
            json!({
                "type": "scatter3d",
                "mode": "lines",
                "x": s.iter().map(|p| p[0]).collect::<Vec<_>>(),
                "y": s.iter().map(|p| p[1]).collect::<Vec<_>>(),
                "z": s.iter().map(|p| p[2]).collect::<Vec<_>>(),
                "line": { "width": 1 },
                "opacity": 0.5,
                "showlegend": false,
            })
        })
        .collect();
    json!({
        "data": data,
        "layout": {
            "title": { "text": TRACT_TITLE },
            "scene": {
                "xaxis": { "title": { "text": "X" } },
                "yaxis": { "title": { "text": "Y" } },
                "zaxis": { "title": { "text": "Z" } },
            },
            "height": 700,
        },
    })
}

/// Simulated FA against age: `0.53 + 0.02 sin(age / 10)` over ages 5..60.
#[must_use]
pub fn age_figure() -> Value {
    let ages = linspace(5.0, 60.0, SAMPLES);
    let fa: Vec<f64> = ages.iter().map(|a| 0.53 + 0.02 * (a / 10.0).sin()).collect();
    json!({
        "data": [{ "type": "scatter", "mode": "lines", "x": ages, "y": fa }],
        "layout": {
            "title": { "text": AGE_TITLE },
            "xaxis": { "title": { "text": "Age (years)" } },
            "yaxis": { "title": { "text": "Fractional Anisotropy" } },
        },
    })
}

/// Simulated left/right hemisphere FA across callosal angles, with a little
/// uniform jitter drawn from `rng`.
#[must_use]
pub fn hemisphere_figure<R: Rng>(rng: &mut R) -> Value {
    let angles = linspace(-45.0, 45.0, SAMPLES);
    let left: Vec<f64> = angles
        .iter()
        .map(|a| 0.3 + 0.2 * a.to_radians().sin() + 0.02 * rng.random::<f64>())
        .collect();
    let right: Vec<f64> = angles
        .iter()
        .map(|a| 0.28 + 0.18 * a.to_radians().cos() + 0.02 * rng.random::<f64>())
        .collect();
    json!({
        "data": [
            { "type": "scatter", "mode": "lines+markers", "name": "Left Hemisphere", "x": angles, "y": left },
            { "type": "scatter", "mode": "lines+markers", "name": "Right Hemisphere", "x": angles, "y": right },
        ],
        "layout": {
            "title": { "text": HEMISPHERE_TITLE },
            "xaxis": { "title": { "text": "Angle (°)" } },
            "yaxis": { "title": { "text": "FA" } },
        },
    })
}

#[cfg(test)]
#[path = "viz_test.rs"]
mod tests;
