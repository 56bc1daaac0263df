//! Discrete sphere used to sample ODFs.
//!
//! 362 quasi-uniform hemisphere points (Fibonacci lattice) plus their
//! antipodes, 724 vertices total. Vertex `i + HEMI` is `-vertex(i)`. Neighbor
//! lists connect vertices closer than [`NEIGHBOR_ANGLE_DEG`] and drive the
//! local-maximum search in peak extraction.

use std::sync::OnceLock;

pub const HEMI_VERTICES: usize = 362;
pub const NEIGHBOR_ANGLE_DEG: f64 = 12.0;

#[derive(Debug)]
pub struct Sphere {
    pub vertices: Vec<[f64; 3]>,
    pub neighbors: Vec<Vec<usize>>,
}

/// Shared 724-vertex sphere, built on first use.
pub fn default_sphere() -> &'static Sphere {
    static SPHERE: OnceLock<Sphere> = OnceLock::new();
    SPHERE.get_or_init(|| Sphere::fibonacci(HEMI_VERTICES, NEIGHBOR_ANGLE_DEG))
}

impl Sphere {
    /// Build an antipodally symmetric sphere from `hemi` Fibonacci points on
    /// the upper hemisphere.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fibonacci(hemi: usize, neighbor_angle_deg: f64) -> Self {
        let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
        let mut vertices = Vec::with_capacity(2 * hemi);
        for i in 0..hemi {
            let z = (i as f64 + 0.5) / hemi as f64;
            let r = (1.0 - z * z).sqrt();
            let phi = golden * i as f64;
            vertices.push([r * phi.cos(), r * phi.sin(), z]);
        }
        for i in 0..hemi {
            let [x, y, z] = vertices[i];
            vertices.push([-x, -y, -z]);
        }

        let cos_limit = neighbor_angle_deg.to_radians().cos();
        let neighbors = (0..vertices.len())
            .map(|i| {
                (0..vertices.len())
                    .filter(|&j| j != i && super::tensor::dot(vertices[i], vertices[j]) >= cos_limit)
                    .collect()
            })
            .collect();

        Self { vertices, neighbors }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}
