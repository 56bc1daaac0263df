//! Synthetic fixtures: NIfTI encoding and diffusion phantoms.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use super::grid::Grid;

/// Encodes a little-endian NIfTI-1 file for tests.
#[derive(Debug, Clone)]
pub struct NiftiWriter {
    pub dims: [usize; 4],
    /// 16 = float32, 4 = int16.
    pub datatype: i16,
    pub pixdim: [f32; 3],
    pub sform: Option<[[f32; 4]; 3]>,
    /// `(b, c, d, [qx, qy, qz], qfac)`.
    pub qform: Option<(f32, f32, f32, [f32; 3], f32)>,
    pub slope: f32,
    pub inter: f32,
    pub big_endian: bool,
}

impl NiftiWriter {
    pub fn new(dims: [usize; 4]) -> Self {
        Self {
            dims,
            datatype: 16,
            pixdim: [1.0, 1.0, 1.0],
            sform: None,
            qform: None,
            slope: 0.0,
            inter: 0.0,
            big_endian: false,
        }
    }

    pub fn encode(&self, values: &[f32]) -> Vec<u8> {
        let mut out = vec![0u8; 352];
        let be = self.big_endian;
        let put_i16 = |buf: &mut Vec<u8>, off: usize, v: i16| {
            let b = if be { v.to_be_bytes() } else { v.to_le_bytes() };
            buf[off..off + 2].copy_from_slice(&b);
        };
        let put_i32 = |buf: &mut Vec<u8>, off: usize, v: i32| {
            let b = if be { v.to_be_bytes() } else { v.to_le_bytes() };
            buf[off..off + 4].copy_from_slice(&b);
        };
        let put_f32 = |buf: &mut Vec<u8>, off: usize, v: f32| {
            let b = if be { v.to_be_bytes() } else { v.to_le_bytes() };
            buf[off..off + 4].copy_from_slice(&b);
        };

        put_i32(&mut out, 0, 348);
        let ndim: i16 = if self.dims[3] > 1 { 4 } else { 3 };
        put_i16(&mut out, 40, ndim);
        for (i, d) in self.dims.iter().enumerate() {
            put_i16(&mut out, 42 + 2 * i, i16::try_from(*d).unwrap());
        }
        put_i16(&mut out, 70, self.datatype);
        put_i16(&mut out, 72, if self.datatype == 4 { 16 } else { 32 });
        let qfac = self.qform.map_or(1.0, |q| q.4);
        put_f32(&mut out, 76, qfac);
        for (i, p) in self.pixdim.iter().enumerate() {
            put_f32(&mut out, 80 + 4 * i, *p);
        }
        put_f32(&mut out, 108, 352.0);
        put_f32(&mut out, 112, self.slope);
        put_f32(&mut out, 116, self.inter);
        if let Some((b, c, d, offset, _)) = self.qform {
            put_i16(&mut out, 252, 1);
            put_f32(&mut out, 256, b);
            put_f32(&mut out, 260, c);
            put_f32(&mut out, 264, d);
            for (i, o) in offset.iter().enumerate() {
                put_f32(&mut out, 268 + 4 * i, *o);
            }
        }
        if let Some(rows) = self.sform {
            put_i16(&mut out, 254, 1);
            for (r, row) in rows.iter().enumerate() {
                for (c, v) in row.iter().enumerate() {
                    put_f32(&mut out, 280 + 16 * r + 4 * c, *v);
                }
            }
        }
        out[344..348].copy_from_slice(b"n+1\0");

        for v in values {
            if self.datatype == 4 {
                #[allow(clippy::cast_possible_truncation)]
                let raw = *v as i16;
                out.extend_from_slice(&if be { raw.to_be_bytes() } else { raw.to_le_bytes() });
            } else {
                out.extend_from_slice(&if be { v.to_be_bytes() } else { v.to_le_bytes() });
            }
        }
        out
    }
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

// =============================================================================
// PHANTOMS
// =============================================================================

pub const PHANTOM_B: f64 = 1000.0;
pub const PHANTOM_S0: f64 = 1000.0;

/// One b0 followed by nine b=1000 directions.
pub fn phantom_gradients() -> (Vec<f64>, Vec<[f64; 3]>) {
    let s = std::f64::consts::FRAC_1_SQRT_2;
    let dirs = vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [s, s, 0.0],
        [s, 0.0, s],
        [0.0, s, s],
        [s, -s, 0.0],
        [s, 0.0, -s],
        [0.0, s, -s],
    ];
    let bvals = dirs
        .iter()
        .map(|d| if d == &[0.0, 0.0, 0.0] { 0.0 } else { PHANTOM_B })
        .collect();
    (bvals, dirs)
}

/// Diffusion-weighted signals for a box of tissue with tensor `evals` aligned
/// to the axes, surrounded by zero background.
///
/// Returns volume-major `f32` data matching [`super::nifti::Volume::data`].
pub fn box_phantom(dims: [usize; 3], lo: [usize; 3], hi: [usize; 3], evals: [f64; 3]) -> Vec<f32> {
    let grid = Grid::new(dims);
    let (bvals, dirs) = phantom_gradients();
    let mut data = vec![0f32; grid.len() * bvals.len()];
    for (vol, (b, g)) in bvals.iter().zip(dirs.iter()).enumerate() {
        let adc = evals[0] * g[0] * g[0] + evals[1] * g[1] * g[1] + evals[2] * g[2] * g[2];
        #[allow(clippy::cast_possible_truncation)]
        let signal = (PHANTOM_S0 * (-b * adc).exp()) as f32;
        for z in lo[2]..hi[2] {
            for y in lo[1]..hi[1] {
                for x in lo[0]..hi[0] {
                    data[vol * grid.len() + grid.index(x, y, z)] = signal;
                }
            }
        }
    }
    data
}

/// bvecs text in FSL layout (3 rows × N columns).
pub fn bvecs_rows_text(dirs: &[[f64; 3]]) -> String {
    (0..3)
        .map(|axis| {
            dirs.iter()
                .map(|d| format!("{:.6}", d[axis]))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// bvecs text in column layout (N rows × 3 columns).
pub fn bvecs_columns_text(dirs: &[[f64; 3]]) -> String {
    dirs.iter()
        .map(|d| format!("{:.6} {:.6} {:.6}", d[0], d[1], d[2]))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn bvals_text(bvals: &[f64]) -> String {
    bvals
        .iter()
        .map(|b| format!("{b}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Gzip'd NIfTI bytes for a phantom, identity affine.
pub fn phantom_nifti(dims: [usize; 3], data: &[f32], n_volumes: usize) -> Vec<u8> {
    let writer = NiftiWriter::new([dims[0], dims[1], dims[2], n_volumes]);
    gzip(&writer.encode(data))
}

/// Grid and tissue box used by the end-to-end phantom.
pub const PHANTOM_DIMS: [usize; 3] = [16, 12, 12];
pub const PHANTOM_LO: [usize; 3] = [2, 3, 3];
pub const PHANTOM_HI: [usize; 3] = [14, 9, 9];
pub const SINGLE_FIBER: [f64; 3] = [1.7e-3, 0.3e-3, 0.3e-3];
pub const ISOTROPIC: [f64; 3] = [0.7e-3, 0.7e-3, 0.7e-3];

/// Upload triple for the box phantom with tensor `evals`.
pub fn phantom_upload(evals: [f64; 3]) -> super::bundle::BundleUpload {
    let (bvals, dirs) = phantom_gradients();
    let data = box_phantom(PHANTOM_DIMS, PHANTOM_LO, PHANTOM_HI, evals);
    super::bundle::BundleUpload {
        dwi: phantom_nifti(PHANTOM_DIMS, &data, bvals.len()),
        bvecs: bvecs_rows_text(&dirs).into_bytes(),
        bvals: bvals_text(&bvals).into_bytes(),
    }
}
