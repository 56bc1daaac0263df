//! NIfTI-1 single-file reader (`.nii` / `.nii.gz`).
//!
//! DESIGN
//! ======
//! Only what the tractography page needs: a 3D or 4D scalar volume decoded to
//! `f32` in file order (x fastest), plus the voxel-to-world affine. Gzip is
//! detected from the magic bytes, not the file name, so renamed uploads
//! still load.
//!
//! The affine follows the usual precedence: sform when `sform_code > 0`,
//! otherwise the qform quaternion when `qform_code > 0`, otherwise a plain
//! pixdim scaling.
//!
//! Decompression is capped: a gzip stream that inflates past the configured
//! limit is rejected before it is fully buffered.

use std::io::Read;
use std::path::Path;

use flate2::read::MultiGzDecoder;

use super::grid::{Affine, Grid};

const HEADER_SIZE: usize = 348;
const MIN_VOX_OFFSET: usize = 352;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Default cap on the decompressed image size.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 1 << 30;

// NIfTI-1 header field offsets.
const OFF_DIM: usize = 40;
const OFF_DATATYPE: usize = 70;
const OFF_PIXDIM: usize = 76;
const OFF_VOX_OFFSET: usize = 108;
const OFF_SCL_SLOPE: usize = 112;
const OFF_SCL_INTER: usize = 116;
const OFF_QFORM_CODE: usize = 252;
const OFF_SFORM_CODE: usize = 254;
const OFF_QUATERN_B: usize = 256;
const OFF_SROW_X: usize = 280;
const OFF_MAGIC: usize = 344;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum NiftiError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decompress image: {0}")]
    Decompress(String),
    #[error("file too short for a NIfTI-1 header ({len} bytes)")]
    TooShort { len: usize },
    #[error("not a NIfTI-1 file (sizeof_hdr = {0})")]
    BadHeaderSize(i32),
    #[error("unsupported NIfTI magic (expected single-file n+1)")]
    BadMagic,
    #[error("unsupported NIfTI datatype code {0}")]
    UnsupportedDatatype(i16),
    #[error("unsupported image dimensions: {0}")]
    UnsupportedDims(String),
    #[error("image data truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("image exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
}

impl crate::error::ErrorCode for NiftiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "E_NIFTI_IO",
            Self::Decompress(_) => "E_NIFTI_DECOMPRESS",
            Self::TooShort { .. } | Self::BadHeaderSize(_) | Self::BadMagic => "E_NIFTI_HEADER",
            Self::UnsupportedDatatype(_) | Self::UnsupportedDims(_) => "E_NIFTI_UNSUPPORTED",
            Self::Truncated { .. } => "E_NIFTI_TRUNCATED",
            Self::TooLarge { .. } => "E_NIFTI_TOO_LARGE",
        }
    }
}

// =============================================================================
// VOLUME
// =============================================================================

/// A 4D diffusion-weighted image: spatial grid × volumes.
#[derive(Debug, Clone)]
pub struct Volume {
    pub grid: Grid,
    pub n_volumes: usize,
    /// Voxel values, volume-major: `data[vol * grid.len() + voxel]`.
    pub data: Vec<f32>,
    pub affine: Affine,
}

impl Volume {
    #[must_use]
    pub fn value(&self, voxel: usize, vol: usize) -> f32 {
        self.data[vol * self.grid.len() + voxel]
    }

    /// Contiguous slice for one volume.
    #[must_use]
    pub fn volume(&self, vol: usize) -> &[f32] {
        let n = self.grid.len();
        &self.data[vol * n..(vol + 1) * n]
    }
}

// =============================================================================
// READING
// =============================================================================

/// Read a NIfTI-1 file from disk, refusing images larger than `max_bytes`
/// once decompressed.
///
/// # Errors
///
/// Returns a [`NiftiError`] if the file cannot be read, is too large, or is
/// not a supported single-file NIfTI-1 image.
pub fn read_nifti(path: &Path, max_bytes: usize) -> Result<Volume, NiftiError> {
    let bytes = std::fs::read(path)?;
    parse_nifti_limited(&bytes, max_bytes)
}

/// Parse NIfTI-1 bytes under [`DEFAULT_MAX_IMAGE_BYTES`].
///
/// # Errors
///
/// See [`read_nifti`].
pub fn parse_nifti(raw: &[u8]) -> Result<Volume, NiftiError> {
    parse_nifti_limited(raw, DEFAULT_MAX_IMAGE_BYTES)
}

/// Parse NIfTI-1 bytes, decompressing gzip when present.
///
/// # Errors
///
/// See [`read_nifti`].
pub fn parse_nifti_limited(raw: &[u8], max_bytes: usize) -> Result<Volume, NiftiError> {
    let inflated;
    let bytes = if raw.starts_with(&GZIP_MAGIC) {
        inflated = inflate(raw, max_bytes)?;
        inflated.as_slice()
    } else {
        if raw.len() > max_bytes {
            return Err(NiftiError::TooLarge { limit: max_bytes });
        }
        raw
    };

    if bytes.len() < HEADER_SIZE {
        return Err(NiftiError::TooShort { len: bytes.len() });
    }
    let hdr = Header::detect(bytes)?;
    if &bytes[OFF_MAGIC..OFF_MAGIC + 4] != b"n+1\0" {
        return Err(NiftiError::BadMagic);
    }

    let dims = hdr.dims()?;
    let grid = Grid::new([dims[0], dims[1], dims[2]]);
    let n_volumes = dims[3];
    let datatype = DataType::from_code(hdr.i16(OFF_DATATYPE))?;

    let count = grid.len() * n_volumes;
    let offset = hdr.vox_offset();
    let expected = count * datatype.size();
    let available = bytes.len().saturating_sub(offset);
    if available < expected {
        return Err(NiftiError::Truncated { expected, actual: available });
    }
    let payload = &bytes[offset..offset + expected];

    let slope = hdr.f32(OFF_SCL_SLOPE);
    let inter = hdr.f32(OFF_SCL_INTER);
    let scale = slope != 0.0 && slope.is_finite() && !(slope == 1.0 && inter == 0.0);
    let data = payload
        .chunks_exact(datatype.size())
        .map(|chunk| {
            let v = datatype.decode(chunk, hdr.big_endian);
            if scale { v * slope + inter } else { v }
        })
        .collect();

    Ok(Volume { grid, n_volumes, data, affine: hdr.affine() })
}

/// Inflate at most `max_bytes`; one extra byte tells an exact fit from overflow.
fn inflate(raw: &[u8], max_bytes: usize) -> Result<Vec<u8>, NiftiError> {
    let mut out = Vec::new();
    MultiGzDecoder::new(raw)
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| NiftiError::Decompress(e.to_string()))?;
    if out.len() > max_bytes {
        return Err(NiftiError::TooLarge { limit: max_bytes });
    }
    Ok(out)
}

// =============================================================================
// HEADER
// =============================================================================

struct Header<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl<'a> Header<'a> {
    fn detect(bytes: &'a [u8]) -> Result<Self, NiftiError> {
        let raw: [u8; 4] = [bytes[0], bytes[1], bytes[2], bytes[3]];
        #[allow(clippy::cast_possible_wrap)]
        let expected = HEADER_SIZE as i32;
        if i32::from_le_bytes(raw) == expected {
            Ok(Self { bytes, big_endian: false })
        } else if i32::from_be_bytes(raw) == expected {
            Ok(Self { bytes, big_endian: true })
        } else {
            Err(NiftiError::BadHeaderSize(i32::from_le_bytes(raw)))
        }
    }

    fn take<const N: usize>(&self, off: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[off..off + N]);
        out
    }

    fn i16(&self, off: usize) -> i16 {
        let raw = self.take::<2>(off);
        if self.big_endian { i16::from_be_bytes(raw) } else { i16::from_le_bytes(raw) }
    }

    fn f32(&self, off: usize) -> f32 {
        let raw = self.take::<4>(off);
        if self.big_endian { f32::from_be_bytes(raw) } else { f32::from_le_bytes(raw) }
    }

    /// `[nx, ny, nz, nvol]`, with `nvol = 1` for 3D images.
    fn dims(&self) -> Result<[usize; 4], NiftiError> {
        let ndim = self.i16(OFF_DIM);
        if !(3..=4).contains(&ndim) {
            return Err(NiftiError::UnsupportedDims(format!("{ndim} dimensions (expected 3 or 4)")));
        }
        let mut out = [1usize; 4];
        for (axis, slot) in out.iter_mut().enumerate().take(usize::try_from(ndim).unwrap_or(0)) {
            let d = self.i16(OFF_DIM + 2 * (axis + 1));
            if d < 1 {
                return Err(NiftiError::UnsupportedDims(format!("dim[{}] = {d}", axis + 1)));
            }
            *slot = usize::try_from(d).unwrap_or(1);
        }
        Ok(out)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn vox_offset(&self) -> usize {
        let raw = self.f32(OFF_VOX_OFFSET);
        if raw.is_finite() && raw >= MIN_VOX_OFFSET as f32 { raw as usize } else { MIN_VOX_OFFSET }
    }

    fn pixdim(&self, i: usize) -> f64 {
        f64::from(self.f32(OFF_PIXDIM + 4 * i))
    }

    fn affine(&self) -> Affine {
        if self.i16(OFF_SFORM_CODE) > 0 {
            let mut rows = [[0.0; 4]; 3];
            for (r, row) in rows.iter_mut().enumerate() {
                for (c, v) in row.iter_mut().enumerate() {
                    *v = f64::from(self.f32(OFF_SROW_X + 16 * r + 4 * c));
                }
            }
            return Affine::from_rows(rows);
        }
        if self.i16(OFF_QFORM_CODE) > 0 {
            return self.qform_affine();
        }
        let size = |i: usize| {
            let v = self.pixdim(i).abs();
            if v > 0.0 { v } else { 1.0 }
        };
        Affine::scaling([size(1), size(2), size(3)])
    }

    fn qform_affine(&self) -> Affine {
        let b = f64::from(self.f32(OFF_QUATERN_B));
        let c = f64::from(self.f32(OFF_QUATERN_B + 4));
        let d = f64::from(self.f32(OFF_QUATERN_B + 8));
        let offset = [
            f64::from(self.f32(OFF_QUATERN_B + 12)),
            f64::from(self.f32(OFF_QUATERN_B + 16)),
            f64::from(self.f32(OFF_QUATERN_B + 20)),
        ];
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if self.pixdim(0) < 0.0 { -1.0 } else { 1.0 };
        let dx = self.pixdim(1);
        let dy = self.pixdim(2);
        let dz = self.pixdim(3) * qfac;

        let r = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b],
        ];
        let mut rows = [[0.0; 4]; 3];
        for i in 0..3 {
            rows[i] = [r[i][0] * dx, r[i][1] * dy, r[i][2] * dz, offset[i]];
        }
        Affine::from_rows(rows)
    }
}

// =============================================================================
// DATATYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataType {
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl DataType {
    fn from_code(code: i16) -> Result<Self, NiftiError> {
        match code {
            2 => Ok(Self::U8),
            4 => Ok(Self::I16),
            8 => Ok(Self::I32),
            16 => Ok(Self::F32),
            64 => Ok(Self::F64),
            256 => Ok(Self::I8),
            512 => Ok(Self::U16),
            768 => Ok(Self::U32),
            other => Err(NiftiError::UnsupportedDatatype(other)),
        }
    }

    fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn decode(self, b: &[u8], big_endian: bool) -> f32 {
        macro_rules! num {
            ($t:ty, $n:expr) => {{
                let mut raw = [0u8; $n];
                raw.copy_from_slice(b);
                if big_endian { <$t>::from_be_bytes(raw) } else { <$t>::from_le_bytes(raw) }
            }};
        }
        match self {
            Self::U8 => f32::from(b[0]),
            Self::I8 => f32::from(i8::from_ne_bytes([b[0]])),
            Self::I16 => f32::from(num!(i16, 2)),
            Self::U16 => f32::from(num!(u16, 2)),
            Self::I32 => num!(i32, 4) as f32,
            Self::U32 => num!(u32, 4) as f32,
            Self::F32 => num!(f32, 4),
            Self::F64 => num!(f64, 8) as f32,
        }
    }
}

#[cfg(test)]
#[path = "nifti_test.rs"]
mod tests;
