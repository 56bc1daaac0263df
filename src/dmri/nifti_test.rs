use super::*;
use crate::dmri::test_support::{NiftiWriter, gzip};
use crate::error::ErrorCode;

fn ramp(n: usize) -> Vec<f32> {
    #[allow(clippy::cast_precision_loss)]
    (0..n).map(|i| i as f32).collect()
}

#[test]
fn parses_gzipped_float_volume() {
    let writer = NiftiWriter::new([3, 2, 2, 2]);
    let values = ramp(24);
    let vol = parse_nifti(&gzip(&writer.encode(&values))).unwrap();
    assert_eq!(vol.grid.dims, [3, 2, 2]);
    assert_eq!(vol.n_volumes, 2);
    assert_eq!(vol.data, values);
    assert!((vol.value(1, 1) - 13.0).abs() < f32::EPSILON);
    assert_eq!(vol.volume(1).len(), 12);
}

#[test]
fn parses_uncompressed_bytes() {
    let writer = NiftiWriter::new([2, 2, 2, 1]);
    let vol = parse_nifti(&writer.encode(&ramp(8))).unwrap();
    assert_eq!(vol.n_volumes, 1);
    assert_eq!(vol.data.len(), 8);
}

#[test]
fn parses_big_endian_header() {
    let mut writer = NiftiWriter::new([2, 2, 1, 1]);
    writer.big_endian = true;
    let vol = parse_nifti(&writer.encode(&[1.0, 2.0, 3.0, 4.0])).unwrap();
    assert_eq!(vol.data, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn applies_scl_slope_and_intercept_to_int16() {
    let mut writer = NiftiWriter::new([2, 1, 1, 1]);
    writer.datatype = 4;
    writer.slope = 2.0;
    writer.inter = 1.0;
    let vol = parse_nifti(&writer.encode(&[3.0, 5.0])).unwrap();
    assert_eq!(vol.data, vec![7.0, 11.0]);
}

#[test]
fn sform_takes_precedence() {
    let mut writer = NiftiWriter::new([2, 2, 2, 1]);
    writer.sform = Some([[-2.0, 0.0, 0.0, 90.0], [0.0, 2.0, 0.0, -126.0], [0.0, 0.0, 2.0, -72.0]]);
    writer.qform = Some((0.0, 0.0, 1.0, [5.0, 5.0, 5.0], 1.0));
    let vol = parse_nifti(&writer.encode(&ramp(8))).unwrap();
    assert_eq!(vol.affine.apply([1.0, 1.0, 1.0]), [88.0, -124.0, -70.0]);
}

#[test]
fn qform_quaternion_rotates_axes() {
    // Quaternion (b, c, d) = (0, 0, 1) is a 180° rotation about z.
    let mut writer = NiftiWriter::new([2, 2, 2, 1]);
    writer.pixdim = [2.0, 3.0, 4.0];
    writer.qform = Some((0.0, 0.0, 1.0, [10.0, 20.0, 30.0], 1.0));
    let vol = parse_nifti(&writer.encode(&ramp(8))).unwrap();
    let p = vol.affine.apply([1.0, 1.0, 1.0]);
    assert!((p[0] - 8.0).abs() < 1e-6);
    assert!((p[1] - 17.0).abs() < 1e-6);
    assert!((p[2] - 34.0).abs() < 1e-6);
}

#[test]
fn falls_back_to_pixdim_scaling() {
    let mut writer = NiftiWriter::new([2, 2, 2, 1]);
    writer.pixdim = [1.5, 1.5, 2.5];
    let vol = parse_nifti(&writer.encode(&ramp(8))).unwrap();
    assert_eq!(vol.affine.voxel_size(), [1.5, 1.5, 2.5]);
}

#[test]
fn rejects_short_input() {
    let err = parse_nifti(&[0u8; 10]).unwrap_err();
    assert!(matches!(err, NiftiError::TooShort { len: 10 }));
    assert_eq!(err.error_code(), "E_NIFTI_HEADER");
}

#[test]
fn rejects_bad_header_size() {
    let mut bytes = NiftiWriter::new([1, 1, 1, 1]).encode(&[0.0]);
    bytes[0..4].copy_from_slice(&540i32.to_le_bytes());
    assert!(matches!(parse_nifti(&bytes), Err(NiftiError::BadHeaderSize(540))));
}

#[test]
fn rejects_pair_magic() {
    let mut bytes = NiftiWriter::new([1, 1, 1, 1]).encode(&[0.0]);
    bytes[344..348].copy_from_slice(b"ni1\0");
    assert!(matches!(parse_nifti(&bytes), Err(NiftiError::BadMagic)));
}

#[test]
fn rejects_unknown_datatype() {
    let mut writer = NiftiWriter::new([1, 1, 1, 1]);
    writer.datatype = 128; // RGB24
    assert!(matches!(parse_nifti(&writer.encode(&[0.0])), Err(NiftiError::UnsupportedDatatype(128))));
}

#[test]
fn rejects_truncated_payload() {
    let mut bytes = NiftiWriter::new([2, 2, 2, 2]).encode(&ramp(16));
    bytes.truncate(bytes.len() - 8);
    let err = parse_nifti(&bytes).unwrap_err();
    assert!(matches!(err, NiftiError::Truncated { expected: 64, actual: 56 }));
}

#[test]
fn rejects_corrupt_gzip() {
    let mut bytes = gzip(&NiftiWriter::new([2, 2, 2, 1]).encode(&ramp(8)));
    bytes.truncate(20);
    assert!(matches!(parse_nifti(&bytes), Err(NiftiError::Decompress(_))));
}

#[test]
fn read_nifti_from_disk() {
    let mut file = tempfile::Builder::new().suffix(".nii.gz").tempfile().unwrap();
    std::io::Write::write_all(&mut file, &gzip(&NiftiWriter::new([2, 1, 1, 1]).encode(&[4.0, 5.0]))).unwrap();
    let vol = read_nifti(file.path(), DEFAULT_MAX_IMAGE_BYTES).unwrap();
    assert_eq!(vol.data, vec![4.0, 5.0]);
}

#[test]
fn gzip_that_inflates_past_the_limit_is_rejected() {
    let mut bytes = NiftiWriter::new([2, 2, 2, 1]).encode(&ramp(8));
    bytes.resize(bytes.len() + 4 * 1024 * 1024, 0);
    let packed = gzip(&bytes);
    assert!(packed.len() < 64 * 1024, "zeros compress well: {}", packed.len());

    let err = parse_nifti_limited(&packed, 1024 * 1024).unwrap_err();
    assert!(matches!(err, NiftiError::TooLarge { limit: 1_048_576 }));
    assert_eq!(err.error_code(), "E_NIFTI_TOO_LARGE");

    let vol = parse_nifti_limited(&packed, bytes.len()).unwrap();
    assert_eq!(vol.data, ramp(8));
}

#[test]
fn uncompressed_input_respects_the_limit() {
    let bytes = NiftiWriter::new([2, 2, 2, 1]).encode(&ramp(8));
    assert!(matches!(parse_nifti_limited(&bytes, 100), Err(NiftiError::TooLarge { limit: 100 })));
    assert!(parse_nifti_limited(&bytes, bytes.len()).is_ok());
}
