use super::*;

#[test]
fn reflect_mirrors_at_both_edges() {
    assert_eq!(reflect(0, -1, 5), 0);
    assert_eq!(reflect(0, -2, 5), 1);
    assert_eq!(reflect(4, 1, 5), 4);
    assert_eq!(reflect(4, 2, 5), 3);
    assert_eq!(reflect(2, 1, 5), 3);
    assert_eq!(reflect(0, 2, 1), 0);
}

#[test]
fn mean_b0_averages_selected_volumes() {
    let grid = Grid::new([2, 1, 1]);
    let data = [10.0, 20.0, 99.0, 99.0, 30.0, 40.0];
    let mean = mean_b0(&data, grid, &[true, false, true]).unwrap();
    assert_eq!(mean, vec![20.0, 30.0]);
}

#[test]
fn mean_b0_without_b0_is_none() {
    let grid = Grid::new([1, 1, 1]);
    assert!(mean_b0(&[1.0, 2.0], grid, &[false, false]).is_none());
}

#[test]
fn median_filter_removes_salt_noise() {
    let grid = Grid::new([5, 5, 5]);
    let mut image = vec![1.0; grid.len()];
    image[grid.index(2, 2, 2)] = 1000.0;
    let out = median_filter(&image, grid, 1);
    assert!(out.iter().all(|v| (*v - 1.0).abs() < f64::EPSILON));
}

#[test]
fn median_filter_radius_zero_is_identity() {
    let grid = Grid::new([2, 2, 1]);
    let image = vec![1.0, 2.0, 3.0, 4.0];
    assert_eq!(median_filter(&image, grid, 0), image);
}

#[test]
fn otsu_separates_two_populations() {
    let mut image = vec![10.0; 500];
    image.extend(std::iter::repeat_n(200.0, 500));
    let t = otsu(&image);
    assert!(t > 10.0 && t < 200.0, "threshold {t}");
}

#[test]
fn otsu_constant_image_returns_value() {
    assert!((otsu(&[5.0; 10]) - 5.0).abs() < f64::EPSILON);
}

#[test]
fn median_otsu_keeps_box_interior() {
    let grid = Grid::new([12, 12, 12]);
    let mut image = vec![0.0; grid.len()];
    for z in 2..10 {
        for y in 2..10 {
            for x in 2..10 {
                image[grid.index(x, y, z)] = 1000.0;
            }
        }
    }
    let (_, mask) = median_otsu(&image, grid, 2, 1);
    assert!(mask[grid.index(6, 6, 6)]);
    assert!(mask[grid.index(2, 6, 6)], "face voxels survive a radius-2 median");
    assert!(!mask[grid.index(0, 0, 0)]);
    assert!(!mask[grid.index(2, 2, 2)], "box corners are eroded");
}
