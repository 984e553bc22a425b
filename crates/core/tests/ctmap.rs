use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array3, Array4, Ix2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use spatialcorr::{calc_ctmap, corr, ctmap_with, GridError, Harness};

#[test]
fn every_cell_is_written_on_3x3() {
    let mut rng = StdRng::seed_from_u64(21);
    let vf = Array3::from_shape_fn((3, 3, 5), |_| rng.gen_range(-1.0..1.0));
    let reference = Array1::from_shape_fn(5, |_| rng.gen_range(-1.0..1.0));

    let map = calc_ctmap(&reference, &vf, Some(2))
        .expect("matching feature axis")
        .into_dimensionality::<Ix2>()
        .expect("rank 2 output");
    assert_eq!(map.dim(), (3, 3));

    for ((x, y), &v) in map.indexed_iter() {
        assert!(v.is_finite(), "({x}, {y}) = {v}");
        let cell: Vec<f64> = vf.slice(ndarray::s![x, y, ..]).to_vec();
        assert_abs_diff_eq!(v, corr(reference.as_slice().unwrap(), &cell), epsilon = 1e-12);
    }
    assert!(map[[0, 0]].is_finite() && map[[2, 2]].is_finite());
}

#[test]
fn reference_and_constant_cells() {
    let vf = array![[[1.0, 2.0, 3.0], [3.0, 2.0, 1.0]], [[5.0, 5.0, 5.0], [2.0, 4.0, 6.0]]];
    let reference = array![1.0, 2.0, 3.0];
    let map = calc_ctmap(&reference, &vf, Some(1)).expect("matching feature axis");
    assert_eq!(map.shape(), &[2, 2]);
    assert_abs_diff_eq!(map[[0, 0]], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(map[[0, 1]], -1.0, epsilon = 1e-12);
    assert_eq!(map[[1, 0]], 0.0);
    assert_abs_diff_eq!(map[[1, 1]], 1.0, epsilon = 1e-12);
}

#[test]
fn handles_any_leading_rank() {
    let reference = array![0.0, 1.0, 0.5];

    let single = array![1.0, 3.0, 2.0];
    let map = calc_ctmap(&reference, &single, None).expect("rank 1");
    assert_eq!(map.ndim(), 0);
    assert_eq!(map.len(), 1);

    let mut rng = StdRng::seed_from_u64(22);
    let volume = Array4::from_shape_fn((2, 3, 4, 3), |_| rng.gen_range(0.0..1.0));
    let map = calc_ctmap(&reference, &volume, Some(3)).expect("rank 4");
    assert_eq!(map.shape(), &[2, 3, 4]);
    assert!(map.iter().all(|v| v.is_finite()));
}

#[test]
fn thread_count_does_not_change_bits() {
    let mut rng = StdRng::seed_from_u64(23);
    let vf = Array3::from_shape_fn((11, 9, 7), |_| rng.gen_range(0.0..5.0));
    let reference = Array1::from_shape_fn(7, |_| rng.gen_range(0.0..5.0));

    let one = Harness::new(Some(1)).expect("pool");
    let many = Harness::new(Some(6)).expect("pool");
    let a = ctmap_with(&one, &reference, &vf).expect("matching feature axis");
    let b = ctmap_with(&many, &reference, &vf).expect("matching feature axis");
    assert!(a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
}

#[test]
fn rejects_mismatched_reference() {
    let vf = Array3::<f64>::zeros((3, 3, 4));
    let reference = array![1.0, 2.0, 3.0];
    assert_eq!(
        calc_ctmap(&reference, &vf, None).unwrap_err(),
        GridError::DimensionMismatch {
            expected: 4,
            found: 3
        }
    );
}
