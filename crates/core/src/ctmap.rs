use crate::error::{GridError, Result};
use crate::grid::FeatureGrid;
use crate::harness::Harness;
use crate::pearson::corr;
use log::debug;
use ndarray::{ArrayBase, ArrayD, Data, Dimension, Ix1, IxDyn};

/// Correlation of every cell's feature vector with one reference vector.
///
/// `vf` may have any rank of at least 1; its trailing axis must match the
/// length of `vec`. Every cell of the result is written, borders included.
pub fn calc_ctmap<S1, S2, D>(
    vec: &ArrayBase<S1, Ix1>,
    vf: &ArrayBase<S2, D>,
    ncores: Option<usize>,
) -> Result<ArrayD<f64>>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    let harness = Harness::new(ncores)?;
    ctmap_with(&harness, vec, vf)
}

/// [`calc_ctmap`] on an existing worker pool.
pub fn ctmap_with<S1, S2, D>(
    harness: &Harness,
    vec: &ArrayBase<S1, Ix1>,
    vf: &ArrayBase<S2, D>,
) -> Result<ArrayD<f64>>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    let grid = FeatureGrid::new(vf)?;
    let layout = grid.layout();
    if vec.len() != grid.ngene() {
        return Err(GridError::DimensionMismatch {
            expected: grid.ngene(),
            found: vec.len(),
        });
    }

    let reference = vec.as_standard_layout();
    let reference = reference
        .as_slice()
        .ok_or_else(|| GridError::Type("reference vector is not contiguous".into()))?;

    debug!(
        "ctmap: extents {:?}, {} features, {} threads",
        layout.extents(),
        grid.ngene(),
        harness.ncores()
    );

    let mut scores = vec![0.0; layout.n_cells()];
    harness.for_each_cell(&mut scores, |cell, slot| {
        *slot = corr(reference, grid.vector(cell));
    });

    ArrayD::from_shape_vec(IxDyn(layout.extents()), scores)
        .map_err(|e| GridError::Type(e.to_string()))
}
