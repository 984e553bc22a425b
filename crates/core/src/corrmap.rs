use crate::error::{GridError, Result};
use crate::grid::FeatureGrid;
use crate::harness::{Harness, MapOptions};
use crate::neighborhood::Neighborhood;
use crate::pearson::corr;
use log::debug;
use ndarray::{Array2, Array3, ArrayBase, ArrayD, Data, Dimension, Ix2, Ix3, Ix4, IxDyn};

/// Correlation of every interior cell with the summed vectors of its
/// neighbors inside a `(2 * size + 1)`-wide window.
///
/// `vf` must have rank 3 (two spatial axes plus features) or rank 4 (three
/// spatial axes plus features). The result drops the feature axis. Cells
/// closer than `size` to any border are `NaN`.
pub fn calc_corrmap<S, D>(vf: &ArrayBase<S, D>, options: &MapOptions) -> Result<ArrayD<f64>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let harness = Harness::new(options.ncores)?;
    corrmap_with(&harness, vf, options.size)
}

/// [`calc_corrmap`] on an existing worker pool.
pub fn corrmap_with<S, D>(
    harness: &Harness,
    vf: &ArrayBase<S, D>,
    csize: usize,
) -> Result<ArrayD<f64>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let grid = FeatureGrid::spatial_2d_or_3d(vf)?;
    let layout = grid.layout();
    let ngene = grid.ngene();

    let mut map = vec![0.0; layout.n_cells()];
    harness.fill(&mut map, f64::NAN);

    let n_interior = layout.n_interior(csize);
    debug!(
        "corrmap: extents {:?}, {} features, radius {}, {} interior cells, {} threads",
        layout.extents(),
        ngene,
        csize,
        n_interior,
        harness.ncores()
    );

    // Work is split by rows along the last spatial axis. A row whose leading
    // coordinates fall in the border is skipped with one check; inside an
    // interior row only `[csize, row_len - csize)` is visited, so border cells
    // keep the fill value without a per-cell coordinate decode. Border rows are
    // still enumerated; the interior is not compacted into its own index space
    // so each worker only ever holds a disjoint row slice.
    if n_interior > 0 {
        let neighborhood = Neighborhood::new(layout, csize);
        let row_len = layout.extents()[layout.extents().len() - 1];
        harness.for_each_row_with(
            &mut map,
            row_len,
            || vec![0.0; ngene],
            |scratch, row, slots| {
                let first = row * row_len;
                if !layout.is_interior(first + csize, csize) {
                    return;
                }
                for (last, slot) in slots
                    .iter_mut()
                    .enumerate()
                    .take(row_len - csize)
                    .skip(csize)
                {
                    let cell = first + last;
                    neighborhood.aggregate(&grid, cell, scratch);
                    *slot = corr(grid.vector(cell), scratch);
                }
            },
        );
    }

    ArrayD::from_shape_vec(IxDyn(layout.extents()), map)
        .map_err(|e| GridError::Type(e.to_string()))
}

/// Two spatial axes: `(x, y, feature)` in, `(x, y)` out.
pub fn corrmap_2d<S>(vf: &ArrayBase<S, Ix3>, options: &MapOptions) -> Result<Array2<f64>>
where
    S: Data<Elem = f64>,
{
    calc_corrmap(vf, options)?
        .into_dimensionality::<Ix2>()
        .map_err(|_| GridError::Shape {
            rank: vf.ndim(),
            expected: "3",
        })
}

/// Three spatial axes: `(x, y, z, feature)` in, `(x, y, z)` out.
pub fn corrmap_3d<S>(vf: &ArrayBase<S, Ix4>, options: &MapOptions) -> Result<Array3<f64>>
where
    S: Data<Elem = f64>,
{
    calc_corrmap(vf, options)?
        .into_dimensionality::<Ix3>()
        .map_err(|_| GridError::Shape {
            rank: vf.ndim(),
            expected: "4",
        })
}
