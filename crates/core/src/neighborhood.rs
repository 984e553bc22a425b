use crate::grid::{FeatureGrid, SpatialLayout};

/// Cubic (3D) or square (2D) window of radius `csize` around a cell, center
/// excluded, stored as signed flat cell offsets.
///
/// Offsets are enumerated with the last axis fastest, so the summation order
/// for a given cell never depends on which worker visits it.
#[derive(Debug, Clone)]
pub struct Neighborhood {
    offsets: Vec<isize>,
}

impl Neighborhood {
    pub fn new(layout: &SpatialLayout, csize: usize) -> Self {
        let radius = csize as isize;
        // (flat offset, displacement is non-zero on some axis)
        let mut window = vec![(0isize, false)];
        for &stride in layout.strides() {
            let stride = stride as isize;
            window = window
                .iter()
                .flat_map(|&(base, moved)| {
                    (-radius..=radius).map(move |d| (base + d * stride, moved || d != 0))
                })
                .collect();
        }
        let offsets = window
            .into_iter()
            .filter_map(|(off, moved)| moved.then_some(off))
            .collect();
        Self { offsets }
    }

    /// Number of neighbors summed per cell: `(2 * csize + 1)^D - 1`.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Overwrite `scratch` with the raw (unnormalized) sum of the neighbor
    /// feature vectors of `cell`.
    ///
    /// `cell` must be interior for this window; no bounds handling is done
    /// beyond slice indexing.
    pub fn aggregate(&self, grid: &FeatureGrid<'_>, cell: usize, scratch: &mut [f64]) {
        scratch.fill(0.0);
        for &off in &self.offsets {
            let neighbor = (cell as isize + off) as usize;
            for (acc, &v) in scratch.iter_mut().zip(grid.vector(neighbor)) {
                *acc += v;
            }
        }
    }
}
