use crate::error::{GridError, Result};
use ndarray::{ArrayBase, CowArray, Data, Dimension, IxDyn};

/// Read-only, row-major view of a feature grid.
///
/// The trailing axis is the feature axis of length `ngene`; every leading
/// axis is spatial. The feature vector of a spatial cell is a contiguous run
/// of `ngene` values starting at `cell * ngene`.
pub struct FeatureGrid<'a> {
    values: CowArray<'a, f64, IxDyn>,
    layout: SpatialLayout,
}

impl<'a> FeatureGrid<'a> {
    /// Borrow `vf` as a feature grid. Arrays that are not already in
    /// standard layout are copied once; the caller's buffer is never written.
    pub fn new<S, D>(vf: &'a ArrayBase<S, D>) -> Result<Self>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let shape = vf.shape();
        let Some((&ngene, spatial)) = shape.split_last() else {
            return Err(GridError::Shape {
                rank: 0,
                expected: "at least 1",
            });
        };

        let values = vf.as_standard_layout().into_dyn();
        if values.as_slice().is_none() {
            return Err(GridError::Type("grid memory is not contiguous".into()));
        }

        Ok(Self {
            values,
            layout: SpatialLayout::new(spatial.to_vec(), ngene),
        })
    }

    /// Like [`FeatureGrid::new`], restricted to 2 or 3 spatial axes.
    pub fn spatial_2d_or_3d<S, D>(vf: &'a ArrayBase<S, D>) -> Result<Self>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let rank = vf.ndim();
        if rank != 3 && rank != 4 {
            return Err(GridError::Shape {
                rank,
                expected: "3 or 4",
            });
        }
        Self::new(vf)
    }

    pub fn layout(&self) -> &SpatialLayout {
        &self.layout
    }

    pub fn ngene(&self) -> usize {
        self.layout.ngene
    }

    pub fn as_slice(&self) -> &[f64] {
        // Standard layout is checked in the constructor.
        self.values.as_slice().unwrap_or(&[])
    }

    /// Feature vector of the spatial cell at flat index `cell`.
    pub fn vector(&self, cell: usize) -> &[f64] {
        let start = cell * self.layout.ngene;
        &self.as_slice()[start..start + self.layout.ngene]
    }
}

/// Spatial extents of a grid plus row-major strides over cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialLayout {
    extents: Vec<usize>,
    strides: Vec<usize>,
    ngene: usize,
}

impl SpatialLayout {
    pub fn new(extents: Vec<usize>, ngene: usize) -> Self {
        let mut strides = vec![1; extents.len()];
        for axis in (0..extents.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * extents[axis + 1];
        }
        Self {
            extents,
            strides,
            ngene,
        }
    }

    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    /// Cell strides, last axis fastest.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn n_cells(&self) -> usize {
        self.extents.iter().product()
    }

    /// True when every coordinate of `cell` lies in `[csize, extent - csize)`.
    pub fn is_interior(&self, cell: usize, csize: usize) -> bool {
        let mut rem = cell;
        for (&extent, &stride) in self.extents.iter().zip(&self.strides) {
            let coord = rem / stride;
            rem %= stride;
            if coord < csize || coord >= extent.saturating_sub(csize) {
                return false;
            }
        }
        true
    }

    /// Number of cells with every coordinate in the interior band.
    pub fn n_interior(&self, csize: usize) -> usize {
        self.extents
            .iter()
            .map(|&e| e.saturating_sub(csize.saturating_mul(2)))
            .product()
    }
}
