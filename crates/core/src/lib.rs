pub mod corrmap;
pub mod ctmap;
pub mod error;
pub mod grid;
pub mod harness;
pub mod neighborhood;
pub mod pearson;

pub use corrmap::{calc_corrmap, corrmap_2d, corrmap_3d, corrmap_with};
pub use ctmap::{calc_ctmap, ctmap_with};
pub use error::{GridError, Result};
pub use grid::{FeatureGrid, SpatialLayout};
pub use harness::{default_ncores, Harness, MapOptions};
pub use neighborhood::Neighborhood;
pub use pearson::{corr, pearson_pair};
