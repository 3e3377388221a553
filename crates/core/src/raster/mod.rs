//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;
mod neighborhood;

pub use element::{DataType, RasterElement, FLOAT_NODATA};
pub use geotransform::GeoTransform;
pub use grid::Raster;
pub use neighborhood::Neighborhood;
