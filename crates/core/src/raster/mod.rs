//! Raster grid types and georeferencing

mod element;
mod geotransform;
mod grid;
mod sampling;

pub use element::CellValue;
pub use geotransform::GeoTransform;
pub use grid::Raster;
pub use sampling::{SamplingScheme, SamplingWindow};
