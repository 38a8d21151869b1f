//! # Sparva Core
//!
//! Core types for the Sparva sparse Bayesian regression toolkit.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced grid type with no-data handling
//! - `GeoTransform`: affine cell/coordinate mapping
//! - The item data model: real, array, categorical and raster-backed
//!   variables behind one value interface
//! - `SamplingScheme`: the bootstrap window layout shared across raster
//!   items
//! - The shared error taxonomy

pub mod error;
pub mod item;
pub mod raster;

pub use error::{Error, Result};
pub use item::{
    CategoricalItem, CategoricalRasterItem, CategoryMap, Item, ItemValues, RasterCapable,
    RealArrayItem, RealItem, RealRasterItem, Role, ValueKind,
};
pub use raster::{CellValue, GeoTransform, Raster, SamplingScheme, SamplingWindow};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::item::{
        CategoricalItem, CategoricalRasterItem, CategoryMap, Item, ItemValues, RasterCapable,
        RealArrayItem, RealItem, RealRasterItem, Role, ValueKind,
    };
    pub use crate::raster::{CellValue, GeoTransform, Raster, SamplingScheme, SamplingWindow};
}
