//! Item data model
//!
//! An item is a named variable participating in a regression: an input or
//! an output, real-valued or categorical, scalar, fixed-width array or
//! raster-backed. Every kind exposes the same value interface
//! ([`ItemValues`]) so the matrix assembler can flatten a heterogeneous
//! collection into one row-aligned numeric matrix; raster kinds
//! additionally implement [`RasterCapable`].

mod categorical;
mod real;
mod raster;

pub use categorical::{CategoricalItem, CategoryMap};
pub use raster::{CategoricalRasterItem, RasterCapable, RealRasterItem};
pub use real::{RealArrayItem, RealItem};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Whether an item feeds the design matrix or the target matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Input,
    Output,
}

/// Value kind of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Real,
    Categorical,
}

/// The value interface every item kind exposes to the matrix assembler
/// and the regression write-back.
///
/// `training_values`/`forecast_values` return one `num_rows_per_value() x
/// column_count()` block per logical value; `set_forecast_values` accepts
/// a block of the same shape (already folded for single-row items).
pub trait ItemValues {
    fn name(&self) -> &str;

    fn role(&self) -> Role;

    fn value_kind(&self) -> ValueKind;

    /// Feature columns contributed per physical row
    fn column_count(&self) -> usize;

    fn num_training_values(&self) -> usize;

    fn num_forecast_values(&self) -> usize;

    /// Physical rows contributed per logical value (>1 for raster items
    /// sampled with bootstrap windows)
    fn num_rows_per_value(&self) -> usize {
        1
    }

    fn training_values(&self, row: usize) -> Result<Array2<f64>>;

    fn forecast_values(&self, row: usize) -> Result<Array2<f64>>;

    fn set_forecast_values(
        &mut self,
        row: usize,
        values: &Array2<f64>,
        uncertainty: &Array2<f64>,
    ) -> Result<()>;
}

/// Tagged variant over the five item kinds.
#[derive(Debug, Clone)]
pub enum Item {
    Real(RealItem),
    RealArray(RealArrayItem),
    Categorical(CategoricalItem),
    RealRaster(RealRasterItem),
    CategoricalRaster(CategoricalRasterItem),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            Item::Real($inner) => $body,
            Item::RealArray($inner) => $body,
            Item::Categorical($inner) => $body,
            Item::RealRaster($inner) => $body,
            Item::CategoricalRaster($inner) => $body,
        }
    };
}

impl Item {
    /// Raster capabilities, for the two raster-backed kinds
    pub fn as_raster(&self) -> Option<&dyn RasterCapable> {
        match self {
            Item::RealRaster(item) => Some(item),
            Item::CategoricalRaster(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_raster_mut(&mut self) -> Option<&mut dyn RasterCapable> {
        match self {
            Item::RealRaster(item) => Some(item),
            Item::CategoricalRaster(item) => Some(item),
            _ => None,
        }
    }
}

impl ItemValues for Item {
    fn name(&self) -> &str {
        dispatch!(self, item => item.name())
    }

    fn role(&self) -> Role {
        dispatch!(self, item => item.role())
    }

    fn value_kind(&self) -> ValueKind {
        dispatch!(self, item => item.value_kind())
    }

    fn column_count(&self) -> usize {
        dispatch!(self, item => item.column_count())
    }

    fn num_training_values(&self) -> usize {
        dispatch!(self, item => item.num_training_values())
    }

    fn num_forecast_values(&self) -> usize {
        dispatch!(self, item => item.num_forecast_values())
    }

    fn num_rows_per_value(&self) -> usize {
        dispatch!(self, item => item.num_rows_per_value())
    }

    fn training_values(&self, row: usize) -> Result<Array2<f64>> {
        dispatch!(self, item => item.training_values(row))
    }

    fn forecast_values(&self, row: usize) -> Result<Array2<f64>> {
        dispatch!(self, item => item.forecast_values(row))
    }

    fn set_forecast_values(
        &mut self,
        row: usize,
        values: &Array2<f64>,
        uncertainty: &Array2<f64>,
    ) -> Result<()> {
        dispatch!(self, item => item.set_forecast_values(row, values, uncertainty))
    }
}

impl From<RealItem> for Item {
    fn from(item: RealItem) -> Self {
        Item::Real(item)
    }
}

impl From<RealArrayItem> for Item {
    fn from(item: RealArrayItem) -> Self {
        Item::RealArray(item)
    }
}

impl From<CategoricalItem> for Item {
    fn from(item: CategoricalItem) -> Self {
        Item::Categorical(item)
    }
}

impl From<RealRasterItem> for Item {
    fn from(item: RealRasterItem) -> Self {
        Item::RealRaster(item)
    }
}

impl From<CategoricalRasterItem> for Item {
    fn from(item: CategoricalRasterItem) -> Self {
        Item::CategoricalRaster(item)
    }
}

/// Grow a stream to `len`, padding with `fill`
pub(crate) fn grow_with<T: Clone>(list: &mut Vec<T>, len: usize, fill: T) {
    if list.len() < len {
        list.resize(len, fill);
    }
}
