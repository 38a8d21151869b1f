//! # Sparva Engine
//!
//! Numerical engine for sparse Bayesian kernel regression over
//! heterogeneous items.
//!
//! ## Components
//!
//! - **kernel**: pairwise similarity matrices under ten kernel families
//! - **assemble**: row-aligned design/target matrices from heterogeneous
//!   items, with bootstrap-window expansion
//! - **bootstrap**: spatial sampling windows over raster items
//! - **train**: fast marginal-likelihood maximization producing a sparse
//!   relevance-vector model
//! - **predict**: kernel projection of forecast rows through the frozen
//!   model, with predictive uncertainty
//! - **session**: orchestration of the full pipeline and result
//!   write-back into output items

pub mod assemble;
pub mod bootstrap;
pub mod kernel;
pub mod linalg;
pub mod maybe_rayon;
pub mod predict;
pub mod session;
pub mod train;

pub use assemble::{assemble_forecast, assemble_training, Assembly, RowIssue, SampleSet};
pub use bootstrap::{BootstrapParams, CenterStrategy, RasterBootstrap};
pub use kernel::{distance_squared, Kernel, KernelFamily};
pub use predict::{predict, Prediction};
pub use session::{RunMode, Session};
pub use train::{train, SparseModel, StopHandle, TrainParams, Variant};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::assemble::{assemble_forecast, assemble_training, Assembly};
    pub use crate::bootstrap::{BootstrapParams, CenterStrategy, RasterBootstrap};
    pub use crate::kernel::{Kernel, KernelFamily};
    pub use crate::predict::{predict, Prediction};
    pub use crate::session::{RunMode, Session};
    pub use crate::train::{train, SparseModel, StopHandle, TrainParams, Variant};
    pub use sparva_core::prelude::*;
}
