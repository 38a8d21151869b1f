//! Bootstrap sampling window layout shared across raster items

/// One spatial sampling window: a center cell plus the ordered set of
/// neighbor cells that contribute feature columns.
///
/// Neighbors are ordered by increasing distance from the center, with
/// row-major cell index breaking ties, so the column layout is positional
/// and reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingWindow {
    /// Center cell (row, col)
    pub center: (usize, usize),
    /// Ordered neighbor cells (row, col), nearest first
    pub neighbors: Vec<(usize, usize)>,
    /// Distance of each neighbor from the center, in cell units
    pub distances: Vec<f64>,
}

/// The canonical window/neighbor layout produced by the bootstrap sampler.
///
/// The sampler owns the scheme and hands every registered raster item a
/// shared reference (`Arc<SamplingScheme>`), never a copy, so all items
/// sampled under one scheme agree column-for-column on feature layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingScheme {
    windows: Vec<SamplingWindow>,
    neighbors_per_window: usize,
    include_distance: bool,
}

impl SamplingScheme {
    /// Build a scheme from equalized windows.
    ///
    /// Every window must carry exactly `neighbors_per_window` neighbors;
    /// the sampler truncates ragged windows before constructing the scheme.
    pub fn new(
        windows: Vec<SamplingWindow>,
        neighbors_per_window: usize,
        include_distance: bool,
    ) -> Self {
        debug_assert!(windows
            .iter()
            .all(|w| w.neighbors.len() == neighbors_per_window));
        Self {
            windows,
            neighbors_per_window,
            include_distance,
        }
    }

    /// Number of sampling windows (physical rows per logical raster value)
    pub fn num_windows(&self) -> usize {
        self.windows.len()
    }

    /// Neighbors per window after equalization
    pub fn neighbors_per_window(&self) -> usize {
        self.neighbors_per_window
    }

    /// Whether distance-to-center is appended as an extra feature column
    /// per neighbor
    pub fn include_distance(&self) -> bool {
        self.include_distance
    }

    /// Feature columns contributed per window row
    pub fn columns_per_window(&self) -> usize {
        if self.include_distance {
            self.neighbors_per_window * 2
        } else {
            self.neighbors_per_window
        }
    }

    /// The window layouts, in sampling order
    pub fn windows(&self) -> &[SamplingWindow] {
        &self.windows
    }
}
