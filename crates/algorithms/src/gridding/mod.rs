//! Scattered point to regular grid interpolation
//!
//! Pipeline, leaves first:
//! - [`point_source`]: features to (x, y, value) samples
//! - [`Quadtree`]: spatial index over the samples
//! - [`SearchWindow`]: per-node candidate selection inside a rotated
//!   ellipse with global and per-quadrant count bounds
//! - [`Reducer`]: candidate set to one value
//! - [`LinearInterpolator`]: Delaunay barycentric interpolation
//! - [`Gridder`]: scans the output raster

mod aggregators;
mod algorithm;
mod driver;
mod execution;
mod linear;
pub mod point_source;
mod quadtree;
mod search;

pub use aggregators::{DataMetric, Reducer};
pub use algorithm::{
    GridAlgorithm, InverseDistanceNearestOptions, InverseDistanceOptions, LinearOptions,
    NearestOptions, WindowOptions,
};
pub use driver::{
    grid, grid_points, CancelToken, GridOptions, GridSize, GridState, Gridder, ProgressSink,
};
pub use execution::ExecutionMode;
pub use linear::LinearInterpolator;
pub use point_source::{collect_points, PointSelection};
pub use quadtree::{Quadtree, QuadtreeConfig};
pub use search::{Candidate, QuadrantConstraints, SearchEllipse, SearchScratch, SearchWindow};

/// A sample point with x, y coordinates and a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    /// Squared Euclidean distance to another point
    #[inline]
    pub fn dist_sq(&self, other_x: f64, other_y: f64) -> f64 {
        let dx = self.x - other_x;
        let dy = self.y - other_y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to another point
    #[inline]
    pub fn dist(&self, other_x: f64, other_y: f64) -> f64 {
        self.dist_sq(other_x, other_y).sqrt()
    }
}
