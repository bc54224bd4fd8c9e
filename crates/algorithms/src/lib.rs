//! # scattergrid algorithms
//!
//! Scattered point to regular grid interpolation.
//!
//! ## Available algorithms
//!
//! - **invdist**, **invdistnn**: inverse distance to a power
//! - **average**: moving average inside a search ellipse
//! - **nearest**: nearest neighbour
//! - **minimum**, **maximum**, **range**, **count**, **average_distance**,
//!   **average_distance_pts**: data metrics
//! - **linear**: Delaunay triangulation with barycentric weights

pub mod gridding;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::gridding::{
        collect_points, grid, grid_points, CancelToken, DataMetric, ExecutionMode, GridAlgorithm,
        GridOptions, GridSize, Gridder, PointSelection, ProgressSink, QuadrantConstraints,
        SamplePoint, SearchEllipse,
    };
    pub use scattergrid_core::prelude::*;
}
