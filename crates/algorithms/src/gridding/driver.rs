//! Grid driver
//!
//! Lays out the output raster, builds the spatial index when it pays off
//! and scans every node: pixel centre, candidate search, reduction, write.
//!
//! ```text
//! Configured -> [Indexing] -> Scanning -> Complete
//!                                  \----> Cancelled
//! ```

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use geo_types::{coord, Rect};
use scattergrid_core::vector::FeatureSource;
use scattergrid_core::{AnyRaster, DataType, Error, GeoTransform, Raster, Result};
use tracing::{debug, info, warn};

use super::aggregators::Reducer;
use super::algorithm::GridAlgorithm;
use super::execution::ExecutionMode;
use super::linear::LinearInterpolator;
use super::point_source::{collect_points, PointSelection};
use super::quadtree::{Quadtree, QuadtreeConfig};
use super::search::{SearchScratch, SearchWindow};
use super::SamplePoint;

/// Output raster size
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridSize {
    /// Number of columns and rows
    Dimensions { width: usize, height: usize },
    /// Pixel size; the extent's maximum corner is moved to fit whole pixels
    Resolution { x: f64, y: f64 },
}

impl Default for GridSize {
    fn default() -> Self {
        GridSize::Dimensions {
            width: 256,
            height: 256,
        }
    }
}

/// Gridding parameters
#[derive(Debug, Clone)]
pub struct GridOptions {
    pub algorithm: GridAlgorithm,
    pub size: GridSize,
    /// Output bounds; the points' extent when unset
    pub extent: Option<Rect<f64>>,
    pub output_type: DataType,
    pub quadtree: QuadtreeConfig,
    /// Index the points once there are more than this many
    pub index_threshold: usize,
    pub mode: ExecutionMode,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            algorithm: GridAlgorithm::default(),
            size: GridSize::default(),
            extent: None,
            output_type: DataType::Float64,
            quadtree: QuadtreeConfig::default(),
            index_threshold: 100,
            mode: ExecutionMode::default(),
        }
    }
}

/// Lifecycle of one gridding run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridState {
    Configured,
    Indexing,
    Scanning,
    Complete,
    Cancelled,
}

/// Receives row completion updates. Failures are logged and ignored.
pub trait ProgressSink: Sync {
    fn report(&self, completed_rows: usize, total_rows: usize) -> Result<()>;
}

/// Shared cancellation flag, checked before each row
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-node value source, fixed for a run
enum Evaluator<'a> {
    Window {
        window: SearchWindow<'a>,
        reducer: Reducer,
    },
    /// Unbounded nearest neighbour through the index
    NearestIndexed {
        tree: &'a Quadtree,
        points: &'a [SamplePoint],
    },
    Linear(&'a LinearInterpolator),
}

impl Evaluator<'_> {
    #[inline]
    fn evaluate(&self, x: f64, y: f64, scratch: &mut SearchScratch) -> Option<f64> {
        match self {
            Evaluator::Window { window, reducer } => {
                window.search(x, y, scratch).and_then(|c| reducer.reduce(c))
            }
            Evaluator::NearestIndexed { tree, points } => {
                tree.nearest(x, y).map(|(i, _)| points[i].value)
            }
            Evaluator::Linear(interp) => interp.interpolate(x, y),
        }
    }
}

/// Runs one gridding configuration
pub struct Gridder<'p> {
    options: GridOptions,
    progress: Option<&'p dyn ProgressSink>,
    cancel: Option<CancelToken>,
    state: GridState,
}

impl<'p> Gridder<'p> {
    /// Validate the options; a bad configuration never reaches scanning
    pub fn new(options: GridOptions) -> Result<Self> {
        options.algorithm.validate()?;
        if let GridSize::Resolution { x, y } = options.size {
            for (name, value) in [("xres", x), ("yres", y)] {
                if !value.is_finite() || value <= 0.0 {
                    return Err(Error::invalid_parameter(
                        name,
                        value,
                        "resolution must be positive",
                    ));
                }
            }
        }
        if let Some(extent) = options.extent {
            check_extent(&extent)?;
        }
        Ok(Self {
            options,
            progress: None,
            cancel: None,
            state: GridState::Configured,
        })
    }

    pub fn with_progress(mut self, sink: &'p dyn ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn state(&self) -> GridState {
        self.state
    }

    fn transition(&mut self, next: GridState) {
        info!("Gridding: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Read points from `source` and grid them into the configured pixel type
    pub fn run_source(
        &mut self,
        source: &dyn FeatureSource,
        selection: &PointSelection,
    ) -> Result<AnyRaster> {
        let points = collect_points(source, selection)?;
        let raster = self.run(&points)?;
        Ok(AnyRaster::from_f64(raster, self.options.output_type))
    }

    /// Grid `points` into an `f64` raster
    pub fn run(&mut self, points: &[SamplePoint]) -> Result<Raster<f64>> {
        let points = finite_points(points);
        let points: &[SamplePoint] = &points;
        let (transform, cols, rows) = layout(&self.options, points)?;
        info!(
            "Gridding {} points into {} x {} with {}",
            points.len(),
            cols,
            rows,
            self.options.algorithm.name()
        );

        let algorithm = self.options.algorithm;
        let plan = algorithm.search_plan();

        // Index structures must outlive the evaluator
        let mut tree = None;
        let mut interpolator = None;
        match &plan {
            Some(plan) if plan.ellipse.is_unbounded() => {
                if plan.reducer == Reducer::Nearest && points.len() > self.options.index_threshold {
                    self.transition(GridState::Indexing);
                    tree = Some(Quadtree::build(points, &self.options.quadtree));
                }
            }
            Some(plan) => {
                let per_quadrant = plan.constraints.per_quadrant();
                if per_quadrant || points.len() > self.options.index_threshold {
                    self.transition(GridState::Indexing);
                    tree = Some(Quadtree::build(points, &self.options.quadtree));
                }
            }
            None => {
                self.transition(GridState::Indexing);
                let radius = match algorithm {
                    GridAlgorithm::Linear(o) => o.radius,
                    _ => -1.0,
                };
                interpolator = Some(LinearInterpolator::new(points, radius));
            }
        }
        if let Some(tree) = &tree {
            debug!(
                "Quadtree: {} points, {} leaves, depth {}",
                tree.len(),
                tree.leaf_count(),
                tree.depth()
            );
        }
        if let Some(interp) = &interpolator {
            debug!("Triangulation: {} triangles", interp.triangle_count());
        }

        let evaluator = match (plan, &tree, &interpolator) {
            (_, _, Some(interp)) => Evaluator::Linear(interp),
            (Some(plan), Some(tree), None) if plan.ellipse.is_unbounded() => {
                Evaluator::NearestIndexed { tree, points }
            }
            (Some(plan), tree, None) => {
                let mut window = SearchWindow::new(points, plan.ellipse, plan.constraints);
                if let Some(tree) = tree {
                    window = window.with_index(tree);
                }
                Evaluator::Window {
                    window,
                    reducer: plan.reducer,
                }
            }
            (None, _, None) => {
                return Err(Error::Algorithm(format!(
                    "{} has no evaluation plan",
                    algorithm.name()
                )))
            }
        };

        self.transition(GridState::Scanning);
        let sentinel = algorithm.sentinel();
        let completed = AtomicUsize::new(0);
        let progress_failed = AtomicBool::new(false);
        let cancel = self.cancel.clone();
        let progress = self.progress;

        let scanned = self.options.mode.map_rows(rows, SearchScratch::new, |scratch, row| {
            if cancel.as_ref().map_or(false, CancelToken::is_cancelled) {
                return Err(Error::Cancelled);
            }
            let values: Vec<f64> = (0..cols)
                .map(|col| {
                    let (x, y) = transform.pixel_to_geo(col, row);
                    evaluator.evaluate(x, y, scratch).unwrap_or(sentinel)
                })
                .collect();

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(sink) = progress {
                if let Err(e) = sink.report(done, rows) {
                    if !progress_failed.swap(true, Ordering::Relaxed) {
                        warn!("Progress reporting failed, continuing: {}", e);
                    }
                }
            }
            Ok(values)
        });

        let scanned = match scanned {
            Ok(rows) => rows,
            Err(Error::Cancelled) => {
                self.transition(GridState::Cancelled);
                return Err(Error::Cancelled);
            }
            Err(e) => return Err(e),
        };

        let data: Vec<f64> = scanned.into_iter().flatten().collect();
        let mut raster = Raster::from_vec(data, rows, cols)?;
        raster.set_transform(transform);
        raster.set_nodata(algorithm.nodata());

        self.transition(GridState::Complete);
        Ok(raster)
    }
}

fn check_extent(extent: &Rect<f64>) -> Result<()> {
    let finite = [extent.min().x, extent.min().y, extent.max().x, extent.max().y]
        .iter()
        .all(|v| v.is_finite());
    if !finite || extent.width() <= 0.0 || extent.height() <= 0.0 {
        return Err(Error::invalid_parameter(
            "output_bounds",
            format!(
                "[{}, {}, {}, {}]",
                extent.min().x,
                extent.min().y,
                extent.max().x,
                extent.max().y
            ),
            "extent must be finite with non-zero width and height",
        ));
    }
    Ok(())
}

/// `points` without samples that have a non-finite coordinate or value
fn finite_points(points: &[SamplePoint]) -> Cow<'_, [SamplePoint]> {
    let finite = |p: &SamplePoint| p.x.is_finite() && p.y.is_finite() && p.value.is_finite();
    if points.iter().all(finite) {
        return Cow::Borrowed(points);
    }
    let kept: Vec<SamplePoint> = points.iter().filter(|p| finite(*p)).copied().collect();
    debug!("Ignoring {} non-finite samples", points.len() - kept.len());
    Cow::Owned(kept)
}

/// Rejects a grid whose cell count cannot be allocated
fn check_size(cols: f64, rows: f64) -> Result<(usize, usize)> {
    let max_cells = (isize::MAX as usize / std::mem::size_of::<f64>()) as f64;
    if !(cols.is_finite() && rows.is_finite()) || cols * rows > max_cells {
        return Err(Error::invalid_parameter(
            "output_size",
            format!("{} x {}", cols, rows),
            "grid is too large to allocate",
        ));
    }
    Ok((cols as usize, rows as usize))
}

/// Bounding rectangle of the points
fn point_extent(points: &[SamplePoint]) -> Option<Rect<f64>> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Rect::new(
        coord! { x: min_x, y: min_y },
        coord! { x: max_x, y: max_y },
    ))
}

/// Output transform and (cols, rows)
fn layout(options: &GridOptions, points: &[SamplePoint]) -> Result<(GeoTransform, usize, usize)> {
    let extent = match options.extent {
        Some(extent) => extent,
        None => {
            let extent = point_extent(points).ok_or_else(|| {
                Error::invalid_parameter(
                    "output_bounds",
                    "none",
                    "no input points to derive the extent from",
                )
            })?;
            check_extent(&extent)?;
            extent
        }
    };

    match options.size {
        GridSize::Dimensions { width, height } => {
            check_size(width as f64, height as f64)?;
            let transform = GeoTransform::from_extent(extent, width, height)?;
            Ok((transform, width, height))
        }
        GridSize::Resolution { x, y } => {
            let (cols, rows) = check_size(
                (extent.width() / x).round().max(1.0),
                (extent.height() / y).round().max(1.0),
            )?;
            let min = extent.min();
            let fitted = Rect::new(
                min,
                coord! { x: min.x + cols as f64 * x, y: min.y + rows as f64 * y },
            );
            let transform = GeoTransform::from_extent(fitted, cols, rows)?;
            Ok((transform, cols, rows))
        }
    }
}

/// Grid sample points with `options`
pub fn grid_points(points: &[SamplePoint], options: &GridOptions) -> Result<Raster<f64>> {
    Gridder::new(options.clone())?.run(points)
}

/// Select points from `source` and grid them into `options.output_type`
pub fn grid(
    source: &dyn FeatureSource,
    selection: &PointSelection,
    options: &GridOptions,
) -> Result<AnyRaster> {
    Gridder::new(options.clone())?.run_source(source, selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<f64> {
        Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 })
    }

    fn scattered(n: usize) -> Vec<SamplePoint> {
        // Deterministic low-discrepancy scatter
        (0..n)
            .map(|i| {
                let x = (i as f64 * 0.618_033_988_75).fract() * 100.0;
                let y = (i as f64 * 0.754_877_666_25).fract() * 100.0;
                SamplePoint::new(x, y, (x * 0.1).sin() * 50.0 + y)
            })
            .collect()
    }

    fn options(algorithm: &str, size: usize) -> GridOptions {
        GridOptions {
            algorithm: algorithm.parse().unwrap(),
            size: GridSize::Dimensions {
                width: size,
                height: size,
            },
            extent: Some(rect(0.0, 0.0, 100.0, 100.0)),
            ..Default::default()
        }
    }

    #[test]
    fn test_layout_pixel_centres() {
        let opts = GridOptions {
            size: GridSize::Dimensions {
                width: 10,
                height: 5,
            },
            extent: Some(rect(-0.4, -0.4, 0.6, 0.6)),
            ..Default::default()
        };
        let (t, cols, rows) = layout(&opts, &[]).unwrap();
        assert_eq!((cols, rows), (10, 5));
        let (x, y) = t.pixel_to_geo(0, 0);
        assert_relative_eq!(x, -0.35, epsilon = 1e-12);
        assert_relative_eq!(y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_layout_from_resolution() {
        let opts = GridOptions {
            size: GridSize::Resolution { x: 0.3, y: 0.5 },
            extent: Some(rect(0.0, 0.0, 1.0, 2.0)),
            ..Default::default()
        };
        let (t, cols, rows) = layout(&opts, &[]).unwrap();
        assert_eq!((cols, rows), (3, 4));
        assert_relative_eq!(t.pixel_width, 0.3, epsilon = 1e-12);
        assert_relative_eq!(t.pixel_height, -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_extent_defaults_to_points() {
        let pts = vec![SamplePoint::new(0.0, 0.0, 1.0), SamplePoint::new(4.0, 2.0, 1.0)];
        let opts = GridOptions {
            size: GridSize::Dimensions {
                width: 4,
                height: 2,
            },
            ..Default::default()
        };
        let raster = grid_points(&pts, &opts).unwrap();
        assert_eq!(raster.shape(), (2, 4));
        assert_eq!(raster.bounds(), rect(0.0, 0.0, 4.0, 2.0));

        // A single point has no extent
        let err = grid_points(&pts[..1], &opts).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_configuration_is_rejected_up_front() {
        let opts = GridOptions {
            size: GridSize::Resolution { x: 0.0, y: 1.0 },
            ..Default::default()
        };
        assert!(Gridder::new(opts).is_err());

        let opts = GridOptions {
            extent: Some(rect(0.0, 0.0, 0.0, 1.0)),
            ..Default::default()
        };
        assert!(Gridder::new(opts).is_err());
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        let opts = GridOptions {
            size: GridSize::Resolution { x: 1e-300, y: 1e-300 },
            extent: Some(rect(0.0, 0.0, 1000.0, 1000.0)),
            ..Default::default()
        };
        let err = grid_points(&[], &opts).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("output_size"));

        let opts = GridOptions {
            size: GridSize::Dimensions {
                width: usize::MAX / 2,
                height: 4,
            },
            extent: Some(rect(0.0, 0.0, 1.0, 1.0)),
            ..Default::default()
        };
        assert!(grid_points(&[], &opts).unwrap_err().is_configuration());
    }

    #[test]
    fn test_non_finite_samples_are_ignored() {
        let clean = vec![SamplePoint::new(0.0, 0.0, 1.0), SamplePoint::new(1.0, 1.0, 3.0)];
        let mut dirty = clean.clone();
        dirty.insert(1, SamplePoint::new(f64::NAN, 0.5, 100.0));
        dirty.push(SamplePoint::new(0.5, f64::INFINITY, 100.0));

        for algo in ["invdist", "nearest", "average:radius=2", "linear:radius=-1"] {
            let mut opts = GridOptions {
                algorithm: algo.parse().unwrap(),
                size: GridSize::Dimensions {
                    width: 2,
                    height: 2,
                },
                extent: Some(rect(0.0, 0.0, 1.0, 1.0)),
                ..Default::default()
            };
            let expected = grid_points(&clean, &opts).unwrap();
            assert!(expected.data().iter().all(|v| v.is_finite()), "{}", algo);

            opts.index_threshold = 0;
            assert_eq!(grid_points(&dirty, &opts).unwrap().data(), expected.data(), "{}", algo);
            opts.index_threshold = usize::MAX;
            assert_eq!(grid_points(&dirty, &opts).unwrap().data(), expected.data(), "{}", algo);
        }
    }

    #[test]
    fn test_no_points_gives_sentinel() {
        let mut opts = options("average:radius=5:nodata=-9999", 4);
        let raster = grid_points(&[], &opts).unwrap();
        assert!(raster.data().iter().all(|&v| v == -9999.0));
        assert_eq!(raster.nodata(), Some(-9999.0));

        opts.algorithm = "average:radius=5".parse().unwrap();
        let raster = grid_points(&[], &opts).unwrap();
        assert!(raster.data().iter().all(|&v| v == 0.0));
        assert_eq!(raster.nodata(), None);
    }

    #[test]
    fn test_index_does_not_change_results() {
        let pts = scattered(500);
        for algo in [
            "invdist:power=2:radius=15:max_points=8",
            "average:radius1=20:radius2=8:angle=30",
            "maximum:radius=10:min_points=3",
            "count:radius=12:max_points_per_quadrant=2",
            "nearest:radius=10",
            "nearest",
        ] {
            let mut indexed = options(algo, 24);
            indexed.index_threshold = 0;
            let mut brute = options(algo, 24);
            brute.index_threshold = usize::MAX;

            let a = grid_points(&pts, &indexed).unwrap();
            let b = grid_points(&pts, &brute).unwrap();
            assert_eq!(a.data(), b.data(), "{}", algo);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let pts = scattered(300);
        for algo in ["invdist:radius=20", "average_distance_pts:radius=15", "linear"] {
            let seq = options(algo, 32);
            let par = GridOptions {
                mode: ExecutionMode::ParallelWith(4),
                ..options(algo, 32)
            };
            let a = grid_points(&pts, &seq).unwrap();
            let b = grid_points(&pts, &par).unwrap();
            assert_eq!(a.data(), b.data(), "{}", algo);
        }
    }

    #[test]
    fn test_state_machine() {
        let pts = scattered(50);
        let mut g = Gridder::new(options("linear", 8)).unwrap();
        assert_eq!(g.state(), GridState::Configured);
        g.run(&pts).unwrap();
        assert_eq!(g.state(), GridState::Complete);
    }

    #[test]
    fn test_cancel() {
        let token = CancelToken::new();
        token.cancel();
        let mut g = Gridder::new(options("invdist", 8))
            .unwrap()
            .with_cancel_token(token);
        let err = g.run(&scattered(10)).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(g.state(), GridState::Cancelled);
    }

    struct Recorder(Mutex<Vec<usize>>);

    impl ProgressSink for Recorder {
        fn report(&self, completed_rows: usize, _total_rows: usize) -> Result<()> {
            self.0.lock().unwrap().push(completed_rows);
            Err(Error::Other("display gone".into()))
        }
    }

    #[test]
    fn test_progress_failures_are_ignored() {
        let recorder = Recorder(Mutex::new(Vec::new()));
        let mut g = Gridder::new(options("nearest", 6))
            .unwrap()
            .with_progress(&recorder);
        let raster = g.run(&scattered(20)).unwrap();
        assert_eq!(raster.shape(), (6, 6));
        assert_eq!(*recorder.0.lock().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }
}
