//! Search window engine
//!
//! For one grid node, select the sample points inside a (possibly rotated)
//! search ellipse and apply the point count constraints.
//!
//! Offsets are rotated into the ellipse's own frame before anything else:
//!
//! ```text
//! lx =  dx·cos(angle) + dy·sin(angle)
//! ly = -dx·sin(angle) + dy·cos(angle)
//! inside  <=>  lx²/r1² + ly²/r2² <= 1
//! ```
//!
//! Quadrants come from the signs of `(lx, ly)`, never from the global axes,
//! so a rotated ellipse carries its quadrants with it.

use geo_types::{coord, Rect};
use serde::{Deserialize, Serialize};
use scattergrid_core::{Error, Result};

use super::quadtree::Quadtree;
use super::SamplePoint;

/// Search ellipse around a grid node.
///
/// Both radii zero means an unbounded search that accepts every point.
/// Exactly one radius zero is a degenerate ellipse that accepts nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchEllipse {
    /// Semi-axis along the ellipse's local X axis
    pub radius1: f64,
    /// Semi-axis along the ellipse's local Y axis
    pub radius2: f64,
    /// Rotation in degrees, counter-clockwise from the X axis
    pub angle: f64,
}

impl Default for SearchEllipse {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl SearchEllipse {
    pub fn new(radius1: f64, radius2: f64, angle: f64) -> Self {
        Self {
            radius1,
            radius2,
            angle,
        }
    }

    pub fn circle(radius: f64) -> Self {
        Self::new(radius, radius, 0.0)
    }

    pub fn unbounded() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn is_unbounded(&self) -> bool {
        self.radius1 == 0.0 && self.radius2 == 0.0
    }

    /// Exactly one radius is zero
    pub fn is_degenerate(&self) -> bool {
        !self.is_unbounded() && (self.radius1 == 0.0 || self.radius2 == 0.0)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("radius1", self.radius1), ("radius2", self.radius2)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid_parameter(
                    name,
                    value,
                    "radius must be finite and non-negative",
                ));
            }
        }
        if !self.angle.is_finite() {
            return Err(Error::invalid_parameter("angle", self.angle, "angle must be finite"));
        }
        Ok(())
    }

    /// Axis-aligned bounding box of the rotated ellipse centred on (x, y).
    ///
    /// `None` for an unbounded search.
    pub fn bounding_box(&self, x: f64, y: f64) -> Option<Rect<f64>> {
        if self.is_unbounded() {
            return None;
        }
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let (a, b) = (self.radius1, self.radius2);
        // Slight padding keeps boundary points that rounding would push out
        let hx = ((a * cos).powi(2) + (b * sin).powi(2)).sqrt() * (1.0 + 1e-12);
        let hy = ((a * sin).powi(2) + (b * cos).powi(2)).sqrt() * (1.0 + 1e-12);
        Some(Rect::new(
            coord! { x: x - hx, y: y - hy },
            coord! { x: x + hx, y: y + hy },
        ))
    }

    fn frame(&self) -> Frame {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        Frame {
            sin,
            cos,
            inv_r1_sq: 1.0 / (self.radius1 * self.radius1),
            inv_r2_sq: 1.0 / (self.radius2 * self.radius2),
            unbounded: self.is_unbounded(),
            degenerate: self.is_degenerate(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    sin: f64,
    cos: f64,
    inv_r1_sq: f64,
    inv_r2_sq: f64,
    unbounded: bool,
    degenerate: bool,
}

impl Frame {
    /// Local-frame offsets, or `None` when outside the ellipse
    #[inline]
    fn locate(&self, dx: f64, dy: f64) -> Option<(f64, f64)> {
        if self.degenerate {
            return None;
        }
        let lx = dx * self.cos + dy * self.sin;
        let ly = dy * self.cos - dx * self.sin;
        if self.unbounded || lx * lx * self.inv_r1_sq + ly * ly * self.inv_r2_sq <= 1.0 {
            Some((lx, ly))
        } else {
            None
        }
    }
}

/// Global and per-quadrant point count bounds. Zero means unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadrantConstraints {
    pub min_points: usize,
    pub max_points: usize,
    pub min_points_per_quadrant: usize,
    pub max_points_per_quadrant: usize,
}

impl QuadrantConstraints {
    /// Whether any per-quadrant bound is set
    pub fn per_quadrant(&self) -> bool {
        self.min_points_per_quadrant > 0 || self.max_points_per_quadrant > 0
    }

    /// Whether candidates must be ranked by distance before trimming
    fn needs_ranking(&self) -> bool {
        self.max_points > 0 || self.max_points_per_quadrant > 0
    }
}

/// A point accepted by the search window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Index into the searched point slice
    pub index: usize,
    /// Offset from the grid node in world units
    pub dx: f64,
    pub dy: f64,
    pub dist_sq: f64,
    pub value: f64,
    /// 0..4, counter-clockwise from the ellipse's +X/+Y quadrant
    pub quadrant: u8,
}

impl Candidate {
    #[inline]
    pub fn distance(&self) -> f64 {
        self.dist_sq.sqrt()
    }
}

fn quadrant(lx: f64, ly: f64) -> u8 {
    match (lx >= 0.0, ly >= 0.0) {
        (true, true) => 0,
        (false, true) => 1,
        (false, false) => 2,
        (true, false) => 3,
    }
}

/// Reusable buffers for [`SearchWindow::search`]. One per worker.
#[derive(Debug, Default)]
pub struct SearchScratch {
    hits: Vec<usize>,
    candidates: Vec<Candidate>,
}

impl SearchScratch {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Candidate selection for grid nodes over a fixed point set
#[derive(Debug, Clone, Copy)]
pub struct SearchWindow<'a> {
    points: &'a [SamplePoint],
    index: Option<&'a Quadtree>,
    ellipse: SearchEllipse,
    frame: Frame,
    constraints: QuadrantConstraints,
}

impl<'a> SearchWindow<'a> {
    pub fn new(
        points: &'a [SamplePoint],
        ellipse: SearchEllipse,
        constraints: QuadrantConstraints,
    ) -> Self {
        Self {
            points,
            index: None,
            ellipse,
            frame: ellipse.frame(),
            constraints,
        }
    }

    /// Use a quadtree built over the same point slice for bounded searches
    pub fn with_index(mut self, index: &'a Quadtree) -> Self {
        self.index = Some(index);
        self
    }

    pub fn ellipse(&self) -> &SearchEllipse {
        &self.ellipse
    }

    pub fn constraints(&self) -> &QuadrantConstraints {
        &self.constraints
    }

    /// Candidates for the node at (x, y).
    ///
    /// Returns `None` when the count constraints are not met. Without
    /// ranking constraints the candidates are in insertion order; otherwise
    /// they are nearest-first with ties in insertion order.
    pub fn search<'s>(&self, x: f64, y: f64, scratch: &'s mut SearchScratch) -> Option<&'s [Candidate]> {
        let SearchScratch { hits, candidates } = scratch;
        candidates.clear();

        if self.frame.degenerate {
            return self.finish(candidates);
        }

        match (self.index, self.ellipse.bounding_box(x, y)) {
            (Some(tree), Some(bbox)) => {
                hits.clear();
                tree.query_rect(&bbox, hits);
                // Tree order is not insertion order
                hits.sort_unstable();
                for &i in hits.iter() {
                    self.consider(i, x, y, candidates);
                }
            }
            _ => {
                for i in 0..self.points.len() {
                    self.consider(i, x, y, candidates);
                }
            }
        }

        self.finish(candidates)
    }

    #[inline]
    fn consider(&self, index: usize, x: f64, y: f64, out: &mut Vec<Candidate>) {
        let p = &self.points[index];
        let dx = p.x - x;
        let dy = p.y - y;
        if let Some((lx, ly)) = self.frame.locate(dx, dy) {
            out.push(Candidate {
                index,
                dx,
                dy,
                dist_sq: dx * dx + dy * dy,
                value: p.value,
                quadrant: quadrant(lx, ly),
            });
        }
    }

    fn finish<'s>(&self, candidates: &'s mut Vec<Candidate>) -> Option<&'s [Candidate]> {
        let c = &self.constraints;

        if c.needs_ranking() {
            // Stable: equal distances keep insertion order
            candidates.sort_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq));
        }

        if c.max_points_per_quadrant > 0 {
            let mut kept = [0usize; 4];
            candidates.retain(|cand| {
                let q = cand.quadrant as usize;
                if kept[q] < c.max_points_per_quadrant {
                    kept[q] += 1;
                    true
                } else {
                    false
                }
            });
        }

        if c.max_points > 0 {
            candidates.truncate(c.max_points);
        }

        if candidates.len() < c.min_points {
            return None;
        }
        if c.min_points_per_quadrant > 0 {
            let mut counts = [0usize; 4];
            for cand in candidates.iter() {
                counts[cand.quadrant as usize] += 1;
            }
            if counts.iter().any(|&n| n < c.min_points_per_quadrant) {
                return None;
            }
        }

        Some(candidates.as_slice())
    }
}
