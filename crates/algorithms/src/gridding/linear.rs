//! Linear interpolation over a Delaunay triangulation
//!
//! The triangulation is bulk loaded with `spade`, which uses exact
//! orientation and in-circle predicates, so thin triangles along the hull
//! are kept. A node inside a triangle gets the barycentric blend of the
//! triangle's three values. A node outside the convex hull falls back to the
//! nearest sample within `radius`: a negative radius means any distance,
//! zero means the node has no value.

use std::collections::HashSet;
use std::fmt;

use geo_types::{coord, Rect};
use spade::{
    DelaunayTriangulation, HasPosition, HierarchyHintGenerator, Point2, PositionInTriangulation,
    Triangulation,
};
use tracing::warn;

use super::quadtree::{Quadtree, QuadtreeConfig};
use super::SamplePoint;

/// Triangulation vertex carrying the sample value
#[derive(Debug, Clone, Copy)]
struct Node {
    position: Point2<f64>,
    value: f64,
}

impl HasPosition for Node {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

// The hierarchy hint keeps `locate` logarithmic and holds no interior
// mutability, so the mesh can be shared across scan threads.
type Mesh = DelaunayTriangulation<Node, (), (), (), HierarchyHintGenerator<f64>>;

/// Twice the signed area of (a, b, c), positive when counter-clockwise
fn cross(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

/// Barycentric blend of the three vertex values at `q`
fn blend(q: Point2<f64>, a: &Node, b: &Node, c: &Node) -> f64 {
    let area = cross(a.position, b.position, c.position);
    let wa = cross(q, b.position, c.position) / area;
    let wb = cross(a.position, q, c.position) / area;
    let wc = 1.0 - wa - wb;
    wa * a.value + wb * b.value + wc * c.value
}

/// Linear blend along the edge (a, b) at the projection of `q`
fn along_edge(q: Point2<f64>, a: &Node, b: &Node) -> f64 {
    let (ex, ey) = (b.position.x - a.position.x, b.position.y - a.position.y);
    let len_sq = ex * ex + ey * ey;
    if len_sq == 0.0 {
        return a.value;
    }
    let t = (((q.x - a.position.x) * ex + (q.y - a.position.y) * ey) / len_sq).clamp(0.0, 1.0);
    a.value + t * (b.value - a.value)
}

/// Triangulated linear interpolator over a fixed point set
pub struct LinearInterpolator {
    points: Vec<SamplePoint>,
    mesh: Option<Mesh>,
    hull: Option<Rect<f64>>,
    nearest: Quadtree,
    radius: f64,
}

impl fmt::Debug for LinearInterpolator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearInterpolator")
            .field("points", &self.points.len())
            .field("triangles", &self.triangle_count())
            .field("hull", &self.hull)
            .field("radius", &self.radius)
            .finish()
    }
}

impl LinearInterpolator {
    /// Triangulate `points`. Exact duplicate locations keep the first value
    /// and samples with a non-finite coordinate or value are skipped.
    ///
    /// Fewer than three distinct or only collinear points give no triangles;
    /// every node then uses the nearest-point fallback.
    pub fn new(points: &[SamplePoint], radius: f64) -> Self {
        let mut seen = HashSet::new();
        let unique: Vec<SamplePoint> = points
            .iter()
            .filter(|p| p.x.is_finite() && p.y.is_finite() && p.value.is_finite())
            // +0.0 folds -0.0 onto 0.0
            .filter(|p| seen.insert(((p.x + 0.0).to_bits(), (p.y + 0.0).to_bits())))
            .copied()
            .collect();

        let nodes: Vec<Node> = unique
            .iter()
            .map(|p| Node {
                position: Point2::new(p.x, p.y),
                value: p.value,
            })
            .collect();

        let mesh = match Mesh::bulk_load(nodes) {
            Ok(mesh) if mesh.num_inner_faces() > 0 => Some(mesh),
            Ok(_) => None,
            Err(e) => {
                warn!("Triangulation failed, using nearest samples only: {:?}", e);
                None
            }
        };
        let hull = mesh.as_ref().and_then(|_| bounds(&unique));
        let nearest = Quadtree::build(&unique, &QuadtreeConfig::default());

        Self {
            points: unique,
            mesh,
            hull,
            nearest,
            radius,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.mesh.as_ref().map_or(0, |m| m.num_inner_faces())
    }

    /// Bounds of the triangulated area, if any
    pub fn hull_bounds(&self) -> Option<Rect<f64>> {
        self.hull
    }

    /// Value at (x, y), or `None` when the node has no value
    pub fn interpolate(&self, x: f64, y: f64) -> Option<f64> {
        if let Some(mesh) = &self.mesh {
            let q = Point2::new(x, y);
            match mesh.locate(q) {
                PositionInTriangulation::OnVertex(v) => return Some(mesh.vertex(v).data().value),
                PositionInTriangulation::OnEdge(e) => {
                    let edge = mesh.directed_edge(e);
                    return Some(along_edge(q, edge.from().data(), edge.to().data()));
                }
                PositionInTriangulation::OnFace(f) => {
                    let [a, b, c] = mesh.face(f).vertices();
                    return Some(blend(q, a.data(), b.data(), c.data()));
                }
                PositionInTriangulation::OutsideOfConvexHull(_)
                | PositionInTriangulation::NoTriangulation => {}
            }
        }
        self.fallback(x, y)
    }

    fn fallback(&self, x: f64, y: f64) -> Option<f64> {
        if self.radius == 0.0 {
            return None;
        }
        let (idx, dist_sq) = self.nearest.nearest(x, y)?;
        if self.radius > 0.0 && dist_sq > self.radius * self.radius {
            return None;
        }
        Some(self.points[idx].value)
    }
}

fn bounds(points: &[SamplePoint]) -> Option<Rect<f64>> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in points {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    Some(Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 }))
}
