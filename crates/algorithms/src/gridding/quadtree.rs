//! Point quadtree for rectangle and nearest-point queries
//!
//! Nodes live in a flat arena. Each internal node splits its bounds at the
//! midpoint into four children; a leaf holds indices into the point slice
//! the tree was built from. Points lying exactly on a split line go to the
//! east/north child, so every point is inside the closed bounds of the leaf
//! that holds it and rectangle queries have no false negatives.

use geo_types::{coord, Rect};

use super::SamplePoint;

/// Construction limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadtreeConfig {
    /// A leaf with more points than this is split
    pub max_leaf_points: usize,
    /// Leaves at this depth are never split (bounds runaway on duplicates)
    pub max_depth: usize,
}

impl Default for QuadtreeConfig {
    fn default() -> Self {
        Self {
            max_leaf_points: 16,
            max_depth: 12,
        }
    }
}

#[derive(Debug)]
struct Node {
    bounds: Rect<f64>,
    kind: NodeKind,
}

#[derive(Debug)]
enum NodeKind {
    Leaf(Vec<usize>),
    /// Children in SW, SE, NW, NE order
    Internal([usize; 4]),
}

/// A quadtree over sample points.
///
/// Query results are indices into the slice passed to [`Quadtree::build`].
#[derive(Debug)]
pub struct Quadtree {
    nodes: Vec<Node>,
    points: Vec<SamplePoint>,
}

impl Quadtree {
    /// Build the tree over `points`
    pub fn build(points: &[SamplePoint], config: &QuadtreeConfig) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            points: points.to_vec(),
        };
        if points.is_empty() {
            return tree;
        }

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let bounds = Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y });

        let indices: Vec<usize> = (0..points.len()).collect();
        tree.build_node(bounds, indices, 0, config);
        tree
    }

    fn build_node(
        &mut self,
        bounds: Rect<f64>,
        indices: Vec<usize>,
        depth: usize,
        config: &QuadtreeConfig,
    ) -> usize {
        let id = self.nodes.len();

        if indices.len() <= config.max_leaf_points.max(1) || depth >= config.max_depth {
            self.nodes.push(Node {
                bounds,
                kind: NodeKind::Leaf(indices),
            });
            return id;
        }

        // Reserve the slot, children are pushed after it
        self.nodes.push(Node {
            bounds,
            kind: NodeKind::Leaf(Vec::new()),
        });

        let c = bounds.center();
        let (min, max) = (bounds.min(), bounds.max());
        let child_bounds = [
            Rect::new(min, c),
            Rect::new(coord! { x: c.x, y: min.y }, coord! { x: max.x, y: c.y }),
            Rect::new(coord! { x: min.x, y: c.y }, coord! { x: c.x, y: max.y }),
            Rect::new(c, max),
        ];

        let mut buckets: [Vec<usize>; 4] = Default::default();
        for idx in indices {
            let p = &self.points[idx];
            let east = usize::from(p.x >= c.x);
            let north = usize::from(p.y >= c.y);
            buckets[north * 2 + east].push(idx);
        }

        let mut children = [0usize; 4];
        for (i, bucket) in buckets.into_iter().enumerate() {
            children[i] = self.build_node(child_bounds[i], bucket, depth + 1, config);
        }
        self.nodes[id].kind = NodeKind::Internal(children);
        id
    }

    /// Number of indexed points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of leaf nodes
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Leaf(_)))
            .count()
    }

    /// Depth of the deepest leaf (a single leaf root has depth 0)
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id].kind {
                NodeKind::Leaf(_) => 0,
                NodeKind::Internal(children) => {
                    1 + children.iter().map(|&c| walk(nodes, c)).max().unwrap_or(0)
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Append the indices of all points inside `rect` (boundary inclusive).
    ///
    /// Indices are appended in tree order, not insertion order.
    pub fn query_rect(&self, rect: &Rect<f64>, out: &mut Vec<usize>) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0usize];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !rects_overlap(&node.bounds, rect) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(indices) => {
                    out.extend(indices.iter().copied().filter(|&i| {
                        let p = &self.points[i];
                        p.x >= rect.min().x
                            && p.x <= rect.max().x
                            && p.y >= rect.min().y
                            && p.y <= rect.max().y
                    }));
                }
                NodeKind::Internal(children) => stack.extend(children.iter().copied()),
            }
        }
    }

    /// Nearest point to (x, y) as `(index, squared distance)`.
    ///
    /// Ties are broken by the lower index.
    pub fn nearest(&self, x: f64, y: f64) -> Option<(usize, f64)> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        self.nearest_recursive(0, x, y, &mut best);
        best
    }

    fn nearest_recursive(&self, id: usize, x: f64, y: f64, best: &mut Option<(usize, f64)>) {
        let node = &self.nodes[id];
        if let Some((_, best_d)) = *best {
            if rect_dist_sq(&node.bounds, x, y) > best_d {
                return;
            }
        }

        match &node.kind {
            NodeKind::Leaf(indices) => {
                for &i in indices {
                    let d = self.points[i].dist_sq(x, y);
                    let better = match *best {
                        None => true,
                        Some((bi, bd)) => d < bd || (d == bd && i < bi),
                    };
                    if better {
                        *best = Some((i, d));
                    }
                }
            }
            NodeKind::Internal(children) => {
                // Closest child first tightens the bound early
                let mut order = *children;
                order.sort_by(|&a, &b| {
                    rect_dist_sq(&self.nodes[a].bounds, x, y)
                        .total_cmp(&rect_dist_sq(&self.nodes[b].bounds, x, y))
                });
                for child in order {
                    self.nearest_recursive(child, x, y, best);
                }
            }
        }
    }
}

fn rects_overlap(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && a.max().x >= b.min().x && a.min().y <= b.max().y && a.max().y >= b.min().y
}

/// Squared distance from (x, y) to the closest point of `rect`
fn rect_dist_sq(rect: &Rect<f64>, x: f64, y: f64) -> f64 {
    let dx = (rect.min().x - x).max(0.0).max(x - rect.max().x);
    let dy = (rect.min().y - y).max(0.0).max(y - rect.max().y);
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points(n: usize) -> Vec<SamplePoint> {
        let mut pts = Vec::new();
        for i in 0..n {
            for j in 0..n {
                pts.push(SamplePoint::new(i as f64, j as f64, (i * n + j) as f64));
            }
        }
        pts
    }

    fn brute_rect(points: &[SamplePoint], rect: &Rect<f64>) -> Vec<usize> {
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                p.x >= rect.min().x && p.x <= rect.max().x && p.y >= rect.min().y && p.y <= rect.max().y
            })
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_small_input_is_single_leaf() {
        let pts = grid_points(3);
        let tree = Quadtree::build(&pts, &QuadtreeConfig::default());
        assert_eq!(tree.len(), 9);
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_query_rect_matches_brute_force() {
        let pts = grid_points(20);
        let tree = Quadtree::build(&pts, &QuadtreeConfig::default());
        assert!(tree.depth() > 1);

        for rect in [
            Rect::new(coord! { x: 2.0, y: 3.0 }, coord! { x: 7.5, y: 9.0 }),
            Rect::new(coord! { x: 9.5, y: 9.5 }, coord! { x: 10.0, y: 10.0 }),
            Rect::new(coord! { x: -5.0, y: -5.0 }, coord! { x: 50.0, y: 0.0 }),
            Rect::new(coord! { x: 30.0, y: 30.0 }, coord! { x: 40.0, y: 40.0 }),
        ] {
            let mut got = Vec::new();
            tree.query_rect(&rect, &mut got);
            got.sort_unstable();
            assert_eq!(got, brute_rect(&pts, &rect), "rect {:?}", rect);
        }
    }

    #[test]
    fn test_points_on_split_lines_are_found() {
        let pts = grid_points(9);
        let tree = Quadtree::build(
            &pts,
            &QuadtreeConfig {
                max_leaf_points: 1,
                max_depth: 8,
            },
        );
        // Centre of the bounds is (4, 4)
        let rect = Rect::new(coord! { x: 4.0, y: 4.0 }, coord! { x: 4.0, y: 4.0 });
        let mut got = Vec::new();
        tree.query_rect(&rect, &mut got);
        assert_eq!(got, vec![4 * 9 + 4]);
    }

    #[test]
    fn test_duplicates_stop_at_max_depth() {
        let pts = vec![SamplePoint::new(1.0, 1.0, 0.0); 100];
        let config = QuadtreeConfig {
            max_leaf_points: 4,
            max_depth: 5,
        };
        let tree = Quadtree::build(&pts, &config);
        assert!(tree.depth() <= 5);
        let mut got = Vec::new();
        tree.query_rect(&Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 2.0, y: 2.0 }), &mut got);
        assert_eq!(got.len(), 100);
    }

    #[test]
    fn test_nearest() {
        let pts = grid_points(15);
        let tree = Quadtree::build(&pts, &QuadtreeConfig::default());

        let (idx, d) = tree.nearest(3.2, 7.9).unwrap();
        assert_eq!((pts[idx].x, pts[idx].y), (3.0, 8.0));
        assert!((d - (0.04 + 0.01)).abs() < 1e-12);

        // Equidistant between (0,0) and (1,0): lower index wins
        let (idx, _) = tree.nearest(0.5, 0.0).unwrap();
        assert_eq!(idx, 0);

        assert!(Quadtree::build(&[], &QuadtreeConfig::default())
            .nearest(0.0, 0.0)
            .is_none());
    }
}
