//! Candidate set reducers
//!
//! Every reducer maps the candidates of one grid node to a single `f64`,
//! or `None` when the node has no value. All arithmetic is `f64`; the cast
//! to the output pixel type happens later, once per cell.

use serde::{Deserialize, Serialize};

use super::search::Candidate;

/// Offsets closer than this (squared) count as exactly on the node
const SNAP_DIST_SQ: f64 = 1e-13;

/// Statistics over the candidate set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataMetric {
    Minimum,
    Maximum,
    Range,
    Count,
    /// Mean distance from the node to the candidates
    AverageDistance,
    /// Mean distance between every pair of candidates
    AverageDistancePoints,
}

impl DataMetric {
    pub const ALL: [DataMetric; 6] = [
        DataMetric::Minimum,
        DataMetric::Maximum,
        DataMetric::Range,
        DataMetric::Count,
        DataMetric::AverageDistance,
        DataMetric::AverageDistancePoints,
    ];

    /// Algorithm name used in configuration strings
    pub fn name(&self) -> &'static str {
        match self {
            DataMetric::Minimum => "minimum",
            DataMetric::Maximum => "maximum",
            DataMetric::Range => "range",
            DataMetric::Count => "count",
            DataMetric::AverageDistance => "average_distance",
            DataMetric::AverageDistancePoints => "average_distance_pts",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    fn evaluate(&self, candidates: &[Candidate]) -> Option<f64> {
        if candidates.is_empty() {
            return None;
        }
        let values = candidates.iter().map(|c| c.value);
        match self {
            DataMetric::Minimum => values.reduce(f64::min),
            DataMetric::Maximum => values.reduce(f64::max),
            DataMetric::Range => {
                let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
                Some(hi - lo)
            }
            DataMetric::Count => Some(candidates.len() as f64),
            DataMetric::AverageDistance => {
                let sum: f64 = candidates.iter().map(Candidate::distance).sum();
                Some(sum / candidates.len() as f64)
            }
            DataMetric::AverageDistancePoints => {
                let n = candidates.len();
                if n < 2 {
                    return None;
                }
                let mut sum = 0.0;
                for (i, a) in candidates.iter().enumerate() {
                    for b in &candidates[i + 1..] {
                        sum += (a.dx - b.dx).hypot(a.dy - b.dy);
                    }
                }
                let pairs = (n * (n - 1) / 2) as f64;
                Some(sum / pairs)
            }
        }
    }
}

/// How a node's candidate set becomes one value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reducer {
    /// Σ(v/dᵖ) / Σ(1/dᵖ) with d = sqrt(dist² + smoothing)
    InverseDistance { power: f64, smoothing: f64 },
    /// Arithmetic mean of the values
    MovingAverage,
    /// Value of the nearest candidate, ties to the first inserted
    Nearest,
    Metric(DataMetric),
}

impl Reducer {
    /// Reduce a candidate set. Empty sets yield `None`.
    pub fn reduce(&self, candidates: &[Candidate]) -> Option<f64> {
        if candidates.is_empty() {
            return None;
        }
        match *self {
            Reducer::InverseDistance { power, smoothing } => {
                inverse_distance(candidates, power, smoothing)
            }
            Reducer::MovingAverage => {
                let sum: f64 = candidates.iter().map(|c| c.value).sum();
                Some(sum / candidates.len() as f64)
            }
            Reducer::Nearest => candidates
                .iter()
                .min_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq).then(a.index.cmp(&b.index)))
                .map(|c| c.value),
            Reducer::Metric(metric) => metric.evaluate(candidates),
        }
    }
}

fn inverse_distance(candidates: &[Candidate], power: f64, smoothing: f64) -> Option<f64> {
    let half_power = power / 2.0;
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for c in candidates {
        if c.dist_sq < SNAP_DIST_SQ {
            return Some(c.value);
        }
        // (dist² + smoothing)^(p/2) == dᵖ
        let weight = 1.0 / (c.dist_sq + smoothing).powf(half_power);
        numerator += weight * c.value;
        denominator += weight;
    }

    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cand(index: usize, dx: f64, dy: f64, value: f64) -> Candidate {
        Candidate {
            index,
            dx,
            dy,
            dist_sq: dx * dx + dy * dy,
            value,
            quadrant: 0,
        }
    }

    fn quadrant_set() -> Vec<Candidate> {
        vec![
            cand(0, 0.5, 0.5, 10.0),
            cand(1, -0.5, 0.5, 10.0),
            cand(2, -0.5, -0.5, 10.0),
            cand(3, 0.5, -0.5, 10.0),
            cand(4, 1.0, 0.0, 100_000_000.0),
        ]
    }

    #[test]
    fn test_empty_is_nodata_for_every_reducer() {
        let reducers = [
            Reducer::InverseDistance {
                power: 2.0,
                smoothing: 0.0,
            },
            Reducer::MovingAverage,
            Reducer::Nearest,
        ]
        .into_iter()
        .chain(DataMetric::ALL.into_iter().map(Reducer::Metric));
        for r in reducers {
            assert_eq!(r.reduce(&[]), None, "{:?}", r);
        }
    }

    #[test]
    fn test_inverse_distance_closed_form() {
        let power: f64 = 1.5;
        let d1 = (0.5f64.powi(2) + 0.5f64.powi(2)).powf(power / 2.0);
        let d2 = 1.0f64.powf(power / 2.0);
        let expected = (4.0 * 10.0 / d1 + 100_000_000.0 / d2) / (4.0 / d1 + 1.0 / d2);

        let got = Reducer::InverseDistance {
            power,
            smoothing: 1e-15,
        }
        .reduce(&quadrant_set())
        .unwrap();
        assert_eq!(got as f32, expected as f32);
    }

    #[test]
    fn test_inverse_distance_snaps_to_coincident_point() {
        let set = vec![cand(0, 1.0, 0.0, 5.0), cand(1, 0.0, 0.0, 100.0)];
        let r = Reducer::InverseDistance {
            power: 2.0,
            smoothing: 0.0,
        };
        assert_eq!(r.reduce(&set), Some(100.0));
    }

    #[test]
    fn test_average_and_metrics() {
        let set = vec![
            cand(0, 2.0, 0.0, 10.0),
            cand(1, 0.0, 1.5, 100.0),
            cand(2, 0.0, 2.5, 300.0),
            cand(3, 0.0, 0.0, 50.0),
        ];
        assert_relative_eq!(Reducer::MovingAverage.reduce(&set).unwrap(), 115.0);
        assert_eq!(Reducer::Metric(DataMetric::Minimum).reduce(&set), Some(10.0));
        assert_eq!(Reducer::Metric(DataMetric::Maximum).reduce(&set), Some(300.0));
        assert_eq!(Reducer::Metric(DataMetric::Range).reduce(&set), Some(290.0));
        assert_eq!(Reducer::Metric(DataMetric::Count).reduce(&set), Some(4.0));
        assert_relative_eq!(
            Reducer::Metric(DataMetric::AverageDistance).reduce(&set).unwrap(),
            6.0 / 4.0
        );
    }

    #[test]
    fn test_average_distance_points() {
        let set = vec![cand(0, 0.0, 0.0, 1.0), cand(1, 3.0, 0.0, 1.0), cand(2, 0.0, 4.0, 1.0)];
        // Pairs: 3, 4, 5
        assert_relative_eq!(
            Reducer::Metric(DataMetric::AverageDistancePoints).reduce(&set).unwrap(),
            4.0
        );
        assert_eq!(
            Reducer::Metric(DataMetric::AverageDistancePoints).reduce(&set[..1]),
            None
        );
    }

    #[test]
    fn test_nearest_ties_to_first_inserted() {
        let set = vec![cand(3, 1.0, 0.0, 7.0), cand(1, 0.0, 1.0, 8.0), cand(2, 2.0, 0.0, 9.0)];
        assert_eq!(Reducer::Nearest.reduce(&set), Some(8.0));
    }

    #[test]
    fn test_metric_names() {
        for m in DataMetric::ALL {
            assert_eq!(DataMetric::from_name(m.name()), Some(m));
        }
        assert_eq!(DataMetric::from_name("median"), None);
    }
}
