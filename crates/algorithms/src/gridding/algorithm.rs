//! Gridding algorithm configuration
//!
//! Algorithms are configured with strings of the form
//! `name[:key=value]*`, e.g. `invdist:power=3:radius1=10:radius2=5`.
//! The string is parsed once into a [`GridAlgorithm`]; nothing downstream
//! looks at text again.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use scattergrid_core::{Error, Result};

use super::aggregators::{DataMetric, Reducer};
use super::search::{QuadrantConstraints, SearchEllipse};

/// Parameters for inverse distance to a power
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InverseDistanceOptions {
    /// Weighting power (default 2)
    pub power: f64,
    /// Added to the squared distance before weighting (default 0)
    pub smoothing: f64,
    pub ellipse: SearchEllipse,
    pub constraints: QuadrantConstraints,
    pub nodata: Option<f64>,
}

impl Default for InverseDistanceOptions {
    fn default() -> Self {
        Self {
            power: 2.0,
            smoothing: 0.0,
            ellipse: SearchEllipse::unbounded(),
            constraints: QuadrantConstraints::default(),
            nodata: None,
        }
    }
}

/// Parameters for inverse distance restricted to a circle of nearest points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InverseDistanceNearestOptions {
    pub power: f64,
    pub smoothing: f64,
    /// Search circle radius (default 1)
    pub radius: f64,
    /// `max_points` defaults to 12
    pub constraints: QuadrantConstraints,
    pub nodata: Option<f64>,
}

impl Default for InverseDistanceNearestOptions {
    fn default() -> Self {
        Self {
            power: 2.0,
            smoothing: 0.0,
            radius: 1.0,
            constraints: QuadrantConstraints {
                max_points: 12,
                ..Default::default()
            },
            nodata: None,
        }
    }
}

/// Search window parameters shared by moving average and the data metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowOptions {
    pub ellipse: SearchEllipse,
    pub constraints: QuadrantConstraints,
    pub nodata: Option<f64>,
}

/// Parameters for nearest neighbour
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NearestOptions {
    pub ellipse: SearchEllipse,
    pub nodata: Option<f64>,
}

/// Parameters for linear (triangulated) interpolation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearOptions {
    /// Fallback radius outside the hull: negative is unbounded, 0 disables
    pub radius: f64,
    pub nodata: Option<f64>,
}

impl Default for LinearOptions {
    fn default() -> Self {
        Self {
            radius: -1.0,
            nodata: None,
        }
    }
}

/// A fully parsed gridding algorithm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GridAlgorithm {
    InverseDistance(InverseDistanceOptions),
    InverseDistanceNearest(InverseDistanceNearestOptions),
    MovingAverage(WindowOptions),
    Nearest(NearestOptions),
    Metric {
        metric: DataMetric,
        options: WindowOptions,
    },
    Linear(LinearOptions),
}

impl Default for GridAlgorithm {
    fn default() -> Self {
        GridAlgorithm::InverseDistance(InverseDistanceOptions::default())
    }
}

/// Candidate search and reduction for a window-based algorithm
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SearchPlan {
    pub ellipse: SearchEllipse,
    pub constraints: QuadrantConstraints,
    pub reducer: Reducer,
}

const COUNT_KEYS: [&str; 4] = [
    "max_points",
    "min_points",
    "max_points_per_quadrant",
    "min_points_per_quadrant",
];
const ELLIPSE_KEYS: [&str; 4] = ["radius", "radius1", "radius2", "angle"];

impl GridAlgorithm {
    /// Name as used in algorithm strings
    pub fn name(&self) -> &'static str {
        match self {
            GridAlgorithm::InverseDistance(_) => "invdist",
            GridAlgorithm::InverseDistanceNearest(_) => "invdistnn",
            GridAlgorithm::MovingAverage(_) => "average",
            GridAlgorithm::Nearest(_) => "nearest",
            GridAlgorithm::Metric { metric, .. } => metric.name(),
            GridAlgorithm::Linear(_) => "linear",
        }
    }

    /// Explicitly configured nodata value
    pub fn nodata(&self) -> Option<f64> {
        match self {
            GridAlgorithm::InverseDistance(o) => o.nodata,
            GridAlgorithm::InverseDistanceNearest(o) => o.nodata,
            GridAlgorithm::MovingAverage(o) | GridAlgorithm::Metric { options: o, .. } => o.nodata,
            GridAlgorithm::Nearest(o) => o.nodata,
            GridAlgorithm::Linear(o) => o.nodata,
        }
    }

    /// Value written to nodes without a value
    pub fn sentinel(&self) -> f64 {
        self.nodata().unwrap_or(0.0)
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        match self {
            GridAlgorithm::InverseDistance(o) => {
                check_weighting(o.power, o.smoothing)?;
                o.ellipse.validate()
            }
            GridAlgorithm::InverseDistanceNearest(o) => {
                check_weighting(o.power, o.smoothing)?;
                SearchEllipse::circle(o.radius).validate()
            }
            GridAlgorithm::MovingAverage(o) | GridAlgorithm::Metric { options: o, .. } => {
                o.ellipse.validate()
            }
            GridAlgorithm::Nearest(o) => o.ellipse.validate(),
            GridAlgorithm::Linear(o) => {
                if o.radius.is_finite() {
                    Ok(())
                } else {
                    Err(Error::invalid_parameter("radius", o.radius, "radius must be finite"))
                }
            }
        }
    }

    /// Search window and reducer, `None` for linear interpolation
    pub(crate) fn search_plan(&self) -> Option<SearchPlan> {
        let plan = match *self {
            GridAlgorithm::InverseDistance(o) => SearchPlan {
                ellipse: o.ellipse,
                constraints: o.constraints,
                reducer: Reducer::InverseDistance {
                    power: o.power,
                    smoothing: o.smoothing,
                },
            },
            GridAlgorithm::InverseDistanceNearest(o) => SearchPlan {
                ellipse: SearchEllipse::circle(o.radius),
                constraints: o.constraints,
                reducer: Reducer::InverseDistance {
                    power: o.power,
                    smoothing: o.smoothing,
                },
            },
            GridAlgorithm::MovingAverage(o) => SearchPlan {
                ellipse: o.ellipse,
                constraints: o.constraints,
                reducer: Reducer::MovingAverage,
            },
            GridAlgorithm::Nearest(o) => SearchPlan {
                ellipse: o.ellipse,
                constraints: QuadrantConstraints::default(),
                reducer: Reducer::Nearest,
            },
            GridAlgorithm::Metric { metric, options } => SearchPlan {
                ellipse: options.ellipse,
                constraints: options.constraints,
                reducer: Reducer::Metric(metric),
            },
            GridAlgorithm::Linear(_) => return None,
        };
        Some(plan)
    }

    fn allowed_keys(&self) -> Vec<&'static str> {
        let mut keys = vec!["nodata"];
        match self {
            GridAlgorithm::InverseDistance(_) => {
                keys.extend(["power", "smoothing"]);
                keys.extend(ELLIPSE_KEYS);
                keys.extend(COUNT_KEYS);
            }
            GridAlgorithm::InverseDistanceNearest(_) => {
                keys.extend(["power", "smoothing", "radius"]);
                keys.extend(COUNT_KEYS);
            }
            GridAlgorithm::MovingAverage(_) | GridAlgorithm::Metric { .. } => {
                keys.extend(ELLIPSE_KEYS);
                keys.extend(COUNT_KEYS);
            }
            GridAlgorithm::Nearest(_) => keys.extend(ELLIPSE_KEYS),
            GridAlgorithm::Linear(_) => keys.push("radius"),
        }
        keys
    }

    /// Default configuration for an algorithm name
    fn with_defaults(name: &str) -> Result<Self> {
        let algorithm = match name {
            "invdist" => GridAlgorithm::InverseDistance(Default::default()),
            "invdistnn" => GridAlgorithm::InverseDistanceNearest(Default::default()),
            "average" => GridAlgorithm::MovingAverage(Default::default()),
            "nearest" => GridAlgorithm::Nearest(Default::default()),
            "linear" => GridAlgorithm::Linear(Default::default()),
            other => match DataMetric::from_name(other) {
                Some(metric) => GridAlgorithm::Metric {
                    metric,
                    options: WindowOptions::default(),
                },
                None => return Err(Error::UnknownAlgorithm(other.to_string())),
            },
        };
        Ok(algorithm)
    }

    fn apply(&mut self, key: &str, raw: &str) -> Result<()> {
        if !self.allowed_keys().contains(&key) {
            return Err(Error::invalid_parameter(
                key,
                raw,
                format!("unknown option for {}", self.name()),
            ));
        }

        if key == "nodata" {
            let value = Some(parse_f64(key, raw)?);
            match self {
                GridAlgorithm::InverseDistance(o) => o.nodata = value,
                GridAlgorithm::InverseDistanceNearest(o) => o.nodata = value,
                GridAlgorithm::MovingAverage(o) | GridAlgorithm::Metric { options: o, .. } => {
                    o.nodata = value
                }
                GridAlgorithm::Nearest(o) => o.nodata = value,
                GridAlgorithm::Linear(o) => o.nodata = value,
            }
            return Ok(());
        }

        match self {
            GridAlgorithm::InverseDistance(o) => match key {
                "power" => o.power = parse_f64(key, raw)?,
                "smoothing" => o.smoothing = parse_f64(key, raw)?,
                _ if ELLIPSE_KEYS.contains(&key) => apply_ellipse(&mut o.ellipse, key, raw)?,
                _ => apply_count(&mut o.constraints, key, raw)?,
            },
            GridAlgorithm::InverseDistanceNearest(o) => match key {
                "power" => o.power = parse_f64(key, raw)?,
                "smoothing" => o.smoothing = parse_f64(key, raw)?,
                "radius" => o.radius = parse_f64(key, raw)?,
                _ => apply_count(&mut o.constraints, key, raw)?,
            },
            GridAlgorithm::MovingAverage(o) | GridAlgorithm::Metric { options: o, .. } => {
                if ELLIPSE_KEYS.contains(&key) {
                    apply_ellipse(&mut o.ellipse, key, raw)?
                } else {
                    apply_count(&mut o.constraints, key, raw)?
                }
            }
            GridAlgorithm::Nearest(o) => apply_ellipse(&mut o.ellipse, key, raw)?,
            GridAlgorithm::Linear(o) => o.radius = parse_f64(key, raw)?,
        }
        Ok(())
    }
}

fn check_weighting(power: f64, smoothing: f64) -> Result<()> {
    if !power.is_finite() || power < 0.0 {
        return Err(Error::invalid_parameter(
            "power",
            power,
            "power must be finite and non-negative",
        ));
    }
    if !smoothing.is_finite() || smoothing < 0.0 {
        return Err(Error::invalid_parameter(
            "smoothing",
            smoothing,
            "smoothing must be finite and non-negative",
        ));
    }
    Ok(())
}

fn parse_f64(key: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| Error::invalid_parameter(key, raw, "expected a number"))
}

fn parse_count(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| Error::invalid_parameter(key, raw, "expected a non-negative integer"))
}

fn apply_ellipse(ellipse: &mut SearchEllipse, key: &str, raw: &str) -> Result<()> {
    let value = parse_f64(key, raw)?;
    match key {
        "radius" => {
            ellipse.radius1 = value;
            ellipse.radius2 = value;
        }
        "radius1" => ellipse.radius1 = value,
        "radius2" => ellipse.radius2 = value,
        _ => ellipse.angle = value,
    }
    Ok(())
}

fn apply_count(constraints: &mut QuadrantConstraints, key: &str, raw: &str) -> Result<()> {
    let value = parse_count(key, raw)?;
    match key {
        "max_points" => constraints.max_points = value,
        "min_points" => constraints.min_points = value,
        "max_points_per_quadrant" => constraints.max_points_per_quadrant = value,
        _ => constraints.min_points_per_quadrant = value,
    }
    Ok(())
}

impl FromStr for GridAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':');
        let name = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let mut algorithm = Self::with_defaults(&name)?;

        for part in parts.map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                Error::invalid_parameter(part, "", "expected key=value")
            })?;
            algorithm.apply(&key.trim().to_ascii_lowercase(), value)?;
        }

        algorithm.validate()?;
        Ok(algorithm)
    }
}

fn write_ellipse(f: &mut fmt::Formatter<'_>, e: &SearchEllipse) -> fmt::Result {
    write!(
        f,
        ":radius1={}:radius2={}:angle={}",
        e.radius1, e.radius2, e.angle
    )
}

fn write_counts(f: &mut fmt::Formatter<'_>, c: &QuadrantConstraints) -> fmt::Result {
    write!(
        f,
        ":max_points={}:min_points={}:max_points_per_quadrant={}:min_points_per_quadrant={}",
        c.max_points, c.min_points, c.max_points_per_quadrant, c.min_points_per_quadrant
    )
}

impl fmt::Display for GridAlgorithm {
    /// Canonical `name:key=value` form, accepted back by `from_str`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            GridAlgorithm::InverseDistance(o) => {
                write!(f, ":power={}:smoothing={}", o.power, o.smoothing)?;
                write_ellipse(f, &o.ellipse)?;
                write_counts(f, &o.constraints)?;
            }
            GridAlgorithm::InverseDistanceNearest(o) => {
                write!(
                    f,
                    ":power={}:smoothing={}:radius={}",
                    o.power, o.smoothing, o.radius
                )?;
                write_counts(f, &o.constraints)?;
            }
            GridAlgorithm::MovingAverage(o) | GridAlgorithm::Metric { options: o, .. } => {
                write_ellipse(f, &o.ellipse)?;
                write_counts(f, &o.constraints)?;
            }
            GridAlgorithm::Nearest(o) => write_ellipse(f, &o.ellipse)?,
            GridAlgorithm::Linear(o) => write!(f, ":radius={}", o.radius)?,
        }
        if let Some(nodata) = self.nodata() {
            write!(f, ":nodata={}", nodata)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let a: GridAlgorithm = "invdist".parse().unwrap();
        assert_eq!(a, GridAlgorithm::InverseDistance(InverseDistanceOptions::default()));
        assert_eq!(a.sentinel(), 0.0);
        assert_eq!(a.nodata(), None);

        match "invdistnn".parse::<GridAlgorithm>().unwrap() {
            GridAlgorithm::InverseDistanceNearest(o) => {
                assert_eq!(o.radius, 1.0);
                assert_eq!(o.constraints.max_points, 12);
                assert_eq!(o.power, 2.0);
            }
            other => panic!("unexpected {:?}", other),
        }

        match "linear".parse::<GridAlgorithm>().unwrap() {
            GridAlgorithm::Linear(o) => assert_eq!(o.radius, -1.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_options() {
        let a: GridAlgorithm =
            "invdist:power=1.5:radius1=3:radius2=1:angle=90:max_points_per_quadrant=1:nodata=-9999"
                .parse()
                .unwrap();
        match a {
            GridAlgorithm::InverseDistance(o) => {
                assert_eq!(o.power, 1.5);
                assert_eq!(o.ellipse, SearchEllipse::new(3.0, 1.0, 90.0));
                assert_eq!(o.constraints.max_points_per_quadrant, 1);
                assert_eq!(o.nodata, Some(-9999.0));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(a.sentinel(), -9999.0);
    }

    #[test]
    fn test_radius_sets_both_axes() {
        let a: GridAlgorithm = "average:radius=0.7".parse().unwrap();
        let plan = a.search_plan().unwrap();
        assert_eq!(plan.ellipse, SearchEllipse::circle(0.7));
        assert_eq!(plan.reducer, Reducer::MovingAverage);
    }

    #[test]
    fn test_metric_names() {
        for metric in DataMetric::ALL {
            let a: GridAlgorithm = metric.name().parse().unwrap();
            assert_eq!(a.name(), metric.name());
            assert_eq!(a.search_plan().unwrap().reducer, Reducer::Metric(metric));
        }
    }

    #[test]
    fn test_configuration_errors() {
        let err = "kriging".parse::<GridAlgorithm>().unwrap_err();
        assert!(matches!(err, Error::UnknownAlgorithm(ref n) if n == "kriging"));

        // radius1 is not an invdistnn option
        let err = "invdistnn:radius1=2".parse::<GridAlgorithm>().unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "radius1"));

        let err = "invdist:power=abc".parse::<GridAlgorithm>().unwrap_err();
        assert!(err.to_string().contains("abc"));

        let err = "average:radius1=-1".parse::<GridAlgorithm>().unwrap_err();
        assert!(err.is_configuration());

        assert!("average:max_points=1.5".parse::<GridAlgorithm>().is_err());
        assert!("average:radius".parse::<GridAlgorithm>().is_err());
        assert!("linear:power=2".parse::<GridAlgorithm>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for text in [
            "invdist:power=3:smoothing=0.5:radius1=2:angle=30:min_points=2",
            "invdistnn:radius=4:max_points=6:nodata=-1",
            "average_distance_pts:radius=2",
            "nearest:radius1=1:radius2=2",
            "linear:radius=0",
        ] {
            let a: GridAlgorithm = text.parse().unwrap();
            let back: GridAlgorithm = a.to_string().parse().unwrap();
            assert_eq!(a, back, "{}", text);
        }
    }

    #[test]
    fn test_case_and_whitespace_tolerance() {
        let a: GridAlgorithm = "InvDist: POWER=3 :".parse().unwrap();
        match a {
            GridAlgorithm::InverseDistance(o) => assert_eq!(o.power, 3.0),
            other => panic!("unexpected {:?}", other),
        }
    }
}
