use serde::Serialize;

use pcd_core::{
    error::ConfigError,
    geometry::StageGeometry,
    pointcloud::point::{Point, PointCloud},
};

/// Background rejection bounds, fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilterCriteria {
    z_min: f64,
    z_max: f64,
    max_radius: Option<f64>,
}

impl FilterCriteria {
    pub const DEFAULT_Z_MIN: f64 = 810.0;
    pub const DEFAULT_Z_MAX: f64 = 890.0;

    pub fn new(z_min: f64, z_max: f64, max_radius: Option<f64>) -> Result<Self, ConfigError> {
        if !z_min.is_finite() {
            return Err(ConfigError::NonFiniteBound("z_min"));
        }
        if !z_max.is_finite() {
            return Err(ConfigError::NonFiniteBound("z_max"));
        }
        if z_min > z_max {
            return Err(ConfigError::InvalidZRange { z_min, z_max });
        }
        if let Some(radius) = max_radius {
            if !radius.is_finite() {
                return Err(ConfigError::NonFiniteBound("max_radius"));
            }
            if radius < 0.0 {
                return Err(ConfigError::NegativeRadius(radius));
            }
        }

        Ok(Self {
            z_min,
            z_max,
            max_radius,
        })
    }

    pub fn z_min(&self) -> f64 {
        self.z_min
    }

    pub fn z_max(&self) -> f64 {
        self.z_max
    }

    pub fn max_radius(&self) -> Option<f64> {
        self.max_radius
    }
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            z_min: Self::DEFAULT_Z_MIN,
            z_max: Self::DEFAULT_Z_MAX,
            max_radius: None,
        }
    }
}

/// How many points each filter stage removed. A point is charged to the first
/// stage that rejects it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub input: usize,
    pub removed_non_finite: usize,
    pub removed_z_range: usize,
    pub removed_radius: usize,
    pub kept: usize,
}

impl FilterReport {
    pub fn removed(&self) -> usize {
        self.removed_non_finite + self.removed_z_range + self.removed_radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Keep,
    NonFinite,
    OutOfZRange,
    OutsideRadius,
}

/// Stable point-wise filter: finite check, then z range, then distance from
/// the stage axis.
#[derive(Debug, Clone, Copy)]
pub struct ViewFilter {
    criteria: FilterCriteria,
    stage: StageGeometry,
}

impl ViewFilter {
    pub fn new(criteria: FilterCriteria, stage: StageGeometry) -> Self {
        Self { criteria, stage }
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn apply(&self, cloud: &PointCloud) -> (PointCloud, FilterReport) {
        let mut report = FilterReport {
            input: cloud.len(),
            ..Default::default()
        };

        let mut kept = Vec::with_capacity(cloud.len());
        for point in &cloud.points {
            match self.verdict(point) {
                Verdict::Keep => kept.push(*point),
                Verdict::NonFinite => report.removed_non_finite += 1,
                Verdict::OutOfZRange => report.removed_z_range += 1,
                Verdict::OutsideRadius => report.removed_radius += 1,
            }
        }
        report.kept = kept.len();

        (PointCloud::new(kept), report)
    }

    fn verdict(&self, point: &Point) -> Verdict {
        if !point.is_finite() {
            return Verdict::NonFinite;
        }
        if point.z < self.criteria.z_min || point.z > self.criteria.z_max {
            return Verdict::OutOfZRange;
        }
        if let Some(max_radius) = self.criteria.max_radius {
            if self.stage.distance_to_axis(point) > max_radius {
                return Verdict::OutsideRadius;
            }
        }
        Verdict::Keep
    }
}
