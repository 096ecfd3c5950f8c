use rand::{rngs::StdRng, SeedableRng};

use crate::pointcloud::point::{Point, PointCloud};

pub trait PointCloudDecimator {
    fn decimate(&self, points: &[Point]) -> Vec<Point>;
}

/// Uniform random subset without replacement. Only meant for previews; the
/// merged model itself is never decimated.
#[derive(Debug, Clone, Copy)]
pub struct RandomDecimator {
    pub target_count: usize,
    pub seed: Option<u64>,
}

impl RandomDecimator {
    pub fn new(target_count: usize) -> Self {
        Self {
            target_count,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn sample(&self, cloud: &PointCloud) -> PointCloud {
        if cloud.len() <= self.target_count {
            return cloud.clone();
        }
        PointCloud::new(self.decimate(&cloud.points))
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

impl PointCloudDecimator for RandomDecimator {
    fn decimate(&self, points: &[Point]) -> Vec<Point> {
        if points.len() <= self.target_count {
            return points.to_vec();
        }

        let mut rng = self.rng();
        rand::seq::index::sample(&mut rng, points.len(), self.target_count)
            .into_iter()
            .map(|index| points[index])
            .collect()
    }
}
