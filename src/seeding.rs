//! Initial cluster placement for the per-frame mixture fit.
//!
//! Seeding is a heuristic with no recovery path for pathological point
//! clouds (strongly asymmetric or bimodal frames), so it sits behind the
//! [`SeedStrategy`] trait: the pipeline takes any strategy, and
//! [`SpreadSeeder`] provides the default centroid-and-extent rule.

use crate::cluster::GaussianCluster;
use crate::mixture::FitError;
use crate::{Matrix2, Vector2};

/// Number of mixture components fitted per frame — one per rotor blade.
pub const NUM_BLADES: usize = 3;

/// Produces the initial Gaussian guesses a frame's EM fit starts from.
pub trait SeedStrategy {
    /// Seed clusters for one frame's scaled point cloud.
    ///
    /// Fails with [`FitError::EmptyPointSet`] when `points` is empty, since
    /// neither a centroid nor an extent exists then.
    fn seeds(&self, points: &[Vector2]) -> Result<Vec<GaussianCluster>, FitError>;
}

/// Default seeding: one cluster at the point cloud's centroid and one each
/// offset above and below it by half the vertical extent, all with identity
/// covariance and weight `1/NUM_BLADES`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadSeeder;

impl SeedStrategy for SpreadSeeder {
    fn seeds(&self, points: &[Vector2]) -> Result<Vec<GaussianCluster>, FitError> {
        if points.is_empty() {
            return Err(FitError::EmptyPointSet);
        }

        let mut mean = Vector2::zeros();
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for p in points {
            mean += *p;
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        mean /= points.len() as f64;
        let half_extent = 0.5 * (max_y - min_y);

        let weight = 1.0 / NUM_BLADES as f64;
        let identity = Matrix2::identity();
        Ok(vec![
            GaussianCluster::new(mean, identity, weight),
            GaussianCluster::new(
                Vector2::new(mean.x, mean.y + half_extent),
                identity,
                weight,
            ),
            GaussianCluster::new(
                Vector2::new(mean.x, mean.y - half_extent),
                identity,
                weight,
            ),
        ])
    }
}
