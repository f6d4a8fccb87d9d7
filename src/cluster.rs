//! A single 2D Gaussian mixture component describing one rotor blade.
//!
//! A cluster carries its mean position, covariance, relative mixture weight
//! and the indices of the points currently hard-assigned to it. It
//! contributes the two halves of an EM iteration: [`log_likelihoods`]
//! (expectation) and [`update`] (maximization). Shape descriptors derived
//! from the covariance — [`angle`] and [`snr`] — are what the tracking layer
//! consumes.
//!
//! [`log_likelihoods`]: GaussianCluster::log_likelihoods
//! [`update`]: GaussianCluster::update
//! [`angle`]: GaussianCluster::angle
//! [`snr`]: GaussianCluster::snr

use crate::linalg;
use crate::{Matrix2, Vector2};

/// Additive regularizer on the responsibility mass in the diagonal variance
/// denominators. Keeps the update finite when a cluster's expected point
/// count collapses toward zero; deliberately not applied to the off-diagonal
/// term.
const DIAGONAL_REGULARIZER: f64 = 1e-6;

/// One 2D Gaussian component of a blade mixture.
#[derive(Debug, Clone)]
pub struct GaussianCluster {
    /// Mean position in scaled point-space.
    pub center: Vector2,
    /// Symmetric covariance. Must stay positive semi-definite; a near-zero
    /// pivot shows up as a recoverable fit failure during the expectation
    /// step, never as a panic.
    pub covariance: Matrix2,
    /// Mixture weight relative to the other clusters of the same frame.
    /// Weights are not renormalized to sum to 1 across a frame.
    pub weight: f64,
    /// Indices into the owning frame's point list currently hard-assigned
    /// (arg-max responsibility) to this cluster. Transient: rebuilt on every
    /// EM iteration.
    pub assigned: Vec<usize>,
}

impl GaussianCluster {
    pub fn new(center: Vector2, covariance: Matrix2, weight: f64) -> Self {
        Self {
            center,
            covariance,
            weight,
            assigned: Vec::new(),
        }
    }

    /// Orientation of the covariance ellipse's major axis, measured from the
    /// x-axis, in `(−π/2, π/2]`.
    ///
    /// Orientation is only identifiable modulo a half turn: a blade pointing
    /// "up" and one pointing "down" produce the same ellipse. Consumers that
    /// difference angles across frames must wrap through
    /// [`wrap_half_turn`](crate::tracking::wrap_half_turn).
    pub fn angle(&self) -> f64 {
        let two_c = 2.0 * self.covariance[(0, 1)];
        let diff = self.covariance[(0, 0)] - self.covariance[(1, 1)];
        0.5 * two_c.atan2(diff)
    }

    /// Ratio of the smaller to the larger covariance eigenvalue.
    ///
    /// Near 0 the cluster is strongly elongated (blade-like); near 1 it is
    /// round (noise-like).
    pub fn snr(&self) -> f64 {
        let a = self.covariance[(0, 0)];
        let b = self.covariance[(1, 1)];
        let c = self.covariance[(0, 1)];
        let d = ((a - b).powi(2) + 4.0 * c * c).sqrt();
        let lambda_max = 0.5 * (a + b + d);
        let lambda_min = 0.5 * (a + b - d);
        lambda_min / lambda_max
    }

    /// Euclidean distance between this cluster's center and another's.
    pub fn distance_to(&self, other: &GaussianCluster) -> f64 {
        (self.center - other.center).norm()
    }

    /// Log of (weight × Gaussian density) for every point — the expectation
    /// contribution of this cluster.
    ///
    /// Points are whitened through the covariance's Cholesky factor, so the
    /// value stays finite even for points many sigmas from the mean. Returns
    /// `None` when the covariance fails to factor (degenerate fit state for
    /// this frame).
    pub fn log_likelihoods(&self, points: &[Vector2]) -> Option<Vec<f64>> {
        let chol = linalg::cholesky(&self.covariance)?;

        // normalization constant
        let norm = 2.0 * (2.0 * std::f64::consts::PI).ln()
            + 2.0 * chol[(0, 0)].ln()
            + chol[(1, 1)].ln();
        let log_weight = self.weight.ln();

        Some(
            points
                .iter()
                .map(|p| {
                    let z = linalg::solve_lower_triangular(&chol, p - self.center);
                    -(norm + z[0] * z[0] + z[1] * z[1]) / 2.0 + log_weight
                })
                .collect(),
        )
    }

    /// Refit this cluster to the points under the given soft
    /// responsibilities — the maximization contribution.
    ///
    /// `responsibilities` holds one probability per point; their sum is the
    /// cluster's expected point count `Nk`. The new weight is `Nk` over the
    /// total point count, the center the responsibility-weighted centroid,
    /// and the covariance the responsibility-weighted second moments about
    /// that centroid (diagonal terms regularized, see
    /// [`DIAGONAL_REGULARIZER`]).
    pub fn update(&mut self, points: &[Vector2], responsibilities: &[f64]) {
        debug_assert_eq!(points.len(), responsibilities.len());

        let nk: f64 = responsibilities.iter().sum();
        self.weight = nk / points.len() as f64;

        let mut cx = 0.0;
        let mut cy = 0.0;
        for (p, &r) in points.iter().zip(responsibilities) {
            cx += r * p.x;
            cy += r * p.y;
        }
        cx /= nk;
        cy /= nk;
        self.center = Vector2::new(cx, cy);

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        let mut syy = 0.0;
        for (p, &r) in points.iter().zip(responsibilities) {
            let dx = p.x - cx;
            let dy = p.y - cy;
            sxx += r * dx * dx;
            sxy += r * dx * dy;
            syy += r * dy * dy;
        }
        let c00 = sxx / (nk + DIAGONAL_REGULARIZER);
        let c01 = sxy / nk;
        let c11 = syy / (nk + DIAGONAL_REGULARIZER);
        self.covariance = Matrix2::new(c00, c01, c01, c11);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    fn cluster(cov: Matrix2) -> GaussianCluster {
        GaussianCluster::new(Vector2::zeros(), cov, 1.0)
    }

    #[test]
    fn angle_of_axis_aligned_ellipses() {
        // Major axis along x
        assert!(cluster(Matrix2::new(2.0, 0.0, 0.0, 1.0)).angle().abs() < 1e-12);
        // Major axis along y: ±π/2 (both describe the same axis)
        let a = cluster(Matrix2::new(1.0, 0.0, 0.0, 2.0)).angle();
        assert!(
            (a.abs() - FRAC_PI_2).abs() < 1e-12,
            "expected ±π/2, got {a}"
        );
    }

    #[test]
    fn angle_of_tilted_ellipse() {
        // Equal diagonal with positive correlation: major axis at 45°
        let a = cluster(Matrix2::new(1.0, 0.5, 0.5, 1.0)).angle();
        assert!((a - FRAC_PI_4).abs() < 1e-12, "expected π/4, got {a}");
    }

    #[test]
    fn angle_stays_in_half_turn_range() {
        for i in 0..32 {
            let theta = -PI + i as f64 * PI / 16.0;
            let (s, c) = theta.sin_cos();
            // Covariance of a unit-variance stick rotated by theta
            let cov = Matrix2::new(
                4.0 * c * c + 0.1 * s * s,
                (4.0 - 0.1) * s * c,
                (4.0 - 0.1) * s * c,
                4.0 * s * s + 0.1 * c * c,
            );
            let a = cluster(cov).angle();
            assert!(a > -FRAC_PI_2 - 1e-12 && a <= FRAC_PI_2 + 1e-12);
        }
    }

    #[test]
    fn snr_separates_blades_from_blobs() {
        let elongated = cluster(Matrix2::new(10.0, 0.0, 0.0, 0.1));
        let round = cluster(Matrix2::new(2.0, 0.0, 0.0, 2.0));
        assert!(elongated.snr() < 0.05);
        assert!((round.snr() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn log_likelihood_peaks_at_center() {
        let c = GaussianCluster::new(
            Vector2::new(1.0, -1.0),
            Matrix2::new(1.0, 0.2, 0.2, 2.0),
            0.5,
        );
        let points = [
            Vector2::new(1.0, -1.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(8.0, 5.0),
        ];
        let ll = c.log_likelihoods(&points).unwrap();
        assert!(ll[0] > ll[1] && ll[1] > ll[2]);
        assert!(ll.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn log_likelihood_matches_closed_form_for_identity() {
        // Identity covariance, unit weight: logL = −ln(2π) − ½‖p−c‖²
        let c = cluster(Matrix2::identity());
        let p = Vector2::new(0.6, -0.8);
        let ll = c.log_likelihoods(&[p]).unwrap()[0];
        let expected = -(2.0 * PI).ln() - 0.5 * p.norm_squared();
        assert!((ll - expected).abs() < 1e-12, "got {ll}, expected {expected}");
    }

    #[test]
    fn degenerate_covariance_propagates() {
        let c = cluster(Matrix2::new(0.0, 0.0, 0.0, 1.0));
        assert!(c.log_likelihoods(&[Vector2::zeros()]).is_none());
    }

    #[test]
    fn update_recovers_sample_moments() {
        let points = [
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(0.0, 2.0),
            Vector2::new(2.0, 2.0),
        ];
        let responsibilities = [1.0; 4];
        let mut c = cluster(Matrix2::identity());
        c.update(&points, &responsibilities);

        assert!((c.center - Vector2::new(1.0, 1.0)).norm() < 1e-12);
        assert!((c.weight - 1.0).abs() < 1e-12);
        // Population variance of {−1, 1} per axis is 1, no cross term
        assert!((c.covariance[(0, 0)] - 1.0).abs() < 1e-6);
        assert!((c.covariance[(1, 1)] - 1.0).abs() < 1e-6);
        assert!(c.covariance[(0, 1)].abs() < 1e-12);
        assert_eq!(c.covariance[(0, 1)], c.covariance[(1, 0)]);
    }

    #[test]
    fn update_weights_follow_responsibility_mass() {
        let points = [Vector2::new(0.0, 0.0), Vector2::new(4.0, 0.0)];
        let mut c = cluster(Matrix2::identity());
        c.update(&points, &[1.0, 0.0]);
        assert!((c.weight - 0.5).abs() < 1e-12);
        assert!((c.center - Vector2::new(0.0, 0.0)).norm() < 1e-9);
    }
}
