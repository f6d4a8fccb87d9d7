//! Expectation-Maximization fitting of a fixed-cardinality Gaussian mixture
//! to one frame's point cloud.
//!
//! The fitter owns the frame's points and exactly the clusters it was seeded
//! with — cardinality never changes during a fit. Each iteration:
//!
//! 1. **Expectation** — every cluster scores every point in log space; per
//!    point the scores are normalized with log-sum-exp into responsibilities,
//!    and the point is hard-assigned to the cluster with the largest one
//! 2. **Convergence check** — stop once the frame log-likelihood changes by
//!    less than a relative tolerance. The check runs between expectation and
//!    maximization, so the returned clusters reflect the *previous*
//!    maximization at convergence
//! 3. **Maximization** — every cluster refits to its responsibilities
//!
//! A covariance that fails to Cholesky-factor mid-fit aborts the frame with
//! [`FitError::DegenerateCovariance`]; the caller decides whether to reseed
//! or drop the frame.

use thiserror::Error;
use tracing::debug;

use crate::cluster::GaussianCluster;
use crate::Vector2;

/// Parameters of the EM loop.
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Relative log-likelihood tolerance: iteration stops once
    /// `|L − L_prev| < tolerance · |L|`.
    /// Default: 1e-6
    pub tolerance: f64,

    /// Iteration cap. Three well-separated blade clusters settle in a
    /// handful of iterations, so the cap mostly bounds pathological frames.
    /// Default: 10
    pub max_iterations: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 10,
        }
    }
}

/// Recoverable per-frame fit failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FitError {
    /// The frame yielded no foreground points, leaving mean and variance
    /// undefined.
    #[error("frame produced no foreground points")]
    EmptyPointSet,

    /// A cluster's covariance stopped being positive definite during the
    /// expectation step.
    #[error("covariance of cluster {cluster} became degenerate in iteration {iteration}")]
    DegenerateCovariance { cluster: usize, iteration: usize },
}

/// Diagnostics of a completed fit.
#[derive(Debug, Clone)]
pub struct FitSummary {
    /// Number of EM iterations run (expectation steps evaluated).
    pub iterations: usize,
    /// Whether the relative-tolerance check triggered before the cap.
    pub converged: bool,
    /// Frame log-likelihood of the final expectation step.
    pub log_likelihood: f64,
    /// Log-likelihood after each iteration, oldest first.
    pub likelihood_trace: Vec<f64>,
}

/// EM engine for one frame: a point set plus the fixed cluster set seeded
/// into it.
#[derive(Debug)]
pub struct MixtureFitter {
    points: Vec<Vector2>,
    clusters: Vec<GaussianCluster>,
    /// Soft assignment probabilities, `responsibilities[cluster][point]`.
    responsibilities: Vec<Vec<f64>>,
}

impl MixtureFitter {
    /// Create a fitter over `points` seeded with `seeds`.
    ///
    /// The cluster cardinality is fixed by the seeds for the lifetime of the
    /// fit. Fails with [`FitError::EmptyPointSet`] when there is nothing to
    /// fit to.
    pub fn new(points: Vec<Vector2>, seeds: Vec<GaussianCluster>) -> Result<Self, FitError> {
        if points.is_empty() {
            return Err(FitError::EmptyPointSet);
        }
        let responsibilities = vec![vec![0.0; points.len()]; seeds.len()];
        Ok(Self {
            points,
            clusters: seeds,
            responsibilities,
        })
    }

    /// Run EM to convergence or the iteration cap.
    pub fn fit(&mut self, config: &FitConfig) -> Result<FitSummary, FitError> {
        let mut previous = 0.0;
        let mut likelihood = f64::NEG_INFINITY;
        let mut trace = Vec::with_capacity(config.max_iterations);
        let mut converged = false;
        let mut iterations = 0;

        for iteration in 0..config.max_iterations {
            iterations = iteration + 1;
            likelihood = self.expectation(iteration)?;
            trace.push(likelihood);

            if (likelihood - previous).abs() < config.tolerance * likelihood.abs() {
                converged = true;
                break;
            }
            previous = likelihood;

            self.maximization();
        }

        debug!(
            iterations,
            converged,
            log_likelihood = likelihood,
            "mixture fit finished"
        );

        Ok(FitSummary {
            iterations,
            converged,
            log_likelihood: likelihood,
            likelihood_trace: trace,
        })
    }

    /// The fitted clusters, in seed order.
    pub fn clusters(&self) -> &[GaussianCluster] {
        &self.clusters
    }

    /// The point set the fit ran on.
    pub fn points(&self) -> &[Vector2] {
        &self.points
    }

    /// Tear the fitter apart into its points and clusters.
    pub fn into_parts(self) -> (Vec<Vector2>, Vec<GaussianCluster>) {
        (self.points, self.clusters)
    }

    /// Expectation step: score, normalize, hard-assign. Returns the frame
    /// log-likelihood `Σ_points logsum`.
    fn expectation(&mut self, iteration: usize) -> Result<f64, FitError> {
        let num_clusters = self.clusters.len();

        let mut scores: Vec<Vec<f64>> = Vec::with_capacity(num_clusters);
        for (k, cluster) in self.clusters.iter_mut().enumerate() {
            let ll = cluster
                .log_likelihoods(&self.points)
                .ok_or(FitError::DegenerateCovariance {
                    cluster: k,
                    iteration,
                })?;
            cluster.assigned.clear();
            scores.push(ll);
        }

        let mut total = 0.0;
        for i in 0..self.points.len() {
            let mut max_score = f64::NEG_INFINITY;
            for column in &scores {
                if column[i] > max_score {
                    max_score = column[i];
                }
            }

            let mut expsum = 0.0;
            for column in &scores {
                expsum += (column[i] - max_score).exp();
            }
            let logsum = max_score + expsum.ln();
            total += logsum;

            // Normalize back out of log space and hard-assign. The strictly
            // greater comparison makes the first cluster reaching the maximum
            // win ties.
            let mut best: Option<usize> = None;
            let mut best_responsibility = 0.0;
            for k in 0..num_clusters {
                let r = (scores[k][i] - logsum).exp();
                self.responsibilities[k][i] = r;
                if r > best_responsibility {
                    best_responsibility = r;
                    best = Some(k);
                }
            }
            if let Some(k) = best {
                self.clusters[k].assigned.push(i);
            }
        }

        Ok(total)
    }

    /// Maximization step: refit every cluster to the current
    /// responsibilities.
    fn maximization(&mut self) {
        for (cluster, responsibilities) in self.clusters.iter_mut().zip(&self.responsibilities) {
            cluster.update(&self.points, responsibilities);
        }
    }
}
