//! # bladetrack
//!
//! Estimate the **rotational speed of a three-bladed rotor** (e.g. a wind
//! turbine) from a time-ordered sequence of images.
//!
//! Each frame is reduced to its bright foreground pixels, a 3-component 2D
//! Gaussian mixture is fitted to those pixels with Expectation-Maximization,
//! the fitted blade clusters are matched against the previous frame's
//! clusters by center distance, and the per-blade orientation change becomes
//! an angular-velocity estimate in radians per frame interval.
//!
//! ## Features
//!
//! - **Log-space EM** — per-point likelihoods are evaluated through a
//!   Cholesky-whitened log density and normalized with log-sum-exp, so points
//!   far from a cluster never underflow
//! - **Degeneracy as data, not crashes** — a collapsing covariance surfaces
//!   as a recoverable per-frame fit error; the run continues on the next frame
//! - **Identity continuity** — greedy nearest-center 1:1 matching carries
//!   stable blade identities (and annotation colors) across frames
//! - **Bounded concurrency** — one worker per frame, self-throttled by an
//!   admission semaphore; a single consumer drains results strictly in frame
//!   order
//!
//! ## Example
//!
//! ```no_run
//! use bladetrack::extraction::{ImagePointSource, RegionOfInterest, RgbThreshold};
//! use bladetrack::{estimate_sequence, PipelineConfig};
//!
//! let source = ImagePointSource {
//!     roi: RegionOfInterest::unbounded(),
//!     threshold: RgbThreshold([200, 200, 200]),
//! };
//!
//! let frames: Vec<std::path::PathBuf> =
//!     (0..48).map(|i| format!("frames/frame_{i:04}.png").into()).collect();
//!
//! let estimates = estimate_sequence(source, &frames, &PipelineConfig::default());
//! for estimate in estimates.iter().flatten() {
//!     if let Some(omega) = estimate.angular_velocity {
//!         println!("frame {}: {:+.4} rad/frame", estimate.frame_index, omega);
//!     }
//! }
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Extraction** — scan a region of interest for pixels with any channel
//!    above a per-channel threshold (the [`pipeline::PointSource`] seam; an
//!    image-backed implementation ships behind the `image` feature)
//! 2. **Seeding** — place three initial Gaussians from the point cloud's
//!    centroid and vertical extent ([`seeding::SpreadSeeder`], pluggable)
//! 3. **EM fit** — alternate log-space expectation and moment-matching
//!    maximization until the frame log-likelihood settles
//!    ([`mixture::MixtureFitter`])
//! 4. **Matching** — greedy nearest-center assignment between consecutive
//!    frames' cluster sets ([`matching::match_clusters`])
//! 5. **Velocity** — wrap matched-pair orientation deltas into
//!    `(−π/2, π/2]` (orientation is only defined modulo a half turn) and
//!    average them ([`tracking::RotorTracker`])

pub mod cluster;
#[cfg(feature = "image")]
pub mod extraction;
pub mod linalg;
pub mod matching;
pub mod mixture;
pub mod pipeline;
pub mod seeding;
pub mod tracking;

pub use cluster::GaussianCluster;
pub use matching::match_clusters;
pub use mixture::{FitConfig, FitError, FitSummary, MixtureFitter};
pub use pipeline::{
    estimate_sequence, FrameError, FrameOutput, FramePipeline, PipelineConfig, PointSource,
    Semaphore,
};
pub use seeding::{SeedStrategy, SpreadSeeder, NUM_BLADES};
pub use tracking::{blade_color, wrap_half_turn, BladeId, FrameEstimate, RotorTracker};

// Commonly used types
// Note: all of the mixture math runs in 64-bit floats. The convergence check
// differences log-likelihood sums over the whole frame, which loses too much
// precision in 32 bits.
pub type Matrix2 = nalgebra::Matrix2<f64>;
pub type Vector2 = nalgebra::Vector2<f64>;
