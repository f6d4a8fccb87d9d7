//! Blade identity continuity and angular-velocity estimation.
//!
//! The sequential consumer feeds each frame's fitted clusters through a
//! [`RotorTracker`]. The tracker matches them against the previous frame,
//! propagates stable blade identities (and thereby annotation colors)
//! through the correspondence, and turns matched-pair orientation deltas
//! into one angular-velocity sample per frame.
//!
//! Cluster orientation is only identifiable modulo a half turn — the
//! covariance ellipse of a blade pointing up equals that of the same blade
//! pointing down — so all frame-to-frame angle differences are wrapped
//! symmetrically into `(−π/2, π/2]` by [`wrap_half_turn`] before averaging.

use std::f64::consts::PI;

use tracing::debug;

use crate::cluster::GaussianCluster;
use crate::matching::match_clusters;

/// Stable identity of one tracked blade, assigned on first sight and carried
/// through cluster matches.
pub type BladeId = usize;

/// Annotation palette, one entry per blade; identities beyond three cycle.
pub const BLADE_PALETTE: [[u8; 3]; 3] = [[230, 60, 40], [60, 200, 80], [70, 110, 240]];

/// Annotation color for a blade identity.
pub fn blade_color(blade: BladeId) -> [u8; 3] {
    BLADE_PALETTE[blade % BLADE_PALETTE.len()]
}

/// Wrap an angle difference into `(−π/2, π/2]`.
///
/// Differences of half-turn-ambiguous orientations are themselves only
/// meaningful modulo π; the symmetric wrap picks the representative of
/// smallest magnitude (the seam at exactly ±π/2 resolves to +π/2).
pub fn wrap_half_turn(delta: f64) -> f64 {
    0.5 * PI - (0.5 * PI - delta).rem_euclid(PI)
}

/// One consumed frame's tracking outcome.
#[derive(Debug, Clone)]
pub struct FrameEstimate {
    pub frame_index: usize,
    /// Mean wrapped orientation delta over all matched blades, in radians
    /// per frame interval. `None` for the first frame after a (re)start or
    /// when nothing matched.
    pub angular_velocity: Option<f64>,
    /// Blade identity of each cluster, parallel to the frame's cluster
    /// vector.
    pub labels: Vec<BladeId>,
    /// Wrapped per-blade orientation deltas for the matched pairs, ordered
    /// by blade identity. Unmatched clusters contribute nothing here.
    pub blade_deltas: Vec<(BladeId, f64)>,
}

struct TrackedFrame {
    frame_index: usize,
    clusters: Vec<GaussianCluster>,
    labels: Vec<BladeId>,
}

/// Consumer-owned tracking state threaded from frame to frame.
#[derive(Default)]
pub struct RotorTracker {
    previous: Option<TrackedFrame>,
    next_blade: BladeId,
}

impl RotorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next in-order frame's fitted clusters.
    ///
    /// Matched clusters inherit the blade identity of their previous-frame
    /// partner; unmatched clusters get fresh identities and are excluded
    /// from the velocity average. The identity map updates only after the
    /// match completes, so a partially processed frame never leaks into the
    /// tracked state.
    pub fn advance(&mut self, frame_index: usize, clusters: &[GaussianCluster]) -> FrameEstimate {
        let mut labels: Vec<Option<BladeId>> = vec![None; clusters.len()];
        let mut blade_deltas = Vec::new();

        if let Some(previous) = &self.previous {
            let pairs = match_clusters(&previous.clusters, clusters);
            for &(pi, ci) in &pairs {
                let blade = previous.labels[pi];
                labels[ci] = Some(blade);
                let delta =
                    wrap_half_turn(clusters[ci].angle() - previous.clusters[pi].angle());
                blade_deltas.push((blade, delta));
            }
            debug!(
                frame_index,
                previous_frame = previous.frame_index,
                matched = pairs.len(),
                "matched blade clusters"
            );
        }

        let labels: Vec<BladeId> = labels
            .into_iter()
            .map(|label| label.unwrap_or_else(|| self.fresh_blade()))
            .collect();

        blade_deltas.sort_by_key(|&(blade, _)| blade);
        let angular_velocity = if blade_deltas.is_empty() {
            None
        } else {
            Some(blade_deltas.iter().map(|&(_, d)| d).sum::<f64>() / blade_deltas.len() as f64)
        };

        self.previous = Some(TrackedFrame {
            frame_index,
            clusters: clusters.to_vec(),
            labels: labels.clone(),
        });

        FrameEstimate {
            frame_index,
            angular_velocity,
            labels,
            blade_deltas,
        }
    }

    /// Drop the tracked baseline, e.g. after a frame whose fit failed.
    /// The next frame starts a fresh identity assignment and produces no
    /// velocity sample.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    fn fresh_blade(&mut self) -> BladeId {
        let blade = self.next_blade;
        self.next_blade += 1;
        blade
    }
}
