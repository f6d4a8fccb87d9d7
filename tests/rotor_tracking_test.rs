//! End-to-end tests: synthesize a three-bladed rotor spinning at a known
//! rate, push the frames through the concurrent pipeline, and verify the
//! recovered angular velocity, the consumption order, and the failure
//! handling.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use bladetrack::{
    estimate_sequence, FitError, FrameError, FramePipeline, GaussianCluster, Matrix2,
    PipelineConfig, PointSource, RotorTracker, SeedStrategy, Vector2,
};

// ── Synthetic rotor ─────────────────────────────────────────────────────────

/// Rotor hub position in pixels, (row, col).
const HUB: (f64, f64) = (400.0, 400.0);
/// True rotation rate, radians per frame.
const OMEGA: f64 = 0.1;
/// Blade orientation of blade 0 in frame 0.
const PHASE: f64 = 0.35;
/// Pixel-coordinate divisor used throughout the tests.
const SCALE: f64 = 100.0;
/// Points sampled per blade per frame.
const POINTS_PER_BLADE: usize = 120;

fn frame_name(frame: usize) -> String {
    format!("frame_{frame:03}.png")
}

fn frame_paths(count: usize) -> Vec<PathBuf> {
    (0..count).map(|f| PathBuf::from(frame_name(f))).collect()
}

/// Pixels of one frame: three straight blades radiating from the hub, with
/// a little transverse jitter.
fn rotor_frame(rng: &mut StdRng, frame: usize) -> Vec<(u32, u32)> {
    let jitter = Normal::new(0.0, 2.0).unwrap();
    let mut pixels = Vec::with_capacity(3 * POINTS_PER_BLADE);
    for blade in 0..3 {
        let phi = PHASE
            + OMEGA * frame as f64
            + blade as f64 * std::f64::consts::TAU / 3.0;
        let (sin, cos) = phi.sin_cos();
        for step in 0..POINTS_PER_BLADE {
            let along = 30.0 + 140.0 * step as f64 / (POINTS_PER_BLADE - 1) as f64;
            let across = jitter.sample(rng);
            let col = HUB.1 + along * cos - across * sin;
            let row = HUB.0 + along * sin + across * cos;
            pixels.push((row.round() as u32, col.round() as u32));
        }
    }
    pixels
}

/// Point source serving precomputed rotor frames by file name.
///
/// Earlier frames are (optionally) delayed longer than later ones so that
/// worker completion order inverts submission order; unknown file names
/// fail like an unreadable image would.
struct SyntheticRotor {
    frames: HashMap<String, Vec<(u32, u32)>>,
    reverse_delay: bool,
    concurrent: AtomicUsize,
    peak: AtomicUsize,
}

impl SyntheticRotor {
    fn new(count: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(99);
        let frames = (0..count)
            .map(|f| (frame_name(f), rotor_frame(&mut rng, f)))
            .collect();
        Self {
            frames,
            reverse_delay: false,
            concurrent: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn with_reverse_delay(mut self) -> Self {
        self.reverse_delay = true;
        self
    }
}

impl PointSource for SyntheticRotor {
    fn points(&self, path: &Path) -> anyhow::Result<Vec<(u32, u32)>> {
        let running = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if self.reverse_delay {
            let index: usize = name
                .trim_start_matches("frame_")
                .trim_end_matches(".png")
                .parse()
                .unwrap_or(0);
            let rank = self.frames.len().saturating_sub(index) as u64;
            thread::sleep(Duration::from_millis(5 * rank));
        }

        let result = self
            .frames
            .get(&name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unreadable frame: {name}"));

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Delegating wrapper so a test can keep reading the source's counters
/// after the pipeline has taken ownership.
struct SharedRotor(Arc<SyntheticRotor>);

impl PointSource for SharedRotor {
    fn points(&self, path: &Path) -> anyhow::Result<Vec<(u32, u32)>> {
        self.0.points(path)
    }
}

/// Seeds one identity-covariance cluster at the frame-0 position of each
/// blade. Keeps the fit anchored to known blade identities so the tests can
/// compare against the generating rotation.
struct RadialSeeder {
    hub: Vector2,
    radius: f64,
    phase: f64,
}

impl SeedStrategy for RadialSeeder {
    fn seeds(&self, points: &[Vector2]) -> Result<Vec<GaussianCluster>, FitError> {
        if points.is_empty() {
            return Err(FitError::EmptyPointSet);
        }
        Ok((0..3)
            .map(|blade| {
                let phi = self.phase + blade as f64 * std::f64::consts::TAU / 3.0;
                let center = self.hub + self.radius * Vector2::new(phi.cos(), phi.sin());
                GaussianCluster::new(center, Matrix2::identity(), 1.0 / 3.0)
            })
            .collect())
    }
}

fn radial_seeder() -> RadialSeeder {
    RadialSeeder {
        hub: Vector2::new(HUB.1 / SCALE, HUB.0 / SCALE),
        radius: 1.0,
        phase: PHASE,
    }
}

fn test_config(max_workers: usize) -> PipelineConfig {
    PipelineConfig {
        max_workers,
        scale: SCALE,
        ..PipelineConfig::default()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[test]
fn recovers_known_angular_velocity() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    const FRAMES: usize = 6;
    let paths = frame_paths(FRAMES);
    // Reverse delays make later frames finish first; the consumer must
    // still see them in order.
    let source = SyntheticRotor::new(FRAMES).with_reverse_delay();
    let pipeline = FramePipeline::with_seeder(source, radial_seeder(), test_config(3));
    for (index, path) in paths.iter().enumerate() {
        pipeline.submit(index, path.clone());
    }

    let mut tracker = RotorTracker::new();
    for index in 0..FRAMES {
        let output = pipeline
            .wait_frame(index)
            .unwrap_or_else(|e| panic!("frame {index} failed: {e}"));
        assert_eq!(output.clusters.len(), 3);

        let estimate = tracker.advance(index, &output.clusters);
        assert_eq!(estimate.frame_index, index);

        let mut labels = estimate.labels.clone();
        labels.sort_unstable();
        assert_eq!(labels, vec![0, 1, 2], "blade identities drifted");

        if index == 0 {
            assert!(estimate.angular_velocity.is_none());
        } else {
            assert_eq!(estimate.blade_deltas.len(), 3);
            let omega = estimate.angular_velocity.expect("velocity sample");
            assert!(
                (omega - OMEGA).abs() < 0.04,
                "frame {index}: expected ω ≈ {OMEGA}, got {omega:.4}"
            );
        }
    }
    pipeline.join();
}

#[test]
fn default_seeding_runs_the_whole_sequence() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();

    const FRAMES: usize = 4;
    let estimates = estimate_sequence(
        SyntheticRotor::new(FRAMES),
        &frame_paths(FRAMES),
        &test_config(4),
    );

    assert_eq!(estimates.len(), FRAMES);
    for (index, estimate) in estimates.iter().enumerate() {
        let estimate = estimate
            .as_ref()
            .unwrap_or_else(|e| panic!("frame {index} failed: {e}"));
        assert_eq!(estimate.labels.len(), 3);
        if index > 0 {
            assert!(estimate.angular_velocity.is_some());
        }
    }
}

#[test]
fn unreadable_frame_is_skipped_and_tracking_restarts() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();

    // Frames 0, 1, <missing>, 2, 3 — the gap must surface as an extraction
    // error, drop the velocity baseline, and leave the rest of the run
    // intact.
    let mut paths = frame_paths(2);
    paths.push(PathBuf::from("missing.png"));
    paths.push(PathBuf::from(frame_name(2)));
    paths.push(PathBuf::from(frame_name(3)));

    let estimates = estimate_sequence(SyntheticRotor::new(4), &paths, &test_config(2));

    assert_eq!(estimates.len(), 5);
    assert!(estimates[0].is_ok());
    assert!(estimates[1].as_ref().unwrap().angular_velocity.is_some());
    match &estimates[2] {
        Err(FrameError::Extraction(message)) => {
            assert!(message.contains("missing.png"), "got: {message}");
        }
        other => panic!("expected extraction failure, got {other:?}"),
    }
    // First frame after the gap has no baseline...
    assert!(estimates[3].as_ref().unwrap().angular_velocity.is_none());
    // ...and the one after that produces a sample again.
    assert!(estimates[4].as_ref().unwrap().angular_velocity.is_some());
}

#[test]
fn admission_cap_holds_under_load() {
    const FRAMES: usize = 8;
    let source = Arc::new(SyntheticRotor::new(FRAMES));
    let paths = frame_paths(FRAMES);

    let pipeline = FramePipeline::with_seeder(
        SharedRotor(Arc::clone(&source)),
        radial_seeder(),
        test_config(2),
    );
    for (index, path) in paths.iter().enumerate() {
        pipeline.submit(index, path.clone());
    }
    for index in 0..FRAMES {
        pipeline.wait_frame(index).unwrap();
    }
    pipeline.join();

    let peak = source.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "{peak} extractions ran concurrently, cap is 2");
}
