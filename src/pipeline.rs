//! Bounded-concurrency frame pipeline.
//!
//! Each submitted frame gets its own worker thread which self-throttles on
//! an admission [`Semaphore`] (a cap on *running* workers, not a fixed-size
//! pool), extracts the frame's foreground points through the
//! [`PointSource`] collaborator, seeds and fits the Gaussian mixture, and
//! publishes the outcome into a shared frame→result table. A single
//! sequential consumer drains that table strictly in frame-index order,
//! blocking until "its" next index exists — worker completion order is
//! unconstrained.
//!
//! The table and the semaphore counter are the only shared mutable state;
//! everything else a worker touches (image, points, clusters,
//! responsibilities) is exclusively owned by that worker until publication.
//!
//! There are no cancellation or timeout semantics: a worker stuck on a bad
//! file blocks the consumer indefinitely. That is an accepted limitation,
//! not a silent failure path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{info, warn};

use crate::cluster::GaussianCluster;
use crate::mixture::{FitConfig, FitError, FitSummary, MixtureFitter};
use crate::seeding::{SeedStrategy, SpreadSeeder};
use crate::tracking::{FrameEstimate, RotorTracker};
use crate::Vector2;

// ── Collaborator seam ───────────────────────────────────────────────────────

/// Provider of one frame's foreground pixels — the extraction collaborator.
///
/// The image-backed implementation lives in
/// [`extraction::ImagePointSource`](crate::extraction::ImagePointSource)
/// (feature `image`); tests substitute synthetic sources.
pub trait PointSource: Send + Sync + 'static {
    /// Foreground pixels of the frame at `path`, as `(row, col)` image
    /// coordinates.
    fn points(&self, path: &Path) -> anyhow::Result<Vec<(u32, u32)>>;
}

// ── Per-frame results ───────────────────────────────────────────────────────

/// Why one frame produced no cluster set.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The point source could not deliver pixels (unreadable file, decode
    /// failure, ...).
    #[error("point extraction failed: {0}")]
    Extraction(String),

    /// The mixture fit failed for this frame.
    #[error(transparent)]
    Fit(#[from] FitError),
}

/// Everything a worker publishes for one successfully fitted frame.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// Fitted clusters; cardinality fixed by the seeder.
    pub clusters: Vec<GaussianCluster>,
    /// Scaled point-space coordinates the fit ran on. Cluster
    /// `assigned` indices point into this (and into `pixels`).
    pub points: Vec<Vector2>,
    /// Original `(row, col)` pixels, parallel to `points` — kept for
    /// annotation.
    pub pixels: Vec<(u32, u32)>,
    /// Fit diagnostics.
    pub summary: FitSummary,
}

type FrameRecord = Result<FrameOutput, FrameError>;

// ── Admission control ───────────────────────────────────────────────────────

/// Counting semaphore bounding the number of concurrently running workers.
///
/// Plain wait/notify over a permit counter; no fairness guarantee (wake
/// order is whatever the condition variable delivers). The tested contract
/// is the cap alone.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// A semaphore with `cap` permits. `cap` must be at least 1.
    pub fn new(cap: usize) -> Self {
        assert!(cap > 0, "admission cap must be positive");
        Self {
            permits: Mutex::new(cap),
            available: Condvar::new(),
        }
    }

    /// Block until a permit is free, then take it. The permit is returned
    /// when the guard drops.
    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
        SemaphorePermit { semaphore: self }
    }

    fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.available.notify_one();
    }
}

/// RAII permit handed out by [`Semaphore::acquire`].
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

// ── Shared frame table ──────────────────────────────────────────────────────

/// Frame-index → fit-result table shared between workers and the consumer.
struct FrameTable {
    slots: Mutex<HashMap<usize, FrameRecord>>,
    inserted: Condvar,
}

impl FrameTable {
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            inserted: Condvar::new(),
        }
    }

    /// Insert the result for `index`. Every index is published exactly once,
    /// by whichever worker finishes that frame.
    fn publish(&self, index: usize, record: FrameRecord) {
        let mut slots = self.slots.lock();
        let previous = slots.insert(index, record);
        debug_assert!(previous.is_none(), "frame {index} published twice");
        self.inserted.notify_all();
    }

    /// Block until the result for `index` exists, then remove and return it.
    fn wait_take(&self, index: usize) -> FrameRecord {
        let mut slots = self.slots.lock();
        loop {
            if let Some(record) = slots.remove(&index) {
                return record;
            }
            self.inserted.wait(&mut slots);
        }
    }
}

// ── The pipeline ────────────────────────────────────────────────────────────

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of concurrently running workers.
    /// Default: 4
    pub max_workers: usize,

    /// Divisor applied to pixel coordinates before clustering. Brings pixel
    /// positions into a point-space where the identity-covariance seeds are
    /// informative.
    /// Default: 100.0
    pub scale: f64,

    /// EM parameters for the per-frame fit.
    pub fit: FitConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            scale: 100.0,
            fit: FitConfig::default(),
        }
    }
}

/// Schedules per-frame extraction and mixture fitting across worker
/// threads while guaranteeing in-order consumption.
pub struct FramePipeline<S: PointSource> {
    source: Arc<S>,
    seeder: Arc<dyn SeedStrategy + Send + Sync>,
    admission: Arc<Semaphore>,
    table: Arc<FrameTable>,
    config: PipelineConfig,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: PointSource> FramePipeline<S> {
    /// A pipeline with the default [`SpreadSeeder`].
    pub fn new(source: S, config: PipelineConfig) -> Self {
        Self::with_seeder(source, SpreadSeeder, config)
    }

    /// A pipeline with a caller-supplied seeding strategy.
    pub fn with_seeder(
        source: S,
        seeder: impl SeedStrategy + Send + Sync + 'static,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source: Arc::new(source),
            seeder: Arc::new(seeder),
            admission: Arc::new(Semaphore::new(config.max_workers)),
            table: Arc::new(FrameTable::new()),
            config,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Queue one frame for processing.
    ///
    /// Spawns a worker that first waits for an admission permit, then runs
    /// extraction → seeding → EM and publishes under `frame_index`. Frame
    /// indices must be unique per pipeline.
    pub fn submit(&self, frame_index: usize, path: impl Into<PathBuf>) {
        let path = path.into();
        let source = Arc::clone(&self.source);
        let seeder = Arc::clone(&self.seeder);
        let admission = Arc::clone(&self.admission);
        let table = Arc::clone(&self.table);
        let config = self.config.clone();

        let handle = thread::spawn(move || {
            let _permit = admission.acquire();
            info!(frame_index, path = %path.display(), "processing frame");
            let record = process_frame(source.as_ref(), seeder.as_ref(), &config, &path);
            table.publish(frame_index, record);
        });
        self.workers.lock().push(handle);
    }

    /// Block until `frame_index` has been published, then take its result.
    ///
    /// This is the consumer side; calling it for each index in ascending
    /// order yields strict frame-order consumption regardless of worker
    /// completion order.
    pub fn wait_frame(&self, frame_index: usize) -> Result<FrameOutput, FrameError> {
        self.table.wait_take(frame_index)
    }

    /// Wait for every submitted worker to finish.
    pub fn join(&self) {
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

/// One worker's job: extract, scale, seed, fit.
fn process_frame<S: PointSource>(
    source: &S,
    seeder: &(dyn SeedStrategy + Send + Sync),
    config: &PipelineConfig,
    path: &Path,
) -> FrameRecord {
    let pixels = source
        .points(path)
        .map_err(|e| FrameError::Extraction(format!("{e:#}")))?;

    let points: Vec<Vector2> = pixels
        .iter()
        .map(|&(row, col)| Vector2::new(col as f64 / config.scale, row as f64 / config.scale))
        .collect();

    let seeds = seeder.seeds(&points)?;
    let mut fitter = MixtureFitter::new(points, seeds)?;
    let summary = fitter.fit(&config.fit)?;
    let (points, clusters) = fitter.into_parts();

    Ok(FrameOutput {
        clusters,
        points,
        pixels,
        summary,
    })
}

/// Run the whole workflow over an ordered frame list: submit every frame,
/// consume in order through a [`RotorTracker`], and return one entry per
/// frame.
///
/// A failed frame yields its [`FrameError`], resets the tracker (so no
/// velocity is differenced across the gap), and the run continues.
pub fn estimate_sequence<S: PointSource>(
    source: S,
    paths: &[PathBuf],
    config: &PipelineConfig,
) -> Vec<Result<FrameEstimate, FrameError>> {
    let pipeline = FramePipeline::new(source, config.clone());
    for (index, path) in paths.iter().enumerate() {
        pipeline.submit(index, path.clone());
    }

    let mut tracker = RotorTracker::new();
    let mut estimates = Vec::with_capacity(paths.len());
    for index in 0..paths.len() {
        match pipeline.wait_frame(index) {
            Ok(output) => estimates.push(Ok(tracker.advance(index, &output.clusters))),
            Err(error) => {
                warn!(frame_index = index, %error, "skipping frame");
                tracker.reset();
                estimates.push(Err(error));
            }
        }
    }

    pipeline.join();
    estimates
}
