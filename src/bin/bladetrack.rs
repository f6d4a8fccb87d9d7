//! End-to-end rotor-speed estimation over a directory of frames.
//!
//! Discovers image files (processed in filename order), runs the bounded
//! concurrency clustering pipeline, and writes one CSV row per frame. With
//! `--annotate` each frame is re-saved with its extracted points painted in
//! stable per-blade colors.
//!
//! Usage:
//!   bladetrack --frames img/sequence --output rotor_speed.csv
//!
//! Output CSV format:
//!   frame,file,status,matched,omega_rad_per_frame[,omega_rad_per_s]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use walkdir::WalkDir;

use bladetrack::extraction::{self, ImagePointSource, RegionOfInterest, RgbThreshold};
use bladetrack::{
    blade_color, FitConfig, FrameEstimate, FrameOutput, FramePipeline, PipelineConfig,
    RotorTracker,
};

#[derive(Parser, Debug)]
#[command(name = "bladetrack")]
#[command(about = "Estimate rotor angular velocity from an image sequence")]
struct Args {
    /// Directory containing the frame images (processed in filename order)
    #[arg(short, long)]
    frames: PathBuf,

    /// Output CSV path
    #[arg(short, long, default_value = "rotor_speed.csv")]
    output: PathBuf,

    /// Directory for annotated frames; omit to skip annotation
    #[arg(long)]
    annotate: Option<PathBuf>,

    /// Maximum number of concurrently running workers
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Divisor applied to pixel coordinates before clustering
    #[arg(long, default_value_t = 100.0)]
    scale: f64,

    /// Per-channel foreground threshold as R,G,B
    #[arg(long, default_value = "200,200,200", value_parser = parse_threshold)]
    threshold: RgbThreshold,

    /// Region of interest as min_row,max_row,min_col,max_col (default: full frame)
    #[arg(long, value_parser = parse_roi)]
    roi: Option<RegionOfInterest>,

    /// Frame rate of the sequence; adds a rad/s column to the report
    #[arg(long)]
    fps: Option<f64>,
}

fn parse_threshold(raw: &str) -> Result<RgbThreshold, String> {
    let channels: Vec<u8> = raw
        .split(',')
        .map(|part| part.trim().parse::<u8>().map_err(|e| e.to_string()))
        .collect::<Result<_, _>>()?;
    match channels[..] {
        [r, g, b] => Ok(RgbThreshold([r, g, b])),
        _ => Err("expected three comma-separated values, e.g. 200,200,200".into()),
    }
}

fn parse_roi(raw: &str) -> Result<RegionOfInterest, String> {
    let bounds: Vec<u32> = raw
        .split(',')
        .map(|part| part.trim().parse::<u32>().map_err(|e| e.to_string()))
        .collect::<Result<_, _>>()?;
    match bounds[..] {
        [min_row, max_row, min_col, max_col] => Ok(RegionOfInterest {
            min_row,
            max_row,
            min_col,
            max_col,
        }),
        _ => Err("expected min_row,max_row,min_col,max_col".into()),
    }
}

/// Image files directly inside `dir`, sorted by filename.
fn discover_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| {
                    matches!(
                        ext.to_ascii_lowercase().as_str(),
                        "png" | "jpg" | "jpeg" | "bmp"
                    )
                })
                .unwrap_or(false)
        })
        .collect();
    frames.sort();
    Ok(frames)
}

/// Re-save one frame with its extracted points painted per blade.
fn annotate_frame(
    frame_path: &Path,
    out_dir: &Path,
    output: &FrameOutput,
    estimate: &FrameEstimate,
) -> Result<()> {
    let mut img = extraction::load_image(frame_path)?;
    for (index, cluster) in output.clusters.iter().enumerate() {
        let color = blade_color(estimate.labels[index]);
        let pixels: Vec<(u32, u32)> = cluster
            .assigned
            .iter()
            .map(|&point| output.pixels[point])
            .collect();
        extraction::paint_points(&mut img, &pixels, color);
    }

    let file_name = frame_path
        .file_name()
        .context("frame path has no file name")?;
    extraction::save_image(&img, out_dir.join(file_name))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let frames = discover_frames(&args.frames)?;
    anyhow::ensure!(
        !frames.is_empty(),
        "no image frames found in {}",
        args.frames.display()
    );
    info!(frames = frames.len(), "starting rotor-speed estimation");

    if let Some(dir) = &args.annotate {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create annotation dir {}", dir.display()))?;
    }

    let source = ImagePointSource {
        roi: args.roi.unwrap_or_else(RegionOfInterest::unbounded),
        threshold: args.threshold,
    };
    let config = PipelineConfig {
        max_workers: args.workers,
        scale: args.scale,
        fit: FitConfig::default(),
    };

    let pipeline = FramePipeline::new(source, config);
    for (index, path) in frames.iter().enumerate() {
        pipeline.submit(index, path.clone());
    }

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("failed to create report {}", args.output.display()))?;
    let mut header = vec!["frame", "file", "status", "matched", "omega_rad_per_frame"];
    if args.fps.is_some() {
        header.push("omega_rad_per_s");
    }
    writer.write_record(&header)?;

    let mut tracker = RotorTracker::new();
    for (index, path) in frames.iter().enumerate() {
        let file = path.file_name().unwrap_or_default().to_string_lossy();
        match pipeline.wait_frame(index) {
            Ok(output) => {
                let estimate = tracker.advance(index, &output.clusters);
                let omega = estimate
                    .angular_velocity
                    .map(|v| format!("{v:.6}"))
                    .unwrap_or_default();
                let mut record = vec![
                    index.to_string(),
                    file.into_owned(),
                    "ok".to_string(),
                    estimate.blade_deltas.len().to_string(),
                    omega,
                ];
                if let Some(fps) = args.fps {
                    record.push(
                        estimate
                            .angular_velocity
                            .map(|v| format!("{:.6}", v * fps))
                            .unwrap_or_default(),
                    );
                }
                writer.write_record(&record)?;

                if let Some(dir) = &args.annotate {
                    annotate_frame(path, dir, &output, &estimate)?;
                }
            }
            Err(error) => {
                warn!(frame_index = index, %error, "skipping frame");
                tracker.reset();
                let mut record = vec![
                    index.to_string(),
                    file.into_owned(),
                    format!("failed: {error}"),
                    "0".to_string(),
                    String::new(),
                ];
                if args.fps.is_some() {
                    record.push(String::new());
                }
                writer.write_record(&record)?;
            }
        }
    }

    writer.flush()?;
    pipeline.join();
    info!(output = %args.output.display(), "report written");
    Ok(())
}
