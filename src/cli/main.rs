//! Subject cutout CLI tool
//!
//! Finds subjects in a set of images with the border-key segmenter and writes one
//! cropped, transparent cutout per subject.

use super::config::CliConfigBuilder;
use crate::{
    backends::BorderKeySegmenter,
    batch::{BatchController, BatchEvent},
    error::CutoutError,
    services::{
        export::{DirectoryExportStore, ExportStore},
        io::{ImageIOService, ImageSource},
        progress::ConsoleProgressReporter,
    },
    session::SegmentationSession,
    tracing_config::{events, spans, TracingConfig},
    types::Rotation,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, Instrument};
use uuid::Uuid;

/// Subject cutout CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "subject-cutout")]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<PathBuf>,

    /// Directory for cutouts, thumbnails and metadata (default: current directory)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Confidence threshold, snapped to tenths in 0.1-0.9
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Export every subject instead of only the largest
    #[arg(long)]
    pub all_subjects: bool,

    /// Rotate cutouts by a multiple of 90 degrees (negative is counter-clockwise)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rotate: i32,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// Maximum thumbnail size as WIDTHxHEIGHT
    #[arg(long, value_name = "WxH", value_parser = parse_dimensions)]
    pub thumbnail: Option<(u32, u32)>,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for file names when processing directories (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// JSON session configuration; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Background colour distance treated as pure background (0.0-1.0)
    #[arg(long)]
    pub tolerance: Option<f32>,

    /// Width of the confidence ramp past the tolerance (0.0-1.0)
    #[arg(long)]
    pub softness: Option<f32>,

    /// Ignore subjects smaller than this many pixels
    #[arg(long)]
    pub min_area: Option<usize>,

    /// Emit logs as JSON
    #[cfg(feature = "tracing-json")]
    #[arg(long)]
    pub json_logs: bool,

    /// Also write logs to this file
    #[cfg(feature = "tracing-files")]
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub(crate) fn thumbnail_size(&self) -> Option<(u32, u32)> {
        self.thumbnail
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Webp,
}

fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width: u32 = width.trim().parse().map_err(|e| format!("bad width: {}", e))?;
    let height: u32 = height.trim().parse().map_err(|e| format!("bad height: {}", e))?;
    Ok((width, height))
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let run_id = Uuid::new_v4().simple().to_string();
    let _tracing_guard = build_tracing_config(&cli, &run_id)
        .init()
        .context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;

    let files = collect_input_files(&cli)?;
    if files.is_empty() {
        events::warning_with_recommendation(
            "No supported image files found in the provided inputs",
            "check the paths, or use --recursive / --pattern",
        );
        return Ok(());
    }

    let span = spans::run(&run_id, "border-key", files.len());
    run(&cli, files).instrument(span).await
}

fn build_tracing_config(cli: &Cli, run_id: &str) -> TracingConfig {
    #[allow(unused_mut)]
    let mut config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_run_id(run_id);

    #[cfg(feature = "tracing-json")]
    if cli.json_logs {
        config = config.with_format(crate::tracing_config::TracingFormat::Json);
    }
    #[cfg(feature = "tracing-files")]
    if let Some(path) = &cli.log_file {
        config = config.with_output(crate::tracing_config::TracingOutput::Both(path.clone()));
    }
    config
}

async fn run(cli: &Cli, files: Vec<PathBuf>) -> Result<()> {
    let session_config =
        CliConfigBuilder::session_config(cli).context("Failed to build configuration")?;
    let segmenter = BorderKeySegmenter::new(CliConfigBuilder::border_key_config(cli)?)
        .context("Failed to create segmenter")?;
    let rotation = CliConfigBuilder::rotation(cli)?;
    let verbose = session_config.verbose_progress;
    info!(
        "Threshold {}, format {}, rotation {}°",
        session_config.default_threshold,
        session_config.output_format,
        rotation.degrees()
    );

    let output_dir = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));
    let store = DirectoryExportStore::new(&output_dir);

    let session = SegmentationSession::with_config(Arc::new(segmenter), session_config)
        .context("Failed to create segmentation session")?;
    let sources = files.iter().map(ImageSource::path).collect();
    let mut batch = BatchController::new(session, sources)
        .with_reporter(Arc::new(ConsoleProgressReporter::new(verbose)));

    info!("Found {} image(s) to process", files.len());
    let progress = progress_bar(files.len())?;
    let start_time = Instant::now();
    let mut exported = 0;

    while let Some(event) = batch.next_image().await? {
        match event {
            BatchEvent::MaskedImageReady { index, subjects } => {
                let label = batch
                    .current_source()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                if let Some(pb) = &progress {
                    pb.set_message(label.clone());
                }
                let span = spans::batch_item(index, &label);
                exported += export_ready(&mut batch, &store, cli.all_subjects, rotation)
                    .instrument(span)
                    .await
                    .with_context(|| format!("Failed to export cutouts for {}", label))?;
                debug!(index, subjects, "Item exported");
            },
            BatchEvent::Failed { index, reason } => {
                // next_image() skips the failed item and counts it
                let label = batch
                    .current_source()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                events::error_with_context(&CutoutError::Segmentation(reason), &label);
                debug!(index, "Skipping failed item");
            },
            BatchEvent::NoSubjectFound { .. } => {},
            BatchEvent::BatchFinished { stats } => {
                if let Some(pb) = &progress {
                    pb.finish_and_clear();
                }
                let elapsed = start_time.elapsed();
                events::performance_metric("batch", elapsed.as_millis() as u64);
                info!(
                    "{} cutout(s) from {} image(s) in {:.2}s ({} without subjects, {} failed) -> {}",
                    exported,
                    stats.processed,
                    elapsed.as_secs_f64(),
                    stats.skipped,
                    stats.failed,
                    output_dir.display()
                );
                break;
            },
        }

        if let Some(pb) = &progress {
            pb.set_position((batch.len() - batch.remaining()) as u64);
        }
    }

    Ok(())
}

/// Export the current item's cutouts; returns how many were stored
async fn export_ready(
    batch: &mut BatchController,
    store: &dyn ExportStore,
    all_subjects: bool,
    rotation: Rotation,
) -> Result<usize> {
    let session = batch.session_mut();
    while session.rotation() != rotation {
        session.rotate_clockwise();
    }

    let rounds = if all_subjects {
        session.subject_count()
    } else {
        1
    };
    let mut stored = 0;
    for round in 0..rounds {
        if round > 0 {
            session.next_subject()?;
        }
        let span = spans::export(session.subject_index(), rotation.degrees());
        match span.in_scope(|| session.export_current()) {
            Ok(payload) => {
                let receipt = store.store(&payload).await?;
                info!("Saved {}", receipt.image_id);
                stored += 1;
            },
            Err(CutoutError::EmptyMask) => {
                warn!(
                    "Subject {} has no pixels at threshold {}, not exported",
                    session.subject_index(),
                    session.threshold()
                );
            },
            Err(e) => return Err(e.into()),
        }
    }
    Ok(stored)
}

fn progress_bar(file_count: usize) -> Result<Option<ProgressBar>> {
    if file_count <= 1 {
        return Ok(None);
    }
    let pb = ProgressBar::new(file_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );
    Ok(Some(pb))
}

/// Expand files and directories into a sorted list of supported images
fn collect_input_files(cli: &Cli) -> Result<Vec<PathBuf>> {
    let mut all_files = Vec::new();

    for path in &cli.input {
        if path.is_file() {
            if ImageIOService::is_supported_format(path) {
                all_files.push(path.clone());
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            let dir_files = find_image_files(path, cli.recursive, cli.pattern.as_deref())?;
            all_files.extend(dir_files);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    // Alphanumeric order keeps batch indices stable between runs
    all_files.sort();
    all_files.dedup();
    Ok(all_files)
}

/// Find all supported images in a directory
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry =
            entry.with_context(|| format!("Failed to read directory {}", dir.display()))?;
        if entry.file_type().is_file() {
            let path = entry.path();
            if ImageIOService::is_supported_format(path) && matches_pattern(path, pattern) {
                files.push(path.to_path_buf());
            }
        }
    }

    Ok(files)
}

/// Check if file matches the given pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            }),
        None => true,
    }
}
