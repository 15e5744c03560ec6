//! colordist CLI - per-pixel distance to an annotated reference color

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use colordist_algorithms::color_model::{
    likelihood_to_density, GmmParams, MahalanobisParams, ModelKind, ScoringPipeline,
};
use colordist_core::io::{read_multiband_geotiff, write_geotiff};
use colordist_core::{ErrorCategory, MultibandRaster, Raster};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "colordist")]
#[command(author, version, about = "Distance of every pixel to an annotated reference color", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Inputs and outputs shared by every model
#[derive(Args)]
struct CommonArgs {
    /// Reference image the annotation was painted on
    #[arg(short, long)]
    reference: PathBuf,
    /// Annotation image: 1 band (bright = annotated) or RGB/RGBA (red = annotated)
    #[arg(short, long)]
    annotated: PathBuf,
    /// Bands to use, comma separated and 0-based (default: all but the last)
    #[arg(short, long, value_delimiter = ',')]
    bands: Option<Vec<usize>>,
    /// Image to score
    #[arg(short, long)]
    input: PathBuf,
    /// Output distance map (GeoTIFF)
    #[arg(short, long)]
    output: PathBuf,
    /// Also write the sampled reference pixel values to this file
    #[arg(long)]
    save_pixel_values: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mahalanobis distance to a single Gaussian reference color
    Mahalanobis {
        #[command(flatten)]
        common: CommonArgs,
        /// Ridge added to the covariance diagonal (0 = none)
        #[arg(long, default_value = "0.0")]
        regularization: f64,
    },
    /// Log-likelihood under a Gaussian mixture reference color
    Gmm {
        #[command(flatten)]
        common: CommonArgs,
        /// Number of mixture components
        #[arg(short = 'k', long)]
        components: usize,
        /// Write exp(log-likelihood) instead of the log-likelihood
        #[arg(long)]
        density: bool,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_image(path: &Path, what: &str) -> Result<MultibandRaster<f64>> {
    let pb = spinner(&format!("Reading {}...", what));
    let image = read_multiband_geotiff::<f64, _>(path)
        .with_context(|| format!("Failed to read {} {}", what, path.display()))?;
    pb.finish_and_clear();
    let (min_x, min_y, max_x, max_y) = image.bounds();
    info!(
        "{}: {} x {}, {} bands, bounds ({:.6}, {:.6}) - ({:.6}, {:.6})",
        what,
        image.cols(),
        image.rows(),
        image.n_bands(),
        min_x,
        min_y,
        max_x,
        max_y
    );
    Ok(image)
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

/// Attach an actionable hint to library errors.
fn explain(err: colordist_core::Error) -> anyhow::Error {
    let hint = match err.category() {
        ErrorCategory::InsufficientSample => Some("annotate more reference pixels"),
        ErrorCategory::Numerical => {
            Some("the reference sample is degenerate; annotate more varied pixels or set a regularization")
        }
        ErrorCategory::Configuration => Some("check --bands and the annotation image"),
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::Error::new(err).context(hint),
        None => anyhow::Error::new(err),
    }
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

/// Fit `kind` on the annotated reference pixels and score the input image.
fn run(kind: ModelKind, common: &CommonArgs) -> Result<Raster<f64>> {
    info!("Model: {}", kind);
    let reference = read_image(&common.reference, "reference")?;
    let annotation = read_image(&common.annotated, "annotation")?;
    let input = read_image(&common.input, "input")?;

    let mut pipeline = ScoringPipeline::new(&kind).map_err(explain)?;

    let pb = spinner("Fitting model...");
    let sample = pipeline
        .fit(&reference, &annotation, common.bands.clone())
        .map_err(explain)?;
    pb.finish_and_clear();

    if let Some(path) = &common.save_pixel_values {
        sample
            .save_to_file(path)
            .with_context(|| format!("Failed to save pixel values to {}", path.display()))?;
    }

    let pb = spinner("Scoring image...");
    let output = pipeline.score(&input).map_err(explain)?;
    pb.finish_and_clear();

    let stats = output.statistics();
    if let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean) {
        info!(
            "Output: min {:.4}, max {:.4}, mean {:.4} ({} valid, {} nodata)",
            min, max, mean, stats.valid_count, stats.nodata_count
        );
    }
    Ok(output)
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Mahalanobis {
            common,
            regularization,
        } => {
            let start = Instant::now();
            let kind = ModelKind::Mahalanobis(MahalanobisParams { regularization });
            let distance = run(kind, &common)?;
            write_result(&distance, &common.output)?;
            done("Mahalanobis distance", &common.output, start.elapsed());
        }

        Commands::Gmm {
            common,
            components,
            density,
        } => {
            let start = Instant::now();
            let kind = ModelKind::GaussianMixture(GmmParams::new(components));
            let log_likelihood = run(kind, &common)?;
            if density {
                write_result(&likelihood_to_density(&log_likelihood), &common.output)?;
                done("GMM density", &common.output, start.elapsed());
            } else {
                write_result(&log_likelihood, &common.output)?;
                done("GMM log-likelihood", &common.output, start.elapsed());
            }
        }
    }

    Ok(())
}
