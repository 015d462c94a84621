//! histeq: histogram equalization from the command line.
//!
//! Loads an image, equalizes its intensity plane on the host compute
//! device, prints the intermediate arrays together with per-stage
//! device timings, and optionally writes the enhanced image.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin histeq -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use histeq_pipeline::{
    BinCount, EqualizationResult, EqualizeConfig, HistogramStrategy, HostDevice,
    HostDeviceLimits, PipelineError, ProfilingResolution, ScanAlgorithm, StageProfile,
    TimingReport,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Histogram equalization with per-stage device profiling.
///
/// Builds an intensity histogram, prefix-sums it into a cumulative
/// distribution, normalises that into a lookup table, and maps every
/// pixel through it.
#[derive(Parser)]
#[command(name = "histeq", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP, PNM, TIFF).
    image_path: PathBuf,

    /// Write the equalized image here; the format follows the extension.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Number of histogram bins. Coerced to the next power of two in
    /// 8..=256; anything unparseable becomes 8.
    #[arg(long, default_value = "256")]
    bins: String,

    /// Histogram counting strategy.
    #[arg(long, value_enum, default_value_t = Histogram::Grouped)]
    histogram: Histogram,

    /// Prefix-sum algorithm for the cumulative histogram.
    #[arg(long, value_enum, default_value_t = Scan::HillisSteele)]
    scan: Scan,

    /// Unit of the detailed timing lines.
    #[arg(long, value_enum, default_value_t = Resolution::Us)]
    resolution: Resolution,

    /// Print arrays and timings as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Full equalization config as a JSON string.
    ///
    /// When provided, `--bins`, `--histogram` and `--scan` are ignored.
    /// The JSON must be a valid `EqualizeConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Largest work group the host device accepts.
    #[arg(
        long,
        default_value_t = HostDeviceLimits::DEFAULT_MAX_WORK_GROUP_SIZE,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..),
    )]
    max_work_group_size: usize,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    /// `RUST_LOG` takes precedence when set.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Histogram strategy selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Histogram {
    /// One work item per sample, atomics on the global histogram.
    Naive,
    /// Work-group local histograms merged into the global one.
    Grouped,
}

/// Scan algorithm selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Scan {
    /// Single work item running total.
    Sequential,
    /// Step-efficient scan in global memory.
    HillisSteele,
    /// Step-efficient scan in work-group local memory.
    TiledHillisSteele,
    /// Work-efficient up-sweep/down-sweep (exclusive).
    Blelloch,
}

/// Timing unit selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Resolution {
    /// Nanoseconds.
    Ns,
    /// Microseconds.
    Us,
    /// Milliseconds.
    Ms,
    /// Seconds.
    S,
}

impl From<Histogram> for HistogramStrategy {
    fn from(h: Histogram) -> Self {
        match h {
            Histogram::Naive => Self::NaiveGlobal,
            Histogram::Grouped => Self::GroupedAtomic,
        }
    }
}

impl From<Scan> for ScanAlgorithm {
    fn from(s: Scan) -> Self {
        match s {
            Scan::Sequential => Self::Sequential,
            Scan::HillisSteele => Self::HillisSteele,
            Scan::TiledHillisSteele => Self::TiledHillisSteele,
            Scan::Blelloch => Self::Blelloch,
        }
    }
}

impl From<Resolution> for ProfilingResolution {
    fn from(r: Resolution) -> Self {
        match r {
            Resolution::Ns => Self::Nanoseconds,
            Resolution::Us => Self::Microseconds,
            Resolution::Ms => Self::Milliseconds,
            Resolution::S => Self::Seconds,
        }
    }
}

/// Build an [`EqualizeConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<EqualizeConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(EqualizeConfig {
        bins: BinCount::parse(&cli.bins),
        histogram: cli.histogram.into(),
        scan: cli.scan.into(),
    })
}

/// Default log filter for a `-v` count.
const fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_tracing(verbose: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// JSON shape of one run.
#[derive(Serialize)]
struct JsonOutput<'a> {
    config: &'a EqualizeConfig,
    width: u32,
    height: u32,
    histogram: &'a [u32],
    cumulative: &'a [u32],
    convention: histeq_pipeline::ScanConvention,
    lookup_table: &'a [u32],
    resolution: ProfilingResolution,
    timing: &'a TimingReport,
}

impl<'a> JsonOutput<'a> {
    fn new(result: &'a EqualizationResult, resolution: ProfilingResolution) -> Self {
        Self {
            config: &result.config,
            width: result.dimensions.width,
            height: result.dimensions.height,
            histogram: result.histogram.counts(),
            cumulative: result.cumulative.values(),
            convention: result.cumulative.convention(),
            lookup_table: result.lut.levels(),
            resolution,
            timing: &result.timing,
        }
    }
}

fn format_array(values: &[u32]) -> String {
    values
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_stage(profile: &StageProfile, resolution: ProfilingResolution) {
    println!("{}", profile.summary_line());
    println!("  {}", profile.detailed(resolution));
}

fn print_text(result: &EqualizationResult, resolution: ProfilingResolution) {
    println!("Running on {}", result.timing.device);
    println!(
        "Image: {}x{}, {} bins, {} histogram, {} scan",
        result.dimensions.width,
        result.dimensions.height,
        result.config.bins,
        result.config.histogram.name(),
        result.config.scan.name(),
    );
    println!();

    println!("Histogram:");
    println!("{}", format_array(result.histogram.counts()));
    println!();
    println!("Cumulative histogram ({:?}):", result.cumulative.convention());
    println!("{}", format_array(result.cumulative.values()));
    println!();
    println!("Normalised histogram:");
    println!("{}", format_array(result.lut.levels()));
    println!();

    for profile in &result.timing.stages {
        print_stage(profile, resolution);
    }
    print_stage(&result.timing.transfers, resolution);
    println!();
    println!("{}", result.timing.report(resolution));
}

/// Compile failures carry the device build log in their message.
fn report_error(err: &PipelineError) {
    eprintln!("Pipeline error: {err}");
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let resolution = ProfilingResolution::from(cli.resolution);
    tracing::debug!(?config, %resolution, "resolved configuration");

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    let source = match histeq_pipeline::decode::decode(&image_bytes) {
        Ok(source) => source,
        Err(e) => {
            report_error(&e);
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes, {} channel(s), {} bit)",
        cli.image_path.display(),
        image_bytes.len(),
        source.channels,
        source.bit_depth,
    );

    let device = HostDevice::new().with_limits(HostDeviceLimits {
        max_work_group_size: cli.max_work_group_size,
        ..HostDeviceLimits::default()
    });

    let result = match histeq_pipeline::equalize_source(device, source, &config) {
        Ok(result) => result,
        Err(e) => {
            report_error(&e);
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&JsonOutput::new(&result, resolution)) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing results: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_text(&result, resolution);
    }

    if let Some(ref output_path) = cli.output {
        match result.output.save(output_path) {
            Ok(()) => eprintln!("Equalized image written to {}", output_path.display()),
            Err(e) => {
                eprintln!("Error writing {}: {e}", output_path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
