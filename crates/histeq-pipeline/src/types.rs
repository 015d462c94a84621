//! Core data types: configuration, source and result images, errors.

use serde::{Deserialize, Serialize};

use crate::bins::BinCount;
use crate::device::{BuildLog, DeviceError};
use crate::histogram::{Histogram, HistogramStrategy};
use crate::normalize::LookupTable;
use crate::profiling::TimingReport;
use crate::scan::{CumulativeHistogram, ScanAlgorithm};

/// Re-export `GrayImage` so downstream crates can reference intensity
/// buffers without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `DynamicImage` for the recombined output.
pub use image::DynamicImage;

/// Parameters of one equalization run.
///
/// Every field has a usable default and every value is valid: bin
/// counts are coerced, never rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizeConfig {
    /// Number of histogram bins.
    pub bins: BinCount,

    /// How the histogram kernel counts samples.
    pub histogram: HistogramStrategy,

    /// Which prefix sum builds the cumulative histogram.
    pub scan: ScanAlgorithm,
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Blue- and red-difference planes of a colour source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromaPlanes {
    /// Blue-difference chroma.
    pub cb: GrayImage,
    /// Red-difference chroma.
    pub cr: GrayImage,
}

/// A decoded image ready for equalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// The 8-bit intensity plane that gets equalized.
    pub luma: GrayImage,
    /// Chroma to reattach afterwards; `None` for grey sources.
    pub chroma: Option<ChromaPlanes>,
    /// Channel count of the encoded source.
    pub channels: u8,
    /// Bits per channel of the encoded source.
    pub bit_depth: u8,
}

impl SourceImage {
    /// Wrap a greyscale intensity plane.
    #[must_use]
    pub const fn from_luma(luma: GrayImage) -> Self {
        Self {
            luma,
            chroma: None,
            channels: 1,
            bit_depth: 8,
        }
    }

    /// Dimensions of the intensity plane.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.luma.width(),
            height: self.luma.height(),
        }
    }
}

/// Everything one equalization run produces.
#[derive(Debug, Clone)]
pub struct EqualizationResult {
    /// Raw per-bin counts.
    pub histogram: Histogram,
    /// Running totals, in the scan's convention.
    pub cumulative: CumulativeHistogram,
    /// Normalised lookup table.
    pub lut: LookupTable,
    /// The equalized intensity plane.
    pub equalized: GrayImage,
    /// The equalized image with any chroma reattached.
    pub output: DynamicImage,
    /// Source dimensions.
    pub dimensions: Dimensions,
    /// Configuration the run used.
    pub config: EqualizeConfig,
    /// Device profiling results.
    pub timing: TimingReport,
}

/// Errors that can occur during equalization.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The device program failed to compile.
    #[error("device program failed to build\n{0}")]
    DeviceCompile(BuildLog),

    /// The device rejected a command.
    #[error("device error: {0}")]
    Device(DeviceError),
}

impl From<DeviceError> for PipelineError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Compile(log) => Self::DeviceCompile(log),
            other => Self::Device(other),
        }
    }
}

impl PipelineError {
    /// Build diagnostics, if this is a compile failure.
    #[must_use]
    pub const fn build_log(&self) -> Option<&BuildLog> {
        match self {
            Self::DeviceCompile(log) => Some(log),
            _ => None,
        }
    }
}
