//! histeq-pipeline: histogram equalization on a compute device (sans-IO).
//!
//! Enhances contrast through four device stages:
//! histogram -> prefix sum -> normalisation -> back-projection,
//! with every device command profiled.
//!
//! This crate has **no I/O dependencies**. It decodes in-memory bytes,
//! talks to a [`ComputeDevice`], and returns structured data. Reading
//! and writing files lives in the `histeq` binary.
//!
//! The bundled [`HostDevice`] runs the device program on the host with
//! work-group semantics, so no GPU driver is required.

pub mod backproject;
pub mod bins;
pub mod color;
pub mod decode;
pub mod device;
pub mod histogram;
pub mod kernels;
pub mod normalize;
pub mod pipeline;
pub mod profiling;
pub mod scan;
pub mod types;

pub use bins::BinCount;
pub use device::{BuildLog, ComputeDevice, DeviceError, HostDevice, HostDeviceLimits};
pub use histogram::{Histogram, HistogramBuilder, HistogramStrategy};
pub use normalize::LookupTable;
pub use pipeline::{Pipeline, PipelineStage, PipelineState, Stage};
pub use profiling::{ProfilingResolution, StageProfile, StageTiming, TimingReport};
pub use scan::{CumulativeHistogram, ScanAlgorithm, ScanConvention, ScanEngine};
pub use types::{
    ChromaPlanes, Dimensions, EqualizationResult, EqualizeConfig, PipelineError, SourceImage,
};

/// Decode `image_bytes` and equalize them on a fresh [`HostDevice`].
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty,
/// [`PipelineError::ImageDecode`] if the format is unrecognized, and
/// a device error if any stage fails.
pub fn equalize(
    image_bytes: &[u8],
    config: &EqualizeConfig,
) -> Result<EqualizationResult, PipelineError> {
    let source = decode::decode(image_bytes)?;
    equalize_source(HostDevice::new(), source, config)
}

/// Equalize an already decoded source on `device`.
///
/// Pass `&mut device` to reuse the device afterwards.
///
/// # Errors
///
/// Returns [`PipelineError::DeviceCompile`] if the device program does
/// not build, or [`PipelineError::Device`] if a command fails.
pub fn equalize_source<D: ComputeDevice>(
    device: D,
    source: SourceImage,
    config: &EqualizeConfig,
) -> Result<EqualizationResult, PipelineError> {
    tracing::debug!(
        bins = %config.bins,
        histogram = config.histogram.name(),
        scan = config.scan.name(),
        "equalizing",
    );
    Pipeline::new(device, source, *config).complete()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gray_png(width: u32, height: u32, samples: Vec<u8>) -> Vec<u8> {
        let img = image::GrayImage::from_raw(width, height, samples).unwrap();
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::L8,
        )
        .ok();
        buf
    }

    #[test]
    fn equalize_empty_bytes() {
        let result = equalize(&[], &EqualizeConfig::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn equalize_png_end_to_end() {
        let png = gray_png(2, 2, vec![0, 85, 170, 255]);
        let config = EqualizeConfig {
            bins: BinCount::resolve(8),
            ..EqualizeConfig::default()
        };
        let result = equalize(&png, &config).unwrap();
        assert_eq!(
            result.dimensions,
            Dimensions {
                width: 2,
                height: 2,
            },
        );
        assert_eq!(result.histogram.total(), 4);
        assert_eq!(result.lut.levels(), [64, 64, 128, 128, 128, 191, 191, 255]);
        assert_eq!(result.equalized.as_raw(), &[64, 128, 191, 255]);
        assert_eq!(result.config, config);
    }

    #[test]
    fn equalize_source_reuses_a_borrowed_device() {
        let mut device = HostDevice::new();
        let plane = image::GrayImage::from_raw(1, 3, vec![9, 9, 200]).unwrap();
        let source = SourceImage::from_luma(plane);
        for _ in 0..2 {
            let result =
                equalize_source(&mut device, source.clone(), &EqualizeConfig::default()).unwrap();
            assert_eq!(result.histogram.total(), 3);
        }
        assert_eq!(device.live_buffers(), 0);
    }
}
