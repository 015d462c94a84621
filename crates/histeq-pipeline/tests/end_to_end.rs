//! Integration tests: whole runs through the public API, failure
//! handling on misbehaving devices, and agreement with `imageproc`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use histeq_pipeline::device::{BufferDesc, BufferId, KernelLaunch};
use histeq_pipeline::{
    BinCount, BuildLog, ComputeDevice, DeviceError, EqualizeConfig, HistogramStrategy,
    HostDevice, Pipeline, PipelineError, PipelineState, ScanAlgorithm, ScanConvention,
    SourceImage, Stage, StageTiming, equalize_source,
};
use image::GrayImage;

fn four_levels() -> SourceImage {
    SourceImage::from_luma(GrayImage::from_raw(2, 2, vec![0, 85, 170, 255]).unwrap())
}

/// A deterministic but uneven test card.
fn gradient(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        image::Luma([u8::try_from((x * x + 3 * y) % 200 + 20).unwrap()])
    })
}

fn every_config(bins: BinCount) -> impl Iterator<Item = EqualizeConfig> {
    HistogramStrategy::ALL.into_iter().flat_map(move |histogram| {
        ScanAlgorithm::ALL.into_iter().map(move |scan| EqualizeConfig {
            bins,
            histogram,
            scan,
        })
    })
}

// ───────────────────────────── Whole runs ────────────────────────────

#[test]
fn four_levels_in_eight_bins_under_every_configuration() {
    for config in every_config(BinCount::resolve(8)) {
        let result = equalize_source(HostDevice::new(), four_levels(), &config).unwrap();
        let label = format!("{} / {}", config.histogram.name(), config.scan.name());

        assert_eq!(result.histogram.counts(), [1, 0, 1, 0, 0, 1, 0, 1], "{label}");
        match result.cumulative.convention() {
            ScanConvention::Inclusive => {
                assert_eq!(result.cumulative.values(), [1, 1, 2, 2, 2, 3, 3, 4], "{label}");
                assert_eq!(result.lut.levels(), [64, 64, 128, 128, 128, 191, 191, 255], "{label}");
                assert_eq!(result.equalized.as_raw(), &[64, 128, 191, 255], "{label}");
            }
            ScanConvention::Exclusive => {
                assert_eq!(result.cumulative.values(), [0, 1, 1, 2, 2, 2, 3, 3], "{label}");
                assert_eq!(result.lut.levels(), [0, 64, 64, 128, 128, 128, 191, 191], "{label}");
                assert_eq!(result.equalized.as_raw(), &[0, 64, 128, 191], "{label}");
            }
        }
        assert_eq!(result.timing.stages.len(), 4, "{label}");
    }
}

#[test]
fn configurations_agree_on_the_cumulative_distribution() {
    let source = SourceImage::from_luma(gradient(37, 23));
    for bins in BinCount::CANONICAL.map(i64::from).map(BinCount::resolve) {
        let reference = equalize_source(
            HostDevice::new(),
            source.clone(),
            &EqualizeConfig {
                bins,
                histogram: HistogramStrategy::NaiveGlobal,
                scan: ScanAlgorithm::Sequential,
            },
        )
        .unwrap();
        for config in every_config(bins) {
            let result = equalize_source(HostDevice::new(), source.clone(), &config).unwrap();
            assert_eq!(result.histogram, reference.histogram, "{bins} bins");
            assert_eq!(
                result.cumulative.to_inclusive(&result.histogram),
                reference.cumulative,
                "{bins} bins, {}",
                config.scan.name(),
            );
            assert_eq!(result.cumulative.total(&result.histogram), 37 * 23);
        }
    }
}

#[test]
fn empty_image_yields_zero_arrays() {
    for config in every_config(BinCount::resolve(16)) {
        let source = SourceImage::from_luma(GrayImage::new(0, 0));
        let result = equalize_source(HostDevice::new(), source, &config).unwrap();
        assert_eq!(result.histogram.counts(), [0; 16]);
        assert!(result.cumulative.values().iter().all(|&v| v == 0));
        assert_eq!(result.lut.levels(), [0; 16]);
        assert!(result.equalized.as_raw().is_empty());
    }
}

#[test]
fn uniform_image_maps_every_pixel_to_white() {
    let source = SourceImage::from_luma(GrayImage::from_pixel(9, 9, image::Luma([100])));
    let result = equalize_source(HostDevice::new(), source, &EqualizeConfig::default()).unwrap();
    assert_eq!(result.histogram.counts()[100], 81);
    assert!(result.equalized.pixels().all(|p| p.0[0] == 255));
}

#[test]
fn equalization_spreads_a_narrow_range() {
    let narrow = GrayImage::from_fn(64, 4, |x, _| {
        image::Luma([u8::try_from(100 + x / 8).unwrap()])
    });
    let source = SourceImage::from_luma(narrow);
    let result = equalize_source(HostDevice::new(), source, &EqualizeConfig::default()).unwrap();
    let (lo, hi) = result
        .equalized
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    assert_eq!(hi, 255);
    assert!(lo <= 32, "darkest level {lo}");
}

// ───────────────────────────── Device failures ───────────────────────

/// Host device with injectable faults.
#[derive(Default)]
struct ScriptedDevice {
    inner: HostDevice,
    compile_error: Option<BuildLog>,
    fail_read_on: Option<usize>,
    reads: usize,
    buffers_created: usize,
}

impl ScriptedDevice {
    fn broken_compiler() -> Self {
        Self {
            compile_error: Some(BuildLog {
                status: "build error".to_string(),
                options: "-cl-std=CL1.2".to_string(),
                log: "kernels.cl:4:5: error: use of undeclared identifier 'bins'".to_string(),
            }),
            ..Self::default()
        }
    }

    fn flaky_reads(fail_on: usize) -> Self {
        Self {
            fail_read_on: Some(fail_on),
            ..Self::default()
        }
    }
}

impl ComputeDevice for ScriptedDevice {
    fn describe(&self) -> String {
        format!("scripted {}", self.inner.describe())
    }

    fn build_program(&mut self) -> Result<(), DeviceError> {
        match &self.compile_error {
            Some(log) => Err(DeviceError::Compile(log.clone())),
            None => self.inner.build_program(),
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError> {
        self.buffers_created += 1;
        self.inner.create_buffer(desc)
    }

    fn write_u8(&mut self, buffer: BufferId, data: &[u8]) -> Result<StageTiming, DeviceError> {
        self.inner.write_u8(buffer, data)
    }

    fn write_u32(&mut self, buffer: BufferId, data: &[u32]) -> Result<StageTiming, DeviceError> {
        self.inner.write_u32(buffer, data)
    }

    fn read_u8(&mut self, buffer: BufferId, out: &mut [u8]) -> Result<StageTiming, DeviceError> {
        self.inner.read_u8(buffer, out)
    }

    fn read_u32(&mut self, buffer: BufferId, out: &mut [u32]) -> Result<StageTiming, DeviceError> {
        self.reads += 1;
        if self.fail_read_on == Some(self.reads) {
            return Err(DeviceError::UnknownBuffer(buffer));
        }
        self.inner.read_u32(buffer, out)
    }

    fn enqueue_kernel(&mut self, launch: &KernelLaunch<'_>) -> Result<StageTiming, DeviceError> {
        self.inner.enqueue_kernel(launch)
    }

    fn release(&mut self, buffer: BufferId) {
        self.inner.release(buffer);
    }
}

#[test]
fn compile_failure_surfaces_the_build_log_and_allocates_nothing() {
    let mut device = ScriptedDevice::broken_compiler();
    let err = equalize_source(&mut device, four_levels(), &EqualizeConfig::default()).unwrap_err();

    let PipelineError::DeviceCompile(log) = &err else {
        unreachable!("expected a compile error, got {err:?}");
    };
    assert_eq!(Some(log), device.compile_error.as_ref());
    assert!(err.to_string().contains("undeclared identifier"));
    assert_eq!(device.buffers_created, 0);
    assert_eq!(device.inner.live_buffers(), 0);
}

#[test]
fn compile_failure_stops_the_typed_chain_at_idle() {
    let device = ScriptedDevice::broken_compiler();
    let result = Pipeline::new(device, four_levels(), EqualizeConfig::default()).allocate();
    assert!(matches!(result, Err(PipelineError::DeviceCompile(_))));
}

#[test]
fn failed_read_back_releases_every_buffer() {
    let mut device = ScriptedDevice::flaky_reads(2);

    let mut visited = Vec::new();
    let mut stage: Stage<_> =
        Pipeline::new(&mut device, four_levels(), EqualizeConfig::default()).into();
    while !stage.state().is_terminal() {
        visited.push(stage.state());
        stage = stage.advance();
    }

    assert_eq!(stage.state(), PipelineState::Failed);
    assert!(matches!(
        stage.error(),
        Some(PipelineError::Device(DeviceError::UnknownBuffer(_)))
    ));
    assert_eq!(
        visited,
        [
            PipelineState::Idle,
            PipelineState::BuffersAllocated,
            PipelineState::HistogramReady,
        ],
    );
    assert!(matches!(stage.complete(), Err(PipelineError::Device(_))));
    assert_eq!(device.inner.live_buffers(), 0);
}

#[test]
fn device_survives_a_failed_run() {
    let mut device = ScriptedDevice::flaky_reads(1);
    assert!(equalize_source(&mut device, four_levels(), &EqualizeConfig::default()).is_err());
    let result = equalize_source(&mut device, four_levels(), &EqualizeConfig::default()).unwrap();
    assert_eq!(result.histogram.total(), 4);
    assert_eq!(device.inner.live_buffers(), 0);
}

#[test]
fn abandoning_a_typed_stage_releases_its_buffers() {
    let mut device = HostDevice::new();
    let histogram = Pipeline::new(&mut device, four_levels(), EqualizeConfig::default())
        .allocate()
        .unwrap()
        .build_histogram()
        .unwrap();
    assert_eq!(histogram.histogram().total(), 4);
    drop(histogram);
    assert_eq!(device.live_buffers(), 0);

    let result = equalize_source(&mut device, four_levels(), &EqualizeConfig::default()).unwrap();
    assert_eq!(result.histogram.total(), 4);
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn abandoning_a_dynamic_stage_releases_its_buffers() {
    let mut device = HostDevice::new();
    let mut stage: Stage<_> =
        Pipeline::new(&mut device, four_levels(), EqualizeConfig::default()).into();
    for _ in 0..4 {
        stage = stage.advance();
    }
    assert_eq!(stage.state(), PipelineState::NormalizedReady);
    drop(stage);
    assert_eq!(device.live_buffers(), 0);
}

// ───────────────────────────── Reference comparisons ─────────────────

#[test]
fn full_resolution_histograms_match_imageproc() {
    let image = gradient(61, 17);
    let config = EqualizeConfig {
        bins: BinCount::MAX,
        ..EqualizeConfig::default()
    };
    let source = SourceImage::from_luma(image.clone());
    let result = equalize_source(HostDevice::new(), source, &config).unwrap();

    let expected = imageproc::stats::histogram(&image).channels[0];
    assert_eq!(result.histogram.counts(), expected.as_slice());

    let expected = imageproc::stats::cumulative_histogram(&image).channels[0];
    assert_eq!(result.cumulative.values(), expected.as_slice());
}

#[test]
fn equalized_output_is_within_one_level_of_imageproc() {
    let image = gradient(61, 17);
    let result = equalize_source(
        HostDevice::new(),
        SourceImage::from_luma(image.clone()),
        &EqualizeConfig::default(),
    )
    .unwrap();
    let expected = imageproc::contrast::equalize_histogram(&image);

    for (ours, theirs) in result.equalized.pixels().zip(expected.pixels()) {
        assert!(
            ours.0[0].abs_diff(theirs.0[0]) <= 1,
            "{} vs {}",
            ours.0[0],
            theirs.0[0],
        );
    }
}
