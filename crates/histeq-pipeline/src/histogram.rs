//! Intensity histogram construction on the compute device.
//!
//! This module defines the [`HistogramBuilder`] trait for pluggable
//! counting strategies and the [`HistogramStrategy`] enum for selecting
//! one at runtime. Both strategies produce identical counts; they differ
//! in how much contention the global counters see.

use serde::{Deserialize, Serialize};

use crate::bins::{BinCount, bin_index};
use crate::device::{BufferId, ComputeDevice, DeviceError, KernelArg, KernelLaunch};
use crate::kernels::Kernel;
use crate::profiling::StageProfiler;

/// Selects how the histogram kernel counts samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistogramStrategy {
    /// One work item per sample, atomic increments on the global
    /// histogram (`hist_simple`).
    NaiveGlobal,

    /// Work groups of `bins` items count into local memory, then merge
    /// into the global histogram (`hist_atomic`).
    #[default]
    GroupedAtomic,
}

impl HistogramStrategy {
    /// Every strategy, in declaration order.
    pub const ALL: [Self; 2] = [Self::NaiveGlobal, Self::GroupedAtomic];

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NaiveGlobal => "naive global",
            Self::GroupedAtomic => "grouped atomic",
        }
    }
}

/// Trait for histogram construction strategies.
///
/// The histogram buffer must already be zero-filled; builders only
/// enqueue kernels and leave the read-back to the caller.
pub trait HistogramBuilder {
    /// Count `samples` values of `image` into `histogram`.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the launch is rejected.
    fn enqueue<D: ComputeDevice + ?Sized>(
        &self,
        device: &mut D,
        image: BufferId,
        histogram: BufferId,
        samples: usize,
        bins: BinCount,
        profiler: &mut StageProfiler,
    ) -> Result<(), DeviceError>;
}

impl HistogramBuilder for HistogramStrategy {
    fn enqueue<D: ComputeDevice + ?Sized>(
        &self,
        device: &mut D,
        image: BufferId,
        histogram: BufferId,
        samples: usize,
        bins: BinCount,
        profiler: &mut StageProfiler,
    ) -> Result<(), DeviceError> {
        let timing = match *self {
            Self::NaiveGlobal => device.enqueue_kernel(&KernelLaunch {
                kernel: Kernel::HistSimple,
                args: &[
                    KernelArg::Buffer(image),
                    KernelArg::Buffer(histogram),
                    KernelArg::Scalar(bins.get()),
                ],
                global: samples,
                local: None,
            })?,
            Self::GroupedAtomic => device.enqueue_kernel(&KernelLaunch {
                kernel: Kernel::HistAtomic,
                args: &[
                    KernelArg::Buffer(image),
                    KernelArg::Buffer(histogram),
                    KernelArg::Local(bins.len()),
                    KernelArg::Scalar(bins.get()),
                ],
                global: samples.next_multiple_of(bins.len()),
                local: Some(bins.len()),
            })?,
        };
        profiler.observe(timing);
        Ok(())
    }
}

/// Per-bin sample counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram(Vec<u32>);

impl Histogram {
    /// Wrap raw counts.
    #[must_use]
    pub const fn new(counts: Vec<u32>) -> Self {
        Self(counts)
    }

    /// Count samples on the host.
    #[must_use]
    pub fn from_samples(samples: &[u8], bins: BinCount) -> Self {
        let mut counts = vec![0u32; bins.len()];
        for &sample in samples {
            counts[bin_index(sample, bins.get())] += 1;
        }
        Self(counts)
    }

    /// The counts, one per bin.
    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.0
    }

    /// Number of bins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if there are no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.iter().map(|&c| u64::from(c)).sum()
    }

    /// Consume into the raw counts.
    #[must_use]
    pub fn into_inner(self) -> Vec<u32> {
        self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::{BufferDesc, ElementType, HostDevice, MemAccess};

    fn run(strategy: HistogramStrategy, samples: &[u8], bins: BinCount) -> Histogram {
        let mut device = HostDevice::new();
        device.build_program().unwrap();
        let image = device
            .create_buffer(&BufferDesc {
                label: "image",
                access: MemAccess::ReadOnly,
                element: ElementType::U8,
                len: samples.len(),
            })
            .unwrap();
        let histogram = device
            .create_buffer(&BufferDesc {
                label: "histogram",
                access: MemAccess::ReadWrite,
                element: ElementType::U32,
                len: bins.len(),
            })
            .unwrap();
        device.write_u8(image, samples).unwrap();
        let mut profiler = StageProfiler::new("Histogram");
        strategy
            .enqueue(&mut device, image, histogram, samples.len(), bins, &mut profiler)
            .unwrap();
        assert_eq!(profiler.profile().submissions, 1);
        let mut counts = vec![0; bins.len()];
        device.read_u32(histogram, &mut counts).unwrap();
        Histogram::new(counts)
    }

    fn gradient(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 37) % 256) as u8).collect()
    }

    #[test]
    fn default_is_grouped_atomic() {
        assert_eq!(HistogramStrategy::default(), HistogramStrategy::GroupedAtomic);
    }

    #[test]
    fn strategies_agree_with_host_count() {
        let samples = gradient(1000);
        for bins in BinCount::CANONICAL.map(|b| BinCount::resolve(i64::from(b))) {
            let expected = Histogram::from_samples(&samples, bins);
            for strategy in HistogramStrategy::ALL {
                let actual = run(strategy, &samples, bins);
                assert_eq!(actual, expected, "{} with {bins} bins", strategy.name());
                assert_eq!(actual.total(), 1000);
            }
        }
    }

    #[test]
    fn four_pixel_image_with_eight_bins() {
        let bins = BinCount::resolve(8);
        for strategy in HistogramStrategy::ALL {
            let histogram = run(strategy, &[0, 85, 170, 255], bins);
            assert_eq!(histogram.counts(), [1, 0, 1, 0, 0, 1, 0, 1]);
        }
    }

    #[test]
    fn empty_image_has_all_zero_bins() {
        let bins = BinCount::resolve(16);
        for strategy in HistogramStrategy::ALL {
            let histogram = run(strategy, &[], bins);
            assert_eq!(histogram.len(), 16);
            assert_eq!(histogram.total(), 0);
        }
    }

    #[test]
    fn serde_names_are_snake_case() {
        let json = serde_json::to_string(&HistogramStrategy::NaiveGlobal).unwrap();
        assert_eq!(json, "\"naive_global\"");
    }
}
