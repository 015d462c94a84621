//! Cumulative histogram via parallel prefix sum.
//!
//! This module defines the [`ScanEngine`] trait and the [`ScanAlgorithm`]
//! enum selecting one of four device scans:
//!
//! | Algorithm | Kernels | Work | Steps | Convention |
//! |---|---|---|---|---|
//! | [`Sequential`](ScanAlgorithm::Sequential) | `scan_simple` | n | n | inclusive |
//! | [`HillisSteele`](ScanAlgorithm::HillisSteele) | `scan_hs` | n log n | log n | inclusive |
//! | [`TiledHillisSteele`](ScanAlgorithm::TiledHillisSteele) | `scan_local_hs` | n log n | log n | inclusive |
//! | [`Blelloch`](ScanAlgorithm::Blelloch) | `histo_copy`, `scan_bl` | 2n | 2 log n | exclusive |
//!
//! After accounting for the convention, all four produce the same
//! cumulative distribution.

use serde::{Deserialize, Serialize};

use crate::bins::BinCount;
use crate::device::{BufferId, ComputeDevice, DeviceError, KernelArg, KernelLaunch};
use crate::histogram::Histogram;
use crate::kernels::Kernel;
use crate::profiling::StageProfiler;

/// Whether entry `i` of a scan includes input `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanConvention {
    /// `out[i] = in[0] + ... + in[i]`.
    Inclusive,
    /// `out[i] = in[0] + ... + in[i - 1]`, `out[0] = 0`.
    Exclusive,
}

/// Selects which prefix-sum algorithm builds the cumulative histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanAlgorithm {
    /// A single work item walks the array.
    Sequential,

    /// Step-efficient scan, double-buffered in global memory.
    #[default]
    HillisSteele,

    /// Hillis-Steele staged through local memory in one work group.
    TiledHillisSteele,

    /// Work-efficient up-sweep/down-sweep scan, in place.
    Blelloch,
}

impl ScanAlgorithm {
    /// Every algorithm, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Sequential,
        Self::HillisSteele,
        Self::TiledHillisSteele,
        Self::Blelloch,
    ];

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::HillisSteele => "Hillis-Steele",
            Self::TiledHillisSteele => "tiled Hillis-Steele",
            Self::Blelloch => "Blelloch",
        }
    }
}

/// Trait for prefix-sum strategies.
///
/// Engines only enqueue kernels; the caller reads the cumulative buffer
/// back once the stage is complete.
pub trait ScanEngine {
    /// Convention of the produced cumulative histogram.
    fn convention(&self) -> ScanConvention;

    /// Scan `histogram` into `cumulative`. `scratch` must hold `bins`
    /// elements; the histogram buffer is left unmodified.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if a launch is rejected.
    fn enqueue<D: ComputeDevice + ?Sized>(
        &self,
        device: &mut D,
        histogram: BufferId,
        cumulative: BufferId,
        scratch: BufferId,
        bins: BinCount,
        profiler: &mut StageProfiler,
    ) -> Result<(), DeviceError>;
}

impl ScanEngine for ScanAlgorithm {
    fn convention(&self) -> ScanConvention {
        match self {
            Self::Blelloch => ScanConvention::Exclusive,
            Self::Sequential | Self::HillisSteele | Self::TiledHillisSteele => {
                ScanConvention::Inclusive
            }
        }
    }

    fn enqueue<D: ComputeDevice + ?Sized>(
        &self,
        device: &mut D,
        histogram: BufferId,
        cumulative: BufferId,
        scratch: BufferId,
        bins: BinCount,
        profiler: &mut StageProfiler,
    ) -> Result<(), DeviceError> {
        let n = bins.len();
        match *self {
            Self::Sequential => {
                profiler.observe(device.enqueue_kernel(&KernelLaunch {
                    kernel: Kernel::ScanSimple,
                    args: &[KernelArg::Buffer(histogram), KernelArg::Buffer(cumulative)],
                    global: 1,
                    local: None,
                })?);
            }
            Self::HillisSteele => {
                profiler.observe(device.enqueue_kernel(&KernelLaunch {
                    kernel: Kernel::ScanHs,
                    args: &[
                        KernelArg::Buffer(histogram),
                        KernelArg::Buffer(cumulative),
                        KernelArg::Buffer(scratch),
                    ],
                    global: n,
                    local: None,
                })?);
            }
            Self::TiledHillisSteele => {
                profiler.observe(device.enqueue_kernel(&KernelLaunch {
                    kernel: Kernel::ScanLocalHs,
                    args: &[
                        KernelArg::Buffer(histogram),
                        KernelArg::Buffer(cumulative),
                        KernelArg::Local(n),
                        KernelArg::Local(n),
                    ],
                    global: n,
                    local: Some(n),
                })?);
            }
            Self::Blelloch => {
                profiler.observe(device.enqueue_kernel(&KernelLaunch {
                    kernel: Kernel::HistoCopy,
                    args: &[KernelArg::Buffer(histogram), KernelArg::Buffer(cumulative)],
                    global: n,
                    local: None,
                })?);
                profiler.observe(device.enqueue_kernel(&KernelLaunch {
                    kernel: Kernel::ScanBl,
                    args: &[KernelArg::Buffer(cumulative)],
                    global: n,
                    local: None,
                })?);
            }
        }
        Ok(())
    }
}

/// Running totals of a [`Histogram`], tagged with their convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeHistogram {
    values: Vec<u32>,
    convention: ScanConvention,
}

impl CumulativeHistogram {
    /// Wrap scan output.
    #[must_use]
    pub const fn new(values: Vec<u32>, convention: ScanConvention) -> Self {
        Self { values, convention }
    }

    /// Scan on the host.
    #[must_use]
    pub fn from_histogram(histogram: &Histogram, convention: ScanConvention) -> Self {
        let mut running = 0u32;
        let values = histogram
            .counts()
            .iter()
            .map(|&count| {
                let before = running;
                running = running.wrapping_add(count);
                match convention {
                    ScanConvention::Inclusive => running,
                    ScanConvention::Exclusive => before,
                }
            })
            .collect();
        Self { values, convention }
    }

    /// The running totals.
    #[must_use]
    pub fn values(&self) -> &[u32] {
        &self.values
    }

    /// The convention the totals follow.
    #[must_use]
    pub const fn convention(&self) -> ScanConvention {
        self.convention
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `true` if no entry is smaller than its predecessor.
    #[must_use]
    pub fn is_monotonic(&self) -> bool {
        self.values.windows(2).all(|w| w[0] <= w[1])
    }

    /// Sum of the source histogram.
    ///
    /// For an inclusive scan this is the last entry; an exclusive scan
    /// drops the last bin, so it is added back from `source`.
    #[must_use]
    pub fn total(&self, source: &Histogram) -> u64 {
        let last = self.values.last().map_or(0, |&v| u64::from(v));
        match self.convention {
            ScanConvention::Inclusive => last,
            ScanConvention::Exclusive => {
                last + source.counts().last().map_or(0, |&c| u64::from(c))
            }
        }
    }

    /// The inclusive form of these totals.
    #[must_use]
    pub fn to_inclusive(&self, source: &Histogram) -> Self {
        match self.convention {
            ScanConvention::Inclusive => self.clone(),
            ScanConvention::Exclusive => Self {
                values: self
                    .values
                    .iter()
                    .zip(source.counts())
                    .map(|(&before, &count)| before.wrapping_add(count))
                    .collect(),
                convention: ScanConvention::Inclusive,
            },
        }
    }
}
