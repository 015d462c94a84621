//! Cumulative histogram to output-intensity lookup table.

use serde::{Deserialize, Serialize};

use crate::bins::BinCount;
use crate::device::{BufferId, ComputeDevice, DeviceError, KernelArg, KernelLaunch};
use crate::kernels::Kernel;
use crate::profiling::StageProfiler;
use crate::scan::CumulativeHistogram;

/// Highest output intensity.
pub const MAX_INTENSITY: u32 = 255;

/// Enqueue `normalise`: `lut[i] = min(round(cumulative[i] * 255 / total), 255)`.
///
/// `total` is the sample count rather than the last cumulative entry, so
/// exclusive scans need no special handling. A zero total yields an
/// all-zero table.
///
/// # Errors
///
/// Returns a [`DeviceError`] if the launch is rejected.
pub fn enqueue<D: ComputeDevice + ?Sized>(
    device: &mut D,
    cumulative: BufferId,
    lut: BufferId,
    bins: BinCount,
    total: u32,
    profiler: &mut StageProfiler,
) -> Result<(), DeviceError> {
    profiler.observe(device.enqueue_kernel(&KernelLaunch {
        kernel: Kernel::Normalise,
        args: &[
            KernelArg::Buffer(cumulative),
            KernelArg::Buffer(lut),
            KernelArg::Scalar(total),
            KernelArg::Scalar(MAX_INTENSITY),
        ],
        global: bins.len(),
        local: None,
    })?);
    Ok(())
}

/// Output intensity for every bin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupTable(Vec<u32>);

impl LookupTable {
    /// Wrap device output.
    #[must_use]
    pub const fn new(levels: Vec<u32>) -> Self {
        Self(levels)
    }

    /// Normalise on the host.
    #[must_use]
    pub fn from_cumulative(cumulative: &CumulativeHistogram, total: u32) -> Self {
        Self(
            cumulative
                .values()
                .iter()
                .map(|&count| crate::kernels::scale(count, total, MAX_INTENSITY))
                .collect(),
        )
    }

    /// The levels, one per bin.
    #[must_use]
    pub fn levels(&self) -> &[u32] {
        &self.0
    }

    /// Level of one bin as an 8-bit intensity; out-of-range bins map to 0.
    #[must_use]
    pub fn level(&self, bin: usize) -> u8 {
        self.0
            .get(bin)
            .map_or(0, |&level| u8::try_from(level).unwrap_or(u8::MAX))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` if levels never decrease.
    #[must_use]
    pub fn is_monotonic(&self) -> bool {
        self.0.windows(2).all(|w| w[0] <= w[1])
    }
}
