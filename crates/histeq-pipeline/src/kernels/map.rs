//! Element-wise kernels: normalisation and back-projection.

use std::sync::atomic::Ordering;

use rayon::prelude::*;

use super::{Args, NdRange};
use crate::bins::bin_index;
use crate::device::DeviceError;

/// `round_half_up(count * max / total)`, clamped to `max`; zero when
/// `total` is zero.
pub(crate) fn scale(count: u32, total: u32, max: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let total = u64::from(total);
    let scaled = (u64::from(count) * u64::from(max) + total / 2) / total;
    u32::try_from(scaled).map_or(max, |level| level.min(max))
}

/// Scale cumulative counts into output levels.
pub(super) fn normalise(range: NdRange, args: &Args<'_>) -> Result<(), DeviceError> {
    let cumulative = args.u32(0)?;
    let lut = args.u32(1)?;
    let total = args.scalar(2)?;
    let max = args.scalar(3)?;
    args.require_len(0, cumulative.len(), range.global)?;
    args.require_len(1, lut.len(), range.global)?;

    (0..range.global).into_par_iter().for_each(|id| {
        let count = cumulative[id].load(Ordering::Relaxed);
        lut[id].store(scale(count, total, max), Ordering::Relaxed);
    });
    Ok(())
}

/// Replace every sample with the lookup-table level of its bin.
pub(super) fn back_project(range: NdRange, args: &Args<'_>) -> Result<(), DeviceError> {
    let image = args.u8(0)?;
    let output = args.u8(1)?;
    let lut = args.u32(2)?;
    let bins = args.scalar(3)?;
    args.require_positive(3, bins)?;
    args.require_len(2, lut.len(), bins as usize)?;
    args.require_len(1, output.len(), image.len())?;

    (0..range.global).into_par_iter().for_each(|id| {
        if let (Some(sample), Some(out)) = (image.get(id), output.get(id)) {
            let bin = bin_index(sample.load(Ordering::Relaxed), bins);
            let level = lut[bin].load(Ordering::Relaxed);
            out.store(u8::try_from(level).unwrap_or(u8::MAX), Ordering::Relaxed);
        }
    });
    Ok(())
}
