//! Histogram kernels.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use super::{Args, NdRange};
use crate::bins::bin_index;
use crate::device::DeviceError;

/// One work item per sample, each incrementing a global counter.
///
/// Work items past the end of the image do nothing, so the global size
/// may be padded.
pub(super) fn hist_simple(range: NdRange, args: &Args<'_>) -> Result<(), DeviceError> {
    let image = args.u8(0)?;
    let histogram = args.u32(1)?;
    let bins = args.scalar(2)?;
    args.require_positive(2, bins)?;
    args.require_len(1, histogram.len(), bins as usize)?;

    (0..range.global).into_par_iter().for_each(|id| {
        if let Some(sample) = image.get(id) {
            let bin = bin_index(sample.load(Ordering::Relaxed), bins);
            histogram[bin].fetch_add(1, Ordering::Relaxed);
        }
    });
    Ok(())
}

/// Per-group histogram in local memory, merged into the global one.
///
/// Each group zeroes its local bins, counts its slice of the image, then
/// the first `bins` work items add the local counts to the global
/// histogram. The group must have at least `bins` work items for every
/// local bin to be merged.
pub(super) fn hist_atomic(range: NdRange, args: &Args<'_>) -> Result<(), DeviceError> {
    let image = args.u8(0)?;
    let histogram = args.u32(1)?;
    let local_len = args.local(2)?;
    let bins = args.scalar(3)?;
    args.require_positive(3, bins)?;
    let bin_count = bins as usize;
    args.require_len(1, histogram.len(), bin_count)?;
    args.require_len(2, local_len, bin_count)?;
    if range.global > 0 && range.local < bin_count {
        return Err(args.work_group_error(range));
    }

    (0..range.groups()).into_par_iter().for_each(|group| {
        let local: Vec<AtomicU32> = (0..local_len).map(|_| AtomicU32::new(0)).collect();
        // barrier
        let base = group * range.local;
        (base..base + range.local).into_par_iter().for_each(|id| {
            if let Some(sample) = image.get(id) {
                let bin = bin_index(sample.load(Ordering::Relaxed), bins);
                local[bin].fetch_add(1, Ordering::Relaxed);
            }
        });
        // barrier
        for (global, count) in histogram.iter().zip(&local).take(bin_count) {
            let count = count.load(Ordering::Relaxed);
            if count > 0 {
                global.fetch_add(count, Ordering::Relaxed);
            }
        }
    });
    Ok(())
}
