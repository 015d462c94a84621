//! Prefix-sum kernels.
//!
//! Sums use wrapping arithmetic: counts are bounded by the sample count,
//! which fits a `u32` for any image this crate can decode.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use super::{Args, NdRange};
use crate::device::DeviceError;

fn load(cell: &AtomicU32) -> u32 {
    cell.load(Ordering::Relaxed)
}

fn store(cell: &AtomicU32, value: u32) {
    cell.store(value, Ordering::Relaxed);
}

/// Inclusive scan done entirely by work item 0.
pub(super) fn scan_simple(range: NdRange, args: &Args<'_>) -> Result<(), DeviceError> {
    let input = args.u32(0)?;
    let output = args.u32(1)?;
    args.require_len(1, output.len(), input.len())?;

    if range.global == 0 {
        return Ok(());
    }
    let mut running = 0u32;
    for (src, dst) in input.iter().zip(output) {
        running = running.wrapping_add(load(src));
        store(dst, running);
    }
    Ok(())
}

/// Hillis-Steele inclusive scan, double-buffered through `scratch`.
///
/// The input is copied into the output, then each step reads one of
/// output/scratch and writes the other, swapping roles after a global
/// barrier. The input buffer is never written.
pub(super) fn scan_hs(range: NdRange, args: &Args<'_>) -> Result<(), DeviceError> {
    let input = args.u32(0)?;
    let output = args.u32(1)?;
    let scratch = args.u32(2)?;
    let n = range.global;
    args.require_len(0, input.len(), n)?;
    args.require_len(1, output.len(), n)?;
    args.require_len(2, scratch.len(), n)?;

    (0..n)
        .into_par_iter()
        .for_each(|id| store(&output[id], load(&input[id])));

    let (mut src, mut dst) = (output, scratch);
    let mut stride = 1;
    while stride < n {
        (0..n).into_par_iter().for_each(|id| {
            let value = if id >= stride {
                load(&src[id]).wrapping_add(load(&src[id - stride]))
            } else {
                load(&src[id])
            };
            store(&dst[id], value);
        });
        // barrier
        std::mem::swap(&mut src, &mut dst);
        stride *= 2;
    }

    if !std::ptr::eq(src, output) {
        (0..n)
            .into_par_iter()
            .for_each(|id| store(&output[id], load(&src[id])));
    }
    Ok(())
}

/// Hillis-Steele inclusive scan in two local ping-pong buffers.
///
/// Every work group scans its own tile of `local` elements; launched as
/// a single group this is a full scan.
pub(super) fn scan_local_hs(range: NdRange, args: &Args<'_>) -> Result<(), DeviceError> {
    let input = args.u32(0)?;
    let output = args.u32(1)?;
    let a_len = args.local(2)?;
    let b_len = args.local(3)?;
    let tile = range.local;
    args.require_len(2, a_len, tile)?;
    args.require_len(3, b_len, tile)?;

    (0..range.groups()).into_par_iter().for_each(|group| {
        let base = group * tile;
        let mut a: Vec<u32> = (0..a_len)
            .map(|lid| if lid < tile { input.get(base + lid).map_or(0, load) } else { 0 })
            .collect();
        let mut b = vec![0u32; b_len];
        // barrier
        let mut stride = 1;
        while stride < tile {
            for (lid, slot) in b.iter_mut().enumerate().take(tile) {
                *slot = if lid >= stride {
                    a[lid].wrapping_add(a[lid - stride])
                } else {
                    a[lid]
                };
            }
            // barrier
            std::mem::swap(&mut a, &mut b);
            stride *= 2;
        }
        for (lid, &value) in a.iter().enumerate().take(tile) {
            if let Some(cell) = output.get(base + lid) {
                store(cell, value);
            }
        }
    });
    Ok(())
}

/// Element-wise copy of the first `global` elements.
pub(super) fn histo_copy(range: NdRange, args: &Args<'_>) -> Result<(), DeviceError> {
    let source = args.u32(0)?;
    let destination = args.u32(1)?;
    args.require_len(0, source.len(), range.global)?;
    args.require_len(1, destination.len(), range.global)?;

    (0..range.global)
        .into_par_iter()
        .for_each(|id| store(&destination[id], load(&source[id])));
    Ok(())
}

/// Blelloch exclusive scan in place.
///
/// Up-sweep builds partial sums in a balanced tree, the root is cleared,
/// and the down-sweep distributes prefixes back to the leaves. The
/// length must be a power of two.
pub(super) fn scan_bl(range: NdRange, args: &Args<'_>) -> Result<(), DeviceError> {
    let data = args.u32(0)?;
    let n = range.global;
    args.require_len(0, data.len(), n)?;
    if n == 0 {
        return Ok(());
    }
    if !n.is_power_of_two() {
        return Err(args.work_group_error(range));
    }

    let mut stride = 1;
    while stride < n {
        (0..n).into_par_iter().for_each(|id| {
            if (id + 1) % (2 * stride) == 0 {
                let sum = load(&data[id]).wrapping_add(load(&data[id - stride]));
                store(&data[id], sum);
            }
        });
        // barrier
        stride *= 2;
    }

    store(&data[n - 1], 0);

    let mut stride = n / 2;
    while stride > 0 {
        (0..n).into_par_iter().for_each(|id| {
            if (id + 1) % (2 * stride) == 0 {
                let left = load(&data[id - stride]);
                let right = load(&data[id]);
                store(&data[id - stride], right);
                store(&data[id], right.wrapping_add(left));
            }
        });
        // barrier
        stride /= 2;
    }
    Ok(())
}
