//! The device program: every kernel the pipeline can enqueue.
//!
//! Kernels are written as data-parallel bodies over an index space. A
//! work item only sees its global id (and, for grouped kernels, its
//! group and local id); barriers are the boundaries between parallel
//! passes. Global memory is a slice of atomics, local memory is a
//! per-group scratch vector.

mod histogram;
mod map;
mod scan;

use std::sync::atomic::{AtomicU8, AtomicU32};

use crate::device::DeviceError;

pub(crate) use map::scale;

/// Kernels in the device program, by entry-point name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Global-atomic histogram: `(image, histogram, bins)`.
    HistSimple,
    /// Work-group local histogram merged atomically:
    /// `(image, histogram, local[bins], bins)`.
    HistAtomic,
    /// Sequential inclusive scan on one work item: `(histogram, cumulative)`.
    ScanSimple,
    /// Double-buffered Hillis-Steele inclusive scan:
    /// `(histogram, cumulative, scratch)`.
    ScanHs,
    /// Hillis-Steele inclusive scan in local memory, one tile per group:
    /// `(histogram, cumulative, local[n], local[n])`.
    ScanLocalHs,
    /// Element-wise copy: `(source, destination)`.
    HistoCopy,
    /// In-place Blelloch exclusive scan: `(data)`.
    ScanBl,
    /// Cumulative counts to 8-bit levels: `(cumulative, lut, total, max)`.
    Normalise,
    /// Per-pixel lookup: `(image, output, lut, bins)`.
    BackProject,
}

impl Kernel {
    /// Every kernel the program defines.
    pub const ALL: [Self; 9] = [
        Self::HistSimple,
        Self::HistAtomic,
        Self::ScanSimple,
        Self::ScanHs,
        Self::ScanLocalHs,
        Self::HistoCopy,
        Self::ScanBl,
        Self::Normalise,
        Self::BackProject,
    ];

    /// Entry-point name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::HistSimple => "hist_simple",
            Self::HistAtomic => "hist_atomic",
            Self::ScanSimple => "scan_simple",
            Self::ScanHs => "scan_hs",
            Self::ScanLocalHs => "scan_local_hs",
            Self::HistoCopy => "histo_copy",
            Self::ScanBl => "scan_bl",
            Self::Normalise => "normalise",
            Self::BackProject => "back_project",
        }
    }

    /// Positions of the buffer arguments the kernel writes.
    #[must_use]
    pub const fn writes(self) -> &'static [usize] {
        match self {
            Self::ScanHs => &[1, 2],
            Self::ScanBl => &[0],
            Self::HistSimple
            | Self::HistAtomic
            | Self::ScanSimple
            | Self::ScanLocalHs
            | Self::HistoCopy
            | Self::Normalise
            | Self::BackProject => &[1],
        }
    }
}

/// Resolved index space of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NdRange {
    /// Total work items.
    pub global: usize,
    /// Work items per group; always divides `global` when `global > 0`.
    pub local: usize,
}

impl NdRange {
    pub const fn groups(self) -> usize {
        if self.local == 0 {
            0
        } else {
            self.global / self.local
        }
    }
}

/// A kernel argument after the device resolved buffer handles.
pub(crate) enum Bound<'a> {
    U8(&'a [AtomicU8]),
    U32(&'a [AtomicU32]),
    Local(usize),
    Scalar(u32),
}

impl Bound<'_> {
    const fn kind(&self) -> &'static str {
        match self {
            Self::U8(_) => "u8 buffer",
            Self::U32(_) => "u32 buffer",
            Self::Local(_) => "local memory",
            Self::Scalar(_) => "scalar",
        }
    }
}

/// Positional arguments of one launch, with typed accessors.
pub(crate) struct Args<'a> {
    kernel: Kernel,
    bound: Vec<Bound<'a>>,
}

impl<'a> Args<'a> {
    pub const fn new(kernel: Kernel, bound: Vec<Bound<'a>>) -> Self {
        Self { kernel, bound }
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    fn invalid(&self, index: usize, reason: impl Into<String>) -> DeviceError {
        DeviceError::InvalidArgument {
            kernel: self.kernel.name(),
            index,
            reason: reason.into(),
        }
    }

    fn wrong_kind(&self, index: usize, expected: &str, got: &Bound<'_>) -> DeviceError {
        self.invalid(index, format!("expected {expected}, got {}", got.kind()))
    }

    fn get(&self, index: usize) -> Result<&Bound<'a>, DeviceError> {
        self.bound
            .get(index)
            .ok_or_else(|| self.invalid(index, "missing"))
    }

    pub fn u8(&self, index: usize) -> Result<&'a [AtomicU8], DeviceError> {
        match self.get(index)? {
            Bound::U8(data) => Ok(data),
            other => Err(self.wrong_kind(index, "u8 buffer", other)),
        }
    }

    pub fn u32(&self, index: usize) -> Result<&'a [AtomicU32], DeviceError> {
        match self.get(index)? {
            Bound::U32(data) => Ok(data),
            other => Err(self.wrong_kind(index, "u32 buffer", other)),
        }
    }

    pub fn local(&self, index: usize) -> Result<usize, DeviceError> {
        match self.get(index)? {
            Bound::Local(len) => Ok(*len),
            other => Err(self.wrong_kind(index, "local memory", other)),
        }
    }

    pub fn scalar(&self, index: usize) -> Result<u32, DeviceError> {
        match self.get(index)? {
            Bound::Scalar(value) => Ok(*value),
            other => Err(self.wrong_kind(index, "scalar", other)),
        }
    }

    /// Fail unless `len` is at least `needed`.
    pub fn require_len(&self, index: usize, len: usize, needed: usize) -> Result<(), DeviceError> {
        if len < needed {
            return Err(self.invalid(index, format!("{len} elements, at least {needed} required")));
        }
        Ok(())
    }

    /// Fail unless `value` is non-zero.
    pub fn require_positive(&self, index: usize, value: u32) -> Result<(), DeviceError> {
        if value == 0 {
            return Err(self.invalid(index, "must be positive"));
        }
        Ok(())
    }

    pub fn work_group_error(&self, range: NdRange) -> DeviceError {
        DeviceError::InvalidWorkGroupSize {
            kernel: self.kernel.name(),
            global: range.global,
            local: range.local,
        }
    }
}

/// Run `kernel` over `range` with bound arguments.
pub(crate) fn execute(kernel: Kernel, range: NdRange, args: &Args<'_>) -> Result<(), DeviceError> {
    match kernel {
        Kernel::HistSimple => histogram::hist_simple(range, args),
        Kernel::HistAtomic => histogram::hist_atomic(range, args),
        Kernel::ScanSimple => scan::scan_simple(range, args),
        Kernel::ScanHs => scan::scan_hs(range, args),
        Kernel::ScanLocalHs => scan::scan_local_hs(range, args),
        Kernel::HistoCopy => scan::histo_copy(range, args),
        Kernel::ScanBl => scan::scan_bl(range, args),
        Kernel::Normalise => map::normalise(range, args),
        Kernel::BackProject => map::back_project(range, args),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for driving kernels without a device.

    use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

    use super::NdRange;

    pub const fn range(global: usize, local: usize) -> NdRange {
        NdRange { global, local }
    }

    pub fn atomics_u8(values: &[u8]) -> Vec<AtomicU8> {
        values.iter().map(|&v| AtomicU8::new(v)).collect()
    }

    pub fn atomics_u32(values: &[u32]) -> Vec<AtomicU32> {
        values.iter().map(|&v| AtomicU32::new(v)).collect()
    }

    pub fn load_u8(values: &[AtomicU8]) -> Vec<u8> {
        values.iter().map(|v| v.load(Ordering::Relaxed)).collect()
    }

    pub fn load_u32(values: &[AtomicU32]) -> Vec<u32> {
        values.iter().map(|v| v.load(Ordering::Relaxed)).collect()
    }
}
