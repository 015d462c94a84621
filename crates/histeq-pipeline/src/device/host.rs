//! [`ComputeDevice`] that executes the device program on the host.
//!
//! Buffers are arrays of atomics so that work items running on
//! different threads can share them exactly as they would share global
//! memory on a GPU. Commands run synchronously in submission order;
//! inside a command, work groups are spread over the `rayon` pool.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use super::{
    BufferDesc, BufferId, Clock, ComputeDevice, DeviceError, ElementType, KernelArg,
    KernelLaunch, MemAccess, MonotonicClock,
};
use crate::kernels::{self, Args, Bound, NdRange};
use crate::profiling::StageTiming;

/// Resource limits of a [`HostDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostDeviceLimits {
    /// Largest accepted work-group size.
    pub max_work_group_size: usize,
    /// Local memory available to one work group, in 32-bit words.
    pub local_memory_words: usize,
}

impl HostDeviceLimits {
    /// Default maximum work-group size.
    pub const DEFAULT_MAX_WORK_GROUP_SIZE: usize = 256;

    /// Default local memory per work group (16 KiB).
    pub const DEFAULT_LOCAL_MEMORY_WORDS: usize = 4096;
}

impl Default for HostDeviceLimits {
    fn default() -> Self {
        Self {
            max_work_group_size: Self::DEFAULT_MAX_WORK_GROUP_SIZE,
            local_memory_words: Self::DEFAULT_LOCAL_MEMORY_WORDS,
        }
    }
}

enum HostData {
    U8(Vec<AtomicU8>),
    U32(Vec<AtomicU32>),
}

impl HostData {
    const fn element(&self) -> ElementType {
        match self {
            Self::U8(_) => ElementType::U8,
            Self::U32(_) => ElementType::U32,
        }
    }

    const fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }
}

struct HostBuffer {
    label: &'static str,
    access: MemAccess,
    data: HostData,
}

/// Host-side emulation of a compute device.
///
/// The clock is pluggable so timing tests can use a deterministic
/// timeline; production code uses [`MonotonicClock`].
pub struct HostDevice<C: Clock = MonotonicClock> {
    clock: C,
    limits: HostDeviceLimits,
    built: bool,
    buffers: Vec<Option<HostBuffer>>,
}

impl HostDevice<MonotonicClock> {
    /// Create a device with default limits and a monotonic clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::new())
    }
}

impl Default for HostDevice<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> HostDevice<C> {
    /// Create a device that timestamps commands with `clock`.
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            limits: HostDeviceLimits::default(),
            built: false,
            buffers: Vec::new(),
        }
    }

    /// Replace the resource limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: HostDeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The active resource limits.
    #[must_use]
    pub const fn limits(&self) -> HostDeviceLimits {
        self.limits
    }

    /// Number of buffers currently allocated.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_some()).count()
    }

    fn buffer(&self, id: BufferId) -> Result<&HostBuffer, DeviceError> {
        self.buffers
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(DeviceError::UnknownBuffer(id))
    }

    fn u8_data(&self, id: BufferId, host_len: usize) -> Result<&[AtomicU8], DeviceError> {
        match &self.buffer(id)?.data {
            HostData::U8(data) if data.len() == host_len => Ok(data),
            HostData::U8(data) => Err(DeviceError::BufferSizeMismatch {
                buffer: id,
                len: data.len(),
                host_len,
            }),
            other => Err(DeviceError::BufferTypeMismatch {
                buffer: id,
                expected: ElementType::U8,
                actual: other.element(),
            }),
        }
    }

    fn u32_data(&self, id: BufferId, host_len: usize) -> Result<&[AtomicU32], DeviceError> {
        match &self.buffer(id)?.data {
            HostData::U32(data) if data.len() == host_len => Ok(data),
            HostData::U32(data) => Err(DeviceError::BufferSizeMismatch {
                buffer: id,
                len: data.len(),
                host_len,
            }),
            other => Err(DeviceError::BufferTypeMismatch {
                buffer: id,
                expected: ElementType::U32,
                actual: other.element(),
            }),
        }
    }

    /// Run one command, stamping the four profiling timestamps around it.
    ///
    /// Commands execute as soon as they are enqueued, so queued,
    /// submitted, and started are taken back to back.
    fn command<T>(
        &self,
        run: impl FnOnce() -> Result<T, DeviceError>,
    ) -> Result<(T, StageTiming), DeviceError> {
        let queued = self.clock.now_ns();
        let submitted = self.clock.now_ns();
        let started = self.clock.now_ns();
        let value = run()?;
        let ended = self.clock.now_ns();
        Ok((value, StageTiming::new(queued, submitted, started, ended)))
    }

    fn resolve_range(&self, launch: &KernelLaunch<'_>) -> Result<NdRange, DeviceError> {
        let kernel = launch.kernel.name();
        let local = match launch.local {
            Some(local) => {
                if local == 0
                    || local > self.limits.max_work_group_size
                    || launch.global % local != 0
                {
                    return Err(DeviceError::InvalidWorkGroupSize {
                        kernel,
                        global: launch.global,
                        local,
                    });
                }
                local
            }
            // Without an explicit shape every work item sits in one
            // implicit group; kernels launched this way do not use
            // local memory.
            None => launch.global.max(1),
        };

        let requested: usize = launch
            .args
            .iter()
            .map(|arg| match arg {
                KernelArg::Local(len) => *len,
                _ => 0,
            })
            .sum();
        if requested > self.limits.local_memory_words {
            return Err(DeviceError::LocalMemoryExceeded {
                kernel,
                requested,
                available: self.limits.local_memory_words,
            });
        }

        Ok(NdRange {
            global: launch.global,
            local,
        })
    }

    fn bind<'a>(&'a self, launch: &KernelLaunch<'_>) -> Result<Args<'a>, DeviceError> {
        let writes = launch.kernel.writes();
        let bound = launch
            .args
            .iter()
            .enumerate()
            .map(|(index, arg)| {
                Ok(match *arg {
                    KernelArg::Buffer(id) => {
                        let buffer = self.buffer(id)?;
                        if buffer.access == MemAccess::ReadOnly && writes.contains(&index) {
                            return Err(DeviceError::ReadOnlyBuffer {
                                kernel: launch.kernel.name(),
                                index,
                                buffer: id,
                            });
                        }
                        match &buffer.data {
                            HostData::U8(data) => Bound::U8(data),
                            HostData::U32(data) => Bound::U32(data),
                        }
                    }
                    KernelArg::Local(len) => Bound::Local(len),
                    KernelArg::Scalar(value) => Bound::Scalar(value),
                })
            })
            .collect::<Result<Vec<_>, DeviceError>>()?;
        Ok(Args::new(launch.kernel, bound))
    }
}

impl<C: Clock> ComputeDevice for HostDevice<C> {
    fn describe(&self) -> String {
        format!(
            "host emulation ({} threads, max work-group size {})",
            rayon::current_num_threads(),
            self.limits.max_work_group_size,
        )
    }

    fn build_program(&mut self) -> Result<(), DeviceError> {
        tracing::debug!(kernels = kernels::Kernel::ALL.len(), "building device program");
        self.built = true;
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError> {
        let data = match desc.element {
            ElementType::U8 => HostData::U8((0..desc.len).map(|_| AtomicU8::new(0)).collect()),
            ElementType::U32 => {
                HostData::U32((0..desc.len).map(|_| AtomicU32::new(0)).collect())
            }
        };
        let buffer = HostBuffer {
            label: desc.label,
            access: desc.access,
            data,
        };
        let slot = self.buffers.iter().position(Option::is_none);
        let id = if let Some(index) = slot {
            self.buffers[index] = Some(buffer);
            BufferId(index)
        } else {
            self.buffers.push(Some(buffer));
            BufferId(self.buffers.len() - 1)
        };
        tracing::trace!(
            %id,
            label = desc.label,
            len = desc.len,
            element = %desc.element,
            access = ?desc.access,
            "allocated buffer",
        );
        Ok(id)
    }

    fn write_u8(&mut self, buffer: BufferId, data: &[u8]) -> Result<StageTiming, DeviceError> {
        let ((), timing) = self.command(|| {
            let target = self.u8_data(buffer, data.len())?;
            for (dst, &src) in target.iter().zip(data) {
                dst.store(src, Ordering::Relaxed);
            }
            Ok(())
        })?;
        Ok(timing)
    }

    fn write_u32(&mut self, buffer: BufferId, data: &[u32]) -> Result<StageTiming, DeviceError> {
        let ((), timing) = self.command(|| {
            let target = self.u32_data(buffer, data.len())?;
            for (dst, &src) in target.iter().zip(data) {
                dst.store(src, Ordering::Relaxed);
            }
            Ok(())
        })?;
        Ok(timing)
    }

    fn read_u8(&mut self, buffer: BufferId, out: &mut [u8]) -> Result<StageTiming, DeviceError> {
        let host_len = out.len();
        let ((), timing) = self.command(|| {
            let source = self.u8_data(buffer, host_len)?;
            for (dst, src) in out.iter_mut().zip(source) {
                *dst = src.load(Ordering::Relaxed);
            }
            Ok(())
        })?;
        Ok(timing)
    }

    fn read_u32(&mut self, buffer: BufferId, out: &mut [u32]) -> Result<StageTiming, DeviceError> {
        let host_len = out.len();
        let ((), timing) = self.command(|| {
            let source = self.u32_data(buffer, host_len)?;
            for (dst, src) in out.iter_mut().zip(source) {
                *dst = src.load(Ordering::Relaxed);
            }
            Ok(())
        })?;
        Ok(timing)
    }

    fn enqueue_kernel(&mut self, launch: &KernelLaunch<'_>) -> Result<StageTiming, DeviceError> {
        if !self.built {
            return Err(DeviceError::ProgramNotBuilt);
        }
        let range = self.resolve_range(launch)?;
        tracing::debug!(
            kernel = launch.kernel.name(),
            global = range.global,
            local = range.local,
            "enqueue kernel",
        );
        let args = self.bind(launch)?;
        let ((), timing) = self.command(|| kernels::execute(launch.kernel, range, &args))?;
        tracing::trace!(
            kernel = launch.kernel.name(),
            args = args.len(),
            execution_ns = timing.execution_ns(),
            "kernel finished",
        );
        Ok(timing)
    }

    fn release(&mut self, buffer: BufferId) {
        if let Some(slot) = self.buffers.get_mut(buffer.0)
            && let Some(freed) = slot.take()
        {
            tracing::trace!(
                id = %buffer,
                label = freed.label,
                len = freed.data.len(),
                "released buffer",
            );
        }
    }
}
