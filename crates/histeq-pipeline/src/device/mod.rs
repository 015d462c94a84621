//! Compute device abstraction.
//!
//! The pipeline never talks to a GPU API directly. It issues commands
//! through [`ComputeDevice`]: allocate a buffer, copy host data in,
//! enqueue a named [`Kernel`] over an index range, and block on a
//! read-back. Every command reports its [`StageTiming`] so the
//! profiling layer can attribute queue, submission, and execution time.
//!
//! [`HostDevice`] is the bundled implementation. It runs the device
//! program from [`crate::kernels`] on the host with work-group
//! semantics, which keeps the crate usable (and testable) on machines
//! without a GPU driver.

mod host;

use std::fmt;

use crate::kernels::Kernel;
use crate::profiling::StageTiming;

pub use host::{HostDevice, HostDeviceLimits};

/// Opaque handle to a buffer owned by a [`ComputeDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) usize);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// How kernels may access a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAccess {
    /// Kernels only read; host writes are still allowed. Binding the
    /// buffer to an argument the kernel writes is rejected at launch.
    ReadOnly,
    /// Kernels read and write.
    ReadWrite,
}

/// Element type stored in a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// 8-bit intensity samples.
    U8,
    /// 32-bit counters.
    U32,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => f.write_str("u8"),
            Self::U32 => f.write_str("u32"),
        }
    }
}

/// Description of a buffer to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    /// Debug label, surfaced in errors and logs.
    pub label: &'static str,
    /// Kernel access mode.
    pub access: MemAccess,
    /// Element type.
    pub element: ElementType,
    /// Number of elements.
    pub len: usize,
}

/// One argument bound to a kernel launch, by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArg {
    /// A device buffer.
    Buffer(BufferId),
    /// Per-work-group local memory, in elements.
    Local(usize),
    /// A scalar passed by value.
    Scalar(u32),
}

/// A kernel launch: which kernel, its arguments, and the index space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelLaunch<'a> {
    /// Kernel to run.
    pub kernel: Kernel,
    /// Positional arguments.
    pub args: &'a [KernelArg],
    /// Total number of work items.
    pub global: usize,
    /// Work-group size, or `None` to let the device choose.
    pub local: Option<usize>,
}

/// Diagnostics captured from a failed program build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLog {
    /// Build status as reported by the runtime.
    pub status: String,
    /// Options the program was built with.
    pub options: String,
    /// Raw compiler output.
    pub log: String,
}

impl fmt::Display for BuildLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build Status: {}", self.status)?;
        writeln!(f, "Build Options: {}", self.options)?;
        write!(f, "Build Log: {}", self.log)
    }
}

/// Errors raised by a compute device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The device program failed to compile.
    #[error("device program failed to build (status: {})", .0.status)]
    Compile(BuildLog),

    /// A kernel was enqueued before the program was built.
    #[error("device program has not been built")]
    ProgramNotBuilt,

    /// The handle does not name a live buffer.
    #[error("{0} is not allocated on this device")]
    UnknownBuffer(BufferId),

    /// Host data or a kernel argument has the wrong element type.
    #[error("{buffer} holds {actual} elements, expected {expected}")]
    BufferTypeMismatch {
        /// The buffer involved.
        buffer: BufferId,
        /// Element type the operation needed.
        expected: ElementType,
        /// Element type the buffer holds.
        actual: ElementType,
    },

    /// A host copy does not match the buffer length.
    #[error("{buffer} holds {len} elements, host side has {host_len}")]
    BufferSizeMismatch {
        /// The buffer involved.
        buffer: BufferId,
        /// Device-side length.
        len: usize,
        /// Host-side length.
        host_len: usize,
    },

    /// A kernel argument is missing or of the wrong kind.
    #[error("kernel `{kernel}` argument {index}: {reason}")]
    InvalidArgument {
        /// Kernel name.
        kernel: &'static str,
        /// Argument position.
        index: usize,
        /// What was wrong.
        reason: String,
    },

    /// The requested work-group shape is not supported.
    #[error("kernel `{kernel}`: invalid work-group size {local} for global size {global}")]
    InvalidWorkGroupSize {
        /// Kernel name.
        kernel: &'static str,
        /// Requested global size.
        global: usize,
        /// Requested local size.
        local: usize,
    },

    /// A kernel would write to a buffer allocated read-only.
    #[error("kernel `{kernel}` writes argument {index}, but {buffer} is read-only")]
    ReadOnlyBuffer {
        /// Kernel name.
        kernel: &'static str,
        /// Argument position.
        index: usize,
        /// The buffer involved.
        buffer: BufferId,
    },

    /// A launch asked for more local memory than a work group has.
    #[error("kernel `{kernel}`: {requested} local elements requested, {available} available")]
    LocalMemoryExceeded {
        /// Kernel name.
        kernel: &'static str,
        /// Requested elements.
        requested: usize,
        /// Device capacity.
        available: usize,
    },
}

/// A command queue plus memory on one compute device.
///
/// Commands execute in submission order. `read_*` calls block until the
/// data is on the host, which is the only synchronisation point the
/// pipeline relies on between stages.
pub trait ComputeDevice {
    /// Human-readable platform and device name.
    fn describe(&self) -> String;

    /// Compile the device program.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Compile`] with the build diagnostics.
    fn build_program(&mut self) -> Result<(), DeviceError>;

    /// Allocate a zero-initialised buffer.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the device cannot allocate it.
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError>;

    /// Copy 8-bit host data into a buffer.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] on unknown buffers or type/size mismatch.
    fn write_u8(&mut self, buffer: BufferId, data: &[u8]) -> Result<StageTiming, DeviceError>;

    /// Copy 32-bit host data into a buffer.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] on unknown buffers or type/size mismatch.
    fn write_u32(&mut self, buffer: BufferId, data: &[u32]) -> Result<StageTiming, DeviceError>;

    /// Blocking copy of an 8-bit buffer to the host.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] on unknown buffers or type/size mismatch.
    fn read_u8(&mut self, buffer: BufferId, out: &mut [u8]) -> Result<StageTiming, DeviceError>;

    /// Blocking copy of a 32-bit buffer to the host.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] on unknown buffers or type/size mismatch.
    fn read_u32(&mut self, buffer: BufferId, out: &mut [u32]) -> Result<StageTiming, DeviceError>;

    /// Enqueue a kernel launch.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the program is not built, the
    /// arguments do not match the kernel, or the range is unsupported.
    fn enqueue_kernel(&mut self, launch: &KernelLaunch<'_>) -> Result<StageTiming, DeviceError>;

    /// Free a buffer. Unknown handles are ignored.
    fn release(&mut self, buffer: BufferId);
}

impl<D: ComputeDevice + ?Sized> ComputeDevice for &mut D {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn build_program(&mut self) -> Result<(), DeviceError> {
        (**self).build_program()
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError> {
        (**self).create_buffer(desc)
    }

    fn write_u8(&mut self, buffer: BufferId, data: &[u8]) -> Result<StageTiming, DeviceError> {
        (**self).write_u8(buffer, data)
    }

    fn write_u32(&mut self, buffer: BufferId, data: &[u32]) -> Result<StageTiming, DeviceError> {
        (**self).write_u32(buffer, data)
    }

    fn read_u8(&mut self, buffer: BufferId, out: &mut [u8]) -> Result<StageTiming, DeviceError> {
        (**self).read_u8(buffer, out)
    }

    fn read_u32(&mut self, buffer: BufferId, out: &mut [u32]) -> Result<StageTiming, DeviceError> {
        (**self).read_u32(buffer, out)
    }

    fn enqueue_kernel(&mut self, launch: &KernelLaunch<'_>) -> Result<StageTiming, DeviceError> {
        (**self).enqueue_kernel(launch)
    }

    fn release(&mut self, buffer: BufferId) {
        (**self).release(buffer);
    }
}

/// Source of device timestamps, in nanoseconds.
///
/// Abstracted so tests can drive deterministic timelines.
pub trait Clock {
    /// Nanoseconds since an arbitrary, fixed origin.
    fn now_ns(&self) -> u64;
}

/// [`Clock`] backed by `web_time::Instant`.
///
/// Uses `performance.now()` on WASM and `std::time::Instant` natively.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: web_time::Instant,
}

impl MonotonicClock {
    /// Start a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: web_time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}
