//! Incremental pipeline: drive the device stage-by-stage, inspecting
//! each intermediate array before continuing.
//!
//! ```rust
//! # use histeq_pipeline::{EqualizeConfig, HostDevice, Pipeline, PipelineError, SourceImage};
//! # fn run(source: SourceImage) -> Result<(), PipelineError> {
//! let result = Pipeline::new(HostDevice::new(), source, EqualizeConfig::default())
//!     .allocate()?
//!     .build_histogram()?
//!     .scan()?
//!     .normalise()?
//!     .back_project()?
//!     .finish()
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state, so
//! skipping or reordering stages does not compile. Every device-touching
//! transition launches its kernels and then blocks on the read-back of
//! its output buffer, which is the only barrier between stages.
//!
//! # Failure
//!
//! A failed transition releases every device buffer the run allocated
//! and returns the error; nothing computed so far is handed out. The
//! dynamic [`Stage`] API records this as the terminal
//! [`Stage::Failed`] state. Dropping a stage part-way through releases
//! its buffers the same way.

use std::fmt;
use std::marker::PhantomData;

use crate::backproject;
use crate::bins::BinCount;
use crate::color::merge_ycbcr;
use crate::device::{BufferDesc, BufferId, ComputeDevice, DeviceError, ElementType, MemAccess};
use crate::histogram::{Histogram, HistogramBuilder};
use crate::normalize::{self, LookupTable};
use crate::profiling::{ProfileTotals, StageProfile, StageProfiler, TimingReport};
use crate::scan::{CumulativeHistogram, ScanEngine};
use crate::types::{
    Dimensions, DynamicImage, EqualizationResult, EqualizeConfig, GrayImage, PipelineError,
    SourceImage,
};

const HISTOGRAM_STAGE: &str = "Histogram";
const SCAN_STAGE: &str = "Cumulative histogram";
const NORMALISE_STAGE: &str = "Normalised histogram";
const BACK_PROJECT_STAGE: &str = "Back-projection";
const TRANSFER_STAGE: &str = "Buffer transfers";

// ──────────────────────────── Shared run state ───────────────────────

/// Device handles of one run.
#[derive(Debug, Clone, Copy)]
struct Buffers {
    input: BufferId,
    output: BufferId,
    histogram: BufferId,
    cumulative: BufferId,
    scratch: BufferId,
    lut: BufferId,
}

/// State every stage carries: the device, the inputs, and profiling.
struct Run<D: ComputeDevice> {
    device: D,
    config: EqualizeConfig,
    source: SourceImage,
    owned: Vec<BufferId>,
    stages: Vec<StageProfile>,
    transfers: StageProfiler,
    totals: ProfileTotals,
}

impl<D: ComputeDevice> Run<D> {
    fn bins(&self) -> BinCount {
        self.config.bins
    }

    fn samples(&self) -> usize {
        self.source.luma.as_raw().len()
    }

    fn alloc(
        &mut self,
        label: &'static str,
        access: MemAccess,
        element: ElementType,
        len: usize,
    ) -> Result<BufferId, DeviceError> {
        let id = self.device.create_buffer(&BufferDesc {
            label,
            access,
            element,
            len,
        })?;
        self.owned.push(id);
        Ok(id)
    }

    fn release_all(&mut self) {
        for id in self.owned.drain(..) {
            self.device.release(id);
        }
    }

    /// Close a kernel stage and log it.
    fn record(&mut self, profiler: StageProfiler) {
        let profile = profiler.finish(&mut self.totals);
        tracing::info!(
            stage = profile.stage,
            execution_ns = profile.execution_ns,
            "{}",
            profile.summary_line(),
        );
        self.stages.push(profile);
    }

    /// Release everything and turn a device error into the run's error.
    fn abort(mut self, stage: &'static str, err: impl Into<PipelineError>) -> PipelineError {
        let err = err.into();
        self.release_all();
        tracing::error!(stage, error = %err, "pipeline failed");
        err
    }

    fn read_u32(&mut self, buffer: BufferId, len: usize) -> Result<Vec<u32>, DeviceError> {
        let mut values = vec![0; len];
        self.transfers.observe(self.device.read_u32(buffer, &mut values)?);
        Ok(values)
    }

    fn allocate(&mut self) -> Result<Buffers, DeviceError> {
        self.device.build_program()?;
        let samples = self.samples();
        let bins = self.bins().len();
        let buffers = Buffers {
            input: self.alloc("input", MemAccess::ReadOnly, ElementType::U8, samples)?,
            output: self.alloc("output", MemAccess::ReadWrite, ElementType::U8, samples)?,
            histogram: self.alloc("histogram", MemAccess::ReadWrite, ElementType::U32, bins)?,
            cumulative: self.alloc("cumulative", MemAccess::ReadWrite, ElementType::U32, bins)?,
            scratch: self.alloc("scratch", MemAccess::ReadWrite, ElementType::U32, bins)?,
            lut: self.alloc("lut", MemAccess::ReadWrite, ElementType::U32, bins)?,
        };
        let upload = self.device.write_u8(buffers.input, self.source.luma.as_raw())?;
        self.transfers.observe(upload);
        Ok(buffers)
    }

    fn histogram(&mut self, buffers: &Buffers) -> Result<Histogram, DeviceError> {
        let bins = self.bins();
        let samples = self.samples();
        let zeros = vec![0; bins.len()];
        self.transfers.observe(self.device.write_u32(buffers.histogram, &zeros)?);

        let mut profiler = StageProfiler::new(HISTOGRAM_STAGE);
        self.config.histogram.enqueue(
            &mut self.device,
            buffers.input,
            buffers.histogram,
            samples,
            bins,
            &mut profiler,
        )?;
        let counts = self.read_u32(buffers.histogram, bins.len())?;
        self.record(profiler);
        Ok(Histogram::new(counts))
    }

    fn scan(&mut self, buffers: &Buffers) -> Result<CumulativeHistogram, DeviceError> {
        let bins = self.bins();
        let mut profiler = StageProfiler::new(SCAN_STAGE);
        self.config.scan.enqueue(
            &mut self.device,
            buffers.histogram,
            buffers.cumulative,
            buffers.scratch,
            bins,
            &mut profiler,
        )?;
        let values = self.read_u32(buffers.cumulative, bins.len())?;
        self.record(profiler);
        Ok(CumulativeHistogram::new(values, self.config.scan.convention()))
    }

    fn normalise(&mut self, buffers: &Buffers) -> Result<LookupTable, DeviceError> {
        let bins = self.bins();
        let total = u32::try_from(self.samples()).unwrap_or(u32::MAX);
        let mut profiler = StageProfiler::new(NORMALISE_STAGE);
        normalize::enqueue(
            &mut self.device,
            buffers.cumulative,
            buffers.lut,
            bins,
            total,
            &mut profiler,
        )?;
        let levels = self.read_u32(buffers.lut, bins.len())?;
        self.record(profiler);
        Ok(LookupTable::new(levels))
    }

    fn back_project(&mut self, buffers: &Buffers) -> Result<GrayImage, DeviceError> {
        let samples = self.samples();
        let bins = self.bins();
        let mut profiler = StageProfiler::new(BACK_PROJECT_STAGE);
        backproject::enqueue(
            &mut self.device,
            buffers.input,
            buffers.output,
            buffers.lut,
            samples,
            bins,
            &mut profiler,
        )?;
        let mut equalized = GrayImage::new(self.source.luma.width(), self.source.luma.height());
        self.transfers.observe(self.device.read_u8(buffers.output, &mut equalized)?);
        self.record(profiler);
        Ok(equalized)
    }
}

impl<D: ComputeDevice> Drop for Run<D> {
    fn drop(&mut self) {
        if !self.owned.is_empty() {
            tracing::warn!(buffers = self.owned.len(), "run abandoned, releasing buffers");
        }
        self.release_all();
    }
}

// ───────────────────────── Stage 0: Idle ─────────────────────────────

/// Pipeline state before any device work.
///
/// Call [`allocate`](Self::allocate) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .allocate() to continue"]
pub struct Idle<D: ComputeDevice> {
    run: Run<D>,
}

impl<D: ComputeDevice> Idle<D> {
    /// The source image the run will equalize.
    pub const fn source(&self) -> &SourceImage {
        &self.run.source
    }

    /// Build the device program, allocate every buffer, and upload the
    /// intensity samples.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DeviceCompile`] with the build log if the
    /// program does not compile, or [`PipelineError::Device`] if
    /// allocation or upload fails.
    pub fn allocate(mut self) -> Result<BuffersAllocated<D>, PipelineError> {
        match self.run.allocate() {
            Ok(buffers) => {
                tracing::info!(
                    device = %self.run.device.describe(),
                    samples = self.run.samples(),
                    bins = %self.run.bins(),
                    "buffers allocated",
                );
                Ok(BuffersAllocated {
                    run: self.run,
                    buffers,
                })
            }
            Err(err) => Err(self.run.abort(PipelineState::Idle.name(), err)),
        }
    }
}

// ───────────────────────── Stage 1: BuffersAllocated ─────────────────

/// Pipeline state once the input is resident on the device.
///
/// Call [`build_histogram`](Self::build_histogram) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .build_histogram() to continue"]
pub struct BuffersAllocated<D: ComputeDevice> {
    run: Run<D>,
    buffers: Buffers,
}

impl<D: ComputeDevice> BuffersAllocated<D> {
    /// Zero the histogram buffer, count samples with the configured
    /// strategy, and read the counts back.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Device`] if the device rejects a command.
    pub fn build_histogram(mut self) -> Result<HistogramReady<D>, PipelineError> {
        match self.run.histogram(&self.buffers) {
            Ok(histogram) => Ok(HistogramReady {
                run: self.run,
                buffers: self.buffers,
                histogram,
            }),
            Err(err) => Err(self.run.abort(PipelineState::BuffersAllocated.name(), err)),
        }
    }
}

// ───────────────────────── Stage 2: HistogramReady ───────────────────

/// Pipeline state after the histogram has been read back.
///
/// Call [`scan`](Self::scan) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .scan() to continue"]
pub struct HistogramReady<D: ComputeDevice> {
    run: Run<D>,
    buffers: Buffers,
    histogram: Histogram,
}

impl<D: ComputeDevice> HistogramReady<D> {
    /// The raw per-bin counts.
    pub const fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Run the configured prefix sum and read the cumulative histogram
    /// back.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Device`] if the device rejects a command.
    pub fn scan(mut self) -> Result<CumulativeReady<D>, PipelineError> {
        match self.run.scan(&self.buffers) {
            Ok(cumulative) => Ok(CumulativeReady {
                run: self.run,
                buffers: self.buffers,
                histogram: self.histogram,
                cumulative,
            }),
            Err(err) => Err(self.run.abort(PipelineState::HistogramReady.name(), err)),
        }
    }
}

// ───────────────────────── Stage 3: CumulativeReady ──────────────────

/// Pipeline state after the cumulative histogram has been read back.
///
/// Call [`normalise`](Self::normalise) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .normalise() to continue"]
pub struct CumulativeReady<D: ComputeDevice> {
    run: Run<D>,
    buffers: Buffers,
    histogram: Histogram,
    cumulative: CumulativeHistogram,
}

impl<D: ComputeDevice> CumulativeReady<D> {
    /// The running totals.
    pub const fn cumulative(&self) -> &CumulativeHistogram {
        &self.cumulative
    }

    /// Scale the cumulative histogram into the lookup table.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Device`] if the device rejects a command.
    pub fn normalise(mut self) -> Result<NormalizedReady<D>, PipelineError> {
        match self.run.normalise(&self.buffers) {
            Ok(lut) => Ok(NormalizedReady {
                run: self.run,
                buffers: self.buffers,
                histogram: self.histogram,
                cumulative: self.cumulative,
                lut,
            }),
            Err(err) => Err(self.run.abort(PipelineState::CumulativeReady.name(), err)),
        }
    }
}

// ───────────────────────── Stage 4: NormalizedReady ──────────────────

/// Pipeline state after the lookup table has been read back.
///
/// Call [`back_project`](Self::back_project) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .back_project() to continue"]
pub struct NormalizedReady<D: ComputeDevice> {
    run: Run<D>,
    buffers: Buffers,
    histogram: Histogram,
    cumulative: CumulativeHistogram,
    lut: LookupTable,
}

impl<D: ComputeDevice> NormalizedReady<D> {
    /// The lookup table.
    pub const fn lut(&self) -> &LookupTable {
        &self.lut
    }

    /// Apply the lookup table to every sample and read the result back.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Device`] if the device rejects a command.
    pub fn back_project(mut self) -> Result<BackProjected<D>, PipelineError> {
        match self.run.back_project(&self.buffers) {
            Ok(equalized) => Ok(BackProjected {
                run: self.run,
                histogram: self.histogram,
                cumulative: self.cumulative,
                lut: self.lut,
                equalized,
            }),
            Err(err) => Err(self.run.abort(PipelineState::NormalizedReady.name(), err)),
        }
    }
}

// ───────────────────────── Stage 5: BackProjected ────────────────────

/// Pipeline state once the equalized samples are on the host.
///
/// Call [`finish`](Self::finish) to release the device and assemble the
/// result.
#[must_use = "pipeline stages are consumed by advancing; call .finish() to continue"]
pub struct BackProjected<D: ComputeDevice> {
    run: Run<D>,
    histogram: Histogram,
    cumulative: CumulativeHistogram,
    lut: LookupTable,
    equalized: GrayImage,
}

impl<D: ComputeDevice> BackProjected<D> {
    /// The equalized intensity plane.
    pub const fn equalized(&self) -> &GrayImage {
        &self.equalized
    }

    /// Release device buffers, reattach chroma, and build the report.
    pub fn finish(self) -> Done<D> {
        let Self {
            mut run,
            histogram,
            cumulative,
            lut,
            equalized,
        } = self;
        run.release_all();
        let transfers = std::mem::replace(&mut run.transfers, StageProfiler::new(TRANSFER_STAGE))
            .finish(&mut run.totals);

        let output = match &run.source.chroma {
            Some(chroma) => DynamicImage::ImageRgb8(merge_ycbcr(&equalized, chroma)),
            None => DynamicImage::ImageLuma8(equalized.clone()),
        };
        let timing = TimingReport {
            device: run.device.describe(),
            stages: std::mem::take(&mut run.stages),
            transfers,
            totals: run.totals,
        };
        tracing::info!(total_ns = timing.totals.total_ns(), "pipeline complete");

        Done {
            _device: PhantomData,
            result: EqualizationResult {
                histogram,
                cumulative,
                lut,
                equalized,
                output,
                dimensions: run.source.dimensions(),
                config: run.config,
                timing,
            },
        }
    }
}

// ───────────────────────── Stage 6: Done ─────────────────────────────

/// Final pipeline state.
#[must_use = "call .into_result() to extract the EqualizationResult"]
pub struct Done<D: ComputeDevice> {
    _device: PhantomData<fn() -> D>,
    result: EqualizationResult,
}

impl<D: ComputeDevice> Done<D> {
    /// The finished result.
    pub const fn result(&self) -> &EqualizationResult {
        &self.result
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.result.dimensions
    }

    /// Consume the pipeline and return the result.
    #[must_use]
    pub fn into_result(self) -> EqualizationResult {
        self.result
    }
}

// ──────────────────── State tag, trait, and Stage enum ───────────────

/// Total number of states, including [`PipelineState::Failed`].
pub const STATE_COUNT: usize = 8;

/// Which state a run is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Nothing on the device yet.
    Idle,
    /// Program built, buffers allocated, input uploaded.
    BuffersAllocated,
    /// Histogram read back.
    HistogramReady,
    /// Cumulative histogram read back.
    CumulativeReady,
    /// Lookup table read back.
    NormalizedReady,
    /// Equalized samples read back.
    BackProjected,
    /// Result assembled, device released.
    Done,
    /// A transition failed; terminal.
    Failed,
}

impl PipelineState {
    /// Every state, in transition order with `Failed` last.
    pub const ALL: [Self; STATE_COUNT] = [
        Self::Idle,
        Self::BuffersAllocated,
        Self::HistogramReady,
        Self::CumulativeReady,
        Self::NormalizedReady,
        Self::BackProjected,
        Self::Done,
        Self::Failed,
    ];

    /// Short name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::BuffersAllocated => "buffers-allocated",
            Self::HistogramReady => "histogram-ready",
            Self::CumulativeReady => "cumulative-ready",
            Self::NormalizedReady => "normalized-ready",
            Self::BackProjected => "back-projected",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// `true` for [`Done`](Self::Done) and [`Failed`](Self::Failed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trait implemented by every typed pipeline state, bridging the typed
/// API and the dynamic [`Stage`] enum.
pub trait PipelineStage<D: ComputeDevice>: Sized {
    /// The state this type represents.
    const STATE: PipelineState;

    /// Perform this state's transition. Errors become [`Stage::Failed`];
    /// [`Done`] returns itself.
    fn next(self) -> Stage<D>;

    /// Run all remaining transitions.
    ///
    /// # Errors
    ///
    /// Returns the first [`PipelineError`] a transition raises.
    fn complete(self) -> Result<EqualizationResult, PipelineError>;
}

impl<D: ComputeDevice> PipelineStage<D> for Idle<D> {
    const STATE: PipelineState = PipelineState::Idle;

    fn next(self) -> Stage<D> {
        self.allocate().map_or_else(Stage::Failed, Stage::BuffersAllocated)
    }

    fn complete(self) -> Result<EqualizationResult, PipelineError> {
        self.allocate()?.complete()
    }
}

impl<D: ComputeDevice> PipelineStage<D> for BuffersAllocated<D> {
    const STATE: PipelineState = PipelineState::BuffersAllocated;

    fn next(self) -> Stage<D> {
        self.build_histogram()
            .map_or_else(Stage::Failed, Stage::HistogramReady)
    }

    fn complete(self) -> Result<EqualizationResult, PipelineError> {
        self.build_histogram()?.complete()
    }
}

impl<D: ComputeDevice> PipelineStage<D> for HistogramReady<D> {
    const STATE: PipelineState = PipelineState::HistogramReady;

    fn next(self) -> Stage<D> {
        self.scan().map_or_else(Stage::Failed, Stage::CumulativeReady)
    }

    fn complete(self) -> Result<EqualizationResult, PipelineError> {
        self.scan()?.complete()
    }
}

impl<D: ComputeDevice> PipelineStage<D> for CumulativeReady<D> {
    const STATE: PipelineState = PipelineState::CumulativeReady;

    fn next(self) -> Stage<D> {
        self.normalise().map_or_else(Stage::Failed, Stage::NormalizedReady)
    }

    fn complete(self) -> Result<EqualizationResult, PipelineError> {
        self.normalise()?.complete()
    }
}

impl<D: ComputeDevice> PipelineStage<D> for NormalizedReady<D> {
    const STATE: PipelineState = PipelineState::NormalizedReady;

    fn next(self) -> Stage<D> {
        self.back_project().map_or_else(Stage::Failed, Stage::BackProjected)
    }

    fn complete(self) -> Result<EqualizationResult, PipelineError> {
        self.back_project()?.complete()
    }
}

impl<D: ComputeDevice> PipelineStage<D> for BackProjected<D> {
    const STATE: PipelineState = PipelineState::BackProjected;

    fn next(self) -> Stage<D> {
        Stage::Done(self.finish())
    }

    fn complete(self) -> Result<EqualizationResult, PipelineError> {
        Ok(self.finish().into_result())
    }
}

impl<D: ComputeDevice> PipelineStage<D> for Done<D> {
    const STATE: PipelineState = PipelineState::Done;

    fn next(self) -> Stage<D> {
        Stage::Done(self)
    }

    fn complete(self) -> Result<EqualizationResult, PipelineError> {
        Ok(self.into_result())
    }
}

/// Enum wrapping every pipeline state for uniform, loopable access.
///
/// ```rust
/// # use histeq_pipeline::{EqualizeConfig, HostDevice, Pipeline, SourceImage};
/// # use histeq_pipeline::pipeline::Stage;
/// # fn run(source: SourceImage) {
/// let mut stage: Stage<_> =
///     Pipeline::new(HostDevice::new(), source, EqualizeConfig::default()).into();
/// while !stage.state().is_terminal() {
///     stage = stage.advance();
/// }
/// let result = stage.complete();
/// # }
/// ```
#[must_use]
pub enum Stage<D: ComputeDevice> {
    /// See [`Idle`].
    Idle(Idle<D>),
    /// See [`BuffersAllocated`].
    BuffersAllocated(BuffersAllocated<D>),
    /// See [`HistogramReady`].
    HistogramReady(HistogramReady<D>),
    /// See [`CumulativeReady`].
    CumulativeReady(CumulativeReady<D>),
    /// See [`NormalizedReady`].
    NormalizedReady(NormalizedReady<D>),
    /// See [`BackProjected`].
    BackProjected(BackProjected<D>),
    /// See [`Done`].
    Done(Done<D>),
    /// A transition failed. Device buffers have been released.
    Failed(PipelineError),
}

/// Delegate a [`PipelineStage`] call to the active variant; `Failed` is
/// handled by the caller-supplied expression.
macro_rules! delegate {
    ($self:ident, $method:ident, $err:ident => $failed:expr) => {
        match $self {
            Self::Idle(s) => s.$method(),
            Self::BuffersAllocated(s) => s.$method(),
            Self::HistogramReady(s) => s.$method(),
            Self::CumulativeReady(s) => s.$method(),
            Self::NormalizedReady(s) => s.$method(),
            Self::BackProjected(s) => s.$method(),
            Self::Done(s) => s.$method(),
            Self::Failed($err) => $failed,
        }
    };
}

impl<D: ComputeDevice> Stage<D> {
    /// Which state this is.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        match self {
            Self::Idle(_) => Idle::<D>::STATE,
            Self::BuffersAllocated(_) => BuffersAllocated::<D>::STATE,
            Self::HistogramReady(_) => HistogramReady::<D>::STATE,
            Self::CumulativeReady(_) => CumulativeReady::<D>::STATE,
            Self::NormalizedReady(_) => NormalizedReady::<D>::STATE,
            Self::BackProjected(_) => BackProjected::<D>::STATE,
            Self::Done(_) => Done::<D>::STATE,
            Self::Failed(_) => PipelineState::Failed,
        }
    }

    /// The error, if the run failed.
    #[must_use]
    pub const fn error(&self) -> Option<&PipelineError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Move exactly one transition forward.
    ///
    /// `Done` and `Failed` are terminal and return themselves.
    pub fn advance(self) -> Self {
        let from = self.state();
        let next = delegate!(self, next, err => Self::Failed(err));
        if next.state() != from {
            tracing::debug!(%from, to = %next.state(), "pipeline advanced");
        }
        next
    }

    /// Run all remaining transitions.
    ///
    /// # Errors
    ///
    /// Returns the recorded error for a `Failed` run, or the first
    /// error a remaining transition raises.
    pub fn complete(self) -> Result<EqualizationResult, PipelineError> {
        delegate!(self, complete, err => Err(err))
    }
}

impl<D: ComputeDevice> From<Idle<D>> for Stage<D> {
    fn from(s: Idle<D>) -> Self {
        Self::Idle(s)
    }
}

impl<D: ComputeDevice> From<Done<D>> for Stage<D> {
    fn from(s: Done<D>) -> Self {
        Self::Done(s)
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Histogram equalization pipeline over a [`ComputeDevice`].
///
/// Pass `&mut device` to keep the device after the run.
pub struct Pipeline;

impl Pipeline {
    /// Create a pipeline for `source`. No device work happens until
    /// [`Idle::allocate`].
    #[allow(clippy::new_ret_no_self)]
    pub fn new<D: ComputeDevice>(
        device: D,
        source: SourceImage,
        config: EqualizeConfig,
    ) -> Idle<D> {
        Idle {
            run: Run {
                device,
                config,
                source,
                owned: Vec::new(),
                stages: Vec::new(),
                transfers: StageProfiler::new(TRANSFER_STAGE),
                totals: ProfileTotals::default(),
            },
        }
    }
}
