//! Device profiling: per-command timestamps, per-stage profiles, and
//! run totals.
//!
//! Every device command yields a [`StageTiming`] with four timestamps.
//! A [`StageProfiler`] collects the timings of one logical stage (one or
//! more submissions), and on [`finish`](StageProfiler::finish) folds the
//! stage into the run's [`ProfileTotals`]. The finished profiles form a
//! [`TimingReport`].
//!
//! Detailed figures at coarser [`ProfilingResolution`]s are truncated
//! per quantity, so a coarse total need not equal the sum of its coarse
//! parts. The nanosecond figures are exact.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Timestamps of one device command, in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Command entered the queue.
    pub queued: u64,
    /// Command was handed to the device.
    pub submitted: u64,
    /// Device began executing.
    pub started: u64,
    /// Device finished executing.
    pub ended: u64,
}

impl StageTiming {
    /// Build from the four timestamps.
    #[must_use]
    pub const fn new(queued: u64, submitted: u64, started: u64, ended: u64) -> Self {
        Self {
            queued,
            submitted,
            started,
            ended,
        }
    }

    /// `ended - started`.
    #[must_use]
    pub const fn execution_ns(&self) -> u64 {
        self.ended.saturating_sub(self.started)
    }

    /// `started - submitted`.
    #[must_use]
    pub const fn submission_ns(&self) -> u64 {
        self.started.saturating_sub(self.submitted)
    }

    /// `submitted - queued`.
    #[must_use]
    pub const fn queueing_ns(&self) -> u64 {
        self.submitted.saturating_sub(self.queued)
    }

    /// `ended - queued`.
    #[must_use]
    pub const fn total_ns(&self) -> u64 {
        self.ended.saturating_sub(self.queued)
    }
}

/// Unit for detailed profiling output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfilingResolution {
    /// Nanoseconds.
    #[serde(rename = "ns")]
    Nanoseconds,
    /// Microseconds.
    #[default]
    #[serde(rename = "us")]
    Microseconds,
    /// Milliseconds.
    #[serde(rename = "ms")]
    Milliseconds,
    /// Seconds.
    #[serde(rename = "s")]
    Seconds,
}

impl ProfilingResolution {
    /// Nanoseconds per unit.
    #[must_use]
    pub const fn divisor(self) -> u64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
        }
    }

    /// Unit suffix.
    #[must_use]
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        }
    }

    /// Convert nanoseconds to this unit, truncating.
    #[must_use]
    pub const fn scale(self, ns: u64) -> u64 {
        ns / self.divisor()
    }
}

impl fmt::Display for ProfilingResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.unit())
    }
}

/// Aggregated timing of one pipeline stage.
///
/// Each derived quantity is the sum over the stage's submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageProfile {
    /// Display name of the stage.
    pub stage: &'static str,
    /// Number of device commands observed.
    pub submissions: u32,
    /// Summed `ended - started`.
    pub execution_ns: u64,
    /// Summed `started - submitted`.
    pub submission_ns: u64,
    /// Summed `submitted - queued`.
    pub queueing_ns: u64,
    /// Summed `ended - queued`.
    pub total_ns: u64,
}

impl StageProfile {
    const fn empty(stage: &'static str) -> Self {
        Self {
            stage,
            submissions: 0,
            execution_ns: 0,
            submission_ns: 0,
            queueing_ns: 0,
            total_ns: 0,
        }
    }

    /// One-line execution time in nanoseconds.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!("{} execution time in nanoseconds: {}", self.stage, self.execution_ns)
    }

    /// Queue, submission, execution, and total time at `resolution`.
    #[must_use]
    pub fn detailed(&self, resolution: ProfilingResolution) -> String {
        format!(
            "Queued {}, Submitted {}, Executed {}, Total {} [{}]",
            resolution.scale(self.queueing_ns),
            resolution.scale(self.submission_ns),
            resolution.scale(self.execution_ns),
            resolution.scale(self.total_ns),
            resolution.unit(),
        )
    }
}

/// Collects the device timings of one stage.
#[derive(Debug, Clone)]
pub struct StageProfiler {
    profile: StageProfile,
}

impl StageProfiler {
    /// Start profiling the named stage.
    #[must_use]
    pub const fn new(stage: &'static str) -> Self {
        Self {
            profile: StageProfile::empty(stage),
        }
    }

    /// Record one device command.
    pub const fn observe(&mut self, timing: StageTiming) {
        let p = &mut self.profile;
        p.submissions = p.submissions.saturating_add(1);
        p.execution_ns = p.execution_ns.saturating_add(timing.execution_ns());
        p.submission_ns = p.submission_ns.saturating_add(timing.submission_ns());
        p.queueing_ns = p.queueing_ns.saturating_add(timing.queueing_ns());
        p.total_ns = p.total_ns.saturating_add(timing.total_ns());
    }

    /// The profile so far.
    #[must_use]
    pub const fn profile(&self) -> &StageProfile {
        &self.profile
    }

    /// Close the stage, adding it to the run totals.
    pub fn finish(self, totals: &mut ProfileTotals) -> StageProfile {
        totals.add(&self.profile);
        tracing::debug!(
            stage = self.profile.stage,
            execution_ns = self.profile.execution_ns,
            submissions = self.profile.submissions,
            "stage profiled",
        );
        self.profile
    }
}

/// Run-wide accumulator of device time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProfileTotals {
    /// Summed execution time of every profiled command.
    pub execution_ns: u64,
    /// Summed queueing time.
    pub queueing_ns: u64,
    /// Summed submission time.
    pub submission_ns: u64,
}

impl ProfileTotals {
    /// Fold one stage into the totals.
    pub const fn add(&mut self, profile: &StageProfile) {
        self.execution_ns = self.execution_ns.saturating_add(profile.execution_ns);
        self.queueing_ns = self.queueing_ns.saturating_add(profile.queueing_ns);
        self.submission_ns = self.submission_ns.saturating_add(profile.submission_ns);
    }

    /// Execution + queueing + submission.
    #[must_use]
    pub const fn total_ns(&self) -> u64 {
        self.execution_ns
            .saturating_add(self.queueing_ns)
            .saturating_add(self.submission_ns)
    }
}

/// Profiling results of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimingReport {
    /// Device description.
    pub device: String,
    /// Kernel stages, in execution order.
    pub stages: Vec<StageProfile>,
    /// All buffer reads and writes of the run.
    pub transfers: StageProfile,
    /// Run totals (stages plus transfers).
    pub totals: ProfileTotals,
}

impl TimingReport {
    /// Look up a stage profile by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageProfile> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Format the report as human-readable text.
    #[must_use]
    pub fn report(&self, resolution: ProfilingResolution) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Device Profiling Report\n{}", "=".repeat(60)));
        lines.push(format!("Running on {}", self.device));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>14}  Detail [{}]",
            "Stage", "Execution (ns)", resolution
        ));
        lines.push("-".repeat(80));
        for profile in self.stages.iter().chain(std::iter::once(&self.transfers)) {
            lines.push(format!(
                "{:<24} {:>14}  {}",
                profile.stage,
                profile.execution_ns,
                profile.detailed(resolution),
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "{:<24} {:>14}",
            "Execution + transfers", self.totals.execution_ns
        ));
        lines.push(format!("{:<24} {:>14}", "Queueing", self.totals.queueing_ns));
        lines.push(format!("{:<24} {:>14}", "Submission", self.totals.submission_ns));
        lines.push(format!("{:<24} {:>14}", "Total (ns)", self.totals.total_ns()));

        lines.join("\n")
    }
}
