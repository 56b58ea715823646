//! Per-process memory monitor.
//!
//! A [`Monitor`] keeps the sample history of one process and decides whether
//! that process looks like it is leaking. The trend detector works on a
//! baseline (the largest size confirmed so far): a sample only counts as an
//! increase when it exceeds the baseline by more than `threshold_size`, and
//! the baseline then moves up to that sample. Decreases never undo an
//! increase, so a garbage-collection dip cannot reset the detector.
//!
//! The serialized form of a `Monitor` is its snapshot: every field below,
//! with unknown sizes as `null`.

use serde::{Deserialize, Serialize};

use crate::collector::{MemorySource, MemoryUsage};
use crate::fmt::{FmtStyle, format_bytes};

/// Smallest growth over the baseline that counts as an increase: 10 MiB.
pub const DEFAULT_THRESHOLD_SIZE: u64 = 10 * 1024 * 1024;

/// Number of confirmed increases after which a process is leaking.
pub const DEFAULT_INCREASE_LIMIT: u32 = 20;

/// Construction-time configuration of a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Minimum growth (bytes) over the baseline to count as an increase.
    pub threshold_size: u64,
    /// Increases that constitute a leak. `None` disables the check.
    pub increase_limit: Option<u32>,
    /// Absolute resident-size ceiling (bytes). `None` disables the check.
    pub maximum_size_limit: Option<u64>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            threshold_size: DEFAULT_THRESHOLD_SIZE,
            increase_limit: Some(DEFAULT_INCREASE_LIMIT),
            maximum_size_limit: None,
        }
    }
}

/// Sampling history and leak state for a single process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    process_id: u32,
    sample_count: u64,
    current_size: Option<u64>,
    current_shared_size: Option<u64>,
    current_private_size: Option<u64>,
    /// Baseline for trend detection.
    maximum_size: Option<u64>,
    maximum_size_limit: Option<u64>,
    threshold_size: u64,
    increase_count: u32,
    increase_limit: Option<u32>,
}

impl Monitor {
    /// Creates a monitor with the default options.
    pub fn new(process_id: u32) -> Self {
        Self::with_options(process_id, MonitorOptions::default())
    }

    pub fn with_options(process_id: u32, options: MonitorOptions) -> Self {
        Self {
            process_id,
            sample_count: 0,
            current_size: None,
            current_shared_size: None,
            current_private_size: None,
            maximum_size: None,
            maximum_size_limit: options.maximum_size_limit,
            threshold_size: options.threshold_size,
            increase_count: 0,
            increase_limit: options.increase_limit,
        }
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Resident size at the last sample, in bytes.
    pub fn current_size(&self) -> Option<u64> {
        self.current_size
    }

    pub fn current_shared_size(&self) -> Option<u64> {
        self.current_shared_size
    }

    pub fn current_private_size(&self) -> Option<u64> {
        self.current_private_size
    }

    /// The baseline: the largest resident size confirmed as an increase.
    pub fn maximum_size(&self) -> Option<u64> {
        self.maximum_size
    }

    pub fn maximum_size_limit(&self) -> Option<u64> {
        self.maximum_size_limit
    }

    pub fn threshold_size(&self) -> u64 {
        self.threshold_size
    }

    pub fn increase_count(&self) -> u32 {
        self.increase_count
    }

    pub fn increase_limit(&self) -> Option<u32> {
        self.increase_limit
    }

    /// The options this monitor was built with.
    pub fn options(&self) -> MonitorOptions {
        MonitorOptions {
            threshold_size: self.threshold_size,
            increase_limit: self.increase_limit,
            maximum_size_limit: self.maximum_size_limit,
        }
    }

    /// Overwrites the resident size without taking a sample.
    ///
    /// Sample count, baseline and increase count are left alone.
    pub fn set_current_size(&mut self, size: u64) {
        self.current_size = Some(size);
    }

    /// Queries `source` for this process and records the result.
    ///
    /// Returns the resident size; 0 if the process could not be measured.
    pub fn sample<S: MemorySource + ?Sized>(&mut self, source: &S) -> u64 {
        let usage = source.memory_usage(self.process_id);
        self.sample_with(usage)
    }

    /// Records a reading obtained elsewhere (e.g. a bulk query).
    ///
    /// `None` means the process could not be measured: resident size is
    /// recorded as 0 and the breakdown as unknown.
    pub fn sample_with(&mut self, usage: Option<MemoryUsage>) -> u64 {
        let usage = usage.unwrap_or_default();

        self.sample_count += 1;
        self.current_size = Some(usage.resident_size);
        self.current_shared_size = usage.shared_size;
        self.current_private_size = usage.private_size;

        self.track_increase(usage.resident_size);

        usage.resident_size
    }

    fn track_increase(&mut self, size: u64) {
        let Some(baseline) = self.maximum_size else {
            self.maximum_size = Some(size);
            return;
        };

        if size.saturating_sub(baseline) > self.threshold_size {
            self.maximum_size = Some(size);
            self.increase_count += 1;

            tracing::debug!(
                pid = self.process_id,
                size,
                baseline,
                increase_count = self.increase_count,
                "memory increase confirmed"
            );
        }
    }

    /// Whether the number of confirmed increases reached the limit.
    pub fn increase_limit_exceeded(&self) -> bool {
        self.increase_limit
            .is_some_and(|limit| self.increase_count >= limit)
    }

    /// Whether the resident size is above the absolute ceiling.
    pub fn maximum_size_limit_exceeded(&self) -> bool {
        match (self.maximum_size_limit, self.current_size) {
            (Some(limit), Some(size)) => size > limit,
            _ => false,
        }
    }

    /// Whether this process is judged to be leaking.
    pub fn leaking(&self) -> bool {
        self.increase_limit_exceeded() || self.maximum_size_limit_exceeded()
    }
}

impl std::fmt::Display for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let size = |value: Option<u64>| {
            value.map_or_else(|| "-".to_string(), |v| format_bytes(v, FmtStyle::Compact))
        };

        write!(
            f,
            "pid={} size={} private={} baseline={} increases={}",
            self.process_id,
            size(self.current_size),
            size(self.current_private_size),
            size(self.maximum_size),
            self.increase_count,
        )?;
        if let Some(limit) = self.increase_limit {
            write!(f, "/{}", limit)?;
        }
        Ok(())
    }
}
