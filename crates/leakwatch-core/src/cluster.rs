//! Cluster-wide leak detection and memory limit enforcement.
//!
//! A [`Cluster`] owns one [`Monitor`] per supervised process. Each check
//! resamples every monitor with a single bulk query, reports the leaking
//! processes, then runs up to two independent enforcement passes:
//!
//! - **Total size**: the cluster's memory is estimated as the largest shared
//!   size plus the sum of private sizes, so shared libraries mapped into
//!   every worker are counted once. While the estimate is above the limit,
//!   processes are selected largest-private-size first.
//! - **Free memory**: while host free memory (plus what the selected
//!   processes will give back) is below the minimum, processes are selected
//!   largest-private-size first.
//!
//! Both passes only consider processes with a known private size. Every
//! selection is handed to the caller's callback, which terminates the
//! process (or not) and answers with a [`Disposition`]. The cluster removes a
//! monitor only when the callback returns [`Disposition::Remove`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collector::MemorySource;
use crate::fmt::{FmtStyle, format_bytes};
use crate::monitor::{Monitor, MonitorOptions};

/// Why a process was handed to the check callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    /// The monitor reports the process as leaking.
    Leaking { monitor: &'a Monitor },
    /// The cluster total is above the limit. `total_size` is the running
    /// estimate at the time of this selection.
    TotalSizeExceeded { monitor: &'a Monitor, total_size: u64 },
    /// Free memory is below the minimum. `free_size` is the running
    /// estimate (measured free memory plus what earlier selections free).
    FreeMemoryBelowMinimum { monitor: &'a Monitor, free_size: u64 },
}

impl<'a> Selection<'a> {
    pub fn process_id(&self) -> u32 {
        self.monitor().process_id()
    }

    pub fn monitor(&self) -> &'a Monitor {
        match *self {
            Selection::Leaking { monitor }
            | Selection::TotalSizeExceeded { monitor, .. }
            | Selection::FreeMemoryBelowMinimum { monitor, .. } => monitor,
        }
    }

    /// The running metric for limit selections; `None` for leaks.
    pub fn metric(&self) -> Option<u64> {
        match *self {
            Selection::Leaking { .. } => None,
            Selection::TotalSizeExceeded { total_size, .. } => Some(total_size),
            Selection::FreeMemoryBelowMinimum { free_size, .. } => Some(free_size),
        }
    }

    /// Short machine-friendly reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Selection::Leaking { .. } => "leaking",
            Selection::TotalSizeExceeded { .. } => "total_size_exceeded",
            Selection::FreeMemoryBelowMinimum { .. } => "free_memory_below_minimum",
        }
    }
}

/// What the cluster should do with a monitor after its callback returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The caller has terminated (or given up on) the process; drop its monitor.
    Remove,
    /// Keep monitoring the process.
    Retain,
}

/// Outcome of [`Cluster::check_with`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckReport {
    /// Leaking processes in cluster order, as they were when detected.
    pub leaking: Vec<(u32, Monitor)>,
    /// Processes selected by the total-size pass, in selection order.
    pub total_size_selected: Vec<u32>,
    /// Processes selected by the free-memory pass, in selection order.
    pub free_memory_selected: Vec<u32>,
    /// Processes removed because the callback asked for it.
    pub removed: Vec<u32>,
}

impl CheckReport {
    /// Whether no process was selected by any pass.
    pub fn is_quiet(&self) -> bool {
        self.leaking.is_empty()
            && self.total_size_selected.is_empty()
            && self.free_memory_selected.is_empty()
    }
}

/// Serializable view of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub total_size: Option<u64>,
    pub total_size_limit: Option<u64>,
    pub free_size_minimum: Option<u64>,
    pub processes: BTreeMap<u32, Monitor>,
}

/// A supervised group of processes sharing one memory source.
///
/// Monitors are kept in insertion order, which is the order leaks are
/// reported in. Process IDs are unique.
pub struct Cluster<S: MemorySource> {
    source: S,
    processes: Vec<Monitor>,
    total_size: Option<u64>,
    total_size_limit: Option<u64>,
    free_size_minimum: Option<u64>,
}

impl<S: MemorySource> Cluster<S> {
    /// Creates an empty cluster without limits.
    pub fn new(source: S) -> Self {
        Self {
            source,
            processes: Vec::new(),
            total_size: None,
            total_size_limit: None,
            free_size_minimum: None,
        }
    }

    /// Limits the estimated total memory of the cluster (bytes).
    pub fn with_total_size_limit(mut self, limit: u64) -> Self {
        self.total_size_limit = Some(limit);
        self
    }

    /// Requires at least this much free host memory (bytes).
    ///
    /// Has no effect when the source cannot report free memory.
    pub fn with_free_size_minimum(mut self, minimum: u64) -> Self {
        self.free_size_minimum = Some(minimum);
        self
    }

    pub fn set_total_size_limit(&mut self, limit: Option<u64>) {
        self.total_size_limit = limit;
    }

    pub fn set_free_size_minimum(&mut self, minimum: Option<u64>) {
        self.free_size_minimum = minimum;
    }

    pub fn total_size_limit(&self) -> Option<u64> {
        self.total_size_limit
    }

    pub fn free_size_minimum(&self) -> Option<u64> {
        self.free_size_minimum
    }

    /// Total size estimate left by the last total-size pass.
    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn contains(&self, process_id: u32) -> bool {
        self.position(process_id).is_some()
    }

    pub fn get(&self, process_id: u32) -> Option<&Monitor> {
        self.processes.iter().find(|m| m.process_id() == process_id)
    }

    pub fn get_mut(&mut self, process_id: u32) -> Option<&mut Monitor> {
        self.processes
            .iter_mut()
            .find(|m| m.process_id() == process_id)
    }

    /// Monitors in cluster order.
    pub fn iter(&self) -> impl Iterator<Item = &Monitor> {
        self.processes.iter()
    }

    pub fn process_ids(&self) -> Vec<u32> {
        self.processes.iter().map(Monitor::process_id).collect()
    }

    fn position(&self, process_id: u32) -> Option<usize> {
        self.processes
            .iter()
            .position(|m| m.process_id() == process_id)
    }

    /// Starts monitoring a process.
    ///
    /// An existing monitor for the same ID is replaced in place, keeping its
    /// position in the cluster order.
    pub fn add(&mut self, process_id: u32, options: MonitorOptions) -> &mut Monitor {
        let monitor = Monitor::with_options(process_id, options);
        let index = match self.position(process_id) {
            Some(index) => {
                self.processes[index] = monitor;
                index
            }
            None => {
                self.processes.push(monitor);
                self.processes.len() - 1
            }
        };
        &mut self.processes[index]
    }

    /// Stops monitoring a process. Removing an unknown ID is a no-op.
    pub fn remove(&mut self, process_id: u32) -> Option<Monitor> {
        let index = self.position(process_id)?;
        Some(self.processes.remove(index))
    }

    /// Refreshes every monitor with one bulk query to the source.
    pub fn sample_all(&mut self) {
        let process_ids = self.process_ids();
        let usages = self.source.memory_usages(&process_ids);

        for monitor in &mut self.processes {
            monitor.sample_with(usages.get(&monitor.process_id()).copied());
        }

        debug!(
            processes = process_ids.len(),
            measured = usages.len(),
            "sampled cluster"
        );
    }

    /// Resamples every monitor and returns the leaking ones.
    ///
    /// Without a callback there is nobody to act on a limit, so the
    /// enforcement passes do not run.
    pub fn check(&mut self) -> Vec<(u32, Monitor)> {
        self.sample_all();

        self.processes
            .iter()
            .filter(|monitor| monitor.leaking())
            .inspect(|monitor| log_leak(monitor))
            .map(|monitor| (monitor.process_id(), monitor.clone()))
            .collect()
    }

    /// Resamples every monitor, reports leaks and enforces the limits.
    ///
    /// `callback` is invoked once per selected process, synchronously and in
    /// selection order. Every leaking process is reported. The limit passes
    /// stop as soon as their running estimate satisfies the limit, and they
    /// account for a selected process as freed whatever the callback answers.
    pub fn check_with<F>(&mut self, mut callback: F) -> CheckReport
    where
        F: FnMut(&Selection<'_>) -> Disposition,
    {
        self.sample_all();

        let mut report = CheckReport::default();

        let leaking: Vec<u32> = self
            .processes
            .iter()
            .filter(|monitor| monitor.leaking())
            .map(Monitor::process_id)
            .collect();

        for process_id in leaking {
            let disposition = {
                let Some(monitor) = self.get(process_id) else {
                    continue;
                };
                log_leak(monitor);
                report.leaking.push((process_id, monitor.clone()));
                callback(&Selection::Leaking { monitor })
            };
            self.apply(process_id, disposition, &mut report);
        }

        if let Some(limit) = self.total_size_limit {
            self.enforce_total_size_limit(limit, &mut callback, &mut report);
        }

        if let Some(minimum) = self.free_size_minimum {
            self.enforce_free_size_minimum(minimum, &mut callback, &mut report);
        }

        report
    }

    fn apply(&mut self, process_id: u32, disposition: Disposition, report: &mut CheckReport) {
        if disposition == Disposition::Remove && self.remove(process_id).is_some() {
            report.removed.push(process_id);
        }
    }

    /// Processes with a known private size, largest first.
    ///
    /// The sort is stable, so equal sizes keep cluster order.
    fn candidates_by_private_size(&self) -> Vec<(u32, u64)> {
        let mut candidates: Vec<(u32, u64)> = self
            .processes
            .iter()
            .filter_map(|m| m.current_private_size().map(|size| (m.process_id(), size)))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        candidates
    }

    fn enforce_total_size_limit<F>(&mut self, limit: u64, callback: &mut F, report: &mut CheckReport)
    where
        F: FnMut(&Selection<'_>) -> Disposition,
    {
        let eligible = || {
            self.processes
                .iter()
                .filter(|m| m.current_private_size().is_some())
        };

        // Held fixed for the whole pass: rescanning the remaining monitors
        // after every selection is deliberately avoided.
        let maximum_shared_size = eligible()
            .filter_map(Monitor::current_shared_size)
            .max()
            .unwrap_or(0);
        let mut sum_private_size = eligible()
            .filter_map(Monitor::current_private_size)
            .fold(0u64, u64::saturating_add);
        let mut total_size = maximum_shared_size.saturating_add(sum_private_size);
        self.total_size = Some(total_size);

        if total_size <= limit {
            info!(
                total_size = %format_bytes(total_size, FmtStyle::Compact),
                limit = %format_bytes(limit, FmtStyle::Compact),
                "total size within limit"
            );
            return;
        }

        warn!(
            total_size = %format_bytes(total_size, FmtStyle::Compact),
            limit = %format_bytes(limit, FmtStyle::Compact),
            "total size exceeded limit"
        );

        for (process_id, private_size) in self.candidates_by_private_size() {
            if total_size <= limit {
                break;
            }

            let disposition = {
                let Some(monitor) = self.get(process_id) else {
                    continue;
                };
                callback(&Selection::TotalSizeExceeded {
                    monitor,
                    total_size,
                })
            };
            report.total_size_selected.push(process_id);
            self.apply(process_id, disposition, report);

            sum_private_size = sum_private_size.saturating_sub(private_size);
            total_size = maximum_shared_size.saturating_add(sum_private_size);
        }

        self.total_size = Some(total_size);
    }

    fn enforce_free_size_minimum<F>(
        &mut self,
        minimum: u64,
        callback: &mut F,
        report: &mut CheckReport,
    ) where
        F: FnMut(&Selection<'_>) -> Disposition,
    {
        let Some(free_size) = self.source.free_memory() else {
            return;
        };

        if free_size >= minimum {
            info!(
                free_size = %format_bytes(free_size, FmtStyle::Compact),
                minimum = %format_bytes(minimum, FmtStyle::Compact),
                "free memory above minimum"
            );
            return;
        }

        warn!(
            free_size = %format_bytes(free_size, FmtStyle::Compact),
            minimum = %format_bytes(minimum, FmtStyle::Compact),
            "free memory below minimum"
        );

        // Free memory is not re-read mid-pass: the kernel reclaims a killed
        // process's memory asynchronously.
        let mut freed_estimate: u64 = 0;
        for (process_id, private_size) in self.candidates_by_private_size() {
            let estimate = free_size.saturating_add(freed_estimate);
            if estimate >= minimum {
                break;
            }

            let disposition = {
                let Some(monitor) = self.get(process_id) else {
                    continue;
                };
                callback(&Selection::FreeMemoryBelowMinimum {
                    monitor,
                    free_size: estimate,
                })
            };
            report.free_memory_selected.push(process_id);
            self.apply(process_id, disposition, report);

            freed_estimate = freed_estimate.saturating_add(private_size);
        }
    }

    /// Serializable view of the cluster as it is now.
    pub fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            total_size: self.total_size,
            total_size_limit: self.total_size_limit,
            free_size_minimum: self.free_size_minimum,
            processes: self
                .processes
                .iter()
                .map(|m| (m.process_id(), m.clone()))
                .collect(),
        }
    }
}

fn log_leak(monitor: &Monitor) {
    warn!(
        pid = monitor.process_id(),
        size = %monitor.current_size().map_or_else(|| "-".to_string(), |s| format_bytes(s, FmtStyle::Compact)),
        increase_count = monitor.increase_count(),
        increase_limit_exceeded = monitor.increase_limit_exceeded(),
        maximum_size_limit_exceeded = monitor.maximum_size_limit_exceeded(),
        "process is leaking"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MemoryUsage, MockSource};

    fn no_increase_limit() -> MonitorOptions {
        MonitorOptions {
            increase_limit: None,
            ..MonitorOptions::default()
        }
    }

    /// Cluster whose processes 1..=n have the given private sizes and
    /// `shared` shared size each.
    fn cluster_with(shared: u64, private_sizes: &[u64]) -> Cluster<MockSource> {
        let mut source = MockSource::new();
        let mut cluster_pids = Vec::new();
        for (index, &private) in private_sizes.iter().enumerate() {
            let pid = index as u32 + 1;
            source.set_breakdown(pid, shared, private);
            cluster_pids.push(pid);
        }

        let mut cluster = Cluster::new(source);
        for pid in cluster_pids {
            cluster.add(pid, no_increase_limit());
        }
        cluster
    }

    #[test]
    fn test_add_and_remove() {
        let mut cluster = Cluster::new(MockSource::new());
        cluster.add(10, MonitorOptions::default());
        cluster.add(20, MonitorOptions::default());

        assert_eq!(cluster.len(), 2);
        assert_eq!(cluster.process_ids(), vec![10, 20]);

        assert!(cluster.remove(10).is_some());
        assert_eq!(cluster.process_ids(), vec![20]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut cluster = Cluster::new(MockSource::new());
        cluster.add(10, MonitorOptions::default());

        assert!(cluster.remove(99).is_none());
        assert!(cluster.remove(99).is_none());
        assert_eq!(cluster.process_ids(), vec![10]);
    }

    #[test]
    fn test_add_overwrites_in_place() {
        let mut cluster = Cluster::new(MockSource::new());
        cluster.add(1, MonitorOptions::default());
        cluster.add(2, MonitorOptions::default());
        cluster.get_mut(1).unwrap().set_current_size(500);

        let options = MonitorOptions {
            threshold_size: 1,
            ..MonitorOptions::default()
        };
        cluster.add(1, options);

        assert_eq!(cluster.process_ids(), vec![1, 2]);
        let monitor = cluster.get(1).unwrap();
        assert_eq!(monitor.threshold_size(), 1);
        assert_eq!(monitor.current_size(), None);
    }

    #[test]
    fn test_sample_all_uses_one_bulk_query() {
        let mut cluster = cluster_with(10, &[50, 30, 20]);

        cluster.sample_all();

        assert_eq!(cluster.source().bulk_queries(), 1);
        assert_eq!(cluster.source().single_queries(), 0);
        for monitor in cluster.iter() {
            assert_eq!(monitor.sample_count(), 1);
        }
        assert_eq!(cluster.get(1).unwrap().current_private_size(), Some(50));
    }

    #[test]
    fn test_sample_all_dead_process_reads_zero() {
        let mut cluster = cluster_with(10, &[50]);
        cluster.add(77, MonitorOptions::default());

        cluster.sample_all();

        let dead = cluster.get(77).unwrap();
        assert_eq!(dead.current_size(), Some(0));
        assert_eq!(dead.current_private_size(), None);
    }

    #[test]
    fn test_check_without_limits_or_leaks() {
        let mut cluster = cluster_with(10, &[50, 30]);
        let mut calls = 0;

        let report = cluster.check_with(|_| {
            calls += 1;
            Disposition::Retain
        });

        assert!(report.leaking.is_empty());
        assert!(report.is_quiet());
        assert_eq!(calls, 0);
        assert!(cluster.check().is_empty());
    }

    #[test]
    fn test_check_reports_all_leaks_in_order() {
        let mut source = MockSource::new();
        source.set_resident(3, 300);
        source.set_resident(1, 100);
        source.set_resident(2, 200);
        let mut cluster = Cluster::new(source);
        let limit = |maximum_size_limit| MonitorOptions {
            maximum_size_limit: Some(maximum_size_limit),
            ..MonitorOptions::default()
        };
        cluster.add(3, limit(10));
        cluster.add(1, limit(10));
        cluster.add(2, limit(1000));

        let mut seen = Vec::new();
        let report = cluster.check_with(|selection| {
            assert!(matches!(selection, Selection::Leaking { .. }));
            assert_eq!(selection.metric(), None);
            seen.push(selection.process_id());
            Disposition::Retain
        });

        assert_eq!(seen, vec![3, 1]);
        let leaking: Vec<u32> = report.leaking.iter().map(|(pid, _)| *pid).collect();
        assert_eq!(leaking, vec![3, 1]);
        assert!(report.removed.is_empty());
        assert_eq!(cluster.len(), 3);
    }

    #[test]
    fn test_check_without_callback_returns_leaks_only() {
        let mut cluster = cluster_with(10, &[50, 30, 20]).with_total_size_limit(1);
        cluster.add(
            9,
            MonitorOptions {
                maximum_size_limit: Some(0),
                ..MonitorOptions::default()
            },
        );
        cluster.source_mut().set_resident(9, 1);

        let leaking = cluster.check();

        assert_eq!(leaking.len(), 1);
        assert_eq!(leaking[0].0, 9);
        assert_eq!(leaking[0].1.current_size(), Some(1));
        assert_eq!(cluster.len(), 4);
        assert_eq!(cluster.total_size(), None);
    }

    #[test]
    fn test_leak_removal_is_callers_choice() {
        let mut source = MockSource::new();
        source.set_resident(1, 100);
        source.set_resident(2, 100);
        let mut cluster = Cluster::new(source);
        let leaky = MonitorOptions {
            maximum_size_limit: Some(10),
            ..MonitorOptions::default()
        };
        cluster.add(1, leaky);
        cluster.add(2, leaky);

        let report = cluster.check_with(|selection| {
            if selection.process_id() == 1 {
                Disposition::Remove
            } else {
                Disposition::Retain
            }
        });

        assert_eq!(report.leaking.len(), 2);
        assert_eq!(report.removed, vec![1]);
        assert_eq!(cluster.process_ids(), vec![2]);
    }

    #[test]
    fn test_total_size_stops_once_within_limit() {
        let mut cluster = cluster_with(10, &[50, 30, 20]).with_total_size_limit(70);
        let mut calls = Vec::new();

        let report = cluster.check_with(|selection| {
            calls.push((selection.process_id(), selection.metric()));
            Disposition::Remove
        });

        assert_eq!(calls, vec![(1, Some(110))]);
        assert_eq!(report.total_size_selected, vec![1]);
        assert_eq!(cluster.process_ids(), vec![2, 3]);
        assert_eq!(cluster.total_size(), Some(60));
    }

    #[test]
    fn test_total_size_within_limit() {
        let mut cluster = cluster_with(10, &[50, 30, 20]).with_total_size_limit(110);
        let mut calls = 0;

        cluster.check_with(|_| {
            calls += 1;
            Disposition::Remove
        });

        assert_eq!(calls, 0);
        assert_eq!(cluster.total_size(), Some(110));
        assert_eq!(cluster.len(), 3);
    }

    #[test]
    fn test_total_size_selects_largest_first() {
        let mut source = MockSource::new();
        source.set_breakdown(1, 5, 20);
        source.set_breakdown(2, 10, 60);
        source.set_breakdown(3, 8, 40);
        let mut cluster = Cluster::new(source).with_total_size_limit(40);
        for pid in [1, 2, 3] {
            cluster.add(pid, no_increase_limit());
        }

        let mut calls = Vec::new();
        cluster.check_with(|selection| {
            calls.push((selection.process_id(), selection.metric()));
            Disposition::Retain
        });

        // 10 + 120 = 130 -> 70 -> 30
        assert_eq!(calls, vec![(2, Some(130)), (3, Some(70))]);
        assert_eq!(cluster.total_size(), Some(30));
    }

    #[test]
    fn test_total_size_holds_shared_size_fixed() {
        // Removing the process with the largest shared size does not lower
        // the shared term of the estimate.
        let mut source = MockSource::new();
        source.set_breakdown(1, 100, 50);
        source.set_breakdown(2, 10, 40);
        let mut cluster = Cluster::new(source).with_total_size_limit(120);
        for pid in [1, 2] {
            cluster.add(pid, no_increase_limit());
        }

        let mut calls = Vec::new();
        cluster.check_with(|selection| {
            calls.push(selection.metric());
            Disposition::Remove
        });

        // 100 + 90 = 190 -> 100 + 40 = 140 -> 100 + 0 = 100
        assert_eq!(calls, vec![Some(190), Some(140)]);
        assert!(cluster.is_empty());
    }

    #[test]
    fn test_total_size_ignores_unknown_private_size() {
        let mut cluster = cluster_with(10, &[50, 30]).with_total_size_limit(0);
        cluster.add(99, no_increase_limit());
        cluster.source_mut().set_resident(99, 10_000);

        let mut selected = Vec::new();
        cluster.check_with(|selection| {
            selected.push(selection.process_id());
            Disposition::Retain
        });

        assert_eq!(selected, vec![1, 2]);
        assert_eq!(cluster.total_size(), Some(10));
    }

    #[test]
    fn test_total_size_with_no_eligible_processes() {
        let mut source = MockSource::new();
        source.set_resident(1, 1_000_000);
        let mut cluster = Cluster::new(source).with_total_size_limit(0);
        cluster.add(1, no_increase_limit());

        let report = cluster.check_with(|_| Disposition::Remove);

        assert!(report.total_size_selected.is_empty());
        assert_eq!(cluster.total_size(), Some(0));
    }

    #[test]
    fn test_total_size_saturates_on_huge_private_sizes() {
        let half = u64::MAX / 2 + 1;
        let mut cluster = cluster_with(0, &[half, half]).with_total_size_limit(1);

        let mut calls = Vec::new();
        cluster.check_with(|selection| {
            calls.push((selection.process_id(), selection.metric()));
            Disposition::Retain
        });

        assert_eq!(calls, vec![(1, Some(u64::MAX)), (2, Some(u64::MAX - half))]);
        assert_eq!(cluster.total_size(), Some(0));
    }

    #[test]
    fn test_free_memory_stops_once_above_minimum() {
        let mut cluster = cluster_with(10, &[60, 40, 20]).with_free_size_minimum(150);
        cluster.source_mut().set_free_memory(Some(100));

        let mut calls = Vec::new();
        let report = cluster.check_with(|selection| {
            assert!(matches!(selection, Selection::FreeMemoryBelowMinimum { .. }));
            calls.push((selection.process_id(), selection.metric()));
            Disposition::Remove
        });

        assert_eq!(calls, vec![(1, Some(100))]);
        assert_eq!(report.free_memory_selected, vec![1]);
        assert_eq!(cluster.process_ids(), vec![2, 3]);
    }

    #[test]
    fn test_free_memory_running_estimate() {
        let mut cluster = cluster_with(10, &[20, 60, 40]).with_free_size_minimum(200);
        cluster.source_mut().set_free_memory(Some(100));

        let mut calls = Vec::new();
        cluster.check_with(|selection| {
            calls.push((selection.process_id(), selection.metric()));
            Disposition::Retain
        });

        assert_eq!(calls, vec![(2, Some(100)), (3, Some(160))]);
    }

    #[test]
    fn test_free_memory_exhausts_candidates() {
        let mut cluster = cluster_with(10, &[10, 20]).with_free_size_minimum(1000);
        cluster.source_mut().set_free_memory(Some(0));

        let report = cluster.check_with(|_| Disposition::Remove);

        assert_eq!(report.free_memory_selected, vec![2, 1]);
        assert!(cluster.is_empty());
    }

    #[test]
    fn test_free_memory_above_minimum() {
        let mut cluster = cluster_with(10, &[60]).with_free_size_minimum(150);
        cluster.source_mut().set_free_memory(Some(150));

        let report = cluster.check_with(|_| Disposition::Remove);

        assert!(report.is_quiet());
        assert_eq!(cluster.len(), 1);
    }

    #[test]
    fn test_free_memory_unsupported_is_noop() {
        let mut cluster = cluster_with(10, &[60]).with_free_size_minimum(u64::MAX);

        let report = cluster.check_with(|_| Disposition::Remove);

        assert!(report.is_quiet());
        assert_eq!(cluster.len(), 1);
    }

    #[test]
    fn test_removed_processes_are_not_selected_again() {
        let mut cluster = cluster_with(10, &[50, 30, 20])
            .with_total_size_limit(70)
            .with_free_size_minimum(150);
        cluster.source_mut().set_free_memory(Some(100));

        let mut calls = Vec::new();
        let report = cluster.check_with(|selection| {
            calls.push((selection.reason(), selection.process_id()));
            Disposition::Remove
        });

        assert_eq!(
            calls,
            vec![
                ("total_size_exceeded", 1),
                ("free_memory_below_minimum", 2),
                ("free_memory_below_minimum", 3),
            ]
        );
        assert_eq!(report.removed, vec![1, 2, 3]);
    }

    #[test]
    fn test_retained_processes_can_be_selected_by_both_passes() {
        let mut cluster = cluster_with(10, &[50, 30, 20])
            .with_total_size_limit(70)
            .with_free_size_minimum(160);
        cluster.source_mut().set_free_memory(Some(100));

        let report = cluster.check_with(|_| Disposition::Retain);

        assert_eq!(report.total_size_selected, vec![1]);
        assert_eq!(report.free_memory_selected, vec![1, 2]);
        assert_eq!(cluster.len(), 3);
    }

    #[test]
    fn test_snapshot() {
        let mut cluster = cluster_with(10, &[50, 30]).with_total_size_limit(1000);
        cluster.check_with(|_| Disposition::Retain);

        let snapshot = cluster.snapshot();

        assert_eq!(snapshot.total_size, Some(90));
        assert_eq!(snapshot.total_size_limit, Some(1000));
        assert_eq!(snapshot.free_size_minimum, None);
        assert_eq!(snapshot.processes.len(), 2);
        assert_eq!(snapshot.processes[&1].current_private_size(), Some(50));
    }

    #[test]
    fn test_leak_reported_with_bulk_sample_values() {
        let mut cluster = Cluster::new(MockSource::new());
        cluster.add(
            1,
            MonitorOptions {
                threshold_size: 10,
                increase_limit: Some(2),
                maximum_size_limit: None,
            },
        );

        for size in [100, 200, 300] {
            cluster.source_mut().set(1, MemoryUsage::resident(size));
            let leaking = cluster.check();
            if size < 300 {
                assert!(leaking.is_empty());
            } else {
                assert_eq!(leaking[0].1.increase_count(), 2);
            }
        }
    }
}
