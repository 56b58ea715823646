//! The supervisor: keeps the cluster in sync with the process pool and acts
//! on every selection by signalling the process.

use std::collections::HashSet;
use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, error, info, warn};

use leakwatch_core::collector::{CollectError, FileSystem, ProcfsSource};
use leakwatch_core::fmt::{FmtStyle, format_bytes};
use leakwatch_core::{CheckReport, Cluster, Disposition, MonitorOptions, Selection};

/// Error type for supervisor failures.
#[derive(Debug)]
pub enum SuperviseError {
    /// Neither explicit PIDs nor a parent to discover children from.
    NoProcesses,
    /// PID cannot be signalled safely (0 or beyond `pid_t`).
    InvalidPid(u32),
    /// Sending the signal failed.
    Signal { pid: u32, errno: Errno },
    /// Listing the parent's children failed.
    Discovery(CollectError),
}

impl fmt::Display for SuperviseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuperviseError::NoProcesses => {
                write!(f, "nothing to monitor: pass --pid or --children-of")
            }
            SuperviseError::InvalidPid(pid) => write!(f, "refusing to signal pid {}", pid),
            SuperviseError::Signal { pid, errno } => {
                write!(f, "failed to signal pid {}: {}", pid, errno)
            }
            SuperviseError::Discovery(e) => write!(f, "process discovery failed: {}", e),
        }
    }
}

impl std::error::Error for SuperviseError {}

impl From<CollectError> for SuperviseError {
    fn from(e: CollectError) -> Self {
        SuperviseError::Discovery(e)
    }
}

/// Sends the configured signal to selected processes.
#[derive(Debug, Clone, Copy)]
pub struct Terminator {
    signal: Signal,
    dry_run: bool,
}

impl Terminator {
    pub fn new(signal: Signal, dry_run: bool) -> Self {
        Self { signal, dry_run }
    }

    /// Acts on one selection and tells the cluster whether to forget it.
    ///
    /// A process that is already gone counts as terminated. Any other
    /// failure keeps it monitored so the next cycle can try again.
    pub fn handle(&self, selection: &Selection<'_>) -> Disposition {
        let pid = selection.process_id();
        let monitor = selection.monitor();

        warn!(
            pid,
            reason = selection.reason(),
            metric = %selection.metric().map_or_else(|| "-".to_string(), |m| format_bytes(m, FmtStyle::Compact)),
            "{}",
            monitor
        );

        if self.dry_run {
            info!(pid, signal = %self.signal, "dry run, not signalling");
            return Disposition::Retain;
        }

        match self.send(pid) {
            Ok(()) => {
                info!(pid, signal = %self.signal, "signalled");
                Disposition::Remove
            }
            Err(SuperviseError::Signal {
                errno: Errno::ESRCH,
                ..
            }) => {
                debug!(pid, "already exited");
                Disposition::Remove
            }
            Err(e) => {
                error!("{}", e);
                Disposition::Retain
            }
        }
    }

    fn send(&self, pid: u32) -> Result<(), SuperviseError> {
        // pid 0 and negative pids address process groups.
        let raw = i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .ok_or(SuperviseError::InvalidPid(pid))?;

        kill(Pid::from_raw(raw), self.signal).map_err(|errno| SuperviseError::Signal { pid, errno })
    }
}

/// A cluster plus the rules for keeping its membership current.
pub struct Supervisor<F: FileSystem + Clone> {
    cluster: Cluster<ProcfsSource<F>>,
    terminator: Terminator,
    options: MonitorOptions,
    explicit: Vec<u32>,
    parent: Option<u32>,
    /// Signalled and removed, but possibly still listed while shutting down.
    terminated: HashSet<u32>,
}

impl<F: FileSystem + Clone> Supervisor<F> {
    /// Creates a supervisor for the given PIDs and/or the children of `parent`.
    pub fn new(
        cluster: Cluster<ProcfsSource<F>>,
        terminator: Terminator,
        options: MonitorOptions,
        explicit: Vec<u32>,
        parent: Option<u32>,
    ) -> Result<Self, SuperviseError> {
        if explicit.is_empty() && parent.is_none() {
            return Err(SuperviseError::NoProcesses);
        }

        let mut supervisor = Self {
            cluster,
            terminator,
            options,
            explicit,
            parent,
            terminated: HashSet::new(),
        };
        for pid in supervisor.explicit.clone() {
            supervisor.cluster.add(pid, options);
        }
        Ok(supervisor)
    }

    pub fn cluster(&self) -> &Cluster<ProcfsSource<F>> {
        &self.cluster
    }

    /// Adds newly forked children and drops children that have exited.
    ///
    /// Explicitly requested PIDs are never dropped here. Children this
    /// supervisor has already terminated are not adopted again while they
    /// are still shutting down.
    pub fn sync_children(&mut self) -> Result<(), SuperviseError> {
        let Some(parent) = self.parent else {
            return Ok(());
        };

        let children = self.cluster.source().child_processes(parent)?;

        self.terminated.retain(|pid| children.contains(pid));

        for &pid in &children {
            if self.terminated.contains(&pid) {
                debug!(pid, parent, "terminated child still shutting down");
            } else if !self.cluster.contains(pid) {
                info!(pid, parent, "monitoring new child");
                self.cluster.add(pid, self.options);
            }
        }

        for pid in self.cluster.process_ids() {
            if !children.contains(&pid) && !self.explicit.contains(&pid) {
                info!(pid, parent, "child exited");
                self.cluster.remove(pid);
            }
        }

        Ok(())
    }

    /// Runs one check cycle.
    pub fn cycle(&mut self) -> CheckReport {
        if let Err(e) = self.sync_children() {
            warn!("{}", e);
        }

        let terminator = self.terminator;
        let report = self.cluster.check_with(|selection| terminator.handle(selection));
        self.terminated.extend(report.removed.iter().copied());

        if report.is_quiet() {
            debug!(processes = self.cluster.len(), "cycle complete");
        } else {
            info!(
                processes = self.cluster.len(),
                leaking = report.leaking.len(),
                total_size_selected = report.total_size_selected.len(),
                free_memory_selected = report.free_memory_selected.len(),
                removed = report.removed.len(),
                "cycle complete"
            );
        }

        report
    }
}
