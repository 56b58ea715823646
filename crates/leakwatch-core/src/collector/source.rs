//! `MemorySource` backed by the Linux `/proc` filesystem.

use crate::collector::procfs::{CollectError, ProcessReader, SystemReader};
use crate::collector::traits::{FileSystem, MemorySource, MemoryUsage};

/// Reads process and host memory from `/proc` (and optionally a cgroup).
///
/// Every failure is reported as "no data": a vanished process, a permission
/// error and an unparseable file all become `None`.
pub struct ProcfsSource<F: FileSystem + Clone> {
    processes: ProcessReader<F>,
    system: SystemReader<F>,
}

impl<F: FileSystem + Clone> ProcfsSource<F> {
    /// Creates a new source.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        let proc_path = proc_path.into();
        Self {
            processes: ProcessReader::new(fs.clone(), &proc_path),
            system: SystemReader::new(fs, &proc_path),
        }
    }

    /// Accounts free and total memory against a cgroup v2 memory limit.
    ///
    /// # Arguments
    /// * `cgroup_path` - Path to cgroup directory (e.g., "/sys/fs/cgroup")
    pub fn with_cgroup(mut self, cgroup_path: &str) -> Self {
        self.system.set_cgroup_path(cgroup_path);
        self
    }

    /// Overrides the page size used to convert `statm` readings.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.processes.set_page_size(page_size);
        self
    }

    /// Lists the current children of `parent_pid`, sorted by PID.
    pub fn child_processes(&self, parent_pid: u32) -> Result<Vec<u32>, CollectError> {
        self.processes.child_processes(parent_pid)
    }
}

impl<F: FileSystem + Clone> MemorySource for ProcfsSource<F> {
    fn memory_usage(&self, process_id: u32) -> Option<MemoryUsage> {
        match self.processes.memory_usage(process_id) {
            Ok(usage) => Some(usage),
            Err(CollectError::ProcessGone(_)) => None,
            Err(e) => {
                tracing::debug!(pid = process_id, error = %e, "no memory data for process");
                None
            }
        }
    }

    fn free_memory(&self) -> Option<u64> {
        self.system.memory_budget().map(|budget| budget.free)
    }

    fn total_memory(&self) -> Option<u64> {
        self.system.memory_budget().map(|budget| budget.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_bulk_usage_skips_dead_processes() {
        let source = ProcfsSource::new(MockFs::worker_pool(), "/proc");

        let usages = source.memory_usages(&[1001, 1002, 31337]);

        assert_eq!(usages.len(), 2);
        assert_eq!(usages[&1001].private_size, Some(50 * MIB));
        assert_eq!(usages[&1002].private_size, Some(30 * MIB));
        assert!(!usages.contains_key(&31337));
    }

    #[test]
    fn test_dead_process_is_none() {
        let source = ProcfsSource::new(MockFs::worker_pool(), "/proc");
        assert_eq!(source.memory_usage(31337), None);
    }

    #[test]
    fn test_garbage_statm_is_none() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/5/statm", "garbage\n");
        let source = ProcfsSource::new(fs, "/proc");

        assert_eq!(source.memory_usage(5), None);
    }

    #[test]
    fn test_free_and_total_memory() {
        let source = ProcfsSource::new(MockFs::worker_pool(), "/proc");
        assert_eq!(source.free_memory(), Some(12000000 * 1024));
        assert_eq!(source.total_memory(), Some(16384000 * 1024));

        let source = ProcfsSource::new(MockFs::containerized_pool(), "/proc")
            .with_cgroup("/sys/fs/cgroup");
        assert_eq!(source.free_memory(), Some(324 * MIB));
        assert_eq!(source.total_memory(), Some(1024 * MIB));
    }

    #[test]
    fn test_free_memory_unsupported() {
        let source = ProcfsSource::new(MockFs::new(), "/proc");
        assert_eq!(source.free_memory(), None);
        assert_eq!(source.total_memory(), None);
    }

    #[test]
    fn test_page_size_override() {
        let source = ProcfsSource::new(MockFs::without_smaps_rollup(), "/proc").with_page_size(8192);
        assert_eq!(source.memory_usage(2001).unwrap().resident_size, 2560 * 8192);
    }

    #[test]
    fn test_child_processes() {
        let source = ProcfsSource::new(MockFs::without_smaps_rollup(), "/proc");
        assert_eq!(source.child_processes(2000).unwrap(), vec![2001, 2002]);
    }
}
