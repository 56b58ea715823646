//! Per-process memory readings from `/proc/[pid]/`.

use crate::collector::procfs::parser::{parse_proc_stat, parse_smaps_rollup, parse_statm};
use crate::collector::traits::{FileSystem, MemoryUsage};
use std::path::Path;

/// Default page size used to convert `statm` pages to bytes.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Error type for collection failures.
#[derive(Debug)]
pub enum CollectError {
    /// Process disappeared (or was never there) during collection.
    ProcessGone(u32),
    /// I/O error reading process files.
    Io(std::io::Error),
    /// Parse error in process files.
    Parse(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::ProcessGone(pid) => write!(f, "process {} disappeared", pid),
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

/// Reads process memory and parentage from `/proc/[pid]/` files.
pub struct ProcessReader<F: FileSystem> {
    fs: F,
    proc_path: String,
    page_size: u64,
}

impl<F: FileSystem> ProcessReader<F> {
    /// Creates a new process reader.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn set_page_size(&mut self, page_size: u64) {
        self.page_size = page_size;
    }

    /// Reads the memory usage of one process.
    ///
    /// `smaps_rollup` gives the shared/private breakdown. When it is missing
    /// (kernels before 4.14, or no permission) `statm` still gives resident
    /// size, and the breakdown is left unknown.
    pub fn memory_usage(&self, pid: u32) -> Result<MemoryUsage, CollectError> {
        let proc_dir = format!("{}/{}", self.proc_path, pid);

        let rollup_path = format!("{}/smaps_rollup", proc_dir);
        if let Ok(content) = self.fs.read_to_string(Path::new(&rollup_path)) {
            match parse_smaps_rollup(&content) {
                Ok(rollup) => {
                    return Ok(MemoryUsage {
                        resident_size: rollup.rss * 1024,
                        shared_size: Some(rollup.shared() * 1024),
                        private_size: Some(rollup.private() * 1024),
                    });
                }
                Err(e) => {
                    tracing::debug!(pid, error = %e, "smaps_rollup unusable, falling back to statm");
                }
            }
        }

        let statm_path = format!("{}/statm", proc_dir);
        let content = self
            .fs
            .read_to_string(Path::new(&statm_path))
            .map_err(|_| CollectError::ProcessGone(pid))?;
        let statm = parse_statm(&content).map_err(|e| CollectError::Parse(e.message))?;

        Ok(MemoryUsage::resident(statm.resident * self.page_size))
    }

    /// Lists the live processes whose parent is `parent_pid`, sorted by PID.
    ///
    /// Processes that disappear during the scan are skipped, and so are
    /// zombies that have exited but not been reaped.
    pub fn child_processes(&self, parent_pid: u32) -> Result<Vec<u32>, CollectError> {
        let entries = self.fs.read_dir(Path::new(&self.proc_path))?;

        let mut children = Vec::new();
        for entry in entries {
            let Some(pid) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };

            let stat_path = entry.join("stat");
            let Ok(content) = self.fs.read_to_string(&stat_path) else {
                continue;
            };
            match parse_proc_stat(&content) {
                Ok(stat) if stat.ppid == parent_pid && !stat.has_exited() => {
                    children.push(pid)
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(pid, error = %e, "skipping unparseable stat"),
            }
        }

        children.sort_unstable();
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn test_memory_usage_from_smaps_rollup() {
        let fs = MockFs::worker_pool();
        let reader = ProcessReader::new(fs, "/proc");

        let usage = reader.memory_usage(1001).unwrap();

        assert_eq!(usage.resident_size, 60 * 1024 * 1024);
        assert_eq!(usage.shared_size, Some(10 * 1024 * 1024));
        assert_eq!(usage.private_size, Some(50 * 1024 * 1024));
    }

    #[test]
    fn test_memory_usage_falls_back_to_statm() {
        let fs = MockFs::without_smaps_rollup();
        let reader = ProcessReader::new(fs, "/proc");

        let usage = reader.memory_usage(2001).unwrap();

        assert_eq!(usage.resident_size, 2560 * DEFAULT_PAGE_SIZE);
        assert_eq!(usage.shared_size, None);
        assert_eq!(usage.private_size, None);
    }

    #[test]
    fn test_memory_usage_respects_page_size() {
        let fs = MockFs::without_smaps_rollup();
        let mut reader = ProcessReader::new(fs, "/proc");
        reader.set_page_size(16384);

        let usage = reader.memory_usage(2001).unwrap();
        assert_eq!(usage.resident_size, 2560 * 16384);
    }

    #[test]
    fn test_memory_usage_empty_rollup_falls_back() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/7/smaps_rollup", "");
        fs.add_file("/proc/7/statm", "100 10 5 1 0 4 0\n");
        let reader = ProcessReader::new(fs, "/proc");

        let usage = reader.memory_usage(7).unwrap();
        assert_eq!(usage.resident_size, 10 * DEFAULT_PAGE_SIZE);
        assert_eq!(usage.private_size, None);
    }

    #[test]
    fn test_memory_usage_process_gone() {
        let mut fs = MockFs::new();
        fs.add_dir("/proc/9999");
        let reader = ProcessReader::new(fs, "/proc");

        let result = reader.memory_usage(9999);
        assert!(matches!(result, Err(CollectError::ProcessGone(9999))));
    }

    #[test]
    fn test_child_processes() {
        let fs = MockFs::worker_pool();
        let reader = ProcessReader::new(fs, "/proc");

        assert_eq!(reader.child_processes(1000).unwrap(), vec![1001, 1002, 1003]);
        assert_eq!(reader.child_processes(1).unwrap(), vec![1000]);
        assert!(reader.child_processes(4242).unwrap().is_empty());
    }

    #[test]
    fn test_child_processes_skips_non_pid_entries() {
        let mut fs = MockFs::worker_pool();
        fs.add_file("/proc/self/stat", "1001 (worker) S 1000");
        fs.add_file("/proc/meminfo", "MemTotal: 1 kB\n");
        let reader = ProcessReader::new(fs, "/proc");

        assert_eq!(reader.child_processes(1000).unwrap(), vec![1001, 1002, 1003]);
    }

    #[test]
    fn test_child_processes_skips_zombies() {
        let mut fs = MockFs::worker_pool();
        fs.add_file("/proc/1002/stat", "1002 (worker) Z 1000 1002 1002 0 -1\n");
        let reader = ProcessReader::new(fs, "/proc");

        assert_eq!(reader.child_processes(1000).unwrap(), vec![1001, 1003]);
    }
}
