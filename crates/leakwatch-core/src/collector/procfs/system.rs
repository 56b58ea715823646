//! Host-wide memory readings from `/proc/meminfo` and the cgroup v2 memory
//! controller.

use crate::collector::cgroup::{parse_memory_current, parse_memory_max};
use crate::collector::procfs::parser::{MemInfo, parse_meminfo};
use crate::collector::traits::FileSystem;
use std::path::Path;

/// A memory ceiling and the usage counted against it, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    pub total: u64,
    pub free: u64,
}

/// Reads host (or container) memory totals.
///
/// When a cgroup path is configured and its `memory.max` holds a number, the
/// cgroup limit is what the supervised processes can actually use, so it wins
/// over `/proc/meminfo`.
pub struct SystemReader<F: FileSystem> {
    fs: F,
    proc_path: String,
    cgroup_path: Option<String>,
}

impl<F: FileSystem> SystemReader<F> {
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            cgroup_path: None,
        }
    }

    pub fn set_cgroup_path(&mut self, cgroup_path: impl Into<String>) {
        self.cgroup_path = Some(cgroup_path.into());
    }

    /// Current memory budget, or `None` if neither source is readable.
    pub fn memory_budget(&self) -> Option<MemoryBudget> {
        self.cgroup_budget().or_else(|| self.meminfo_budget())
    }

    fn cgroup_budget(&self) -> Option<MemoryBudget> {
        let cgroup_path = self.cgroup_path.as_ref()?;

        let max_path = format!("{}/memory.max", cgroup_path);
        let max = parse_memory_max(&self.fs.read_to_string(Path::new(&max_path)).ok()?)?;

        let current_path = format!("{}/memory.current", cgroup_path);
        let current =
            parse_memory_current(&self.fs.read_to_string(Path::new(&current_path)).ok()?)?;

        Some(MemoryBudget {
            total: max,
            free: max.saturating_sub(current),
        })
    }

    fn meminfo_budget(&self) -> Option<MemoryBudget> {
        let meminfo_path = format!("{}/meminfo", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&meminfo_path)).ok()?;
        let info: MemInfo = match parse_meminfo(&content) {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!(error = %e, "meminfo unusable");
                return None;
            }
        };

        Some(MemoryBudget {
            total: info.mem_total * 1024,
            free: info.available() * 1024,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn test_budget_from_meminfo() {
        let fs = MockFs::worker_pool();
        let reader = SystemReader::new(fs, "/proc");

        let budget = reader.memory_budget().unwrap();
        assert_eq!(budget.total, 16384000 * 1024);
        assert_eq!(budget.free, 12000000 * 1024);
    }

    #[test]
    fn test_budget_from_cgroup_limit() {
        let fs = MockFs::containerized_pool();
        let mut reader = SystemReader::new(fs, "/proc");
        reader.set_cgroup_path("/sys/fs/cgroup");

        let budget = reader.memory_budget().unwrap();
        assert_eq!(budget.total, 1024 * 1024 * 1024);
        assert_eq!(budget.free, 1024 * 1024 * 1024 - 700 * 1024 * 1024);
    }

    #[test]
    fn test_unlimited_cgroup_uses_meminfo() {
        let mut fs = MockFs::worker_pool();
        fs.add_file("/sys/fs/cgroup/memory.max", "max\n");
        fs.add_file("/sys/fs/cgroup/memory.current", "1000\n");
        let mut reader = SystemReader::new(fs, "/proc");
        reader.set_cgroup_path("/sys/fs/cgroup");

        let budget = reader.memory_budget().unwrap();
        assert_eq!(budget.total, 16384000 * 1024);
    }

    #[test]
    fn test_cgroup_usage_over_limit_saturates() {
        let mut fs = MockFs::new();
        fs.add_file("/sys/fs/cgroup/memory.max", "1000\n");
        fs.add_file("/sys/fs/cgroup/memory.current", "1500\n");
        let mut reader = SystemReader::new(fs, "/proc");
        reader.set_cgroup_path("/sys/fs/cgroup");

        assert_eq!(reader.memory_budget().unwrap().free, 0);
    }

    #[test]
    fn test_no_sources() {
        let reader = SystemReader::new(MockFs::new(), "/proc");
        assert_eq!(reader.memory_budget(), None);
    }
}
