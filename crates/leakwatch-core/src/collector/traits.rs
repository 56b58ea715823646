//! Abstractions over the places memory figures come from.
//!
//! `FileSystem` lets the procfs source read real `/proc` on Linux or an
//! in-memory fixture in tests. `MemorySource` is the capability-checked
//! interface the monitor and cluster consume: every query answers with an
//! `Option`, so "this platform cannot tell" and "this process is gone" are
//! values, never errors.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Abstraction for filesystem operations.
///
/// This trait allows sources to read from the real filesystem or from
/// a mock implementation for testing purposes.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }
}

/// One memory reading for one process, in bytes.
///
/// `shared_size` and `private_size` are either both known or both unknown:
/// the breakdown is only available where the platform reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    /// Physical memory currently mapped (shared + private).
    pub resident_size: u64,
    /// Physical memory shared with other processes.
    pub shared_size: Option<u64>,
    /// Physical memory exclusive to this process.
    pub private_size: Option<u64>,
}

impl MemoryUsage {
    /// Reading with resident size only.
    pub fn resident(resident_size: u64) -> Self {
        Self {
            resident_size,
            shared_size: None,
            private_size: None,
        }
    }

    /// Reading with a shared/private breakdown. Resident is their sum.
    pub fn with_breakdown(shared_size: u64, private_size: u64) -> Self {
        Self {
            resident_size: shared_size.saturating_add(private_size),
            shared_size: Some(shared_size),
            private_size: Some(private_size),
        }
    }
}

/// Source of per-process and host-wide memory figures.
///
/// Implementations must not fail: a process that is dead, invalid or not
/// readable yields `None`, and so does a host figure the platform cannot
/// provide.
pub trait MemorySource {
    /// Memory usage of a single process.
    fn memory_usage(&self, process_id: u32) -> Option<MemoryUsage>;

    /// Memory usage of many processes in one query.
    ///
    /// Processes without data are absent from the returned map.
    fn memory_usages(&self, process_ids: &[u32]) -> HashMap<u32, MemoryUsage> {
        process_ids
            .iter()
            .filter_map(|&pid| self.memory_usage(pid).map(|usage| (pid, usage)))
            .collect()
    }

    /// Free memory available to the supervised processes, if known.
    fn free_memory(&self) -> Option<u64> {
        None
    }

    /// Total memory available to the supervised processes, if known.
    fn total_memory(&self) -> Option<u64> {
        None
    }
}

impl<T: MemorySource + ?Sized> MemorySource for &T {
    fn memory_usage(&self, process_id: u32) -> Option<MemoryUsage> {
        (**self).memory_usage(process_id)
    }

    fn memory_usages(&self, process_ids: &[u32]) -> HashMap<u32, MemoryUsage> {
        (**self).memory_usages(process_ids)
    }

    fn free_memory(&self) -> Option<u64> {
        (**self).free_memory()
    }

    fn total_memory(&self) -> Option<u64> {
        (**self).total_memory()
    }
}
