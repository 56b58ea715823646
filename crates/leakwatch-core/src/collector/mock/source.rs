//! In-memory `MemorySource` for driving the monitor and cluster in tests.

use crate::collector::traits::{MemorySource, MemoryUsage};
use std::cell::Cell;
use std::collections::HashMap;

/// Memory source backed by a map the test controls.
///
/// Counts single and bulk queries so tests can assert which path was used.
#[derive(Debug, Default)]
pub struct MockSource {
    usages: HashMap<u32, MemoryUsage>,
    free_memory: Option<u64>,
    total_memory: Option<u64>,
    single_queries: Cell<usize>,
    bulk_queries: Cell<usize>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reading for a process, replacing any previous one.
    pub fn set(&mut self, process_id: u32, usage: MemoryUsage) {
        self.usages.insert(process_id, usage);
    }

    /// Sets a resident-only reading (no shared/private breakdown).
    pub fn set_resident(&mut self, process_id: u32, resident_size: u64) {
        self.set(process_id, MemoryUsage::resident(resident_size));
    }

    /// Sets a reading with a shared/private breakdown.
    pub fn set_breakdown(&mut self, process_id: u32, shared_size: u64, private_size: u64) {
        self.set(process_id, MemoryUsage::with_breakdown(shared_size, private_size));
    }

    /// Drops a process, as if it had exited.
    pub fn kill(&mut self, process_id: u32) {
        self.usages.remove(&process_id);
    }

    pub fn set_free_memory(&mut self, free_memory: Option<u64>) {
        self.free_memory = free_memory;
    }

    pub fn set_total_memory(&mut self, total_memory: Option<u64>) {
        self.total_memory = total_memory;
    }

    pub fn single_queries(&self) -> usize {
        self.single_queries.get()
    }

    pub fn bulk_queries(&self) -> usize {
        self.bulk_queries.get()
    }
}

impl MemorySource for MockSource {
    fn memory_usage(&self, process_id: u32) -> Option<MemoryUsage> {
        self.single_queries.set(self.single_queries.get() + 1);
        self.usages.get(&process_id).copied()
    }

    fn memory_usages(&self, process_ids: &[u32]) -> HashMap<u32, MemoryUsage> {
        self.bulk_queries.set(self.bulk_queries.get() + 1);
        process_ids
            .iter()
            .filter_map(|pid| self.usages.get(pid).map(|usage| (*pid, *usage)))
            .collect()
    }

    fn free_memory(&self) -> Option<u64> {
        self.free_memory
    }

    fn total_memory(&self) -> Option<u64> {
        self.total_memory
    }
}
