//! leakwatch-core - memory leak detection and limit enforcement for
//! supervised process pools.
//!
//! Provides:
//! - `collector` - memory metrics sources (`/proc`, cgroup, mocks)
//! - `monitor` - per-process sample history and leak detection
//! - `cluster` - cluster-wide leak reporting and memory limit enforcement
//! - `fmt` - byte-size formatting and parsing helpers
//!
//! The engine only decides *which* processes to act on and *when*; sending
//! signals and replacing workers is left to the caller.

pub mod cluster;
pub mod collector;
pub mod fmt;
pub mod monitor;

pub use cluster::{CheckReport, Cluster, ClusterSnapshot, Disposition, Selection};
pub use collector::{MemorySource, MemoryUsage};
pub use monitor::{DEFAULT_INCREASE_LIMIT, DEFAULT_THRESHOLD_SIZE, Monitor, MonitorOptions};
