//! Memory metrics sources.
//!
//! The monitor and cluster never read the operating system directly; they
//! ask a [`MemorySource`]. On Linux that is [`ProcfsSource`], which reads
//! `/proc` (and optionally a cgroup) through the [`FileSystem`] trait so the
//! same code runs against [`MockFs`] fixtures in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      ProcfsSource                        │
//! │  ┌─────────────────────────┐  ┌───────────────────────┐  │
//! │  │     ProcessReader       │  │     SystemReader      │  │
//! │  │ - /proc/[pid]/smaps_... │  │ - /proc/meminfo       │  │
//! │  │ - /proc/[pid]/statm     │  │ - memory.max (cgroup) │  │
//! │  │ - /proc/[pid]/stat      │  │ - memory.current      │  │
//! │  └────────────┬────────────┘  └───────────┬───────────┘  │
//! │               └─────────────┬─────────────┘              │
//! │                      ┌──────▼──────┐                     │
//! │                      │  FileSystem │ (trait)             │
//! │                      └──────┬──────┘                     │
//! └─────────────────────────────┼────────────────────────────┘
//!                        ┌──────┴──────┐
//!                 ┌──────▼──────┐ ┌────▼────────┐
//!                 │   RealFs    │ │   MockFs    │
//!                 └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use leakwatch_core::collector::{MemorySource, MockFs, ProcfsSource};
//!
//! let source = ProcfsSource::new(MockFs::worker_pool(), "/proc");
//! let usage = source.memory_usage(1001).unwrap();
//! assert_eq!(usage.private_size, Some(50 * 1024 * 1024));
//! ```

pub mod cgroup;
pub mod mock;
pub mod procfs;
mod source;
pub mod traits;

pub use mock::{MockFs, MockSource};
pub use procfs::CollectError;
pub use source::ProcfsSource;
pub use traits::{FileSystem, MemorySource, MemoryUsage, RealFs};
