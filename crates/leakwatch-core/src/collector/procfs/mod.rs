//! Readers for the Linux `/proc` filesystem.
//!
//! This module provides parsers and readers for process memory
//! (`smaps_rollup`, `statm`, `stat`) and host memory (`meminfo`).

pub mod parser;
pub mod process;
pub mod system;

pub use process::{CollectError, DEFAULT_PAGE_SIZE, ProcessReader};
pub use system::{MemoryBudget, SystemReader};
