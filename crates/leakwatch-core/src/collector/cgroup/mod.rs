//! cgroup v2 memory controller files.

pub mod parser;

pub use parser::{parse_memory_current, parse_memory_max};
