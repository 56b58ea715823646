//! Mock implementations for testing without a real `/proc`.

mod filesystem;
mod scenarios;
mod source;

pub use filesystem::{MockFs, smaps_rollup, stat_line};
pub use source::MockSource;
