//! Pipeline execution shared by the commands.

mod runner;
mod stats;

pub use runner::{execute, read_json, CompletedRun, RunOptions};
pub use stats::RunStats;
