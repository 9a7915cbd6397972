//! Execution module
//!
//! Provides:
//! - Serial and parallel stage execution
//! - A worker limit for CPU-bound transforms
//! - Per-task timeouts

pub mod parallel;
pub mod runner;

pub use parallel::join_stages;
pub use runner::{default_workers, BuildContext, Executor, RunOptions};
