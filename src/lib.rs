//! Assetflow - static site asset pipeline
//!
//! Builds a site from a source tree into a build directory:
//! - Named tasks selecting inputs by glob and writing into the build tree
//! - Serial and parallel stage composition with a bounded worker pool
//! - Watch mode with selective rebuilds and browser live reload

pub mod actions;
pub mod config;
pub mod console;
pub mod error;
pub mod execution;
pub mod globs;
pub mod graph;
pub mod pipeline;
pub mod registry;
pub mod server;
pub mod sink;
pub mod task;
pub mod watcher;

pub use error::{PipelineError, Result};
pub use execution::{BuildContext, Executor, RunOptions};
pub use graph::Stage;
pub use registry::TaskRegistry;
pub use server::{LiveReload, ReloadMessage};
pub use sink::OutputSink;
pub use task::{Action, Task, TaskResult};
pub use watcher::{ReloadPolicy, WatchController, WatchRule, WatchState};
