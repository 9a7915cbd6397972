//! Pipeline error taxonomy.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Task '{0}' not found")]
    UnknownTask(String),

    #[error("Task '{task}' failed: {message}")]
    Task { task: String, message: String },

    #[error("Task '{task}' timed out after {after:?}")]
    Timeout { task: String, after: Duration },

    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid glob '{pattern}': {message}")]
    Glob { pattern: String, message: String },

    #[error("{} task(s) failed: {}", .0.len(), join_messages(.0))]
    Parallel(Vec<PipelineError>),
}

impl PipelineError {
    pub fn task(task: &str, err: anyhow::Error) -> Self {
        Self::Task {
            task: task.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Every leaf failure, with nested parallel groups flattened.
    pub fn failures(&self) -> Vec<&PipelineError> {
        match self {
            Self::Parallel(errors) => errors.iter().flat_map(|e| e.failures()).collect(),
            other => vec![other],
        }
    }

    /// Name of the task that failed, when the failure belongs to one task.
    pub fn task_name(&self) -> Option<&str> {
        match self {
            Self::Task { task, .. } | Self::Timeout { task, .. } => Some(task),
            Self::UnknownTask(name) | Self::DuplicateTask(name) => Some(name),
            _ => None,
        }
    }
}

fn join_messages(errors: &[PipelineError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, PipelineError>;
