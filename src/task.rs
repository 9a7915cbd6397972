//! Build task definitions and results

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::globs::SourceFile;
use crate::sink::OutputSink;

/// A transformation from input files to files written into a sink.
///
/// Actions run on a blocking worker thread and may do CPU-heavy or
/// synchronous I/O work. They return every path they wrote.
pub trait Action: Send + Sync {
    fn run(&self, files: &[SourceFile], out: &OutputSink) -> anyhow::Result<Vec<PathBuf>>;

    /// Short label shown by `assetflow list`
    fn describe(&self) -> &str {
        "custom"
    }
}

impl<F> Action for F
where
    F: Fn(&[SourceFile], &OutputSink) -> anyhow::Result<Vec<PathBuf>> + Send + Sync,
{
    fn run(&self, files: &[SourceFile], out: &OutputSink) -> anyhow::Result<Vec<PathBuf>> {
        self(files, out)
    }
}

/// A named build step reading globs below the source root and writing
/// below `out_dir` inside the build root.
#[derive(Clone)]
pub struct Task {
    pub name: String,
    pub inputs: Vec<String>,
    pub excludes: Vec<String>,
    pub out_dir: PathBuf,
    /// Directory outputs are relative to. Defaults to each glob's base.
    pub base: Option<PathBuf>,
    pub action: Arc<dyn Action>,
}

impl Task {
    pub fn new(name: impl Into<String>, action: impl Action + 'static) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            excludes: Vec::new(),
            out_dir: PathBuf::new(),
            base: None,
            action: Arc::new(action),
        }
    }

    pub fn inputs<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(globs.into_iter().map(Into::into));
        self
    }

    pub fn excludes<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(globs.into_iter().map(Into::into));
        self
    }

    pub fn out_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.out_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn base(mut self, base: impl AsRef<Path>) -> Self {
        self.base = Some(base.as_ref().to_path_buf());
        self
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("excludes", &self.excludes)
            .field("out_dir", &self.out_dir)
            .field("base", &self.base)
            .field("action", &self.action.describe())
            .finish()
    }
}

/// Result of executing a task
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u128,
    pub outputs: usize,
}
