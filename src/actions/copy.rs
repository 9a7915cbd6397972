use std::path::PathBuf;

use crate::globs::SourceFile;
use crate::sink::OutputSink;
use crate::task::Action;

/// Byte-for-byte copy, keeping each file's path below its base.
#[derive(Debug, Default)]
pub struct CopyFiles;

impl Action for CopyFiles {
    fn run(&self, files: &[SourceFile], out: &OutputSink) -> anyhow::Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(files.len());
        for file in files {
            written.push(out.copy_from(&file.path, file.relative())?);
        }
        Ok(written)
    }

    fn describe(&self) -> &str {
        "copy"
    }
}
