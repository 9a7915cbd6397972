use anyhow::{anyhow, bail, Context};
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use super::min_name;
use crate::globs::SourceFile;
use crate::sink::OutputSink;
use crate::task::Action;

/// Compile SASS entry points with the external `sass` CLI, then prefix and
/// minify the result for [`TARGETS`] into `*.min.css`. The `.map` written by
/// `sass` is kept next to it.
#[derive(Debug, Clone)]
pub struct CompileSass {
    program: String,
}

impl CompileSass {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Oldest browser versions given vendor prefixes, as `major << 16`
const TARGETS: Browsers = Browsers {
    android: None,
    chrome: Some(80 << 16),
    edge: Some(80 << 16),
    firefox: Some(78 << 16),
    ie: None,
    ios_saf: Some(13 << 16),
    opera: Some(67 << 16),
    safari: Some(13 << 16),
    samsung: Some(12 << 16),
};

fn targets() -> Targets {
    Targets {
        browsers: Some(TARGETS),
        ..Targets::default()
    }
}

/// Add the vendor prefixes [`TARGETS`] need and minify.
pub fn postprocess_css(source: &str) -> anyhow::Result<String> {
    let mut stylesheet = StyleSheet::parse(source, ParserOptions::default())
        .map_err(|e| anyhow!("Failed to parse CSS: {}", e))?;
    stylesheet
        .minify(MinifyOptions {
            targets: targets(),
            ..MinifyOptions::default()
        })
        .map_err(|e| anyhow!("Failed to minify CSS: {}", e))?;

    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            targets: targets(),
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("Failed to print CSS: {}", e))?;
    Ok(result.code)
}

impl Default for CompileSass {
    fn default() -> Self {
        Self::new("sass")
    }
}

impl Action for CompileSass {
    fn run(&self, files: &[SourceFile], out: &OutputSink) -> anyhow::Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        for file in files {
            let is_partial = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('_'))
                .unwrap_or(false);
            if is_partial {
                continue;
            }

            let target = out.path_for(min_name(&file.relative(), "css"))?;
            let output = Command::new(&self.program)
                .arg("--style=compressed")
                .arg("--source-map")
                .arg("--no-error-css")
                .arg(&file.path)
                .arg(&target)
                .output()
                .with_context(|| format!("Failed to run '{}'", self.program))?;

            if !output.status.success() {
                bail!(
                    "{} exited with {} on {}:\n{}",
                    self.program,
                    output.status,
                    file.path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }

            let compiled = fs::read_to_string(&target)
                .with_context(|| format!("Failed to read {}", target.display()))?;
            let mut css = postprocess_css(&compiled)
                .with_context(|| format!("Failed to post-process {}", target.display()))?;

            let map = PathBuf::from(format!("{}.map", target.display()));
            if map.exists() {
                if let Some(name) = map.file_name() {
                    css.push_str(&format!("\n/*# sourceMappingURL={} */\n", name.to_string_lossy()));
                }
            }
            fs::write(&target, css).with_context(|| format!("Failed to write {}", target.display()))?;

            written.push(target);
            if map.exists() {
                written.push(map);
            }
        }

        Ok(written)
    }

    fn describe(&self) -> &str {
        "sass"
    }
}
