use anyhow::Context;
use std::fs;
use std::path::PathBuf;

use crate::globs::SourceFile;
use crate::sink::OutputSink;
use crate::task::Action;

/// HTML minification with whitespace collapsing.
#[derive(Debug, Default)]
pub struct MinifyHtml;

fn config() -> minify_html::Cfg {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.minify_js = true;
    cfg
}

impl Action for MinifyHtml {
    fn run(&self, files: &[SourceFile], out: &OutputSink) -> anyhow::Result<Vec<PathBuf>> {
        let cfg = config();
        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let content = fs::read(&file.path)
                .with_context(|| format!("Failed to read {}", file.path.display()))?;
            let minified = minify_html::minify(&content, &cfg);
            written.push(out.write(file.relative(), minified)?);
        }
        Ok(written)
    }

    fn describe(&self) -> &str {
        "minify-html"
    }
}
