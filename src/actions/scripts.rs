use anyhow::{bail, Context};
use std::fs;
use std::path::PathBuf;

use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use super::min_name;
use crate::globs::SourceFile;
use crate::sink::OutputSink;
use crate::task::Action;

/// JavaScript minification (compress + mangle), written as `*.min.js`.
#[derive(Debug, Default)]
pub struct MinifyJs;

pub fn minify_js(source: &str) -> anyhow::Result<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if !ret.errors.is_empty() {
        bail!("{} syntax error(s)", ret.errors.len());
    }

    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);

    Ok(Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code)
}

impl Action for MinifyJs {
    fn run(&self, files: &[SourceFile], out: &OutputSink) -> anyhow::Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let source = fs::read_to_string(&file.path)
                .with_context(|| format!("Failed to read {}", file.path.display()))?;
            let code = minify_js(&source)
                .with_context(|| format!("Failed to minify {}", file.path.display()))?;
            written.push(out.write(min_name(&file.relative(), "js"), code)?);
        }
        Ok(written)
    }

    fn describe(&self) -> &str {
        "oxc-minify"
    }
}
