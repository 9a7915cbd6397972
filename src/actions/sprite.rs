//! SVG sprite assembly.
//!
//! Every input SVG becomes a `<symbol id="{file stem}">` inside one sprite
//! document, usable as `<use href="sprite.svg#cart"/>`.

use anyhow::{bail, Context};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::globs::SourceFile;
use crate::sink::OutputSink;
use crate::task::Action;

/// Attributes of a source `<svg>` root that carry over to its `<symbol>`
const KEPT_ATTRIBUTES: &[&[u8]] = &[b"viewBox", b"preserveAspectRatio"];

#[derive(Debug, Clone)]
pub struct SvgSprite {
    file_name: String,
}

impl SvgSprite {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl Default for SvgSprite {
    fn default() -> Self {
        Self::new("sprite.svg")
    }
}

fn symbol_start(id: &str, svg: &BytesStart<'_>) -> anyhow::Result<BytesStart<'static>> {
    let mut symbol = BytesStart::new("symbol");
    symbol.push_attribute(("id", id));
    for attr in svg.attributes() {
        let attr = attr?;
        if KEPT_ATTRIBUTES.contains(&attr.key.as_ref()) {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?;
            symbol.push_attribute((key.as_str(), value.as_ref()));
        }
    }
    Ok(symbol)
}

/// Copy one SVG document into `writer` as a symbol.
fn append_symbol(writer: &mut Writer<Vec<u8>>, id: &str, source: &str) -> anyhow::Result<()> {
    let mut reader = Reader::from_str(source);
    reader.trim_text(true);

    // Nesting depth below the root <svg>; 0 means outside it
    let mut depth = 0usize;
    let mut found = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if depth == 0 && e.name().as_ref() == b"svg" => {
                writer.write_event(Event::Start(symbol_start(id, &e)?))?;
                depth = 1;
                found = true;
            }
            Event::Empty(e) if depth == 0 && e.name().as_ref() == b"svg" => {
                writer.write_event(Event::Empty(symbol_start(id, &e)?))?;
                found = true;
            }
            Event::End(_) if depth == 1 => {
                writer.write_event(Event::End(BytesEnd::new("symbol")))?;
                depth = 0;
            }
            Event::Start(e) if depth > 0 => {
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::End(e) if depth > 1 => {
                depth -= 1;
                writer.write_event(Event::End(e))?;
            }
            Event::Comment(_) => {}
            Event::Eof => break,
            event if depth > 0 => writer.write_event(event)?,
            _ => {}
        }
    }

    if !found {
        bail!("no <svg> root element");
    }
    Ok(())
}

impl Action for SvgSprite {
    fn run(&self, files: &[SourceFile], out: &OutputSink) -> anyhow::Result<Vec<PathBuf>> {
        let mut writer = Writer::new(Vec::new());
        let mut root = BytesStart::new("svg");
        root.push_attribute(("xmlns", "http://www.w3.org/2000/svg"));
        writer.write_event(Event::Start(root))?;

        let mut ids = HashSet::new();
        for file in files {
            let id = file
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !ids.insert(id.clone()) {
                bail!("duplicate sprite id '{}' from {}", id, file.path.display());
            }

            let source = fs::read_to_string(&file.path)
                .with_context(|| format!("Failed to read {}", file.path.display()))?;
            append_symbol(&mut writer, &id, &source)
                .with_context(|| format!("Failed to add {} to sprite", file.path.display()))?;
        }

        writer.write_event(Event::End(BytesEnd::new("svg")))?;
        Ok(vec![out.write(&self.file_name, writer.into_inner())?])
    }

    fn describe(&self) -> &str {
        "svg-sprite"
    }
}
