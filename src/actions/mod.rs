//! Built-in asset transforms.
//!
//! Each action is a plain struct implementing [`Action`](crate::task::Action)
//! and writes only through the sink it is handed.

pub mod copy;
pub mod html;
pub mod images;
pub mod scripts;
pub mod sprite;
pub mod styles;

pub use copy::CopyFiles;
pub use html::MinifyHtml;
pub use images::{ConvertWebp, OptimizeImages};
pub use scripts::MinifyJs;
pub use sprite::SvgSprite;
pub use styles::CompileSass;

use std::path::{Path, PathBuf};

/// `dir/name.ext` -> `dir/name.min.<ext>`
pub(crate) fn min_name(rel: &Path, ext: &str) -> PathBuf {
    let stem = rel
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    rel.with_file_name(format!("{}.min.{}", stem, ext))
}

/// Lowercased file extension
pub(crate) fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
