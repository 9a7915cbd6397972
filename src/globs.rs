//! Glob expansion and change-path matching.
//!
//! Patterns are relative to a root directory and follow the usual
//! `*`, `?`, `**`, `[...]` syntax of the `glob` crate, extended with
//! `{a,b}` alternatives which are expanded before compilation. `*` never
//! crosses a `/`.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::{PipelineError, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// An expanded input file together with the directory its output path is
/// relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub base: PathBuf,
}

impl SourceFile {
    /// Path below the base, used as the output path.
    pub fn relative(&self) -> PathBuf {
        match self.path.strip_prefix(&self.base) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => self
                .path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_default(),
        }
    }
}

/// Expand `{a,b}` alternatives into plain glob patterns.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0usize;
    let mut close = None;
    let mut splits = Vec::new();
    for (i, c) in pattern[open..].char_indices() {
        let i = open + i;
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(i),
            _ => {}
        }
    }

    // Unbalanced braces are left to the glob compiler to reject
    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = vec![open];
    bounds.extend(splits);
    bounds.push(close);

    bounds
        .windows(2)
        .flat_map(|w| {
            let alt = &pattern[w[0] + 1..w[1]];
            expand_braces(&format!("{prefix}{alt}{suffix}"))
        })
        .collect()
}

/// Literal directory prefix of a pattern, before the first wildcard segment.
pub fn glob_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    let segments: Vec<&str> = pattern.split('/').collect();
    // The last segment names files, never a directory of the base
    for segment in &segments[..segments.len().saturating_sub(1)] {
        if segment.contains(&['*', '?', '[', '{'][..]) {
            break;
        }
        base.push(segment);
    }
    base
}

/// Patterns are anchored at the normalized root so they agree with the
/// normalized paths they are matched against.
fn rooted(root: &Path, pattern: &str) -> String {
    let root = Pattern::escape(&normalize(root).to_string_lossy());
    let root = root.trim_end_matches('/');
    format!("{}/{}", root, pattern.trim_start_matches("./"))
}

fn compile(root: &Path, pattern: &str) -> Result<Vec<Pattern>> {
    expand_braces(pattern)
        .iter()
        .map(|p| {
            Pattern::new(&rooted(root, p)).map_err(|e| PipelineError::Glob {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// Compiled set of patterns for matching changed paths.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::new();
        for pattern in patterns {
            compiled.extend(compile(root, pattern)?);
        }
        Ok(Self { patterns: compiled })
    }

    pub fn matches(&self, path: &Path) -> bool {
        let normalized = normalize(path);
        self.patterns
            .iter()
            .any(|p| p.matches_path_with(&normalized, MATCH_OPTIONS))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Expand `includes` minus `excludes` under `root`.
///
/// Each file is relative to `base` when set, otherwise to the base of the
/// first include pattern that found it. The result is sorted by path and
/// holds no duplicates; a pattern matching nothing is not an error.
pub fn expand(
    root: &Path,
    includes: &[String],
    excludes: &[String],
    base: Option<&Path>,
) -> Result<Vec<SourceFile>> {
    let root = &normalize(root);
    let excluded = PatternSet::new(root, excludes)?;
    let mut found: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();

    for include in includes {
        let include_base = match base {
            Some(base) => root.join(base),
            None => root.join(glob_base(include)),
        };

        for alternative in expand_braces(include) {
            let pattern = rooted(root, &alternative);
            let paths = glob::glob_with(&pattern, MATCH_OPTIONS).map_err(|e| {
                PipelineError::Glob {
                    pattern: include.clone(),
                    message: e.to_string(),
                }
            })?;

            for entry in paths {
                let path = entry.map_err(|e| {
                    let path = e.path().to_path_buf();
                    PipelineError::fs(path, e.into_error())
                })?;
                if !path.is_file() || excluded.matches(&path) {
                    continue;
                }
                found.entry(path).or_insert_with(|| include_base.clone());
            }
        }
    }

    Ok(found
        .into_iter()
        .map(|(path, base)| SourceFile { path, base })
        .collect())
}

/// Lexically normalize a path (drop `.` and resolve `..`).
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_expand_braces() {
        assert_eq!(
            expand_braces("img/**/*.{jpg,png,svg}"),
            vec!["img/**/*.jpg", "img/**/*.png", "img/**/*.svg"]
        );
        assert_eq!(
            expand_braces("{a,b}/{c,d}"),
            vec!["a/c", "a/d", "b/c", "b/d"]
        );
        assert_eq!(expand_braces("plain/*.html"), vec!["plain/*.html"]);
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("img/**/*.png"), PathBuf::from("img"));
        assert_eq!(glob_base("sass/style.scss"), PathBuf::from("sass"));
        assert_eq!(glob_base("*.html"), PathBuf::new());
        assert_eq!(glob_base("img/icons/sprite/*.svg"), PathBuf::from("img/icons/sprite"));
    }

    #[test]
    fn test_expand_with_excludes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "img/hero.jpg");
        touch(root, "img/icons/logo.svg");
        touch(root, "img/icons/sprite/cart.svg");
        touch(root, "img/notes.txt");

        let files = expand(
            root,
            &["img/**/*.{jpg,png,svg}".to_string()],
            &["img/icons/sprite/*.svg".to_string()],
            None,
        )
        .unwrap();

        let rel: Vec<_> = files.iter().map(|f| f.relative()).collect();
        assert_eq!(
            rel,
            vec![PathBuf::from("hero.jpg"), PathBuf::from("icons/logo.svg")]
        );
    }

    #[test]
    fn test_explicit_base_preserves_path() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "fonts/inter.woff2");
        touch(root, "favicon.ico");

        let files = expand(
            root,
            &["fonts/*.{woff2,woff}".to_string(), "*.ico".to_string()],
            &[],
            Some(Path::new("")),
        )
        .unwrap();

        let rel: Vec<_> = files.iter().map(|f| f.relative()).collect();
        assert_eq!(
            rel,
            vec![PathBuf::from("favicon.ico"), PathBuf::from("fonts/inter.woff2")]
        );
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let dir = TempDir::new().unwrap();
        let set = PatternSet::new(dir.path(), &["js/*.js".to_string()]).unwrap();
        assert!(set.matches(&dir.path().join("js/app.js")));
        assert!(!set.matches(&dir.path().join("js/vendor/lib.js")));
        assert!(!set.matches(&dir.path().join("js/app.ts")));
    }

    #[test]
    fn test_dotted_root_still_applies_excludes() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "source/img/hero.svg");
        touch(dir.path(), "source/img/icons/sprite/cart.svg");
        let root = dir.path().join(".").join("source");

        let files = expand(
            &root,
            &["img/**/*.svg".to_string()],
            &["img/icons/sprite/*.svg".to_string()],
            None,
        )
        .unwrap();

        let rel: Vec<_> = files.iter().map(|f| f.relative()).collect();
        assert_eq!(rel, vec![PathBuf::from("hero.svg")]);
    }

    #[test]
    fn test_dotted_root_matches_plain_paths() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("site/../source");
        let set = PatternSet::new(&root, &["sass/**/*.scss".to_string()]).unwrap();
        assert!(set.matches(&dir.path().join("source/sass/a.scss")));
        assert!(set.matches(&dir.path().join("./source/sass/a.scss")));
    }

    #[test]
    fn test_missing_root_expands_to_nothing() {
        let dir = TempDir::new().unwrap();
        let files = expand(&dir.path().join("nope"), &["*.html".to_string()], &[], None).unwrap();
        assert!(files.is_empty());
    }
}
