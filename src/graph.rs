//! Stage tree describing how tasks are ordered.
//!
//! Ordering is declared by whoever composes the tree: serial children run
//! one after another, parallel children run concurrently behind a join
//! barrier. No file-level dependencies are inferred.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Run a registered task by name
    Task(String),
    /// Wipe the build directory
    Clean,
    Serial(Vec<Stage>),
    Parallel(Vec<Stage>),
}

pub fn task(name: impl Into<String>) -> Stage {
    Stage::Task(name.into())
}

pub fn clean() -> Stage {
    Stage::Clean
}

pub fn serial(stages: impl IntoIterator<Item = Stage>) -> Stage {
    Stage::Serial(stages.into_iter().collect())
}

pub fn parallel(stages: impl IntoIterator<Item = Stage>) -> Stage {
    Stage::Parallel(stages.into_iter().collect())
}

impl Stage {
    /// Task leaves in declaration order
    pub fn task_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Stage::Task(name) => names.push(name),
            Stage::Clean => {}
            Stage::Serial(children) | Stage::Parallel(children) => {
                for child in children {
                    child.collect_names(names);
                }
            }
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, children: &[Stage], sep: &str) -> fmt::Result {
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{}", child)?;
            }
            Ok(())
        }

        match self {
            Stage::Task(name) => f.write_str(name),
            Stage::Clean => f.write_str("clean"),
            Stage::Serial(children) => join(f, children, " -> "),
            Stage::Parallel(children) => {
                f.write_str("{")?;
                join(f, children, " | ")?;
                f.write_str("}")
            }
        }
    }
}
