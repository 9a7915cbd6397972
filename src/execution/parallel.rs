//! Join barrier for parallel stages

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;

use futures::future::join_all;

use crate::error::{PipelineError, Result};

/// Drive every stage future to completion and merge their outputs.
///
/// A failing sibling never cancels the others: all futures settle before
/// the result is decided, and every failure is reported.
pub async fn join_stages<I, F>(stages: I) -> Result<BTreeSet<PathBuf>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<BTreeSet<PathBuf>>>,
{
    let mut outputs = BTreeSet::new();
    let mut failures = Vec::new();

    for result in join_all(stages).await {
        match result {
            Ok(paths) => outputs.extend(paths),
            Err(e) => failures.push(e),
        }
    }

    match failures.len() {
        0 => Ok(outputs),
        1 => Err(failures.remove(0)),
        _ => Err(PipelineError::Parallel(failures)),
    }
}
