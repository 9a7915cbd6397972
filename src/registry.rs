//! Named task registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::task::Task;

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Arc<Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Task) -> Result<Arc<Task>> {
        if self.tasks.contains_key(&task.name) {
            return Err(PipelineError::DuplicateTask(task.name));
        }
        if task.inputs.is_empty() {
            return Err(PipelineError::Task {
                task: task.name,
                message: "at least one input glob is required".to_string(),
            });
        }

        let task = Arc::new(task);
        self.tasks.insert(task.name.clone(), task.clone());
        Ok(task)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<Task>> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownTask(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Task names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
