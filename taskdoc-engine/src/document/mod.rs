// Document Module
// The in-memory document: an optional model plus ordered task groups

pub mod group;
pub mod task;

pub use group::{ConcurrencyMode, TaskGroup};
pub use task::{
    Task, TaskBody, TaskError, TaskResult, TaskStatus, VariableCapture, DEFAULT_VARIABLE_NAME,
};

use crate::execution::events::SharedSink;
use crate::execution::executor::{DocumentExecutor, DocumentResult};
use crate::model::Model;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Budget per matrix entry when neither the group nor the caller sets one
pub const DEFAULT_TASK_GROUP_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Caller-supplied run configuration
#[derive(Debug, Clone)]
pub struct DocumentParameters {
    /// Tags selecting the tasks to run (empty = all)
    pub tag_filters: BTreeSet<String>,
    /// Per-entry budget for groups without their own timeout
    pub task_group_timeout: Duration,
    /// Run sibling groups concurrently instead of in document order
    pub parallel_groups: bool,
}

impl Default for DocumentParameters {
    fn default() -> Self {
        Self {
            tag_filters: BTreeSet::new(),
            task_group_timeout: DEFAULT_TASK_GROUP_TIMEOUT,
            parallel_groups: false,
        }
    }
}

impl DocumentParameters {
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_filters = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_task_group_timeout(mut self, timeout: Duration) -> Self {
        self.task_group_timeout = timeout;
        self
    }

    pub fn with_parallel_groups(mut self, parallel_groups: bool) -> Self {
        self.parallel_groups = parallel_groups;
        self
    }
}

#[derive(Debug, Default)]
pub struct Document {
    model: Option<Arc<Model>>,
    task_groups: Vec<TaskGroup>,
}

impl Document {
    pub fn new(model: Option<Model>) -> Self {
        Self {
            model: model.map(Arc::new),
            task_groups: Vec::new(),
        }
    }

    pub fn with_task_group(mut self, group: TaskGroup) -> Self {
        self.task_groups.push(group);
        self
    }

    pub fn add_task_group(&mut self, group: TaskGroup) {
        self.task_groups.push(group);
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    pub fn task_groups(&self) -> &[TaskGroup] {
        &self.task_groups
    }

    /// Run every group with the default runners
    pub async fn run(&self, parameters: &DocumentParameters, sink: SharedSink) -> DocumentResult {
        DocumentExecutor::new(sink).run(self, parameters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::MessageCollector;
    use crate::runners::ExecutorKind;

    #[test]
    fn test_parameters_builder() {
        let parameters = DocumentParameters::default()
            .with_tags(["tag support"])
            .with_task_group_timeout(Duration::from_secs(60))
            .with_parallel_groups(true);

        assert!(parameters.tag_filters.contains("tag support"));
        assert_eq!(parameters.task_group_timeout, Duration::from_secs(60));
        assert!(parameters.parallel_groups);
        assert!(!DocumentParameters::default().parallel_groups);
    }

    #[tokio::test]
    async fn test_run_empty_document_succeeds() {
        let document = Document::new(None);
        let result = document
            .run(&DocumentParameters::default(), MessageCollector::new())
            .await;

        assert!(result.success);
        assert!(result.groups.is_empty());
    }

    #[tokio::test]
    async fn test_run_document() {
        let document = Document::new(None).with_task_group(
            TaskGroup::new("greetings").with_task(Task::new(
                "hello",
                ExecutorKind::Script,
                TaskBody::new("'hello world!'").with_variable(VariableCapture::new("default")),
            )),
        );
        let collector = MessageCollector::new();

        let result = document
            .run(&DocumentParameters::default(), collector.clone())
            .await;

        assert!(result.success);
        assert_eq!(result.groups[0].output, "hello world!");
        assert_eq!(collector.lines(), vec!["set variable default=hello world!"]);
    }
}
