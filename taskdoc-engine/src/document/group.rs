// Task Group
// Ordered tasks sharing a concurrency mode, a matrix, a timeout and a variable bus

use crate::document::task::Task;
use crate::execution::matrix::MatrixEntry;
use crate::variables::VariablePublisher;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// How the tasks of one matrix entry are dispatched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ConcurrencyMode {
    /// Declared order, one after another
    #[default]
    Sequential,
    /// All tasks start together; results arrive in completion order
    Parallel,
}

#[derive(Debug)]
pub struct TaskGroup {
    pub name: String,
    pub tasks: Vec<Arc<Task>>,
    pub mode: ConcurrencyMode,
    pub matrix: Vec<MatrixEntry>,
    /// Per-entry budget; the run parameters supply one when absent
    pub timeout: Option<Duration>,
    publisher: Arc<VariablePublisher>,
}

impl TaskGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            mode: ConcurrencyMode::default(),
            matrix: Vec::new(),
            timeout: None,
            publisher: Arc::new(VariablePublisher::new()),
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(Arc::new(task));
        self
    }

    pub fn with_mode(mut self, mode: ConcurrencyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_matrix(mut self, matrix: Vec<MatrixEntry>) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The group's variable bus; subscribe here to observe every publication
    pub fn publisher(&self) -> &Arc<VariablePublisher> {
        &self.publisher
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().map(Arc::as_ref)
    }

    pub fn is_parallel(&self) -> bool {
        self.mode == ConcurrencyMode::Parallel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::task::TaskBody;
    use crate::execution::matrix::MatrixBuilder;
    use crate::runners::ExecutorKind;
    use crate::variables::VariableCollector;

    #[test]
    fn test_group_builder() {
        let group = TaskGroup::new("build")
            .with_task(Task::new("a", ExecutorKind::Shell, TaskBody::new("true")))
            .with_task(Task::new("b", ExecutorKind::Script, TaskBody::new("1")))
            .with_mode(ConcurrencyMode::Parallel)
            .with_matrix(MatrixBuilder::new().add_titled("one").build())
            .with_timeout(Duration::from_secs(5));

        let names: Vec<_> = group.tasks().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(group.is_parallel());
        assert_eq!(group.matrix.len(), 1);
        assert_eq!(group.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_each_group_owns_its_publisher() {
        let first = TaskGroup::new("first");
        let second = TaskGroup::new("second");
        let collector = VariableCollector::new();
        first.publisher().subscribe(collector.clone());

        first.publisher().publish("x", "1").unwrap();
        second.publisher().publish("x", "2").unwrap();

        assert_eq!(collector.len(), 1);
        assert_eq!(second.publisher().subscriber_count(), 0);
    }
}
