// Task
// Declarative unit of work bound to one executor kind

use crate::execution::context::TaskContext;
use crate::execution::events::SinkExt;
use crate::runners::{ExecutionError, ExecutorKind};

use regex::Regex;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Name used when a `variable:` block does not name its variable
pub const DEFAULT_VARIABLE_NAME: &str = "default";

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task '{task}' failed: {cause}")]
    TaskFailed {
        task: String,
        #[source]
        cause: ExecutionError,
    },
}

/// Where a task's output goes once it succeeded
#[derive(Debug, Clone)]
pub struct VariableCapture {
    pub name: String,
    pub regex: Option<Regex>,
    /// Capture group of `regex` holding the value (0 = whole match)
    pub group: usize,
}

impl VariableCapture {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regex: None,
            group: 0,
        }
    }

    pub fn with_regex(mut self, regex: Regex, group: usize) -> Self {
        self.regex = Some(regex);
        self.group = group;
        self
    }

    /// The value to publish, or None when the regex matches no line
    pub fn extract(&self, output: &str) -> Option<String> {
        let Some(regex) = &self.regex else {
            return Some(output.to_string());
        };

        output
            .lines()
            .find_map(|line| regex.captures(line))
            .and_then(|caps| caps.get(self.group))
            .map(|m| m.as_str().to_string())
    }
}

/// Code handed to an executor
#[derive(Debug, Clone, Default)]
pub struct TaskBody {
    pub code: String,
    /// Container image, `docker` tasks only
    pub image: Option<String>,
    pub variable: Option<VariableCapture>,
}

impl TaskBody {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_variable(mut self, variable: VariableCapture) -> Self {
        self.variable = Some(variable);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub kind: ExecutorKind,
    pub tags: Vec<String>,
    pub body: TaskBody,
    pub disabled: bool,
    /// Failures are recorded but do not stop the matrix entry
    pub continue_on_error: bool,
    /// A missing backend skips the task instead of failing it
    pub optional: bool,
}

/// Status of a single task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Succeeded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_name: String,
    pub status: TaskStatus,
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
}

impl TaskResult {
    fn new(task_name: &str, status: TaskStatus, start: Instant) -> Self {
        Self {
            task_name: task_name.to_string(),
            status,
            output: String::new(),
            error: None,
            duration: start.elapsed(),
        }
    }
}

impl Task {
    pub fn new(name: impl Into<String>, kind: ExecutorKind, body: TaskBody) -> Self {
        Self {
            name: name.into(),
            kind,
            tags: Vec::new(),
            body,
            disabled: false,
            continue_on_error: false,
            optional: false,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Whether this task would run under the context's filters
    pub fn is_eligible(&self, context: &TaskContext) -> bool {
        !self.disabled && context.accepts_tags(&self.tags)
    }

    /// Name of the variable this task publishes, if any
    pub fn variable_name(&self) -> Option<&str> {
        self.body.variable.as_ref().map(|v| v.name.as_str())
    }

    /// Run the task body and publish its variable
    pub async fn run(&self, context: &TaskContext) -> TaskResult {
        let start = Instant::now();

        if self.disabled {
            tracing::debug!(group = %context.group, entry = %context.entry, task = %self.name, "task disabled");
            return TaskResult::new(&self.name, TaskStatus::Skipped, start);
        }
        if !context.accepts_tags(&self.tags) {
            tracing::debug!(group = %context.group, entry = %context.entry, task = %self.name, "task filtered by tags");
            return TaskResult::new(&self.name, TaskStatus::Skipped, start);
        }

        tracing::debug!(group = %context.group, entry = %context.entry, task = %self.name, kind = %self.kind, "running task");

        let bindings = context.current_bindings();
        let executor = context.registry.get(self.kind);

        match executor.execute(&self.body, &bindings, &context.publisher).await {
            Ok(execution) => {
                if let Some(capture) = &self.body.variable {
                    self.publish_capture(capture, &execution.output, context);
                }
                let mut result = TaskResult::new(&self.name, TaskStatus::Succeeded, start);
                result.output = execution.output;
                result
            }
            Err(ExecutionError::EnvironmentUnavailable(reason)) if self.optional => {
                context.sink.warning(format!(
                    "Skipping optional task '{}' in taskgroup '{}' ({}): {}",
                    self.name, context.group, context.entry, reason
                ));
                TaskResult::new(&self.name, TaskStatus::Skipped, start)
            }
            Err(cause) => {
                let error = TaskError::TaskFailed {
                    task: self.name.clone(),
                    cause,
                };
                context.sink.error(format!(
                    "Taskgroup '{}' ({}): {}",
                    context.group, context.entry, error
                ));
                let mut result = TaskResult::new(&self.name, TaskStatus::Failed, start);
                result.error = Some(error.to_string());
                result
            }
        }
    }

    fn publish_capture(&self, capture: &VariableCapture, output: &str, context: &TaskContext) {
        match capture.extract(output) {
            Some(value) => {
                if context.publisher.publish(&capture.name, value).is_err() {
                    tracing::warn!(task = %self.name, "variable without a name was not published");
                }
            }
            None => context.sink.warning(format!(
                "Task '{}' in taskgroup '{}' ({}): no output line matched the regex of variable '{}'",
                self.name, context.group, context.entry, capture.name
            )),
        }
    }
}
