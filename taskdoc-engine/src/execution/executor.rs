// Document Executor
// Runs task groups: matrix expansion, task dispatch, timeouts and fail-fast

use crate::document::{ConcurrencyMode, Document, DocumentParameters, Task, TaskGroup, TaskResult, TaskStatus};
use crate::execution::context::{Bindings, TaskContext};
use crate::execution::events::{SharedSink, SinkExt};
use crate::execution::matrix::{MatrixEntry, MatrixExpander};
use crate::model::Model;
use crate::runners::{RunnerConfig, RunnerRegistry};

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinSet;

/// Stand-in deadline for budgets too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Lifecycle of one task group run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupState {
    Pending,
    ExpandingMatrix,
    Running,
    Completed,
    TimedOut,
    Failed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid task group transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: GroupState,
    pub to: GroupState,
}

impl GroupState {
    /// Move to `next` if the lifecycle allows it
    pub fn advance(self, next: GroupState) -> Result<GroupState, InvalidTransition> {
        use GroupState::*;
        match (self, next) {
            (Pending, ExpandingMatrix)
            | (ExpandingMatrix, Running)
            | (Running, Completed)
            | (Running, TimedOut)
            | (Running, Failed) => Ok(next),
            (from, to) => Err(InvalidTransition { from, to }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GroupState::Completed | GroupState::TimedOut | GroupState::Failed
        )
    }
}

/// Outcome of one matrix entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryStatus {
    Completed,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryResult {
    pub label: String,
    pub status: EntryStatus,
    /// Finished tasks in declared (sequential) or completion (parallel) order
    pub tasks: Vec<TaskResult>,
    pub output: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskGroupResult {
    pub name: String,
    pub state: GroupState,
    pub entries: Vec<EntryResult>,
    /// Entry outputs in declared entry order
    pub output: String,
    pub duration: Duration,
}

impl TaskGroupResult {
    pub fn succeeded(&self) -> bool {
        self.state == GroupState::Completed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResult {
    pub groups: Vec<TaskGroupResult>,
    pub success: bool,
    pub duration: Duration,
}

impl DocumentResult {
    pub fn group(&self, name: &str) -> Option<&TaskGroupResult> {
        self.groups.iter().find(|g| g.name == name)
    }
}

/// Runs documents against one set of runners, reporting into one sink
pub struct DocumentExecutor {
    registry: Arc<RunnerRegistry>,
    sink: SharedSink,
}

impl DocumentExecutor {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            registry: Arc::new(RunnerRegistry::new()),
            sink,
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.registry = Arc::new(RunnerRegistry::with_config(config));
        self
    }

    pub fn with_registry(mut self, registry: Arc<RunnerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Run every group of a document.
    ///
    /// Groups never abort their siblings. Sequential groups see the latest
    /// values published by the groups before them.
    pub async fn run(&self, document: &Document, parameters: &DocumentParameters) -> DocumentResult {
        let start = Instant::now();
        let model = document.model();

        tracing::info!(
            groups = document.task_groups().len(),
            parallel_groups = parameters.parallel_groups,
            "running document"
        );

        let groups = if parameters.parallel_groups {
            let inherited = BTreeMap::new();
            futures::future::join_all(
                document
                    .task_groups()
                    .iter()
                    .map(|group| self.run_group(group, model, parameters, &inherited)),
            )
            .await
        } else {
            let mut inherited = BTreeMap::new();
            let mut results = Vec::with_capacity(document.task_groups().len());
            for group in document.task_groups() {
                results.push(self.run_group(group, model, parameters, &inherited).await);
                inherited.extend(group.publisher().values());
            }
            results
        };

        let success = groups.iter().all(TaskGroupResult::succeeded);
        let duration = start.elapsed();
        tracing::info!(success, ?duration, "document finished");

        DocumentResult {
            groups,
            success,
            duration,
        }
    }

    /// Run one group through its lifecycle
    pub async fn run_group(
        &self,
        group: &TaskGroup,
        model: Option<&Arc<Model>>,
        parameters: &DocumentParameters,
        inherited: &BTreeMap<String, String>,
    ) -> TaskGroupResult {
        let start = Instant::now();
        let mut state = GroupState::Pending;

        self.transition(&group.name, &mut state, GroupState::ExpandingMatrix);
        group.publisher().begin_run(self.sink.clone());
        let entries = MatrixExpander::expand(&group.matrix);

        self.transition(&group.name, &mut state, GroupState::Running);
        let budget = group.timeout.unwrap_or(parameters.task_group_timeout);
        tracing::info!(group = %group.name, entries = entries.len(), mode = ?group.mode, ?budget, "running taskgroup");

        let mut entry_results = Vec::with_capacity(entries.len());
        let mut outcome = GroupState::Completed;

        for entry in &entries {
            let result = self
                .run_entry(group, entry, model, parameters, inherited, budget)
                .await;
            let status = result.status;
            entry_results.push(result);

            match status {
                EntryStatus::Completed => {}
                EntryStatus::Failed => {
                    outcome = GroupState::Failed;
                    break;
                }
                EntryStatus::TimedOut => {
                    outcome = GroupState::TimedOut;
                    break;
                }
            }
        }

        self.transition(&group.name, &mut state, outcome);

        let output = join_outputs(entry_results.iter().map(|e| e.output.as_str()));
        let duration = start.elapsed();
        tracing::info!(group = %group.name, ?state, ?duration, "taskgroup finished");

        TaskGroupResult {
            name: group.name.clone(),
            state,
            entries: entry_results,
            output,
            duration,
        }
    }

    async fn run_entry(
        &self,
        group: &TaskGroup,
        entry: &MatrixEntry,
        model: Option<&Arc<Model>>,
        parameters: &DocumentParameters,
        inherited: &BTreeMap<String, String>,
        budget: Duration,
    ) -> EntryResult {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now()
            .checked_add(budget)
            .unwrap_or_else(|| tokio::time::Instant::now() + FAR_FUTURE);

        let bindings = Bindings::new()
            .with_model(model.cloned())
            .with_values(inherited.clone())
            .with_values(entry.bindings.clone());

        let context = TaskContext {
            group: group.name.clone(),
            entry: entry.label.clone(),
            bindings,
            publisher: Arc::clone(group.publisher()),
            registry: Arc::clone(&self.registry),
            sink: self.sink.clone(),
            tag_filters: Arc::new(parameters.tag_filters.clone()),
        };

        group.publisher().declare_usage(
            group
                .tasks()
                .filter(|task| task.is_eligible(&context))
                .filter_map(Task::variable_name),
        );

        tracing::debug!(group = %group.name, entry = %entry.label, "running matrix entry");

        let (tasks, status) = match group.mode {
            ConcurrencyMode::Sequential => run_sequential(&group.tasks, &context, deadline).await,
            ConcurrencyMode::Parallel => run_parallel(&group.tasks, &context, deadline).await,
        };

        if status == EntryStatus::TimedOut {
            self.sink.error(format!(
                "Taskgroup '{}' ({}): timed out after {:?}",
                group.name, entry.label, budget
            ));
        }

        let output = join_outputs(tasks.iter().map(|t| t.output.as_str()));

        EntryResult {
            label: entry.label.clone(),
            status,
            tasks,
            output,
            duration: start.elapsed(),
        }
    }

    fn transition(&self, group: &str, state: &mut GroupState, next: GroupState) {
        match state.advance(next) {
            Ok(advanced) => *state = advanced,
            Err(e) => tracing::error!(group, error = %e, "ignoring task group transition"),
        }
    }
}

/// Whether a finished task ends its entry
fn stops_entry(task: &Task, result: &TaskResult) -> bool {
    result.status == TaskStatus::Failed && !task.continue_on_error
}

/// Declared order; the first failure without continue-on-error ends the entry
async fn run_sequential(
    tasks: &[Arc<Task>],
    context: &TaskContext,
    deadline: tokio::time::Instant,
) -> (Vec<TaskResult>, EntryStatus) {
    let mut results = Vec::with_capacity(tasks.len());

    for task in tasks {
        let Ok(result) = tokio::time::timeout_at(deadline, task.run(context)).await else {
            return (results, EntryStatus::TimedOut);
        };
        let stop = stops_entry(task, &result);
        results.push(result);
        if stop {
            return (results, EntryStatus::Failed);
        }
    }

    (results, EntryStatus::Completed)
}

/// All tasks start at once; results are collected as they complete
async fn run_parallel(
    tasks: &[Arc<Task>],
    context: &TaskContext,
    deadline: tokio::time::Instant,
) -> (Vec<TaskResult>, EntryStatus) {
    let mut workers = JoinSet::new();
    for (index, task) in tasks.iter().enumerate() {
        let task = Arc::clone(task);
        let context = context.clone();
        workers.spawn(async move { (index, task.run(&context).await) });
    }

    let mut results = Vec::with_capacity(tasks.len());
    let mut status = EntryStatus::Completed;

    loop {
        match tokio::time::timeout_at(deadline, workers.join_next()).await {
            Err(_) => {
                status = EntryStatus::TimedOut;
                break;
            }
            Ok(None) => break,
            Ok(Some(Ok((index, result)))) => {
                let stop = stops_entry(&tasks[index], &result);
                results.push(result);
                if stop {
                    status = EntryStatus::Failed;
                    break;
                }
            }
            Ok(Some(Err(e))) => {
                context.sink.error(format!(
                    "Taskgroup '{}' ({}): task worker failed: {}",
                    context.group, context.entry, e
                ));
                status = EntryStatus::Failed;
                break;
            }
        }
    }

    // outstanding tasks are cancelled and their output discarded
    workers.abort_all();
    (results, status)
}

fn join_outputs<'a>(outputs: impl Iterator<Item = &'a str>) -> String {
    outputs
        .filter(|o| !o.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
