// Engine errors
// One error type for callers that drive the engine end to end

use crate::document::TaskError;
use crate::execution::InvalidTransition;
use crate::model::ModelError;
use crate::parser::ReadError;
use crate::runners::ExecutionError;

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    State(#[from] InvalidTransition),

    #[error("taskgroups did not complete: {}", .0.join(", "))]
    RunFailed(Vec<String>),
}

impl EngineError {
    /// Failure listing every group that did not reach `Completed`
    pub fn run_failed(result: &crate::execution::DocumentResult) -> Option<Self> {
        let failed: Vec<String> = result
            .groups
            .iter()
            .filter(|group| !group.succeeded())
            .map(|group| format!("'{}' ({:?})", group.name, group.state))
            .collect();
        (!failed.is_empty()).then_some(EngineError::RunFailed(failed))
    }
}
