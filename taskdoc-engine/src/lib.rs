// Taskdoc Engine Library
// Reads task documents and runs their task groups through pluggable executors

pub mod document;
pub mod error;
pub mod execution;
pub mod model;
pub mod parser;
pub mod runners;
pub mod variables;

// Re-export commonly used types
pub use error::{EngineError, EngineResult};

pub use document::{
    ConcurrencyMode, Document, DocumentParameters, Task, TaskBody, TaskError, TaskGroup,
    TaskResult, TaskStatus, VariableCapture,
};

pub use execution::{
    Bindings, DocumentExecutor, DocumentResult, EntryResult, EntryStatus, GroupState, LogLevel,
    MatrixEntry, Message, MessageCollector, MessageSink, SharedSink, TaskGroupResult, TracingSink,
};

pub use model::{Model, ModelError, Node};

pub use parser::{DocumentReader, ReadError};

pub use runners::{ExecutionError, Executor, ExecutorKind, RunnerConfig, RunnerRegistry, Shell};

pub use variables::{Variable, VariableCollector, VariablePublisher, VariableSubscriber};
