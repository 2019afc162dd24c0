// Execution Engine Module
// Handles matrix expansion, task dispatch and run reporting

pub mod context;
pub mod events;
pub mod executor;
pub mod matrix;

// Re-export key types
pub use context::{Bindings, TaskContext};
pub use events::{
    progress_channel, LogLevel, Message, MessageCollector, MessageSink, ProgressReceiver,
    ProgressSender, SharedSink, SinkExt, TracingSink,
};
pub use executor::{
    DocumentExecutor, DocumentResult, EntryResult, EntryStatus, GroupState, InvalidTransition,
    TaskGroupResult,
};
pub use matrix::{MatrixBuilder, MatrixEntry, MatrixExpander};
