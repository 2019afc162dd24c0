// Parser module for task documents
// Reads YAML documents into the in-memory Document, reporting failures to a sink

pub mod error;
pub mod reader;

pub use error::{ReadError, ReadResult};
pub use reader::DocumentReader;
