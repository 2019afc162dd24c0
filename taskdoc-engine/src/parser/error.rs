// Reader error types
// Every way a document can fail to load, with enough location to fix it

use crate::model::ModelError;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Cannot read document '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid YAML at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Invalid model: {0}")]
    Model(#[from] ModelError),

    #[error("Unknown field '{0}'!")]
    UnknownField(String),

    #[error("Missing field '{field}' in {location}")]
    MissingField { field: String, location: String },

    #[error("Invalid value for '{field}' in {location}: {reason}")]
    InvalidValue {
        field: String,
        location: String,
        reason: String,
    },

    #[error("Field '{field}' in {location} must be {expected}")]
    InvalidType {
        field: String,
        location: String,
        expected: &'static str,
    },
}

pub type ReadResult<T> = Result<T, ReadError>;

impl ReadError {
    /// Create from a serde_yaml error
    pub fn from_yaml_error(err: &serde_yaml::Error) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));

        // serde_yaml appends its own location; keep only the message
        let message = err.to_string();
        let message = match message.find(" at line ") {
            Some(pos) => message[..pos].to_string(),
            None => message,
        };

        ReadError::Syntax {
            message,
            line,
            column,
        }
    }

    pub(crate) fn missing(field: &str, location: &str) -> Self {
        ReadError::MissingField {
            field: field.to_string(),
            location: location.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, location: &str, reason: impl Into<String>) -> Self {
        ReadError::InvalidValue {
            field: field.to_string(),
            location: location.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn wrong_type(field: &str, location: &str, expected: &'static str) -> Self {
        ReadError::InvalidType {
            field: field.to_string(),
            location: location.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_message() {
        let err = ReadError::UnknownField("unknown".to_string());
        assert_eq!(err.to_string(), "Unknown field 'unknown'!");
    }

    #[test]
    fn test_from_yaml_error() {
        let err = serde_yaml::from_str::<serde_yaml::Value>("key: [unclosed").unwrap_err();
        let err = ReadError::from_yaml_error(&err);

        match &err {
            ReadError::Syntax { line, message, .. } => {
                assert!(*line >= 1);
                assert!(!message.contains(" at line "));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.to_string().starts_with("Invalid YAML at line "));
    }

    #[test]
    fn test_field_error_messages() {
        assert_eq!(
            ReadError::missing("type", "task 1 of taskgroup 'build'").to_string(),
            "Missing field 'type' in task 1 of taskgroup 'build'"
        );
        assert_eq!(
            ReadError::wrong_type("parallel", "taskgroup 'build'", "a boolean").to_string(),
            "Field 'parallel' in taskgroup 'build' must be a boolean"
        );
    }
}
