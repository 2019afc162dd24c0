// Variables
// Named values and the per-group publish/subscribe bus that carries them

pub mod publisher;

pub use publisher::{VariableCollector, VariablePublisher, VariableSubscriber};

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("variable name must not be empty")]
pub struct EmptyVariableName;

/// A published name/value pair; every publication is a new instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Variable {
    name: String,
    value: String,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self, EmptyVariableName> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EmptyVariableName);
        }
        Ok(Self {
            name,
            value: value.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}
