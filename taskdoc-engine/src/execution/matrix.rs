// Matrix Expansion
// Expands a task group's matrix into the ordered entries it runs

use serde::Serialize;
use std::collections::BTreeMap;

/// Binding whose value labels a matrix entry
pub const TITLE_BINDING: &str = "title";

/// Label of the entry synthesized for a group without a matrix
pub const IMPLICIT_ENTRY_LABEL: &str = "default";

/// A single matrix entry (one set of bindings)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixEntry {
    /// Diagnostic label, never used for scheduling
    pub label: String,
    /// Variable values for this entry
    pub bindings: BTreeMap<String, String>,
}

impl MatrixEntry {
    pub fn new(label: impl Into<String>, bindings: BTreeMap<String, String>) -> Self {
        Self {
            label: label.into(),
            bindings,
        }
    }

    /// Entry at `index` (0-based), labelled by its `title` binding when present
    pub fn from_bindings(index: usize, bindings: BTreeMap<String, String>) -> Self {
        let label = bindings
            .get(TITLE_BINDING)
            .cloned()
            .unwrap_or_else(|| format!("matrix entry {}", index + 1));
        Self { label, bindings }
    }

    /// Build an entry from a YAML mapping of scalars
    pub fn from_yaml(index: usize, mapping: &serde_yaml::Mapping) -> Result<Self, String> {
        let mut bindings = BTreeMap::new();
        for (key, value) in mapping {
            let name = key
                .as_str()
                .ok_or_else(|| format!("matrix entry {} has a non-string key", index + 1))?;
            let value = scalar_text(value).ok_or_else(|| {
                format!("matrix binding '{}' must be a scalar value", name)
            })?;
            bindings.insert(name.to_string(), value);
        }
        Ok(Self::from_bindings(index, bindings))
    }

    pub fn implicit() -> Self {
        Self::new(IMPLICIT_ENTRY_LABEL, BTreeMap::new())
    }
}

/// Matrix expander for task groups
pub struct MatrixExpander;

impl MatrixExpander {
    /// Entries to run, in declared order; an empty matrix runs once
    pub fn expand(matrix: &[MatrixEntry]) -> Vec<MatrixEntry> {
        if matrix.is_empty() {
            return vec![MatrixEntry::implicit()];
        }
        matrix.to_vec()
    }
}

/// Render a YAML scalar as binding text
fn scalar_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_)
        | serde_yaml::Value::Tagged(_) => None,
    }
}

/// Builder for creating matrices programmatically
#[derive(Debug, Default)]
pub struct MatrixBuilder {
    entries: Vec<MatrixEntry>,
}

impl MatrixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry with the given bindings
    pub fn add_entry<I, K, V>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let bindings = bindings
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let index = self.entries.len();
        self.entries.push(MatrixEntry::from_bindings(index, bindings));
        self
    }

    /// Add an entry holding only a title
    pub fn add_titled(self, title: impl Into<String>) -> Self {
        let title: String = title.into();
        self.add_entry([(TITLE_BINDING, title)])
    }

    pub fn build(self) -> Vec<MatrixEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matrix_runs_once() {
        let entries = MatrixExpander::expand(&[]);

        assert_eq!(entries, vec![MatrixEntry::implicit()]);
        assert_eq!(entries[0].label, "default");
        assert!(entries[0].bindings.is_empty());
    }

    #[test]
    fn test_expand_keeps_declared_order() {
        let matrix = MatrixBuilder::new()
            .add_titled("the first run")
            .add_entry([("os", "linux")])
            .add_titled("the third run")
            .build();

        let labels: Vec<_> = MatrixExpander::expand(&matrix)
            .into_iter()
            .map(|e| e.label)
            .collect();

        assert_eq!(labels, vec!["the first run", "matrix entry 2", "the third run"]);
    }

    #[test]
    fn test_entry_from_yaml() {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str("title: the first run\ncount: 3\nenabled: true\nempty:\n").unwrap();
        let entry = MatrixEntry::from_yaml(0, yaml.as_mapping().unwrap()).unwrap();

        assert_eq!(entry.label, "the first run");
        assert_eq!(entry.bindings.get("count"), Some(&"3".to_string()));
        assert_eq!(entry.bindings.get("enabled"), Some(&"true".to_string()));
        assert_eq!(entry.bindings.get("empty"), Some(&String::new()));
    }

    #[test]
    fn test_entry_from_yaml_rejects_nested_values() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("list: [1, 2]\n").unwrap();
        let err = MatrixEntry::from_yaml(0, yaml.as_mapping().unwrap()).unwrap_err();

        assert!(err.contains("'list'"));
    }
}
