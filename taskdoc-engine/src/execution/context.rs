// Runtime Execution Context
// Variable bindings, placeholder substitution and the context handed to tasks

use crate::execution::events::SharedSink;
use crate::model::Model;
use crate::runners::RunnerRegistry;
use crate::variables::VariablePublisher;

use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

/// Prefix that routes a placeholder into the document model
const MODEL_PREFIX: &str = "model.";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_.\-\[\]]*)\s*\}").expect("placeholder regex is valid")
    })
}

/// Values visible to a task body
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<String, String>,
    model: Option<Arc<Model>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: Option<Arc<Model>>) -> Self {
        self.model = model;
        self
    }

    pub fn with_values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.extend(values);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Add values, replacing existing names
    pub fn extend<I, K, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in values {
            self.insert(name, value);
        }
    }

    /// Resolve a name; `model.<path>` reads from the document model
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.values.get(name) {
            return Some(value.clone());
        }
        let path = name.strip_prefix(MODEL_PREFIX)?;
        self.model
            .as_ref()
            .and_then(|model| model.get(path).ok())
            .map(|node| node.render())
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    /// Replace `${name}` placeholders; unresolved ones stay as written
    pub fn substitute(&self, text: &str) -> String {
        placeholder_pattern()
            .replace_all(text, |caps: &Captures| {
                self.get(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Everything a task needs while one matrix entry runs
#[derive(Clone)]
pub struct TaskContext {
    pub group: String,
    pub entry: String,
    pub bindings: Bindings,
    pub publisher: Arc<VariablePublisher>,
    pub registry: Arc<RunnerRegistry>,
    pub sink: SharedSink,
    pub tag_filters: Arc<BTreeSet<String>>,
}

impl TaskContext {
    /// Entry bindings overlaid with the latest published values
    pub fn current_bindings(&self) -> Bindings {
        let mut bindings = self.bindings.clone();
        bindings.extend(self.publisher.values());
        bindings
    }

    /// Whether a task with these tags passes the caller's tag filter
    pub fn accepts_tags(&self, tags: &[String]) -> bool {
        self.tag_filters.is_empty() || tags.iter().any(|tag| self.tag_filters.contains(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Arc<Model> {
        let tree: serde_yaml::Value = serde_yaml::from_str(
            "description: main\nitems:\n  - first\n  - nested:\n      value: deep\n",
        )
        .unwrap();
        Arc::new(Model::build(&tree).unwrap())
    }

    #[test]
    fn test_substitute_variables() {
        let bindings = Bindings::new().with_values([("name", "world"), ("count", "3")]);
        assert_eq!(
            bindings.substitute("hello ${name}, ${ count } times"),
            "hello world, 3 times"
        );
    }

    #[test]
    fn test_unresolved_placeholder_stays_verbatim() {
        let bindings = Bindings::new().with_values([("known", "yes")]);
        assert_eq!(
            bindings.substitute("${known} ${unknown} $notaplaceholder"),
            "yes ${unknown} $notaplaceholder"
        );
    }

    #[test]
    fn test_model_placeholders() {
        let bindings = Bindings::new().with_model(Some(model()));
        assert_eq!(
            bindings.substitute("${model.description}/${model.items[1].nested.value}"),
            "main/deep"
        );
        assert_eq!(bindings.substitute("${model.missing}"), "${model.missing}");
    }

    #[test]
    fn test_values_shadow_model() {
        let bindings = Bindings::new()
            .with_model(Some(model()))
            .with_values([("model.description", "override")]);
        assert_eq!(bindings.get("model.description"), Some("override".to_string()));
    }
}
