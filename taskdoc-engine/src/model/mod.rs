// Document Model
// Read-only attribute tree built from the document's free-form `model` section

pub mod path;

pub use path::{ModelPath, PathSegment};

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while building or navigating a model
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("malformed model: {0}")]
    Parse(String),

    #[error("field not found: '{0}'")]
    FieldNotFound(String),

    #[error("type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid model path '{0}'")]
    InvalidPath(String),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// One node of the attribute tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Scalar(String),
    List(Vec<Node>),
    Map(IndexMap<String, Node>),
}

impl Node {
    /// Convert a YAML node tree, rendering numbers and booleans as text
    pub fn from_yaml(value: &serde_yaml::Value) -> ModelResult<Self> {
        match value {
            serde_yaml::Value::Null => Ok(Node::Scalar(String::new())),
            serde_yaml::Value::Bool(b) => Ok(Node::Scalar(b.to_string())),
            serde_yaml::Value::Number(n) => Ok(Node::Scalar(n.to_string())),
            serde_yaml::Value::String(s) => Ok(Node::Scalar(s.clone())),
            serde_yaml::Value::Sequence(seq) => seq
                .iter()
                .map(Node::from_yaml)
                .collect::<ModelResult<Vec<_>>>()
                .map(Node::List),
            serde_yaml::Value::Mapping(map) => {
                let mut entries = IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    let key = key.as_str().ok_or_else(|| {
                        ModelError::Parse(format!("map key {:?} is not a string", key))
                    })?;
                    entries.insert(key.to_string(), Node::from_yaml(value)?);
                }
                Ok(Node::Map(entries))
            }
            serde_yaml::Value::Tagged(tagged) => Err(ModelError::Parse(format!(
                "tagged value '{}' is not supported",
                tagged.tag
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Scalar(_) => "scalar",
            Node::List(_) => "list",
            Node::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Navigate to the node addressed by `path` (e.g. `list[1].subModel.description`)
    pub fn get(&self, path: &str) -> ModelResult<&Node> {
        let parsed = ModelPath::parse(path)?;
        let mut current = self;
        let mut walked = String::new();

        for segment in parsed.segments() {
            current = match segment {
                PathSegment::Key(key) => {
                    let map = current.as_map().ok_or_else(|| ModelError::TypeMismatch {
                        path: display_path(&walked),
                        expected: "map",
                        found: current.kind(),
                    })?;
                    push_key(&mut walked, key);
                    map.get(key.as_str())
                        .ok_or_else(|| ModelError::FieldNotFound(walked.clone()))?
                }
                PathSegment::Index(index) => {
                    let list = current.as_list().ok_or_else(|| ModelError::TypeMismatch {
                        path: display_path(&walked),
                        expected: "list",
                        found: current.kind(),
                    })?;
                    walked.push_str(&format!("[{}]", index));
                    list.get(*index)
                        .ok_or_else(|| ModelError::FieldNotFound(walked.clone()))?
                }
            };
        }

        Ok(current)
    }

    /// Render this node as text the way placeholders see it
    pub fn render(&self) -> String {
        match self {
            Node::Scalar(s) => s.clone(),
            Node::List(items) => {
                let parts: Vec<String> = items.iter().map(Node::render).collect();
                format!("[{}]", parts.join(", "))
            }
            Node::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v.render()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
        }
    }
}

fn push_key(walked: &mut String, key: &str) {
    if !walked.is_empty() {
        walked.push('.');
    }
    walked.push_str(key);
}

fn display_path(walked: &str) -> String {
    if walked.is_empty() {
        "<root>".to_string()
    } else {
        walked.to_string()
    }
}

/// The document's free-form data section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    data: Node,
}

impl Model {
    /// Build a model from a generic node tree; the root must be a map
    pub fn build(tree: &serde_yaml::Value) -> ModelResult<Self> {
        let data = Node::from_yaml(tree)?;
        if data.as_map().is_none() {
            return Err(ModelError::Parse(format!(
                "model root must be a map, found {}",
                data.kind()
            )));
        }
        Ok(Self { data })
    }

    pub fn data(&self) -> &Node {
        &self.data
    }

    pub fn get(&self, path: &str) -> ModelResult<&Node> {
        self.data.get(path)
    }

    pub fn get_string(&self, path: &str) -> ModelResult<&str> {
        let node = self.get(path)?;
        node.as_str().ok_or_else(|| ModelError::TypeMismatch {
            path: path.to_string(),
            expected: "scalar",
            found: node.kind(),
        })
    }

    pub fn get_list(&self, path: &str) -> ModelResult<&[Node]> {
        let node = self.get(path)?;
        node.as_list().ok_or_else(|| ModelError::TypeMismatch {
            path: path.to_string(),
            expected: "list",
            found: node.kind(),
        })
    }

    pub fn get_map(&self, path: &str) -> ModelResult<&IndexMap<String, Node>> {
        let node = self.get(path)?;
        node.as_map().ok_or_else(|| ModelError::TypeMismatch {
            path: path.to_string(),
            expected: "map",
            found: node.kind(),
        })
    }
}
