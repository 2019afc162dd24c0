// Document Reader
// Builds a Document from YAML, validating every level it knows about

use crate::document::{
    ConcurrencyMode, Document, Task, TaskBody, TaskGroup, VariableCapture, DEFAULT_VARIABLE_NAME,
};
use crate::execution::events::{MessageSink, SinkExt};
use crate::execution::matrix::MatrixEntry;
use crate::model::Model;
use crate::parser::error::{ReadError, ReadResult};
use crate::runners::ExecutorKind;

use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;

const DOCUMENT_FIELDS: &[&str] = &["model", "taskgroups"];
const GROUP_FIELDS: &[&str] = &["name", "parallel", "timeout", "matrix", "tasks"];
const TASK_FIELDS: &[&str] = &[
    "name",
    "type",
    "tags",
    "code",
    "image",
    "variable",
    "disabled",
    "continueOnError",
    "optional",
];
const VARIABLE_FIELDS: &[&str] = &["name", "regex", "group"];

/// Loads documents; failures are reported to a sink instead of raised
pub struct DocumentReader;

impl DocumentReader {
    /// Read a document file; None (with one logged line) when it cannot be used
    pub fn read(path: impl AsRef<Path>, sink: &dyn MessageSink) -> Option<Document> {
        Self::report(Self::parse_file(path), sink)
    }

    /// Read a document from text; None (with one logged line) when it cannot be used
    pub fn read_str(content: &str, sink: &dyn MessageSink) -> Option<Document> {
        Self::report(Self::parse(content), sink)
    }

    pub fn parse_file(path: impl AsRef<Path>) -> ReadResult<Document> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ReadResult<Document> {
        let root: Value =
            serde_yaml::from_str(content).map_err(|e| ReadError::from_yaml_error(&e))?;
        let root = match &root {
            Value::Mapping(map) => map,
            _ => return Err(ReadError::wrong_type("document", "the file", "a mapping")),
        };
        // unknown fields win over every other error, wherever they are
        check_unknown_fields(root)?;

        let model = match root.get("model") {
            None | Some(Value::Null) => None,
            Some(tree) => Some(Model::build(tree)?),
        };
        let mut document = Document::new(model);

        match root.get("taskgroups") {
            None | Some(Value::Null) => {}
            Some(Value::Sequence(groups)) => {
                for (index, group) in groups.iter().enumerate() {
                    document.add_task_group(read_group(index, group)?);
                }
            }
            Some(_) => return Err(ReadError::wrong_type("taskgroups", "the document", "a list")),
        }

        Ok(document)
    }

    fn report(result: ReadResult<Document>, sink: &dyn MessageSink) -> Option<Document> {
        match result {
            Ok(document) => {
                tracing::debug!(groups = document.task_groups().len(), "document read");
                Some(document)
            }
            Err(e) => {
                tracing::debug!(error = ?e, "document rejected");
                sink.error(e.to_string());
                None
            }
        }
    }
}

fn read_group(index: usize, node: &Value) -> ReadResult<TaskGroup> {
    let fallback = format!("taskgroup {}", index + 1);
    let map = as_mapping(node, "taskgroup", &fallback)?;

    let name = text(map, "name", &fallback)?.unwrap_or_else(|| fallback.clone());
    let location = format!("taskgroup '{}'", name);
    let mut group = TaskGroup::new(name);

    if flag(map, "parallel", &location)?.unwrap_or(false) {
        group = group.with_mode(ConcurrencyMode::Parallel);
    }
    if let Some(timeout) = minutes(map, "timeout", &location)? {
        group = group.with_timeout(timeout);
    }

    let mut matrix = Vec::new();
    for (entry_index, entry) in sequence(map, "matrix", &location)?.iter().enumerate() {
        let entry_map = as_mapping(entry, "matrix", &location)?;
        let entry = MatrixEntry::from_yaml(entry_index, entry_map)
            .map_err(|reason| ReadError::invalid("matrix", &location, reason))?;
        matrix.push(entry);
    }
    group = group.with_matrix(matrix);

    for (task_index, task) in sequence(map, "tasks", &location)?.iter().enumerate() {
        group = group.with_task(read_task(task_index, task, &location)?);
    }

    Ok(group)
}

fn read_task(index: usize, node: &Value, group: &str) -> ReadResult<Task> {
    let location = format!("task {} of {}", index + 1, group);
    let map = as_mapping(node, "tasks", &location)?;

    let name = text(map, "name", &location)?.unwrap_or_else(|| format!("task {}", index + 1));
    let kind: ExecutorKind = text(map, "type", &location)?
        .ok_or_else(|| ReadError::missing("type", &location))?
        .parse()
        .map_err(|reason: String| ReadError::invalid("type", &location, reason))?;
    let code = text(map, "code", &location)?.ok_or_else(|| ReadError::missing("code", &location))?;

    let mut body = TaskBody::new(code);
    match text(map, "image", &location)? {
        Some(image) => body = body.with_image(image),
        None if kind == ExecutorKind::Docker => {
            return Err(ReadError::missing("image", &location));
        }
        None => {}
    }
    if let Some(variable) = map.get("variable") {
        body = body.with_variable(read_variable(variable, &location)?);
    }

    let tags = sequence(map, "tags", &location)?
        .iter()
        .map(|tag| scalar(tag).ok_or_else(|| ReadError::wrong_type("tags", &location, "a list of strings")))
        .collect::<ReadResult<Vec<_>>>()?;

    Ok(Task::new(name, kind, body)
        .with_tags(tags)
        .with_disabled(flag(map, "disabled", &location)?.unwrap_or(false))
        .with_continue_on_error(flag(map, "continueOnError", &location)?.unwrap_or(false))
        .with_optional(flag(map, "optional", &location)?.unwrap_or(false)))
}

fn read_variable(node: &Value, task: &str) -> ReadResult<VariableCapture> {
    let map = as_mapping(node, "variable", task)?;

    let name = text(map, "name", task)?.unwrap_or_else(|| DEFAULT_VARIABLE_NAME.to_string());
    if name.trim().is_empty() {
        return Err(ReadError::invalid("name", task, "variable name must not be empty"));
    }
    let mut capture = VariableCapture::new(name);

    if let Some(pattern) = text(map, "regex", task)? {
        let regex =
            Regex::new(&pattern).map_err(|e| ReadError::invalid("regex", task, e.to_string()))?;
        let group = match map.get("group") {
            None | Some(Value::Null) => usize::from(regex.captures_len() > 1),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|g| usize::try_from(g).ok())
                .ok_or_else(|| ReadError::wrong_type("group", task, "a non-negative integer"))?,
            Some(_) => return Err(ReadError::wrong_type("group", task, "a non-negative integer")),
        };
        if group >= regex.captures_len() {
            return Err(ReadError::invalid(
                "group",
                task,
                format!("regex has no capture group {}", group),
            ));
        }
        capture = capture.with_regex(regex, group);
    }

    Ok(capture)
}

/// Walk every validated level before any value is read.
///
/// Nodes of the wrong shape are skipped here; the value pass reports them.
fn check_unknown_fields(root: &Mapping) -> ReadResult<()> {
    check_fields(root, DOCUMENT_FIELDS)?;

    for group in items(root, "taskgroups").filter_map(Value::as_mapping) {
        check_fields(group, GROUP_FIELDS)?;

        for task in items(group, "tasks").filter_map(Value::as_mapping) {
            check_fields(task, TASK_FIELDS)?;

            if let Some(variable) = task.get("variable").and_then(Value::as_mapping) {
                check_fields(variable, VARIABLE_FIELDS)?;
            }
        }
    }
    Ok(())
}

/// Items of a list field, nothing when the field is absent or not a list
fn items<'a>(map: &'a Mapping, field: &str) -> impl Iterator<Item = &'a Value> {
    map.get(field)
        .and_then(Value::as_sequence)
        .into_iter()
        .flatten()
}

/// The first key outside `allowed` is an error
fn check_fields(map: &Mapping, allowed: &[&str]) -> ReadResult<()> {
    for key in map.keys() {
        let key = scalar(key).unwrap_or_default();
        if !allowed.contains(&key.as_str()) {
            return Err(ReadError::UnknownField(key));
        }
    }
    Ok(())
}

fn as_mapping<'a>(node: &'a Value, field: &str, location: &str) -> ReadResult<&'a Mapping> {
    node.as_mapping()
        .ok_or_else(|| ReadError::wrong_type(field, location, "a mapping"))
}

fn sequence<'a>(map: &'a Mapping, field: &str, location: &str) -> ReadResult<&'a [Value]> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Sequence(items)) => Ok(items.as_slice()),
        Some(_) => Err(ReadError::wrong_type(field, location, "a list")),
    }
}

fn text(map: &Mapping, field: &str, location: &str) -> ReadResult<Option<String>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar(value)
            .map(Some)
            .ok_or_else(|| ReadError::wrong_type(field, location, "a string")),
    }
}

fn flag(map: &Mapping, field: &str, location: &str) -> ReadResult<Option<bool>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ReadError::wrong_type(field, location, "a boolean")),
    }
}

/// A positive number of minutes, fractions allowed
fn minutes(map: &Mapping, field: &str, location: &str) -> ReadResult<Option<Duration>> {
    let minutes = match map.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ReadError::wrong_type(field, location, "a number of minutes"))?,
        Some(_) => return Err(ReadError::wrong_type(field, location, "a number of minutes")),
    };
    if minutes.is_nan() || minutes <= 0.0 {
        return Err(ReadError::invalid(field, location, "timeout must be positive"));
    }
    Duration::try_from_secs_f64(minutes * 60.0)
        .map(Some)
        .map_err(|e| ReadError::invalid(field, location, e.to_string()))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
