// Runners Module
// Execution backends for task bodies, all behind the `Executor` capability

pub mod container;
pub mod native;
pub mod script;
pub mod shell;

pub use container::{ContainerConfig, ContainerRunner};
pub use native::NativeRunner;
pub use script::ScriptRunner;
pub use shell::{Shell, ShellRunner};

use crate::document::TaskBody;
use crate::execution::context::Bindings;
use crate::variables::VariablePublisher;

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use thiserror::Error;
use tokio::process::Command;

/// Stdout line prefix a backend uses to publish a variable itself
const SET_VARIABLE_COMMAND: &str = "##[set-variable";

/// Errors raised by an executor
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    #[error("exited with code {}: {stderr}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("script error: {0}")]
    Script(String),

    #[error("invalid task body: {0}")]
    InvalidBody(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Rendered result of one body execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub output: String,
}

/// Capability shared by every backend
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Run a task body with the given bindings substituted into it
    async fn execute(
        &self,
        body: &TaskBody,
        bindings: &Bindings,
        publisher: &VariablePublisher,
    ) -> Result<ExecutionOutput, ExecutionError>;
}

/// The closed set of backends a document can name in `type:`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Embedded script evaluated in-process
    Script,
    /// External shell
    Shell,
    /// Program started directly, no shell
    Native,
    /// Shell inside a container
    Docker,
}

impl ExecutorKind {
    pub const NAMES: &'static [&'static str] =
        &["script", "groovy", "javascript", "shell", "native", "docker"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorKind::Script => "script",
            ExecutorKind::Shell => "shell",
            ExecutorKind::Native => "native",
            ExecutorKind::Docker => "docker",
        }
    }
}

impl FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "script" | "groovy" | "javascript" => Ok(ExecutorKind::Script),
            "shell" => Ok(ExecutorKind::Shell),
            "native" => Ok(ExecutorKind::Native),
            "docker" => Ok(ExecutorKind::Docker),
            other => Err(format!(
                "unknown task type '{}' (expected one of: {})",
                other,
                Self::NAMES.join(", ")
            )),
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration shared by the runners
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Working directory for processes (None = current directory)
    pub working_dir: Option<PathBuf>,
    /// Shell used by `shell` tasks
    pub shell: Shell,
    /// Container runner settings
    pub container: ContainerConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            shell: Shell::Default,
            container: ContainerConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.shell = shell;
        self
    }
}

/// One configured runner per executor kind
pub struct RunnerRegistry {
    script: ScriptRunner,
    shell: ShellRunner,
    native: NativeRunner,
    container: ContainerRunner,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            script: ScriptRunner::new(),
            shell: ShellRunner::with_default_shell(config.shell)
                .with_working_dir(config.working_dir.clone()),
            native: NativeRunner::new().with_working_dir(config.working_dir.clone()),
            container: ContainerRunner::with_config(config.container)
                .with_working_dir(config.working_dir),
        }
    }

    /// The executor for a kind
    pub fn get(&self, kind: ExecutorKind) -> &dyn Executor {
        match kind {
            ExecutorKind::Script => &self.script,
            ExecutorKind::Shell => &self.shell,
            ExecutorKind::Native => &self.native,
            ExecutorKind::Docker => &self.container,
        }
    }

    pub fn container(&self) -> &ContainerRunner {
        &self.container
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a prepared command and render its result.
///
/// Output is stdout without trailing whitespace and without set-variable
/// lines, which are published instead.
pub(crate) async fn run_process(
    command: Command,
    program: &str,
    publisher: &VariablePublisher,
) -> Result<ExecutionOutput, ExecutionError> {
    let stdout = capture_stdout(command, program).await?;
    Ok(ExecutionOutput {
        output: apply_logging_commands(&stdout, publisher),
    })
}

/// Spawn a prepared command and return its raw stdout, failing on a non-zero exit
pub(crate) async fn capture_stdout(mut command: Command, program: &str) -> Result<String, ExecutionError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = command.output().await.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            ExecutionError::EnvironmentUnavailable(format!("failed to start '{}': {}", program, e))
        }
        _ => ExecutionError::Io(e),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExecutionError::Failed {
            exit_code: output.status.code(),
            stderr: stderr.trim_end().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Publish `##[set-variable name=<name>]<value>` lines and strip them from the output
pub(crate) fn apply_logging_commands(output: &str, publisher: &VariablePublisher) -> String {
    let mut kept = Vec::new();

    for line in output.lines() {
        let Some(rest) = line.trim_start().strip_prefix(SET_VARIABLE_COMMAND) else {
            kept.push(line);
            continue;
        };
        let Some((props, value)) = rest.split_once(']') else {
            kept.push(line);
            continue;
        };

        let name = props
            .split(';')
            .map(str::trim)
            .find_map(|prop| prop.strip_prefix("name="));

        match name {
            Some(name) => {
                if publisher.publish(name, value.trim_end()).is_err() {
                    tracing::warn!(line, "ignoring set-variable command with empty name");
                }
            }
            None => kept.push(line),
        }
    }

    kept.join("\n").trim_end().to_string()
}

/// Names usable as process environment variables
pub(crate) fn env_bindings(bindings: &Bindings) -> impl Iterator<Item = (&String, &String)> {
    bindings.values().iter().filter(|(name, _)| {
        let mut chars = name.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableCollector;

    #[test]
    fn test_executor_kind_mapping() {
        assert_eq!("shell".parse::<ExecutorKind>(), Ok(ExecutorKind::Shell));
        assert_eq!("Docker".parse::<ExecutorKind>(), Ok(ExecutorKind::Docker));
        assert_eq!("native".parse::<ExecutorKind>(), Ok(ExecutorKind::Native));
        assert_eq!("groovy".parse::<ExecutorKind>(), Ok(ExecutorKind::Script));
        assert_eq!("javascript".parse::<ExecutorKind>(), Ok(ExecutorKind::Script));

        let err = "cobol".parse::<ExecutorKind>().unwrap_err();
        assert!(err.contains("unknown task type 'cobol'"));
    }

    #[test]
    fn test_logging_commands_publish_and_strip() {
        let publisher = VariablePublisher::new();
        let collector = VariableCollector::new();
        publisher.subscribe(collector.clone());

        let output = "Starting\n##[set-variable name=version]1.0.0\nDone\n\n";
        let rendered = apply_logging_commands(output, &publisher);

        assert_eq!(rendered, "Starting\nDone");
        assert_eq!(collector.len(), 1);
        assert_eq!(publisher.value("version"), Some("1.0.0".to_string()));
    }

    #[test]
    fn test_malformed_logging_commands_are_kept() {
        let publisher = VariablePublisher::new();
        let output = "##[set-variable novalue\n##[set-variable other=1]x";
        let rendered = apply_logging_commands(output, &publisher);

        assert_eq!(rendered, output);
        assert!(publisher.values().is_empty());
    }

    #[test]
    fn test_env_bindings_skip_invalid_names() {
        let bindings = Bindings::new().with_values([
            ("title", "run"),
            ("model.x", "no"),
            ("_ok1", "yes"),
            ("1bad", "no"),
        ]);
        let names: Vec<_> = env_bindings(&bindings).map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["_ok1", "title"]);
    }

    #[test]
    fn test_execution_error_display() {
        let err = ExecutionError::Failed {
            exit_code: Some(3),
            stderr: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "exited with code 3: boom");
    }
}
