// Shell Runner
// Executes `shell` task bodies through an external shell

use super::{env_bindings, run_process, ExecutionError, ExecutionOutput, Executor};
use crate::document::TaskBody;
use crate::execution::context::Bindings;
use crate::variables::VariablePublisher;

use std::path::PathBuf;
use std::str::FromStr;
use tokio::process::Command;

/// Shell types supported by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// Default shell (sh on Unix, cmd on Windows)
    Default,
    /// Bash shell
    Bash,
    /// PowerShell Core (cross-platform)
    Pwsh,
}

impl Shell {
    /// Get the shell executable and arguments
    fn get_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Shell::Default => {
                if cfg!(target_os = "windows") {
                    ("cmd", &["/C"])
                } else {
                    ("sh", &["-c"])
                }
            }
            Shell::Bash => ("bash", &["-c"]),
            Shell::Pwsh => ("pwsh", &["-NoLogo", "-NoProfile", "-Command"]),
        }
    }
}

impl FromStr for Shell {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sh" | "default" => Ok(Shell::Default),
            "bash" => Ok(Shell::Bash),
            "pwsh" => Ok(Shell::Pwsh),
            other => Err(format!("unsupported shell '{}'", other)),
        }
    }
}

/// Shell runner for executing scripts
pub struct ShellRunner {
    default_shell: Shell,
    working_dir: Option<PathBuf>,
}

impl ShellRunner {
    /// Create a new shell runner with the default shell
    pub fn new() -> Self {
        Self::with_default_shell(Shell::Default)
    }

    /// Create a shell runner with a specific default shell
    pub fn with_default_shell(shell: Shell) -> Self {
        Self {
            default_shell: shell,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Execute a script with the runner's shell
    pub async fn run_script(
        &self,
        script: &str,
        bindings: &Bindings,
        publisher: &VariablePublisher,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let (shell_cmd, shell_args) = self.default_shell.get_command();
        let program = which::which(shell_cmd).map_err(|e| {
            ExecutionError::EnvironmentUnavailable(format!("shell '{}' not found: {}", shell_cmd, e))
        })?;

        let mut cmd = Command::new(program);
        cmd.args(shell_args);
        cmd.arg(script);
        cmd.envs(env_bindings(bindings));
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        run_process(cmd, shell_cmd, publisher).await
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Executor for ShellRunner {
    async fn execute(
        &self,
        body: &TaskBody,
        bindings: &Bindings,
        publisher: &VariablePublisher,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let script = bindings.substitute(&body.code);
        self.run_script(&script, bindings, publisher).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::variables::VariableCollector;

    #[tokio::test]
    async fn test_shell_runner_echo() {
        let runner = ShellRunner::new();
        let publisher = VariablePublisher::new();

        let output = runner
            .run_script("echo hello", &Bindings::new(), &publisher)
            .await
            .unwrap();

        assert_eq!(output.output, "hello");
    }

    #[tokio::test]
    async fn test_shell_runner_substitutes_and_exports_bindings() {
        let runner = ShellRunner::new();
        let publisher = VariablePublisher::new();
        let bindings = Bindings::new().with_values([("MY_VAR", "test_value")]);
        let body = TaskBody::new("echo ${MY_VAR} $MY_VAR ${missing}");

        let output = runner.execute(&body, &bindings, &publisher).await.unwrap();

        // ${missing} stays verbatim and the shell expands it to nothing
        assert_eq!(output.output, "test_value test_value");
    }

    #[tokio::test]
    async fn test_shell_runner_exit_code() {
        let runner = ShellRunner::new();
        let publisher = VariablePublisher::new();

        let err = runner
            .run_script("echo oops >&2; exit 42", &Bindings::new(), &publisher)
            .await
            .unwrap_err();

        match err {
            ExecutionError::Failed { exit_code, stderr } => {
                assert_eq!(exit_code, Some(42));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_shell_runner_set_variable_command() {
        let runner = ShellRunner::new();
        let publisher = VariablePublisher::new();
        let collector = VariableCollector::new();
        publisher.subscribe(collector.clone());

        let output = runner
            .run_script(
                "echo before; echo '##[set-variable name=answer]42'; echo after",
                &Bindings::new(),
                &publisher,
            )
            .await
            .unwrap();

        assert_eq!(output.output, "before\nafter");
        assert_eq!(collector.get(0).unwrap().value(), "42");
    }

    #[tokio::test]
    async fn test_shell_runner_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "found").unwrap();
        let runner = ShellRunner::new().with_working_dir(Some(dir.path().to_path_buf()));
        let publisher = VariablePublisher::new();

        let output = runner
            .run_script("cat marker.txt", &Bindings::new(), &publisher)
            .await
            .unwrap();

        assert_eq!(output.output, "found");
    }
}
