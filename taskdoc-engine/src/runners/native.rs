// Native Runner
// Starts programs from PATH directly, one command per line, without a shell

use super::{
    apply_logging_commands, capture_stdout, env_bindings, ExecutionError, ExecutionOutput, Executor,
};
use crate::document::TaskBody;
use crate::execution::context::Bindings;
use crate::variables::VariablePublisher;

use std::path::PathBuf;
use tokio::process::Command;

pub struct NativeRunner {
    working_dir: Option<PathBuf>,
}

impl NativeRunner {
    pub fn new() -> Self {
        Self { working_dir: None }
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Raw stdout of one command line
    async fn run_line(&self, line: &str, bindings: &Bindings) -> Result<String, ExecutionError> {
        let words = split_command_line(line)?;
        let Some((program, args)) = words.split_first() else {
            return Ok(String::new());
        };

        let resolved = which::which(program).map_err(|e| {
            ExecutionError::EnvironmentUnavailable(format!("program '{}' not found: {}", program, e))
        })?;

        let mut cmd = Command::new(resolved);
        cmd.args(args);
        cmd.envs(env_bindings(bindings));
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        capture_stdout(cmd, program).await
    }
}

impl Default for NativeRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Executor for NativeRunner {
    async fn execute(
        &self,
        body: &TaskBody,
        bindings: &Bindings,
        publisher: &VariablePublisher,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let code = bindings.substitute(&body.code);
        let mut stdouts = Vec::new();

        for line in code.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
            stdouts.push(self.run_line(line, bindings).await?);
        }

        // set-variable lines are published only once every line succeeded
        let outputs: Vec<String> = stdouts
            .iter()
            .map(|stdout| apply_logging_commands(stdout, publisher))
            .filter(|output| !output.is_empty())
            .collect();

        Ok(ExecutionOutput {
            output: outputs.join("\n"),
        })
    }
}

/// Split a command line into words, honoring single and double quotes
/// and backslash escapes outside single quotes
pub fn split_command_line(line: &str) -> Result<Vec<String>, ExecutionError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') | (Some('"'), '"') => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                let escaped = chars.next().ok_or_else(|| {
                    ExecutionError::InvalidBody(format!("dangling escape in '{}'", line))
                })?;
                current.push(escaped);
                in_word = true;
            }
            (Some(_), c) => current.push(c),
            (None, '\'') | (None, '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(ExecutionError::InvalidBody(format!("unterminated quote in '{}'", line)));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command_line() {
        assert_eq!(
            split_command_line(r#"echo "hello world!" 'single quoted' plain"#).unwrap(),
            vec!["echo", "hello world!", "single quoted", "plain"]
        );
        assert_eq!(
            split_command_line(r#"printf a\ b "" x"#).unwrap(),
            vec!["printf", "a b", "", "x"]
        );
        assert!(split_command_line("echo 'open").is_err());
        assert!(split_command_line("trailing \\").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_native_runner_runs_lines_in_order() {
        let runner = NativeRunner::new();
        let publisher = VariablePublisher::new();
        let bindings = Bindings::new().with_values([("who", "world")]);
        let body = TaskBody::new("echo \"hello ${who}\"\n\n# comment\necho second");

        let output = runner.execute(&body, &bindings, &publisher).await.unwrap();

        assert_eq!(output.output, "hello world\nsecond");
    }

    #[tokio::test]
    async fn test_native_runner_missing_program() {
        let runner = NativeRunner::new();
        let publisher = VariablePublisher::new();
        let body = TaskBody::new("definitely-not-a-real-program-4711 --version");

        let err = runner
            .execute(&body, &Bindings::new(), &publisher)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::EnvironmentUnavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_native_runner_stops_at_first_failure() {
        let runner = NativeRunner::new();
        let publisher = VariablePublisher::new();
        let body = TaskBody::new("false\necho unreachable");

        let err = runner
            .execute(&body, &Bindings::new(), &publisher)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Failed { exit_code: Some(1), .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_native_runner_publishes_after_all_lines_succeed() {
        let runner = NativeRunner::new();
        let publisher = VariablePublisher::new();

        let failing = TaskBody::new("echo '##[set-variable name=a]1'\nfalse");
        assert!(runner.execute(&failing, &Bindings::new(), &publisher).await.is_err());
        assert!(publisher.values().is_empty());

        let passing = TaskBody::new("echo '##[set-variable name=a]1'\ntrue\necho done");
        let output = runner.execute(&passing, &Bindings::new(), &publisher).await.unwrap();
        assert_eq!(output.output, "done");
        assert_eq!(publisher.value("a"), Some("1".to_string()));
    }
}
