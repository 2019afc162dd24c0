// Container Runner
// Executes `docker` task bodies with `sh -c` inside a throwaway container

use super::{env_bindings, run_process, ExecutionError, ExecutionOutput, Executor};
use crate::document::TaskBody;
use crate::execution::context::Bindings;
use crate::variables::VariablePublisher;

use std::path::PathBuf;
use tokio::process::Command;
use tokio::sync::OnceCell;

/// Mount point of the working directory inside the container
const CONTAINER_WORKSPACE: &str = "/workspace";

/// Image pull policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePullPolicy {
    /// Always pull the image
    Always,
    /// Pull only if not present locally
    IfNotPresent,
    /// Never pull (must be present locally)
    Never,
}

impl ImagePullPolicy {
    fn as_flag(&self) -> &'static str {
        match self {
            ImagePullPolicy::Always => "always",
            ImagePullPolicy::IfNotPresent => "missing",
            ImagePullPolicy::Never => "never",
        }
    }
}

/// Configuration for container execution
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Docker client binary
    pub docker_binary: String,
    /// Whether to pull images before running
    pub pull_policy: ImagePullPolicy,
    /// Mount the working directory at /workspace
    pub mount_workspace: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            docker_binary: "docker".to_string(),
            pull_policy: ImagePullPolicy::IfNotPresent,
            mount_workspace: true,
        }
    }
}

/// Container runner for Docker-based execution
pub struct ContainerRunner {
    config: ContainerConfig,
    working_dir: Option<PathBuf>,
    // daemon reachability is probed once per runner
    available: OnceCell<bool>,
}

impl ContainerRunner {
    /// Create a new container runner with default configuration
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// Create a container runner with custom configuration
    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            config,
            working_dir: None,
            available: OnceCell::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Check if Docker is available
    pub async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                if which::which(&self.config.docker_binary).is_err() {
                    return false;
                }
                // Try to run `docker version`
                let output = Command::new(&self.config.docker_binary)
                    .arg("version")
                    .arg("--format")
                    .arg("{{.Server.Version}}")
                    .output()
                    .await;
                output.map(|o| o.status.success()).unwrap_or(false)
            })
            .await
    }

    /// Build the `docker run` argument list for a script
    fn run_args(&self, image: &str, script: &str, bindings: &Bindings) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--pull".to_string(),
            self.config.pull_policy.as_flag().to_string(),
        ];

        for (key, value) in env_bindings(bindings) {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        if self.config.mount_workspace {
            let host_dir = self
                .working_dir
                .clone()
                .or_else(|| std::env::current_dir().ok());
            if let Some(dir) = host_dir {
                args.push("-v".to_string());
                args.push(format!("{}:{}", dir.display(), CONTAINER_WORKSPACE));
                args.push("-w".to_string());
                args.push(CONTAINER_WORKSPACE.to_string());
            }
        }

        args.push(image.to_string());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(script.to_string());
        args
    }
}

impl Default for ContainerRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Executor for ContainerRunner {
    async fn execute(
        &self,
        body: &TaskBody,
        bindings: &Bindings,
        publisher: &VariablePublisher,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let image = body
            .image
            .as_deref()
            .map(|image| bindings.substitute(image))
            .ok_or_else(|| ExecutionError::InvalidBody("docker task requires an image".to_string()))?;

        if !self.is_available().await {
            return Err(ExecutionError::EnvironmentUnavailable(format!(
                "Docker is not available via '{}'",
                self.config.docker_binary
            )));
        }

        let script = bindings.substitute(&body.code);
        let mut cmd = Command::new(&self.config.docker_binary);
        cmd.args(self.run_args(&image, &script, bindings));

        run_process(cmd, &self.config.docker_binary, publisher).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let runner = ContainerRunner::new().with_working_dir(Some(PathBuf::from("/tmp/work")));
        let bindings = Bindings::new().with_values([("title", "first")]);

        let args = runner.run_args("alpine:3", "echo hi", &bindings);

        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "--pull",
                "missing",
                "-e",
                "title=first",
                "-v",
                "/tmp/work:/workspace",
                "-w",
                "/workspace",
                "alpine:3",
                "sh",
                "-c",
                "echo hi",
            ]
        );
    }

    #[test]
    fn test_run_args_without_workspace() {
        let config = ContainerConfig {
            pull_policy: ImagePullPolicy::Never,
            mount_workspace: false,
            ..Default::default()
        };
        let runner = ContainerRunner::with_config(config);

        let args = runner.run_args("busybox", "true", &Bindings::new());

        assert_eq!(args, vec!["run", "--rm", "--pull", "never", "busybox", "sh", "-c", "true"]);
    }

    #[tokio::test]
    async fn test_missing_docker_binary_is_environment_unavailable() {
        let config = ContainerConfig {
            docker_binary: "no-such-docker-binary-4711".to_string(),
            ..Default::default()
        };
        let runner = ContainerRunner::with_config(config);
        let publisher = VariablePublisher::new();
        let body = TaskBody::new("echo hi").with_image("alpine");

        let err = runner
            .execute(&body, &Bindings::new(), &publisher)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::EnvironmentUnavailable(_)));
    }

    #[tokio::test]
    async fn test_image_is_required() {
        let runner = ContainerRunner::new();
        let publisher = VariablePublisher::new();

        let err = runner
            .execute(&TaskBody::new("echo hi"), &Bindings::new(), &publisher)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::InvalidBody(_)));
    }
}
