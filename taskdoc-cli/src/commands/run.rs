use crate::output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use color_eyre::Result;
use tokio::sync::oneshot;

use taskdoc_engine::execution::progress_channel;
use taskdoc_engine::{
    DocumentExecutor, DocumentParameters, DocumentReader, DocumentResult, EngineError,
    EntryStatus, RunnerConfig, SharedSink, Shell, TaskStatus,
};

/// Run a task document locally
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the document YAML file
    pub document: PathBuf,

    /// Run only tasks carrying this tag (can be repeated)
    #[arg(long = "tag", short = 't', value_name = "TAG")]
    pub tags: Vec<String>,

    /// Budget in minutes for each matrix run of groups without their own timeout
    #[arg(long, value_name = "MIN")]
    pub timeout: Option<f64>,

    /// Run task groups concurrently instead of in document order
    #[arg(long)]
    pub parallel_groups: bool,

    /// Working directory for shell, native and container tasks
    #[arg(long, short = 'w', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Shell for `shell` tasks: sh, bash or pwsh
    #[arg(long, value_name = "SHELL")]
    pub shell: Option<Shell>,

    /// Print the run result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let document_path = &args.document;

    let mut parameters = DocumentParameters::default()
        .with_tags(args.tags.iter().cloned())
        .with_parallel_groups(args.parallel_groups);
    if let Some(minutes) = args.timeout {
        parameters = parameters.with_task_group_timeout(timeout_from_minutes(minutes)?);
    }

    let working_dir = match &args.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    // Messages print while the run is going. Timed-out scripts may still
    // hold a sender, so the printer stops on `done`.
    let (tx, mut rx) = progress_channel();
    let (done, mut done_rx) = oneshot::channel::<()>();
    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                Some(message) = rx.recv() => output::message(&message),
                _ = &mut done_rx => {
                    while let Ok(message) = rx.try_recv() {
                        output::message(&message);
                    }
                    break;
                }
            }
        }
    });

    output::status("Reading", &document_path.display().to_string());
    tracing::debug!(path = %document_path.display(), "reading document");
    let Some(document) = DocumentReader::read(document_path, &tx) else {
        tracing::debug!(path = %document_path.display(), "document rejected");
        let _ = done.send(());
        printer.await?;
        std::process::exit(1);
    };

    let tasks: usize = document.task_groups().iter().map(|g| g.tasks.len()).sum();
    output::header(&format!(
        "Document '{}' ({} taskgroups, {} tasks)",
        document_path.display(),
        document.task_groups().len(),
        tasks
    ));

    let mut config = RunnerConfig::default().with_working_dir(working_dir);
    if let Some(shell) = args.shell {
        config = config.with_shell(shell);
    }

    let sink: SharedSink = Arc::new(tx);
    let executor = DocumentExecutor::new(sink).with_config(config);
    tracing::debug!(
        groups = document.task_groups().len(),
        parallel_groups = parameters.parallel_groups,
        "starting run"
    );
    let result = executor.run(&document, &parameters).await;
    tracing::info!(
        success = result.success,
        duration_ms = result.duration.as_millis() as u64,
        "run finished"
    );

    let _ = done.send(());
    printer.await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    eprintln!();
    match EngineError::run_failed(&result) {
        None => {
            output::success(&format!(
                "Document completed successfully in {:.2}s",
                result.duration.as_secs_f64()
            ));
            Ok(())
        }
        Some(err) => {
            output::failure(&format!(
                "Document failed after {:.2}s: {}",
                result.duration.as_secs_f64(),
                err
            ));
            std::process::exit(1);
        }
    }
}

fn timeout_from_minutes(minutes: f64) -> Result<Duration> {
    if minutes.is_nan() || minutes <= 0.0 {
        color_eyre::eyre::bail!("Timeout must be a positive number of minutes, got {}", minutes);
    }
    Duration::try_from_secs_f64(minutes * 60.0)
        .map_err(|e| color_eyre::eyre::eyre!("Invalid timeout of {} minutes: {}", minutes, e))
}

fn print_summary(result: &DocumentResult) {
    for group in &result.groups {
        output::group_header(&group.name, group.entries.len());

        for entry in &group.entries {
            let symbol = match entry.status {
                EntryStatus::Completed => "OK",
                EntryStatus::Failed => "FAIL",
                EntryStatus::TimedOut => "TIMEOUT",
            };
            let line = format!(
                "    Run '{}' {} ({:.2}s)",
                entry.label,
                symbol,
                entry.duration.as_secs_f64()
            );
            if entry.status == EntryStatus::Completed {
                output::dim_success(&line);
            } else {
                output::dim_failure(&line);
            }

            for task in &entry.tasks {
                match task.status {
                    TaskStatus::Succeeded => {
                        output::dim(&format!("      [{}] OK", task.task_name));
                        for line in task.output.lines() {
                            output::task_output(line);
                        }
                    }
                    TaskStatus::Skipped => {
                        output::dim(&format!("      [{}] SKIP", task.task_name));
                    }
                    TaskStatus::Failed => {
                        let cause = task.error.as_deref().unwrap_or("unknown error");
                        output::dim_failure(&format!("      [{}] FAIL: {}", task.task_name, cause));
                    }
                }
            }
        }

        let line = format!(
            "  Taskgroup '{}' {:?} ({:.2}s)",
            group.name,
            group.state,
            group.duration.as_secs_f64()
        );
        if group.succeeded() {
            output::dim_success(&line);
        } else {
            output::dim_failure(&line);
        }
    }
}
