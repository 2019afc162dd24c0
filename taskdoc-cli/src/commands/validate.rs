use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use taskdoc_engine::execution::MatrixExpander;
use taskdoc_engine::DocumentReader;

/// Validate a task document without running it
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the document YAML file
    pub document: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let document_path = &args.document;

    output::status("Validating", &document_path.display().to_string());

    let document = match DocumentReader::parse_file(document_path) {
        Ok(document) => document,
        Err(e) => {
            tracing::debug!(path = %document_path.display(), error = ?e, "document rejected");
            output::error(&e.to_string());
            std::process::exit(1);
        }
    };

    output::check("Document read");

    match document.model() {
        Some(model) => output::check(&format!("Model ({})", model.data().kind())),
        None => output::info("No model"),
    }

    let groups = document.task_groups();
    let tasks: usize = groups.iter().map(|g| g.tasks.len()).sum();
    let runs: usize = groups
        .iter()
        .map(|g| MatrixExpander::expand(&g.matrix).len())
        .sum();
    output::check(&format!(
        "Structure: {} taskgroups, {} tasks, {} matrix runs",
        groups.len(),
        tasks,
        runs
    ));

    for group in groups {
        let mode = if group.is_parallel() { "parallel" } else { "sequential" };
        output::dim(&format!(
            "    Taskgroup '{}' ({}, {} tasks)",
            group.name,
            mode,
            group.tasks.len()
        ));
    }

    eprintln!();
    output::success("Document is valid");

    Ok(())
}
