// Output formatting helpers for CLI commands
// Everything except task output goes to stderr so `--json` stays parseable

use taskdoc_engine::{LogLevel, Message};

/// Print a status message: "  Status message"
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

/// Print a success message with checkmark
pub fn success(message: &str) {
    eprintln!("\x1b[1;32m  \u{2713}\x1b[0m {}", message);
}

/// Print a failure message with X
pub fn failure(message: &str) {
    eprintln!("\x1b[1;31m  \u{2717}\x1b[0m {}", message);
}

/// Print a check/pass item
pub fn check(message: &str) {
    eprintln!("\x1b[32m  \u{2713}\x1b[0m {}", message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("\x1b[33m  !\x1b[0m {}", message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("\x1b[1;31merror:\x1b[0m {}", message);
}

/// Print an info message
pub fn info(message: &str) {
    eprintln!("\x1b[36m  i\x1b[0m {}", message);
}

/// Print a dim/muted message
pub fn dim(message: &str) {
    eprintln!("\x1b[2m{}\x1b[0m", message);
}

/// Print a dim success message
pub fn dim_success(message: &str) {
    eprintln!("\x1b[32m{}\x1b[0m", message);
}

/// Print a dim failure message
pub fn dim_failure(message: &str) {
    eprintln!("\x1b[31m{}\x1b[0m", message);
}

/// Print a task group header
pub fn group_header(name: &str, entries: usize) {
    let noun = if entries == 1 { "run" } else { "runs" };
    eprintln!("\x1b[1;34m  Taskgroup\x1b[0m '{}' ({} {})", name, entries, noun);
}

/// Print task output (indented)
pub fn task_output(line: &str) {
    println!("        | {}", line);
}

/// Print a header line
pub fn header(message: &str) {
    eprintln!("\x1b[1m==> {}\x1b[0m", message);
}

/// Print one engine message with the helper matching its level
pub fn message(message: &Message) {
    match message.level {
        LogLevel::Error => error(&message.text),
        LogLevel::Warning => warning(&message.text),
        LogLevel::Info => info(&message.text),
        LogLevel::Debug => dim(&message.text),
    }
}
