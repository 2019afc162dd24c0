// Run Messages
// The message sink that reading and execution report into

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Log level for run messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// One line reported to a sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub level: LogLevel,
    pub text: String,
}

impl Message {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Error,
            text: text.into(),
        }
    }
}

/// Destination for user-facing run messages
pub trait MessageSink: Send + Sync {
    fn record(&self, message: Message);
}

/// Shared handle to a sink, threaded through `read` and `run`
pub type SharedSink = Arc<dyn MessageSink>;

/// Sender for streaming messages to another task (e.g. the CLI printer)
pub type ProgressSender = mpsc::UnboundedSender<Message>;

/// Receiver side of [`ProgressSender`]
pub type ProgressReceiver = mpsc::UnboundedReceiver<Message>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

// Fire-and-forget: a dropped receiver must not fail the run
impl MessageSink for ProgressSender {
    fn record(&self, message: Message) {
        let _ = self.send(message);
    }
}

/// In-memory sink; keeps every line in arrival order
#[derive(Debug, Default)]
pub struct MessageCollector {
    messages: Mutex<Vec<Message>>,
}

impl MessageCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Text of every recorded line, in order
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().map(|m| m.text.clone()).collect()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().clone()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.lock().iter().any(|m| m.text == text)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        // a poisoned collector still holds valid lines
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MessageSink for MessageCollector {
    fn record(&self, message: Message) {
        self.lock().push(message);
    }
}

/// Sink that forwards every line to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn record(&self, message: Message) {
        match message.level {
            LogLevel::Debug => tracing::debug!("{}", message.text),
            LogLevel::Info => tracing::info!("{}", message.text),
            LogLevel::Warning => tracing::warn!("{}", message.text),
            LogLevel::Error => tracing::error!("{}", message.text),
        }
    }
}

/// Helpers for reporting through any sink
pub trait SinkExt {
    fn info(&self, text: impl Into<String>);
    fn warning(&self, text: impl Into<String>);
    fn error(&self, text: impl Into<String>);
}

impl<S: MessageSink + ?Sized> SinkExt for S {
    fn info(&self, text: impl Into<String>) {
        self.record(Message::info(text));
    }

    fn warning(&self, text: impl Into<String>) {
        self.record(Message::warning(text));
    }

    fn error(&self, text: impl Into<String>) {
        self.record(Message::error(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.info("set variable a=1");
        tx.warning("careful");

        let first = rx.recv().await.unwrap();
        assert_eq!(first, Message::info("set variable a=1"));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.level, LogLevel::Warning);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = progress_channel();
        drop(rx);
        // Should not panic
        tx.error("nobody listens");
    }

    #[test]
    fn test_collector_keeps_order() {
        let collector = MessageCollector::new();
        collector.info("one");
        collector.error("two");
        assert_eq!(collector.lines(), vec!["one", "two"]);
        assert!(collector.contains("two"));

        collector.clear();
        assert!(collector.lines().is_empty());
    }

    #[test]
    fn test_shared_sink_dispatch() {
        let collector = MessageCollector::new();
        let sink: SharedSink = collector.clone();
        sink.warning("through the trait object");
        assert_eq!(
            collector.messages(),
            vec![Message::warning("through the trait object")]
        );
    }
}
