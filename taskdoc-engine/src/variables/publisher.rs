// Variable Publisher
// Synchronous pub/sub bus with per-run usage counting

use super::{EmptyVariableName, Variable};
use crate::execution::events::{SharedSink, SinkExt};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Receives every publication of a group, in delivery order
pub trait VariableSubscriber: Send + Sync {
    fn on_variable(&self, variable: &Variable);
}

impl VariableSubscriber for mpsc::UnboundedSender<Variable> {
    fn on_variable(&self, variable: &Variable) {
        let _ = self.send(variable.clone());
    }
}

/// Subscriber that stores every variable it receives
#[derive(Debug, Default)]
pub struct VariableCollector {
    variables: Mutex<Vec<Variable>>,
}

impl VariableCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn variables(&self) -> Vec<Variable> {
        self.lock().clone()
    }

    pub fn get(&self, index: usize) -> Option<Variable> {
        self.lock().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Variable>> {
        self.variables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl VariableSubscriber for VariableCollector {
    fn on_variable(&self, variable: &Variable) {
        self.lock().push(variable.clone());
    }
}

#[derive(Default)]
struct PublisherState {
    subscribers: Vec<Arc<dyn VariableSubscriber>>,
    // everything below is reset by `begin_run`
    usage: HashMap<String, usize>,
    values: BTreeMap<String, String>,
    warned: HashSet<String>,
    sink: Option<SharedSink>,
}

impl PublisherState {
    fn warn_usage(&self, name: &str, count: usize) {
        tracing::warn!(variable = %name, count, "variable used by several tasks");
        if let Some(sink) = &self.sink {
            sink.warning(format!("Variable with name '{}' is used {} times!", name, count));
        }
    }
}

/// Per-group variable bus.
///
/// Subscribers and run state live behind one mutex, so counter increments and
/// deliveries from sibling tasks are serialized. Which sibling publishes first
/// is decided by completion time. Subscribers must not publish from inside
/// `on_variable`.
#[derive(Default)]
pub struct VariablePublisher {
    state: Mutex<PublisherState>,
}

impl std::fmt::Debug for VariablePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("VariablePublisher")
            .field("subscribers", &state.subscribers.len())
            .field("values", &state.values)
            .finish()
    }
}

impl VariablePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for all future publications
    pub fn subscribe(&self, subscriber: Arc<dyn VariableSubscriber>) {
        self.lock().subscribers.push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Reset counters and values for a new run and attach its sink
    pub fn begin_run(&self, sink: SharedSink) {
        let mut state = self.lock();
        state.usage.clear();
        state.values.clear();
        state.warned.clear();
        state.sink = Some(sink);
    }

    /// Publish a value and deliver it to every subscriber in subscription order.
    ///
    /// The second publication of a name in one run logs the usage warning,
    /// unless `declare_usage` already did.
    pub fn publish(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Variable, EmptyVariableName> {
        let variable = Variable::new(name, value)?;
        let mut state = self.lock();

        let count = {
            let count = state.usage.entry(variable.name().to_string()).or_insert(0);
            *count += 1;
            *count
        };
        state
            .values
            .insert(variable.name().to_string(), variable.value().to_string());

        // names warned about by `declare_usage` are already in `warned`
        if count > 1 && state.warned.insert(variable.name().to_string()) {
            state.warn_usage(variable.name(), count);
        }
        if let Some(sink) = &state.sink {
            sink.info(format!("set variable {}", variable));
        }
        tracing::debug!(variable = %variable.name(), "variable published");

        for subscriber in &state.subscribers {
            subscriber.on_variable(&variable);
        }

        Ok(variable)
    }

    /// Declare the names a batch of tasks is going to publish.
    ///
    /// A name declared more than once logs a usage warning, once per name per run.
    pub fn declare_usage<'a, I>(&self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for name in names {
            match counts.iter_mut().find(|(n, _)| *n == name) {
                Some((_, count)) => *count += 1,
                None => counts.push((name, 1)),
            }
        }

        let mut state = self.lock();
        for (name, count) in counts {
            if count > 1 && state.warned.insert(name.to_string()) {
                state.warn_usage(name, count);
            }
        }
    }

    /// Number of publications of `name` in the current run
    pub fn usage_count(&self, name: &str) -> usize {
        self.lock().usage.get(name).copied().unwrap_or(0)
    }

    /// Latest value published under `name` in the current run
    pub fn value(&self, name: &str) -> Option<String> {
        self.lock().values.get(name).cloned()
    }

    /// Snapshot of the latest value of every name
    pub fn values(&self) -> BTreeMap<String, String> {
        self.lock().values.clone()
    }

    fn lock(&self) -> MutexGuard<'_, PublisherState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::MessageCollector;

    #[test]
    fn test_publish_delivers_every_value_in_order() {
        let publisher = VariablePublisher::new();
        let first = VariableCollector::new();
        let second = VariableCollector::new();
        publisher.subscribe(first.clone());
        publisher.subscribe(second.clone());

        publisher.publish("default", "one").unwrap();
        publisher.publish("default", "two").unwrap();

        let values: Vec<_> = first.variables().iter().map(|v| v.value().to_string()).collect();
        assert_eq!(values, vec!["one", "two"]);
        assert_eq!(second.len(), 2);
        assert_eq!(publisher.value("default"), Some("two".to_string()));
        assert_eq!(publisher.usage_count("default"), 2);
    }

    #[test]
    fn test_publish_logs_set_variable() {
        let publisher = VariablePublisher::new();
        let messages = MessageCollector::new();
        publisher.begin_run(messages.clone());

        publisher.publish("test2", "this is a demo").unwrap();

        assert_eq!(messages.lines(), vec!["set variable test2=this is a demo"]);
    }

    #[test]
    fn test_publish_rejects_empty_name() {
        let publisher = VariablePublisher::new();
        let collector = VariableCollector::new();
        publisher.subscribe(collector.clone());

        assert!(publisher.publish("", "value").is_err());
        assert!(collector.is_empty());
    }

    #[test]
    fn test_late_subscriber_misses_earlier_publications() {
        let publisher = VariablePublisher::new();
        publisher.publish("a", "1").unwrap();

        let collector = VariableCollector::new();
        publisher.subscribe(collector.clone());
        publisher.publish("b", "2").unwrap();

        assert_eq!(collector.len(), 1);
        assert_eq!(collector.get(0).unwrap().name(), "b");
    }

    #[test]
    fn test_repeated_publication_warns_once() {
        let publisher = VariablePublisher::new();
        let messages = MessageCollector::new();
        publisher.begin_run(messages.clone());

        publisher.publish("x", "1").unwrap();
        publisher.publish("x", "2").unwrap();
        publisher.publish("x", "3").unwrap();
        publisher.publish("y", "1").unwrap();

        assert_eq!(
            messages.lines(),
            vec![
                "set variable x=1",
                "Variable with name 'x' is used 2 times!",
                "set variable x=2",
                "set variable x=3",
                "set variable y=1",
            ]
        );
    }

    #[test]
    fn test_declared_name_is_not_warned_again() {
        let publisher = VariablePublisher::new();
        let messages = MessageCollector::new();
        publisher.begin_run(messages.clone());

        publisher.declare_usage(["x", "x"]);
        publisher.publish("x", "1").unwrap();
        publisher.publish("x", "2").unwrap();

        assert_eq!(
            messages.lines(),
            vec![
                "Variable with name 'x' is used 2 times!",
                "set variable x=1",
                "set variable x=2",
            ]
        );
    }

    #[test]
    fn test_declare_usage_warns_once_per_name() {
        let publisher = VariablePublisher::new();
        let messages = MessageCollector::new();
        publisher.begin_run(messages.clone());

        publisher.declare_usage(["default", "other", "default", "default"]);
        publisher.declare_usage(["default", "default"]);

        assert_eq!(
            messages.lines(),
            vec!["Variable with name 'default' is used 3 times!"]
        );
    }

    #[test]
    fn test_begin_run_resets_state() {
        let publisher = VariablePublisher::new();
        let messages = MessageCollector::new();
        publisher.begin_run(messages.clone());
        publisher.publish("x", "1").unwrap();
        publisher.declare_usage(["x", "x"]);

        publisher.begin_run(messages.clone());
        assert_eq!(publisher.usage_count("x"), 0);
        assert_eq!(publisher.value("x"), None);

        publisher.declare_usage(["x", "x"]);
        let warnings = messages
            .lines()
            .into_iter()
            .filter(|line| line.starts_with("Variable with name"))
            .count();
        assert_eq!(warnings, 2);
    }

    #[tokio::test]
    async fn test_channel_subscriber() {
        let publisher = VariablePublisher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        publisher.subscribe(Arc::new(tx));

        publisher.publish("name", "value").unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, Variable::new("name", "value").unwrap());
    }

    #[test]
    fn test_concurrent_publications_are_all_counted() {
        let publisher = Arc::new(VariablePublisher::new());
        let collector = VariableCollector::new();
        publisher.subscribe(collector.clone());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let publisher = publisher.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        publisher.publish("shared", format!("{}-{}", i, j)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(publisher.usage_count("shared"), 200);
        assert_eq!(collector.len(), 200);
    }
}
