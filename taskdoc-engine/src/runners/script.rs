// Script Runner
// Evaluates `script` task bodies in an embedded JavaScript engine

use super::{apply_logging_commands, ExecutionError, ExecutionOutput, Executor};
use crate::document::TaskBody;
use crate::execution::context::Bindings;
use crate::variables::VariablePublisher;

use boa_engine::{Context, JsValue, Source};

/// Upper bound on loop iterations so a runaway body cannot pin a blocking worker
const DEFAULT_LOOP_ITERATION_LIMIT: u64 = 10_000_000;

/// Globals installed ahead of every body: captured console, `setVariable`
const PRELUDE: &str = r#"
var __logs = [];
var __render = function(value) {
    return (typeof value === 'object' && value !== null) ? JSON.stringify(value) : String(value);
};
var console = {
    log: function() {
        var parts = [];
        for (var i = 0; i < arguments.length; i++) {
            parts.push(__render(arguments[i]));
        }
        __logs.push(parts.join(' '));
    }
};
console.info = console.log;
console.warn = console.log;
console.error = console.log;
var println = console.log;
function setVariable(name, value) {
    __logs.push('##[set-variable name=' + name + ']' + __render(value));
}
"#;

pub struct ScriptRunner {
    loop_iteration_limit: u64,
}

impl ScriptRunner {
    pub fn new() -> Self {
        Self {
            loop_iteration_limit: DEFAULT_LOOP_ITERATION_LIMIT,
        }
    }

    pub fn with_loop_iteration_limit(mut self, limit: u64) -> Self {
        self.loop_iteration_limit = limit;
        self
    }
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Executor for ScriptRunner {
    async fn execute(
        &self,
        body: &TaskBody,
        bindings: &Bindings,
        publisher: &VariablePublisher,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let code = bindings.substitute(&body.code);
        let globals = globals_source(bindings)?;
        let limit = self.loop_iteration_limit;

        // boa is synchronous and its context is not Send
        let rendered = tokio::task::spawn_blocking(move || evaluate(&globals, &code, limit))
            .await
            .map_err(|e| ExecutionError::Script(format!("script worker failed: {}", e)))??;

        Ok(ExecutionOutput {
            output: apply_logging_commands(&rendered, publisher),
        })
    }
}

/// Declarations exposing the bindings as globals and the model as `model`
fn globals_source(bindings: &Bindings) -> Result<String, ExecutionError> {
    let vars = serde_json::to_string(bindings.values())
        .map_err(|e| ExecutionError::Script(format!("cannot expose bindings: {}", e)))?;
    let model = match bindings.model() {
        Some(model) => serde_json::to_string(model.data())
            .map_err(|e| ExecutionError::Script(format!("cannot expose model: {}", e)))?,
        None => "null".to_string(),
    };

    Ok(format!(
        "var vars = {vars};\nvar model = {model};\nObject.assign(globalThis, vars);\n"
    ))
}

/// Run one body; console lines come first, then the completion value
fn evaluate(globals: &str, code: &str, loop_iteration_limit: u64) -> Result<String, ExecutionError> {
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(loop_iteration_limit);

    eval(&mut context, PRELUDE)?;
    eval(&mut context, globals)?;
    let completion = eval(&mut context, code)?;
    let completion = render(&mut context, &completion)?;

    let logs = eval(&mut context, "__logs.join('\\n')")?;
    let mut rendered = render(&mut context, &logs)?;

    if !completion.is_empty() {
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        rendered.push_str(&completion);
    }
    Ok(rendered)
}

fn eval(context: &mut Context, code: &str) -> Result<JsValue, ExecutionError> {
    context
        .eval(Source::from_bytes(code))
        .map_err(|e| ExecutionError::Script(e.to_string()))
}

fn render(context: &mut Context, value: &JsValue) -> Result<String, ExecutionError> {
    if value.is_undefined() || value.is_null() {
        return Ok(String::new());
    }
    let text = value
        .to_string(context)
        .map_err(|e| ExecutionError::Script(e.to_string()))?;
    Ok(text.to_std_string_escaped())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use std::sync::Arc;

    async fn run(code: &str, bindings: &Bindings) -> Result<ExecutionOutput, ExecutionError> {
        let publisher = VariablePublisher::new();
        ScriptRunner::new()
            .execute(&TaskBody::new(code), bindings, &publisher)
            .await
    }

    #[tokio::test]
    async fn test_completion_value_is_output() {
        let output = run("'hello' + ' ' + 'world!'", &Bindings::new()).await.unwrap();
        assert_eq!(output.output, "hello world!");
    }

    #[tokio::test]
    async fn test_undefined_renders_empty() {
        let output = run("var x = 1;", &Bindings::new()).await.unwrap();
        assert_eq!(output.output, "");
    }

    #[tokio::test]
    async fn test_console_lines_precede_completion_value() {
        let output = run("console.log('first', 2); println({a: 1}); 'last'", &Bindings::new())
            .await
            .unwrap();
        assert_eq!(output.output, "first 2\n{\"a\":1}\nlast");
    }

    #[tokio::test]
    async fn test_bindings_and_model_are_globals() {
        let tree: serde_yaml::Value =
            serde_yaml::from_str("messages:\n  - one\n  - two\n").unwrap();
        let bindings = Bindings::new()
            .with_model(Some(Arc::new(Model::build(&tree).unwrap())))
            .with_values([("title", "the first run")]);

        let output = run(
            "println('Script:' + title); model.messages.forEach(function(m) { println(m + '!'); });",
            &bindings,
        )
        .await
        .unwrap();

        assert_eq!(output.output, "Script:the first run\none!\ntwo!");
    }

    #[tokio::test]
    async fn test_placeholders_are_substituted_before_evaluation() {
        let bindings = Bindings::new().with_values([("count", "3")]);
        let output = run("${count} * 2", &bindings).await.unwrap();
        assert_eq!(output.output, "6");
    }

    #[tokio::test]
    async fn test_set_variable_publishes() {
        let publisher = VariablePublisher::new();
        let output = ScriptRunner::new()
            .execute(
                &TaskBody::new("setVariable('answer', 42); 'done'"),
                &Bindings::new(),
                &publisher,
            )
            .await
            .unwrap();

        assert_eq!(output.output, "done");
        assert_eq!(publisher.value("answer"), Some("42".to_string()));
    }

    #[tokio::test]
    async fn test_script_errors() {
        let err = run("throw new Error('boom')", &Bindings::new()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Script(_)));

        let err = run("this is not javascript", &Bindings::new()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Script(_)));
    }

    #[tokio::test]
    async fn test_runaway_loop_is_stopped() {
        let publisher = VariablePublisher::new();
        let err = ScriptRunner::new()
            .with_loop_iteration_limit(1_000)
            .execute(&TaskBody::new("while (true) {}"), &Bindings::new(), &publisher)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Script(_)));
    }
}
