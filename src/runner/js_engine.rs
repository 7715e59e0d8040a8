//! Embedded JavaScript engine behind the [`ScriptEngine`] contract
//!
//! The orchestra feeds every command through script evaluation and consults
//! the engine for conditions, variable definitions and user scripts. The
//! default implementation wraps boa_engine; any implementation of the trait
//! suffices.

#[allow(unused_imports)]
use boa_engine::{
    native_function::NativeFunction, object::ObjectInitializer, property::Attribute, Context,
    JsResult, JsString, JsValue, Source,
};

use anyhow::Result;
use std::cell::RefCell;
use std::collections::HashMap;

/// Severity of a message emitted from inside a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLogLevel {
    Info,
    Warn,
    Error,
}

/// Callback invoked for every script log message.
pub type LogSink = Box<dyn Fn(ScriptLogLevel, &str)>;

/// Contract the orchestra consumes from the scripting runtime.
pub trait ScriptEngine {
    /// Reset all global state.
    fn init(&mut self);

    /// Evaluate a script and return its last expression as a string.
    fn evaluate(
        &mut self,
        script: &str,
        env: &HashMap<String, String>,
        source_name: &str,
        run_in_sub_scope: bool,
    ) -> Result<String>;

    /// Push a lexical scope for a sub-flow.
    fn enter_scope(&mut self);

    /// Pop the most recent lexical scope.
    fn leave_scope(&mut self);

    fn scope_depth(&self) -> usize;

    /// Register a log sink; invoked from within evaluations.
    fn on_log(&mut self, sink: LogSink);

    /// Escape a user string for embedding in a generated script literal.
    fn sanitize(&self, value: &str) -> String {
        value.replace('\\', "\\\\").replace('\'', "\\'")
    }
}

// Native functions are plain fn pointers, so console output goes through a
// buffer that the owning engine drains after each evaluation. The boa
// context is not Send, so a thread-local buffer is always the right one.
thread_local! {
    static CONSOLE_BUFFER: RefCell<Vec<(ScriptLogLevel, String)>> = RefCell::new(Vec::new());
}

/// JavaScript engine implementation backed by boa_engine.
pub struct BoaScriptEngine {
    context: Context,
    scopes: Vec<Vec<String>>,
    sinks: Vec<LogSink>,
}

impl BoaScriptEngine {
    pub fn new() -> Self {
        let mut context = Context::default();
        install_runtime(&mut context);
        Self {
            context,
            scopes: Vec::new(),
            sinks: Vec::new(),
        }
    }

    /// Declare env entries as global variables, numbers and booleans raw,
    /// everything else as a string literal.
    fn inject_env(&mut self, env: &HashMap<String, String>) {
        for (key, value) in env {
            let js_code = if value.parse::<f64>().is_ok() || value == "true" || value == "false" {
                format!("var {} = {};", key, value)
            } else {
                format!(
                    "var {} = \"{}\";",
                    key,
                    value.replace('\\', "\\\\").replace('"', "\\\"")
                )
            };
            let _ = self.context.eval(Source::from_bytes(&js_code));
        }
    }

    fn drain_console(&mut self) {
        let drained: Vec<(ScriptLogLevel, String)> =
            CONSOLE_BUFFER.with(|buffer| std::mem::take(&mut *buffer.borrow_mut()));
        for (level, message) in drained {
            for sink in &self.sinks {
                sink(level, &message);
            }
        }
    }

    fn global_names(&mut self) -> Vec<String> {
        let script = "JSON.stringify(Object.getOwnPropertyNames(globalThis))";
        match self.context.eval(Source::from_bytes(script)) {
            Ok(value) => value
                .as_string()
                .map(|s| s.to_std_string_escaped())
                .and_then(|json| serde_json::from_str(&json).ok())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for BoaScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine for BoaScriptEngine {
    fn init(&mut self) {
        self.context = Context::default();
        self.scopes.clear();
        install_runtime(&mut self.context);
    }

    fn evaluate(
        &mut self,
        script: &str,
        env: &HashMap<String, String>,
        source_name: &str,
        run_in_sub_scope: bool,
    ) -> Result<String> {
        self.inject_env(env);

        let wrapped;
        let source = if run_in_sub_scope {
            wrapped = format!("(function() {{ return ({}); }})()", script);
            wrapped.as_str()
        } else {
            script
        };

        let outcome = self.context.eval(Source::from_bytes(source));
        self.drain_console();

        match outcome {
            Ok(value) => Ok(js_value_to_string(&value)),
            Err(e) => Err(anyhow::anyhow!("{}: {}", source_name, e)),
        }
    }

    fn enter_scope(&mut self) {
        let names = self.global_names();
        self.scopes.push(names);
    }

    fn leave_scope(&mut self) {
        let Some(snapshot) = self.scopes.pop() else {
            return;
        };
        // Global `var` bindings are non-configurable, so names introduced in
        // the scope are reset to undefined rather than deleted.
        let current = self.global_names();
        for name in current {
            if snapshot.contains(&name) || !is_identifier(&name) {
                continue;
            }
            let reset = format!("{} = undefined;", name);
            let _ = self.context.eval(Source::from_bytes(&reset));
        }
    }

    fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    fn on_log(&mut self, sink: LogSink) {
        self.sinks.push(sink);
    }
}

fn install_runtime(context: &mut Context) {
    let console = ObjectInitializer::new(context)
        .function(
            NativeFunction::from_fn_ptr(console_log),
            JsString::from("log"),
            1,
        )
        .function(
            NativeFunction::from_fn_ptr(console_warn),
            JsString::from("warn"),
            1,
        )
        .function(
            NativeFunction::from_fn_ptr(console_error),
            JsString::from("error"),
            1,
        )
        .build();
    let _ = context.register_global_property(JsString::from("console"), console, Attribute::all());
    let _ = context.eval(Source::from_bytes("var maestro = { copiedText: null };"));
}

fn console_log(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    record_console(ScriptLogLevel::Info, args, context)
}

fn console_warn(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    record_console(ScriptLogLevel::Warn, args, context)
}

fn console_error(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    record_console(ScriptLogLevel::Error, args, context)
}

fn record_console(
    level: ScriptLogLevel,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let message = args
        .iter()
        .map(|arg| {
            arg.to_string(context)
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_else(|_| "<value>".to_string())
        })
        .collect::<Vec<_>>()
        .join(" ");
    CONSOLE_BUFFER.with(|buffer| buffer.borrow_mut().push((level, message)));
    Ok(JsValue::undefined())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Convert JsValue to String representation
fn js_value_to_string(value: &JsValue) -> String {
    if value.is_undefined() {
        "undefined".to_string()
    } else if value.is_null() {
        "null".to_string()
    } else if let Some(b) = value.as_boolean() {
        b.to_string()
    } else if let Some(n) = value.as_number() {
        if n.fract() == 0.0 {
            (n as i64).to_string()
        } else {
            n.to_string()
        }
    } else if let Some(s) = value.as_string() {
        s.to_std_string_escaped()
    } else {
        format!("{:?}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn evaluate(engine: &mut BoaScriptEngine, script: &str) -> String {
        engine
            .evaluate(script, &HashMap::new(), "test", false)
            .unwrap()
    }

    #[test]
    fn test_eval_arithmetic() {
        let mut engine = BoaScriptEngine::new();
        assert_eq!(evaluate(&mut engine, "1 + 2"), "3");
        assert_eq!(evaluate(&mut engine, "10 / 4"), "2.5");
        assert_eq!(evaluate(&mut engine, "5 > 3"), "true");
    }

    #[test]
    fn test_env_injection() {
        let mut engine = BoaScriptEngine::new();
        let env = HashMap::from([
            ("count".to_string(), "5".to_string()),
            ("name".to_string(), "alice".to_string()),
        ]);
        assert_eq!(
            engine.evaluate("count + 1", &env, "test", false).unwrap(),
            "6"
        );
        assert_eq!(engine.evaluate("name", &env, "test", false).unwrap(), "alice");
    }

    #[test]
    fn test_template_literal_expansion() {
        let mut engine = BoaScriptEngine::new();
        evaluate(&mut engine, "var user = 'bob';");
        assert_eq!(
            engine
                .evaluate("`Hello ${user}`", &HashMap::new(), "test", true)
                .unwrap(),
            "Hello bob"
        );
    }

    #[test]
    fn test_scope_depth_pairs() {
        let mut engine = BoaScriptEngine::new();
        assert_eq!(engine.scope_depth(), 0);
        engine.enter_scope();
        assert_eq!(engine.scope_depth(), 1);
        evaluate(&mut engine, "var scoped = 42;");
        engine.leave_scope();
        assert_eq!(engine.scope_depth(), 0);
        assert_eq!(evaluate(&mut engine, "typeof scoped"), "undefined");
    }

    #[test]
    fn test_outer_variables_survive_scope() {
        let mut engine = BoaScriptEngine::new();
        evaluate(&mut engine, "var kept = 'yes';");
        engine.enter_scope();
        evaluate(&mut engine, "kept = 'updated';");
        engine.leave_scope();
        assert_eq!(evaluate(&mut engine, "kept"), "updated");
    }

    #[test]
    fn test_console_sink() {
        let mut engine = BoaScriptEngine::new();
        let captured: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink_target = captured.clone();
        engine.on_log(Box::new(move |_level, message| {
            sink_target.borrow_mut().push(message.to_string());
        }));

        evaluate(&mut engine, "console.log('hello', 42)");
        assert!(captured.borrow().iter().any(|m| m == "hello 42"));
    }

    #[test]
    fn test_maestro_object_installed() {
        let mut engine = BoaScriptEngine::new();
        assert_eq!(evaluate(&mut engine, "maestro.copiedText === null"), "true");
        engine.init();
        assert_eq!(evaluate(&mut engine, "maestro.copiedText === null"), "true");
    }

    #[test]
    fn test_sanitize_escapes_quotes_and_backslashes() {
        let engine = BoaScriptEngine::new();
        assert_eq!(engine.sanitize(r"O'Brien\path"), r"O\'Brien\\path");
    }

    #[test]
    fn test_script_errors_are_reported() {
        let mut engine = BoaScriptEngine::new();
        let err = engine
            .evaluate("syntax error here", &HashMap::new(), "broken.js", false)
            .unwrap_err();
        assert!(err.to_string().contains("broken.js"));
    }
}
