//! Produces the *evaluated command*: user-visible string fields with
//! `${…}` placeholders expanded through the script engine. The evaluated
//! command is what executes and what the UI reports.

use std::collections::HashMap;

use super::js_engine::ScriptEngine;
use crate::commands::{Command, Condition, ElementSelector};
use crate::errors::{OrchestraError, OrchestraResult};

pub(crate) fn evaluate_command(
    js: &mut dyn ScriptEngine,
    command: &Command,
) -> OrchestraResult<Command> {
    let evaluated = match command {
        Command::TapOnElement {
            selector,
            retry_if_no_change,
            wait_until_visible,
            long_press,
        } => Command::TapOnElement {
            selector: evaluate_selector(js, selector)?,
            retry_if_no_change: *retry_if_no_change,
            wait_until_visible: *wait_until_visible,
            long_press: *long_press,
        },

        Command::TapOnPointV2 {
            point,
            retry_if_no_change,
            long_press,
        } => Command::TapOnPointV2 {
            point: eval_text(js, point)?,
            retry_if_no_change: *retry_if_no_change,
            long_press: *long_press,
        },

        Command::Swipe {
            selector,
            direction,
            start_relative,
            end_relative,
            start_point,
            end_point,
            duration_ms,
        } => Command::Swipe {
            selector: eval_opt_selector(js, selector)?,
            direction: *direction,
            start_relative: eval_opt_text(js, start_relative)?,
            end_relative: eval_opt_text(js, end_relative)?,
            start_point: *start_point,
            end_point: *end_point,
            duration_ms: *duration_ms,
        },

        Command::ScrollUntilVisible {
            selector,
            direction,
            timeout_ms,
            scroll_duration_ms,
            visibility_percentage_normalized,
        } => Command::ScrollUntilVisible {
            selector: evaluate_selector(js, selector)?,
            direction: *direction,
            timeout_ms: *timeout_ms,
            scroll_duration_ms: *scroll_duration_ms,
            visibility_percentage_normalized: *visibility_percentage_normalized,
        },

        Command::CopyTextFrom { selector } => Command::CopyTextFrom {
            selector: evaluate_selector(js, selector)?,
        },

        Command::AssertCondition {
            condition,
            timeout_ms,
        } => Command::AssertCondition {
            condition: evaluate_condition_scripts(js, condition)?,
            timeout_ms: *timeout_ms,
        },

        Command::Assert {
            condition,
            timeout_ms,
        } => Command::Assert {
            condition: evaluate_condition_scripts(js, condition)?,
            timeout_ms: *timeout_ms,
        },

        Command::InputText { text } => Command::InputText {
            text: eval_text(js, text)?,
        },

        Command::LaunchApp {
            app_id,
            clear_state,
            clear_keychain,
            permissions,
            launch_arguments,
            stop_app,
        } => Command::LaunchApp {
            app_id: eval_text(js, app_id)?,
            clear_state: *clear_state,
            clear_keychain: *clear_keychain,
            permissions: permissions.clone(),
            launch_arguments: launch_arguments
                .as_ref()
                .map(|args| eval_map_values(js, args))
                .transpose()?,
            stop_app: *stop_app,
        },

        Command::OpenLink {
            link,
            auto_verify,
            browser,
        } => Command::OpenLink {
            link: eval_text(js, link)?,
            auto_verify: *auto_verify,
            browser: *browser,
        },

        Command::TakeScreenshot { path } => Command::TakeScreenshot {
            path: eval_text(js, path)?,
        },

        Command::StopApp { app_id } => Command::StopApp {
            app_id: eval_opt_text(js, app_id)?,
        },

        Command::ClearState { app_id } => Command::ClearState {
            app_id: eval_opt_text(js, app_id)?,
        },

        Command::RunFlow {
            commands,
            condition,
        } => Command::RunFlow {
            commands: commands.clone(),
            condition: condition
                .as_ref()
                .map(|c| evaluate_condition_scripts(js, c))
                .transpose()?,
        },

        // The repeat condition is re-evaluated on every iteration, so it is
        // carried raw; only the iteration count is expanded here.
        Command::Repeat {
            commands,
            times,
            condition,
        } => Command::Repeat {
            commands: commands.clone(),
            times: eval_opt_text(js, times)?,
            condition: condition.clone(),
        },

        Command::DefineVariables { env } => Command::DefineVariables {
            env: eval_map_values(js, env)?,
        },

        Command::RunScript {
            script,
            env,
            source_description,
        } => Command::RunScript {
            script: script.clone(),
            env: eval_map_values(js, env)?,
            source_description: source_description.clone(),
        },

        Command::MockNetwork { rules_path } => Command::MockNetwork {
            rules_path: eval_text(js, rules_path)?,
        },

        Command::AssertOutgoingRequests {
            path,
            headers_present,
            http_method_is,
            request_body_contains,
            headers_and_values,
        } => Command::AssertOutgoingRequests {
            path: eval_text(js, path)?,
            headers_present: headers_present.clone(),
            http_method_is: http_method_is.clone(),
            request_body_contains: eval_opt_text(js, request_body_contains)?,
            headers_and_values: headers_and_values.clone(),
        },

        other => other.clone(),
    };
    Ok(evaluated)
}

pub(crate) fn evaluate_selector(
    js: &mut dyn ScriptEngine,
    selector: &ElementSelector,
) -> OrchestraResult<ElementSelector> {
    let mut evaluated = selector.clone();
    evaluated.text_regex = eval_opt_text(js, &selector.text_regex)?;
    evaluated.id_regex = eval_opt_text(js, &selector.id_regex)?;
    evaluated.below = eval_boxed_selector(js, &selector.below)?;
    evaluated.above = eval_boxed_selector(js, &selector.above)?;
    evaluated.left_of = eval_boxed_selector(js, &selector.left_of)?;
    evaluated.right_of = eval_boxed_selector(js, &selector.right_of)?;
    evaluated.contains_child = eval_boxed_selector(js, &selector.contains_child)?;
    evaluated.contains_descendants = selector
        .contains_descendants
        .as_ref()
        .map(|subs| {
            subs.iter()
                .map(|s| evaluate_selector(js, s))
                .collect::<OrchestraResult<Vec<_>>>()
        })
        .transpose()?;
    Ok(evaluated)
}

/// Expand selector regexes and evaluate the script condition to its result
/// string; the condition evaluator treats that string as already evaluated.
pub(crate) fn evaluate_condition_scripts(
    js: &mut dyn ScriptEngine,
    condition: &Condition,
) -> OrchestraResult<Condition> {
    Ok(Condition {
        platform: condition.platform,
        visible: condition
            .visible
            .as_ref()
            .map(|s| evaluate_selector(js, s))
            .transpose()?,
        not_visible: condition
            .not_visible
            .as_ref()
            .map(|s| evaluate_selector(js, s))
            .transpose()?,
        script_condition: condition
            .script_condition
            .as_ref()
            .map(|script| {
                if script.contains("${") {
                    eval_text(js, script)
                } else {
                    js.evaluate(script, &HashMap::new(), "condition", true)
                        .map_err(|e| OrchestraError::Script(e.to_string()))
                }
            })
            .transpose()?,
    })
}

/// Expand `${…}` placeholders by evaluating the string as a JS template
/// literal; strings without placeholders pass through untouched.
fn eval_text(js: &mut dyn ScriptEngine, text: &str) -> OrchestraResult<String> {
    if !text.contains("${") {
        return Ok(text.to_string());
    }
    js.evaluate(&format!("`{}`", text), &HashMap::new(), "inline", true)
        .map_err(|e| OrchestraError::Script(e.to_string()))
}

fn eval_opt_text(
    js: &mut dyn ScriptEngine,
    text: &Option<String>,
) -> OrchestraResult<Option<String>> {
    text.as_ref().map(|t| eval_text(js, t)).transpose()
}

fn eval_opt_selector(
    js: &mut dyn ScriptEngine,
    selector: &Option<ElementSelector>,
) -> OrchestraResult<Option<ElementSelector>> {
    selector
        .as_ref()
        .map(|s| evaluate_selector(js, s))
        .transpose()
}

fn eval_boxed_selector(
    js: &mut dyn ScriptEngine,
    selector: &Option<Box<ElementSelector>>,
) -> OrchestraResult<Option<Box<ElementSelector>>> {
    selector
        .as_ref()
        .map(|s| evaluate_selector(js, s).map(Box::new))
        .transpose()
}

fn eval_map_values(
    js: &mut dyn ScriptEngine,
    map: &HashMap<String, String>,
) -> OrchestraResult<HashMap<String, String>> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), eval_text(js, v)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::js_engine::BoaScriptEngine;

    #[test]
    fn test_input_text_expansion() {
        let mut js = BoaScriptEngine::new();
        js.evaluate("var user = 'alice';", &HashMap::new(), "setup", false)
            .unwrap();

        let command = Command::InputText {
            text: "name: ${user}".to_string(),
        };
        let evaluated = evaluate_command(&mut js, &command).unwrap();
        assert_eq!(
            evaluated,
            Command::InputText {
                text: "name: alice".to_string()
            }
        );
    }

    #[test]
    fn test_plain_strings_pass_through() {
        let mut js = BoaScriptEngine::new();
        let command = Command::InputText {
            text: "static".to_string(),
        };
        assert_eq!(evaluate_command(&mut js, &command).unwrap(), command);
    }

    #[test]
    fn test_script_condition_is_resolved_to_result_string() {
        let mut js = BoaScriptEngine::new();
        let condition = Condition::script("2 + 2 === 4");
        let evaluated = evaluate_condition_scripts(&mut js, &condition).unwrap();
        assert_eq!(evaluated.script_condition.as_deref(), Some("true"));
    }

    #[test]
    fn test_repeat_condition_stays_raw() {
        let mut js = BoaScriptEngine::new();
        js.evaluate("var i = 0;", &HashMap::new(), "setup", false)
            .unwrap();
        let command = Command::Repeat {
            commands: vec![Command::BackPress],
            times: Some("${1 + 2}".to_string()),
            condition: Some(Condition::script("i < 3")),
        };
        let evaluated = evaluate_command(&mut js, &command).unwrap();
        match evaluated {
            Command::Repeat {
                times, condition, ..
            } => {
                assert_eq!(times.as_deref(), Some("3"));
                assert_eq!(
                    condition.unwrap().script_condition.as_deref(),
                    Some("i < 3")
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
