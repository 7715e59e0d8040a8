//! The flow driver and command executor.
//!
//! A flow (ordered command list) enters through `run_flow`. Each command is
//! passed through script evaluation, dispatched against the driver, and
//! bracketed by lifecycle callbacks. Composite commands (repeat, runFlow)
//! recurse through `run_sub_flow`, which bookends execution with a script
//! scope push/pop.

use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::conditions::describe_condition;
use super::eval;
use super::events::{CommandMetadata, ErrorResolution, FlowObserver};
use super::js_engine::ScriptEngine;
use crate::commands::{
    parse_relative_point, parse_tap_point, AppState, Command, FlowConfig, GeoPoint, InitFlow,
    RandomInputKind, TapPoint,
};
use crate::driver::traits::{DeviceInfo, Driver};
use crate::errors::{OrchestraError, OrchestraResult};
use crate::filter;
use crate::proxy::{self, NetworkProxy};

pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 17_000;
pub const DEFAULT_OPTIONAL_LOOKUP_TIMEOUT_MS: u64 = 7_000;
pub const MAX_ERASE_CHARACTERS: usize = 50;

/// Construction-time knobs.
#[derive(Debug, Clone)]
pub struct OrchestraOptions {
    pub lookup_timeout_ms: u64,
    pub optional_lookup_timeout_ms: u64,
    pub state_dir: Option<PathBuf>,
    pub screenshots_dir: Option<PathBuf>,
}

impl Default for OrchestraOptions {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: DEFAULT_LOOKUP_TIMEOUT_MS,
            optional_lookup_timeout_ms: DEFAULT_OPTIONAL_LOOKUP_TIMEOUT_MS,
            state_dir: None,
            screenshots_dir: None,
        }
    }
}

struct ExecOutcome {
    completed: bool,
    mutated: bool,
}

/// Interpreter core executing flows against a device driver.
pub struct Orchestra {
    pub(crate) driver: Box<dyn Driver>,
    pub(crate) js: Box<dyn ScriptEngine>,
    observer: Arc<dyn FlowObserver>,
    proxy: Option<Box<dyn NetworkProxy>>,

    pub(crate) lookup_timeout_ms: u64,
    pub(crate) optional_lookup_timeout_ms: u64,
    state_dir: Option<PathBuf>,
    screenshots_dir: Option<PathBuf>,

    copied_text: Option<String>,
    pub(crate) last_interaction: Instant,
    device_info_cache: Option<DeviceInfo>,
    metadata: HashMap<usize, CommandMetadata>,
    script_logs: Arc<Mutex<Vec<String>>>,
}

impl Orchestra {
    pub fn new(
        driver: Box<dyn Driver>,
        mut js: Box<dyn ScriptEngine>,
        observer: Arc<dyn FlowObserver>,
        options: OrchestraOptions,
    ) -> Self {
        let script_logs: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_target = script_logs.clone();
        js.on_log(Box::new(move |_level, message| {
            sink_target.lock().unwrap().push(message.to_string());
        }));

        Self {
            driver,
            js,
            observer,
            proxy: None,
            lookup_timeout_ms: options.lookup_timeout_ms,
            optional_lookup_timeout_ms: options.optional_lookup_timeout_ms,
            state_dir: options.state_dir,
            screenshots_dir: options.screenshots_dir,
            copied_text: None,
            last_interaction: Instant::now(),
            device_info_cache: None,
            metadata: HashMap::new(),
            script_logs,
        }
    }

    /// Attach the network-mocking proxy consumed by `MockNetwork`.
    pub fn with_proxy(mut self, proxy: Box<dyn NetworkProxy>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn copied_text(&self) -> Option<&str> {
        self.copied_text.as_deref()
    }

    pub fn script_scope_depth(&self) -> usize {
        self.js.scope_depth()
    }

    /// Metadata recorded for a raw command of the current run.
    pub fn metadata_for(&self, command: &Command) -> Option<&CommandMetadata> {
        self.metadata.get(&metadata_key(command))
    }

    /// Run a flow to completion.
    ///
    /// Returns `Ok(false)` when a command failed and the host resolved the
    /// failure as `Fail`, or when the init flow did not succeed.
    pub async fn run_flow(
        &mut self,
        commands: &[Command],
        init_state: Option<AppState>,
    ) -> OrchestraResult<bool> {
        tracing::debug!(commands = commands.len(), "starting flow");
        self.js.init();
        self.last_interaction = Instant::now();
        self.device_info_cache = None;
        self.metadata.clear();
        self.script_logs.lock().unwrap().clear();

        let config = extract_config(commands)?;

        let state = match init_state {
            Some(state) => Some(state),
            None => match &config.init_flow {
                Some(init) => match self.run_init_flow(init).await? {
                    Some(state) => Some(state),
                    None => return Ok(false),
                },
                None => None,
            },
        };

        if let Some(state) = &state {
            self.driver.clear_app_state(&state.app_id).await?;
            self.driver.push_app_state(&state.app_id, &state.file).await?;
        }

        self.observer.on_flow_start(commands);
        self.execute_commands(commands, &config).await
    }

    /// Run the init flow and capture the resulting app state.
    ///
    /// State is only produced when the init flow succeeds.
    pub async fn run_init_flow(&mut self, init: &InitFlow) -> OrchestraResult<Option<AppState>> {
        let succeeded = Box::pin(self.run_flow(&init.commands, None)).await?;
        if !succeeded {
            return Ok(None);
        }

        self.driver.stop_app(&init.app_id).await?;

        let dir = self.state_dir.clone().unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&dir).map_err(anyhow::Error::from)?;
        let file = dir.join(format!("{}.state", Uuid::new_v4()));
        self.driver.pull_app_state(&init.app_id, &file).await?;

        Ok(Some(AppState {
            app_id: init.app_id.clone(),
            file,
        }))
    }

    /// Execute a command list at the top level of a flow.
    pub async fn execute_commands(
        &mut self,
        commands: &[Command],
        config: &FlowConfig,
    ) -> OrchestraResult<bool> {
        let outcome = self.execute_commands_inner(commands, config, false).await?;
        Ok(outcome.completed)
    }

    /// Execute a nested command list inside a fresh script scope.
    ///
    /// Unlike the top-level loop, a `Fail` resolution re-raises to the
    /// caller. Returns whether any sub-command mutated device state.
    pub async fn run_sub_flow(
        &mut self,
        commands: &[Command],
        config: &FlowConfig,
    ) -> OrchestraResult<bool> {
        self.js.enter_scope();
        let result = self.execute_commands_inner(commands, config, true).await;
        self.js.leave_scope();
        result.map(|outcome| outcome.mutated)
    }

    async fn execute_commands_inner(
        &mut self,
        commands: &[Command],
        config: &FlowConfig,
        raise_on_fail: bool,
    ) -> OrchestraResult<ExecOutcome> {
        let mut mutated = false;

        for (index, raw) in commands.iter().enumerate() {
            self.observer.on_command_start(index, raw);
            tracing::debug!(index, command = %raw.display_name(), "command started");
            let key = metadata_key(raw);

            let result: OrchestraResult<bool> =
                match eval::evaluate_command(self.js.as_mut(), raw) {
                    Ok(evaluated) => {
                        let snapshot = {
                            let meta = self.metadata.entry(key).or_default();
                            meta.evaluated_command = Some(evaluated.clone());
                            meta.clone()
                        };
                        self.observer.on_command_metadata_update(raw, &snapshot);
                        self.flush_script_logs(key, raw);

                        let result = self.execute_command(raw, &evaluated, config).await;
                        self.flush_script_logs(key, raw);
                        result
                    }
                    Err(err) => {
                        self.flush_script_logs(key, raw);
                        Err(err)
                    }
                };

            match result {
                Ok(command_mutated) => {
                    if command_mutated {
                        mutated = true;
                        self.last_interaction = Instant::now();
                    }
                    self.observer.on_command_complete(index, raw);
                }
                Err(OrchestraError::CommandSkipped) => {
                    self.observer.on_command_skipped(index, raw);
                }
                Err(err) => {
                    tracing::warn!(index, command = %raw.display_name(), error = %err, "command failed");
                    match self.observer.on_command_failed(index, raw, &err) {
                        ErrorResolution::Fail => {
                            if raise_on_fail {
                                return Err(err);
                            }
                            return Ok(ExecOutcome {
                                completed: false,
                                mutated,
                            });
                        }
                        ErrorResolution::Continue => {}
                    }
                }
            }
        }

        Ok(ExecOutcome {
            completed: true,
            mutated,
        })
    }

    /// Execute one evaluated command.
    ///
    /// Returns whether the command may have changed device state; a `true`
    /// result refreshes the interaction clock in the calling loop.
    async fn execute_command(
        &mut self,
        raw: &Command,
        command: &Command,
        config: &FlowConfig,
    ) -> OrchestraResult<bool> {
        match command {
            Command::TapOnElement {
                selector,
                retry_if_no_change,
                wait_until_visible,
                long_press,
            } => match self.find_element(selector, None).await {
                Ok((element, hierarchy)) => {
                    self.driver
                        .tap_element(
                            &element,
                            &hierarchy,
                            retry_if_no_change.unwrap_or(true),
                            wait_until_visible.unwrap_or(false),
                            long_press.unwrap_or(false),
                            config.app_id.as_deref(),
                        )
                        .await?;
                    Ok(true)
                }
                Err(OrchestraError::ElementNotFound { description, .. }) if selector.optional => {
                    tracing::info!(%description, "optional element not found, skipping tap");
                    Ok(false)
                }
                Err(err) => Err(err),
            },

            Command::TapOnPoint {
                x,
                y,
                retry_if_no_change,
                long_press,
            } => {
                self.driver
                    .tap_point(
                        *x,
                        *y,
                        retry_if_no_change.unwrap_or(true),
                        long_press.unwrap_or(false),
                    )
                    .await?;
                Ok(true)
            }

            Command::TapOnPointV2 {
                point,
                retry_if_no_change,
                long_press,
            } => {
                let retry = retry_if_no_change.unwrap_or(true);
                let long = long_press.unwrap_or(false);
                match parse_tap_point(point)? {
                    TapPoint::Absolute(x, y) => {
                        self.driver.tap_point(x, y, retry, long).await?;
                    }
                    TapPoint::Relative(x, y) => {
                        self.driver.tap_relative(x, y, retry, long).await?;
                    }
                }
                Ok(true)
            }

            Command::BackPress => {
                self.driver.back_press().await?;
                Ok(true)
            }

            Command::HideKeyboard => {
                self.driver.hide_keyboard().await?;
                Ok(true)
            }

            Command::Scroll => {
                self.driver.scroll_vertical().await?;
                Ok(true)
            }

            Command::ClearKeychain => {
                self.driver.clear_keychain().await?;
                Ok(true)
            }

            Command::Paste => match self.copied_text.clone() {
                Some(text) => {
                    self.input_text_checked(&text).await?;
                    Ok(true)
                }
                None => Ok(false),
            },

            // Configuration is consumed by the flow driver before dispatch.
            Command::ApplyConfiguration { .. } => Ok(false),

            Command::Swipe {
                selector,
                direction,
                start_relative,
                end_relative,
                start_point,
                end_point,
                duration_ms,
            } => {
                if let (Some(sel), Some(dir)) = (selector, direction) {
                    let (element, _) = self.find_element(sel, None).await?;
                    self.driver
                        .swipe_element(&element, *dir, *duration_ms)
                        .await?;
                } else if let (Some(start), Some(end)) = (start_relative, end_relative) {
                    let start = parse_relative_point(start)?;
                    let end = parse_relative_point(end)?;
                    self.driver.swipe_relative(start, end, *duration_ms).await?;
                } else if let Some(dir) = direction {
                    self.driver.swipe_direction(*dir, *duration_ms).await?;
                } else if let (Some(start), Some(end)) = (start_point, end_point) {
                    self.driver.swipe_points(*start, *end, *duration_ms).await?;
                } else {
                    return Err(OrchestraError::InvalidCommand {
                        reason: "Illegal arguments for swiping".to_string(),
                    });
                }
                Ok(true)
            }

            Command::ScrollUntilVisible {
                selector,
                direction,
                timeout_ms,
                scroll_duration_ms,
                visibility_percentage_normalized,
            } => {
                let description = filter::compile(selector)?.description();
                let info = self.device_info().await?;
                let deadline = Instant::now() + Duration::from_millis(*timeout_ms);
                let mut swiped = false;

                loop {
                    match self.find_element(selector, Some(500)).await {
                        Ok((element, _)) => {
                            let visible = element
                                .bounds
                                .visibility_percentage(info.width_grid, info.height_grid);
                            if visible >= *visibility_percentage_normalized {
                                return Ok(true);
                            }
                        }
                        Err(OrchestraError::ElementNotFound { .. }) => {}
                        Err(err) => return Err(err),
                    }

                    if swiped && Instant::now() >= deadline {
                        let hierarchy = self.driver.view_hierarchy().await?;
                        return Err(OrchestraError::ElementNotFound {
                            description: description.clone(),
                            hierarchy,
                        });
                    }

                    self.driver
                        .swipe_from_center(*direction, *scroll_duration_ms)
                        .await?;
                    self.last_interaction = Instant::now();
                    swiped = true;
                }
            }

            Command::CopyTextFrom { selector } => {
                let (element, _) = self.find_element(selector, None).await?;
                let text = ["text", "hintText", "accessibilityText"]
                    .iter()
                    .find_map(|key| {
                        element
                            .node
                            .attr(key)
                            .filter(|value| !value.is_empty())
                            .map(str::to_string)
                    });
                match text {
                    Some(text) => {
                        let script =
                            format!("maestro.copiedText = '{}';", self.js.sanitize(&text));
                        self.js
                            .evaluate(&script, &HashMap::new(), "copyTextFrom", false)
                            .map_err(|e| OrchestraError::Script(e.to_string()))?;
                        self.copied_text = Some(text);
                        Ok(false)
                    }
                    None => Err(OrchestraError::UnableToCopyTextFromElement {
                        description: filter::compile(selector)?.description(),
                    }),
                }
            }

            Command::AssertCondition {
                condition,
                timeout_ms,
            }
            | Command::Assert {
                condition,
                timeout_ms,
            } => {
                if self.evaluate_condition(condition, *timeout_ms).await? {
                    return Ok(false);
                }
                let optional = condition.visible.as_ref().map(|s| s.optional).unwrap_or(false)
                    || condition
                        .not_visible
                        .as_ref()
                        .map(|s| s.optional)
                        .unwrap_or(false);
                if optional {
                    return Err(OrchestraError::CommandSkipped);
                }
                let hierarchy = self.driver.view_hierarchy().await?;
                Err(OrchestraError::AssertionFailure {
                    description: describe_condition(condition),
                    hierarchy,
                })
            }

            Command::InputText { text } => {
                self.input_text_checked(text).await?;
                Ok(true)
            }

            Command::InputRandom { kind, length } => {
                let text = synthesize_random(*kind, *length);
                self.input_text_checked(&text).await?;
                Ok(true)
            }

            Command::LaunchApp {
                app_id,
                clear_state,
                clear_keychain,
                permissions,
                launch_arguments,
                stop_app,
            } => {
                if clear_keychain.unwrap_or(false) {
                    self.driver.clear_keychain().await.map_err(|e| {
                        OrchestraError::UnableToClearState {
                            app_id: app_id.clone(),
                            source: e,
                        }
                    })?;
                }
                if clear_state.unwrap_or(false) {
                    self.driver.clear_app_state(app_id).await.map_err(|e| {
                        OrchestraError::UnableToClearState {
                            app_id: app_id.clone(),
                            source: e,
                        }
                    })?;
                }

                let default_permissions =
                    HashMap::from([("all".to_string(), "allow".to_string())]);
                let permissions = permissions.as_ref().unwrap_or(&default_permissions);
                self.driver
                    .set_permissions(app_id, permissions)
                    .await
                    .map_err(|e| OrchestraError::UnableToClearState {
                        app_id: app_id.clone(),
                        source: e,
                    })?;

                let arguments = launch_arguments.clone().unwrap_or_default();
                self.driver
                    .launch_app(app_id, &arguments, stop_app.unwrap_or(true))
                    .await
                    .map_err(|e| OrchestraError::UnableToLaunchApp {
                        app_id: app_id.clone(),
                        source: e,
                    })?;
                Ok(true)
            }

            Command::OpenLink {
                link,
                auto_verify,
                browser,
            } => {
                self.driver
                    .open_link(
                        link,
                        config.app_id.as_deref(),
                        auto_verify.unwrap_or(false),
                        browser.unwrap_or(false),
                    )
                    .await?;
                Ok(true)
            }

            Command::PressKey { code } => {
                self.driver.press_key(*code).await?;
                Ok(true)
            }

            Command::EraseText {
                characters_to_erase,
            } => {
                let characters = characters_to_erase.unwrap_or(MAX_ERASE_CHARACTERS);
                self.driver.erase_text(characters).await?;
                self.driver.wait_for_app_to_settle().await?;
                Ok(true)
            }

            Command::TakeScreenshot { path } => {
                let file = match &self.screenshots_dir {
                    Some(dir) => {
                        std::fs::create_dir_all(dir).map_err(anyhow::Error::from)?;
                        dir.join(format!("{}.png", path))
                    }
                    None => PathBuf::from(format!("{}.png", path)),
                };
                self.driver.take_screenshot(&file).await?;
                Ok(false)
            }

            Command::StopApp { app_id } => {
                let app_id = resolve_app_id(app_id, config)?;
                self.driver.stop_app(&app_id).await?;
                Ok(true)
            }

            Command::ClearState { app_id } => {
                let app_id = resolve_app_id(app_id, config)?;
                self.driver.clear_app_state(&app_id).await?;
                // Reset permissions so platforms converge after a wipe.
                let unset = HashMap::from([("all".to_string(), "unset".to_string())]);
                self.driver.set_permissions(&app_id, &unset).await?;
                Ok(true)
            }

            Command::RunFlow {
                commands,
                condition,
            } => {
                let proceed = match condition {
                    Some(condition) => self.evaluate_condition(condition, None).await?,
                    None => true,
                };
                if !proceed {
                    return Err(OrchestraError::CommandSkipped);
                }
                Box::pin(self.run_sub_flow(commands, config)).await
            }

            Command::SetLocation {
                latitude,
                longitude,
            } => {
                self.driver.set_location(*latitude, *longitude).await?;
                Ok(true)
            }

            Command::Repeat {
                commands,
                times,
                condition,
            } => {
                let max = match times {
                    Some(times) => {
                        let parsed: f64 = times.trim().parse().map_err(|_| {
                            OrchestraError::InvalidCommand {
                                reason: format!("invalid repeat count: \"{}\"", times),
                            }
                        })?;
                        parsed.max(0.0) as u32
                    }
                    None => u32::MAX,
                };

                let key = metadata_key(raw);
                self.metadata.entry(key).or_default().number_of_runs = Some(0);

                let mut counter: u32 = 0;
                let mut mutated = false;
                while counter < max {
                    let proceed = match condition {
                        Some(raw_condition) => {
                            let evaluated = eval::evaluate_condition_scripts(
                                self.js.as_mut(),
                                raw_condition,
                            )?;
                            self.evaluate_condition(&evaluated, None).await?
                        }
                        None => true,
                    };
                    if !proceed {
                        break;
                    }

                    if counter > 0 {
                        for sub in commands {
                            self.reset_command(sub);
                        }
                    }

                    mutated |= Box::pin(self.run_sub_flow(commands, config)).await?;
                    counter += 1;

                    let snapshot = {
                        let meta = self.metadata.entry(key).or_default();
                        meta.number_of_runs = Some(counter);
                        meta.clone()
                    };
                    self.observer.on_command_metadata_update(raw, &snapshot);
                }

                if counter == 0 {
                    return Err(OrchestraError::CommandSkipped);
                }
                Ok(mutated)
            }

            Command::DefineVariables { env } => {
                for (name, value) in env {
                    let script = format!("var {} = '{}';", name, self.js.sanitize(value));
                    self.js
                        .evaluate(&script, &HashMap::new(), "defineVariables", false)
                        .map_err(|e| OrchestraError::Script(e.to_string()))?;
                }
                Ok(false)
            }

            Command::RunScript {
                script,
                env,
                source_description,
            } => {
                self.js
                    .evaluate(script, env, source_description, false)
                    .map_err(|e| OrchestraError::Script(e.to_string()))?;
                Ok(true)
            }

            Command::EvalScript { script } => {
                self.js
                    .evaluate(script, &HashMap::new(), "evalScript", false)
                    .map_err(|e| OrchestraError::Script(e.to_string()))?;
                Ok(true)
            }

            Command::WaitForAnimationToEnd { timeout_ms } => {
                self.driver.wait_for_animation_to_end(*timeout_ms).await?;
                Ok(false)
            }

            Command::MockNetwork { rules_path } => {
                let Some(port) = self.proxy.as_ref().map(|p| p.port()) else {
                    return Err(OrchestraError::InvalidCommand {
                        reason: "network proxy not configured".to_string(),
                    });
                };
                self.driver.set_proxy(port).await?;
                let rules = proxy::load_rules(Path::new(rules_path))?;
                if let Some(proxy) = self.proxy.as_mut() {
                    if proxy.is_started() {
                        proxy.replace_rules(rules)?;
                    } else {
                        proxy.start(rules)?;
                    }
                }
                Ok(false)
            }

            Command::Travel { points, speed_mps } => {
                let speed = speed_mps.unwrap_or(4.0);
                let mut previous: Option<GeoPoint> = None;
                for point in points {
                    if let Some(previous) = previous {
                        let distance = previous.distance_meters(point);
                        if speed > 0.0 && distance > 0.0 {
                            tokio::time::sleep(Duration::from_secs_f64(distance / speed)).await;
                        }
                    }
                    self.driver
                        .set_location(point.latitude, point.longitude)
                        .await?;
                    previous = Some(*point);
                }
                Ok(true)
            }

            Command::AssertOutgoingRequests {
                path,
                headers_present,
                http_method_is,
                request_body_contains,
                headers_and_values,
            } => {
                let matched = self
                    .driver
                    .assert_outgoing_request(
                        path,
                        headers_present,
                        http_method_is.as_deref(),
                        request_body_contains.as_deref(),
                        headers_and_values,
                    )
                    .await?;
                if matched {
                    Ok(false)
                } else {
                    Err(OrchestraError::OutgoingRequestAssertionFailure {
                        description: describe_request_matchers(
                            path,
                            headers_present,
                            http_method_is.as_deref(),
                            request_body_contains.as_deref(),
                            headers_and_values,
                        ),
                    })
                }
            }
        }
    }

    pub(crate) async fn device_info(&mut self) -> OrchestraResult<DeviceInfo> {
        if let Some(info) = &self.device_info_cache {
            return Ok(info.clone());
        }
        let info = self.driver.device_info().await?;
        self.device_info_cache = Some(info.clone());
        Ok(info)
    }

    async fn input_text_checked(&mut self, text: &str) -> OrchestraResult<()> {
        if !self.driver.is_unicode_input_supported() && !text.is_ascii() {
            return Err(OrchestraError::UnicodeNotSupported {
                text: text.to_string(),
            });
        }
        self.driver.input_text(text).await?;
        Ok(())
    }

    fn reset_command(&mut self, command: &Command) {
        self.metadata.remove(&metadata_key(command));
        self.observer.on_command_reset(command);
        for sub in command.sub_commands() {
            self.reset_command(sub);
        }
    }

    fn flush_script_logs(&mut self, key: usize, raw: &Command) {
        let drained: Vec<String> = {
            let mut buffer = self.script_logs.lock().unwrap();
            std::mem::take(&mut *buffer)
        };
        if drained.is_empty() {
            return;
        }
        let snapshot = {
            let meta = self.metadata.entry(key).or_default();
            meta.log_messages.extend(drained);
            meta.clone()
        };
        self.observer.on_command_metadata_update(raw, &snapshot);
    }
}

/// Identity key for a raw command within the borrowed flow slice.
fn metadata_key(command: &Command) -> usize {
    command as *const Command as usize
}

/// The first `ApplyConfiguration` command carries the flow config; more
/// than one is an error.
fn extract_config(commands: &[Command]) -> OrchestraResult<FlowConfig> {
    let mut found: Option<FlowConfig> = None;
    for command in commands {
        if let Command::ApplyConfiguration { config } = command {
            if found.is_some() {
                return Err(OrchestraError::InvalidCommand {
                    reason: "flow contains more than one applyConfiguration command".to_string(),
                });
            }
            found = Some(config.clone());
        }
    }
    Ok(found.unwrap_or_default())
}

fn resolve_app_id(app_id: &Option<String>, config: &FlowConfig) -> OrchestraResult<String> {
    app_id
        .clone()
        .or_else(|| config.app_id.clone())
        .ok_or_else(|| OrchestraError::InvalidCommand {
            reason: "no appId specified".to_string(),
        })
}

fn synthesize_random(kind: RandomInputKind, length: usize) -> String {
    let mut rng = rand::thread_rng();
    match kind {
        RandomInputKind::Text => (0..length)
            .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
            .collect(),
        RandomInputKind::Number => (0..length)
            .map(|_| rng.gen_range(0..10).to_string())
            .collect(),
        RandomInputKind::Email => {
            let local: String = (0..length.max(1))
                .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
                .collect();
            format!("{}@test.com", local.to_lowercase())
        }
    }
}

fn describe_request_matchers(
    path: &str,
    headers_present: &[String],
    http_method: Option<&str>,
    body_contains: Option<&str>,
    headers_and_values: &HashMap<String, String>,
) -> String {
    let mut parts = vec![format!("path: {}", path)];
    if let Some(method) = http_method {
        parts.push(format!("method: {}", method));
    }
    if !headers_present.is_empty() {
        parts.push(format!("headers present: {}", headers_present.join(", ")));
    }
    if let Some(body) = body_contains {
        parts.push(format!("body contains: {}", body));
    }
    if !headers_and_values.is_empty() {
        let mut pairs: Vec<String> = headers_and_values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        pairs.sort();
        parts.push(format!("header values: {}", pairs.join(", ")));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_config_takes_first_and_only() {
        let config = FlowConfig {
            app_id: Some("com.app".to_string()),
            ..Default::default()
        };
        let commands = vec![
            Command::ApplyConfiguration {
                config: config.clone(),
            },
            Command::BackPress,
        ];
        assert_eq!(extract_config(&commands).unwrap(), config);
        assert_eq!(extract_config(&[Command::BackPress]).unwrap(), FlowConfig::default());
    }

    #[test]
    fn test_extract_config_rejects_collision() {
        let commands = vec![
            Command::ApplyConfiguration {
                config: FlowConfig::default(),
            },
            Command::ApplyConfiguration {
                config: FlowConfig::default(),
            },
        ];
        assert!(extract_config(&commands).is_err());
    }

    #[test]
    fn test_synthesize_random_shapes() {
        let number = synthesize_random(RandomInputKind::Number, 6);
        assert_eq!(number.len(), 6);
        assert!(number.chars().all(|c| c.is_ascii_digit()));

        let text = synthesize_random(RandomInputKind::Text, 12);
        assert_eq!(text.len(), 12);
        assert!(text.chars().all(|c| c.is_ascii_alphanumeric()));

        let email = synthesize_random(RandomInputKind::Email, 8);
        assert!(email.ends_with("@test.com"));
    }

    #[test]
    fn test_describe_request_matchers() {
        let description = describe_request_matchers(
            "/api/users",
            &["authorization".to_string()],
            Some("POST"),
            None,
            &HashMap::new(),
        );
        assert_eq!(
            description,
            "path: /api/users, method: POST, headers present: authorization"
        );
    }
}
