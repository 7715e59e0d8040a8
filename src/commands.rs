use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::driver::traits::{KeyCode, SwipeDirection};
use crate::errors::{OrchestraError, OrchestraResult};

/// Target platform reported by the driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    #[serde(alias = "iOS")]
    Ios,
    Web,
}

/// Absolute point on the device grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

/// Geographic coordinate used by location mocking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Great-circle distance to `other` in meters (haversine).
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// Expected element size with an absolute pixel tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeSpec {
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub tolerance: Option<i64>,
}

/// Pre-defined element-class predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementTrait {
    /// Element carries non-empty text.
    Text,
    /// Element bounds are roughly square.
    Square,
    /// Element text is longer than 200 characters.
    LongText,
}

/// Declarative query describing one UI element.
///
/// All fields are independently composable; every present constraint is
/// AND-combined when the selector is compiled into a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ElementSelector {
    #[serde(default)]
    pub text_regex: Option<String>,

    #[serde(default)]
    pub id_regex: Option<String>,

    #[serde(default)]
    pub size: Option<SizeSpec>,

    #[serde(default)]
    pub below: Option<Box<ElementSelector>>,

    #[serde(default)]
    pub above: Option<Box<ElementSelector>>,

    #[serde(default)]
    pub left_of: Option<Box<ElementSelector>>,

    #[serde(default)]
    pub right_of: Option<Box<ElementSelector>>,

    #[serde(default)]
    pub contains_child: Option<Box<ElementSelector>>,

    #[serde(default)]
    pub contains_descendants: Option<Vec<ElementSelector>>,

    #[serde(default)]
    pub traits: Option<Vec<ElementTrait>>,

    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub selected: Option<bool>,

    #[serde(default)]
    pub checked: Option<bool>,

    #[serde(default)]
    pub focused: Option<bool>,

    #[serde(default)]
    pub index: Option<i32>,

    /// Absence of a match is a skip rather than a failure.
    #[serde(default)]
    pub optional: bool,
}

impl ElementSelector {
    pub fn text(pattern: impl Into<String>) -> Self {
        Self {
            text_regex: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn id(pattern: impl Into<String>) -> Self {
        Self {
            id_regex: Some(pattern.into()),
            ..Default::default()
        }
    }
}

/// Condition gating assertions, `runFlow`, and `repeat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub platform: Option<Platform>,

    #[serde(default)]
    pub visible: Option<ElementSelector>,

    #[serde(default)]
    pub not_visible: Option<ElementSelector>,

    /// Script source before evaluation; holds the evaluated result string
    /// once the command has been passed through the script engine.
    #[serde(default)]
    pub script_condition: Option<String>,
}

impl Condition {
    pub fn visible(selector: ElementSelector) -> Self {
        Self {
            visible: Some(selector),
            ..Default::default()
        }
    }

    pub fn script(expression: impl Into<String>) -> Self {
        Self {
            script_condition: Some(expression.into()),
            ..Default::default()
        }
    }
}

/// Flow-level configuration carried by the first `ApplyConfiguration`
/// command of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FlowConfig {
    #[serde(default)]
    pub app_id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub init_flow: Option<InitFlow>,
}

/// Inner flow whose effect on app disk state is captured and replayed as
/// the starting state of the outer flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitFlow {
    pub app_id: String,
    pub commands: Vec<Command>,
}

/// Captured app state produced by an init flow.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub app_id: String,
    pub file: PathBuf,
}

/// Kind of content synthesized by `InputRandom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RandomInputKind {
    Text,
    Number,
    Email,
}

fn default_swipe_duration_ms() -> u64 {
    400
}

fn default_scroll_timeout_ms() -> u64 {
    20_000
}

fn default_scroll_duration_ms() -> u64 {
    40
}

fn default_visibility_percentage() -> f64 {
    1.0
}

fn default_random_length() -> usize {
    8
}

/// One step of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    TapOnElement {
        selector: ElementSelector,
        #[serde(default)]
        retry_if_no_change: Option<bool>,
        #[serde(default)]
        wait_until_visible: Option<bool>,
        #[serde(default)]
        long_press: Option<bool>,
    },

    TapOnPoint {
        x: i64,
        y: i64,
        #[serde(default)]
        retry_if_no_change: Option<bool>,
        #[serde(default)]
        long_press: Option<bool>,
    },

    /// Tap at `"x,y"` (absolute) or `"p%,p%"` (relative) coordinates.
    TapOnPointV2 {
        point: String,
        #[serde(default)]
        retry_if_no_change: Option<bool>,
        #[serde(default)]
        long_press: Option<bool>,
    },

    BackPress,
    HideKeyboard,
    Scroll,
    ClearKeychain,
    Paste,

    ApplyConfiguration {
        config: FlowConfig,
    },

    Swipe {
        #[serde(default)]
        selector: Option<ElementSelector>,
        #[serde(default)]
        direction: Option<SwipeDirection>,
        #[serde(default)]
        start_relative: Option<String>,
        #[serde(default)]
        end_relative: Option<String>,
        #[serde(default)]
        start_point: Option<Point>,
        #[serde(default)]
        end_point: Option<Point>,
        #[serde(default = "default_swipe_duration_ms")]
        duration_ms: u64,
    },

    ScrollUntilVisible {
        selector: ElementSelector,
        direction: SwipeDirection,
        #[serde(default = "default_scroll_timeout_ms")]
        timeout_ms: u64,
        #[serde(default = "default_scroll_duration_ms")]
        scroll_duration_ms: u64,
        #[serde(default = "default_visibility_percentage")]
        visibility_percentage_normalized: f64,
    },

    CopyTextFrom {
        selector: ElementSelector,
    },

    AssertCondition {
        condition: Condition,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Legacy assertion form; executes exactly like `AssertCondition`.
    Assert {
        condition: Condition,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    InputText {
        text: String,
    },

    InputRandom {
        kind: RandomInputKind,
        #[serde(default = "default_random_length")]
        length: usize,
    },

    LaunchApp {
        app_id: String,
        #[serde(default)]
        clear_state: Option<bool>,
        #[serde(default)]
        clear_keychain: Option<bool>,
        #[serde(default)]
        permissions: Option<HashMap<String, String>>,
        #[serde(default)]
        launch_arguments: Option<HashMap<String, String>>,
        #[serde(default)]
        stop_app: Option<bool>,
    },

    OpenLink {
        link: String,
        #[serde(default)]
        auto_verify: Option<bool>,
        #[serde(default)]
        browser: Option<bool>,
    },

    PressKey {
        code: KeyCode,
    },

    EraseText {
        #[serde(default)]
        characters_to_erase: Option<usize>,
    },

    TakeScreenshot {
        path: String,
    },

    StopApp {
        #[serde(default)]
        app_id: Option<String>,
    },

    ClearState {
        #[serde(default)]
        app_id: Option<String>,
    },

    RunFlow {
        commands: Vec<Command>,
        #[serde(default)]
        condition: Option<Condition>,
    },

    SetLocation {
        latitude: f64,
        longitude: f64,
    },

    Repeat {
        commands: Vec<Command>,
        /// Script-evaluated; parsed as floating point, truncated to integer.
        #[serde(default)]
        times: Option<String>,
        #[serde(default)]
        condition: Option<Condition>,
    },

    DefineVariables {
        env: HashMap<String, String>,
    },

    RunScript {
        script: String,
        #[serde(default)]
        env: HashMap<String, String>,
        source_description: String,
    },

    EvalScript {
        script: String,
    },

    WaitForAnimationToEnd {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    MockNetwork {
        rules_path: String,
    },

    Travel {
        points: Vec<GeoPoint>,
        #[serde(default)]
        speed_mps: Option<f64>,
    },

    AssertOutgoingRequests {
        path: String,
        #[serde(default)]
        headers_present: Vec<String>,
        #[serde(default)]
        http_method_is: Option<String>,
        #[serde(default)]
        request_body_contains: Option<String>,
        #[serde(default)]
        headers_and_values: HashMap<String, String>,
    },
}

impl Command {
    /// Sub-commands of a composite command; empty for leaf commands.
    pub fn sub_commands(&self) -> &[Command] {
        match self {
            Command::RunFlow { commands, .. } | Command::Repeat { commands, .. } => commands,
            _ => &[],
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Command::RunFlow { .. } | Command::Repeat { .. })
    }

    /// Short human-readable name used in logs and error messages.
    pub fn display_name(&self) -> String {
        match self {
            Command::TapOnElement { selector, .. } => {
                if let Some(text) = &selector.text_regex {
                    format!("tapOn(text: \"{}\")", text)
                } else if let Some(id) = &selector.id_regex {
                    format!("tapOn(id: \"{}\")", id)
                } else {
                    "tapOn".to_string()
                }
            }
            Command::TapOnPoint { x, y, .. } => format!("tapOn(point: {},{})", x, y),
            Command::TapOnPointV2 { point, .. } => format!("tapOn(point: {})", point),
            Command::BackPress => "back".to_string(),
            Command::HideKeyboard => "hideKeyboard".to_string(),
            Command::Scroll => "scroll".to_string(),
            Command::ClearKeychain => "clearKeychain".to_string(),
            Command::Paste => "pasteText".to_string(),
            Command::ApplyConfiguration { .. } => "applyConfiguration".to_string(),
            Command::Swipe { direction, .. } => match direction {
                Some(d) => format!("swipe({:?})", d),
                None => "swipe".to_string(),
            },
            Command::ScrollUntilVisible { selector, .. } => {
                if let Some(text) = &selector.text_regex {
                    format!("scrollUntilVisible(text: \"{}\")", text)
                } else {
                    "scrollUntilVisible".to_string()
                }
            }
            Command::CopyTextFrom { .. } => "copyTextFrom".to_string(),
            Command::AssertCondition { .. } | Command::Assert { .. } => {
                "assertCondition".to_string()
            }
            Command::InputText { text } => format!("inputText(\"{}\")", text),
            Command::InputRandom { kind, length } => {
                format!("inputRandom({:?}, length: {})", kind, length)
            }
            Command::LaunchApp { app_id, .. } => format!("launchApp(\"{}\")", app_id),
            Command::OpenLink { link, .. } => format!("openLink(\"{}\")", link),
            Command::PressKey { code } => format!("pressKey({:?})", code),
            Command::EraseText { .. } => "eraseText".to_string(),
            Command::TakeScreenshot { path } => format!("takeScreenshot(\"{}\")", path),
            Command::StopApp { app_id } => match app_id {
                Some(id) => format!("stopApp(\"{}\")", id),
                None => "stopApp".to_string(),
            },
            Command::ClearState { app_id } => match app_id {
                Some(id) => format!("clearState(\"{}\")", id),
                None => "clearState".to_string(),
            },
            Command::RunFlow { commands, .. } => format!("runFlow({} commands)", commands.len()),
            Command::SetLocation {
                latitude,
                longitude,
            } => format!("setLocation({:.4}, {:.4})", latitude, longitude),
            Command::Repeat { times, .. } => match times {
                Some(t) => format!("repeat({} times)", t),
                None => "repeat".to_string(),
            },
            Command::DefineVariables { env } => format!("defineVariables({} vars)", env.len()),
            Command::RunScript {
                source_description, ..
            } => format!("runScript(\"{}\")", source_description),
            Command::EvalScript { script } => format!("evalScript({})", script),
            Command::WaitForAnimationToEnd { .. } => "waitForAnimationToEnd".to_string(),
            Command::MockNetwork { rules_path } => format!("mockNetwork(\"{}\")", rules_path),
            Command::Travel { points, .. } => format!("travel({} points)", points.len()),
            Command::AssertOutgoingRequests { path, .. } => {
                format!("assertOutgoingRequests(\"{}\")", path)
            }
        }
    }
}

/// Parsed form of a `TapOnPointV2` point string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapPoint {
    Absolute(i64, i64),
    Relative(u8, u8),
}

/// Parse `"x,y"` (absolute) or `"p%,p%"` (relative, both components
/// integers in 0..=100).
pub fn parse_tap_point(raw: &str) -> OrchestraResult<TapPoint> {
    let invalid = || OrchestraError::InvalidCommand {
        reason: format!("invalid point: \"{}\"", raw),
    };

    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 2 {
        return Err(invalid());
    }

    if raw.contains('%') {
        let (x, y) = (parse_percent(parts[0]), parse_percent(parts[1]));
        match (x, y) {
            (Some(x), Some(y)) => Ok(TapPoint::Relative(x, y)),
            _ => Err(invalid()),
        }
    } else {
        let x = parts[0].parse::<i64>().map_err(|_| invalid())?;
        let y = parts[1].parse::<i64>().map_err(|_| invalid())?;
        Ok(TapPoint::Absolute(x, y))
    }
}

/// Parse a `"p%,p%"` pair for relative swipes.
pub fn parse_relative_point(raw: &str) -> OrchestraResult<(u8, u8)> {
    match parse_tap_point(raw)? {
        TapPoint::Relative(x, y) => Ok((x, y)),
        TapPoint::Absolute(..) => Err(OrchestraError::InvalidCommand {
            reason: format!("expected percentage point, got \"{}\"", raw),
        }),
    }
}

fn parse_percent(part: &str) -> Option<u8> {
    let digits = part.strip_suffix('%')?;
    let value: i64 = digits.trim().parse().ok()?;
    if (0..=100).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_point() {
        assert_eq!(parse_tap_point("100,200").unwrap(), TapPoint::Absolute(100, 200));
        assert_eq!(parse_tap_point(" 10 , 20 ").unwrap(), TapPoint::Absolute(10, 20));
    }

    #[test]
    fn test_parse_relative_point() {
        assert_eq!(parse_tap_point("10%,20%").unwrap(), TapPoint::Relative(10, 20));
        assert_eq!(parse_tap_point("0%,100%").unwrap(), TapPoint::Relative(0, 100));
    }

    #[test]
    fn test_parse_point_rejects_out_of_range() {
        assert!(parse_tap_point("101%,0%").is_err());
        assert!(parse_tap_point("-1%,50%").is_err());
    }

    #[test]
    fn test_parse_point_rejects_garbage() {
        assert!(parse_tap_point("abc").is_err());
        assert!(parse_tap_point("10,20,30").is_err());
        assert!(parse_tap_point("10%,abc%").is_err());
        assert!(parse_tap_point("1.5,2").is_err());
    }

    #[test]
    fn test_geo_distance() {
        let a = GeoPoint {
            latitude: 52.5200,
            longitude: 13.4050,
        };
        let b = GeoPoint {
            latitude: 52.5201,
            longitude: 13.4050,
        };
        let d = a.distance_meters(&b);
        assert!(d > 10.0 && d < 12.0, "unexpected distance {}", d);
        assert_eq!(a.distance_meters(&a), 0.0);
    }

    #[test]
    fn test_sub_commands() {
        let inner = Command::BackPress;
        let repeat = Command::Repeat {
            commands: vec![inner.clone()],
            times: Some("2".to_string()),
            condition: None,
        };
        assert_eq!(repeat.sub_commands(), &[inner]);
        assert!(repeat.is_composite());
        assert!(!Command::BackPress.is_composite());
    }
}
