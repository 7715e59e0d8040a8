use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::hierarchy::{UiElement, ViewHierarchy};
use crate::commands::{Platform, Point};

/// Swipe direction on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Physical or virtual key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyCode {
    Enter,
    Backspace,
    Back,
    Home,
    Lock,
    VolumeUp,
    VolumeDown,
    Power,
    Tab,
}

/// Static device characteristics, fetched once per flow run and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub platform: Platform,
    pub width_grid: i64,
    pub height_grid: i64,
    pub width_points: i64,
    pub height_points: i64,
}

/// Platform-agnostic driver interface
///
/// The orchestra treats the device as an opaque capability bundle behind
/// this trait. Every method is a blocking (awaited) operation; driver
/// errors propagate as `anyhow::Error` and are classified by the caller.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn device_info(&self) -> Result<DeviceInfo>;

    /// Snapshot of the current screen's accessibility tree.
    async fn view_hierarchy(&self) -> Result<ViewHierarchy>;

    /// Tap a previously matched element.
    async fn tap_element(
        &self,
        element: &UiElement,
        hierarchy: &ViewHierarchy,
        retry_if_no_change: bool,
        wait_until_visible: bool,
        long_press: bool,
        app_id: Option<&str>,
    ) -> Result<()>;

    /// Tap an absolute grid coordinate.
    async fn tap_point(
        &self,
        x: i64,
        y: i64,
        retry_if_no_change: bool,
        long_press: bool,
    ) -> Result<()>;

    /// Tap a screen-relative coordinate, both components in 0..=100.
    async fn tap_relative(
        &self,
        percent_x: u8,
        percent_y: u8,
        retry_if_no_change: bool,
        long_press: bool,
    ) -> Result<()>;

    async fn swipe_direction(&self, direction: SwipeDirection, duration_ms: u64) -> Result<()>;

    async fn swipe_element(
        &self,
        element: &UiElement,
        direction: SwipeDirection,
        duration_ms: u64,
    ) -> Result<()>;

    /// Swipe between two screen-relative points.
    async fn swipe_relative(
        &self,
        start: (u8, u8),
        end: (u8, u8),
        duration_ms: u64,
    ) -> Result<()>;

    async fn swipe_points(&self, start: Point, end: Point, duration_ms: u64) -> Result<()>;

    async fn swipe_from_center(&self, direction: SwipeDirection, duration_ms: u64) -> Result<()>;

    async fn back_press(&self) -> Result<()>;

    async fn hide_keyboard(&self) -> Result<()>;

    async fn scroll_vertical(&self) -> Result<()>;

    async fn press_key(&self, code: KeyCode) -> Result<()>;

    async fn wait_for_animation_to_end(&self, timeout_ms: Option<u64>) -> Result<()>;

    /// Block until the foreground app is idle enough for the next action.
    async fn wait_for_app_to_settle(&self) -> Result<()>;

    async fn input_text(&self, text: &str) -> Result<()>;

    /// Whether the input method accepts non-ASCII text.
    fn is_unicode_input_supported(&self) -> bool;

    async fn erase_text(&self, characters: usize) -> Result<()>;

    async fn launch_app(
        &self,
        app_id: &str,
        launch_arguments: &HashMap<String, String>,
        stop_if_running: bool,
    ) -> Result<()>;

    async fn stop_app(&self, app_id: &str) -> Result<()>;

    async fn open_link(
        &self,
        link: &str,
        app_id: Option<&str>,
        auto_verify: bool,
        browser: bool,
    ) -> Result<()>;

    async fn clear_app_state(&self, app_id: &str) -> Result<()>;

    async fn push_app_state(&self, app_id: &str, file: &Path) -> Result<()>;

    async fn pull_app_state(&self, app_id: &str, file: &Path) -> Result<()>;

    async fn set_permissions(
        &self,
        app_id: &str,
        permissions: &HashMap<String, String>,
    ) -> Result<()>;

    async fn clear_keychain(&self) -> Result<()>;

    async fn take_screenshot(&self, file: &Path) -> Result<()>;

    async fn set_location(&self, latitude: f64, longitude: f64) -> Result<()>;

    /// Route device traffic through a local proxy port.
    async fn set_proxy(&self, port: u16) -> Result<()>;

    /// Check recorded outgoing traffic against the given matchers.
    ///
    /// Returns false when no recorded request satisfies all of them.
    async fn assert_outgoing_request(
        &self,
        path: &str,
        headers_present: &[String],
        http_method: Option<&str>,
        body_contains: Option<&str>,
        headers_and_values: &HashMap<String, String>,
    ) -> Result<bool>;
}
