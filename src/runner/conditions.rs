//! Condition evaluation against driver state.

use std::time::{Duration, Instant};

use super::lookup::{adjusted_timeout_ms, LOOKUP_POLL_INTERVAL_MS};
use super::orchestra::Orchestra;
use crate::commands::Condition;
use crate::errors::{OrchestraError, OrchestraResult};
use crate::filter;

const NOT_VISIBLE_PROBE_TIMEOUT_MS: u64 = 500;

impl Orchestra {
    /// Evaluate a condition; all present sub-conditions are AND-combined
    /// and an empty condition is true.
    pub(crate) async fn evaluate_condition(
        &mut self,
        condition: &Condition,
        timeout_ms: Option<u64>,
    ) -> OrchestraResult<bool> {
        if let Some(platform) = condition.platform {
            if self.device_info().await?.platform != platform {
                return Ok(false);
            }
        }

        if let Some(selector) = &condition.visible {
            let timeout = timeout_ms.unwrap_or(self.optional_lookup_timeout_ms);
            match self.find_element(selector, Some(timeout)).await {
                Ok(_) => {}
                Err(OrchestraError::ElementNotFound { .. }) => return Ok(false),
                Err(other) => return Err(other),
            }
        }

        if let Some(selector) = &condition.not_visible {
            let base = timeout_ms.unwrap_or(self.optional_lookup_timeout_ms);
            let deadline = Instant::now()
                + Duration::from_millis(adjusted_timeout_ms(base, self.last_interaction));
            loop {
                match self
                    .find_element(selector, Some(NOT_VISIBLE_PROBE_TIMEOUT_MS))
                    .await
                {
                    // Element is gone, the condition holds.
                    Err(OrchestraError::ElementNotFound { .. }) => break,
                    Err(other) => return Err(other),
                    Ok(_) => {
                        if Instant::now() >= deadline {
                            return Ok(false);
                        }
                        tokio::time::sleep(Duration::from_millis(LOOKUP_POLL_INTERVAL_MS)).await;
                    }
                }
            }
        }

        if let Some(result) = &condition.script_condition {
            if is_falsey(result) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Falsey iff blank, "false"/"undefined"/"null" (case-insensitive) or
/// numerically zero.
pub(crate) fn is_falsey(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower == "false" || lower == "undefined" || lower == "null" {
        return true;
    }
    matches!(trimmed.parse::<f64>(), Ok(n) if n == 0.0)
}

/// Human-readable condition description for assertion failures.
pub(crate) fn describe_condition(condition: &Condition) -> String {
    let mut parts = Vec::new();
    if let Some(platform) = condition.platform {
        parts.push(format!("platform is {:?}", platform));
    }
    if let Some(selector) = &condition.visible {
        parts.push(format!("visible: {}", describe_selector(selector)));
    }
    if let Some(selector) = &condition.not_visible {
        parts.push(format!("not visible: {}", describe_selector(selector)));
    }
    if let Some(script) = &condition.script_condition {
        parts.push(format!("script result: {}", script));
    }
    if parts.is_empty() {
        "true".to_string()
    } else {
        parts.join(", ")
    }
}

fn describe_selector(selector: &crate::commands::ElementSelector) -> String {
    filter::compile(selector)
        .map(|c| c.description())
        .unwrap_or_else(|_| "<invalid selector>".to_string())
}
