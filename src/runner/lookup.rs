//! Timed element lookup.
//!
//! Polls the driver's view hierarchy until the compiled selector matches or
//! the deadline is reached. Timeouts are decremented by the time elapsed
//! since the last mutating interaction, so a chain of fast commands on a
//! settled screen does not accumulate full lookup timeouts.

use std::time::{Duration, Instant};

use super::orchestra::Orchestra;
use crate::commands::ElementSelector;
use crate::driver::hierarchy::{UiElement, ViewHierarchy};
use crate::errors::{OrchestraError, OrchestraResult};
use crate::filter;

pub(crate) const LOOKUP_POLL_INTERVAL_MS: u64 = 200;

/// `adjusted = max(0, base - elapsed_since_last_interaction)`
pub(crate) fn adjusted_timeout_ms(base_ms: u64, last_interaction: Instant) -> u64 {
    base_ms.saturating_sub(last_interaction.elapsed().as_millis() as u64)
}

impl Orchestra {
    /// Find an element matching `selector`, polling until the adjusted
    /// timeout expires. An exhausted timeout still performs one check.
    pub(crate) async fn find_element(
        &mut self,
        selector: &ElementSelector,
        timeout_ms: Option<u64>,
    ) -> OrchestraResult<(UiElement, ViewHierarchy)> {
        let base = timeout_ms.unwrap_or(if selector.optional {
            self.optional_lookup_timeout_ms
        } else {
            self.lookup_timeout_ms
        });
        let timeout = adjusted_timeout_ms(base, self.last_interaction);
        let compiled = filter::compile(selector)?;
        let deadline = Instant::now() + Duration::from_millis(timeout);

        loop {
            let hierarchy = self.driver.view_hierarchy().await?;
            if let Some(node) = compiled.match_in(&hierarchy) {
                tracing::debug!(description = %compiled.description(), "element matched");
                return Ok((UiElement::from_node(node), hierarchy));
            }
            if Instant::now() >= deadline {
                tracing::debug!(
                    description = %compiled.description(),
                    timeout_ms = timeout,
                    "element lookup timed out"
                );
                return Err(OrchestraError::ElementNotFound {
                    description: compiled.description(),
                    hierarchy,
                });
            }
            tokio::time::sleep(Duration::from_millis(LOOKUP_POLL_INTERVAL_MS)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjusted_timeout_subtracts_elapsed() {
        let last = Instant::now()
            .checked_sub(Duration::from_millis(300))
            .unwrap();
        let adjusted = adjusted_timeout_ms(1000, last);
        assert!(adjusted <= 700, "adjusted {} should be <= 700", adjusted);
        assert!(adjusted > 600, "adjusted {} should be > 600", adjusted);
    }

    #[test]
    fn test_adjusted_timeout_floors_at_zero() {
        let last = Instant::now()
            .checked_sub(Duration::from_millis(5000))
            .unwrap();
        assert_eq!(adjusted_timeout_ms(1000, last), 0);
    }

    #[test]
    fn test_fresh_interaction_keeps_full_timeout() {
        let adjusted = adjusted_timeout_ms(1000, Instant::now());
        assert!(adjusted >= 999);
    }
}
