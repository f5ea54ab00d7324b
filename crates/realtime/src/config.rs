//! Session configuration.

use std::time::Duration;

/// Configuration for a sync session.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Base URL of the realtime channel endpoint, e.g. `ws://localhost:8080`.
    pub ws_base: String,
    /// Quiet period after the last local change before an `edit` frame is
    /// broadcast.
    pub edit_debounce: Duration,
    /// Quiet period after the last local change before a durable save is
    /// attempted.
    pub autosave_delay: Duration,
    /// Delay before the first reconnect attempt; doubles on each retry.
    pub base_reconnect_delay: Duration,
    /// Maximum number of automatic reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// How long the "Saved" status lingers before clearing.
    pub saved_notice: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_base: "ws://localhost:8080".to_string(),
            edit_debounce: Duration::from_millis(500),
            autosave_delay: Duration::from_millis(3000),
            base_reconnect_delay: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
            saved_notice: Duration::from_millis(2000),
        }
    }
}

impl SyncConfig {
    /// Create a configuration for the given channel endpoint.
    pub fn new(ws_base: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into(),
            ..Default::default()
        }
    }

    /// Set the edit broadcast debounce.
    pub fn with_edit_debounce(mut self, debounce: Duration) -> Self {
        self.edit_debounce = debounce;
        self
    }

    /// Set the autosave delay.
    pub fn with_autosave_delay(mut self, delay: Duration) -> Self {
        self.autosave_delay = delay;
        self
    }

    /// Set the base reconnect delay.
    pub fn with_base_reconnect_delay(mut self, delay: Duration) -> Self {
        self.base_reconnect_delay = delay;
        self
    }

    /// Set the reconnect attempt cap.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = SyncConfig::default();
        assert_eq!(config.edit_debounce, Duration::from_millis(500));
        assert_eq!(config.autosave_delay, Duration::from_millis(3000));
        assert_eq!(config.base_reconnect_delay, Duration::from_millis(1000));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.saved_notice, Duration::from_millis(2000));
    }

    #[test]
    fn test_builders() {
        let config = SyncConfig::new("ws://example:9000")
            .with_edit_debounce(Duration::from_millis(100))
            .with_max_reconnect_attempts(2);

        assert_eq!(config.ws_base, "ws://example:9000");
        assert_eq!(config.edit_debounce, Duration::from_millis(100));
        assert_eq!(config.max_reconnect_attempts, 2);
    }
}
