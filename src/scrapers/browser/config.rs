//! Browser engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Page steps each bounded by `timeout`: navigation, ready state, selector
/// wait, reply expansion and reading the DOM.
const RENDER_STEPS: u32 = 5;

/// Browser engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    /// Set to false for debugging or if headless detection is an issue.
    pub headless: bool,

    /// Page load timeout in seconds.
    pub timeout: u64,

    /// Wait for this CSS selector before expanding replies.
    pub wait_for_selector: Option<String>,

    /// Maximum rounds of clicking collapsed-reply toggles per page.
    pub max_expand_rounds: u32,

    /// Pause after each expansion round, in milliseconds.
    pub expand_delay_ms: u64,

    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    pub remote_url: Option<String>,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: true,
            timeout: 30,
            wait_for_selector: Some("#wpd-threads".to_string()),
            max_expand_rounds: 10,
            expand_delay_ms: 500,
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

impl BrowserEngineConfig {
    /// Bound on a single page step.
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Upper bound on rendering one page once its tab is open.
    pub fn render_budget(&self) -> Duration {
        self.step_timeout().saturating_mul(RENDER_STEPS)
    }

    /// Render budget plus one step for launching the browser and opening a tab.
    pub fn attempt_budget(&self) -> Duration {
        self.step_timeout().saturating_mul(RENDER_STEPS + 1)
    }
}
