//! Settings for the content script and the panel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Delay between simulated keystrokes, in milliseconds.
pub const DEFAULT_TYPING_DELAY_MS: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Tuning for the command dispatcher. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatcherConfig {
    pub typing_delay_ms: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            typing_delay_ms: DEFAULT_TYPING_DELAY_MS,
        }
    }
}

impl DispatcherConfig {
    /// Reads overrides passed from JS; `null` means all defaults.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        if value.is_null() {
            return Ok(DispatcherConfig::default());
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// The strings the panel persists in `chrome.storage.local`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PanelSettings {
    pub stream_key: String,
    pub server_url: String,
    pub live_streaming_page_url: String,
}

impl PanelSettings {
    /// Storage keys to request.
    pub const STORAGE_KEYS: [&'static str; 3] = ["streamKey", "serverUrl", "liveStreamingPageUrl"];

    /// Builds settings from a storage lookup result. Keys that were never
    /// stored, or were stored as something other than a string, read as empty.
    pub fn from_storage(items: &Value) -> Self {
        let read = |key: &str| {
            items
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        PanelSettings {
            stream_key: read("streamKey"),
            server_url: read("serverUrl"),
            live_streaming_page_url: read("liveStreamingPageUrl"),
        }
    }
}

/// Everything the panel is initialised with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelFlags {
    pub url: String,
    pub title: String,
    #[serde(flatten)]
    pub settings: PanelSettings,
}
