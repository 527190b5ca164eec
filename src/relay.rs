//! Background relay: forwards commands from the extension's own pages to the
//! content script of the active tab and hands the tab's reply back.

use futures::future::LocalBoxFuture;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::protocol::Response;

pub const NO_ACTIVE_TAB: &str = "No active tab";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabId(pub i32);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelayError {
    #[error("Tab query failed: {0}")]
    TabQuery(String),
    #[error("Sending to tab {tab} failed: {message}")]
    Send { tab: i32, message: String },
}

/// Who sent a runtime message, as reported by `chrome.runtime.onMessage`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MessageSender {
    /// Id of the sending extension.
    pub id: Option<String>,
    pub url: Option<String>,
}

/// Access to the browser's tabs.
pub trait TabMessenger {
    /// Tabs that are active in the current window.
    fn active_tabs(&self) -> LocalBoxFuture<'_, Result<Vec<TabId>, RelayError>>;

    /// Sends `message` to the content script in `tab` and resolves with its reply.
    fn send_to_tab<'a>(
        &'a self,
        tab: TabId,
        message: &'a Value,
    ) -> LocalBoxFuture<'a, Result<Value, RelayError>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// The sender is not this extension; nothing was forwarded.
    Ignored,
    /// Reply to hand back to the sender.
    Replied(Value),
}

pub struct Relay<T> {
    extension_id: String,
    tabs: T,
}

impl<T: TabMessenger> Relay<T> {
    pub fn new(extension_id: impl Into<String>, tabs: T) -> Self {
        Relay {
            extension_id: extension_id.into(),
            tabs,
        }
    }

    pub fn tabs(&self) -> &T {
        &self.tabs
    }

    pub fn is_trusted(&self, sender: &MessageSender) -> bool {
        sender.id.as_deref() == Some(self.extension_id.as_str())
    }

    pub async fn relay(&self, sender: &MessageSender, message: Value) -> RelayOutcome {
        if !self.is_trusted(sender) {
            warn!(sender = ?sender.id, "ignoring message from foreign sender");
            return RelayOutcome::Ignored;
        }
        match self.forward(&message).await {
            Ok(reply) => {
                debug!(%reply, "tab replied");
                RelayOutcome::Replied(reply)
            }
            Err(reply) => RelayOutcome::Replied(reply.to_value()),
        }
    }

    async fn forward(&self, message: &Value) -> Result<Value, Response> {
        let tabs = self.tabs.active_tabs().await.map_err(|e| {
            error!(error = %e, "could not query active tab");
            Response::failed(e.to_string())
        })?;
        let Some(&tab) = tabs.first() else {
            warn!("no active tab to forward to");
            return Err(Response::failed(NO_ACTIVE_TAB));
        };
        info!(tab_id = tab.0, command_type = ?message.get("type"), "forwarding command");
        self.tabs.send_to_tab(tab, message).await.map_err(|e| {
            error!(tab_id = tab.0, error = %e, "forwarding failed");
            Response::failed(e.to_string())
        })
    }
}
