use std::rc::Rc;

use js_sys::Function;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::browser::{BrowserDocument, GlooTimer};
use crate::config::{DispatcherConfig, PanelFlags, PanelSettings};
use crate::dispatcher::Dispatcher;
use crate::relay::{MessageSender, Relay, RelayOutcome};

pub mod browser;
pub mod chrome;
pub mod config;
pub mod dispatcher;
pub mod dom;
pub mod polling;
pub mod protocol;
pub mod relay;
pub mod typing;

#[cfg(test)]
mod testing;

type PageDispatcher = Dispatcher<BrowserDocument, GlooTimer>;

// Initialize WASM module and route logs to the console
#[wasm_bindgen(start)]
pub fn run() -> Result<(), JsValue> {
    #[cfg(debug_assertions)]
    console_error_panic_hook::set_once(); // Better panic messages in browser
    if tracing_wasm::try_set_as_global_default().is_err() {
        web_sys::console::warn_1(&"pagepilot: tracing subscriber already installed".into());
    }
    tracing::info!("pagepilot initialized");
    Ok(())
}

fn page_dispatcher(config: &JsValue) -> Result<PageDispatcher, JsValue> {
    let config = DispatcherConfig::from_value(chrome::to_json(config)?)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(Dispatcher::new(BrowserDocument::new()?, GlooTimer, config))
}

/// Runs one command against the current page and resolves with its response.
#[wasm_bindgen(js_name = handleCommand)]
pub async fn handle_command(message: JsValue, config: JsValue) -> Result<JsValue, JsValue> {
    let dispatcher = page_dispatcher(&config)?;
    let response = dispatcher.handle_message(chrome::to_json(&message)?).await;
    chrome::from_json(&response)
}

/// Content script entry point: answers every runtime message with one response.
#[wasm_bindgen(js_name = startContentScript)]
pub fn start_content_script(config: JsValue) -> Result<(), JsValue> {
    let dispatcher = Rc::new(page_dispatcher(&config)?);

    chrome::add_message_listener(move |message, _sender, send_response: Function| {
        let message = match chrome::to_json(&message) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = ?err, "could not read runtime message");
                return false;
            }
        };
        let dispatcher = Rc::clone(&dispatcher);
        spawn_local(async move {
            let response = dispatcher.handle_message(message).await;
            let reply = chrome::from_json(&response)
                .and_then(|reply| send_response.call1(&JsValue::NULL, &reply));
            if let Err(err) = reply {
                tracing::error!(error = ?err, "failed to send response");
            }
        });
        true
    });

    tracing::info!("content script listening");
    Ok(())
}

/// Background entry point: relays commands from this extension to the active tab.
#[wasm_bindgen(js_name = startBackgroundRelay)]
pub fn start_background_relay() -> Result<(), JsValue> {
    let relay = Rc::new(Relay::new(chrome::runtime_id()?, chrome::ChromeTabs));

    chrome::add_message_listener(move |message, sender, send_response: Function| {
        let sender: MessageSender = chrome::decode(&sender).unwrap_or_default();
        if !relay.is_trusted(&sender) {
            tracing::debug!(sender = ?sender.id, "not relaying foreign message");
            return false;
        }
        let message = match chrome::to_json(&message) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = ?err, "could not read runtime message");
                return false;
            }
        };
        let relay = Rc::clone(&relay);
        spawn_local(async move {
            if let RelayOutcome::Replied(reply) = relay.relay(&sender, message).await {
                let sent = chrome::from_json(&reply)
                    .and_then(|reply| send_response.call1(&JsValue::NULL, &reply));
                if let Err(err) = sent {
                    tracing::error!(error = ?err, "failed to relay response");
                }
            }
        });
        true
    });

    tracing::info!("background relay listening");
    Ok(())
}

/// Initialisation flags for the panel: its own location plus the persisted settings.
#[wasm_bindgen(js_name = loadPanelFlags)]
pub async fn load_panel_flags() -> Result<JsValue, JsValue> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("Failed to get document object"))?;
    let items = chrome::storage_get(&PanelSettings::STORAGE_KEYS).await?;
    let flags = PanelFlags {
        url: document
            .location()
            .map(|location| location.href())
            .transpose()?
            .unwrap_or_default(),
        title: document.title(),
        settings: PanelSettings::from_storage(&items),
    };
    chrome::from_json(&flags)
}
