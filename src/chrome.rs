//! Thin bindings to the `chrome.*` extension APIs and JSON conversion at the
//! JS boundary.

use futures::future::{FutureExt, LocalBoxFuture};
use js_sys::{Array, Function, Object, Promise, Reflect};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::relay::{RelayError, TabId, TabMessenger};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onMessage"], js_name = addListener)]
    fn on_message_add_listener(callback: &Function);

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = query)]
    fn tabs_query(query_info: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = sendMessage)]
    fn tabs_send_message(tab_id: i32, message: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = get)]
    fn storage_local_get(keys: &JsValue) -> Result<Promise, JsValue>;
}

/// Converts a JS value to JSON via `JSON.stringify`.
pub fn to_json(value: &JsValue) -> Result<Value, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    let text: String = js_sys::JSON::stringify(value)?.into();
    serde_json::from_str(&text).map_err(|e| JsValue::from_str(&e.to_string()))
}

pub fn from_json<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let text = serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&text)
}

pub fn decode<T: DeserializeOwned>(value: &JsValue) -> Result<T, JsValue> {
    serde_json::from_value(to_json(value)?).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn chrome_object(path: &[&str]) -> Result<JsValue, JsValue> {
    let mut current: JsValue = js_sys::global().into();
    for key in ["chrome"].iter().chain(path) {
        current = Reflect::get(&current, &JsValue::from_str(key))?;
        if current.is_undefined() {
            return Err(JsValue::from_str(&format!("chrome API '{}' is unavailable", key)));
        }
    }
    Ok(current)
}

/// `chrome.runtime.id` of this extension.
pub fn runtime_id() -> Result<String, JsValue> {
    chrome_object(&["runtime", "id"])?
        .as_string()
        .ok_or_else(|| JsValue::from_str("chrome.runtime.id is not a string"))
}

/// Registers a `chrome.runtime.onMessage` listener for the lifetime of the
/// page. The handler's return value tells Chrome whether `sendResponse` will
/// be called asynchronously.
pub fn add_message_listener<F>(handler: F)
where
    F: FnMut(JsValue, JsValue, Function) -> bool + 'static,
{
    let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(JsValue, JsValue, Function) -> bool>);
    on_message_add_listener(closure.as_ref().unchecked_ref());
    closure.forget();
}

/// Reads `keys` from `chrome.storage.local`.
pub async fn storage_get(keys: &[&str]) -> Result<Value, JsValue> {
    let keys: Array = keys.iter().map(|key| JsValue::from_str(key)).collect();
    let items = JsFuture::from(storage_local_get(&keys)?).await?;
    to_json(&items)
}

/// Tab access through `chrome.tabs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeTabs;

fn relay_error_message(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| err.dyn_ref::<js_sys::Error>().map(|e| String::from(e.message())))
        .or_else(|| {
            Reflect::get(err, &JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| "Unknown error".to_string())
}

impl ChromeTabs {
    async fn query_active(&self) -> Result<Vec<TabId>, RelayError> {
        let query = Object::new();
        let set = |key: &str| Reflect::set(&query, &JsValue::from_str(key), &JsValue::TRUE);
        set("active")
            .and_then(|_| set("currentWindow"))
            .map_err(|e| RelayError::TabQuery(relay_error_message(&e)))?;

        let promise = tabs_query(&query).map_err(|e| RelayError::TabQuery(relay_error_message(&e)))?;
        let tabs = JsFuture::from(promise)
            .await
            .map_err(|e| RelayError::TabQuery(relay_error_message(&e)))?;

        Ok(Array::from(&tabs)
            .iter()
            .filter_map(|tab| Reflect::get(&tab, &JsValue::from_str("id")).ok())
            .filter_map(|id| id.as_f64())
            .map(|id| TabId(id as i32))
            .collect())
    }

    async fn send(&self, tab: TabId, message: &Value) -> Result<Value, RelayError> {
        let send_error = |e: JsValue| RelayError::Send {
            tab: tab.0,
            message: relay_error_message(&e),
        };
        let message = from_json(message).map_err(send_error)?;
        let promise = tabs_send_message(tab.0, &message).map_err(send_error)?;
        let reply = JsFuture::from(promise).await.map_err(send_error)?;
        to_json(&reply).map_err(send_error)
    }
}

impl TabMessenger for ChromeTabs {
    fn active_tabs(&self) -> LocalBoxFuture<'_, Result<Vec<TabId>, RelayError>> {
        self.query_active().boxed_local()
    }

    fn send_to_tab<'a>(
        &'a self,
        tab: TabId,
        message: &'a Value,
    ) -> LocalBoxFuture<'a, Result<Value, RelayError>> {
        self.send(tab, message).boxed_local()
    }
}
