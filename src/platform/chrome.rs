/// Chrome implementations of the platform traits, backed by JS glue

use super::{AuthFlow, Clock, KeyValueStore, MessageBus, Millis};
use crate::error::{Error, Result};
use crate::protocol::Broadcast;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use url::Url;
use wasm_bindgen::prelude::*;

// Import JS bridge functions
#[wasm_bindgen(module = "/js/chrome_bridge.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn storageGet(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageSet(key: &str, value: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageRemove(key: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn broadcastMessage(message: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn launchWebAuthFlow(url: &str, interactive: bool) -> Result<JsValue, JsValue>;

    fn getRedirectURL() -> String;
}

fn bridge_error(call: &str, error: JsValue) -> Error {
    Error::Bridge(format!("{}: {:?}", call, error))
}

/// `chrome.storage.local`
pub struct ChromeStorage;

#[async_trait(?Send)]
impl KeyValueStore for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let value = storageGet(key)
            .await
            .map_err(|e| bridge_error("storageGet", e))?;

        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }

        serde_wasm_bindgen::from_value(value)
            .map(Some)
            .map_err(|e| Error::Serialization(format!("stored {}: {:?}", key, e)))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let value = value
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| Error::Serialization(format!("{:?}", e)))?;

        storageSet(key, value)
            .await
            .map_err(|e| bridge_error("storageSet", e))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        storageRemove(key)
            .await
            .map_err(|e| bridge_error("storageRemove", e))
    }
}

/// `chrome.runtime.sendMessage` fan-out
pub struct ChromeBus;

impl MessageBus for ChromeBus {
    fn broadcast(&self, message: &Broadcast) -> Result<()> {
        let message = message
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| Error::Serialization(format!("{:?}", e)))?;

        broadcastMessage(message).map_err(|e| bridge_error("broadcastMessage", e))
    }
}

/// `chrome.identity.launchWebAuthFlow`
pub struct ChromeAuthFlow;

#[async_trait(?Send)]
impl AuthFlow for ChromeAuthFlow {
    fn redirect_url(&self) -> String {
        getRedirectURL()
    }

    async fn launch(&self, url: &Url, interactive: bool) -> Result<Url> {
        let redirect = launchWebAuthFlow(url.as_str(), interactive)
            .await
            .map_err(|e| {
                if interactive {
                    bridge_error("launchWebAuthFlow", e)
                } else {
                    Error::NotSignedIn
                }
            })?;

        let redirect = redirect
            .as_string()
            .ok_or_else(|| Error::Bridge("launchWebAuthFlow returned no URL".to_string()))?;

        Ok(Url::parse(&redirect)?)
    }
}

pub struct BrowserClock;

impl Clock for BrowserClock {
    fn now(&self) -> Millis {
        js_sys::Date::now() as Millis
    }
}
