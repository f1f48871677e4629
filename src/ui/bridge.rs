/// Messaging between UI pages and the background worker

use crate::protocol::{Broadcast, Request, Response};
use crate::theme::{ResolvedTheme, ThemePreference};
use log::warn;
use serde::Serialize;
use wasm_bindgen::prelude::*;

// Import JS bridge functions
#[wasm_bindgen(module = "/js/panel_bridge.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn sendMessage(message: JsValue) -> Result<JsValue, JsValue>;

    /// Returns a function that removes the listener
    fn onBroadcast(callback: &js_sys::Function) -> js_sys::Function;

    #[wasm_bindgen(catch)]
    async fn openLabelManager() -> Result<(), JsValue>;
}

/// Send one request and wait for the answer. Error responses come back as `Err`.
pub async fn request(request: &Request) -> Result<Response, String> {
    let message = request
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("Failed to serialize request: {:?}", e))?;

    let reply = sendMessage(message)
        .await
        .map_err(|e| format!("Background unreachable: {:?}", e))?;

    match serde_wasm_bindgen::from_value::<Response>(reply) {
        Ok(Response::Error { message }) => Err(message),
        Ok(response) => Ok(response),
        Err(e) => Err(format!("Failed to parse response: {:?}", e)),
    }
}

pub async fn open_label_manager() -> Result<(), String> {
    openLabelManager()
        .await
        .map_err(|e| format!("Failed to open label manager: {:?}", e))
}

/// Live broadcast listener; stops listening when dropped
pub struct BroadcastListener {
    _callback: Closure<dyn Fn(JsValue)>,
    unsubscribe: js_sys::Function,
}

impl Drop for BroadcastListener {
    fn drop(&mut self) {
        if let Err(e) = self.unsubscribe.call0(&JsValue::NULL) {
            warn!("Failed to remove broadcast listener: {:?}", e);
        }
    }
}

pub fn listen(on_broadcast: impl Fn(Broadcast) + 'static) -> BroadcastListener {
    let callback = Closure::wrap(Box::new(move |message: JsValue| {
        // Other extension traffic shares the channel
        if let Ok(broadcast) = serde_wasm_bindgen::from_value::<Broadcast>(message) {
            on_broadcast(broadcast);
        }
    }) as Box<dyn Fn(JsValue)>);

    let unsubscribe = onBroadcast(callback.as_ref().unchecked_ref());
    BroadcastListener {
        _callback: callback,
        unsubscribe,
    }
}

pub fn prefers_dark() -> bool {
    web_sys::window()
        .and_then(|w| w.match_media("(prefers-color-scheme: dark)").ok().flatten())
        .map(|query| query.matches())
        .unwrap_or(false)
}

/// Reflect the theme on the page root for the stylesheet to pick up
pub fn apply_theme(theme: &ThemePreference) {
    let Some(root) = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.document_element())
    else {
        return;
    };

    let mode = match theme.resolve(prefers_dark()) {
        ResolvedTheme::Light => "light",
        ResolvedTheme::Dark => "dark",
    };
    let style = theme
        .accent
        .as_ref()
        .map(|accent| format!("--label-accent: {}", accent))
        .unwrap_or_default();

    if let Err(e) = root
        .set_attribute("data-theme", mode)
        .and_then(|_| root.set_attribute("style", &style))
    {
        warn!("Failed to apply theme: {:?}", e);
    }
}
