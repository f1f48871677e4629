/// Exports called by the service worker script (`js/service_worker.js`)
///
/// The worker owns exactly one [`Extension`]. Every export returns a
/// `Promise` so the script can hand the result back to `sendResponse`.

use crate::auth::{CredentialCell, HttpIdentityToolkit, HttpOAuthProvider};
use crate::config::ExtensionConfig;
use crate::error::Error;
use crate::extension::{Backends, Extension};
use crate::platform::Platform;
use crate::protocol::{Request, Response};
use crate::session::RefreshOutcome;
use crate::slack::{HttpSlackApi, SlackApi};
use crate::store::HttpDocumentStore;
use js_sys::Promise;
use log::{info, warn};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

thread_local! {
    static EXTENSION: RefCell<Option<Rc<Extension>>> = const { RefCell::new(None) };
}

fn current() -> Result<Rc<Extension>, JsValue> {
    EXTENSION
        .with(|slot| slot.borrow().clone())
        .ok_or_else(|| Error::Bridge("background not initialized".to_string()).into())
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| Error::Serialization(format!("{:?}", e)).into())
}

fn build(config: ExtensionConfig) -> Rc<Extension> {
    let platform = Platform::chrome();
    let credentials = CredentialCell::default();
    let redirect_uri = platform.auth_flow.redirect_url();

    let backends = Backends {
        oauth: Rc::new(HttpOAuthProvider::new(config.oauth.clone())),
        identity: Rc::new(HttpIdentityToolkit::new(config.identity.clone(), redirect_uri)),
        documents: Rc::new(HttpDocumentStore::new(
            &config.documents.base_url,
            credentials.clone(),
        )),
        slack: config
            .slack
            .clone()
            .map(|slack| Rc::new(HttpSlackApi::new(slack)) as Rc<dyn SlackApi>),
        credentials,
    };

    Extension::new(config, platform, backends)
}

/// Build the extension from the packaged config and restore the session.
/// Resolves with the auth snapshot.
#[wasm_bindgen]
pub fn init_background(config: JsValue) -> Promise {
    future_to_promise(async move {
        let config: ExtensionConfig = serde_wasm_bindgen::from_value(config)
            .map_err(|e| Error::Config(format!("{:?}", e)))?;
        config.validate()?;

        let extension = build(config);
        let previous = EXTENSION.with(|slot| slot.borrow_mut().replace(extension.clone()));
        if let Some(previous) = previous {
            warn!("Background re-initialized; dropping previous instance");
            previous.teardown();
        }

        let snapshot = extension.init().await?;
        to_js(&snapshot)
    })
}

/// Answer one request from another context. Malformed requests resolve
/// with an error response rather than rejecting.
#[wasm_bindgen]
pub fn handle_message(message: JsValue) -> Promise {
    future_to_promise(async move {
        let extension = current()?;
        let response = match serde_wasm_bindgen::from_value::<Request>(message) {
            Ok(request) => extension.handle(request).await,
            Err(e) => Response::from(Error::InvalidInput(format!("bad request: {:?}", e))),
        };
        to_js(&response)
    })
}

/// Alarm tick. Resolves with whether a refresh ran.
#[wasm_bindgen]
pub fn on_alarm() -> Promise {
    future_to_promise(async move {
        let extension = current()?;
        let refreshed = match extension.tick().await {
            Ok(RefreshOutcome::Completed(_)) => true,
            Ok(RefreshOutcome::Skipped) => false,
            Err(e) => {
                warn!("Scheduled refresh failed: {}", e);
                false
            }
        };
        Ok(JsValue::from_bool(refreshed))
    })
}

#[wasm_bindgen]
pub fn poll_documents() -> Promise {
    future_to_promise(async move {
        current()?.poll_documents().await?;
        Ok(JsValue::UNDEFINED)
    })
}

#[wasm_bindgen]
pub fn shutdown_background() {
    let extension = EXTENSION.with(|slot| slot.borrow_mut().take());
    if let Some(extension) = extension {
        extension.teardown();
        info!("Background shut down");
    }
}
