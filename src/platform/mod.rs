/// Browser platform seams: local storage, the cross-context message bus,
/// the identity redirect flow and wall-clock time.

mod chrome;

pub use chrome::{BrowserClock, ChromeAuthFlow, ChromeBus, ChromeStorage};

use crate::error::Result;
use crate::protocol::Broadcast;
use async_trait::async_trait;
use serde_json::Value;
use std::rc::Rc;
use url::Url;

/// Milliseconds since the Unix epoch
pub type Millis = u64;

/// Extension-local key-value storage (`chrome.storage.local`)
#[async_trait(?Send)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Fire-and-forget fan-out to every other execution context.
/// Delivery and ordering are not guaranteed.
pub trait MessageBus {
    fn broadcast(&self, message: &Broadcast) -> Result<()>;
}

/// The platform's web-auth flow (`chrome.identity.launchWebAuthFlow`)
#[async_trait(?Send)]
pub trait AuthFlow {
    /// Redirect URL registered for this extension with OAuth providers
    fn redirect_url(&self) -> String;

    /// Open `url` and resolve with the final redirect URL
    async fn launch(&self, url: &Url, interactive: bool) -> Result<Url>;
}

pub trait Clock {
    fn now(&self) -> Millis;
}

/// Everything a service needs from the hosting browser context
#[derive(Clone)]
pub struct Platform {
    pub storage: Rc<dyn KeyValueStore>,
    pub bus: Rc<dyn MessageBus>,
    pub auth_flow: Rc<dyn AuthFlow>,
    pub clock: Rc<dyn Clock>,
}

impl Platform {
    /// Chrome-backed platform for the background service worker
    pub fn chrome() -> Platform {
        Platform {
            storage: Rc::new(ChromeStorage),
            bus: Rc::new(ChromeBus),
            auth_flow: Rc::new(ChromeAuthFlow),
            clock: Rc::new(BrowserClock),
        }
    }
}
