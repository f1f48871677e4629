/// In-memory fakes for the platform and provider seams

use crate::auth::{CredentialExchange, OAuthProvider, ProviderSession, TokenGrant, UserIdentity};
use crate::error::{Error, Result};
use crate::platform::{AuthFlow, Clock, KeyValueStore, MessageBus, Millis, Platform};
use crate::protocol::Broadcast;
use crate::slack::{SlackApi, SlackGrant};
use async_trait::async_trait;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use url::Url;

pub const T0: Millis = 1_700_000_000_000;
pub const REDIRECT: &str = "https://extension-id.chromiumapp.org/";

/// Future that returns `Pending` once so other joined futures get polled
pub struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

pub fn yield_now() -> YieldNow {
    YieldNow(false)
}

#[derive(Default)]
pub struct MemoryStorage {
    pub entries: RefCell<HashMap<String, Value>>,
}

#[async_trait(?Send)]
impl KeyValueStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingBus {
    pub sent: RefCell<Vec<Broadcast>>,
}

impl MessageBus for RecordingBus {
    fn broadcast(&self, message: &Broadcast) -> Result<()> {
        self.sent.borrow_mut().push(message.clone());
        Ok(())
    }
}

enum FlowStep {
    Code(String),
    Redirect(String),
    Fail(Error),
}

/// Auth flow that answers launches from a queue. An empty queue
/// behaves like a user who never consented.
#[derive(Default)]
pub struct ScriptedAuthFlow {
    steps: RefCell<VecDeque<FlowStep>>,
    pub launches: RefCell<Vec<(Url, bool)>>,
}

impl ScriptedAuthFlow {
    /// Answer the next launch with `code` and the state it was given
    pub fn push_code(&self, code: &str) {
        self.steps.borrow_mut().push_back(FlowStep::Code(code.to_string()));
    }

    pub fn push_redirect(&self, redirect: &str) {
        self.steps
            .borrow_mut()
            .push_back(FlowStep::Redirect(redirect.to_string()));
    }

    pub fn push_failure(&self, error: Error) {
        self.steps.borrow_mut().push_back(FlowStep::Fail(error));
    }
}

#[async_trait(?Send)]
impl AuthFlow for ScriptedAuthFlow {
    fn redirect_url(&self) -> String {
        REDIRECT.to_string()
    }

    async fn launch(&self, url: &Url, interactive: bool) -> Result<Url> {
        self.launches.borrow_mut().push((url.clone(), interactive));

        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();

        let step = self.steps.borrow_mut().pop_front();
        match step {
            Some(FlowStep::Code(code)) => {
                Ok(Url::parse(&format!("{}?code={}&state={}", REDIRECT, code, state))?)
            }
            Some(FlowStep::Redirect(redirect)) => Ok(Url::parse(&redirect)?),
            Some(FlowStep::Fail(error)) => Err(error),
            None => Err(Error::NotSignedIn),
        }
    }
}

pub struct ManualClock(Cell<Millis>);

impl ManualClock {
    pub fn new(now: Millis) -> Self {
        ManualClock(Cell::new(now))
    }

    pub fn advance_secs(&self, secs: u64) {
        self.0.set(self.0.get() + secs * 1000);
    }

    pub fn set(&self, now: Millis) {
        self.0.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.0.get()
    }
}

/// Handles to every fake behind a `Platform`
pub struct TestPlatform {
    pub storage: Rc<MemoryStorage>,
    pub bus: Rc<RecordingBus>,
    pub flow: Rc<ScriptedAuthFlow>,
    pub clock: Rc<ManualClock>,
}

impl TestPlatform {
    pub fn new() -> Self {
        TestPlatform {
            storage: Rc::new(MemoryStorage::default()),
            bus: Rc::new(RecordingBus::default()),
            flow: Rc::new(ScriptedAuthFlow::default()),
            clock: Rc::new(ManualClock::new(T0)),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            storage: self.storage.clone(),
            bus: self.bus.clone(),
            auth_flow: self.flow.clone(),
            clock: self.clock.clone(),
        }
    }
}

pub struct MockOAuth {
    pub exchanges: Cell<u32>,
    pub refreshes: Cell<u32>,
    pub revoked: RefCell<Vec<String>>,
    pub fail_exchange: Cell<bool>,
    pub fail_refresh: Cell<bool>,
    pub fail_revoke: Cell<bool>,
    pub expires_in: Cell<u64>,
    /// Suspend once inside `refresh` so other futures can interleave
    pub yield_on_refresh: Cell<bool>,
}

impl Default for MockOAuth {
    fn default() -> Self {
        MockOAuth {
            exchanges: Cell::new(0),
            refreshes: Cell::new(0),
            revoked: RefCell::new(Vec::new()),
            fail_exchange: Cell::new(false),
            fail_refresh: Cell::new(false),
            fail_revoke: Cell::new(false),
            expires_in: Cell::new(3600),
            yield_on_refresh: Cell::new(false),
        }
    }
}

#[async_trait(?Send)]
impl OAuthProvider for MockOAuth {
    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<TokenGrant> {
        self.exchanges.set(self.exchanges.get() + 1);
        if self.fail_exchange.get() {
            return Err(Error::Provider("invalid_grant".to_string()));
        }
        Ok(TokenGrant {
            access_token: format!("access-{}", code),
            refresh_token: Some(format!("refresh-{}", code)),
            expires_in: self.expires_in.get(),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.refreshes.set(self.refreshes.get() + 1);
        if self.yield_on_refresh.get() {
            yield_now().await;
        }
        if self.fail_refresh.get() {
            return Err(Error::Provider("invalid_grant".to_string()));
        }
        Ok(TokenGrant {
            access_token: format!("access-from-{}-{}", refresh_token, self.refreshes.get()),
            refresh_token: None,
            expires_in: self.expires_in.get(),
        })
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        self.revoked.borrow_mut().push(token.to_string());
        if self.fail_revoke.get() {
            return Err(Error::Http("offline".to_string()));
        }
        Ok(())
    }
}

pub struct MockIdentity {
    pub calls: Cell<u32>,
    pub fail: Cell<bool>,
    pub uid: RefCell<String>,
    pub expires_in: Cell<u64>,
}

impl Default for MockIdentity {
    fn default() -> Self {
        MockIdentity {
            calls: Cell::new(0),
            fail: Cell::new(false),
            uid: RefCell::new("uid-1".to_string()),
            expires_in: Cell::new(3600),
        }
    }
}

pub fn user(uid: &str) -> UserIdentity {
    UserIdentity {
        uid: uid.to_string(),
        email: format!("{}@example.com", uid),
        email_verified: true,
        display_name: None,
    }
}

#[async_trait(?Send)]
impl CredentialExchange for MockIdentity {
    async fn sign_in(&self, access_token: &str) -> Result<ProviderSession> {
        self.calls.set(self.calls.get() + 1);
        yield_now().await;

        if self.fail.get() {
            return Err(Error::Provider("INVALID_IDP_RESPONSE".to_string()));
        }
        Ok(ProviderSession {
            user: user(&self.uid.borrow()),
            id_token: format!("id-for-{}", access_token),
            expires_in: self.expires_in.get(),
        })
    }
}

#[derive(Default)]
pub struct MockSlack {
    pub posted: RefCell<Vec<(String, String)>>,
    pub fail_post: Cell<bool>,
}

#[async_trait(?Send)]
impl SlackApi for MockSlack {
    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<SlackGrant> {
        Ok(SlackGrant {
            access_token: format!("xoxb-{}", code),
            team_name: Some("Acme".to_string()),
        })
    }

    async fn post_message(&self, _token: &str, channel: &str, text: &str) -> Result<()> {
        if self.fail_post.get() {
            return Err(Error::Slack("channel_not_found".to_string()));
        }
        self.posted
            .borrow_mut()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }
}
