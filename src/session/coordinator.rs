/// Session-refresh coordinator
///
/// Owns the one authoritative session state of the extension. It runs in the
/// background context only; other contexts learn about it from broadcasts.
///
/// Every trigger (startup, timer, page visibility, explicit request) funnels
/// into [`SessionCoordinator::run`], which collapses concurrent callers onto a
/// single in-flight future. A sign-out bumps the epoch so that a flight still
/// in progress cannot write its result back afterwards.

use super::state::{AuthSnapshot, SessionState};
use crate::auth::{CredentialCell, CredentialExchange, TokenBroker};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::listeners::{ListenerSet, Subscription};
use crate::platform::{Clock, Millis};
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::rc::Rc;

/// Timing rules, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshPolicy {
    pub refresh_interval: Millis,
    pub min_interval: Millis,
    pub retry_delay: Millis,
}

impl From<&SessionConfig> for RefreshPolicy {
    fn from(config: &SessionConfig) -> Self {
        RefreshPolicy {
            refresh_interval: config.refresh_interval_secs * 1000,
            min_interval: config.min_refresh_interval_secs * 1000,
            retry_delay: config.retry_delay_secs * 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Nothing was due, or a refresh ran too recently
    Skipped,
    Completed(AuthSnapshot),
}

type Flight = Shared<LocalBoxFuture<'static, Result<AuthSnapshot>>>;

struct Inner {
    state: SessionState,
    published: AuthSnapshot,
    in_flight: Option<Flight>,
    last_attempt: Option<Millis>,
    last_success: Option<Millis>,
    epoch: u64,
}

struct Core {
    tokens: TokenBroker,
    identity: Rc<dyn CredentialExchange>,
    clock: Rc<dyn Clock>,
    credentials: CredentialCell,
    policy: RefreshPolicy,
    listeners: ListenerSet<AuthSnapshot>,
    inner: RefCell<Inner>,
}

impl Core {
    /// Notify listeners if the public snapshot changed
    fn publish(&self) {
        let snapshot = {
            let mut inner = self.inner.borrow_mut();
            let snapshot = inner.state.snapshot();
            if snapshot == inner.published {
                return;
            }
            inner.published = snapshot.clone();
            snapshot
        };

        debug!("Session status now {:?}", snapshot.status);
        self.listeners.notify(&snapshot);
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.inner.borrow().epoch != epoch
    }

    /// Apply the outcome of a flight unless a sign-out superseded it
    fn settle(&self, epoch: u64, state: SessionState, id_token: Option<String>) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.epoch != epoch {
                debug!("Discarding refresh result from a previous session");
                return false;
            }
            inner.in_flight = None;
            if matches!(state, SessionState::Authenticated { .. }) {
                inner.last_success = Some(self.clock.now());
            }
            info!("Session {} -> {}", inner.state.name(), state.name());
            inner.state = state;
        }

        self.credentials.set(id_token);
        self.publish();
        true
    }
}

#[derive(Clone)]
pub struct SessionCoordinator {
    core: Rc<Core>,
}

impl SessionCoordinator {
    pub fn new(
        tokens: TokenBroker,
        identity: Rc<dyn CredentialExchange>,
        clock: Rc<dyn Clock>,
        credentials: CredentialCell,
        policy: RefreshPolicy,
    ) -> Self {
        SessionCoordinator {
            core: Rc::new(Core {
                tokens,
                identity,
                clock,
                credentials,
                policy,
                listeners: ListenerSet::new(),
                inner: RefCell::new(Inner {
                    state: SessionState::Anonymous,
                    published: AuthSnapshot::logged_out(),
                    in_flight: None,
                    last_attempt: None,
                    last_success: None,
                    epoch: 0,
                }),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.core.inner.borrow().state.clone()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.core.inner.borrow().published.clone()
    }

    /// Listen for snapshot changes. Repeated refreshes of the same user
    /// do not notify.
    pub fn subscribe(&self, listener: impl Fn(&AuthSnapshot) + 'static) -> Subscription {
        self.core.listeners.add(listener)
    }

    pub fn is_refreshing(&self) -> bool {
        self.core.inner.borrow().in_flight.is_some()
    }

    /// Startup: pick up a persisted credential without user interaction
    pub async fn restore(&self) -> Result<AuthSnapshot> {
        self.run(false).await
    }

    /// User-initiated sign-in; may open the provider's consent window
    pub async fn sign_in(&self) -> Result<AuthSnapshot> {
        let pending = self.core.inner.borrow().in_flight.clone();
        if let Some(flight) = pending {
            // Result is read back from the snapshot below
            let _ = flight.await;
        }

        let snapshot = self.snapshot();
        if snapshot.uid().is_some() {
            return Ok(snapshot);
        }
        self.run(true).await
    }

    /// Refresh now, joining a refresh that is already running
    pub async fn refresh(&self) -> Result<AuthSnapshot> {
        self.run(false).await
    }

    /// Refresh unless one started less than the minimum interval ago
    pub async fn request_refresh(&self) -> Result<RefreshOutcome> {
        let now = self.core.clock.now();
        {
            let inner = self.core.inner.borrow();
            if inner.in_flight.is_none() {
                if let Some(last) = inner.last_attempt {
                    if now < last + self.core.policy.min_interval {
                        debug!("Refresh skipped, last attempt {}ms ago", now.saturating_sub(last));
                        return Ok(RefreshOutcome::Skipped);
                    }
                }
            }
        }

        self.run(false).await.map(RefreshOutcome::Completed)
    }

    /// Periodic driver: expires lapsed sessions, refreshes on schedule and
    /// spends the single retry after an error.
    pub async fn tick(&self) -> Result<RefreshOutcome> {
        enum Due {
            Nothing,
            Scheduled,
            Immediately,
        }

        let now = self.core.clock.now();
        let due = {
            let mut inner = self.core.inner.borrow_mut();
            let policy = self.core.policy;
            let expired_user = match &inner.state {
                SessionState::Authenticated { user, expires_at } if now >= *expires_at => {
                    Some(user.clone())
                }
                _ => None,
            };

            if let Some(user) = expired_user {
                info!("Session credential expired");
                inner.state = SessionState::Expired { user };
                Due::Immediately
            } else {
                match &inner.state {
                    SessionState::Authenticated { .. } => {
                        match inner.last_success {
                            Some(at) if now < at + policy.refresh_interval => Due::Nothing,
                            _ => Due::Scheduled,
                        }
                    }
                    SessionState::Expired { .. } => Due::Scheduled,
                    SessionState::Error {
                        retry_at: Some(at), ..
                    } if now >= *at => Due::Immediately,
                    _ => Due::Nothing,
                }
            }
        };

        match due {
            Due::Nothing => Ok(RefreshOutcome::Skipped),
            Due::Scheduled => self.request_refresh().await,
            Due::Immediately => {
                self.core.credentials.set(None);
                self.core.publish();
                self.run(false).await.map(RefreshOutcome::Completed)
            }
        }
    }

    /// Page became visible again; refresh if allowed
    pub async fn on_visibility_change(&self, visible: bool) -> Result<RefreshOutcome> {
        if !visible {
            return Ok(RefreshOutcome::Skipped);
        }
        self.request_refresh().await
    }

    /// Drop the session locally, then revoke the token with the provider
    pub async fn sign_out(&self) -> Result<()> {
        {
            let mut inner = self.core.inner.borrow_mut();
            inner.epoch += 1;
            inner.in_flight = None;
            inner.last_success = None;
            info!("Session {} -> anonymous (sign-out)", inner.state.name());
            inner.state = SessionState::Anonymous;
        }
        self.core.credentials.set(None);
        self.core.publish();

        self.core.tokens.revoke().await
    }

    async fn run(&self, interactive: bool) -> Result<AuthSnapshot> {
        let flight = {
            let mut inner = self.core.inner.borrow_mut();
            match &inner.in_flight {
                Some(flight) => {
                    debug!("Joining in-flight refresh");
                    flight.clone()
                }
                None => {
                    let flight = Self::fly(self.core.clone(), interactive, inner.epoch)
                        .boxed_local()
                        .shared();
                    inner.in_flight = Some(flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    /// Token fetch, then credential exchange. Runs at most once at a time.
    async fn fly(core: Rc<Core>, interactive: bool, epoch: u64) -> Result<AuthSnapshot> {
        let retrying = {
            let mut inner = core.inner.borrow_mut();
            let retrying = matches!(
                inner.state,
                SessionState::Error {
                    retry_at: Some(_),
                    ..
                }
            );
            let previous = inner.state.current_user();
            inner.state = SessionState::Refreshing { previous };
            inner.last_attempt = Some(core.clock.now());
            retrying
        };
        core.publish();

        let token = match core.tokens.acquire(interactive).await {
            Ok(token) => token,
            Err(e) => {
                warn!("No bearer token available: {}", e);
                core.settle(epoch, SessionState::Anonymous, None);
                return Err(e);
            }
        };

        // A sign-out that ran while the token was fetched has already
        // revoked and cleared storage; the token persisted since then must go too
        if core.is_stale(epoch) {
            debug!("Dropping bearer token fetched before sign-out");
            if let Err(e) = core.tokens.discard(&token).await {
                warn!("Failed to drop stale bearer token: {}", e);
            }
            return Ok(core.inner.borrow().published.clone());
        }

        match core.identity.sign_in(&token.access_token).await {
            Ok(session) => {
                let expires_at = core.clock.now() + session.expires_in * 1000;
                let state = SessionState::Authenticated {
                    user: session.user,
                    expires_at,
                };
                core.settle(epoch, state, Some(session.id_token));
                Ok(core.inner.borrow().published.clone())
            }
            Err(e) => {
                warn!("Credential exchange failed: {}", e);
                let retry_at = if retrying {
                    None
                } else {
                    Some(core.clock.now() + core.policy.retry_delay)
                };
                let state = SessionState::Error {
                    message: e.to_string(),
                    retry_at,
                };
                core.settle(epoch, state, None);
                Err(e)
            }
        }
    }
}
