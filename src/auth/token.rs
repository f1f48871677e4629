/// Token broker: authorization-code flow, local persistence, refresh and revoke

use super::authorization_code;
use super::oauth::{OAuthProvider, TokenGrant};
use crate::config::OAuthConfig;
use crate::error::{Error, Result};
use crate::platform::{AuthFlow, Clock, KeyValueStore, Millis, Platform};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use url::Url;
use uuid::Uuid;

/// Storage key for the persisted bearer token
pub const TOKEN_KEY: &str = "auth_token";

/// Bearer token as kept in extension-local storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: Millis,
}

impl StoredToken {
    fn from_grant(grant: TokenGrant, now: Millis, previous_refresh: Option<String>) -> Self {
        StoredToken {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(previous_refresh),
            expires_at: now + grant.expires_in * 1000,
        }
    }

    /// Still usable at `now` with `skew_ms` to spare
    pub fn is_valid_at(&self, now: Millis, skew_ms: Millis) -> bool {
        now + skew_ms < self.expires_at
    }
}

pub struct TokenBroker {
    provider: Rc<dyn OAuthProvider>,
    storage: Rc<dyn KeyValueStore>,
    flow: Rc<dyn AuthFlow>,
    clock: Rc<dyn Clock>,
    config: OAuthConfig,
    skew_ms: Millis,
}

impl TokenBroker {
    pub fn new(
        config: OAuthConfig,
        expiry_skew_secs: u64,
        provider: Rc<dyn OAuthProvider>,
        platform: &Platform,
    ) -> Self {
        TokenBroker {
            provider,
            storage: platform.storage.clone(),
            flow: platform.auth_flow.clone(),
            clock: platform.clock.clone(),
            config,
            skew_ms: expiry_skew_secs * 1000,
        }
    }

    /// Code-flow URL. Only interactive launches ask for consent; a silent
    /// launch that demands a prompt can never complete.
    pub fn authorization_url(&self, state: &str, interactive: bool) -> Result<Url> {
        let mut url = Url::parse(&self.config.auth_endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.flow.redirect_url())
                .append_pair("response_type", "code")
                .append_pair("scope", &self.config.scopes.join(" "))
                .append_pair("access_type", "offline");
            if interactive {
                query.append_pair("prompt", "consent");
            }
            query.append_pair("state", state);
        }
        Ok(url)
    }

    /// Whatever token is in storage, expired or not
    pub async fn stored(&self) -> Result<Option<StoredToken>> {
        let Some(value) = self.storage.get(TOKEN_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!("Discarding unreadable stored token: {}", e);
                self.storage.remove(TOKEN_KEY).await?;
                Ok(None)
            }
        }
    }

    /// A stored token that is still valid beyond the expiry skew
    pub async fn cached(&self) -> Result<Option<StoredToken>> {
        let now = self.clock.now();
        Ok(self
            .stored()
            .await?
            .filter(|token| token.is_valid_at(now, self.skew_ms)))
    }

    /// Produce a usable bearer token: the cached one, a refreshed one, or
    /// one from the identity flow (silent unless `interactive`).
    pub async fn acquire(&self, interactive: bool) -> Result<StoredToken> {
        let now = self.clock.now();
        let stored = self.stored().await?;

        if let Some(token) = &stored {
            if token.is_valid_at(now, self.skew_ms) {
                return Ok(token.clone());
            }
        }

        if let Some(refresh_token) = stored.and_then(|t| t.refresh_token) {
            match self.provider.refresh(&refresh_token).await {
                Ok(grant) => {
                    let token = StoredToken::from_grant(grant, self.clock.now(), Some(refresh_token));
                    self.persist(&token).await?;
                    debug!("Bearer token refreshed");
                    return Ok(token);
                }
                Err(e) => {
                    warn!("Token refresh failed, clearing stored token: {}", e);
                    self.storage.remove(TOKEN_KEY).await?;
                    if !interactive {
                        return Err(e);
                    }
                }
            }
        }

        self.run_flow(interactive).await
    }

    async fn run_flow(&self, interactive: bool) -> Result<StoredToken> {
        let state = Uuid::new_v4().to_string();
        let url = self.authorization_url(&state, interactive)?;

        let redirect = self.flow.launch(&url, interactive).await.map_err(|e| {
            if interactive {
                e
            } else {
                Error::NotSignedIn
            }
        })?;
        let code = authorization_code(&redirect, &state)?;

        let grant = self
            .provider
            .exchange_code(&code, &self.flow.redirect_url())
            .await?;
        let token = StoredToken::from_grant(grant, self.clock.now(), None);
        self.persist(&token).await?;

        info!("Obtained bearer token via identity flow");
        Ok(token)
    }

    async fn persist(&self, token: &StoredToken) -> Result<()> {
        self.storage
            .set(TOKEN_KEY, serde_json::to_value(token)?)
            .await
    }

    /// Forget `token` unless storage already holds a different one
    pub async fn discard(&self, token: &StoredToken) -> Result<()> {
        if self.stored().await?.as_ref() == Some(token) {
            self.storage.remove(TOKEN_KEY).await?;
        }
        Ok(())
    }

    /// Revoke with the provider (best-effort) and forget the token
    pub async fn revoke(&self) -> Result<()> {
        if let Some(token) = self.stored().await? {
            let target = token.refresh_token.as_deref().unwrap_or(&token.access_token);
            if let Err(e) = self.provider.revoke(target).await {
                warn!("Token revocation failed: {}", e);
            }
        }
        self.storage.remove(TOKEN_KEY).await
    }
}
