/// Optional Slack integration: OAuth v2 install flow and message posting

use crate::auth::authorization_code;
use crate::config::SlackConfig;
use crate::error::{Error, Result};
use crate::platform::{AuthFlow, KeyValueStore, Platform};
use crate::profiles::ProfileRecord;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::rc::Rc;
use url::Url;
use uuid::Uuid;

/// Storage key for the persisted Slack grant
pub const SLACK_TOKEN_KEY: &str = "slack_token";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackGrant {
    pub access_token: String,
    #[serde(default)]
    pub team_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackStatus {
    pub configured: bool,
    pub connected: bool,
    #[serde(default)]
    pub team_name: Option<String>,
}

#[async_trait(?Send)]
pub trait SlackApi {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<SlackGrant>;
    async fn post_message(&self, token: &str, channel: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct SlackTeam {
    name: String,
}

/// Every Slack Web API reply carries `ok`, plus `error` when it is false
#[derive(Debug, Deserialize)]
struct SlackReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    team: Option<SlackTeam>,
}

impl SlackReply {
    fn checked(self) -> Result<Self> {
        if self.ok {
            Ok(self)
        } else {
            Err(Error::Slack(
                self.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

pub struct HttpSlackApi {
    client: reqwest::Client,
    config: SlackConfig,
}

impl HttpSlackApi {
    pub fn new(config: SlackConfig) -> Self {
        HttpSlackApi {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), method)
    }
}

#[async_trait(?Send)]
impl SlackApi for HttpSlackApi {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<SlackGrant> {
        debug!("Exchanging Slack authorization code");
        let reply: SlackReply = self
            .client
            .post(self.method_url("oauth.v2.access"))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?
            .json()
            .await?;

        let reply = reply.checked()?;
        let access_token = reply
            .access_token
            .ok_or_else(|| Error::Slack("reply carried no access_token".to_string()))?;

        Ok(SlackGrant {
            access_token,
            team_name: reply.team.map(|t| t.name),
        })
    }

    async fn post_message(&self, token: &str, channel: &str, text: &str) -> Result<()> {
        let reply: SlackReply = self
            .client
            .post(self.method_url("chat.postMessage"))
            .bearer_auth(token)
            .json(&json!({ "channel": channel, "text": text }))
            .send()
            .await?
            .json()
            .await?;

        reply.checked().map(|_| ())
    }
}

/// Slack mrkdwn for a shared profile
pub fn profile_message(profile_url: &str, record: Option<&ProfileRecord>, labels: &[String]) -> String {
    let mut message = match record {
        Some(record) => format!("<{}|{}>", profile_url, record.name),
        None => format!("<{}>", profile_url),
    };
    if !labels.is_empty() {
        message.push_str(&format!("\nLabels: {}", labels.join(", ")));
    }
    message
}

pub struct SlackIntegration {
    api: Rc<dyn SlackApi>,
    storage: Rc<dyn KeyValueStore>,
    flow: Rc<dyn AuthFlow>,
    config: SlackConfig,
}

impl SlackIntegration {
    pub fn new(config: SlackConfig, api: Rc<dyn SlackApi>, platform: &Platform) -> Self {
        SlackIntegration {
            api,
            storage: platform.storage.clone(),
            flow: platform.auth_flow.clone(),
            config,
        }
    }

    pub fn authorize_url(&self, state: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.authorize_endpoint)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("scope", &self.config.scopes.join(","))
            .append_pair("redirect_uri", &self.flow.redirect_url())
            .append_pair("state", state);
        Ok(url)
    }

    async fn grant(&self) -> Result<Option<SlackGrant>> {
        let Some(value) = self.storage.get(SLACK_TOKEN_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(grant) => Ok(Some(grant)),
            Err(e) => {
                warn!("Discarding unreadable Slack grant: {}", e);
                self.storage.remove(SLACK_TOKEN_KEY).await?;
                Ok(None)
            }
        }
    }

    pub async fn status(&self) -> Result<SlackStatus> {
        let grant = self.grant().await?;
        Ok(SlackStatus {
            configured: true,
            connected: grant.is_some(),
            team_name: grant.and_then(|g| g.team_name),
        })
    }

    pub async fn is_connected(&self) -> Result<bool> {
        Ok(self.grant().await?.is_some())
    }

    /// Run the install flow in a popup and keep the resulting token
    pub async fn connect(&self) -> Result<SlackStatus> {
        let state = Uuid::new_v4().to_string();
        let url = self.authorize_url(&state)?;

        let redirect = self.flow.launch(&url, true).await?;
        let code = authorization_code(&redirect, &state)?;
        let grant = self
            .api
            .exchange_code(&code, &self.flow.redirect_url())
            .await?;

        self.storage
            .set(SLACK_TOKEN_KEY, serde_json::to_value(&grant)?)
            .await?;
        info!(
            "Connected to Slack workspace {}",
            grant.team_name.as_deref().unwrap_or("(unnamed)")
        );
        self.status().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.storage.remove(SLACK_TOKEN_KEY).await
    }

    /// Post to `channel`, or to the configured default channel
    pub async fn send_message(&self, channel: Option<&str>, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("message is empty".to_string()));
        }
        let grant = self.grant().await?.ok_or(Error::SlackNotConnected)?;
        let channel = channel
            .filter(|c| !c.trim().is_empty())
            .or(self.config.default_channel.as_deref())
            .ok_or_else(|| Error::InvalidInput("no Slack channel given".to_string()))?;

        self.api
            .post_message(&grant.access_token, channel, text)
            .await?;
        debug!("Posted Slack message to {}", channel);
        Ok(())
    }

    pub async fn share_profile(
        &self,
        profile_url: &str,
        record: Option<&ProfileRecord>,
        labels: &[String],
        channel: Option<&str>,
    ) -> Result<()> {
        let text = profile_message(profile_url, record, labels);
        self.send_message(channel, &text).await
    }
}
