/// Extension configuration loaded from the packaged `config.json`

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

const MINUTE_SECS: u64 = 60;

/// Root configuration handed to the background worker at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    pub oauth: OAuthConfig,
    pub identity: IdentityConfig,
    pub documents: DocumentStoreConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
}

/// OAuth client used for the authorization-code flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_endpoint")]
    pub auth_endpoint: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_revoke_endpoint")]
    pub revoke_endpoint: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

/// Hosted identity provider that turns a bearer token into a signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub api_key: String,
    #[serde(default = "default_identity_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
    pub base_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Attempts per compare-and-swap update before giving up
    #[serde(default = "default_max_update_attempts")]
    pub max_update_attempts: u32,
}

/// Timing for the session coordinator. All values in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub refresh_interval_secs: u64,
    pub min_refresh_interval_secs: u64,
    pub retry_delay_secs: u64,
    pub expiry_skew_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            refresh_interval_secs: 50 * MINUTE_SECS,
            min_refresh_interval_secs: MINUTE_SECS,
            retry_delay_secs: 30,
            expiry_skew_secs: 5 * MINUTE_SECS,
        }
    }
}

/// Host site details the profile observer relies on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Path segment that precedes the profile slug, e.g. `in` for `/in/jane-doe/`
    pub profile_path_segment: String,
    pub profile_base_url: String,
    /// Re-write an unchanged profile record once it is older than this
    pub profile_refresh_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            profile_path_segment: "in".to_string(),
            profile_base_url: "https://www.linkedin.com/in/".to_string(),
            profile_refresh_secs: 7 * 24 * 60 * MINUTE_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
    #[serde(default = "default_slack_authorize_endpoint")]
    pub authorize_endpoint: String,
    #[serde(default = "default_slack_scopes")]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub default_channel: Option<String>,
}

fn default_auth_endpoint() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_endpoint() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_revoke_endpoint() -> String {
    "https://oauth2.googleapis.com/revoke".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "email".to_string(), "profile".to_string()]
}

fn default_identity_endpoint() -> String {
    "https://identitytoolkit.googleapis.com/v1".to_string()
}

fn default_provider_id() -> String {
    "google.com".to_string()
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_max_update_attempts() -> u32 {
    5
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_slack_authorize_endpoint() -> String {
    "https://slack.com/oauth/v2/authorize".to_string()
}

fn default_slack_scopes() -> Vec<String> {
    vec!["chat:write".to_string()]
}

impl ExtensionConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ExtensionConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("unreadable config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(Error::Config("oauth.client_id is empty".to_string()));
        }
        if self.identity.api_key.trim().is_empty() {
            return Err(Error::Config("identity.api_key is empty".to_string()));
        }
        if self.documents.base_url.trim().is_empty() {
            return Err(Error::Config("documents.base_url is empty".to_string()));
        }
        if self.documents.max_update_attempts == 0 {
            return Err(Error::Config(
                "documents.max_update_attempts must be at least 1".to_string(),
            ));
        }

        let refresh = self.session.refresh_interval_secs;
        if !(45 * MINUTE_SECS..=55 * MINUTE_SECS).contains(&refresh) {
            return Err(Error::Config(format!(
                "session.refresh_interval_secs must be between 2700 and 3300, got {}",
                refresh
            )));
        }
        if self.session.min_refresh_interval_secs >= refresh {
            return Err(Error::Config(
                "session.min_refresh_interval_secs must be below the refresh interval".to_string(),
            ));
        }

        if self.site.profile_path_segment.trim().is_empty() {
            return Err(Error::Config("site.profile_path_segment is empty".to_string()));
        }

        if let Some(slack) = &self.slack {
            if slack.client_id.trim().is_empty() {
                return Err(Error::Config("slack.client_id is empty".to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ExtensionConfig {
    ExtensionConfig {
        oauth: OAuthConfig {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            auth_endpoint: default_auth_endpoint(),
            token_endpoint: default_token_endpoint(),
            revoke_endpoint: default_revoke_endpoint(),
            scopes: default_scopes(),
        },
        identity: IdentityConfig {
            api_key: "api-key".to_string(),
            endpoint: default_identity_endpoint(),
            provider_id: default_provider_id(),
        },
        documents: DocumentStoreConfig {
            base_url: "https://docs.example.test".to_string(),
            poll_interval_secs: default_poll_interval_secs(),
            max_update_attempts: default_max_update_attempts(),
        },
        session: SessionConfig::default(),
        site: SiteConfig::default(),
        slack: Some(SlackConfig {
            client_id: "slack-client".to_string(),
            client_secret: "slack-secret".to_string(),
            api_base: default_slack_api_base(),
            authorize_endpoint: default_slack_authorize_endpoint(),
            scopes: default_slack_scopes(),
            default_channel: Some("#leads".to_string()),
        }),
    }
}
