/// Identity-provider sign-in with an OAuth bearer token

use crate::config::IdentityConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Verified identity as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Result of exchanging a bearer token for a provider credential
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSession {
    pub user: UserIdentity,
    pub id_token: String,
    /// Lifetime of `id_token` in seconds
    pub expires_in: u64,
}

#[async_trait(?Send)]
pub trait CredentialExchange {
    async fn sign_in(&self, access_token: &str) -> Result<ProviderSession>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl TryFrom<SignInResponse> for ProviderSession {
    type Error = Error;

    fn try_from(response: SignInResponse) -> Result<Self> {
        let expires_in = response
            .expires_in
            .parse::<u64>()
            .map_err(|_| Error::Provider(format!("bad expiresIn: {}", response.expires_in)))?;

        Ok(ProviderSession {
            user: UserIdentity {
                uid: response.local_id,
                email: response.email,
                email_verified: response.email_verified,
                display_name: response.display_name,
            },
            id_token: response.id_token,
            expires_in,
        })
    }
}

/// Signs in against the hosted identity toolkit REST endpoint
pub struct HttpIdentityToolkit {
    client: reqwest::Client,
    config: IdentityConfig,
    request_uri: String,
}

impl HttpIdentityToolkit {
    pub fn new(config: IdentityConfig, request_uri: String) -> Self {
        HttpIdentityToolkit {
            client: reqwest::Client::new(),
            config,
            request_uri,
        }
    }
}

#[async_trait(?Send)]
impl CredentialExchange for HttpIdentityToolkit {
    async fn sign_in(&self, access_token: &str) -> Result<ProviderSession> {
        let url = format!(
            "{}/accounts:signInWithIdp?key={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.api_key
        );
        let post_body = format!(
            "access_token={}&providerId={}",
            access_token, self.config.provider_id
        );

        let response = self
            .client
            .post(url)
            .json(&json!({
                "postBody": post_body,
                "requestUri": self.request_uri,
                "returnSecureToken": true,
                "returnIdpCredential": true,
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => Error::Provider(envelope.error.message),
                Err(_) => Error::Provider(format!("sign-in returned {}", status)),
            });
        }

        serde_json::from_str::<SignInResponse>(&body)?.try_into()
    }
}
