/// OAuth token endpoint client

use crate::config::OAuthConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

/// Bearer token issued by the identity provider
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    pub expires_in: u64,
}

#[async_trait(?Send)]
pub trait OAuthProvider {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
    async fn revoke(&self, token: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl From<ProviderError> for Error {
    fn from(e: ProviderError) -> Self {
        match e.error_description {
            Some(description) => Error::Provider(format!("{}: {}", e.error, description)),
            None => Error::Provider(e.error),
        }
    }
}

/// Talks to the provider's token and revocation endpoints directly
pub struct HttpOAuthProvider {
    client: reqwest::Client,
    config: OAuthConfig,
}

impl HttpOAuthProvider {
    pub fn new(config: OAuthConfig) -> Self {
        HttpOAuthProvider {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self
            .client
            .post(&self.config.token_endpoint)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ProviderError>(&body) {
                Ok(provider_error) => provider_error.into(),
                Err(_) => Error::Provider(format!("token endpoint returned {}", status)),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait(?Send)]
impl OAuthProvider for HttpOAuthProvider {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant> {
        debug!("Exchanging authorization code");
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        debug!("Refreshing bearer token");
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ])
        .await
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.config.revoke_endpoint)
            .form(&[("token", token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "revoke endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_without_refresh_token() {
        let grant: TokenGrant =
            serde_json::from_str(r#"{"access_token":"ya29","expires_in":3599,"token_type":"Bearer"}"#)
                .unwrap();

        assert_eq!(grant.access_token, "ya29");
        assert_eq!(grant.refresh_token, None);
        assert_eq!(grant.expires_in, 3599);
    }

    #[test]
    fn test_provider_error_mapping() {
        let e: ProviderError = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Bad Request"}"#,
        )
        .unwrap();

        assert_eq!(
            Error::from(e),
            Error::Provider("invalid_grant: Bad Request".to_string())
        );
    }
}
