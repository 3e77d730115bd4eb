//! Client-credentials token exchange against the identity server.
//!
//! The relay never caches tokens: every (re)connect asks for a fresh one.

use crate::error::Error;
use async_trait::async_trait;
use log::*;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Source of short-lived access tokens for the broker connection.
///
/// `None` means "no token could be obtained right now"; the caller treats the
/// broker as unavailable.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Option<SecretString>;
}

/// Settings needed to request a token from the identity server.
#[derive(Debug)]
pub struct IdentitySettings {
    /// Base URL of the identity server; the token endpoint is `<url>/connect/token`.
    pub url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    /// Scope requested for the relay.
    pub scope: String,
    /// Timeout for a single token request.
    pub timeout: Duration,
}

/// Token response from the identity server. Only `access_token` is required.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Form body of the client-credentials request
#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    scopes: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Exchanges the relay's client id/secret for an access token.
pub struct CredentialProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    scope: String,
}

impl CredentialProvider {
    pub fn new(settings: IdentitySettings) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            token_url: format!("{}/connect/token", settings.url.trim_end_matches('/')),
            client_id: settings.client_id,
            client_secret: settings.client_secret,
            scope: settings.scope,
        })
    }
}

#[async_trait]
impl TokenSource for CredentialProvider {
    async fn fetch_token(&self) -> Option<SecretString> {
        let request = TokenRequest {
            grant_type: "client_credentials",
            scopes: &self.scope,
            client_id: &self.client_id,
            client_secret: self.client_secret.expose_secret(),
        };

        debug!("Requesting push relay access token from {}", self.token_url);

        let response = match self
            .client
            .post(&self.token_url)
            .form(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to reach identity server: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("Identity server rejected token request ({status}): {error_text}");
            return None;
        }

        let token: TokenResponse = match response.json().await {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to parse identity server token response: {e}");
                return None;
            }
        };

        if token.access_token.trim().is_empty() {
            warn!("Identity server returned an empty access token");
            return None;
        }

        debug!(
            "Obtained {} access token (expires in {:?}s)",
            token.token_type.as_deref().unwrap_or("unknown"),
            token.expires_in
        );

        Some(SecretString::new(token.access_token))
    }
}
