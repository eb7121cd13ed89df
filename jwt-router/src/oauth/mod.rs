//! OAuth 2.0 providers
//!
//! A provider turns an access token issued by an external identity service
//! into an [`OAuthIdentity`]. The router only talks to the [`OAuthProvider`]
//! capability; [`OAuthClient`] is the set of built-in providers selected
//! from configuration.

pub mod google;
pub mod userinfo;

use crate::config::{OAuthOptions, OAuthProviderKind};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Header carrying a provider access token, as `Bearer <token>`
pub const OAUTH_HEADER: &str = "X-Auth-Token";

/// Errors that can occur while talking to an OAuth provider
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed provider payload: {0}")]
    MalformedPayload(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Identity asserted by the provider for an access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthIdentity {
    /// Value of the configured email field
    pub email: String,
    pub access_token: Option<String>,
    /// The full userinfo payload
    pub profile: Value,
}

/// Tokens returned by an authorization-code exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Capability every OAuth provider implements
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn options(&self) -> &OAuthOptions;

    /// Exchanges an access token for the identity it belongs to
    async fn get_identity(&self, access_token: &str) -> Result<OAuthIdentity, OAuthError>;

    /// Exchanges an authorization code for provider tokens
    async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, OAuthError>;
}

/// Built-in providers
#[derive(Clone)]
pub enum OAuthClient {
    Google(google::GoogleProvider),
    UserInfo(userinfo::UserInfoProvider),
}

impl OAuthClient {
    /// Creates the provider named by `options.provider`
    pub fn init(options: OAuthOptions) -> Result<Self, OAuthError> {
        let client = create_http_client(options.timeout)?;
        match options.provider {
            OAuthProviderKind::Google => {
                Ok(Self::Google(google::GoogleProvider::new(client, options)?))
            }
            OAuthProviderKind::Userinfo => Ok(Self::UserInfo(
                userinfo::UserInfoProvider::new(client, options)?,
            )),
        }
    }
}

#[async_trait]
impl OAuthProvider for OAuthClient {
    fn options(&self) -> &OAuthOptions {
        match self {
            Self::Google(provider) => provider.options(),
            Self::UserInfo(provider) => provider.options(),
        }
    }

    async fn get_identity(&self, access_token: &str) -> Result<OAuthIdentity, OAuthError> {
        match self {
            Self::Google(provider) => provider.get_identity(access_token).await,
            Self::UserInfo(provider) => provider.get_identity(access_token).await,
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, OAuthError> {
        match self {
            Self::Google(provider) => provider.exchange_code(code).await,
            Self::UserInfo(provider) => provider.exchange_code(code).await,
        }
    }
}

fn create_http_client(timeout: u64) -> Result<Client, OAuthError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(2))
        .build()
        .map_err(OAuthError::Http)
}

/// Calls a userinfo endpoint with `access_token` and reads `email_field`
async fn fetch_identity(
    client: &Client,
    url: &url::Url,
    access_token: &str,
    email_field: &str,
) -> Result<OAuthIdentity, OAuthError> {
    debug!("Fetching OAuth identity from {}", url);

    let response = client
        .get(url.clone())
        .bearer_auth(access_token)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("OAuth userinfo error {}: {}", status, body);
        return Err(OAuthError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let profile: Value = response
        .json()
        .await
        .map_err(|e| OAuthError::MalformedPayload(format!("JSON parse error: {e}")))?;

    let email = profile
        .get(email_field)
        .and_then(Value::as_str)
        .filter(|email| !email.is_empty())
        .ok_or_else(|| {
            OAuthError::MalformedPayload(format!("missing '{email_field}' in userinfo payload"))
        })?
        .to_string();

    Ok(OAuthIdentity {
        email,
        access_token: Some(access_token.to_string()),
        profile,
    })
}

/// Performs an authorization-code grant against `token_url`
async fn fetch_tokens(
    client: &Client,
    token_url: &url::Url,
    options: &OAuthOptions,
    code: &str,
) -> Result<OAuthTokens, OAuthError> {
    debug!("Exchanging authorization code at {}", token_url);

    let form = [
        ("code", code),
        ("client_id", options.client_id.as_str()),
        ("client_secret", options.client_secret.as_str()),
        ("redirect_uri", options.redirect_uri.as_str()),
        ("grant_type", "authorization_code"),
    ];

    let response = client.post(token_url.clone()).form(&form).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("OAuth token exchange error {}: {}", status, body);
        return Err(OAuthError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let mut tokens: OAuthTokens = response
        .json()
        .await
        .map_err(|e| OAuthError::MalformedPayload(format!("JSON parse error: {e}")))?;
    tokens.expires_in.get_or_insert(options.expires_in);
    Ok(tokens)
}

fn parse_url(name: &str, url: &str) -> Result<url::Url, OAuthError> {
    url::Url::parse(url).map_err(|e| OAuthError::Config(format!("invalid {name} '{url}': {e}")))
}
