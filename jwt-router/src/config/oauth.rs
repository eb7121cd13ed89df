//! OAuth 2.0 provider configuration

use serde::Deserialize;

/// Which provider implementation serves an OAuth option block
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OAuthProviderKind {
    #[default]
    Google,
    /// Any OpenID Connect provider exposing a userinfo endpoint
    Userinfo,
}

/// OAuth 2.0 provider options
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OAuthOptions {
    /// OAuth client id issued by the provider
    pub client_id: String,

    /// OAuth client secret issued by the provider
    pub client_secret: String,

    /// Redirect URI registered with the provider
    pub redirect_uri: String,

    /// Table name of the entity model holding OAuth-linked accounts;
    /// resolved entities are published under this key
    pub tablename: String,

    /// Field of both the provider's userinfo payload and the entity model
    /// that identifies the account (default: "email")
    #[serde(default = "default_email_field")]
    pub email_field: String,

    /// Lifetime in seconds reported for exchanged access tokens when the
    /// provider omits one (default: 3600)
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,

    /// Provider implementation (default: google)
    #[serde(default)]
    pub provider: OAuthProviderKind,

    /// Override of the provider's token endpoint
    #[serde(default)]
    pub token_url: Option<String>,

    /// Override of the provider's userinfo endpoint, required for `userinfo`
    #[serde(default)]
    pub userinfo_url: Option<String>,

    /// Timeout in seconds for calls to the provider (default: 5)
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_email_field() -> String {
    "email".to_string()
}

fn default_expires_in() -> u64 {
    3600
}

fn default_timeout() -> u64 {
    5
}

impl OAuthOptions {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        tablename: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            tablename: tablename.into(),
            email_field: default_email_field(),
            expires_in: default_expires_in(),
            provider: OAuthProviderKind::default(),
            token_url: None,
            userinfo_url: None,
            timeout: default_timeout(),
        }
    }
}
