//! Google OAuth 2.0 provider

use super::{
    fetch_identity, fetch_tokens, parse_url, OAuthError, OAuthIdentity, OAuthProvider, OAuthTokens,
};
use crate::config::OAuthOptions;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Clone)]
pub struct GoogleProvider {
    client: Client,
    options: OAuthOptions,
    token_url: Url,
    userinfo_url: Url,
}

impl GoogleProvider {
    /// Endpoints default to Google's and can be overridden through
    /// `token_url` and `userinfo_url`
    pub fn new(client: Client, options: OAuthOptions) -> Result<Self, OAuthError> {
        let token_url = parse_url(
            "token_url",
            options.token_url.as_deref().unwrap_or(GOOGLE_TOKEN_URL),
        )?;
        let userinfo_url = parse_url(
            "userinfo_url",
            options.userinfo_url.as_deref().unwrap_or(GOOGLE_USERINFO_URL),
        )?;
        Ok(Self {
            client,
            options,
            token_url,
            userinfo_url,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn options(&self) -> &OAuthOptions {
        &self.options
    }

    async fn get_identity(&self, access_token: &str) -> Result<OAuthIdentity, OAuthError> {
        fetch_identity(
            &self.client,
            &self.userinfo_url,
            access_token,
            &self.options.email_field,
        )
        .await
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, OAuthError> {
        fetch_tokens(&self.client, &self.token_url, &self.options, code).await
    }
}
