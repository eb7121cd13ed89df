//! Generic OpenID Connect provider driven by a userinfo endpoint

use super::{
    fetch_identity, fetch_tokens, parse_url, OAuthError, OAuthIdentity, OAuthProvider, OAuthTokens,
};
use crate::config::OAuthOptions;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

#[derive(Clone)]
pub struct UserInfoProvider {
    client: Client,
    options: OAuthOptions,
    userinfo_url: Url,
    token_url: Option<Url>,
}

impl UserInfoProvider {
    /// `userinfo_url` is required, `token_url` only for code exchange
    pub fn new(client: Client, options: OAuthOptions) -> Result<Self, OAuthError> {
        let userinfo_url = options
            .userinfo_url
            .as_deref()
            .ok_or_else(|| OAuthError::Config("userinfo_url is required".to_string()))
            .and_then(|url| parse_url("userinfo_url", url))?;
        let token_url = options
            .token_url
            .as_deref()
            .map(|url| parse_url("token_url", url))
            .transpose()?;
        Ok(Self {
            client,
            options,
            userinfo_url,
            token_url,
        })
    }
}

#[async_trait]
impl OAuthProvider for UserInfoProvider {
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
        let token_url = self.token_url.as_ref().ok_or_else(|| {
            OAuthError::Config("token_url is required for code exchange".to_string())
        })?;
        fetch_tokens(&self.client, token_url, &self.options, code).await
    }
}
