//! Request authorization decisions
//!
//! [`JwtRouter::before_middleware`] runs before every request reaches its
//! handler and decides, in order:
//!
//! 1. `OPTIONS` preflight requests pass through.
//! 2. Static files (`GET`/`HEAD` below the static URL path) pass through.
//! 3. Ignored routes pass through, then white-listed routes. A typed
//!    segment that does not coerce leaves the entry unmatched; answering
//!    404 for it is up to the host's own route table.
//! 4. Everything else requires a token: a provider access token in the
//!    OAuth header, or a locally issued token in the query or the
//!    `Authorization` header. The resolved entities are returned in a
//!    [`RequestContext`].

pub mod middleware;
pub mod pattern;
mod token_source;

pub use middleware::{jwt_middleware, protect};
pub use token_source::{extract_token, BearerToken, TokenSource};

use crate::config::{CompiledRoute, ConfigError, RouterConfig, Settings};
use crate::context::RequestContext;
use crate::entity::{EntityError, EntityModel, EntityResolver};
use crate::errors::{AuthError, Rejection};
use crate::oauth::{OAuthClient, OAuthProvider};
use crate::token::{EntityClaim, TokenCodec, TokenError};
use http::{HeaderMap, Method, Uri};
use log::{debug, error, warn};
use pattern::PatternMatch;
use serde_json::Value;
use std::sync::Arc;

/// Outcome of a request that may proceed to its handler
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Preflight,
    Ignored,
    WhiteListed,
    Authorized(RequestContext),
}

/// The authorization guard. Cheap to clone, shared by every request.
#[derive(Clone)]
pub struct JwtRouter {
    config: Arc<RouterConfig>,
    codec: TokenCodec,
    resolver: EntityResolver,
    oauth: Option<Arc<dyn OAuthProvider>>,
}

impl JwtRouter {
    /// Creates the guard from a validated policy, the entity models tokens
    /// may reference and an optional OAuth provider. The provider's table
    /// must have a registered model.
    pub fn new(
        config: RouterConfig,
        models: Vec<Arc<dyn EntityModel>>,
        oauth: Option<Arc<dyn OAuthProvider>>,
    ) -> Result<Self, ConfigError> {
        if let Some(provider) = &oauth {
            let table = &provider.options().tablename;
            if !models.iter().any(|model| model.table_name() == table) {
                return Err(ConfigError::MissingOAuthModel(table.clone()));
            }
        }

        let codec = TokenCodec::new(config.secret_key(), config.token_ttl());
        let resolver = EntityResolver::new(models, codec.clone());

        Ok(Self {
            config: Arc::new(config),
            codec,
            resolver,
            oauth,
        })
    }

    /// Validates `settings` and creates the configured built-in OAuth
    /// provider, if any
    pub fn from_settings(
        settings: &Settings,
        models: Vec<Arc<dyn EntityModel>>,
    ) -> Result<Self, ConfigError> {
        let config = RouterConfig::init_config(settings)?;
        let oauth = match config.oauth() {
            Some(options) => {
                let client = OAuthClient::init(options.clone())
                    .map_err(|e| ConfigError::OAuth(e.to_string()))?;
                Some(Arc::new(client) as Arc<dyn OAuthProvider>)
            }
            None => None,
        };
        Self::new(config, models, oauth)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    pub fn oauth(&self) -> Option<&Arc<dyn OAuthProvider>> {
        self.oauth.as_ref()
    }

    /// Issues a token for the given entity claims
    pub fn create_token(&self, entities: Vec<EntityClaim>) -> Result<String, TokenError> {
        self.codec.encode(entities)
    }

    /// Re-issues a still-valid token with a fresh expiry
    pub fn update_token(&self, token: &str) -> Result<String, TokenError> {
        self.codec.refresh(token)
    }

    /// Returns the claim `field_name` of a verified token
    pub fn get_id_from_token(&self, token: &str, field_name: &str) -> Result<Value, TokenError> {
        self.resolver.get_id_from_token(token, field_name)
    }

    /// Decides whether a request may reach its handler. `uri` must carry the
    /// full request path, including the API name.
    pub async fn before_middleware(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Result<Decision, Rejection> {
        let raw_path = uri.path();

        if method == Method::OPTIONS {
            debug!("Preflight request for {}", raw_path);
            return Ok(Decision::Preflight);
        }

        if self.config.is_static_file(method, raw_path) {
            debug!("Static file {} is not protected", raw_path);
            return Ok(Decision::Ignored);
        }

        let path = self.config.strip_api_name(raw_path);
        match self.match_policy(method, path) {
            PolicyMatch::Ignored => {
                debug!("{} {} is ignored", method, raw_path);
                return Ok(Decision::Ignored);
            }
            PolicyMatch::WhiteListed => {
                debug!("{} {} is white-listed", method, raw_path);
                return Ok(Decision::WhiteListed);
            }
            PolicyMatch::Protected => {}
        }

        let result = match extract_token(
            uri,
            headers,
            self.config.token_query_param(),
            self.oauth.is_some(),
        ) {
            None => Err(AuthError::TokenMissing),
            Some(BearerToken {
                source: TokenSource::OAuthHeader,
                token,
            }) => self.authorize_oauth(&token).await,
            Some(BearerToken { token, .. }) => self.authorize_local(&token).await,
        };

        match result {
            Ok(context) => Ok(Decision::Authorized(context)),
            Err(err) => {
                warn!("Unauthorized {} {}: {}", method, raw_path, err);
                Err(Rejection::Unauthorized(err))
            }
        }
    }

    /// Finds the strongest policy entry for a request. Exact matches beat
    /// dynamic ones; on equal strength ignored routes beat white-listed
    /// ones.
    fn match_policy(&self, method: &Method, path: &str) -> PolicyMatch {
        let candidates = [
            (self.config.ignored(), PolicyMatch::Ignored),
            (self.config.white_list(), PolicyMatch::WhiteListed),
        ];

        let mut best: Option<(PatternMatch, PolicyMatch)> = None;

        for (routes, outcome) in candidates {
            for route in routes.iter().filter(|route| route_method_matches(route, method)) {
                match route.pattern.matches(path) {
                    PatternMatch::TypeMismatch => {
                        debug!("{} does not coerce for {}", path, route.pattern);
                    }
                    strength if strength.is_match() => {
                        if best.is_none_or(|(current, _)| strength < current) {
                            best = Some((strength, outcome));
                        }
                    }
                    _ => {}
                }
            }
        }

        best.map_or(PolicyMatch::Protected, |(_, outcome)| outcome)
    }

    async fn authorize_oauth(&self, access_token: &str) -> Result<RequestContext, AuthError> {
        let Some(provider) = &self.oauth else {
            return Err(AuthError::TokenMissing);
        };

        let identity = provider.get_identity(access_token).await.map_err(|e| {
            warn!("OAuth identity lookup failed: {}", e);
            AuthError::OAuthExchange
        })?;

        let options = provider.options();
        let tuple = self
            .resolver
            .find_by_field(
                &options.tablename,
                &options.email_field,
                &Value::String(identity.email),
            )
            .await
            .map_err(entity_error)?;

        let mut context = RequestContext::new();
        context.publish(&options.tablename, tuple);
        Ok(context)
    }

    async fn authorize_local(&self, token: &str) -> Result<RequestContext, AuthError> {
        let claims = self.codec.decode(token)?;
        if claims.entities.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let resolved = self
            .resolver
            .get_entities_from_claims(&claims)
            .await
            .map_err(entity_error)?;

        let mut context = RequestContext::new();
        for (table_name, tuple) in resolved {
            context.publish(&table_name, tuple);
        }
        Ok(context)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PolicyMatch {
    Ignored,
    WhiteListed,
    Protected,
}

fn route_method_matches(route: &CompiledRoute, method: &Method) -> bool {
    &route.method == method
}

fn entity_error(err: EntityError) -> AuthError {
    match err {
        EntityError::NotFound { .. } => AuthError::EntityNotFound,
        EntityError::UnknownModel(table) => {
            warn!("Token references unknown entity table '{}'", table);
            AuthError::InvalidToken
        }
        EntityError::Storage(reason) => {
            error!("Entity lookup failed: {}", reason);
            AuthError::EntityNotFound
        }
    }
}
