pub use crate::config::oauth::{OAuthOptions, OAuthProviderKind};
pub use crate::config::routes::{CompiledRoute, RouteEntry};
use crate::routing::pattern::{PathPattern, PatternError};
use config::{Config as ConfigCrate, ConfigError as LoadError};
use http::Method;
use serde::Deserialize;
use thiserror::Error;

pub mod oauth;
pub mod routes;

/// Errors detected while loading or validating the authorization policy.
/// All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] LoadError),
    #[error("SECRET_KEY is required to sign and verify tokens")]
    MissingSecret,
    #[error(transparent)]
    InvalidPattern(#[from] PatternError),
    #[error("Invalid API name '{0}': it must start with '/'")]
    InvalidApiName(String),
    #[error("OAuth table '{0}' has no registered entity model")]
    MissingOAuthModel(String),
    #[error("Invalid OAuth configuration: {0}")]
    OAuth(String),
}

/// Raw settings as read from the environment and the optional config file
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Secret used to sign and verify tokens - mandatory
    #[serde(default)]
    pub secret_key: String,

    /// Routes that do not require a token
    #[serde(default)]
    pub white_list_routes: Vec<RouteEntry>,

    /// Routes the middleware does not look at at all
    #[serde(default)]
    pub ignored_routes: Vec<RouteEntry>,

    /// Prefix of every application route, e.g. "/api/v1"
    #[serde(default)]
    pub api_name: Option<String>,

    /// URL path static files are served under; empty disables (default: "/static")
    #[serde(default = "default_static_url_path")]
    pub static_url_path: String,

    /// Token lifetime in days (default: 30)
    #[serde(default = "default_expire_days")]
    pub expire_days: u64,

    /// Query parameter checked first for a token (default: "auth")
    #[serde(default = "default_token_query_param")]
    pub token_query_param: String,

    /// The port the reference server listens to (default: 5000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// JSON file with in-memory entity tables for the reference server
    #[serde(default)]
    pub seed_file: Option<String>,

    /// Google (or other OpenID) OAuth provider options
    #[serde(default)]
    pub google_oauth: Option<OAuthOptions>,
}

fn default_static_url_path() -> String {
    "/static".to_string()
}

fn default_expire_days() -> u64 {
    30
}

fn default_token_query_param() -> String {
    "auth".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            secret_key: "".to_string(),
            white_list_routes: Vec::new(),
            ignored_routes: Vec::new(),
            api_name: None,
            static_url_path: default_static_url_path(),
            expire_days: default_expire_days(),
            token_query_param: default_token_query_param(),
            port: default_port(),
            seed_file: None,
            google_oauth: None,
        }
    }
}

impl Settings {
    /// Loads settings from `jwt_router.toml` (optional) and `JWT_ROUTER_*`
    /// environment variables. Nested keys use `__`, route lists are
    /// comma-separated `METHOD /path` entries.
    pub fn new() -> Result<Self, ConfigError> {
        let settings = ConfigCrate::builder()
            .add_source(config::File::with_name("jwt_router").required(false))
            .add_source(
                config::Environment::with_prefix("JWT_ROUTER")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("white_list_routes")
                    .with_list_parse_key("ignored_routes")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

/// Validated, immutable authorization policy.
///
/// Built once at startup by [`RouterConfig::init_config`] and shared
/// read-only by every request.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    secret_key: String,
    white_list: Vec<CompiledRoute>,
    ignored: Vec<CompiledRoute>,
    api_name: Option<String>,
    static_files: Option<PathPattern>,
    token_ttl: chrono::Duration,
    token_query_param: String,
    oauth: Option<OAuthOptions>,
}

impl RouterConfig {
    pub fn init_config(settings: &Settings) -> Result<Self, ConfigError> {
        if settings.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret);
        }

        let api_name = match settings.api_name.as_deref().map(str::trim) {
            None | Some("") | Some("/") => None,
            Some(name) if !name.starts_with('/') => {
                return Err(ConfigError::InvalidApiName(name.to_string()))
            }
            Some(name) => Some(name.trim_end_matches('/').to_string()),
        };

        let static_path = settings.static_url_path.trim().trim_end_matches('/');
        let static_files = if static_path.is_empty() {
            None
        } else {
            Some(PathPattern::parse(&format!("{static_path}/<path:filename>"))?)
        };

        let white_list = compile_routes(&settings.white_list_routes, api_name.as_deref())?;
        let ignored = compile_routes(&settings.ignored_routes, api_name.as_deref())?;

        let days = i64::try_from(settings.expire_days).unwrap_or(i64::MAX);
        let token_ttl = chrono::Duration::try_days(days).unwrap_or(chrono::Duration::MAX);

        if let Some(oauth) = &settings.google_oauth {
            if oauth.tablename.is_empty() {
                return Err(ConfigError::OAuth("tablename must not be empty".to_string()));
            }
            if oauth.email_field.is_empty() {
                return Err(ConfigError::OAuth(
                    "email_field must not be empty".to_string(),
                ));
            }
        }

        let config = Self {
            secret_key: settings.secret_key.clone(),
            white_list,
            ignored,
            api_name,
            static_files,
            token_ttl,
            token_query_param: settings.token_query_param.clone(),
            oauth: settings.google_oauth.clone(),
        };

        log::debug!(
            "Authorization policy loaded: {} white-listed, {} ignored, api name {:?}",
            config.white_list.len(),
            config.ignored.len(),
            config.api_name
        );
        Ok(config)
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn white_list(&self) -> &[CompiledRoute] {
        &self.white_list
    }

    pub fn ignored(&self) -> &[CompiledRoute] {
        &self.ignored
    }

    pub fn api_name(&self) -> Option<&str> {
        self.api_name.as_deref()
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        self.token_ttl
    }

    pub fn token_query_param(&self) -> &str {
        &self.token_query_param
    }

    pub fn oauth(&self) -> Option<&OAuthOptions> {
        self.oauth.as_ref()
    }

    /// Strips the API name from a request path, see [`strip_api_name`]
    pub fn strip_api_name<'a>(&self, path: &'a str) -> &'a str {
        strip_api_name(path, self.api_name.as_deref())
    }

    /// Static file requests bypass the middleware like ignored routes
    pub fn is_static_file(&self, method: &Method, path: &str) -> bool {
        (method == Method::GET || method == Method::HEAD)
            && self
                .static_files
                .as_ref()
                .is_some_and(|pattern| pattern.matches(path).is_match())
    }
}

/// Strips the API name from a path. Paths outside the prefix are returned
/// untouched, so policy entries written with or without the prefix compare
/// equal to requests made with it.
pub fn strip_api_name<'a>(path: &'a str, api_name: Option<&str>) -> &'a str {
    let Some(api_name) = api_name else {
        return path;
    };
    match path.strip_prefix(api_name) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

fn compile_routes(
    entries: &[RouteEntry],
    api_name: Option<&str>,
) -> Result<Vec<CompiledRoute>, PatternError> {
    entries
        .iter()
        .map(|entry| {
            RouteEntry {
                method: entry.method.clone(),
                path: strip_api_name(&entry.path, api_name).to_string(),
            }
            .compile()
        })
        .collect()
}

#[cfg(test)]
impl Settings {
    pub fn for_test() -> Self {
        Self {
            secret_key: "__TEST_SECRET__".to_string(),
            white_list_routes: vec![RouteEntry::new("PUT", "/banana").unwrap()],
            ignored_routes: vec![RouteEntry::new("GET", "/").unwrap()],
            api_name: Some("/api/v1".to_string()),
            ..Default::default()
        }
    }
}
