//! Locating the bearer token of a request

use crate::oauth::OAUTH_HEADER;
use http::header::AUTHORIZATION;
use http::{HeaderMap, Uri};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Query,
    Header,
    /// Provider access token, verified by the OAuth provider
    OAuthHeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub source: TokenSource,
    pub token: String,
}

/// Looks for a token in the query parameter, the `Authorization` header and
/// finally the OAuth header, in that order. Malformed values count as
/// absent and the next source is tried. The OAuth header is only consulted
/// when a provider is configured.
pub fn extract_token(
    uri: &Uri,
    headers: &HeaderMap,
    query_param: &str,
    oauth_enabled: bool,
) -> Option<BearerToken> {
    if let Some(token) = from_query(uri, query_param) {
        return Some(BearerToken {
            source: TokenSource::Query,
            token,
        });
    }

    if let Some(token) = from_header(headers, AUTHORIZATION.as_str()) {
        return Some(BearerToken {
            source: TokenSource::Header,
            token,
        });
    }

    if oauth_enabled {
        if let Some(token) = from_header(headers, OAUTH_HEADER) {
            return Some(BearerToken {
                source: TokenSource::OAuthHeader,
                token,
            });
        }
    }

    None
}

fn from_query(uri: &Uri, query_param: &str) -> Option<String> {
    let query = uri.query()?;
    let value = url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == query_param)
        .map(|(_, value)| value.into_owned())?;

    // The prefix is optional in query strings
    let token = strip_bearer(&value).unwrap_or(value.trim());
    (!token.is_empty()).then(|| token.to_string())
}

fn from_header(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    let Ok(value) = value.to_str() else {
        debug!("Ignoring non-ASCII '{}' header", name);
        return None;
    };
    match strip_bearer(value) {
        Some(token) => Some(token.to_string()),
        None => {
            debug!("Ignoring '{}' header without 'Bearer ' prefix", name);
            None
        }
    }
}

/// Removes a case-insensitive `Bearer ` prefix, `None` if it is missing or
/// nothing follows it
fn strip_bearer(value: &str) -> Option<&str> {
    let value = value.trim();
    let prefix = value.get(..7)?;
    if !prefix.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    let token = value[7..].trim();
    (!token.is_empty()).then_some(token)
}
