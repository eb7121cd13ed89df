//! White-list and ignore-list entries

use crate::routing::pattern::{PathPattern, PatternError};
use http::Method;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// A `(method, path)` pair as written in configuration.
///
/// Deserializes from either `"GET /test"` or `["GET", "/test"]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawRouteEntry")]
pub struct RouteEntry {
    pub method: Method,
    pub path: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRouteEntry {
    Pair(String, String),
    Line(String),
}

impl TryFrom<RawRouteEntry> for RouteEntry {
    type Error = String;

    fn try_from(raw: RawRouteEntry) -> Result<Self, Self::Error> {
        match raw {
            RawRouteEntry::Pair(method, path) => Self::new(&method, &path),
            RawRouteEntry::Line(line) => line.parse(),
        }
    }
}

impl RouteEntry {
    pub fn new(method: &str, path: &str) -> Result<Self, String> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| format!("invalid HTTP method '{}'", method.trim()))?;
        let path = path.trim();
        if !path.starts_with('/') {
            return Err(format!("route path '{path}' must start with '/'"));
        }
        Ok(Self {
            method,
            path: path.to_string(),
        })
    }

    pub(crate) fn compile(&self) -> Result<CompiledRoute, PatternError> {
        Ok(CompiledRoute {
            method: self.method.clone(),
            pattern: PathPattern::parse(&self.path)?,
        })
    }
}

impl FromStr for RouteEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (method, path) = s
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| format!("route entry '{s}' must look like 'METHOD /path'"))?;
        Self::new(method, path)
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A route entry with its path compiled for matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRoute {
    pub method: Method,
    pub pattern: PathPattern,
}

impl fmt::Display for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let entry: RouteEntry = "get /test".parse().unwrap();
        assert_eq!(entry.method, Method::GET);
        assert_eq!(entry.path, "/test");
        assert_eq!(entry.to_string(), "GET /test");
    }

    #[test]
    fn test_parse_line_rejects_missing_path() {
        assert!("GET".parse::<RouteEntry>().is_err());
        assert!("GET test".parse::<RouteEntry>().is_err());
    }

    #[test]
    fn test_deserialize_pair_and_line() {
        let entries: Vec<RouteEntry> =
            serde_json::from_str(r#"[["PUT", "/banana"], "POST /apples/sub/<int:id>"]"#).unwrap();
        assert_eq!(entries[0], RouteEntry::new("PUT", "/banana").unwrap());
        assert_eq!(entries[1].method, Method::POST);
        assert_eq!(entries[1].path, "/apples/sub/<int:id>");
    }

    #[test]
    fn test_deserialize_rejects_bad_method() {
        let result: Result<Vec<RouteEntry>, _> = serde_json::from_str(r#"[["G T", "/x"]]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_compile() {
        let route = RouteEntry::new("GET", "/apples/<int:id>")
            .unwrap()
            .compile()
            .unwrap();
        assert!(!route.pattern.is_static());
        assert_eq!(route.to_string(), "GET /apples/<int:id>");

        assert!(RouteEntry::new("GET", "/apples/<bad:id>")
            .unwrap()
            .compile()
            .is_err());
    }
}
