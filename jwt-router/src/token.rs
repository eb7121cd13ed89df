//! Signing and verification of locally issued bearer tokens

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while encoding or decoding tokens
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token signature or format is invalid")]
    Invalid,
    #[error("Token has expired")]
    Expired,
    #[error("Failed to encode token: {0}")]
    Encode(String),
    #[error("Claim '{0}' not found in token")]
    ClaimNotFound(String),
}

/// Primary key value of an entity record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityKey {
    Int(i64),
    Str(String),
}

impl EntityKey {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(id) => Value::from(*id),
            Self::Str(id) => Value::from(id.as_str()),
        }
    }

    /// Key of a stored primary key value, `None` unless it is an integer or
    /// a string
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    /// Compares against a stored value, allowing `1` to match `"1"`
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Int(id), Value::Number(n)) => n.as_i64() == Some(*id),
            (Self::Int(id), Value::String(s)) => s.parse::<i64>().ok() == Some(*id),
            (Self::Str(id), Value::String(s)) => id == s,
            (Self::Str(id), Value::Number(n)) => n.to_string() == *id,
            _ => false,
        }
    }
}

impl From<i64> for EntityKey {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<i32> for EntityKey {
    fn from(id: i32) -> Self {
        Self::Int(id.into())
    }
}

impl From<u32> for EntityKey {
    fn from(id: u32) -> Self {
        Self::Int(id.into())
    }
}

impl From<&str> for EntityKey {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Str(id) => f.write_str(id),
        }
    }
}

/// Reference to one entity record carried by a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityClaim {
    pub table_name: String,
    pub id: EntityKey,
}

impl EntityClaim {
    pub fn new(table_name: impl Into<String>, id: impl Into<EntityKey>) -> Self {
        Self {
            table_name: table_name.into(),
            id: id.into(),
        }
    }
}

/// Decoded token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Entity references in the order they were issued
    pub entities: Vec<EntityClaim>,
    /// Issued at, epoch seconds
    pub iat: i64,
    /// Expiry, epoch seconds
    pub exp: i64,
    /// Any other claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Builds claims issued now and expiring after `ttl`
    pub fn new(entities: Vec<EntityClaim>, ttl: Duration) -> Self {
        let now = Utc::now();
        let exp = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            entities,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            extra: Map::new(),
        }
    }

    /// Looks up `field` as an entity table name first, then as an extra claim
    pub fn get(&self, field: &str) -> Option<Value> {
        self.entities
            .iter()
            .find(|claim| claim.table_name == field)
            .map(|claim| claim.id.to_value())
            .or_else(|| self.extra.get(field).cloned())
    }
}

/// HS256 token encoder/decoder bound to one secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &Algorithm::HS256)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    /// Issues a token for `entities` with the configured time-to-live
    pub fn encode(&self, entities: Vec<EntityClaim>) -> Result<String, TokenError> {
        self.encode_with_ttl(entities, self.ttl)
    }

    pub fn encode_with_ttl(
        &self,
        entities: Vec<EntityClaim>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        self.encode_claims(&Claims::new(entities, ttl))
    }

    /// Signs `claims` as given, timestamps included
    pub fn encode_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    /// Verifies the signature and expiry of `token` and returns its claims
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => {
                    debug!("Token rejected: {}", e);
                    TokenError::Invalid
                }
            })
    }

    /// Re-issues a still valid token with the same claims and a fresh expiry
    pub fn refresh(&self, token: &str) -> Result<String, TokenError> {
        let claims = self.decode(token)?;
        let refreshed = Claims {
            extra: claims.extra,
            ..Claims::new(claims.entities, self.ttl)
        };
        self.encode_claims(&refreshed)
    }
}
