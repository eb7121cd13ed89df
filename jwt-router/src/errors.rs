use crate::token::TokenError;
use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ApiError {
    pub detail: String,
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new ApiError with a detail message and status code
    pub fn new<S: ToString>(detail: S, status_code: StatusCode) -> Self {
        Self {
            detail: detail.to_string(),
            status_code,
        }
    }

    /// Create new Unauthorized (401) error
    pub fn unauthorized() -> Self {
        Self::new("Unauthorized", StatusCode::UNAUTHORIZED)
    }

    /// Create new Not Found (404) error
    pub fn not_found() -> Self {
        Self::new("Not Found", StatusCode::NOT_FOUND)
    }

    /// Create new Bad Gateway (502) with a detail message
    pub fn bad_gateway<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::BAD_GATEWAY)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        let body = json!({
            "detail": self.detail,
        });
        (status_code, Json(body)).into_response()
    }
}

/// Why a protected request was not authorized. Every kind is answered with
/// the same 401 response; the distinction only shows in logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token in query, Authorization or OAuth header")]
    TokenMissing,
    #[error("token failed verification")]
    InvalidToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("OAuth provider rejected the access token")]
    OAuthExchange,
    #[error("token references an entity that does not exist")]
    EntityNotFound,
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::ExpiredToken,
            _ => Self::InvalidToken,
        }
    }
}

/// Short-circuit outcome of the router. Paths the host cannot route, typed
/// segments that do not coerce included, are the host's 404 to give.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Unauthorized(AuthError),
}

impl From<AuthError> for Rejection {
    fn from(err: AuthError) -> Self {
        Self::Unauthorized(err)
    }
}

impl Rejection {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Unauthorized(_) => ApiError::unauthorized().into_response(),
        }
    }
}
