//! Reference host application served by the binary
//!
//! Every application route lives under the configured API name; the guard
//! is installed over the whole route table. Malformed `id` parameters are
//! answered 404 ahead of the guard.

use crate::context::RequestContext;
use crate::errors::ApiError;
use crate::routing::protect;
use crate::state::AppState;
use crate::token::{EntityClaim, EntityKey};
use axum::{
    extract::{rejection::RawPathParamsRejection, Path, RawPathParams, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Create a new application instance with a given state
pub fn create_app(state: AppState) -> Router {
    let guard = state.router.clone();
    let api = state.router.config().api_name().unwrap_or("").to_string();

    let mut router = Router::new()
        .route("/", get(index).options(preflight))
        .route("/ignore", get(ignored))
        .route(&format!("{api}/test"), get(test))
        .route(&format!("{api}/test/sub_two"), get(sub_two))
        .route(&format!("{api}/bananas/sub"), get(bananas_sub))
        .route(
            &format!("{api}/apples/sub/{{id}}"),
            get(apple).put(update_apple),
        )
        .route(&format!("{api}/me"), get(me).options(preflight))
        .route("/oauth/login", post(oauth_login));

    let static_path = state.settings.static_url_path.trim().trim_end_matches('/');
    if !static_path.is_empty() {
        router = router.route(&format!("{static_path}/{{*file}}"), get(static_file));
    }

    protect(router, guard)
        .route_layer(middleware::from_fn(require_integer_ids))
        .with_state(state)
}

/// Rejects requests whose `id` parameter is not an integer
async fn require_integer_ids(
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Response {
    if let Ok(params) = &params {
        if let Some((_, value)) = params
            .iter()
            .find(|(name, value)| *name == "id" && value.parse::<i64>().is_err())
        {
            debug!("No resource with id '{}' at {}", value, request.uri().path());
            return ApiError::not_found().into_response();
        }
    }
    next.run(request).await
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn index() -> Json<Value> {
    Json(json!({ "data": "index" }))
}

async fn ignored() -> Json<Value> {
    Json(json!({ "data": "ignored" }))
}

async fn test() -> Json<Value> {
    Json(json!({ "data": "test" }))
}

async fn sub_two() -> Json<Value> {
    Json(json!({ "data": "sub_two" }))
}

async fn bananas_sub() -> Json<Value> {
    Json(json!({ "data": "sub" }))
}

async fn apple(Path(id): Path<i64>) -> Json<Value> {
    Json(json!({ "data": id }))
}

async fn update_apple(Path(id): Path<i64>) -> Json<Value> {
    Json(json!({ "data": id, "updated": true }))
}

async fn static_file(Path(file): Path<String>) -> Json<Value> {
    Json(json!({ "file": file }))
}

/// Entities the guard resolved for this request, by table name
async fn me(context: RequestContext) -> Json<Value> {
    let entities: Map<String, Value> = context
        .iter()
        .map(|(table, entities)| (table.to_string(), json!(entities)))
        .collect();
    Json(Value::Object(entities))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    code: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    access_token: String,
    expires_in: Option<u64>,
}

/// Completes an authorization-code login: exchanges the code with the OAuth
/// provider, resolves the account by email and issues a local token for it
async fn oauth_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let router = &state.router;
    let Some(provider) = router.oauth() else {
        return Err(ApiError::not_found());
    };

    let tokens = provider.exchange_code(&request.code).await.map_err(|e| {
        warn!("Authorization code exchange failed: {}", e);
        ApiError::bad_gateway("OAuth provider rejected the authorization code")
    })?;

    let identity = provider
        .get_identity(&tokens.access_token)
        .await
        .map_err(|e| {
            warn!("OAuth identity lookup failed: {}", e);
            ApiError::bad_gateway("OAuth provider did not return an identity")
        })?;

    let options = provider.options();
    let (id, _) = router
        .resolver()
        .find_by_field(
            &options.tablename,
            &options.email_field,
            &Value::String(identity.email.clone()),
        )
        .await
        .map_err(|e| {
            warn!("OAuth login for unknown account: {}", e);
            ApiError::unauthorized()
        })?;

    let key = EntityKey::from_value(&id).ok_or_else(|| {
        warn!("'{}' primary key {} cannot be put in a token", options.tablename, id);
        ApiError::unauthorized()
    })?;

    let token = router
        .create_token(vec![EntityClaim::new(options.tablename.as_str(), key)])
        .map_err(|e| ApiError::new(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR))?;

    info!("Issued token for '{}' account {}", options.tablename, identity.email);
    Ok(Json(LoginResponse {
        token,
        access_token: tokens.access_token,
        expires_in: tokens.expires_in,
    }))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use crate::token::EntityClaim;
    use http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_white_listed_route() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/api/v1/test").await;
        response.assert_ok();
        assert_eq!(response.json, json!({"data": "test"}));
    }

    #[tokio::test]
    async fn test_white_list_method_mismatch() {
        let fixture = TestFixture::with_settings(|settings| {
            settings.white_list_routes = vec!["POST /test".parse().unwrap()];
        })
        .await;
        fixture.get("/api/v1/test").await.assert_unauthorized();
    }

    #[tokio::test]
    async fn test_empty_white_list() {
        let fixture = TestFixture::with_settings(|settings| {
            settings.white_list_routes.clear();
        })
        .await;
        fixture.get("/api/v1/test").await.assert_unauthorized();
    }

    #[tokio::test]
    async fn test_sub_paths() {
        let fixture = TestFixture::new().await;

        let response = fixture.get("/api/v1/bananas/sub").await;
        response.assert_ok();
        assert_eq!(response.json["data"], "sub");

        fixture.get("/api/v1/test/sub_two").await.assert_unauthorized();
    }

    #[tokio::test]
    async fn test_dynamic_params() {
        let fixture = TestFixture::new().await;

        let response = fixture.request(Method::PUT, "/api/v1/apples/sub/1").await;
        response.assert_ok();
        assert_eq!(response.json, json!({"data": 1, "updated": true}));

        fixture
            .get("/api/v1/apples/sub/")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        fixture
            .get("/api/v1/apples/sub/hello")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_id_is_not_found_without_policy() {
        let fixture = TestFixture::with_settings(|settings| {
            settings.white_list_routes.clear();
        })
        .await;
        let token = fixture.token_for(vec![EntityClaim::new("test", 1)]);

        let response = fixture
            .get_with_token("/api/v1/apples/sub/hello", &token)
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json, json!({"detail": "Not Found"}));

        fixture
            .get("/api/v1/apples/sub/hello")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        fixture
            .request(Method::PUT, "/api/v1/apples/sub/hello")
            .await
            .assert_status(StatusCode::NOT_FOUND);

        fixture.get("/api/v1/apples/sub/7").await.assert_unauthorized();
        let response = fixture.get_with_token("/api/v1/apples/sub/7", &token).await;
        response.assert_ok();
        assert_eq!(response.json, json!({"data": 7}));
    }

    #[tokio::test]
    async fn test_protected_dynamic_route_with_token() {
        let fixture = TestFixture::new().await;
        let token = fixture.token_for(vec![EntityClaim::new("test", 1)]);

        fixture.get("/api/v1/apples/sub/7").await.assert_unauthorized();

        let response = fixture.get_with_token("/api/v1/apples/sub/7", &token).await;
        response.assert_ok();
        assert_eq!(response.json, json!({"data": 7}));
    }

    #[tokio::test]
    async fn test_ignored_routes() {
        let fixture = TestFixture::new().await;
        fixture.get("/").await.assert_ok();
        fixture.get("/ignore").await.assert_ok();
        // A bad token on an ignored route is never looked at
        fixture.get_with_token("/ignore", "garbage").await.assert_ok();
    }

    #[tokio::test]
    async fn test_static_routes() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/static/images/Group.jpg").await;
        response.assert_ok();
        assert_eq!(response.json, json!({"file": "images/Group.jpg"}));
    }

    #[tokio::test]
    async fn test_custom_static_path() {
        let fixture = TestFixture::with_settings(|settings| {
            settings.static_url_path = "/static_copy".to_string();
        })
        .await;
        fixture.get("/static_copy/images/Group.jpg").await.assert_ok();
    }

    #[tokio::test]
    async fn test_pre_flight_request() {
        let fixture = TestFixture::new().await;
        fixture.request(Method::OPTIONS, "/").await.assert_ok();
        fixture
            .request(Method::OPTIONS, "/api/v1/me")
            .await
            .assert_ok();
    }

    #[tokio::test]
    async fn test_me_with_local_token() {
        let fixture = TestFixture::new().await;
        let token = fixture.token_for(vec![EntityClaim::new("test", 1)]);

        let response = fixture.get(format!("/api/v1/me?auth={token}")).await;
        response.assert_ok();
        assert_eq!(response.json, json!({"test": [[1, "joe"]]}));

        let response = fixture.get_with_token("/api/v1/me", &token).await;
        response.assert_ok();
        assert_eq!(response.json, json!({"test": [[1, "joe"]]}));
    }

    #[tokio::test]
    async fn test_me_rejections() {
        let fixture = TestFixture::new().await;
        fixture.get("/api/v1/me").await.assert_unauthorized();
        fixture
            .get_with_token("/api/v1/me", "garbage")
            .await
            .assert_unauthorized();

        let missing = fixture.token_for(vec![EntityClaim::new("test", 2)]);
        fixture
            .get_with_token("/api/v1/me", &missing)
            .await
            .assert_unauthorized();
    }

    #[tokio::test]
    async fn test_me_with_oauth_header() {
        let fixture = TestFixture::new().await;
        fixture
            .add_userinfo_mock("<access_token>", "jaco@gmail.com", 1)
            .await;

        let response = fixture
            .request_with_headers(
                Method::GET,
                "/api/v1/me",
                &[("X-Auth-Token", "Bearer <access_token>")],
            )
            .await;
        response.assert_ok();
        assert_eq!(response.json, json!({"oauth_tablename": [[1, "jaco@gmail.com"]]}));
    }

    #[tokio::test]
    async fn test_oauth_header_rejected_by_provider() {
        let fixture = TestFixture::new().await;
        // No userinfo mock: the provider answers 404
        fixture
            .request_with_headers(
                Method::GET,
                "/api/v1/me",
                &[("X-Auth-Token", "Bearer <revoked>")],
            )
            .await
            .assert_unauthorized();
    }

    #[tokio::test]
    async fn test_oauth_login_issues_local_token() {
        let fixture = TestFixture::new().await;
        fixture.add_token_mock("4abc", "<access_token>", 1).await;
        fixture
            .add_userinfo_mock("<access_token>", "jaco@gmail.com", 1)
            .await;

        let response = fixture.post("/oauth/login", &json!({"code": "4abc"})).await;
        response.assert_ok();
        assert_eq!(response.json["access_token"], "<access_token>");
        assert_eq!(response.json["expires_in"], 3599);

        let token = response.json["token"].as_str().unwrap().to_string();
        let response = fixture.get_with_token("/api/v1/me", &token).await;
        response.assert_ok();
        assert_eq!(response.json, json!({"oauth_tablename": [[1, "jaco@gmail.com"]]}));
    }

    #[tokio::test]
    async fn test_oauth_login_bad_code() {
        let fixture = TestFixture::new().await;
        let response = fixture.post("/oauth/login", &json!({"code": "used"})).await;
        response.assert_status(StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let fixture = TestFixture::new().await;
        fixture
            .get("/api/v1/nowhere")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
