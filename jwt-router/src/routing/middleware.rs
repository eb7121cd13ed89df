use super::{Decision, JwtRouter};
use axum::{
    body::Body,
    extract::{OriginalUri, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};

/// Runs [`JwtRouter::before_middleware`] for every request, publishing the
/// resolved entities into the request extensions or short-circuiting with
/// the rejection.
pub async fn jwt_middleware(
    State(router): State<JwtRouter>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // Nested routers see a trimmed URI, policy works on the full one
    let uri = request
        .extensions()
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| request.uri().clone());

    match router
        .before_middleware(request.method(), &uri, request.headers())
        .await
    {
        Ok(Decision::Authorized(context)) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Ok(_) => next.run(request).await,
        Err(rejection) => rejection.into_response(),
    }
}

/// Guards every route registered on `router` so far. Requests matching no
/// route keep the router's own 404.
pub fn protect<S>(router: Router<S>, guard: JwtRouter) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(guard, jwt_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteEntry, RouterConfig, Settings};
    use crate::context::RequestContext;
    use crate::entity::memory::InMemoryModel;
    use crate::token::EntityClaim;
    use axum::routing::get;
    use axum::Json;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn guard() -> JwtRouter {
        let users = InMemoryModel::new("test", "user_name");
        users.insert(json!({"id": 1, "user_name": "joe"})).await.unwrap();

        let settings = Settings {
            white_list_routes: vec![RouteEntry::new("GET", "/open").unwrap()],
            api_name: None,
            ..Settings::for_test()
        };
        let config = RouterConfig::init_config(&settings).unwrap();
        JwtRouter::new(config, vec![Arc::new(users)], None).unwrap()
    }

    async fn whoami(context: RequestContext) -> Json<Value> {
        Json(json!({ "test": context.entities("test") }))
    }

    /// Helper function to set up a guarded app, with some routes nested
    async fn setup_app(guard: JwtRouter) -> Router {
        let nested = Router::new().route("/me", get(whoami));
        let app = Router::new()
            .route("/open", get(whoami))
            .route("/me", get(whoami))
            .nest("/v2", nested);
        protect(app, guard)
    }

    async fn send(app: &Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_authorized_request_reaches_handler() {
        let guard = guard().await;
        let token = guard.create_token(vec![EntityClaim::new("test", 1)]).unwrap();
        let app = setup_app(guard).await;

        let (status, body) = send(&app, &format!("/me?auth={token}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"test": [[1, "joe"]]}));
    }

    #[tokio::test]
    async fn test_rejection_short_circuits() {
        let app = setup_app(guard().await).await;
        let (status, body) = send(&app, "/me").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"detail": "Unauthorized"}));
    }

    #[tokio::test]
    async fn test_white_listed_gets_empty_context() {
        let app = setup_app(guard().await).await;
        let (status, body) = send(&app, "/open").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"test": []}));
    }

    #[tokio::test]
    async fn test_nested_routes_see_full_path() {
        let guard = guard().await;
        let token = guard.create_token(vec![EntityClaim::new("test", 1)]).unwrap();
        let app = setup_app(guard).await;

        let (status, _) = send(&app, "/v2/me").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, &format!("/v2/me?auth={token}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"test": [[1, "joe"]]}));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_guarded() {
        let app = setup_app(guard().await).await;
        let (status, _) = send(&app, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
