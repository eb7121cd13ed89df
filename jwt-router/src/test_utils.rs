use crate::app::create_app;
use crate::config::{OAuthOptions, RouteEntry, Settings};
use crate::entity::memory::InMemoryModel;
use crate::entity::EntityModel;
use crate::state::AppState;
use crate::token::EntityClaim;
use axum::body::Body;
use axum::Router;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

/// Test fixture running the reference application against in-memory entity
/// tables and a mocked OAuth provider.
///
/// Entity tables:
/// - `test`: `{id: 1, user_name: "joe"}`
/// - `oauth_tablename`: `{id: 1, email: "jaco@gmail.com"}`
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     let token = fixture.token_for(vec![EntityClaim::new("test", 1)]);
///
///     let response = fixture.get_with_token("/api/v1/me", &token).await;
///     response.assert_ok();
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Application state shared with the router
    pub state: AppState,
    /// Mock server for the OAuth provider's token and userinfo endpoints
    pub oauth_mock: MockServer,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_settings(|_| {}).await
    }

    /// Creates a fixture after letting `customize` adjust the default
    /// settings
    pub async fn with_settings(customize: impl FnOnce(&mut Settings)) -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let oauth_mock = MockServer::start().await;
        let mut settings = Settings::for_test_with_mocks(&oauth_mock);
        customize(&mut settings);

        let state =
            AppState::new(settings, Self::models().await).expect("Invalid test settings");
        let app = create_app(state.clone());

        Self {
            app,
            state,
            oauth_mock,
        }
    }

    /// Initializes the test logger with customized settings.
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    async fn models() -> Vec<Arc<dyn EntityModel>> {
        let users = InMemoryModel::new("test", "user_name");
        users
            .insert(json!({"id": 1, "user_name": "joe"}))
            .await
            .expect("Failed to seed 'test'");

        let accounts = InMemoryModel::new("oauth_tablename", "email");
        accounts
            .insert(json!({"id": 1, "email": "jaco@gmail.com"}))
            .await
            .expect("Failed to seed 'oauth_tablename'");

        vec![Arc::new(users), Arc::new(accounts)]
    }

    /// Issues a token signed with the fixture's secret
    pub fn token_for(&self, entities: Vec<EntityClaim>) -> String {
        self.state
            .router
            .create_token(entities)
            .expect("Failed to create token")
    }

    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header("Content-Type", "application/json")
    }

    /// Sends a request without credentials
    pub async fn request(&self, method: Method, uri: impl AsRef<str>) -> TestResponse {
        self.request_with_headers(method, uri, &[]).await
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.request(Method::GET, uri).await
    }

    /// Sends a GET request with `Authorization: Bearer <token>`
    pub async fn get_with_token(&self, uri: impl AsRef<str>, token: &str) -> TestResponse {
        let bearer = format!("Bearer {token}");
        self.request_with_headers(Method::GET, uri, &[("Authorization", bearer.as_str())])
            .await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = self.request_builder(method, uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with a JSON body to the specified URI.
    pub async fn post<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(Method::POST, uri)
            .body(Body::from(json_body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and returns a TestResponse.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };

        TestResponse { status, json }
    }

    /// Makes the mocked userinfo endpoint answer `access_token` with
    /// `email`
    pub async fn add_userinfo_mock(&self, access_token: &str, email: &str, expected_calls: u64) {
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/userinfo"))
            .and(matchers::header(
                "authorization",
                format!("Bearer {access_token}").as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "1234",
                "email": email,
                "email_verified": true,
            })))
            .expect(expected_calls)
            .mount(&self.oauth_mock)
            .await;
    }

    /// Makes the mocked token endpoint exchange `code` for `access_token`
    pub async fn add_token_mock(&self, code: &str, access_token: &str, expected_calls: u64) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/token"))
            .and(matchers::body_string_contains(format!("code={code}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "expires_in": 3599,
            })))
            .expect(expected_calls)
            .mount(&self.oauth_mock)
            .await;
    }
}

impl Settings {
    /// Settings of the reference application, with the OAuth provider
    /// pointing at `oauth_mock`
    pub fn for_test_with_mocks(oauth_mock: &MockServer) -> Self {
        Self {
            white_list_routes: vec![
                RouteEntry::new("GET", "/test").expect("valid route"),
                RouteEntry::new("GET", "/bananas/sub").expect("valid route"),
                RouteEntry::new("PUT", "/apples/sub/<int:id>").expect("valid route"),
                RouteEntry::new("POST", "/oauth/login").expect("valid route"),
            ],
            ignored_routes: vec![
                RouteEntry::new("GET", "/").expect("valid route"),
                RouteEntry::new("GET", "/ignore").expect("valid route"),
            ],
            google_oauth: Some(OAuthOptions {
                token_url: Some(format!("{}/token", oauth_mock.uri())),
                userinfo_url: Some(format!("{}/userinfo", oauth_mock.uri())),
                ..OAuthOptions::new(
                    "<CLIENT_ID>",
                    "<CLIENT_SECRET>",
                    "http://localhost:3000",
                    "oauth_tablename",
                )
            }),
            ..Self::for_test()
        }
    }
}

/// Response from a test request that provides convenient access to status and JSON body.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body as JSON (if present and valid JSON)
    pub json: Value,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Asserts a 401 with the uniform body
    pub fn assert_unauthorized(&self) -> &Self {
        self.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(self.json, json!({"detail": "Unauthorized"}));
        self
    }
}
