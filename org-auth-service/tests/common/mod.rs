//! Shared setup for integration tests: the full application wired to
//! in-memory stores, a cheap password hasher and a recording mailer.

#![allow(dead_code)]

use argon2::Params;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, Response, StatusCode},
    Router,
};
use org_auth_service::{
    build_router,
    config::{
        AuthConfig, CsrfConfig, DatabaseConfig, Environment, JwtConfig, RateLimitConfig,
        SecurityConfig, TokenTtlConfig,
    },
    services::{
        AuthSession, DomainEvent, EventPublisher, InMemoryAccountStore, InMemoryMembershipStore,
        MockEmailService, RegisterInput, CSRF_COOKIE, CSRF_HEADER,
    },
    utils::Argon2Hasher,
    AppState, Ports,
};
use secrecy::Secret;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Secret1!";

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "org-auth-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        public_base_url: "http://localhost:8080".to_string(),
        database: DatabaseConfig {
            url: Secret::new("postgres://unused".to_string()),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            access_secret: Secret::new("test-access-secret-0123456789abcdef".to_string()),
            refresh_secret: Secret::new("test-refresh-secret-0123456789abcdef".to_string()),
            issuer: "org-auth-service-test".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        csrf: CsrfConfig {
            secret: Secret::new("test-csrf-secret-0123456789abcdef".to_string()),
        },
        tokens: TokenTtlConfig {
            verification_ttl_minutes: 30,
            invitation_ttl_days: 7,
        },
        smtp: None,
        google: None,
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            secure_cookies: false,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
            register_attempts: 100,
            register_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
    }
}

/// Keeps every published event for later assertions.
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingEventPublisher {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventPublisher for RecordingEventPublisher {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub accounts: Arc<InMemoryAccountStore>,
    pub memberships: Arc<InMemoryMembershipStore>,
    pub email: MockEmailService,
    pub events: Arc<RecordingEventPublisher>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config(), MockEmailService::new()).await
    }

    pub async fn spawn_with(config: AuthConfig, email: MockEmailService) -> Self {
        let accounts = Arc::new(InMemoryAccountStore::new());
        let memberships = Arc::new(InMemoryMembershipStore::new());
        let events = Arc::new(RecordingEventPublisher::default());

        // minimal argon2 cost keeps the suite fast
        let hasher = Argon2Hasher::with_params(Params::new(1024, 1, 1, None).unwrap());

        let state = AppState::new(
            config,
            Ports {
                accounts: accounts.clone(),
                memberships: memberships.clone(),
                hasher: Arc::new(hasher),
                email: Arc::new(email.clone()),
                events: events.clone(),
            },
        );
        let router = build_router(state.clone()).await.expect("router builds");

        Self {
            state,
            router,
            accounts,
            memberships,
            email,
            events,
        }
    }

    /// Register through the service layer, bypassing HTTP.
    pub async fn register(&self, email: &str) -> AuthSession {
        self.state
            .auth_service
            .register(RegisterInput {
                email: email.to_string(),
                password: PASSWORD.to_string(),
                profile: Default::default(),
            })
            .await
            .expect("registration succeeds")
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        TestResponse::read(response).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> TestResponse {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Log in over HTTP and capture the cookies the browser would keep.
    pub async fn http_login(&self, email: &str, password: &str) -> BrowserSession {
        let res = self
            .post_json(
                "/auth/login",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {}", res.body);
        BrowserSession::from_response(&res)
    }
}

/// Buffered response with cookies pulled out of `Set-Cookie`.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub set_cookies: Vec<String>,
    pub body: Value,
}

impl TestResponse {
    async fn read(response: Response<Body>) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let set_cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Self {
            status,
            headers,
            set_cookies,
            body,
        }
    }

    /// Full `Set-Cookie` line for a cookie name.
    pub fn set_cookie(&self, name: &str) -> Option<&str> {
        let prefix = format!("{}=", name);
        self.set_cookies
            .iter()
            .find(|c| c.starts_with(&prefix))
            .map(String::as_str)
    }

    pub fn cookie_value(&self, name: &str) -> Option<String> {
        self.set_cookie(name)
            .and_then(|c| c.split(';').next())
            .and_then(|pair| pair.split_once('='))
            .map(|(_, value)| value.to_string())
    }
}

/// Access token plus the two cookies of one browser session.
#[derive(Debug, Clone)]
pub struct BrowserSession {
    pub access_token: String,
    pub refresh_token: String,
    pub csrf_token: String,
    pub account_id: Uuid,
}

impl BrowserSession {
    pub fn from_response(res: &TestResponse) -> Self {
        Self {
            access_token: res.body["accessToken"].as_str().unwrap().to_string(),
            refresh_token: res.cookie_value("refresh_token").expect("refresh cookie"),
            csrf_token: res.cookie_value(CSRF_COOKIE).expect("csrf cookie"),
            account_id: res.body["account"]["id"].as_str().unwrap().parse().unwrap(),
        }
    }

    /// Request carrying bearer token, both cookies and the CSRF header.
    pub fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header(
                header::COOKIE,
                format!(
                    "refresh_token={}; {}={}",
                    self.refresh_token, CSRF_COOKIE, self.csrf_token
                ),
            )
            .header(CSRF_HEADER, &self.csrf_token);

        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }
}
