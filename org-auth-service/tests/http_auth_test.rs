//! Session endpoints over HTTP: cookies, CSRF double-submit and status mapping.

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{test_config, BrowserSession, TestApp, PASSWORD};
use org_auth_service::services::{AccountStore, MockEmailService, CSRF_COOKIE, CSRF_HEADER};
use serde_json::json;

const ALICE: &str = "alice@example.com";

async fn register_alice(app: &TestApp) -> BrowserSession {
    let res = app
        .post_json(
            "/auth/register",
            json!({ "email": ALICE, "password": PASSWORD, "firstName": "Alice" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    BrowserSession::from_response(&res)
}

fn refresh_request(refresh_token: &str, csrf_cookie: Option<&str>, csrf_header: Option<&str>) -> Request<Body> {
    let mut cookie = format!("refresh_token={}", refresh_token);
    if let Some(csrf) = csrf_cookie {
        cookie.push_str(&format!("; {}={}", CSRF_COOKIE, csrf));
    }

    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/auth/refresh")
        .header(header::COOKIE, cookie);
    if let Some(csrf) = csrf_header {
        builder = builder.header(CSRF_HEADER, csrf);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn register_sets_session_cookies() {
    let app = TestApp::spawn().await;

    let res = app
        .post_json(
            "/auth/register",
            json!({ "email": ALICE, "password": PASSWORD, "firstName": "Alice" }),
        )
        .await;

    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["account"]["email"], ALICE);
    assert_eq!(res.body["account"]["firstName"], "Alice");
    assert_eq!(res.body["account"]["isVerified"], false);
    assert_eq!(res.body["tokenType"], "Bearer");
    assert!(res.body["accessToken"].is_string());
    assert!(res.body.get("refreshToken").is_none());
    assert!(res.body["account"].get("passwordHash").is_none());

    let refresh = res.set_cookie("refresh_token").expect("refresh cookie");
    assert!(refresh.contains("HttpOnly"));
    assert!(refresh.contains("SameSite=Strict"));
    assert!(refresh.contains("Path=/auth"));

    let csrf = res.set_cookie(CSRF_COOKIE).expect("csrf cookie");
    assert!(!csrf.contains("HttpOnly"));
    assert!(csrf.contains("Path=/"));

    assert!(app.email.last_link_for(ALICE).is_some());
}

#[tokio::test]
async fn register_and_login_errors_map_to_statuses() {
    let app = TestApp::spawn().await;
    register_alice(&app).await;

    let short = app
        .post_json(
            "/auth/register",
            json!({ "email": "bob@example.com", "password": "123" }),
        )
        .await;
    assert_eq!(short.status, StatusCode::UNPROCESSABLE_ENTITY);

    let duplicate = app
        .post_json(
            "/auth/register",
            json!({ "email": ALICE, "password": PASSWORD }),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let wrong = app
        .post_json(
            "/auth/login",
            json!({ "email": ALICE, "password": "not-the-password" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert!(wrong.set_cookies.is_empty());

    let unknown = app
        .post_json(
            "/auth/login",
            json!({ "email": "nobody@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let malformed = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn refresh_requires_matching_csrf_pair() {
    let app = TestApp::spawn().await;
    let session = register_alice(&app).await;
    let other_csrf = app.state.csrf.issue().unwrap();

    for request in [
        refresh_request(&session.refresh_token, None, None),
        refresh_request(&session.refresh_token, Some(&session.csrf_token), None),
        refresh_request(&session.refresh_token, None, Some(&session.csrf_token)),
        refresh_request(
            &session.refresh_token,
            Some(&session.csrf_token),
            Some(&other_csrf),
        ),
        refresh_request(&session.refresh_token, Some("forged.sig"), Some("forged.sig")),
    ] {
        let res = app.send(request).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    // failed CSRF checks never reached the session manager
    let res = app
        .send(refresh_request(
            &session.refresh_token,
            Some(&session.csrf_token),
            Some(&session.csrf_token),
        ))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
}

#[tokio::test]
async fn refresh_rotates_cookies_and_rejects_superseded_token() {
    let app = TestApp::spawn().await;
    let first = register_alice(&app).await;

    let res = app
        .send(refresh_request(
            &first.refresh_token,
            Some(&first.csrf_token),
            Some(&first.csrf_token),
        ))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let second = BrowserSession::from_response(&res);
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_ne!(second.csrf_token, first.csrf_token);

    let replay = app
        .send(refresh_request(
            &first.refresh_token,
            Some(&second.csrf_token),
            Some(&second.csrf_token),
        ))
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);

    let missing = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/refresh")
                .header(
                    header::COOKIE,
                    format!("{}={}", CSRF_COOKIE, second.csrf_token),
                )
                .header(CSRF_HEADER, &second.csrf_token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_cookies_and_ends_session() {
    let app = TestApp::spawn().await;
    let session = register_alice(&app).await;

    let res = app
        .send(session.request(Method::POST, "/auth/logout", None))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res
        .set_cookie("refresh_token")
        .is_some_and(|c| c.contains("Max-Age=0")));
    assert!(res
        .set_cookie(CSRF_COOKIE)
        .is_some_and(|c| c.contains("Max-Age=0")));

    let account = app.accounts.find_by_email(ALICE).await.unwrap().unwrap();
    assert!(account.session_marker.is_none());

    let again = app
        .send(refresh_request(
            &session.refresh_token,
            Some(&session.csrf_token),
            Some(&session.csrf_token),
        ))
        .await;
    assert_eq!(again.status, StatusCode::UNAUTHORIZED);

    // logging out twice still succeeds
    let res = app
        .send(session.request(Method::POST, "/auth/logout", None))
        .await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn profile_requires_bearer_token() {
    let app = TestApp::spawn().await;
    let session = register_alice(&app).await;

    let anonymous = app
        .send(
            Request::builder()
                .uri("/users/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let bogus = app
        .send(
            Request::builder()
                .uri("/users/me")
                .header(header::AUTHORIZATION, "Bearer invalid_token")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(bogus.status, StatusCode::UNAUTHORIZED);

    // a refresh token is not an access token
    let wrong_kind = app
        .send(
            Request::builder()
                .uri("/users/me")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", session.refresh_token),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(wrong_kind.status, StatusCode::UNAUTHORIZED);

    let me = app
        .send(session.request(Method::GET, "/users/me", None))
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], ALICE);
    assert_eq!(me.body["id"], session.account_id.to_string());
}

#[tokio::test]
async fn change_password_over_http() {
    let app = TestApp::spawn().await;
    let session = register_alice(&app).await;

    let missing_current = app
        .send(session.request(
            Method::POST,
            "/users/me/password",
            Some(json!({ "newPassword": "NewSecret2!" })),
        ))
        .await;
    assert_eq!(missing_current.status, StatusCode::BAD_REQUEST);

    let wrong_current = app
        .send(session.request(
            Method::POST,
            "/users/me/password",
            Some(json!({ "currentPassword": "nope-nope", "newPassword": "NewSecret2!" })),
        ))
        .await;
    assert_eq!(wrong_current.status, StatusCode::UNAUTHORIZED);

    let changed = app
        .send(session.request(
            Method::POST,
            "/users/me/password",
            Some(json!({ "currentPassword": PASSWORD, "newPassword": "NewSecret2!" })),
        ))
        .await;
    assert_eq!(changed.status, StatusCode::OK);

    let stale = app
        .send(refresh_request(
            &session.refresh_token,
            Some(&session.csrf_token),
            Some(&session.csrf_token),
        ))
        .await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);

    app.http_login(ALICE, "NewSecret2!").await;
}

#[tokio::test]
async fn verify_email_over_http() {
    let app = TestApp::spawn().await;
    register_alice(&app).await;

    let token = app
        .accounts
        .find_by_email(ALICE)
        .await
        .unwrap()
        .unwrap()
        .verification
        .unwrap()
        .token;

    let res = app
        .send(
            Request::builder()
                .uri(format!("/auth/verify?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["isVerified"], true);

    let reused = app
        .send(
            Request::builder()
                .uri(format!("/auth/verify?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(reused.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reused.body["error"], "Invalid token");

    let resend = app
        .post_json("/auth/verify/resend", json!({ "email": ALICE }))
        .await;
    assert_eq!(resend.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registration_succeeds_when_mail_is_down() {
    let app = TestApp::spawn_with(test_config(), MockEmailService::failing()).await;
    register_alice(&app).await;
}

#[tokio::test]
async fn login_is_rate_limited_per_ip() {
    let mut config = test_config();
    config.rate_limit.login_attempts = 2;
    config.rate_limit.login_window_seconds = 3600;
    let app = TestApp::spawn_with(config, MockEmailService::new()).await;

    let attempt = |ip: &'static str| {
        Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(
                json!({ "email": ALICE, "password": PASSWORD }).to_string(),
            ))
            .unwrap()
    };

    assert_eq!(app.send(attempt("203.0.113.7")).await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.send(attempt("203.0.113.7")).await.status, StatusCode::NOT_FOUND);

    let limited = app.send(attempt("203.0.113.7")).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers.get(header::RETRY_AFTER).is_some());

    assert_eq!(app.send(attempt("203.0.113.8")).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn google_sign_in_is_disabled_without_config() {
    let app = TestApp::spawn().await;

    let res = app
        .send(
            Request::builder()
                .uri("/auth/google")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_security_headers() {
    let app = TestApp::spawn().await;

    let res = app
        .send(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "healthy");
    assert_eq!(res.body["service"], "org-auth-service-test");
    assert_eq!(res.headers["x-request-id"], "req-42");
    assert_eq!(res.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(res.headers[header::X_FRAME_OPTIONS], "DENY");
}
