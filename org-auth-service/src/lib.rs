pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AuthConfig;
use crate::middleware::{auth_middleware, csrf_middleware};
use crate::services::{
    AccountStore, AuthService, AuthSettings, AuthorizationService, CsrfService, EmailNotifier,
    EventPublisher, JwtService, MembershipStore, OrganizationService, TeamService, TokenIssuer,
    CSRF_HEADER,
};
use crate::utils::PasswordHasher;

/// Infrastructure adapters the application is assembled from.
pub struct Ports {
    pub accounts: Arc<dyn AccountStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub email: Arc<dyn EmailNotifier>,
    pub events: Arc<dyn EventPublisher>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub auth_service: AuthService,
    pub organizations: OrganizationService,
    pub teams: TeamService,
    pub csrf: CsrfService,
    pub tokens: Arc<dyn TokenIssuer>,
    pub accounts: Arc<dyn AccountStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub login_rate_limiter: IpRateLimiter,
    pub register_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(config: AuthConfig, ports: Ports) -> Self {
        let tokens: Arc<dyn TokenIssuer> = Arc::new(JwtService::new(&config.jwt));

        let auth_service = AuthService::new(
            ports.accounts.clone(),
            ports.hasher,
            tokens.clone(),
            ports.email,
            ports.events.clone(),
            AuthSettings {
                public_base_url: config.public_base_url.clone(),
                verification_ttl: chrono::Duration::minutes(
                    config.tokens.verification_ttl_minutes,
                ),
            },
        );

        let authz = AuthorizationService::new(ports.memberships.clone());
        let organizations = OrganizationService::new(
            ports.memberships.clone(),
            ports.accounts.clone(),
            authz.clone(),
            ports.events.clone(),
            chrono::Duration::days(config.tokens.invitation_ttl_days),
        );
        let teams = TeamService::new(ports.memberships.clone(), authz, ports.events);

        let limits = &config.rate_limit;
        let login_rate_limiter =
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds);
        let register_rate_limiter =
            create_ip_rate_limiter(limits.register_attempts, limits.register_window_seconds);
        let ip_rate_limiter =
            create_ip_rate_limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        Self {
            csrf: CsrfService::new(config.csrf.secret.clone()),
            config,
            auth_service,
            organizations,
            teams,
            tokens,
            accounts: ports.accounts,
            memberships: ports.memberships,
            login_rate_limiter,
            register_rate_limiter,
            ip_rate_limiter,
        }
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    // Cookie-authenticated session endpoints
    let session_routes = Router::new()
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .layer(from_fn_with_state(state.clone(), csrf_middleware));

    // Bearer-authenticated routes; auth runs before the CSRF check
    let protected_routes = Router::new()
        .route("/users/me", get(handlers::user::get_me))
        .route(
            "/users/me/password",
            post(handlers::user::change_password),
        )
        .route(
            "/organizations",
            post(handlers::org::create_organization).get(handlers::org::list_organizations),
        )
        .route(
            "/organizations/:org_id",
            get(handlers::org::get_organization)
                .patch(handlers::org::update_organization)
                .delete(handlers::org::delete_organization),
        )
        .route(
            "/organizations/:org_id/leave",
            post(handlers::org::leave_organization),
        )
        .route(
            "/organizations/:org_id/members",
            get(handlers::org::list_members),
        )
        .route(
            "/organizations/:org_id/members/:user_id",
            patch(handlers::org::update_member_role).delete(handlers::org::remove_member),
        )
        .route(
            "/organizations/:org_id/invitations",
            post(handlers::org::invite_member).get(handlers::org::list_invitations),
        )
        .route(
            "/invitations/accept",
            post(handlers::org::accept_invitation),
        )
        .route(
            "/organizations/:org_id/teams",
            post(handlers::team::create_team).get(handlers::team::list_teams),
        )
        .route(
            "/organizations/:org_id/teams/:team_id",
            get(handlers::team::get_team)
                .patch(handlers::team::update_team)
                .delete(handlers::team::delete_team),
        )
        .route(
            "/organizations/:org_id/teams/:team_id/leader",
            post(handlers::team::change_team_leader),
        )
        .route(
            "/organizations/:org_id/teams/:team_id/members",
            post(handlers::team::add_team_member).get(handlers::team::list_team_members),
        )
        .route(
            "/organizations/:org_id/teams/:team_id/members/:user_id",
            service_core::axum::routing::delete(handlers::team::remove_team_member),
        )
        .layer(from_fn_with_state(state.clone(), csrf_middleware))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/auth/verify", get(handlers::auth::verify_email))
        .route(
            "/auth/verify/resend",
            post(handlers::auth::resend_verification),
        )
        .route("/auth/google", get(handlers::auth::google_login))
        .route(
            "/auth/google/callback",
            get(handlers::auth::google_callback),
        )
        .merge(login_route)
        .merge(register_route)
        .merge(session_routes)
        .merge(protected_routes)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config));

    Ok(app)
}

fn cors_layer(config: &AuthConfig) -> CorsLayer {
    // Credentialed CORS cannot use a wildcard, so only concrete origins are kept.
    let origins: Vec<HeaderValue> = config
        .security
        .allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(CSRF_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.accounts.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Account store health check failed");
        AppError::ServiceUnavailable
    })?;

    state.memberships.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Membership store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "accounts": "up",
            "memberships": "up"
        }
    })))
}
