use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use shared::jwt::{JwtConfig, JwtError};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, rate_limit_middleware, require_user_auth,
    security_headers_middleware, trace_id, RateLimiterState,
};
use crate::routes::{auth, backup, health, purchase, user};
use crate::services::SmsSender;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtConfig>,
    pub rate_limiter: Option<Arc<RateLimiterState>>,
    pub sms_sender: Arc<dyn SmsSender>,
}

impl AppState {
    pub fn new(
        config: Config,
        pool: SqlitePool,
        sms_sender: Arc<dyn SmsSender>,
    ) -> Result<Self, JwtError> {
        let jwt = Arc::new(config.jwt.build()?);

        // Rate limiting is off when rate_limit_per_minute is 0
        let rate_limiter = if config.security.rate_limit_per_minute > 0 {
            Some(Arc::new(RateLimiterState::new(
                config.security.rate_limit_per_minute,
            )))
        } else {
            None
        };

        Ok(Self {
            pool,
            config: Arc::new(config),
            jwt,
            rate_limiter,
            sms_sender,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    let cors = if config.security.cors_origins.is_empty() {
        // Development: allow any origin
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Signed-in routes. Auth is the outer route layer so the rate limiter
    // can key on the user id.
    let protected_routes = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/user/profile",
            get(user::get_profile).put(user::update_profile),
        )
        .route("/api/user/password", put(user::change_password))
        .route("/api/backup/upload", post(backup::upload))
        .route("/api/backup/download", get(backup::download))
        .route("/api/backup/info", get(backup::info))
        .route("/api/backup/settings", put(backup::update_settings))
        .route("/api/backup/clear", delete(backup::clear))
        .route("/api/purchase/verify", post(purchase::verify))
        .route("/api/purchase/status", get(purchase::status))
        .route("/api/purchase/restore", post(purchase::restore))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    // Sign-in routes are limited per client IP
    let auth_routes = Router::new()
        .route("/api/auth/send-sms", post(auth::send_sms))
        .route("/api/auth/verify-sms", post(auth::verify_sms))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/register-no-sms", post(auth::register_without_sms))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/login-sms", post(auth::login_sms))
        .route("/api/auth/login-alipay", post(auth::login_alipay))
        .route("/api/auth/login-google", post(auth::login_google))
        .route("/api/auth/refresh", post(auth::refresh))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/api/purchase/config-status", get(purchase::config_status))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(protected_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security_headers_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
