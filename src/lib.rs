//! Feedloop - multi-tenant feedback collection with an embeddable widget,
//! an owner dashboard and an RBAC admin backoffice.

pub mod analytics;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod helpers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod rbac;
pub mod retention;
pub mod schema;
pub mod telemetry;
pub mod webhooks;
pub mod widget;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use auth::jwt::JwtConfig;
use auth::lockout::LockoutManager;
use auth::password::Passwords;
use cache::{create_redis_pool, CacheServices};
use config::PublicWidgetConfig;
use middleware::{
    metrics::metrics_middleware,
    rate_limit::{
        auth_rate_limit_middleware, rate_limit_middleware, widget_rate_limit_middleware,
        RateLimitConfig, RateLimitState,
    },
    request_id::request_id_middleware,
};
use telemetry::MetricsState;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub rate_limit: RateLimitState,
    pub jwt_config: Arc<JwtConfig>,
    pub cache: CacheServices,
    pub lockout: Arc<LockoutManager>,
    pub passwords: Passwords,
    pub metrics: MetricsState,
    pub widget: PublicWidgetConfig,
    /// Reset tokens are only echoed in responses outside production.
    pub is_production: bool,
    pub reset_token_expiry_secs: i64,
    pub webhook_max_attempts: i32,
}

impl AppState {
    pub fn new(db_pool: DbPool, redis_pool: Option<deadpool_redis::Pool>, config: &Config) -> Self {
        let rate_limit = if config.security.rate_limiting_enabled {
            RateLimitState::with_config(
                RateLimitConfig::new(config.security.rate_limit_requests_per_minute, 60),
                RateLimitConfig::strict(),
                RateLimitConfig::new(config.widget.rate_limit_requests_per_minute, 60),
            )
        } else {
            RateLimitState::disabled()
        };

        let jwt_config = JwtConfig::from_env_with_expiry(
            config.jwt.access_token_expiry_secs,
            config.jwt.issuer.clone(),
            config.jwt.audience.clone(),
        );

        let redis_pool = redis_pool.or_else(|| create_redis_pool(&config.redis));
        let cache = CacheServices::new(redis_pool.clone());
        let lockout = LockoutManager::new(
            redis_pool,
            config.security.max_failed_login_attempts,
            config.security.lockout_duration_mins,
        );

        let metrics = MetricsState::new(config.telemetry.metrics_enabled);

        Self {
            db_pool,
            rate_limit,
            jwt_config: Arc::new(jwt_config),
            cache,
            lockout: Arc::new(lockout),
            passwords: Passwords::from(&config.security),
            metrics,
            widget: config.widget.clone(),
            is_production: config.server.environment.is_production(),
            reset_token_expiry_secs: config.jwt.reset_token_expiry_secs,
            webhook_max_attempts: config.webhooks.max_attempts.max(1),
        }
    }
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let rate_limit_state = state.rate_limit.clone();

    let metrics_state = state.metrics.clone();
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check_simple))
        .route("/health/status", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::ready_check))
        .route("/health/live", get(handlers::health::live_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(metrics_state),
        )
        .with_state(state.clone());

    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route(
            "/api/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .layer(axum_middleware::from_fn(auth_rate_limit_middleware))
        .with_state(state.clone());

    // Embedded on arbitrary sites; origin checks happen per project.
    let widget_routes = Router::new()
        .route("/api/v1/widget/config", get(handlers::widget::widget_config))
        .route("/api/v1/widget/step", get(handlers::widget::widget_step))
        .route(
            "/api/v1/widget/feedback",
            post(handlers::widget::submit_feedback),
        )
        .route("/api/v1/widget/p/{slug}", get(handlers::widget::public_page))
        .layer(axum_middleware::from_fn(widget_rate_limit_middleware))
        .with_state(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let protected_routes = Router::new()
        .route(
            "/api/user/profile",
            get(handlers::user::get_profile).put(handlers::user::update_profile),
        )
        .route(
            "/api/user/change-password",
            post(handlers::user::change_password),
        )
        .route(
            "/api/dashboard/projects",
            post(handlers::projects::create_project).get(handlers::projects::list_projects),
        )
        .route(
            "/api/dashboard/projects/{id}",
            get(handlers::projects::get_project)
                .put(handlers::projects::update_project)
                .delete(handlers::projects::delete_project),
        )
        .route(
            "/api/dashboard/projects/{id}/widget",
            put(handlers::projects::update_widget),
        )
        .route(
            "/api/dashboard/projects/{id}/api-key",
            post(handlers::projects::rotate_api_key),
        )
        .route(
            "/api/dashboard/projects/{id}/share",
            get(handlers::projects::share_project),
        )
        .route(
            "/api/dashboard/projects/{id}/feedback",
            get(handlers::feedback::list_feedback).patch(handlers::feedback::bulk_update_status),
        )
        .route(
            "/api/dashboard/projects/{id}/feedback/{feedback_id}",
            get(handlers::feedback::get_feedback),
        )
        .route(
            "/api/dashboard/projects/{id}/analytics",
            get(handlers::analytics::project_analytics),
        )
        .route(
            "/api/dashboard/projects/{id}/webhooks",
            get(handlers::webhooks::list_webhooks).post(handlers::webhooks::create_webhook),
        )
        .route(
            "/api/dashboard/projects/{id}/webhooks/{webhook_id}",
            delete(handlers::webhooks::delete_webhook),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/api/admin/users", get(handlers::users::list_users))
        .route(
            "/api/admin/users/{id}",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route(
            "/api/admin/users/{id}/roles",
            put(handlers::users::set_user_roles),
        )
        .route(
            "/api/admin/roles",
            get(handlers::roles::list_roles).post(handlers::roles::create_role),
        )
        .route(
            "/api/admin/roles/{id}",
            get(handlers::roles::get_role)
                .put(handlers::roles::update_role)
                .delete(handlers::roles::delete_role),
        )
        .route(
            "/api/admin/permissions",
            get(handlers::permissions::list_permissions)
                .post(handlers::permissions::create_permission),
        )
        .route(
            "/api/admin/permissions/{id}",
            delete(handlers::permissions::delete_permission),
        )
        .route(
            "/api/admin/resources",
            get(handlers::resources::list_resources).post(handlers::resources::create_resource),
        )
        .route(
            "/api/admin/resources/{id}",
            delete(handlers::resources::delete_resource),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .with_state(state.clone());

    let docs_routes = openapi::swagger_router();

    let dashboard_app = Router::new()
        .merge(docs_routes)
        .merge(public_routes)
        .merge(auth_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(cors);

    Router::new()
        .merge(dashboard_app)
        .merge(widget_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(rate_limit_state))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Not found", "code": "NOT_FOUND"})),
    )
}

/// Dashboard CORS. A wildcard (or empty) origin list combined with
/// credentials mirrors the request origin, since browsers refuse `*` there.
fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::{header::HeaderName, HeaderValue, Method};
    use tower_http::cors::AllowOrigin;

    let cors = &config.cors;
    let wildcard = cors.allowed_origins.is_empty() || cors.allowed_origins.iter().any(|o| o == "*");

    let origin = match (wildcard, cors.allow_credentials) {
        (true, true) => AllowOrigin::mirror_request(),
        (true, false) => AllowOrigin::from(Any),
        (false, _) => AllowOrigin::list(
            cors.allowed_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        ),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(
            cors.allowed_methods
                .iter()
                .filter_map(|m| m.parse::<Method>().ok())
                .collect::<Vec<_>>(),
        )
        .allow_headers(
            cors.allowed_headers
                .iter()
                .filter_map(|h| h.parse::<HeaderName>().ok())
                .collect::<Vec<_>>(),
        )
        .allow_credentials(cors.allow_credentials)
        .max_age(Duration::from_secs(cors.max_age_secs))
}

fn build_db_pool(url: &str, db: &config::DatabaseConfig) -> DbPool {
    r2d2::Pool::builder()
        .max_size(db.max_connections)
        .min_idle(Some(db.min_connections))
        .connection_timeout(Duration::from_secs(db.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(db.idle_timeout_secs)))
        .build(ConnectionManager::<PgConnection>::new(url))
        .expect("Failed to create database pool")
}

pub fn create_db_pool(config: &config::Config) -> DbPool {
    build_db_pool(&config.database.url, &config.database)
}

/// Pool for an explicit URL with the default sizing; used by integration tests.
pub fn create_db_pool_with_url(database_url: &str) -> DbPool {
    let defaults = config::DatabaseConfig {
        url: database_url.to_string(),
        max_connections: 10,
        min_connections: 2,
        connection_timeout_secs: 30,
        idle_timeout_secs: 600,
    };
    build_db_pool(database_url, &defaults)
}

pub fn init_tracing(config: &config::Config) {
    telemetry::init_telemetry(config);
}

pub use telemetry::tracing::shutdown_telemetry;

pub use config::Config;
