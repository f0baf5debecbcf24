use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::SecurityService;
use crate::config::api_key_header_from_env;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{authz, health};
use crate::store::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub security: Arc<SecurityService>,
    pub api_key_header: Arc<str>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, api_key_header: impl Into<Arc<str>>) -> Self {
        let store = Arc::new(SqliteStore::new(pool.clone()));
        Self {
            pool,
            jwt: Arc::new(jwt),
            security: Arc::new(SecurityService::from_store(store)),
            api_key_header: api_key_header.into(),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let state = AppState::new(pool, jwt_config, api_key_header_from_env());
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    // every authz route is scoped to a project: /v2/projects/:project_id/authz
    let authz_routes = Router::new()
        .route("/scopes", get(authz::list_scopes))
        .route("/scope", post(authz::check_scope))
        .route("/languages", post(authz::check_languages))
        .route("/languages/viewable", post(authz::filter_viewable_languages))
        .route("/keys", post(authz::check_keys))
        .route("/api-key-scopes", post(authz::check_api_key_scopes));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/v2/projects/:project_id/authz", authz_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
