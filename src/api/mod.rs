//! HTTP surface: shared state, route table and the request pipeline.

pub mod characters;
pub mod error;
pub mod health;
pub mod worlds;

pub use error::ApiError;

use crate::auth::{
    api::{create_authentication_token, register_user},
    authenticate,
    permissions::{CHARACTERS_READ, CHARACTERS_WRITE, WORLDS_READ, WORLDS_WRITE},
    require_permission, AuthState, PermissionGate, PermissionRepository, PermissionSource,
    TokenStore, UserRepository,
};
use crate::config::Config;
use crate::middleware::{
    cors_layer, forward_untrusted_preflight, rate_limit_middleware, recover_panic,
    request_logging, RateLimiter, TrustedOrigins,
};
use crate::objects::ObjectStore;
use crate::services::Services;
use crate::store::{StoreClient, StoreError};
use axum::{
    extract::FromRef,
    http::{header, StatusCode},
    middleware::{from_fn, from_fn_with_state, map_response},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, MethodRouter},
    Router,
};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthState,
    pub services: Services,
    pub limiter: RateLimiter,
}

impl AppState {
    /// Opens the store named by `config.db_path`.
    pub fn from_config(config: Config) -> Result<Self, StoreError> {
        let store = StoreClient::open(&config.db_path)?;
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: StoreClient) -> Self {
        let objects = ObjectStore::new(&config.blob_dir, &config.blob_base_url);
        let auth = AuthState {
            users: UserRepository::new(store.clone(), config.bcrypt_cost),
            tokens: TokenStore::new(store.clone()),
            permissions: PermissionRepository::new(store.clone()),
            token_ttl: config.token_ttl(),
            default_permissions: Arc::new(config.default_permissions()),
        };

        Self {
            limiter: RateLimiter::new(config.rate_limit()),
            services: Services::new(store, objects),
            auth,
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for Services {
    fn from_ref(state: &AppState) -> Self {
        state.services.clone()
    }
}

/// Build the full application router.
///
/// Pipeline, outermost first: panic recovery, request logging, CORS, rate
/// limiting, authentication, then per-route permission gates.
pub fn create_router(state: AppState) -> Router {
    let permissions: Arc<dyn PermissionSource> = Arc::new(state.auth.permissions.clone());
    let origins = TrustedOrigins::new(&state.config.trusted_origins());
    let gated = |method_router: MethodRouter<AppState>, code: &'static str| {
        method_router.route_layer(from_fn_with_state(
            PermissionGate::new(permissions.clone(), code),
            require_permission,
        ))
    };

    Router::new()
        .route("/v1/healthcheck", get(health::healthcheck))
        .route("/v1/users", post(register_user))
        .route("/v1/tokens/authentication", post(create_authentication_token))
        .route(
            "/v1/worlds",
            gated(post(worlds::create_world), WORLDS_WRITE)
                .merge(gated(get(worlds::list_worlds), WORLDS_READ)),
        )
        .route(
            "/v1/worlds/:world_id",
            gated(get(worlds::get_world), WORLDS_READ)
                .merge(gated(patch(worlds::update_world), WORLDS_WRITE))
                .merge(gated(delete(worlds::delete_world), WORLDS_WRITE)),
        )
        .route(
            "/v1/worlds/:world_id/characters",
            gated(post(characters::create_character), CHARACTERS_WRITE)
                .merge(gated(get(characters::list_characters), CHARACTERS_READ)),
        )
        .route(
            "/v1/worlds/:world_id/characters/:character_id",
            gated(get(characters::get_character), CHARACTERS_READ)
                .merge(gated(patch(characters::update_character), CHARACTERS_WRITE))
                .merge(gated(delete(characters::delete_character), CHARACTERS_WRITE)),
        )
        .nest_service("/blobs", ServeDir::new(&state.config.blob_dir))
        .fallback(not_found)
        .layer(map_response(json_method_not_allowed))
        .layer(from_fn_with_state(state.auth.clone(), authenticate))
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit_middleware))
        .layer(cors_layer(&origins))
        .layer(from_fn_with_state(origins, forward_untrusted_preflight))
        .layer(from_fn(request_logging))
        .layer(CatchPanicLayer::custom(recover_panic))
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// The router answers unsupported methods with an empty 405; give it the
/// same JSON envelope as every other error.
async fn json_method_not_allowed(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED
        || response.headers().contains_key(header::CONTENT_TYPE)
    {
        return response;
    }

    let allow = response.headers().get(header::ALLOW).cloned();
    let mut json = ApiError::MethodNotAllowed.into_response();
    if let Some(allow) = allow {
        json.headers_mut().insert(header::ALLOW, allow);
    }
    json
}
