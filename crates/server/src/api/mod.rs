// HTTP API surface.
//
// `ApiState` carries every shared resource; `router` wires the public
// routes (`/healthz`, `/auth/*`, `/redirect`, `/ws`) and the protected
// workspace routes behind the auth middleware.

pub mod auth;
pub mod channels;
pub mod me;
pub mod members;
pub mod messages;
pub mod redirect;
pub mod session;
pub mod workspaces;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};

use crate::auth::middleware::require_workspace_auth;
use crate::auth::session::SessionManager;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::store::ChatStore;
use crate::ws::{self, TopicRegistry};

#[derive(Clone)]
pub struct ApiState {
    pub store: ChatStore,
    pub sessions: SessionManager,
    pub registry: Arc<TopicRegistry>,
    pub config: Arc<ServerConfig>,
}

impl ApiState {
    pub fn new(store: ChatStore, config: Arc<ServerConfig>) -> Self {
        let sessions = SessionManager::new(store.clone(), config.environment.is_production());
        Self { store, sessions, registry: Arc::new(TopicRegistry::new()), config }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(store: ChatStore) -> Self {
        Self::new(store, Arc::new(ServerConfig::for_tests()))
    }
}

pub fn router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/session", get(session::get_session))
        .route("/logout", post(session::logout))
        .route("/workspaces", get(workspaces::get_workspace))
        .route("/channels", get(channels::get_channel).post(channels::create_channel))
        .route("/members", get(members::get_member))
        .route("/me/channels", get(me::my_channels))
        .route("/me/dms", get(me::my_dms))
        .route("/messages", get(messages::list_messages).post(messages::create_message))
        .route("/messages/{slug}", put(messages::update_message).delete(messages::delete_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_workspace_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/redirect", get(redirect::follow_redirect))
        .route("/ws", get(ws::ws_upgrade))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), csrf_origin_check))
        .with_state(state)
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Cross-origin write protection for the cookie-authenticated surface:
/// mutating requests that carry an `Origin` header must come from one of
/// the configured site origins. Requests without the header (curl,
/// server-to-server) pass through.
async fn csrf_origin_check(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let mutating = matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    if mutating {
        if let Some(origin) = request.headers().get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
            if !is_trusted_origin(&state.config, origin) {
                return ApiError::forbidden().into_response();
            }
        }
    }
    next.run(request).await
}

fn is_trusted_origin(config: &ServerConfig, origin: &str) -> bool {
    let origin = origin.trim_end_matches('/');
    origin == config.base_url.trim_end_matches('/')
        || origin == config.website_url.trim_end_matches('/')
}
