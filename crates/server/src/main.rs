mod api;
mod auth;
mod config;
mod cors;
mod db;
mod error;
mod store;
mod validation;
mod ws;

use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::api::ApiState;
use crate::config::ServerConfig;
use crate::error::{
    attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope, ApiError,
    ErrorCode,
};
use crate::store::ChatStore;
use crate::validation::MAX_REQUEST_BODY_BYTES;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = std::sync::Arc::new(ServerConfig::from_env());

    let env_filter = tracing_subscriber::EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if config.environment.is_production() {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let database_url = config
        .database_url
        .clone()
        .context("HUDDLE_DATABASE_URL must be set")?;
    let pool_config = db::pool::PoolConfig::from_env(config.environment.is_production());
    let pool = db::pool::create_pg_pool(&database_url, pool_config)
        .await
        .context("failed to initialize the PostgreSQL pool")?;
    db::migrations::run_migrations(&pool).await.context("failed to apply migrations")?;
    db::pool::check_pool_health(&pool).await.context("PostgreSQL health check failed")?;

    let listen_addr = config.listen_addr;
    let state = ApiState::new(ChatStore::Postgres(pool), config.clone());
    let app = apply_middleware(api::router(state), &config);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {listen_addr}"))?;

    info!(listen_addr = %listen_addr, "starting chat server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("chat server exited unexpectedly")
}

fn apply_middleware(router: Router, config: &ServerConfig) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(timeout_middleware))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
        .layer(cors::cors_layer(config))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

/// Handlers run on a spawned task so a panic surfaces as the 500 envelope
/// instead of tearing the connection down.
async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            ApiError::from_code(ErrorCode::InternalServerError).into_response()
        }
    }
}

/// The WebSocket upgrade response itself is fast; the long-lived socket
/// runs outside this future, so the deadline never touches it.
async fn timeout_middleware(request: Request<Body>, next: Next) -> Response {
    match tokio::time::timeout(REQUEST_TIMEOUT, next.run(request)).await {
        Ok(response) => response,
        Err(_elapsed) => ApiError::from_code(ErrorCode::RequestTimeout).into_response(),
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response =
        with_request_id_scope(request_id.clone(), async move { next.run(request).await }).await;

    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
