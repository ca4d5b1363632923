// Browser cross-origin policy for the cookie-authenticated API.
//
// The allowed origins are the configured chat client and website URLs,
// extended by `HUDDLE_CORS_ORIGINS` (comma-separated). Setting the
// variable to `*` opens the API to any origin and turns credentials
// off; the session cookie never rides a wildcard response.

use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::ServerConfig;

const CORS_ORIGINS_ENV: &str = "HUDDLE_CORS_ORIGINS";
const PREFLIGHT_CACHE_SECS: u64 = 3600;

pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    build_layer(config, std::env::var(CORS_ORIGINS_ENV).ok().as_deref())
}

fn build_layer(config: &ServerConfig, extra_origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(PREFLIGHT_CACHE_SECS));

    if extra_origins == Some("*") {
        return base.allow_origin(AllowOrigin::any());
    }

    base.allow_origin(allowed_origins(config, extra_origins)).allow_credentials(true)
}

fn allowed_origins(config: &ServerConfig, extra_origins: Option<&str>) -> Vec<HeaderValue> {
    let mut origins = vec![
        config.base_url.trim_end_matches('/').to_owned(),
        config.website_url.trim_end_matches('/').to_owned(),
    ];
    if let Some(extra) = extra_origins {
        origins.extend(
            extra
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_owned())
                .filter(|origin| !origin.is_empty()),
        );
    }
    origins.sort();
    origins.dedup();
    origins.iter().filter_map(|origin| HeaderValue::from_str(origin).ok()).collect()
}
