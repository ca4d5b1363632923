// The bootstrap-token landing route. Browsers arrive here from the
// signup/login response; a valid token becomes a session cookie plus a
// 302 into the workspace. Every failure 302s back to the login page —
// this route never answers with JSON.

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use serde::Deserialize;
use tracing::debug;

use crate::api::ApiState;
use crate::auth::token;

#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    #[serde(rename = "t")]
    pub token: Option<String>,
}

pub async fn follow_redirect(
    State(state): State<ApiState>,
    Query(query): Query<RedirectQuery>,
) -> Response {
    let login_url = format!("{}/login", state.config.website_url.trim_end_matches('/'));

    let Some(token) = query.token else {
        return found(&login_url, None);
    };

    let claims = match token::verify(&token, &state.config.token_secret) {
        Ok(claims) => claims,
        Err(error) => {
            debug!(?error, "rejected redirect token");
            return found(&login_url, None);
        }
    };

    let workspace = match state.store.workspace_by_slug(&claims.workspace_slug).await {
        Ok(Some(workspace)) => workspace,
        _ => return found(&login_url, None),
    };
    let member = state.store.active_member(claims.user_id, &claims.workspace_slug).await;
    if !matches!(member, Ok(Some(_))) {
        return found(&login_url, None);
    }
    let channel_slug = match state.store.first_channel_slug(workspace.id).await {
        Ok(Some(slug)) => slug,
        _ => return found(&login_url, None),
    };

    let session = match state.sessions.create(claims.user_id).await {
        Ok(session) => session,
        Err(error) => {
            tracing::error!(?error, "failed to create session during redirect");
            return found(&login_url, None);
        }
    };

    let destination = format!(
        "{}/workspace/{}/{}",
        state.config.base_url.trim_end_matches('/'),
        workspace.slug,
        channel_slug
    );
    found(&destination, Some(&session.cookie))
}

fn found(location: &str, cookie: Option<&str>) -> Response {
    let mut response = Response::builder().status(StatusCode::FOUND);
    if let Ok(value) = HeaderValue::from_str(location) {
        response = response.header(header::LOCATION, value);
    }
    if let Some(cookie) = cookie {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            response = response.header(header::SET_COOKIE, value);
        }
    }
    response.body(axum::body::Body::empty()).unwrap_or_default()
}
