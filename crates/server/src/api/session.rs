// Session introspection and logout for an authenticated member.

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::api::ApiState;
use crate::auth::middleware::AuthContext;
use crate::error::{ok_empty_envelope, ok_envelope, ApiError};

/// The resolved member profile for the current session.
pub async fn get_session(Extension(ctx): Extension<AuthContext>) -> Json<Value> {
    ok_envelope(json!({ "user": ctx.member }))
}

pub async fn logout(
    State(state): State<ApiState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    state.sessions.invalidate(&ctx.session_id).await.map_err(ApiError::internal)?;

    let mut response = ok_empty_envelope().into_response();
    if let Ok(value) = HeaderValue::from_str(&state.sessions.blank_cookie()) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(response)
}
