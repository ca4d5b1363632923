// Workspace authorization middleware for protected HTTP routes.
//
// Pipeline order is fixed: workspace query param, session cookie,
// session validation, membership resolution. The first gap wins and the
// response is always the 403 envelope. A validation failure also clears
// the client's cookie; a half-life extension reissues it.

use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::ApiState;
use crate::auth::resolver;
use crate::auth::session::session_id_from_headers;
use crate::error::ApiError;
use crate::store::{MemberIdentity, UserRecord, WorkspaceRef};

/// The authorization result injected into protected handlers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: UserRecord,
    pub session_id: String,
    pub workspace: WorkspaceRef,
    pub member: MemberIdentity,
}

pub async fn require_workspace_auth(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(workspace_slug) = request
        .uri()
        .query()
        .and_then(|query| query_param(query, "workspace"))
        .map(ToOwned::to_owned)
    else {
        return ApiError::forbidden().into_response();
    };

    let Some(session_id) = session_id_from_headers(request.headers()) else {
        return ApiError::forbidden().into_response();
    };

    let validated = match state.sessions.validate(&session_id).await {
        Ok(Some(validated)) => validated,
        Ok(None) => {
            let mut response = ApiError::forbidden().into_response();
            append_cookie(&mut response, &state.sessions.blank_cookie());
            return response;
        }
        Err(error) => return ApiError::internal(error).into_response(),
    };

    let resolved = match resolver::resolve(&state.store, validated.user.id, &workspace_slug).await {
        Ok(resolved) => resolved,
        Err(error) => return error.into_response(),
    };

    request.extensions_mut().insert(AuthContext {
        user: validated.user,
        session_id: session_id.clone(),
        workspace: resolved.workspace,
        member: resolved.member,
    });

    let mut response = next.run(request).await;
    if validated.fresh {
        append_cookie(&mut response, &state.sessions.cookie(&session_id));
    }
    response
}

fn append_cookie(response: &mut Response, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
}

/// Minimal query-string lookup; workspace and channel slugs never need
/// percent-decoding.
pub fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == key && !value.is_empty()).then_some(value)
    })
}
