// Member lookup by slug within the authorized workspace.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::ApiState;
use crate::auth::middleware::AuthContext;
use crate::error::{ok_envelope, ApiError};
use crate::validation::field_errors;

#[derive(Debug, Deserialize)]
pub struct MemberQuery {
    pub member: Option<String>,
}

/// A missing member reads as Forbidden, not NotFound — slugs are not
/// probeable across workspaces.
pub async fn get_member(
    State(state): State<ApiState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<MemberQuery>,
) -> Result<Json<Value>, ApiError> {
    let Some(member_slug) = query.member else {
        return Err(ApiError::bad_request("Wrong data passed")
            .with_field_errors(field_errors([("member", "Member is required")])));
    };

    let member = state
        .store
        .member_by_slug(ctx.workspace.id, &member_slug)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(ApiError::forbidden)?;

    Ok(ok_envelope(json!({ "member": member })))
}
