// Workspace detail for the authorized workspace.

use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};

use crate::api::ApiState;
use crate::auth::middleware::AuthContext;
use crate::error::{ok_envelope, ApiError};

pub async fn get_workspace(
    State(state): State<ApiState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    let detail = state
        .store
        .workspace_detail(&ctx.workspace.slug)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("Workspace not found"))?;

    Ok(ok_envelope(json!({ "workspace": detail })))
}
