// The caller's sidebar: enrolled channels and DM peers.

use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};

use crate::api::ApiState;
use crate::auth::middleware::AuthContext;
use crate::error::{ok_envelope, ApiError};

/// DM list cap; the sidebar shows at most this many peers.
const DM_PEER_LIMIT: usize = 15;

pub async fn my_channels(
    State(state): State<ApiState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    let channels =
        state.store.channels_for_member(ctx.member.id).await.map_err(ApiError::internal)?;
    Ok(ok_envelope(json!({ "channels": channels })))
}

/// DM peers ordered by most recent exchanged message, the caller listed
/// first.
pub async fn my_dms(
    State(state): State<ApiState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    let dms = state
        .store
        .dm_peers(ctx.workspace.id, ctx.member.id, DM_PEER_LIMIT)
        .await
        .map_err(ApiError::internal)?;
    Ok(ok_envelope(json!({ "dms": dms })))
}
