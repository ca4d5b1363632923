// Channel detail and creation, scoped to the authorized member.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::ApiState;
use crate::auth::middleware::AuthContext;
use crate::error::{ok_envelope, ApiError};
use crate::validation::{field_errors, ValidatedJson};

#[derive(Debug, Deserialize)]
pub struct ChannelQuery {
    pub channel: Option<String>,
}

/// Channel detail with createdBy / archivedBy members. Membership-scoped:
/// a channel the member is not enrolled in reads as absent.
pub async fn get_channel(
    State(state): State<ApiState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ChannelQuery>,
) -> Result<Json<Value>, ApiError> {
    let Some(channel_slug) = query.channel else {
        return Err(ApiError::bad_request("Wrong data passed")
            .with_field_errors(field_errors([("channel", "Channel is required")])));
    };

    let detail = state
        .store
        .channel_detail_for_member(ctx.member.id, &channel_slug)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("Channel not found"))?;

    Ok(ok_envelope(json!({ "channel": detail })))
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelPayload {
    pub name: String,
    #[serde(default, rename = "type")]
    pub visibility: ChannelVisibility,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelVisibility {
    #[default]
    Public,
    Private,
}

pub async fn create_channel(
    State(state): State<ApiState>,
    Extension(ctx): Extension<AuthContext>,
    ValidatedJson(payload): ValidatedJson<CreateChannelPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Wrong data passed")
            .with_field_errors(field_errors([("name", "Channel name is required")])));
    }

    if state
        .store
        .channel_name_exists(ctx.workspace.id, name)
        .await
        .map_err(ApiError::internal)?
    {
        return Err(ApiError::conflict("Channel already exists with name"));
    }

    let channel = state
        .store
        .create_channel(
            ctx.workspace.id,
            ctx.member.id,
            name,
            payload.visibility == ChannelVisibility::Private,
        )
        .await
        .map_err(ApiError::internal)?;

    Ok((StatusCode::CREATED, ok_envelope(json!({ "channel": channel }))))
}
