// Message creation, listing, editing, and deletion.
//
// The posting target is resolved exactly once at this boundary into
// `Target`; everything below works with ids. Listing pages backwards
// through time: top-level rows strictly older than the cursor, newest
// first, ties broken by id.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::ApiState;
use crate::auth::middleware::AuthContext;
use crate::error::{ok_empty_envelope, ok_envelope, ApiError};
use crate::store::NewMessage;
use crate::validation::{field_errors, ValidatedJson};

/// Page size for message listings.
const PAGE_SIZE: usize = 20;

/// Where a message goes: a channel or a direct-message recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Channel(String),
    Recipient(String),
}

impl Target {
    /// Exactly one of `channel` / `recipient` must be set.
    fn from_parts(
        channel: Option<String>,
        recipient: Option<String>,
    ) -> Result<Self, ApiError> {
        match (channel, recipient) {
            (Some(channel), None) => Ok(Self::Channel(channel)),
            (None, Some(recipient)) => Ok(Self::Recipient(recipient)),
            _ => Err(ApiError::bad_request("Wrong data passed").with_field_errors(field_errors([
                ("target", "Exactly one of channel or recipient is required"),
            ]))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Message,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessagePayload {
    pub channel: Option<String>,
    pub recipient: Option<String>,
    pub message: MessageBody,
}

pub async fn create_message(
    State(state): State<ApiState>,
    Extension(ctx): Extension<AuthContext>,
    ValidatedJson(payload): ValidatedJson<CreateMessagePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let target = Target::from_parts(payload.channel, payload.recipient)?;

    let (channel_id, recipient_id) = match &target {
        Target::Channel(slug) => {
            // Unarchived and the sender is enrolled; anything else is a miss.
            let channel_id = state
                .store
                .channel_for_posting(ctx.workspace.id, ctx.member.id, slug)
                .await
                .map_err(ApiError::internal)?
                .ok_or_else(ApiError::forbidden)?;
            (Some(channel_id), None)
        }
        Target::Recipient(slug) => {
            let recipient_id = state
                .store
                .member_id_in_workspace(ctx.workspace.id, slug)
                .await
                .map_err(ApiError::internal)?
                .ok_or_else(ApiError::forbidden)?;
            (None, Some(recipient_id))
        }
    };

    let message = state
        .store
        .create_message(NewMessage {
            workspace_id: ctx.workspace.id,
            sender_id: ctx.member.id,
            channel_id,
            recipient_id,
            parent_message_id: None,
            body: payload.message.body,
        })
        .await
        .map_err(ApiError::internal)?;

    Ok((StatusCode::CREATED, ok_envelope(json!({ "message": message }))))
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub channel: Option<String>,
    pub recipient: Option<String>,
    /// Epoch milliseconds; rows strictly older than this are returned.
    /// Kept as a string so a garbled value is our 400, not an extractor
    /// rejection outside the envelope.
    pub cursor: Option<String>,
}

pub async fn list_messages(
    State(state): State<ApiState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Value>, ApiError> {
    let before = match query.cursor.as_deref() {
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| ApiError::bad_request("Invalid cursor"))?,
        None => Utc::now(),
    };

    let channel_id = match &query.channel {
        Some(slug) => Some(resolve_channel(&state, ctx.workspace.id, slug).await?),
        None => None,
    };
    let recipient_id = match &query.recipient {
        Some(slug) => Some(resolve_member(&state, ctx.workspace.id, slug).await?),
        None => None,
    };

    let messages = state
        .store
        .list_messages(ctx.workspace.id, channel_id, recipient_id, before, PAGE_SIZE)
        .await
        .map_err(ApiError::internal)?;

    // A full page hands the client a cursor for the next one; a short
    // page is the end of history.
    let next_cursor = (messages.len() == PAGE_SIZE)
        .then(|| messages.last().map(|last| last.created_at.timestamp_millis()))
        .flatten();

    let mut data = json!({ "messages": messages });
    if let Some(cursor) = next_cursor {
        data["cursor"] = json!(cursor);
    }
    Ok(ok_envelope(data))
}

async fn resolve_channel(state: &ApiState, workspace_id: Uuid, slug: &str) -> Result<Uuid, ApiError> {
    state
        .store
        .channel_id_in_workspace(workspace_id, slug)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(ApiError::forbidden)
}

async fn resolve_member(state: &ApiState, workspace_id: Uuid, slug: &str) -> Result<Uuid, ApiError> {
    state
        .store
        .member_id_in_workspace(workspace_id, slug)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(ApiError::forbidden)
}

/// Only the sender may edit; a miss on slug + sender + workspace is
/// indistinguishable from a foreign message and reads as Forbidden.
pub async fn update_message(
    State(state): State<ApiState>,
    Extension(ctx): Extension<AuthContext>,
    Path(slug): Path<String>,
    ValidatedJson(payload): ValidatedJson<MessageBody>,
) -> Result<Json<Value>, ApiError> {
    let message = state
        .store
        .update_message(ctx.workspace.id, ctx.member.id, &slug, payload.body)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(ApiError::forbidden)?;

    Ok(ok_envelope(json!({ "message": message })))
}

pub async fn delete_message(
    State(state): State<ApiState>,
    Extension(ctx): Extension<AuthContext>,
    Path(slug): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state
        .store
        .delete_message(ctx.workspace.id, ctx.member.id, &slug)
        .await
        .map_err(ApiError::internal)?;
    if !deleted {
        return Err(ApiError::forbidden());
    }
    Ok(ok_empty_envelope())
}
