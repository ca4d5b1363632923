// Persistent store for the chat domain.
//
// `ChatStore` is the only shared mutable resource in the server. It backs
// sessions, membership resolution, and the message engine through one
// dispatch enum: Postgres in production, an in-memory table set for tests.
// Multi-row mutations that must be atomic (the signup cascade, slug-retry
// then insert) run inside a single transaction on the Postgres arm and
// under one write lock on the Memory arm.

mod memory;
mod postgres;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

pub use memory::MemoryChatStore;

#[derive(Clone)]
pub enum ChatStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryChatStore>>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// The workspace identity attached to every authorized request.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceRef {
    pub id: Uuid,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleRef {
    pub id: Uuid,
    pub name: String,
}

/// The resolved member identity used throughout the chat domain. Message
/// senders and recipients reference member ids, never raw user ids.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberIdentity {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub slug: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub role: RoleRef,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDetail {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub username: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDetail {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub channel_slug: Option<String>,
    pub owner: Option<OwnerSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDetail {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub is_private: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_by: Option<MemberSummary>,
    pub archived_by: Option<MemberSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DmPeer {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// The compact message shape returned by create/update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: Uuid,
    pub slug: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSummary {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRef {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub mimetype: String,
    pub url: String,
    pub original_w: Option<i32>,
    pub original_h: Option<i32>,
}

/// One row of a top-level message listing, with the attachment rollup.
/// `files` is always a list, empty when the message has no attachments.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListRow {
    pub id: Uuid,
    pub slug: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub workspace: Option<WorkspaceSummary>,
    pub sender: Option<MemberSummary>,
    pub channel: Option<ChannelRef>,
    pub recipient: Option<MemberSummary>,
    pub files: Vec<FileRecord>,
}

/// Inputs for the signup cascade.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub workspace_name: String,
    pub user_avatar_url: Option<String>,
    pub member_avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignupRecord {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub workspace_slug: String,
}

/// Inputs for message creation; target ids are resolved before this point.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub workspace_id: Uuid,
    pub sender_id: Uuid,
    pub channel_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub parent_message_id: Option<Uuid>,
    pub body: Option<String>,
}

impl ChatStore {
    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(MemoryChatStore::default())))
    }

    // ── accounts ───────────────────────────────────────────────────

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        match self {
            Self::Postgres(pool) => postgres::email_exists(pool, email).await,
            Self::Memory(store) => Ok(store.read().await.email_exists(email)),
        }
    }

    pub async fn login_credentials(&self, email: &str) -> Result<Option<(Uuid, String)>> {
        match self {
            Self::Postgres(pool) => postgres::login_credentials(pool, email).await,
            Self::Memory(store) => Ok(store.read().await.login_credentials(email)),
        }
    }

    /// The signup cascade: user, password, workspace (with slug and invite
    /// code uniqueness retry loops), admin + member roles, the admin
    /// membership, and a public `General` channel — all in one transaction.
    pub async fn create_account(&self, account: NewAccount) -> Result<SignupRecord> {
        match self {
            Self::Postgres(pool) => postgres::create_account(pool, account).await,
            Self::Memory(store) => Ok(store.write().await.create_account(account)),
        }
    }

    // ── sessions ───────────────────────────────────────────────────

    pub async fn insert_session(
        &self,
        id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        match self {
            Self::Postgres(pool) => postgres::insert_session(pool, id, user_id, expires_at).await,
            Self::Memory(store) => {
                store.write().await.insert_session(id, user_id, expires_at);
                Ok(())
            }
        }
    }

    pub async fn session_with_user(&self, id: &str) -> Result<Option<(SessionRecord, UserRecord)>> {
        match self {
            Self::Postgres(pool) => postgres::session_with_user(pool, id).await,
            Self::Memory(store) => Ok(store.read().await.session_with_user(id)),
        }
    }

    pub async fn update_session_expiry(&self, id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        match self {
            Self::Postgres(pool) => postgres::update_session_expiry(pool, id, expires_at).await,
            Self::Memory(store) => {
                store.write().await.update_session_expiry(id, expires_at);
                Ok(())
            }
        }
    }

    pub async fn delete_session(&self, id: &str) -> Result<()> {
        match self {
            Self::Postgres(pool) => postgres::delete_session(pool, id).await,
            Self::Memory(store) => {
                store.write().await.delete_session(id);
                Ok(())
            }
        }
    }

    // ── workspaces & membership ────────────────────────────────────

    pub async fn workspace_by_slug(&self, slug: &str) -> Result<Option<WorkspaceRef>> {
        match self {
            Self::Postgres(pool) => postgres::workspace_by_slug(pool, slug).await,
            Self::Memory(store) => Ok(store.read().await.workspace_by_slug(slug)),
        }
    }

    /// The membership join used by every authorization decision: member ←
    /// user ← workspace ← role, filtered to `is_active = true`. Missing
    /// email or missing role rows yield `None` — a membership without
    /// either is a data-integrity fault, not a valid grant.
    pub async fn active_member(
        &self,
        user_id: Uuid,
        workspace_slug: &str,
    ) -> Result<Option<MemberIdentity>> {
        match self {
            Self::Postgres(pool) => postgres::active_member(pool, user_id, workspace_slug).await,
            Self::Memory(store) => Ok(store.read().await.active_member(user_id, workspace_slug)),
        }
    }

    /// Slug of the user's oldest active workspace; where login lands when
    /// the client names no workspace.
    pub async fn default_workspace_slug(&self, user_id: Uuid) -> Result<Option<String>> {
        match self {
            Self::Postgres(pool) => postgres::default_workspace_slug(pool, user_id).await,
            Self::Memory(store) => Ok(store.read().await.default_workspace_slug(user_id)),
        }
    }

    pub async fn workspace_detail(&self, slug: &str) -> Result<Option<WorkspaceDetail>> {
        match self {
            Self::Postgres(pool) => postgres::workspace_detail(pool, slug).await,
            Self::Memory(store) => Ok(store.read().await.workspace_detail(slug)),
        }
    }

    /// Slug of the workspace's oldest channel; the redirect landing target.
    pub async fn first_channel_slug(&self, workspace_id: Uuid) -> Result<Option<String>> {
        match self {
            Self::Postgres(pool) => postgres::first_channel_slug(pool, workspace_id).await,
            Self::Memory(store) => Ok(store.read().await.first_channel_slug(workspace_id)),
        }
    }

    pub async fn member_by_slug(
        &self,
        workspace_id: Uuid,
        member_slug: &str,
    ) -> Result<Option<MemberDetail>> {
        match self {
            Self::Postgres(pool) => postgres::member_by_slug(pool, workspace_id, member_slug).await,
            Self::Memory(store) => Ok(store.read().await.member_by_slug(workspace_id, member_slug)),
        }
    }

    // ── channels ───────────────────────────────────────────────────

    pub async fn channel_detail_for_member(
        &self,
        member_id: Uuid,
        channel_slug: &str,
    ) -> Result<Option<ChannelDetail>> {
        match self {
            Self::Postgres(pool) => {
                postgres::channel_detail_for_member(pool, member_id, channel_slug).await
            }
            Self::Memory(store) => {
                Ok(store.read().await.channel_detail_for_member(member_id, channel_slug))
            }
        }
    }

    pub async fn channel_name_exists(&self, workspace_id: Uuid, name: &str) -> Result<bool> {
        match self {
            Self::Postgres(pool) => postgres::channel_name_exists(pool, workspace_id, name).await,
            Self::Memory(store) => Ok(store.read().await.channel_name_exists(workspace_id, name)),
        }
    }

    /// Create a channel with a collision-checked slug and enroll the
    /// creator as its first member, atomically.
    pub async fn create_channel(
        &self,
        workspace_id: Uuid,
        creator_member_id: Uuid,
        name: &str,
        is_private: bool,
    ) -> Result<ChannelSummary> {
        match self {
            Self::Postgres(pool) => {
                postgres::create_channel(pool, workspace_id, creator_member_id, name, is_private)
                    .await
            }
            Self::Memory(store) => Ok(store.write().await.create_channel(
                workspace_id,
                creator_member_id,
                name,
                is_private,
            )),
        }
    }

    pub async fn channels_for_member(&self, member_id: Uuid) -> Result<Vec<ChannelSummary>> {
        match self {
            Self::Postgres(pool) => postgres::channels_for_member(pool, member_id).await,
            Self::Memory(store) => Ok(store.read().await.channels_for_member(member_id)),
        }
    }

    /// DM peers of `member_id`, most recently messaged first, the caller
    /// listed first, capped at `limit`.
    pub async fn dm_peers(
        &self,
        workspace_id: Uuid,
        member_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DmPeer>> {
        match self {
            Self::Postgres(pool) => postgres::dm_peers(pool, workspace_id, member_id, limit).await,
            Self::Memory(store) => Ok(store.read().await.dm_peers(workspace_id, member_id, limit)),
        }
    }

    // ── message targets ────────────────────────────────────────────

    /// Channel id for posting: unarchived and the sender is enrolled.
    pub async fn channel_for_posting(
        &self,
        workspace_id: Uuid,
        member_id: Uuid,
        channel_slug: &str,
    ) -> Result<Option<Uuid>> {
        match self {
            Self::Postgres(pool) => {
                postgres::channel_for_posting(pool, workspace_id, member_id, channel_slug).await
            }
            Self::Memory(store) => {
                Ok(store.read().await.channel_for_posting(workspace_id, member_id, channel_slug))
            }
        }
    }

    pub async fn channel_id_in_workspace(
        &self,
        workspace_id: Uuid,
        channel_slug: &str,
    ) -> Result<Option<Uuid>> {
        match self {
            Self::Postgres(pool) => {
                postgres::channel_id_in_workspace(pool, workspace_id, channel_slug).await
            }
            Self::Memory(store) => {
                Ok(store.read().await.channel_id_in_workspace(workspace_id, channel_slug))
            }
        }
    }

    pub async fn member_id_in_workspace(
        &self,
        workspace_id: Uuid,
        member_slug: &str,
    ) -> Result<Option<Uuid>> {
        match self {
            Self::Postgres(pool) => {
                postgres::member_id_in_workspace(pool, workspace_id, member_slug).await
            }
            Self::Memory(store) => {
                Ok(store.read().await.member_id_in_workspace(workspace_id, member_slug))
            }
        }
    }

    // ── messages ───────────────────────────────────────────────────

    /// Insert a message with a collision-checked slug. The retry loop and
    /// the insert share one transaction; each retry re-checks before
    /// inserting, and the per-workspace uniqueness constraint backstops
    /// the remaining race.
    pub async fn create_message(&self, message: NewMessage) -> Result<MessageRecord> {
        match self {
            Self::Postgres(pool) => postgres::create_message(pool, message).await,
            Self::Memory(store) => Ok(store.write().await.create_message(message)),
        }
    }

    /// Top-level messages (`parent_message_id IS NULL`) strictly older
    /// than `before`, newest first with id as the tie-break, at most
    /// `limit` rows, with the attachment rollup.
    pub async fn list_messages(
        &self,
        workspace_id: Uuid,
        channel_id: Option<Uuid>,
        recipient_id: Option<Uuid>,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MessageListRow>> {
        match self {
            Self::Postgres(pool) => {
                postgres::list_messages(pool, workspace_id, channel_id, recipient_id, before, limit)
                    .await
            }
            Self::Memory(store) => Ok(store.read().await.list_messages(
                workspace_id,
                channel_id,
                recipient_id,
                before,
                limit,
            )),
        }
    }

    /// Update a message body; `None` when no row matches slug + sender +
    /// workspace, which the caller reports as Forbidden.
    pub async fn update_message(
        &self,
        workspace_id: Uuid,
        sender_id: Uuid,
        slug: &str,
        body: Option<String>,
    ) -> Result<Option<MessageRecord>> {
        match self {
            Self::Postgres(pool) => {
                postgres::update_message(pool, workspace_id, sender_id, slug, body).await
            }
            Self::Memory(store) => {
                Ok(store.write().await.update_message(workspace_id, sender_id, slug, body))
            }
        }
    }

    /// Delete a message; `false` when no row matches slug + sender +
    /// workspace.
    pub async fn delete_message(
        &self,
        workspace_id: Uuid,
        sender_id: Uuid,
        slug: &str,
    ) -> Result<bool> {
        match self {
            Self::Postgres(pool) => {
                postgres::delete_message(pool, workspace_id, sender_id, slug).await
            }
            Self::Memory(store) => {
                Ok(store.write().await.delete_message(workspace_id, sender_id, slug))
            }
        }
    }
}
