// Postgres backend for `ChatStore`. Every function takes the pool (or a
// transaction) and speaks plain SQL; row structs stay private to this
// module and convert into the store's record types at the boundary.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use huddle_common::slug;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    ChannelDetail, ChannelRef, ChannelSummary, DmPeer, FileRecord, MemberDetail, MemberIdentity,
    MemberSummary, MessageListRow, MessageRecord, NewAccount, NewMessage, OwnerSummary, RoleRef,
    SessionRecord, SignupRecord, UserRecord, WorkspaceDetail, WorkspaceRef, WorkspaceSummary,
};

const SLUG_RETRY_LIMIT: usize = 8;

// ── accounts ───────────────────────────────────────────────────────

pub(super) async fn email_exists(pool: &PgPool, email: &str) -> Result<bool> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
        .bind(email)
        .fetch_one(pool)
        .await
        .context("failed to check email existence")
}

pub(super) async fn login_credentials(pool: &PgPool, email: &str) -> Result<Option<(Uuid, String)>> {
    sqlx::query_as::<_, (Uuid, String)>(
        r#"
        SELECT u.id, p.hash
        FROM users AS u
        INNER JOIN user_passwords AS p ON p.user_id = u.id
        WHERE u.email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("failed to load login credentials")
}

async fn unique_workspace_slug(tx: &mut Transaction<'_, Postgres>) -> Result<String> {
    for _ in 0..SLUG_RETRY_LIMIT {
        let candidate = slug::workspace_slug();
        let taken =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM workspaces WHERE slug = $1)")
                .bind(&candidate)
                .fetch_one(&mut **tx)
                .await
                .context("failed to check workspace slug")?;
        if !taken {
            return Ok(candidate);
        }
    }
    anyhow::bail!("could not find a free workspace slug after {SLUG_RETRY_LIMIT} attempts")
}

async fn unique_invite_code(tx: &mut Transaction<'_, Postgres>) -> Result<String> {
    for _ in 0..SLUG_RETRY_LIMIT {
        let candidate = slug::invite_code();
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM workspaces WHERE invite_code = $1)",
        )
        .bind(&candidate)
        .fetch_one(&mut **tx)
        .await
        .context("failed to check invite code")?;
        if !taken {
            return Ok(candidate);
        }
    }
    anyhow::bail!("could not find a free invite code after {SLUG_RETRY_LIMIT} attempts")
}

async fn unique_channel_slug(
    tx: &mut Transaction<'_, Postgres>,
    workspace_id: Uuid,
) -> Result<String> {
    for _ in 0..SLUG_RETRY_LIMIT {
        let candidate = slug::channel_slug();
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM workspace_channels WHERE workspace_id = $1 AND slug = $2)",
        )
        .bind(workspace_id)
        .bind(&candidate)
        .fetch_one(&mut **tx)
        .await
        .context("failed to check channel slug")?;
        if !taken {
            return Ok(candidate);
        }
    }
    anyhow::bail!("could not find a free channel slug after {SLUG_RETRY_LIMIT} attempts")
}

async fn unique_message_slug(
    tx: &mut Transaction<'_, Postgres>,
    workspace_id: Uuid,
) -> Result<String> {
    for _ in 0..SLUG_RETRY_LIMIT {
        let candidate = slug::message_slug();
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM workspace_messages WHERE workspace_id = $1 AND slug = $2)",
        )
        .bind(workspace_id)
        .bind(&candidate)
        .fetch_one(&mut **tx)
        .await
        .context("failed to check message slug")?;
        if !taken {
            return Ok(candidate);
        }
    }
    anyhow::bail!("could not find a free message slug after {SLUG_RETRY_LIMIT} attempts")
}

pub(super) async fn create_account(pool: &PgPool, account: NewAccount) -> Result<SignupRecord> {
    let mut tx = pool.begin().await.context("failed to begin signup transaction")?;

    let user_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO users (email, display_name, avatar_url)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(&account.email)
    .bind(&account.display_name)
    .bind(&account.user_avatar_url)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert user")?;

    sqlx::query("INSERT INTO user_passwords (user_id, hash) VALUES ($1, $2)")
        .bind(user_id)
        .bind(&account.password_hash)
        .execute(&mut *tx)
        .await
        .context("failed to insert password")?;

    let workspace_slug = unique_workspace_slug(&mut tx).await?;
    let invite_code = unique_invite_code(&mut tx).await?;

    let workspace_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO workspaces (name, slug, invite_code, owner_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&account.workspace_name)
    .bind(&workspace_slug)
    .bind(&invite_code)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert workspace")?;

    let admin_role_id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO workspace_roles (workspace_id, name) VALUES ($1, 'admin') RETURNING id",
    )
    .bind(workspace_id)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert admin role")?;

    sqlx::query("INSERT INTO workspace_roles (workspace_id, name) VALUES ($1, 'member')")
        .bind(workspace_id)
        .execute(&mut *tx)
        .await
        .context("failed to insert member role")?;

    let member_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO workspace_members (user_id, workspace_id, role_id, name, username, slug, avatar_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(workspace_id)
    .bind(admin_role_id)
    .bind(&account.display_name)
    .bind(&account.display_name)
    .bind(slug::member_slug())
    .bind(&account.member_avatar_url)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert member")?;

    let channel_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO workspace_channels (workspace_id, name, slug, is_private, created_by_id)
        VALUES ($1, 'General', $2, FALSE, $3)
        RETURNING id
        "#,
    )
    .bind(workspace_id)
    .bind(slug::channel_slug())
    .bind(member_id)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert default channel")?;

    sqlx::query("INSERT INTO workspace_channel_members (channel_id, member_id) VALUES ($1, $2)")
        .bind(channel_id)
        .bind(member_id)
        .execute(&mut *tx)
        .await
        .context("failed to enroll member in default channel")?;

    tx.commit().await.context("failed to commit signup transaction")?;

    Ok(SignupRecord { user_id, workspace_id, workspace_slug })
}

// ── sessions ───────────────────────────────────────────────────────

pub(super) async fn insert_session(
    pool: &PgPool,
    id: &str,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT INTO user_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await
        .context("failed to insert session")?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct SessionUserRow {
    id: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    email: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
}

pub(super) async fn session_with_user(
    pool: &PgPool,
    id: &str,
) -> Result<Option<(SessionRecord, UserRecord)>> {
    let row = sqlx::query_as::<_, SessionUserRow>(
        r#"
        SELECT s.id, s.user_id, s.expires_at, u.email, u.display_name, u.avatar_url
        FROM user_sessions AS s
        INNER JOIN users AS u ON u.id = s.user_id
        WHERE s.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to load session")?;

    Ok(row.map(|row| {
        (
            SessionRecord { id: row.id, user_id: row.user_id, expires_at: row.expires_at },
            UserRecord {
                id: row.user_id,
                email: row.email,
                display_name: row.display_name,
                avatar_url: row.avatar_url,
            },
        )
    }))
}

pub(super) async fn update_session_expiry(
    pool: &PgPool,
    id: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE user_sessions SET expires_at = $2 WHERE id = $1")
        .bind(id)
        .bind(expires_at)
        .execute(pool)
        .await
        .context("failed to extend session")?;

    Ok(())
}

pub(super) async fn delete_session(pool: &PgPool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM user_sessions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete session")?;

    Ok(())
}

// ── workspaces & membership ────────────────────────────────────────

pub(super) async fn workspace_by_slug(pool: &PgPool, slug: &str) -> Result<Option<WorkspaceRef>> {
    let row = sqlx::query_as::<_, (Uuid, String)>("SELECT id, slug FROM workspaces WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("failed to load workspace by slug")?;

    Ok(row.map(|(id, slug)| WorkspaceRef { id, slug }))
}

#[derive(sqlx::FromRow)]
struct ActiveMemberRow {
    id: Uuid,
    email: String,
    name: String,
    slug: String,
    username: String,
    avatar_url: Option<String>,
    role_id: Uuid,
    role_name: String,
}

pub(super) async fn active_member(
    pool: &PgPool,
    user_id: Uuid,
    workspace_slug: &str,
) -> Result<Option<MemberIdentity>> {
    let row = sqlx::query_as::<_, ActiveMemberRow>(
        r#"
        SELECT
            m.id,
            u.email,
            m.name,
            m.slug,
            m.username,
            m.avatar_url,
            r.id AS role_id,
            r.name AS role_name
        FROM workspace_members AS m
        INNER JOIN workspaces AS w ON w.id = m.workspace_id
        INNER JOIN users AS u ON u.id = m.user_id
        INNER JOIN workspace_roles AS r ON r.id = m.role_id
        WHERE m.user_id = $1
          AND w.slug = $2
          AND m.is_active
        "#,
    )
    .bind(user_id)
    .bind(workspace_slug)
    .fetch_optional(pool)
    .await
    .context("failed to resolve workspace membership")?;

    Ok(row.map(|row| MemberIdentity {
        id: row.id,
        email: row.email,
        name: row.name,
        slug: row.slug,
        username: row.username,
        avatar_url: row.avatar_url,
        role: RoleRef { id: row.role_id, name: row.role_name },
    }))
}

#[derive(sqlx::FromRow)]
struct WorkspaceDetailRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    channel_slug: Option<String>,
    owner_id: Option<Uuid>,
    owner_name: Option<String>,
    owner_slug: Option<String>,
}

pub(super) async fn workspace_detail(pool: &PgPool, slug: &str) -> Result<Option<WorkspaceDetail>> {
    let row = sqlx::query_as::<_, WorkspaceDetailRow>(
        r#"
        SELECT
            w.id,
            w.name,
            w.slug,
            w.description,
            w.created_at,
            w.updated_at,
            (
                SELECT c.slug FROM workspace_channels AS c
                WHERE c.workspace_id = w.id
                ORDER BY c.created_at ASC
                LIMIT 1
            ) AS channel_slug,
            o.id AS owner_id,
            o.name AS owner_name,
            o.slug AS owner_slug
        FROM workspaces AS w
        LEFT JOIN workspace_members AS o
            ON o.workspace_id = w.id AND o.user_id = w.owner_id
        WHERE w.slug = $1
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
    .context("failed to load workspace detail")?;

    Ok(row.map(|row| {
        let owner = match (row.owner_id, row.owner_name, row.owner_slug) {
            (Some(id), Some(name), Some(slug)) => Some(OwnerSummary { id, name, slug }),
            _ => None,
        };
        WorkspaceDetail {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            channel_slug: row.channel_slug,
            owner,
        }
    }))
}

pub(super) async fn default_workspace_slug(pool: &PgPool, user_id: Uuid) -> Result<Option<String>> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT w.slug
        FROM workspace_members AS m
        INNER JOIN workspaces AS w ON w.id = m.workspace_id
        WHERE m.user_id = $1 AND m.is_active = TRUE
        ORDER BY w.created_at ASC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to load default workspace")
}

pub(super) async fn first_channel_slug(pool: &PgPool, workspace_id: Uuid) -> Result<Option<String>> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT slug FROM workspace_channels
        WHERE workspace_id = $1
        ORDER BY created_at ASC
        LIMIT 1
        "#,
    )
    .bind(workspace_id)
    .fetch_optional(pool)
    .await
    .context("failed to load first channel")
}

#[derive(sqlx::FromRow)]
struct MemberDetailRow {
    id: Uuid,
    name: String,
    slug: String,
    is_active: bool,
    username: String,
    email: Option<String>,
    avatar_url: Option<String>,
}

pub(super) async fn member_by_slug(
    pool: &PgPool,
    workspace_id: Uuid,
    member_slug: &str,
) -> Result<Option<MemberDetail>> {
    let row = sqlx::query_as::<_, MemberDetailRow>(
        r#"
        SELECT m.id, m.name, m.slug, m.is_active, m.username, u.email, m.avatar_url
        FROM workspace_members AS m
        LEFT JOIN users AS u ON u.id = m.user_id
        WHERE m.workspace_id = $1 AND m.slug = $2
        "#,
    )
    .bind(workspace_id)
    .bind(member_slug)
    .fetch_optional(pool)
    .await
    .context("failed to load member by slug")?;

    Ok(row.map(|row| MemberDetail {
        id: row.id,
        name: row.name,
        slug: row.slug,
        is_active: row.is_active,
        username: row.username,
        email: row.email,
        avatar_url: row.avatar_url,
    }))
}

// ── channels ───────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct ChannelDetailRow {
    id: Uuid,
    name: String,
    slug: String,
    is_private: bool,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    archived_at: Option<DateTime<Utc>>,
    cb_id: Option<Uuid>,
    cb_slug: Option<String>,
    cb_name: Option<String>,
    cb_username: Option<String>,
    cb_avatar_url: Option<String>,
    ab_id: Option<Uuid>,
    ab_slug: Option<String>,
    ab_name: Option<String>,
    ab_username: Option<String>,
    ab_avatar_url: Option<String>,
}

fn member_summary_from_parts(
    id: Option<Uuid>,
    slug: Option<String>,
    name: Option<String>,
    username: Option<String>,
    avatar_url: Option<String>,
) -> Option<MemberSummary> {
    match (id, slug, name, username) {
        (Some(id), Some(slug), Some(name), Some(username)) => {
            Some(MemberSummary { id, slug, name, username, avatar_url })
        }
        _ => None,
    }
}

pub(super) async fn channel_detail_for_member(
    pool: &PgPool,
    member_id: Uuid,
    channel_slug: &str,
) -> Result<Option<ChannelDetail>> {
    let row = sqlx::query_as::<_, ChannelDetailRow>(
        r#"
        SELECT
            c.id,
            c.name,
            c.slug,
            c.is_private,
            c.description,
            c.created_at,
            c.updated_at,
            c.archived_at,
            cb.id AS cb_id,
            cb.slug AS cb_slug,
            cb.name AS cb_name,
            cb.username AS cb_username,
            cb.avatar_url AS cb_avatar_url,
            ab.id AS ab_id,
            ab.slug AS ab_slug,
            ab.name AS ab_name,
            ab.username AS ab_username,
            ab.avatar_url AS ab_avatar_url
        FROM workspace_channels AS c
        INNER JOIN workspace_channel_members AS cm
            ON cm.channel_id = c.id AND cm.member_id = $1
        LEFT JOIN workspace_members AS cb ON cb.id = c.created_by_id
        LEFT JOIN workspace_members AS ab ON ab.id = c.archived_by_id
        WHERE c.slug = $2
        "#,
    )
    .bind(member_id)
    .bind(channel_slug)
    .fetch_optional(pool)
    .await
    .context("failed to load channel detail")?;

    Ok(row.map(|row| ChannelDetail {
        id: row.id,
        name: row.name,
        slug: row.slug,
        is_private: row.is_private,
        description: row.description,
        created_at: row.created_at,
        updated_at: row.updated_at,
        archived_at: row.archived_at,
        created_by: member_summary_from_parts(
            row.cb_id,
            row.cb_slug,
            row.cb_name,
            row.cb_username,
            row.cb_avatar_url,
        ),
        archived_by: member_summary_from_parts(
            row.ab_id,
            row.ab_slug,
            row.ab_name,
            row.ab_username,
            row.ab_avatar_url,
        ),
    }))
}

pub(super) async fn channel_name_exists(
    pool: &PgPool,
    workspace_id: Uuid,
    name: &str,
) -> Result<bool> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM workspace_channels WHERE workspace_id = $1 AND name = $2)",
    )
    .bind(workspace_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .context("failed to check channel name")
}

pub(super) async fn create_channel(
    pool: &PgPool,
    workspace_id: Uuid,
    creator_member_id: Uuid,
    name: &str,
    is_private: bool,
) -> Result<ChannelSummary> {
    let mut tx = pool.begin().await.context("failed to begin channel transaction")?;

    let channel_slug = unique_channel_slug(&mut tx, workspace_id).await?;

    let channel_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO workspace_channels (workspace_id, name, slug, is_private, created_by_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(workspace_id)
    .bind(name)
    .bind(&channel_slug)
    .bind(is_private)
    .bind(creator_member_id)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert channel")?;

    sqlx::query("INSERT INTO workspace_channel_members (channel_id, member_id) VALUES ($1, $2)")
        .bind(channel_id)
        .bind(creator_member_id)
        .execute(&mut *tx)
        .await
        .context("failed to enroll channel creator")?;

    tx.commit().await.context("failed to commit channel transaction")?;

    Ok(ChannelSummary { id: channel_id, name: name.to_owned(), slug: channel_slug, is_private })
}

#[derive(sqlx::FromRow)]
struct ChannelSummaryRow {
    id: Uuid,
    name: String,
    slug: String,
    is_private: bool,
}

pub(super) async fn channels_for_member(
    pool: &PgPool,
    member_id: Uuid,
) -> Result<Vec<ChannelSummary>> {
    let rows = sqlx::query_as::<_, ChannelSummaryRow>(
        r#"
        SELECT c.id, c.name, c.slug, c.is_private
        FROM workspace_channels AS c
        INNER JOIN workspace_channel_members AS cm ON cm.channel_id = c.id
        WHERE cm.member_id = $1
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(member_id)
    .fetch_all(pool)
    .await
    .context("failed to list channels")?;

    Ok(rows
        .into_iter()
        .map(|row| ChannelSummary {
            id: row.id,
            name: row.name,
            slug: row.slug,
            is_private: row.is_private,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct DmPeerRow {
    id: Uuid,
    name: String,
    slug: String,
    username: String,
    avatar_url: Option<String>,
}

pub(super) async fn dm_peers(
    pool: &PgPool,
    workspace_id: Uuid,
    member_id: Uuid,
    limit: usize,
) -> Result<Vec<DmPeer>> {
    let rows = sqlx::query_as::<_, DmPeerRow>(
        r#"
        SELECT m.id, m.name, m.slug, m.username, m.avatar_url
        FROM workspace_members AS m
        LEFT JOIN LATERAL (
            SELECT MAX(msg.created_at) AS last_at
            FROM workspace_messages AS msg
            WHERE (msg.sender_id = m.id OR msg.recipient_id = m.id)
              AND (msg.sender_id = $2 OR msg.recipient_id = $2)
        ) AS last ON TRUE
        WHERE m.workspace_id = $1
          AND m.is_active
        ORDER BY (m.id = $2) DESC, last.last_at DESC NULLS LAST, m.slug ASC
        LIMIT $3
        "#,
    )
    .bind(workspace_id)
    .bind(member_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .context("failed to list direct message peers")?;

    Ok(rows
        .into_iter()
        .map(|row| DmPeer {
            id: row.id,
            name: row.name,
            slug: row.slug,
            username: row.username,
            avatar_url: row.avatar_url,
        })
        .collect())
}

// ── message targets ────────────────────────────────────────────────

pub(super) async fn channel_for_posting(
    pool: &PgPool,
    workspace_id: Uuid,
    member_id: Uuid,
    channel_slug: &str,
) -> Result<Option<Uuid>> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT c.id
        FROM workspace_channels AS c
        INNER JOIN workspace_channel_members AS cm
            ON cm.channel_id = c.id AND cm.member_id = $2
        WHERE c.workspace_id = $1
          AND c.slug = $3
          AND c.archived_at IS NULL
          AND c.archived_by_id IS NULL
        "#,
    )
    .bind(workspace_id)
    .bind(member_id)
    .bind(channel_slug)
    .fetch_optional(pool)
    .await
    .context("failed to resolve channel for posting")
}

pub(super) async fn channel_id_in_workspace(
    pool: &PgPool,
    workspace_id: Uuid,
    channel_slug: &str,
) -> Result<Option<Uuid>> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM workspace_channels WHERE workspace_id = $1 AND slug = $2")
        .bind(workspace_id)
        .bind(channel_slug)
        .fetch_optional(pool)
        .await
        .context("failed to resolve channel")
}

pub(super) async fn member_id_in_workspace(
    pool: &PgPool,
    workspace_id: Uuid,
    member_slug: &str,
) -> Result<Option<Uuid>> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM workspace_members WHERE workspace_id = $1 AND slug = $2")
        .bind(workspace_id)
        .bind(member_slug)
        .fetch_optional(pool)
        .await
        .context("failed to resolve member")
}

// ── messages ───────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    slug: String,
    body: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

pub(super) async fn create_message(pool: &PgPool, message: NewMessage) -> Result<MessageRecord> {
    let mut tx = pool.begin().await.context("failed to begin message transaction")?;

    let message_slug = unique_message_slug(&mut tx, message.workspace_id).await?;

    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        INSERT INTO workspace_messages
            (workspace_id, slug, sender_id, channel_id, recipient_id, parent_message_id, body)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, slug, body, created_at, updated_at
        "#,
    )
    .bind(message.workspace_id)
    .bind(&message_slug)
    .bind(message.sender_id)
    .bind(message.channel_id)
    .bind(message.recipient_id)
    .bind(message.parent_message_id)
    .bind(&message.body)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert message")?;

    tx.commit().await.context("failed to commit message transaction")?;

    Ok(MessageRecord {
        id: row.id,
        slug: row.slug,
        body: row.body,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[derive(sqlx::FromRow)]
struct MessageListDbRow {
    id: Uuid,
    slug: String,
    body: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    w_id: Uuid,
    w_slug: String,
    w_name: String,
    s_id: Option<Uuid>,
    s_slug: Option<String>,
    s_name: Option<String>,
    s_username: Option<String>,
    s_avatar_url: Option<String>,
    c_id: Option<Uuid>,
    c_slug: Option<String>,
    c_name: Option<String>,
    r_id: Option<Uuid>,
    r_slug: Option<String>,
    r_name: Option<String>,
    r_username: Option<String>,
    r_avatar_url: Option<String>,
}

#[derive(sqlx::FromRow)]
struct FileDbRow {
    id: Uuid,
    message_id: Uuid,
    slug: String,
    name: String,
    mimetype: String,
    url: String,
    original_w: Option<i32>,
    original_h: Option<i32>,
}

pub(super) async fn list_messages(
    pool: &PgPool,
    workspace_id: Uuid,
    channel_id: Option<Uuid>,
    recipient_id: Option<Uuid>,
    before: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<MessageListRow>> {
    let rows = sqlx::query_as::<_, MessageListDbRow>(
        r#"
        SELECT
            msg.id,
            msg.slug,
            msg.body,
            msg.created_at,
            msg.updated_at,
            w.id AS w_id,
            w.slug AS w_slug,
            w.name AS w_name,
            s.id AS s_id,
            s.slug AS s_slug,
            s.name AS s_name,
            s.username AS s_username,
            s.avatar_url AS s_avatar_url,
            c.id AS c_id,
            c.slug AS c_slug,
            c.name AS c_name,
            r.id AS r_id,
            r.slug AS r_slug,
            r.name AS r_name,
            r.username AS r_username,
            r.avatar_url AS r_avatar_url
        FROM workspace_messages AS msg
        INNER JOIN workspaces AS w ON w.id = msg.workspace_id
        LEFT JOIN workspace_members AS s ON s.id = msg.sender_id
        LEFT JOIN workspace_channels AS c ON c.id = msg.channel_id
        LEFT JOIN workspace_members AS r ON r.id = msg.recipient_id
        WHERE msg.workspace_id = $1
          AND msg.parent_message_id IS NULL
          AND msg.created_at < $2
          AND ($3::uuid IS NULL OR msg.channel_id = $3)
          AND ($4::uuid IS NULL OR msg.recipient_id = $4)
        ORDER BY msg.created_at DESC, msg.id DESC
        LIMIT $5
        "#,
    )
    .bind(workspace_id)
    .bind(before)
    .bind(channel_id)
    .bind(recipient_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .context("failed to list messages")?;

    let message_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let file_rows = sqlx::query_as::<_, FileDbRow>(
        r#"
        SELECT id, message_id, slug, name, mimetype, url, original_w, original_h
        FROM workspace_message_files
        WHERE message_id = ANY($1)
        ORDER BY slug ASC
        "#,
    )
    .bind(&message_ids)
    .fetch_all(pool)
    .await
    .context("failed to load message attachments")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let files = file_rows
                .iter()
                .filter(|file| file.message_id == row.id)
                .map(|file| FileRecord {
                    id: file.id,
                    slug: file.slug.clone(),
                    name: file.name.clone(),
                    mimetype: file.mimetype.clone(),
                    url: file.url.clone(),
                    original_w: file.original_w,
                    original_h: file.original_h,
                })
                .collect();

            let channel = match (row.c_id, row.c_slug, row.c_name) {
                (Some(id), Some(slug), Some(name)) => Some(ChannelRef { id, slug, name }),
                _ => None,
            };

            MessageListRow {
                id: row.id,
                slug: row.slug,
                body: row.body,
                created_at: row.created_at,
                updated_at: row.updated_at,
                workspace: Some(WorkspaceSummary { id: row.w_id, slug: row.w_slug, name: row.w_name }),
                sender: member_summary_from_parts(
                    row.s_id,
                    row.s_slug,
                    row.s_name,
                    row.s_username,
                    row.s_avatar_url,
                ),
                channel,
                recipient: member_summary_from_parts(
                    row.r_id,
                    row.r_slug,
                    row.r_name,
                    row.r_username,
                    row.r_avatar_url,
                ),
                files,
            }
        })
        .collect())
}

pub(super) async fn update_message(
    pool: &PgPool,
    workspace_id: Uuid,
    sender_id: Uuid,
    slug: &str,
    body: Option<String>,
) -> Result<Option<MessageRecord>> {
    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        UPDATE workspace_messages
        SET body = $4, updated_at = NOW()
        WHERE workspace_id = $1 AND sender_id = $2 AND slug = $3
        RETURNING id, slug, body, created_at, updated_at
        "#,
    )
    .bind(workspace_id)
    .bind(sender_id)
    .bind(slug)
    .bind(&body)
    .fetch_optional(pool)
    .await
    .context("failed to update message")?;

    Ok(row.map(|row| MessageRecord {
        id: row.id,
        slug: row.slug,
        body: row.body,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

pub(super) async fn delete_message(
    pool: &PgPool,
    workspace_id: Uuid,
    sender_id: Uuid,
    slug: &str,
) -> Result<bool> {
    let result =
        sqlx::query("DELETE FROM workspace_messages WHERE workspace_id = $1 AND sender_id = $2 AND slug = $3")
            .bind(workspace_id)
            .bind(sender_id)
            .bind(slug)
            .execute(pool)
            .await
            .context("failed to delete message")?;

    Ok(result.rows_affected() > 0)
}
