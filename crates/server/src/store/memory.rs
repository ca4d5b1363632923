// In-memory table set mirroring the Postgres schema, used by tests.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use huddle_common::slug;
use uuid::Uuid;

use super::{
    ChannelDetail, ChannelRef, ChannelSummary, DmPeer, MemberDetail, MemberIdentity,
    MemberSummary, MessageListRow, MessageRecord, NewAccount, NewMessage, OwnerSummary, RoleRef,
    SessionRecord, SignupRecord, UserRecord, WorkspaceDetail, WorkspaceRef, WorkspaceSummary,
};

#[derive(Default)]
pub struct MemoryChatStore {
    users: HashMap<Uuid, MemoryUser>,
    passwords: HashMap<Uuid, String>,
    sessions: HashMap<String, MemorySession>,
    workspaces: HashMap<Uuid, MemoryWorkspace>,
    roles: HashMap<Uuid, MemoryRole>,
    members: HashMap<Uuid, MemoryMember>,
    channels: HashMap<Uuid, MemoryChannel>,
    channel_members: HashSet<(Uuid, Uuid)>,
    messages: HashMap<Uuid, MemoryMessage>,
    files: HashMap<Uuid, MemoryFile>,
}

#[derive(Clone)]
struct MemoryUser {
    id: Uuid,
    email: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Clone)]
struct MemorySession {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
struct MemoryWorkspace {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    invite_code: String,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
struct MemoryRole {
    id: Uuid,
    workspace_id: Uuid,
    name: String,
}

#[derive(Clone)]
struct MemoryMember {
    id: Uuid,
    user_id: Uuid,
    workspace_id: Uuid,
    role_id: Uuid,
    name: String,
    username: String,
    slug: String,
    avatar_url: Option<String>,
    is_active: bool,
}

#[derive(Clone)]
struct MemoryChannel {
    id: Uuid,
    workspace_id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    is_private: bool,
    created_by_id: Uuid,
    archived_at: Option<DateTime<Utc>>,
    archived_by_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
struct MemoryMessage {
    id: Uuid,
    workspace_id: Uuid,
    slug: String,
    sender_id: Uuid,
    channel_id: Option<Uuid>,
    recipient_id: Option<Uuid>,
    parent_message_id: Option<Uuid>,
    body: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
struct MemoryFile {
    id: Uuid,
    message_id: Uuid,
    slug: String,
    name: String,
    mimetype: String,
    url: String,
    original_w: Option<i32>,
    original_h: Option<i32>,
}

impl MemoryChatStore {
    // ── accounts ───────────────────────────────────────────────────

    pub fn email_exists(&self, email: &str) -> bool {
        self.users.values().any(|user| user.email == email)
    }

    pub fn login_credentials(&self, email: &str) -> Option<(Uuid, String)> {
        let user = self.users.values().find(|user| user.email == email)?;
        let hash = self.passwords.get(&user.id)?;
        Some((user.id, hash.clone()))
    }

    pub fn create_account(&mut self, account: NewAccount) -> SignupRecord {
        let user_id = Uuid::new_v4();
        self.users.insert(
            user_id,
            MemoryUser {
                id: user_id,
                email: account.email,
                display_name: Some(account.display_name.clone()),
                avatar_url: account.user_avatar_url,
            },
        );
        self.passwords.insert(user_id, account.password_hash);

        let workspace_id = Uuid::new_v4();
        let mut workspace_slug = slug::workspace_slug();
        while self.workspaces.values().any(|w| w.slug == workspace_slug) {
            workspace_slug = slug::workspace_slug();
        }
        let mut invite_code = slug::invite_code();
        while self.workspaces.values().any(|w| w.invite_code == invite_code) {
            invite_code = slug::invite_code();
        }
        self.workspaces.insert(
            workspace_id,
            MemoryWorkspace {
                id: workspace_id,
                name: account.workspace_name,
                slug: workspace_slug.clone(),
                description: None,
                invite_code,
                owner_id: user_id,
                created_at: Utc::now(),
                updated_at: None,
            },
        );

        let admin_role_id = Uuid::new_v4();
        self.roles.insert(
            admin_role_id,
            MemoryRole { id: admin_role_id, workspace_id, name: "admin".to_owned() },
        );
        let member_role_id = Uuid::new_v4();
        self.roles.insert(
            member_role_id,
            MemoryRole { id: member_role_id, workspace_id, name: "member".to_owned() },
        );

        let member_id = Uuid::new_v4();
        self.members.insert(
            member_id,
            MemoryMember {
                id: member_id,
                user_id,
                workspace_id,
                role_id: admin_role_id,
                name: account.display_name.clone(),
                username: account.display_name,
                slug: slug::member_slug(),
                avatar_url: account.member_avatar_url,
                is_active: true,
            },
        );

        let channel_id = Uuid::new_v4();
        self.channels.insert(
            channel_id,
            MemoryChannel {
                id: channel_id,
                workspace_id,
                name: "General".to_owned(),
                slug: slug::channel_slug(),
                description: None,
                is_private: false,
                created_by_id: member_id,
                archived_at: None,
                archived_by_id: None,
                created_at: Utc::now(),
                updated_at: None,
            },
        );
        self.channel_members.insert((channel_id, member_id));

        SignupRecord { user_id, workspace_id, workspace_slug }
    }

    // ── sessions ───────────────────────────────────────────────────

    pub fn insert_session(&mut self, id: &str, user_id: Uuid, expires_at: DateTime<Utc>) {
        self.sessions.insert(id.to_owned(), MemorySession { user_id, expires_at });
    }

    pub fn session_with_user(&self, id: &str) -> Option<(SessionRecord, UserRecord)> {
        let session = self.sessions.get(id)?;
        let user = self.users.get(&session.user_id)?;
        Some((
            SessionRecord {
                id: id.to_owned(),
                user_id: session.user_id,
                expires_at: session.expires_at,
            },
            UserRecord {
                id: user.id,
                email: user.email.clone(),
                display_name: user.display_name.clone(),
                avatar_url: user.avatar_url.clone(),
            },
        ))
    }

    pub fn update_session_expiry(&mut self, id: &str, expires_at: DateTime<Utc>) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.expires_at = expires_at;
        }
    }

    pub fn delete_session(&mut self, id: &str) {
        self.sessions.remove(id);
    }

    // ── workspaces & membership ────────────────────────────────────

    pub fn workspace_by_slug(&self, slug: &str) -> Option<WorkspaceRef> {
        self.workspaces
            .values()
            .find(|workspace| workspace.slug == slug)
            .map(|workspace| WorkspaceRef { id: workspace.id, slug: workspace.slug.clone() })
    }

    pub fn default_workspace_slug(&self, user_id: Uuid) -> Option<String> {
        self.members
            .values()
            .filter(|member| member.user_id == user_id && member.is_active)
            .filter_map(|member| self.workspaces.get(&member.workspace_id))
            .min_by_key(|workspace| workspace.created_at)
            .map(|workspace| workspace.slug.clone())
    }

    pub fn active_member(&self, user_id: Uuid, workspace_slug: &str) -> Option<MemberIdentity> {
        let workspace = self.workspaces.values().find(|w| w.slug == workspace_slug)?;
        let member = self.members.values().find(|member| {
            member.user_id == user_id && member.workspace_id == workspace.id && member.is_active
        })?;
        let user = self.users.get(&user_id)?;
        if user.email.is_empty() {
            return None;
        }
        let role = self.roles.get(&member.role_id)?;

        Some(MemberIdentity {
            id: member.id,
            email: user.email.clone(),
            name: member.name.clone(),
            slug: member.slug.clone(),
            username: member.username.clone(),
            avatar_url: member.avatar_url.clone(),
            role: RoleRef { id: role.id, name: role.name.clone() },
        })
    }

    pub fn workspace_detail(&self, slug: &str) -> Option<WorkspaceDetail> {
        let workspace = self.workspaces.values().find(|w| w.slug == slug)?;
        let owner = self
            .members
            .values()
            .find(|m| m.workspace_id == workspace.id && m.user_id == workspace.owner_id)
            .map(|m| OwnerSummary { id: m.id, name: m.name.clone(), slug: m.slug.clone() });

        Some(WorkspaceDetail {
            id: workspace.id,
            name: workspace.name.clone(),
            slug: workspace.slug.clone(),
            description: workspace.description.clone(),
            created_at: workspace.created_at,
            updated_at: workspace.updated_at,
            channel_slug: self.first_channel_slug(workspace.id),
            owner,
        })
    }

    pub fn first_channel_slug(&self, workspace_id: Uuid) -> Option<String> {
        self.channels
            .values()
            .filter(|channel| channel.workspace_id == workspace_id)
            .min_by_key(|channel| channel.created_at)
            .map(|channel| channel.slug.clone())
    }

    pub fn member_by_slug(&self, workspace_id: Uuid, member_slug: &str) -> Option<MemberDetail> {
        let member = self
            .members
            .values()
            .find(|m| m.workspace_id == workspace_id && m.slug == member_slug)?;
        let email = self.users.get(&member.user_id).map(|user| user.email.clone());

        Some(MemberDetail {
            id: member.id,
            name: member.name.clone(),
            slug: member.slug.clone(),
            is_active: member.is_active,
            username: member.username.clone(),
            email,
            avatar_url: member.avatar_url.clone(),
        })
    }

    // ── channels ───────────────────────────────────────────────────

    fn member_summary(&self, member_id: Uuid) -> Option<MemberSummary> {
        self.members.get(&member_id).map(|member| MemberSummary {
            id: member.id,
            slug: member.slug.clone(),
            name: member.name.clone(),
            username: member.username.clone(),
            avatar_url: member.avatar_url.clone(),
        })
    }

    pub fn channel_detail_for_member(
        &self,
        member_id: Uuid,
        channel_slug: &str,
    ) -> Option<ChannelDetail> {
        let channel = self.channels.values().find(|channel| {
            channel.slug == channel_slug && self.channel_members.contains(&(channel.id, member_id))
        })?;

        Some(ChannelDetail {
            id: channel.id,
            name: channel.name.clone(),
            slug: channel.slug.clone(),
            is_private: channel.is_private,
            description: channel.description.clone(),
            created_at: channel.created_at,
            updated_at: channel.updated_at,
            archived_at: channel.archived_at,
            created_by: self.member_summary(channel.created_by_id),
            archived_by: channel.archived_by_id.and_then(|id| self.member_summary(id)),
        })
    }

    pub fn channel_name_exists(&self, workspace_id: Uuid, name: &str) -> bool {
        self.channels
            .values()
            .any(|channel| channel.workspace_id == workspace_id && channel.name == name)
    }

    pub fn create_channel(
        &mut self,
        workspace_id: Uuid,
        creator_member_id: Uuid,
        name: &str,
        is_private: bool,
    ) -> ChannelSummary {
        let mut channel_slug = slug::channel_slug();
        while self
            .channels
            .values()
            .any(|c| c.workspace_id == workspace_id && c.slug == channel_slug)
        {
            channel_slug = slug::channel_slug();
        }

        let channel_id = Uuid::new_v4();
        self.channels.insert(
            channel_id,
            MemoryChannel {
                id: channel_id,
                workspace_id,
                name: name.to_owned(),
                slug: channel_slug.clone(),
                description: None,
                is_private,
                created_by_id: creator_member_id,
                archived_at: None,
                archived_by_id: None,
                created_at: Utc::now(),
                updated_at: None,
            },
        );
        self.channel_members.insert((channel_id, creator_member_id));

        ChannelSummary { id: channel_id, name: name.to_owned(), slug: channel_slug, is_private }
    }

    pub fn channels_for_member(&self, member_id: Uuid) -> Vec<ChannelSummary> {
        let mut channels: Vec<&MemoryChannel> = self
            .channels
            .values()
            .filter(|channel| self.channel_members.contains(&(channel.id, member_id)))
            .collect();
        channels.sort_by_key(|channel| channel.created_at);

        channels
            .into_iter()
            .map(|channel| ChannelSummary {
                id: channel.id,
                name: channel.name.clone(),
                slug: channel.slug.clone(),
                is_private: channel.is_private,
            })
            .collect()
    }

    pub fn dm_peers(&self, workspace_id: Uuid, member_id: Uuid, limit: usize) -> Vec<DmPeer> {
        let mut peers: Vec<(&MemoryMember, Option<DateTime<Utc>>)> = self
            .members
            .values()
            .filter(|member| member.workspace_id == workspace_id && member.is_active)
            .map(|member| {
                let last_exchange = self
                    .messages
                    .values()
                    .filter(|message| {
                        let involves_peer = message.sender_id == member.id
                            || message.recipient_id == Some(member.id);
                        let involves_caller = message.sender_id == member_id
                            || message.recipient_id == Some(member_id);
                        involves_peer && involves_caller
                    })
                    .map(|message| message.created_at)
                    .max();
                (member, last_exchange)
            })
            .collect();

        // Caller first, then most recently messaged peers.
        peers.sort_by(|(a, a_at), (b, b_at)| {
            let a_self = a.id == member_id;
            let b_self = b.id == member_id;
            b_self.cmp(&a_self).then(b_at.cmp(a_at)).then(a.slug.cmp(&b.slug))
        });

        peers
            .into_iter()
            .take(limit)
            .map(|(member, _)| DmPeer {
                id: member.id,
                name: member.name.clone(),
                slug: member.slug.clone(),
                username: member.username.clone(),
                avatar_url: member.avatar_url.clone(),
            })
            .collect()
    }

    // ── message targets ────────────────────────────────────────────

    pub fn channel_for_posting(
        &self,
        workspace_id: Uuid,
        member_id: Uuid,
        channel_slug: &str,
    ) -> Option<Uuid> {
        self.channels
            .values()
            .find(|channel| {
                channel.workspace_id == workspace_id
                    && channel.slug == channel_slug
                    && channel.archived_at.is_none()
                    && channel.archived_by_id.is_none()
                    && self.channel_members.contains(&(channel.id, member_id))
            })
            .map(|channel| channel.id)
    }

    pub fn channel_id_in_workspace(&self, workspace_id: Uuid, channel_slug: &str) -> Option<Uuid> {
        self.channels
            .values()
            .find(|channel| channel.workspace_id == workspace_id && channel.slug == channel_slug)
            .map(|channel| channel.id)
    }

    pub fn member_id_in_workspace(&self, workspace_id: Uuid, member_slug: &str) -> Option<Uuid> {
        self.members
            .values()
            .find(|member| member.workspace_id == workspace_id && member.slug == member_slug)
            .map(|member| member.id)
    }

    // ── messages ───────────────────────────────────────────────────

    pub fn create_message(&mut self, message: NewMessage) -> MessageRecord {
        let mut message_slug = slug::message_slug();
        while self
            .messages
            .values()
            .any(|m| m.workspace_id == message.workspace_id && m.slug == message_slug)
        {
            message_slug = slug::message_slug();
        }

        let id = Uuid::new_v4();
        let created_at = Utc::now();
        self.messages.insert(
            id,
            MemoryMessage {
                id,
                workspace_id: message.workspace_id,
                slug: message_slug.clone(),
                sender_id: message.sender_id,
                channel_id: message.channel_id,
                recipient_id: message.recipient_id,
                parent_message_id: message.parent_message_id,
                body: message.body.clone(),
                created_at,
                updated_at: None,
            },
        );

        MessageRecord {
            id,
            slug: message_slug,
            body: message.body,
            created_at,
            updated_at: None,
        }
    }

    pub fn list_messages(
        &self,
        workspace_id: Uuid,
        channel_id: Option<Uuid>,
        recipient_id: Option<Uuid>,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Vec<MessageListRow> {
        let mut rows: Vec<&MemoryMessage> = self
            .messages
            .values()
            .filter(|message| {
                message.workspace_id == workspace_id
                    && message.parent_message_id.is_none()
                    && message.created_at < before
                    && channel_id.is_none_or(|id| message.channel_id == Some(id))
                    && recipient_id.is_none_or(|id| message.recipient_id == Some(id))
            })
            .collect();

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);

        rows.into_iter()
            .map(|message| {
                let workspace = self.workspaces.get(&workspace_id).map(|w| WorkspaceSummary {
                    id: w.id,
                    slug: w.slug.clone(),
                    name: w.name.clone(),
                });
                let channel = message.channel_id.and_then(|id| self.channels.get(&id)).map(|c| {
                    ChannelRef { id: c.id, slug: c.slug.clone(), name: c.name.clone() }
                });
                let mut files: Vec<_> = self
                    .files
                    .values()
                    .filter(|file| file.message_id == message.id)
                    .map(|file| super::FileRecord {
                        id: file.id,
                        slug: file.slug.clone(),
                        name: file.name.clone(),
                        mimetype: file.mimetype.clone(),
                        url: file.url.clone(),
                        original_w: file.original_w,
                        original_h: file.original_h,
                    })
                    .collect();
                files.sort_by(|a, b| a.slug.cmp(&b.slug));

                MessageListRow {
                    id: message.id,
                    slug: message.slug.clone(),
                    body: message.body.clone(),
                    created_at: message.created_at,
                    updated_at: message.updated_at,
                    workspace,
                    sender: self.member_summary(message.sender_id),
                    channel,
                    recipient: message.recipient_id.and_then(|id| self.member_summary(id)),
                    files,
                }
            })
            .collect()
    }

    fn owned_message_id(&self, workspace_id: Uuid, sender_id: Uuid, slug: &str) -> Option<Uuid> {
        self.messages
            .values()
            .find(|message| {
                message.workspace_id == workspace_id
                    && message.sender_id == sender_id
                    && message.slug == slug
            })
            .map(|message| message.id)
    }

    pub fn update_message(
        &mut self,
        workspace_id: Uuid,
        sender_id: Uuid,
        slug: &str,
        body: Option<String>,
    ) -> Option<MessageRecord> {
        let id = self.owned_message_id(workspace_id, sender_id, slug)?;
        let message = self.messages.get_mut(&id)?;
        message.body = body;
        message.updated_at = Some(Utc::now());

        Some(MessageRecord {
            id: message.id,
            slug: message.slug.clone(),
            body: message.body.clone(),
            created_at: message.created_at,
            updated_at: message.updated_at,
        })
    }

    pub fn delete_message(&mut self, workspace_id: Uuid, sender_id: Uuid, slug: &str) -> bool {
        match self.owned_message_id(workspace_id, sender_id, slug) {
            Some(id) => {
                self.messages.remove(&id);
                self.files.retain(|_, file| file.message_id != id);
                true
            }
            None => false,
        }
    }

    // ── test helpers ───────────────────────────────────────────────

    /// Enroll an existing user into a workspace with the `member` role.
    #[cfg(test)]
    pub(crate) fn enroll_user_for_tests(
        &mut self,
        user_id: Uuid,
        workspace_id: Uuid,
        name: &str,
    ) -> Uuid {
        let role_id = self
            .roles
            .values()
            .find(|role| role.workspace_id == workspace_id && role.name == "member")
            .map(|role| role.id)
            .expect("workspace should have a member role");

        let member_id = Uuid::new_v4();
        self.members.insert(
            member_id,
            MemoryMember {
                id: member_id,
                user_id,
                workspace_id,
                role_id,
                name: name.to_owned(),
                username: name.to_owned(),
                slug: slug::member_slug(),
                avatar_url: None,
                is_active: true,
            },
        );
        member_id
    }

    #[cfg(test)]
    pub(crate) fn set_member_active_for_tests(&mut self, member_id: Uuid, is_active: bool) {
        if let Some(member) = self.members.get_mut(&member_id) {
            member.is_active = is_active;
        }
    }

    #[cfg(test)]
    pub(crate) fn set_message_timestamp_for_tests(&mut self, slug: &str, at: DateTime<Utc>) {
        if let Some(message) = self.messages.values_mut().find(|message| message.slug == slug) {
            message.created_at = at;
        }
    }

    #[cfg(test)]
    pub(crate) fn attach_file_for_tests(&mut self, message_slug: &str, name: &str, url: &str) {
        let message_id = self
            .messages
            .values()
            .find(|message| message.slug == message_slug)
            .map(|message| message.id)
            .expect("message should exist");

        let id = Uuid::new_v4();
        self.files.insert(
            id,
            MemoryFile {
                id,
                message_id,
                slug: slug::file_slug(),
                name: name.to_owned(),
                mimetype: "image/png".to_owned(),
                url: url.to_owned(),
                original_w: None,
                original_h: None,
            },
        );
    }

    #[cfg(test)]
    pub(crate) fn archive_channel_for_tests(&mut self, channel_slug: &str, archiver: Uuid) {
        if let Some(channel) = self.channels.values_mut().find(|c| c.slug == channel_slug) {
            channel.archived_at = Some(Utc::now());
            channel.archived_by_id = Some(archiver);
        }
    }

    #[cfg(test)]
    pub(crate) fn member_slug_for_tests(&self, member_id: Uuid) -> String {
        self.members
            .get(&member_id)
            .map(|member| member.slug.clone())
            .expect("member should exist")
    }
}
