// Workspace membership resolution.
//
// The single authorization function for HTTP and WebSocket alike. Any
// gap in the chain — unknown workspace, no membership row, deactivated
// member, missing email or role — collapses to Forbidden; the reason is
// never distinguished on the wire.

use uuid::Uuid;

use crate::error::ApiError;
use crate::store::{ChatStore, MemberIdentity, WorkspaceRef};

#[derive(Debug, Clone)]
pub struct ResolvedMembership {
    pub workspace: WorkspaceRef,
    pub member: MemberIdentity,
}

pub async fn resolve(
    store: &ChatStore,
    user_id: Uuid,
    workspace_slug: &str,
) -> Result<ResolvedMembership, ApiError> {
    let workspace = store
        .workspace_by_slug(workspace_slug)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(ApiError::forbidden)?;

    let member = store
        .active_member(user_id, workspace_slug)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(ApiError::forbidden)?;

    Ok(ResolvedMembership { workspace, member })
}

#[cfg(test)]
mod tests {
    use super::resolve;
    use crate::error::ErrorCode;
    use crate::store::{ChatStore, NewAccount};

    fn account(email: &str, name: &str) -> NewAccount {
        NewAccount {
            email: email.to_owned(),
            password_hash: "argon2-hash".to_owned(),
            display_name: name.to_owned(),
            workspace_name: format!("{name}'s Workspace"),
            user_avatar_url: None,
            member_avatar_url: None,
        }
    }

    #[tokio::test]
    async fn resolves_an_active_member_of_the_workspace() {
        let store = ChatStore::in_memory();
        let signup = store
            .create_account(account("ada@example.com", "Ada"))
            .await
            .expect("signup should succeed");

        let resolved = resolve(&store, signup.user_id, &signup.workspace_slug)
            .await
            .expect("membership should resolve");
        assert_eq!(resolved.workspace.id, signup.workspace_id);
        assert_eq!(resolved.member.email, "ada@example.com");
        assert_eq!(resolved.member.role.name, "admin");
    }

    #[tokio::test]
    async fn membership_does_not_leak_across_workspaces() {
        let store = ChatStore::in_memory();
        let ada = store
            .create_account(account("ada@example.com", "Ada"))
            .await
            .expect("signup should succeed");
        let grace = store
            .create_account(account("grace@example.com", "Grace"))
            .await
            .expect("signup should succeed");

        let error = resolve(&store, ada.user_id, &grace.workspace_slug)
            .await
            .expect_err("cross-workspace resolution should fail");
        assert_eq!(error.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn unknown_workspace_is_forbidden() {
        let store = ChatStore::in_memory();
        let signup = store
            .create_account(account("ada@example.com", "Ada"))
            .await
            .expect("signup should succeed");

        let error = resolve(&store, signup.user_id, "WDOESNOTEXIST")
            .await
            .expect_err("unknown workspace should fail");
        assert_eq!(error.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn deactivation_revokes_access_immediately() {
        let store = ChatStore::in_memory();
        let signup = store
            .create_account(account("ada@example.com", "Ada"))
            .await
            .expect("signup should succeed");

        let member_id = resolve(&store, signup.user_id, &signup.workspace_slug)
            .await
            .expect("membership should resolve")
            .member
            .id;

        if let ChatStore::Memory(inner) = &store {
            inner.write().await.set_member_active_for_tests(member_id, false);
        }

        let error = resolve(&store, signup.user_id, &signup.workspace_slug)
            .await
            .expect_err("deactivated member should fail");
        assert_eq!(error.code(), ErrorCode::Forbidden);
    }
}
