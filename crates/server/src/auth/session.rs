// Cookie-backed sessions persisted through the shared store.
//
// Session ids are 40-char opaque strings (30 random bytes, base64url).
// A session lives for three days; validation past the half-life extends
// it to a full lifetime again and flags the caller to reissue the
// cookie. Concurrent extensions are last-writer-wins.

use anyhow::Result;
use axum::http::{header::COOKIE, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use rand::RngCore;
use uuid::Uuid;

use crate::store::{ChatStore, SessionRecord, UserRecord};

pub const SESSION_COOKIE: &str = "chat-session";
pub const SESSION_LIFETIME_DAYS: i64 = 3;

const SESSION_ID_BYTES: usize = 30;

#[derive(Clone)]
pub struct SessionManager {
    store: ChatStore,
    secure_cookies: bool,
}

#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub id: String,
    pub cookie: String,
}

#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub session: SessionRecord,
    pub user: UserRecord,
    /// True when the expiry was just extended and the cookie should be
    /// reissued with the new lifetime.
    pub fresh: bool,
}

impl SessionManager {
    pub fn new(store: ChatStore, secure_cookies: bool) -> Self {
        Self { store, secure_cookies }
    }

    pub async fn create(&self, user_id: Uuid) -> Result<CreatedSession> {
        let id = generate_session_id();
        let expires_at = Utc::now() + Duration::days(SESSION_LIFETIME_DAYS);
        self.store.insert_session(&id, user_id, expires_at).await?;

        let cookie = self.cookie(&id);
        Ok(CreatedSession { id, cookie })
    }

    /// Look up a session; expired rows are deleted on sight and report as
    /// absent.
    pub async fn validate(&self, id: &str) -> Result<Option<ValidatedSession>> {
        let Some((mut session, user)) = self.store.session_with_user(id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if session.expires_at <= now {
            self.store.delete_session(id).await?;
            return Ok(None);
        }

        let half_life = Duration::days(SESSION_LIFETIME_DAYS) / 2;
        let fresh = session.expires_at - now < half_life;
        if fresh {
            session.expires_at = now + Duration::days(SESSION_LIFETIME_DAYS);
            self.store.update_session_expiry(id, session.expires_at).await?;
        }

        Ok(Some(ValidatedSession { session, user, fresh }))
    }

    pub async fn invalidate(&self, id: &str) -> Result<()> {
        self.store.delete_session(id).await
    }

    pub fn cookie(&self, id: &str) -> String {
        let max_age = Duration::days(SESSION_LIFETIME_DAYS).num_seconds();
        format!(
            "{SESSION_COOKIE}={id}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax{}",
            self.secure_suffix()
        )
    }

    /// A clearing directive for logout and invalid-session responses.
    pub fn blank_cookie(&self) -> String {
        format!(
            "{SESSION_COOKIE}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax{}",
            self.secure_suffix()
        )
    }

    fn secure_suffix(&self) -> &'static str {
        if self.secure_cookies {
            "; Secure"
        } else {
            ""
        }
    }
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Extract the session id from the request's `Cookie` header.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{generate_session_id, session_id_from_headers, SessionManager};
    use crate::store::{ChatStore, NewAccount};

    fn test_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_owned(),
            password_hash: "argon2-hash".to_owned(),
            display_name: "Ada".to_owned(),
            workspace_name: "Ada's Workspace".to_owned(),
            user_avatar_url: None,
            member_avatar_url: None,
        }
    }

    async fn seeded_user(store: &ChatStore) -> Uuid {
        store
            .create_account(test_account("ada@example.com"))
            .await
            .expect("signup should succeed")
            .user_id
    }

    #[test]
    fn session_ids_are_forty_chars_and_unique() {
        let first = generate_session_id();
        let second = generate_session_id();
        assert_eq!(first.len(), 40);
        assert_eq!(second.len(), 40);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn created_session_validates_and_is_not_fresh() {
        let store = ChatStore::in_memory();
        let user_id = seeded_user(&store).await;
        let sessions = SessionManager::new(store, false);

        let created = sessions.create(user_id).await.expect("create should succeed");
        assert!(created.cookie.starts_with("chat-session="));
        assert!(created.cookie.contains("HttpOnly"));
        assert!(created.cookie.contains("Max-Age=259200"));
        assert!(!created.cookie.contains("Secure"));

        let validated = sessions
            .validate(&created.id)
            .await
            .expect("validate should succeed")
            .expect("session should exist");
        assert_eq!(validated.user.id, user_id);
        assert!(!validated.fresh);
    }

    #[tokio::test]
    async fn secure_attribute_follows_environment() {
        let sessions = SessionManager::new(ChatStore::in_memory(), true);
        assert!(sessions.cookie("abc").contains("; Secure"));
        assert!(sessions.blank_cookie().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn expired_session_is_removed_on_validation() {
        let store = ChatStore::in_memory();
        let user_id = seeded_user(&store).await;
        store
            .insert_session("expired-session", user_id, Utc::now() - Duration::minutes(1))
            .await
            .expect("insert should succeed");

        let sessions = SessionManager::new(store.clone(), false);
        assert!(sessions
            .validate("expired-session")
            .await
            .expect("validate should succeed")
            .is_none());
        // Row is gone, not merely reported absent.
        assert!(store
            .session_with_user("expired-session")
            .await
            .expect("lookup should succeed")
            .is_none());
    }

    #[tokio::test]
    async fn session_past_half_life_is_extended_and_fresh() {
        let store = ChatStore::in_memory();
        let user_id = seeded_user(&store).await;
        let old_expiry = Utc::now() + Duration::days(1);
        store
            .insert_session("aging-session", user_id, old_expiry)
            .await
            .expect("insert should succeed");

        let sessions = SessionManager::new(store, false);
        let validated = sessions
            .validate("aging-session")
            .await
            .expect("validate should succeed")
            .expect("session should exist");
        assert!(validated.fresh);
        assert!(validated.session.expires_at > old_expiry + Duration::days(1));
    }

    #[tokio::test]
    async fn invalidated_session_no_longer_validates() {
        let store = ChatStore::in_memory();
        let user_id = seeded_user(&store).await;
        let sessions = SessionManager::new(store, false);

        let created = sessions.create(user_id).await.expect("create should succeed");
        sessions.invalidate(&created.id).await.expect("invalidate should succeed");
        assert!(sessions
            .validate(&created.id)
            .await
            .expect("validate should succeed")
            .is_none());
    }

    #[test]
    fn cookie_header_parsing_finds_the_session() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; chat-session=abc123; lang=en"),
        );
        assert_eq!(session_id_from_headers(&headers).as_deref(), Some("abc123"));

        let mut empty = HeaderMap::new();
        empty.insert(COOKIE, HeaderValue::from_static("chat-session="));
        assert!(session_id_from_headers(&empty).is_none());
        assert!(session_id_from_headers(&HeaderMap::new()).is_none());
    }
}
