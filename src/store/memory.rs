use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{AuthStore, StoreError, StoreResult};
use crate::db::{NewAccount, NewUser, OAuthState, Session, User};

struct Account {
    user_id: Uuid,
    provider: String,
    provider_account_id: String,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    accounts: Vec<Account>,
    sessions: HashMap<String, Session>,
    oauth_states: HashMap<String, OAuthState>,
}

/// Store backed by process memory, mirroring the unique constraints of the
/// Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn user_count(&self) -> usize {
        self.tables.lock().unwrap().users.len()
    }

    pub fn session_count(&self) -> usize {
        self.tables.lock().unwrap().sessions.len()
    }

    pub fn oauth_state_count(&self) -> usize {
        self.tables.lock().unwrap().oauth_states.len()
    }
}

impl Tables {
    fn insert_user(&mut self, user: NewUser, email_verified: Option<OffsetDateTime>) -> User {
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            image: user.image,
            email_verified,
        };
        self.users.push(created.clone());
        created
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict);
        }
        Ok(tables.insert_user(user, None))
    }

    async fn create_linked_user(
        &self,
        user: NewUser,
        account: NewAccount,
        verified_at: OffsetDateTime,
    ) -> StoreResult<User> {
        let mut tables = self.tables.lock().unwrap();
        let email_taken = tables.users.iter().any(|u| u.email == user.email);
        let account_taken = tables.accounts.iter().any(|a| {
            a.provider == account.provider && a.provider_account_id == account.provider_account_id
        });
        if email_taken || account_taken {
            return Err(StoreError::Conflict);
        }
        let created = tables.insert_user(user, Some(verified_at));
        tables.accounts.push(Account {
            user_id: created.id,
            provider: account.provider,
            provider_account_id: account.provider_account_id,
        });
        Ok(created)
    }

    async fn find_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        let user = tables
            .accounts
            .iter()
            .find(|a| a.provider == provider && a.provider_account_id == provider_account_id)
            .and_then(|a| tables.users.iter().find(|u| u.id == a.user_id))
            .cloned();
        Ok(user)
    }

    async fn create_session(&self, session: Session) -> StoreResult<Session> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.users.iter().any(|u| u.id == session.user_id) {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        tables
            .sessions
            .insert(session.session_token.clone(), session.clone());
        Ok(session)
    }

    async fn find_session(&self, session_token: &str) -> StoreResult<Option<Session>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.sessions.get(session_token).cloned())
    }

    async fn delete_session(&self, session_token: &str) -> StoreResult<()> {
        self.tables.lock().unwrap().sessions.remove(session_token);
        Ok(())
    }

    async fn save_oauth_state(&self, pending: &OAuthState) -> StoreResult<()> {
        let now = OffsetDateTime::now_utc();
        let mut tables = self.tables.lock().unwrap();
        tables.oauth_states.retain(|_, s| s.expires_at > now);
        tables
            .oauth_states
            .insert(pending.state.clone(), pending.clone());
        Ok(())
    }

    async fn take_oauth_state(
        &self,
        state: &str,
        provider: &str,
    ) -> StoreResult<Option<OAuthState>> {
        let taken = self.tables.lock().unwrap().oauth_states.remove(state);
        Ok(taken.filter(|s| s.provider == provider && s.expires_at > OffsetDateTime::now_utc()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn pending(state: &str, provider: &str, expires_at: OffsetDateTime) -> OAuthState {
        OAuthState {
            state: state.into(),
            provider: provider.into(),
            pkce_verifier: format!("verifier-{state}"),
            callback_url: "/".into(),
            expires_at,
        }
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: Some("Octo".into()),
            email: email.into(),
            password_hash: None,
            image: None,
        }
    }

    fn github(id: &str) -> NewAccount {
        NewAccount {
            provider: "github".into(),
            provider_account_id: id.into(),
        }
    }

    #[tokio::test]
    async fn saving_a_state_purges_expired_ones() {
        let store = MemoryStore::default();
        let now = OffsetDateTime::now_utc();
        store
            .save_oauth_state(&pending("stale", "google", now - Duration::minutes(1)))
            .await
            .unwrap();
        store
            .save_oauth_state(&pending("fresh", "google", now + Duration::minutes(10)))
            .await
            .unwrap();

        assert_eq!(store.oauth_state_count(), 1);
        assert!(store.take_oauth_state("stale", "google").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn state_is_consumed_even_when_provider_differs() {
        let store = MemoryStore::default();
        let expires = OffsetDateTime::now_utc() + Duration::minutes(10);
        store
            .save_oauth_state(&pending("s1", "google", expires))
            .await
            .unwrap();

        assert!(store.take_oauth_state("s1", "github").await.unwrap().is_none());
        assert_eq!(store.oauth_state_count(), 0);
        assert!(store.take_oauth_state("s1", "google").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn linked_user_conflict_leaves_no_partial_rows() {
        let store = MemoryStore::default();
        let now = OffsetDateTime::now_utc();
        store
            .create_linked_user(new_user("a@example.com"), github("42"), now)
            .await
            .unwrap();

        let err = store
            .create_linked_user(new_user("b@example.com"), github("42"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(store.user_count(), 1);
        assert!(store.find_user_by_email("b@example.com").await.unwrap().is_none());
    }
}
