//! Persistence for users, linked accounts, sessions and pending OAuth
//! handshakes. Handlers only see the [`AuthStore`] trait; production uses
//! [`PgStore`], tests use the in-memory store.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{NewAccount, NewUser, OAuthState, Session, User};

#[cfg(test)]
pub mod memory;
mod postgres;

pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (duplicate email or account).
    #[error("record already exists")]
    Conflict,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    /// Creates a user for a first OAuth sign-in, links `account` to it and
    /// marks the email verified at `verified_at`, all or nothing.
    async fn create_linked_user(
        &self,
        user: NewUser,
        account: NewAccount,
        verified_at: OffsetDateTime,
    ) -> StoreResult<User>;

    async fn find_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> StoreResult<Option<User>>;

    async fn create_session(&self, session: Session) -> StoreResult<Session>;

    async fn find_session(&self, session_token: &str) -> StoreResult<Option<Session>>;

    async fn delete_session(&self, session_token: &str) -> StoreResult<()>;

    /// Stores a pending handshake. Expired handshakes are purged first.
    async fn save_oauth_state(&self, pending: &OAuthState) -> StoreResult<()>;

    /// Consumes the handshake for `state`. The row is removed whether or not
    /// it matches; `None` when it is unknown, belongs to another provider or
    /// has expired.
    async fn take_oauth_state(
        &self,
        state: &str,
        provider: &str,
    ) -> StoreResult<Option<OAuthState>>;
}
