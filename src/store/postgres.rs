use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::{AuthStore, StoreError, StoreResult};
use crate::db::{NewAccount, NewUser, OAuthState, Session, User};

const USER_COLUMNS: &str = "id, name, email, password_hash, image, email_verified";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_unique(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl AuthStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, image)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.image)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique)?;
        debug!(user_id = %created.id, "user row inserted");
        Ok(created)
    }

    async fn create_linked_user(
        &self,
        user: NewUser,
        account: NewAccount,
        verified_at: OffsetDateTime,
    ) -> StoreResult<User> {
        let mut tx = self.db.begin().await?;

        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, image, email_verified)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.image)
        .bind(verified_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique)?;

        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, provider, provider_account_id)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(created.id)
        .bind(&account.provider)
        .bind(&account.provider_account_id)
        .execute(&mut *tx)
        .await
        .map_err(map_unique)?;

        tx.commit().await?;
        debug!(user_id = %created.id, provider = %account.provider, "linked user inserted");
        Ok(created)
    }

    async fn find_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.name, u.email, u.password_hash, u.image, u.email_verified
            FROM users u
            JOIN accounts a ON a.user_id = u.id
            WHERE a.provider = $1 AND a.provider_account_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create_session(&self, session: Session) -> StoreResult<Session> {
        let created = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (session_token, user_id, expires)
            VALUES ($1, $2, $3)
            RETURNING session_token, user_id, expires
            "#,
        )
        .bind(&session.session_token)
        .bind(session.user_id)
        .bind(session.expires)
        .fetch_one(&self.db)
        .await?;
        Ok(created)
    }

    async fn find_session(&self, session_token: &str) -> StoreResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT session_token, user_id, expires FROM sessions WHERE session_token = $1",
        )
        .bind(session_token)
        .fetch_optional(&self.db)
        .await?;
        Ok(session)
    }

    async fn delete_session(&self, session_token: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE session_token = $1")
            .bind(session_token)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn save_oauth_state(&self, pending: &OAuthState) -> StoreResult<()> {
        let purged = sqlx::query("DELETE FROM oauth_states WHERE expires_at <= now()")
            .execute(&self.db)
            .await?
            .rows_affected();
        if purged > 0 {
            debug!(purged, "expired oauth states removed");
        }

        sqlx::query(
            r#"
            INSERT INTO oauth_states (state, provider, pkce_verifier, callback_url, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&pending.state)
        .bind(&pending.provider)
        .bind(&pending.pkce_verifier)
        .bind(&pending.callback_url)
        .bind(pending.expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn take_oauth_state(
        &self,
        state: &str,
        provider: &str,
    ) -> StoreResult<Option<OAuthState>> {
        let taken = sqlx::query_as::<_, OAuthState>(
            r#"
            DELETE FROM oauth_states
            WHERE state = $1
            RETURNING state, provider, pkce_verifier, callback_url, expires_at
            "#,
        )
        .bind(state)
        .fetch_optional(&self.db)
        .await?;
        Ok(taken.filter(|s| s.provider == provider && s.expires_at > OffsetDateTime::now_utc()))
    }
}
