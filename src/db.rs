use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")
}

/// User record. `password_hash` is `None` for accounts created through OAuth.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub password_hash: Option<String>,
    pub image: Option<String>,
    pub email_verified: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: String,
    pub password_hash: Option<String>,
    pub image: Option<String>,
}

/// Server-side session created by a credentials login.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_token: String,
    pub user_id: Uuid,
    pub expires: OffsetDateTime,
}

/// Identity at an OAuth provider, linked to the user created for it.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub provider: String,
    pub provider_account_id: String,
}

/// Pending OAuth handshake, kept until the provider calls back.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthState {
    pub state: String,
    pub provider: String,
    pub pkce_verifier: String,
    pub callback_url: String,
    pub expires_at: OffsetDateTime,
}
