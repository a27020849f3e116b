//! Session issuance and lookup.
//!
//! Credentials logins get an opaque UUID token backed by a row in
//! `sessions`, so they can be revoked server side. OAuth logins get a signed
//! token that is validated without touching the database. A cookie value is
//! told apart by shape: UUIDs are looked up, anything else is verified as a
//! signed token.

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::provider::Provider;
use crate::db::{Session, User};
use crate::error::AuthError;
use crate::state::AppState;

/// Identity exposed to pages and to `GET /api/auth/session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            image: user.image.clone().filter(|i| !i.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveSession {
    pub user: SessionUser,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires: OffsetDateTime,
}

pub async fn issue_session(
    state: &AppState,
    user: &SessionUser,
    provider: Provider,
) -> Result<IssuedSession, AuthError> {
    let max_age = state.session_max_age();
    if provider.is_oauth() {
        let (token, expires) = state.jwt.sign(user, provider, max_age)?;
        return Ok(IssuedSession { token, expires });
    }

    let session = state
        .store
        .create_session(Session {
            session_token: Uuid::new_v4().to_string(),
            user_id: user.id,
            expires: OffsetDateTime::now_utc() + max_age,
        })
        .await?;
    info!(user_id = %user.id, "database session created");
    Ok(IssuedSession {
        token: session.session_token,
        expires: session.expires,
    })
}

pub async fn resolve_session(
    state: &AppState,
    token: &str,
) -> Result<Option<ActiveSession>, AuthError> {
    if Uuid::parse_str(token).is_err() {
        return Ok(match state.jwt.verify(token) {
            Ok(claims) => Some(ActiveSession {
                user: claims.user(),
                expires: claims.expires(),
            }),
            Err(e) => {
                debug!(error = %e, "rejected session jwt");
                None
            }
        });
    }

    let Some(session) = state.store.find_session(token).await? else {
        return Ok(None);
    };
    if session.expires <= OffsetDateTime::now_utc() {
        debug!(user_id = %session.user_id, "expired session removed");
        state.store.delete_session(token).await?;
        return Ok(None);
    }
    let Some(user) = state.store.find_user_by_id(session.user_id).await? else {
        warn!(user_id = %session.user_id, "session refers to a missing user");
        return Ok(None);
    };
    Ok(Some(ActiveSession {
        user: SessionUser::from(&user),
        expires: session.expires,
    }))
}

/// Deletes a server-side session. Signed tokens cannot be revoked and are
/// only dropped from the client.
pub async fn revoke_session(state: &AppState, token: &str) -> Result<(), AuthError> {
    if Uuid::parse_str(token).is_ok() {
        state.store.delete_session(token).await?;
    }
    Ok(())
}
