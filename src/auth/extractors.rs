use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;

use super::cookies::session_token;
use super::session::{resolve_session, ActiveSession};
use crate::error::AuthError;
use crate::state::AppState;

/// Session resolved by the gate middleware, reused so a request performs at
/// most one lookup.
#[derive(Clone)]
pub(crate) struct ResolvedSession(pub Option<ActiveSession>);

async fn session_from_parts(
    parts: &Parts,
    state: &AppState,
) -> Result<Option<ActiveSession>, AuthError> {
    if let Some(ResolvedSession(session)) = parts.extensions.get::<ResolvedSession>() {
        return Ok(session.clone());
    }
    let jar = CookieJar::from_headers(&parts.headers);
    match session_token(&jar, state.secure_cookies()) {
        Some(token) => resolve_session(state, &token).await,
        None => Ok(None),
    }
}

/// Session if the request carries a valid one.
pub struct MaybeUser(pub Option<ActiveSession>);

/// Session required; rejects with 401 otherwise.
pub struct CurrentUser(pub ActiveSession);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(session_from_parts(parts, state).await?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        session_from_parts(parts, state)
            .await?
            .map(CurrentUser)
            .ok_or(AuthError::Unauthenticated)
    }
}
