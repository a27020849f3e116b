use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

use crate::auth::gate::SIGN_IN_PAGE;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No valid session on a route that requires one.
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Provider error, state mismatch or token exchange failure.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// The provider's email belongs to a user who signed up another way.
    #[error("Email is already linked to another sign-in method")]
    AccountNotLinked,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("password hash error: {0}")]
    Hash(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()).into_response(),
            Self::UnknownProvider(_) => (StatusCode::NOT_FOUND, self.to_string()).into_response(),
            Self::OAuth(ref msg) => {
                tracing::warn!(error = %msg, "oauth sign-in failed");
                Redirect::to(&format!("{SIGN_IN_PAGE}?error=OAuthCallbackError")).into_response()
            }
            Self::AccountNotLinked => {
                Redirect::to(&format!("{SIGN_IN_PAGE}?error=OAuthAccountNotLinked")).into_response()
            }
            Self::Store(_) | Self::Token(_) | Self::Hash(_) => {
                tracing::error!(error = %self, "auth internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}
