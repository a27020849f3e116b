//! Register, login and logout as form actions. Each returns a
//! [`FormState`] the page can show next to the form.

use axum::http::StatusCode;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::credentials::authorize_credentials;
use super::gate::safe_callback_url;
use super::password::hash_password;
use super::provider::Provider;
use super::session::{issue_session, revoke_session, IssuedSession};
use super::validation::{LoginForm, RegisterForm};
use crate::db::NewUser;
use crate::error::AuthError;
use crate::state::AppState;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormState {
    pub status: FormStatus,
    pub message: String,
    /// Page to navigate to after a successful sign-in.
    #[serde(rename = "redirectTo", skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

impl FormState {
    pub fn success(message: &str) -> Self {
        Self {
            status: FormStatus::Success,
            message: message.to_string(),
            redirect_to: None,
        }
    }

    pub fn with_redirect(mut self, url: String) -> Self {
        self.redirect_to = Some(url);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Validation failed. Please check your inputs.")]
    Validation,
    #[error("Email already exists")]
    EmailExists,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Something went wrong")]
    Internal,
}

impl ActionError {
    pub fn status_code(self) -> StatusCode {
        match self {
            ActionError::Validation => StatusCode::BAD_REQUEST,
            ActionError::EmailExists => StatusCode::CONFLICT,
            ActionError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ActionError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ActionError> for FormState {
    fn from(e: ActionError) -> Self {
        Self {
            status: FormStatus::Error,
            message: e.to_string(),
            redirect_to: None,
        }
    }
}

fn internal(e: AuthError) -> ActionError {
    error!(error = %e, "action failed");
    ActionError::Internal
}

#[instrument(skip(state, form))]
pub async fn register(state: &AppState, form: RegisterForm) -> Result<FormState, ActionError> {
    let input = form.validate().map_err(|errors| {
        warn!(?errors, "register validation failed");
        ActionError::Validation
    })?;

    let existing = state
        .store
        .find_user_by_email(&input.email)
        .await
        .map_err(|e| internal(e.into()))?;
    if existing.is_some() {
        warn!(email = %input.email, "email already registered");
        return Err(ActionError::EmailExists);
    }

    let password_hash = hash_password(&input.password).map_err(internal)?;

    let created = state
        .store
        .create_user(NewUser {
            name: Some(input.name),
            email: input.email,
            password_hash: Some(password_hash),
            image: Some(String::new()),
        })
        .await;
    match created {
        Ok(user) => {
            info!(user_id = %user.id, email = %user.email, "user registered");
            Ok(FormState::success("User created successfully"))
        }
        Err(StoreError::Conflict) => {
            warn!("email registered concurrently");
            Err(ActionError::EmailExists)
        }
        Err(e) => Err(internal(e.into())),
    }
}

#[instrument(skip(state, form))]
pub async fn login(
    state: &AppState,
    form: LoginForm,
) -> Result<(FormState, IssuedSession), ActionError> {
    let redirect_to = safe_callback_url(form.callback_url.as_deref());
    let credentials = form.validate().map_err(|errors| {
        warn!(?errors, "login validation failed");
        ActionError::Validation
    })?;

    let user = authorize_credentials(state.store.as_ref(), &credentials)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            warn!("login rejected");
            ActionError::InvalidCredentials
        })?;

    let session = issue_session(state, &user, Provider::Credentials)
        .await
        .map_err(internal)?;

    info!(user_id = %user.id, "user logged in");
    Ok((
        FormState::success("User logged in successfully").with_redirect(redirect_to),
        session,
    ))
}

#[instrument(skip_all)]
pub async fn logout(state: &AppState, token: Option<&str>) -> Result<(), AuthError> {
    if let Some(token) = token {
        revoke_session(state, token).await?;
        info!("user logged out");
    }
    Ok(())
}
