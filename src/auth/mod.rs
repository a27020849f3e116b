use crate::state::AppState;
use axum::Router;

pub mod actions;
pub mod cookies;
pub mod credentials;
pub(crate) mod extractors;
pub mod gate;
pub mod handlers;
pub mod jwt;
pub mod oauth;
pub mod password;
pub mod provider;
pub mod session;
pub mod validation;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
