use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, error};

use super::cookies::session_token;
use super::extractors::ResolvedSession;
use super::session::resolve_session;
use crate::state::AppState;

pub const SIGN_IN_PAGE: &str = "/auth/sign-in";
pub const HOME: &str = "/";
// Both are matched by whole path segment (see `under`), not by raw string
// prefix: `/authors` is outside the auth section and `/dashboards-public` is
// not protected.
const AUTH_SECTION: &str = "/auth";
const PROTECTED_ROUTES: [&str; 3] = ["/dashboard", "/profile", "/settings"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(&'static str),
    Deny,
}

/// `path` is `prefix` itself or a descendant of it.
fn under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

pub fn authorize(path: &str, logged_in: bool) -> Decision {
    if logged_in && under(path, AUTH_SECTION) {
        return Decision::Redirect(HOME);
    }
    if !logged_in && PROTECTED_ROUTES.iter().any(|route| under(path, route)) {
        return Decision::Deny;
    }
    Decision::Allow
}

/// Where to send a user after signing in. Only same-origin absolute paths
/// are honored; anything else falls back to the home page.
pub fn safe_callback_url(raw: Option<&str>) -> String {
    match raw {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.contains('\\') => {
            url.to_string()
        }
        _ => HOME.to_string(),
    }
}

fn sign_in_redirect(callback: &str) -> Redirect {
    let encoded: String = url::form_urlencoded::byte_serialize(callback.as_bytes()).collect();
    Redirect::to(&format!("{SIGN_IN_PAGE}?callbackUrl={encoded}"))
}

/// Runs [`authorize`] on every request. The resolved session is handed on to
/// the extractors through request extensions.
pub async fn authorized(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    let session = match session_token(&jar, state.secure_cookies()) {
        Some(token) => resolve_session(&state, &token).await.unwrap_or_else(|e| {
            error!(error = %e, "session lookup failed; treating request as anonymous");
            None
        }),
        None => None,
    };

    let path = req.uri().path().to_string();
    match authorize(&path, session.is_some()) {
        Decision::Allow => {
            req.extensions_mut().insert(ResolvedSession(session));
            next.run(req).await
        }
        Decision::Redirect(to) => {
            debug!(%path, to, "signed-in user redirected away");
            Redirect::to(to).into_response()
        }
        Decision::Deny => {
            debug!(%path, "anonymous request to protected route denied");
            sign_in_redirect(&path).into_response()
        }
    }
}
