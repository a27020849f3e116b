use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::{Duration, OffsetDateTime};

const SESSION_COOKIE: &str = "authjs.session-token";
const SECURE_SESSION_COOKIE: &str = "__Secure-authjs.session-token";

fn session_cookie_name(secure: bool) -> &'static str {
    if secure {
        SECURE_SESSION_COOKIE
    } else {
        SESSION_COOKIE
    }
}

/// Cookie carrying either kind of session token until `expires`.
pub fn session_cookie(token: &str, expires: OffsetDateTime, secure: bool) -> Cookie<'static> {
    let max_age = (expires - OffsetDateTime::now_utc()).max(Duration::ZERO);
    Cookie::build((session_cookie_name(secure), token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Removal counterpart of [`session_cookie`]. Browsers drop a `__Secure-`
/// cookie without the `Secure` attribute, so the attributes must match.
pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((session_cookie_name(secure), ""))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

pub fn session_token(jar: &CookieJar, secure: bool) -> Option<String> {
    jar.get(session_cookie_name(secure))
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
