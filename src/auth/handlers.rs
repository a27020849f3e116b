use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use tracing::{error, instrument, warn};

use super::actions::{self, FormState};
use super::cookies::{clear_session_cookie, session_cookie, session_token};
use super::extractors::MaybeUser;
use super::gate::safe_callback_url;
use super::oauth::{link_profile, OAuthClient};
use super::provider::Provider;
use super::session::{issue_session, ActiveSession, SessionUser};
use super::validation::{LoginForm, RegisterForm};
use crate::db::OAuthState;
use crate::error::AuthError;
use crate::state::AppState;

const OAUTH_STATE_TTL: Duration = Duration::minutes(10);

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(session))
        .route("/api/auth/signin/:provider", get(oauth_signin))
        .route("/api/auth/callback/:provider", get(oauth_callback))
}

type ActionResponse = (StatusCode, Json<FormState>);

fn action_error(e: actions::ActionError) -> ActionResponse {
    (e.status_code(), Json(FormState::from(e)))
}

pub async fn register(State(state): State<AppState>, Form(form): Form<RegisterForm>) -> ActionResponse {
    match actions::register(&state, form).await {
        Ok(ok) => (StatusCode::CREATED, Json(ok)),
        Err(e) => action_error(e),
    }
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Json<FormState>), ActionResponse> {
    let (ok, session) = actions::login(&state, form).await.map_err(action_error)?;
    let cookie = session_cookie(&session.token, session.expires, state.secure_cookies());
    Ok((jar.add(cookie), Json(ok)))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let secure = state.secure_cookies();
    let token = session_token(&jar, secure);
    if let Err(e) = actions::logout(&state, token.as_deref()).await {
        error!(error = %e, "session revocation failed");
    }
    (jar.remove(clear_session_cookie(secure)), Redirect::to("/")).into_response()
}

/// Current session as JSON, or `null` when signed out.
pub async fn session(MaybeUser(session): MaybeUser) -> Json<Option<ActiveSession>> {
    Json(session)
}

fn oauth_client<'a>(state: &'a AppState, name: &str) -> Result<&'a OAuthClient, AuthError> {
    name.parse::<Provider>()
        .ok()
        .and_then(|p| state.oauth.get(p))
        .ok_or_else(|| AuthError::UnknownProvider(name.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct SignInParams {
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

#[instrument(skip(state, params))]
pub async fn oauth_signin(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<SignInParams>,
) -> Result<Redirect, AuthError> {
    let client = oauth_client(&state, &provider)?;
    let provider = client.provider();

    let request = client.authorization_url();
    state
        .store
        .save_oauth_state(&OAuthState {
            state: request.csrf_state,
            provider: provider.as_str().to_string(),
            pkce_verifier: request.pkce_verifier,
            callback_url: safe_callback_url(params.callback_url.as_deref()),
            expires_at: OffsetDateTime::now_utc() + OAUTH_STATE_TTL,
        })
        .await?;
    Ok(Redirect::to(&request.url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[instrument(skip(state, jar, params))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect), AuthError> {
    let client = oauth_client(&state, &provider)?;
    let provider = client.provider();

    if let Some(err) = params.error {
        return Err(AuthError::OAuth(format!("provider returned {err}")));
    }
    let (Some(code), Some(csrf_state)) = (params.code, params.state) else {
        return Err(AuthError::OAuth("missing code or state".into()));
    };

    let Some(pending) = state
        .store
        .take_oauth_state(&csrf_state, provider.as_str())
        .await?
    else {
        warn!(%provider, "unknown or expired oauth state");
        return Err(AuthError::OAuth("invalid or expired state".into()));
    };

    let profile = client.fetch_profile(&code, pending.pkce_verifier).await?;
    let user = link_profile(state.store.as_ref(), provider, profile).await?;
    let session = issue_session(&state, &SessionUser::from(&user), provider).await?;

    let cookie = session_cookie(&session.token, session.expires, state.secure_cookies());
    Ok((jar.add(cookie), Redirect::to(&pending.callback_url)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_app;
    use crate::db::NewUser;
    use crate::store::AuthStore;
    use axum::{
        body::{to_bytes, Body},
        http::{
            header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
            Request,
        },
    };
    use tower::ServiceExt;

    fn form_post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(res: Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn session_cookie_pair(res: &Response) -> String {
        let raw = res.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        raw.split(';').next().unwrap().to_string()
    }

    async fn register_and_login(app: &Router) -> String {
        let res = app
            .clone()
            .oneshot(form_post(
                "/api/auth/register",
                "name=Ada&email=ada%40example.com&password=engine-no-1",
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app
            .clone()
            .oneshot(form_post(
                "/api/auth/login",
                "email=ada%40example.com&password=engine-no-1",
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        session_cookie_pair(&res)
    }

    #[tokio::test]
    async fn register_then_duplicate() {
        let (state, _) = AppState::fake();
        let app = build_app(state);
        let body = "name=Ada&email=ada%40example.com&password=engine-no-1";

        let res = app.clone().oneshot(form_post("/api/auth/register", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let json = json_body(res).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "User created successfully");

        let res = app.oneshot(form_post("/api/auth/register", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        let json = json_body(res).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Email already exists");
    }

    #[tokio::test]
    async fn register_with_missing_fields_is_validation_error() {
        let (state, _) = AppState::fake();
        let app = build_app(state);
        let res = app.oneshot(form_post("/api/auth/register", "email=x")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let json = json_body(res).await;
        assert_eq!(json["message"], "Validation failed. Please check your inputs.");
    }

    #[tokio::test]
    async fn login_sets_cookie_and_session_endpoint_reports_user() {
        let (state, _) = AppState::fake();
        let app = build_app(state);
        let cookie = register_and_login(&app).await;
        assert!(cookie.starts_with("authjs.session-token="));

        let res = app
            .oneshot(
                Request::get("/api/auth/session")
                    .header(COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = json_body(res).await;
        assert_eq!(json["user"]["email"], "ada@example.com");
        assert_eq!(json["user"]["name"], "Ada");
        assert!(json["expires"].is_string());
    }

    #[tokio::test]
    async fn bad_login_gets_one_message_and_no_cookie() {
        let (state, _) = AppState::fake();
        let app = build_app(state);
        register_and_login(&app).await;

        for body in [
            "email=ada%40example.com&password=wrong-password",
            "email=nobody%40example.com&password=engine-no-1",
        ] {
            let res = app.clone().oneshot(form_post("/api/auth/login", body)).await.unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
            assert!(res.headers().get(SET_COOKIE).is_none());
            let json = json_body(res).await;
            assert_eq!(json["message"], "Invalid email or password");
        }
    }

    #[tokio::test]
    async fn anonymous_session_is_null() {
        let (state, _) = AppState::fake();
        let res = build_app(state)
            .oneshot(Request::get("/api/auth/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(res).await, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn logout_revokes_and_clears_cookie() {
        let (state, store) = AppState::fake();
        let app = build_app(state);
        let cookie = register_and_login(&app).await;
        assert_eq!(store.session_count(), 1);

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/auth/logout")
                    .header(COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(LOCATION).unwrap(), "/");
        let cleared = res.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cleared.starts_with("authjs.session-token=;"));
        assert_eq!(store.session_count(), 0);

        let res = app
            .oneshot(
                Request::get("/api/auth/session")
                    .header(COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_body(res).await, serde_json::Value::Null);
    }

    async fn oauth_session(state: &AppState, provider: Provider) -> String {
        let user = state
            .store
            .create_user(NewUser {
                name: Some("Octo".into()),
                email: "octo@example.com".into(),
                password_hash: None,
                image: None,
            })
            .await
            .unwrap();
        issue_session(state, &SessionUser::from(&user), provider)
            .await
            .unwrap()
            .token
    }

    fn logout_with(cookie: &str) -> Request<Body> {
        Request::post("/api/auth/logout")
            .header(COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn logout_clears_signed_token_cookie() {
        let (state, store) = AppState::fake();
        let token = oauth_session(&state, Provider::GitHub).await;
        assert_eq!(store.session_count(), 0);

        let res = build_app(state)
            .oneshot(logout_with(&format!("authjs.session-token={token}")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let cleared = res.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cleared.starts_with("authjs.session-token=;"), "{cleared}");
        assert!(cleared.contains("Max-Age=0"), "{cleared}");
    }

    #[tokio::test]
    async fn logout_with_secure_cookies_keeps_secure_attribute() {
        let (state, _) = AppState::fake_with_secure_cookies(true);
        let token = oauth_session(&state, Provider::Google).await;

        let res = build_app(state)
            .oneshot(logout_with(&format!("__Secure-authjs.session-token={token}")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let cleared = res.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cleared.starts_with("__Secure-authjs.session-token=;"), "{cleared}");
        assert!(cleared.contains("; Secure"), "{cleared}");
        assert!(cleared.contains("HttpOnly"), "{cleared}");
        assert!(cleared.contains("Max-Age=0"), "{cleared}");
    }

    #[tokio::test]
    async fn credentials_logout_with_secure_cookies_revokes_and_clears() {
        let (state, store) = AppState::fake_with_secure_cookies(true);
        let app = build_app(state);
        let cookie = register_and_login(&app).await;
        assert!(cookie.starts_with("__Secure-authjs.session-token="));
        assert_eq!(store.session_count(), 1);

        let res = app.oneshot(logout_with(&cookie)).await.unwrap();
        let cleared = res.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cleared.contains("; Secure"), "{cleared}");
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn login_reports_callback_url_as_redirect() {
        let (state, _) = AppState::fake();
        let app = build_app(state);
        app.clone()
            .oneshot(form_post(
                "/api/auth/register",
                "name=Ada&email=ada%40example.com&password=engine-no-1",
            ))
            .await
            .unwrap();

        let res = app
            .oneshot(form_post(
                "/api/auth/login",
                "email=ada%40example.com&password=engine-no-1&callbackUrl=%2Fprofile",
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["redirectTo"], "/profile");
    }

    #[tokio::test]
    async fn oauth_signin_redirects_to_provider_and_stores_state() {
        let (state, store) = AppState::fake();
        let app = build_app(state);
        let res = app
            .oneshot(
                Request::get("/api/auth/signin/google?callbackUrl=%2Fdashboard")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let location = res.headers().get(LOCATION).unwrap().to_str().unwrap();
        let url = url::Url::parse(location).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));

        let csrf = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let pending = store.take_oauth_state(&csrf, "google").await.unwrap().unwrap();
        assert_eq!(pending.callback_url, "/dashboard");
        assert!(!pending.pkce_verifier.is_empty());
        assert!(store.take_oauth_state(&csrf, "google").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oauth_signin_purges_expired_states() {
        let (state, store) = AppState::fake();
        store
            .save_oauth_state(&OAuthState {
                state: "abandoned".into(),
                provider: "github".into(),
                pkce_verifier: "v".into(),
                callback_url: "/".into(),
                expires_at: OffsetDateTime::now_utc() - Duration::minutes(1),
            })
            .await
            .unwrap();
        assert_eq!(store.oauth_state_count(), 1);

        let app = build_app(state);
        for _ in 0..3 {
            let res = app
                .clone()
                .oneshot(Request::get("/api/auth/signin/github").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::SEE_OTHER);
        }
        assert_eq!(store.oauth_state_count(), 3);
        assert!(store.take_oauth_state("abandoned", "github").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let (state, _) = AppState::fake();
        let app = build_app(state);
        for uri in ["/api/auth/signin/facebook", "/api/auth/signin/credentials"] {
            let res = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn callback_with_unknown_state_redirects_to_sign_in() {
        let (state, _) = AppState::fake();
        let res = build_app(state)
            .oneshot(
                Request::get("/api/auth/callback/github?code=abc&state=forged")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            res.headers().get(LOCATION).unwrap(),
            "/auth/sign-in?error=OAuthCallbackError"
        );
    }
}
