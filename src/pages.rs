//! Bare HTML pages for trying the flows from a browser. Styling and client
//! behavior are left to whatever front end replaces them.

use axum::{
    extract::{OriginalUri, Query, State},
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::auth::extractors::{CurrentUser, MaybeUser};
use crate::auth::gate::safe_callback_url;
use crate::auth::provider::Provider;
use crate::state::AppState;

const DEFAULT_AVATAR: &str = "https://github.com/shadcn.png";

pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/auth/sign-in", get(sign_in))
        .route("/auth/sign-up", get(sign_up))
        .route("/dashboard", get(protected))
        .route("/profile", get(protected))
        .route("/settings", get(protected))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>{}</title></head><body>{}</body></html>",
        escape(title),
        body
    ))
}

pub async fn home(MaybeUser(session): MaybeUser) -> Html<String> {
    let nav = match session {
        Some(s) => {
            let avatar = s.user.image.as_deref().unwrap_or(DEFAULT_AVATAR);
            let name = s.user.name.as_deref().unwrap_or(&s.user.email);
            format!(
                "<img src=\"{}\" alt=\"avatar\" width=\"32\"> <span>{}</span> \
                 <form method=\"post\" action=\"/api/auth/logout\"><button>Log out</button></form>",
                escape(avatar),
                escape(name)
            )
        }
        None => "<a href=\"/auth/sign-in\">Sign In</a>".to_string(),
    };
    layout(
        "Auth Starter",
        &format!("<header>{nav}</header><main><h1>Auth Starter</h1></main>"),
    )
}

#[derive(Debug, Deserialize)]
pub struct SignInParams {
    error: Option<String>,
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

pub async fn sign_in(
    State(state): State<AppState>,
    Query(params): Query<SignInParams>,
) -> Html<String> {
    let error = params
        .error
        .map(|e| format!("<p role=\"alert\">{}</p>", escape(&e)))
        .unwrap_or_default();
    let callback = safe_callback_url(params.callback_url.as_deref());
    let providers: String = state
        .oauth
        .enabled()
        .into_iter()
        .map(|p| provider_link(p, &callback))
        .collect();
    layout(
        "Sign in",
        &format!(
            "<h1>Sign in</h1>{error}\
             <form method=\"post\" action=\"/api/auth/login\">\
             <input name=\"callbackUrl\" type=\"hidden\" value=\"{}\">\
             <input name=\"email\" type=\"email\" required>\
             <input name=\"password\" type=\"password\" required>\
             <button>Sign in</button></form>{providers}\
             <a href=\"/auth/sign-up\">Create an account</a>",
            escape(&callback)
        ),
    )
}

fn provider_link(provider: Provider, callback: &str) -> String {
    let label = match provider {
        Provider::Google => "Google",
        Provider::GitHub => "GitHub",
        Provider::Credentials => "Credentials",
    };
    let callback: String = url::form_urlencoded::byte_serialize(callback.as_bytes()).collect();
    format!("<a href=\"/api/auth/signin/{provider}?callbackUrl={callback}\">Continue with {label}</a>")
}

pub async fn sign_up() -> Html<String> {
    layout(
        "Sign up",
        "<h1>Sign up</h1>\
         <form method=\"post\" action=\"/api/auth/register\">\
         <input name=\"name\" required>\
         <input name=\"email\" type=\"email\" required>\
         <input name=\"password\" type=\"password\" minlength=\"8\" required>\
         <button>Create account</button></form>\
         <a href=\"/auth/sign-in\">Already have an account?</a>",
    )
}

pub async fn protected(CurrentUser(session): CurrentUser, OriginalUri(uri): OriginalUri) -> Html<String> {
    let title = uri.path().trim_start_matches('/');
    layout(
        title,
        &format!(
            "<h1>{}</h1><p>Signed in as {}</p>",
            escape(title),
            escape(&session.user.email)
        ),
    )
}
