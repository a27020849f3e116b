use serde::Deserialize;

/// Client credentials for one OAuth provider.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
    pub url: String,
    pub session_max_age_days: i64,
    pub secure_cookies: bool,
    pub google: Option<OAuthClientConfig>,
    pub github: Option<OAuthClientConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let url = std::env::var("AUTH_URL").unwrap_or_else(|_| "http://localhost:8080".into());
        let secure_cookies = std::env::var("AUTH_SECURE_COOKIES")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or_else(|| url.starts_with("https://"));
        let auth = AuthConfig {
            secret: std::env::var("AUTH_SECRET")?,
            session_max_age_days: std::env::var("AUTH_SESSION_MAX_AGE_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(30),
            secure_cookies,
            google: oauth_client_from_env("GOOGLE"),
            github: oauth_client_from_env("GITHUB"),
            url,
        };
        Ok(Self { database_url, auth })
    }
}

/// A provider is enabled only when both `<PREFIX>_CLIENT_ID` and
/// `<PREFIX>_CLIENT_SECRET` are set.
fn oauth_client_from_env(prefix: &str) -> Option<OAuthClientConfig> {
    let client_id = std::env::var(format!("{prefix}_CLIENT_ID")).ok()?;
    let client_secret = std::env::var(format!("{prefix}_CLIENT_SECRET")).ok()?;
    if client_id.is_empty() || client_secret.is_empty() {
        return None;
    }
    Some(OAuthClientConfig {
        client_id,
        client_secret,
    })
}
