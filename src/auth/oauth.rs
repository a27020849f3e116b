//! # OAuth sign-in (Google, GitHub)
//!
//! Authorization Code flow with PKCE, driven by the `oauth2` crate.
//!
//! 1. [`OAuthClient::authorization_url`] builds the provider URL and returns
//!    the CSRF state and PKCE verifier, which the handler persists for ten
//!    minutes through the store.
//! 2. [`OAuthClient::fetch_profile`] exchanges the code for an access token
//!    and normalizes the provider's user info into an [`OAuthProfile`].
//!    GitHub may hide the email on `/user`; the primary verified address
//!    from `/user/emails` is used instead.
//! 3. [`link_profile`] maps the profile to a local user, creating and
//!    linking one on first sign-in.

use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{info, instrument};

use super::provider::Provider;
use crate::config::{AuthConfig, OAuthClientConfig};
use crate::db::{NewAccount, NewUser, User};
use crate::error::AuthError;
use crate::store::{AuthStore, StoreError};

const USER_AGENT: &str = "authstarter";

/// Normalized identity returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider_account_id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

impl From<GoogleUser> for OAuthProfile {
    fn from(u: GoogleUser) -> Self {
        Self {
            provider_account_id: u.id,
            email: u.email.to_lowercase(),
            name: u.name,
            image: u.picture,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl GitHubUser {
    fn into_profile(self, email: String) -> OAuthProfile {
        OAuthProfile {
            provider_account_id: self.id.to_string(),
            email: email.to_lowercase(),
            name: self.name.or(Some(self.login)),
            image: self.avatar_url,
        }
    }
}

fn primary_verified_email(emails: Vec<GitHubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email)
}

type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

pub struct OAuthClient {
    provider: Provider,
    client: ConfiguredClient,
    http: reqwest::Client,
}

/// Result of starting a sign-in: where to send the browser, plus the values
/// to keep until the callback.
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

impl OAuthClient {
    fn new(provider: Provider, creds: &OAuthClientConfig, base_url: &str) -> anyhow::Result<Self> {
        let (auth_url, token_url) = match provider {
            Provider::Google => (
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
            ),
            Provider::GitHub => (
                "https://github.com/login/oauth/authorize",
                "https://github.com/login/oauth/access_token",
            ),
            Provider::Credentials => anyhow::bail!("credentials is not an OAuth provider"),
        };
        let redirect = format!(
            "{}/api/auth/callback/{}",
            base_url.trim_end_matches('/'),
            provider
        );

        let client = BasicClient::new(ClientId::new(creds.client_id.clone()))
            .set_client_secret(ClientSecret::new(creds.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(auth_url.to_string())?)
            .set_token_uri(TokenUrl::new(token_url.to_string())?)
            .set_redirect_uri(RedirectUrl::new(redirect)?);

        // The token endpoint must not be followed through redirects.
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            provider,
            client,
            http,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn scopes(&self) -> &'static [&'static str] {
        match self.provider {
            Provider::Google => &["openid", "email", "profile"],
            Provider::GitHub => &["read:user", "user:email"],
            Provider::Credentials => &[],
        }
    }

    pub fn authorization_url(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let mut request = self.client.authorize_url(CsrfToken::new_random);
        for scope in self.scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (url, csrf_state) = request.set_pkce_challenge(pkce_challenge).url();

        AuthorizationRequest {
            url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    #[instrument(skip_all, fields(provider = %self.provider))]
    pub async fn fetch_profile(
        &self,
        code: &str,
        pkce_verifier: String,
    ) -> Result<OAuthProfile, AuthError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::OAuth(format!("token exchange failed: {e}")))?;
        let access_token = token.access_token().secret();

        match self.provider {
            Provider::Google => {
                let user: GoogleUser =
                    self.get_json("https://www.googleapis.com/oauth2/v2/userinfo", access_token)
                        .await?;
                Ok(user.into())
            }
            Provider::GitHub => {
                let user: GitHubUser = self
                    .get_json("https://api.github.com/user", access_token)
                    .await?;
                let email = match user.email.clone() {
                    Some(email) => email,
                    None => {
                        let emails: Vec<GitHubEmail> = self
                            .get_json("https://api.github.com/user/emails", access_token)
                            .await?;
                        primary_verified_email(emails).ok_or_else(|| {
                            AuthError::OAuth("no verified primary email".into())
                        })?
                    }
                };
                Ok(user.into_profile(email))
            }
            Provider::Credentials => Err(AuthError::UnknownProvider(self.provider.to_string())),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AuthError> {
        self.http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::OAuth(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::OAuth(e.to_string()))
    }
}

/// OAuth clients for the providers that have credentials configured.
pub struct OAuthProviders {
    google: Option<OAuthClient>,
    github: Option<OAuthClient>,
}

impl OAuthProviders {
    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        let build = |provider, creds: &Option<OAuthClientConfig>| {
            creds
                .as_ref()
                .map(|c| OAuthClient::new(provider, c, &config.url))
                .transpose()
        };
        Ok(Self {
            google: build(Provider::Google, &config.google)?,
            github: build(Provider::GitHub, &config.github)?,
        })
    }

    pub fn get(&self, provider: Provider) -> Option<&OAuthClient> {
        match provider {
            Provider::Google => self.google.as_ref(),
            Provider::GitHub => self.github.as_ref(),
            Provider::Credentials => None,
        }
    }

    pub fn enabled(&self) -> Vec<Provider> {
        [Provider::Google, Provider::GitHub]
            .into_iter()
            .filter(|p| self.get(*p).is_some())
            .collect()
    }
}

/// Resolves a provider profile to a local user.
///
/// A known account signs in its user. An unknown account whose email already
/// belongs to a user is refused rather than linked silently. Otherwise a new
/// password-less user is created, the account is linked, and the email is
/// marked verified at link time.
pub async fn link_profile(
    store: &dyn AuthStore,
    provider: Provider,
    profile: OAuthProfile,
) -> Result<User, AuthError> {
    if let Some(user) = store
        .find_user_by_account(provider.as_str(), &profile.provider_account_id)
        .await?
    {
        return Ok(user);
    }

    if store.find_user_by_email(&profile.email).await?.is_some() {
        return Err(AuthError::AccountNotLinked);
    }

    let account = NewAccount {
        provider: provider.as_str().to_string(),
        provider_account_id: profile.provider_account_id.clone(),
    };
    let created = store
        .create_linked_user(
            NewUser {
                name: profile.name,
                email: profile.email,
                password_hash: None,
                image: profile.image,
            },
            account,
            OffsetDateTime::now_utc(),
        )
        .await;

    match created {
        Ok(user) => {
            info!(user_id = %user.id, %provider, "oauth account linked");
            Ok(user)
        }
        // A concurrent first sign-in may have linked the same account.
        Err(StoreError::Conflict) => store
            .find_user_by_account(provider.as_str(), &profile.provider_account_id)
            .await?
            .ok_or(AuthError::AccountNotLinked),
        Err(e) => Err(e.into()),
    }
}
