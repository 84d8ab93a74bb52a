//! OAuth2 consent flow producing short-lived Drive tokens.
//!
//! Every call to [`TokenProvider::acquire_token`] runs one complete consent
//! round-trip through a [`ConsentSession`]. Tokens are never cached,
//! refreshed or stored.

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RequestTokenError, Scope, TokenResponse,
    TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::{Host, Url};

use accredify_common::{AuthorizationToken, Error, Result};

use super::callback::{CallbackListener, CallbackOutcome};

/// OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Redirect URL for the loopback listener.
const REDIRECT_URL: &str = "http://localhost:8080/callback";

/// Scope limited to files this application creates or is handed.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
/// Read-only metadata scope, enough to browse the operator's own folders.
pub const DRIVE_BROWSE_SCOPE: &str = "https://www.googleapis.com/auth/drive.metadata.readonly";
/// Full Drive scope, needed to write into folders this application did not create.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Source of bearer tokens for provider calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a fresh token for `scope`.
    ///
    /// # Errors
    /// - `AuthDenied` if the operator cancels or consent is refused
    /// - `AuthUnavailable` if the identity service cannot be reached
    async fn acquire_token(&self, scope: &str) -> Result<AuthorizationToken>;
}

/// Configuration for OAuth2 authentication.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    /// How long to wait for the operator to finish consent.
    #[serde(default = "default_consent_timeout_secs")]
    pub consent_timeout_secs: u64,
}

fn default_auth_url() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

fn default_redirect_url() -> String {
    REDIRECT_URL.to_string()
}

fn default_consent_timeout_secs() -> u64 {
    300
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("redirect_url", &self.redirect_url)
            .field("consent_timeout_secs", &self.consent_timeout_secs)
            .finish()
    }
}

impl AuthConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            redirect_url: default_redirect_url(),
            consent_timeout_secs: default_consent_timeout_secs(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `GOOGLE_DRIVE_CLIENT_ID` (required)
    /// - `GOOGLE_DRIVE_CLIENT_SECRET` (required)
    /// - `GOOGLE_DRIVE_REDIRECT_URL` (default: `http://localhost:8080/callback`)
    /// - `GOOGLE_DRIVE_CONSENT_TIMEOUT_SECS` (default: 300)
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GOOGLE_DRIVE_CLIENT_ID")
            .map_err(|_| Error::Config("GOOGLE_DRIVE_CLIENT_ID is not set".to_string()))?;
        let client_secret = std::env::var("GOOGLE_DRIVE_CLIENT_SECRET")
            .map_err(|_| Error::Config("GOOGLE_DRIVE_CLIENT_SECRET is not set".to_string()))?;

        let mut config = Self::new(client_id, client_secret);
        if let Ok(redirect) = std::env::var("GOOGLE_DRIVE_REDIRECT_URL") {
            config.redirect_url = redirect;
        }
        if let Some(secs) = std::env::var("GOOGLE_DRIVE_CONSENT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.consent_timeout_secs = secs;
        }
        Ok(config)
    }
}

/// Warning for redirect URIs on a raw, non-loopback IP address.
///
/// Google refuses such redirect URIs, so consent fails when the app is
/// reached by address instead of a registered domain. This is a deployment
/// issue to surface to the operator, not an error.
pub fn redirect_host_warning(redirect_url: &str) -> Option<String> {
    let url = Url::parse(redirect_url).ok()?;
    let ip = match url.host()? {
        Host::Ipv4(ip) => IpAddr::V4(ip),
        Host::Ipv6(ip) => IpAddr::V6(ip),
        Host::Domain(_) => return None,
    };
    if ip.is_loopback() {
        return None;
    }
    Some(format!(
        "Redirect URI {} uses a raw IP address; Google sign-in only accepts \
         registered domain names, so consent will fail. Reach the app through its domain.",
        redirect_url
    ))
}

type ConsentClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// One authorization round-trip: the URL to visit and the secrets needed to
/// finish it. Dropped when the round-trip ends.
pub struct ConsentSession {
    client: ConsentClient,
    authorize_url: Url,
    csrf: CsrfToken,
    verifier: PkceCodeVerifier,
}

impl ConsentSession {
    /// Prepare an authorization request for `scope` redirecting to `redirect_url`.
    ///
    /// `scope` may hold several space-separated scopes.
    ///
    /// # Errors
    /// - `AuthUnavailable` if the client id is missing or an endpoint URL is invalid
    pub fn new(config: &AuthConfig, redirect_url: &Url, scope: &str) -> Result<Self> {
        if config.client_id.trim().is_empty() {
            return Err(Error::AuthUnavailable(
                "OAuth client id is not configured".to_string(),
            ));
        }

        let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(
                AuthUrl::new(config.auth_url.clone())
                    .map_err(|e| Error::AuthUnavailable(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_url.clone())
                    .map_err(|e| Error::AuthUnavailable(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_url.to_string())
                    .map_err(|e| Error::AuthUnavailable(format!("Invalid redirect URL: {}", e)))?,
            );
        if !config.client_secret.is_empty() {
            client = client.set_client_secret(ClientSecret::new(config.client_secret.clone()));
        }

        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (authorize_url, csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scope.split_whitespace().map(|s| Scope::new(s.to_string())))
            .set_pkce_challenge(challenge)
            .url();

        Ok(Self {
            client,
            authorize_url,
            csrf,
            verifier,
        })
    }

    /// URL the operator visits to grant consent.
    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    /// Expected `state` value on the callback.
    pub fn state(&self) -> &str {
        self.csrf.secret()
    }

    /// Finish the round-trip with the callback the listener received.
    ///
    /// # Errors
    /// - `AuthDenied` if consent was refused, the state does not match, or
    ///   the token endpoint rejects the code
    /// - `AuthUnavailable` if the token endpoint cannot be reached
    pub async fn complete(self, outcome: CallbackOutcome) -> Result<AuthorizationToken> {
        let code = match outcome {
            CallbackOutcome::Denied { error, description } => {
                let detail = match description {
                    Some(d) => format!("{} ({})", error, d),
                    None => error,
                };
                return Err(Error::AuthDenied(detail));
            }
            CallbackOutcome::Code { code, state } => {
                if state != *self.csrf.secret() {
                    return Err(Error::AuthDenied(
                        "Callback state does not match the request".to_string(),
                    ));
                }
                code
            }
        };

        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::AuthUnavailable(format!("Failed to create HTTP client: {}", e)))?;

        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(self.verifier)
            .request_async(&http)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(resp) => {
                    Error::AuthDenied(format!("Token exchange rejected: {}", resp))
                }
                other => Error::AuthUnavailable(format!("Token exchange failed: {}", other)),
            })?;

        Ok(AuthorizationToken::new(
            response.access_token().secret().clone(),
        ))
    }
}

/// Opens the consent URL for the operator.
pub type ConsentLauncher = Arc<dyn Fn(&Url) -> std::io::Result<()> + Send + Sync>;

/// Interactive consent through the system browser and a loopback redirect.
pub struct OAuthTokenProvider {
    config: AuthConfig,
    launcher: ConsentLauncher,
    cancel: CancellationToken,
}

impl OAuthTokenProvider {
    pub fn new(config: AuthConfig) -> Self {
        if let Some(warning) = redirect_host_warning(&config.redirect_url) {
            warn!("{}", warning);
        }

        Self {
            config,
            launcher: Arc::new(|url: &Url| open::that(url.as_str())),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace how the consent URL is presented.
    pub fn with_launcher(mut self, launcher: ConsentLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Token that aborts any pending consent when cancelled.
    ///
    /// Cancellation is permanent for this provider.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn acquire_token(&self, scope: &str) -> Result<AuthorizationToken> {
        if self.cancel.is_cancelled() {
            return Err(Error::AuthDenied("Consent cancelled".to_string()));
        }

        let redirect = Url::parse(&self.config.redirect_url)
            .map_err(|e| Error::AuthUnavailable(format!("Invalid redirect URL: {}", e)))?;
        let listener = CallbackListener::bind(&redirect).await?;
        let session = ConsentSession::new(&self.config, listener.redirect_url(), scope)?;

        info!("Waiting for consent at {}", session.authorize_url());
        if let Err(e) = (self.launcher)(session.authorize_url()) {
            warn!("Could not open a browser ({}); visit the URL above manually", e);
        }

        let timeout = Duration::from_secs(self.config.consent_timeout_secs);
        let outcome = tokio::select! {
            outcome = listener.wait() => outcome?,
            _ = self.cancel.cancelled() => {
                return Err(Error::AuthDenied("Consent cancelled".to_string()));
            }
            _ = tokio::time::sleep(timeout) => {
                return Err(Error::AuthDenied(format!(
                    "Consent not completed within {} seconds",
                    timeout.as_secs()
                )));
            }
        };

        debug!("Consent callback received");
        session.complete(outcome).await
    }
}
