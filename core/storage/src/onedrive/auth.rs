//! OAuth2 credential handling for Microsoft Graph.

use chrono::{DateTime, Utc};
use oauth2::{basic::BasicClient, AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use oneindex_common::{Error, Result};

use super::config::GraphConfig;
use super::store::CredentialStore;
use super::transport::{Body, HttpRequest, Transport};

/// Lifetime assigned to a freshly issued access token.
///
/// Kept below the provider's 3600 second lifetime so a token never expires
/// while a request using it is in flight.
pub const TOKEN_LIFETIME_SECS: i64 = 3500;
/// Tenant used when the credential does not name one.
pub const DEFAULT_TENANT: &str = "common";
/// Scopes requested when the credential does not name any.
pub const DEFAULT_SCOPE: &str = "offline_access User.Read Sites.ReadWrite.All";

fn default_tenant() -> String {
    DEFAULT_TENANT.to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

/// Application registration plus the current token pair.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub client_id: String,
    pub client_secret: String,
    /// Absent or stale until the first successful refresh.
    #[serde(default)]
    pub access_token: Option<String>,
    pub refresh_token: String,
    /// Unix seconds after which `access_token` must not be used.
    #[serde(default, alias = "expires_time")]
    pub expires_at: i64,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    pub redirect_uri: String,
    /// Site whose drive is served when the caller gives no other context.
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Create a credential that has not been refreshed yet.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            access_token: None,
            refresh_token: refresh_token.into(),
            expires_at: 0,
            scope: default_scope(),
            tenant_id: default_tenant(),
            redirect_uri: redirect_uri.into(),
            site_id: None,
            updated_at: None,
        }
    }

    /// Check whether the access token is expired at `now` (unix seconds).
    pub fn is_expired(&self, now: i64) -> bool {
        is_expired(self, now)
    }

    /// Whether a refresh is required before the credential can be used.
    pub fn needs_refresh(&self, now: i64) -> bool {
        self.access_token.is_none() || self.is_expired(now)
    }

    /// Bearer token for an API call.
    pub fn bearer(&self) -> Result<&str> {
        self.access_token.as_deref().ok_or_else(|| {
            Error::Authentication("Credential has no access token; refresh first".to_string())
        })
    }

    /// Merge a refresh result, keeping the refresh token when none was issued.
    pub fn apply(&mut self, update: &CredentialUpdate) {
        self.access_token = Some(update.access_token.clone());
        if let Some(refresh_token) = &update.refresh_token {
            self.refresh_token = refresh_token.clone();
        }
        self.expires_at = update.expires_at;
        self.updated_at = Some(update.updated_at);
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("tenant_id", &self.tenant_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("site_id", &self.site_id)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Fields written back to the credential store after a token exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialUpdate {
    pub access_token: String,
    /// `None` when the provider did not rotate the refresh token.
    pub refresh_token: Option<String>,
    pub expires_at: i64,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for CredentialUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialUpdate")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// `now >= expires_at`; the boundary counts as expired.
pub fn is_expired(credential: &Credential, now: i64) -> bool {
    now >= credential.expires_at
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Talks to the Microsoft identity platform.
#[derive(Clone)]
pub struct AuthManager {
    transport: Transport,
    config: GraphConfig,
}

impl AuthManager {
    /// Create a new authentication manager.
    pub fn new(transport: Transport, config: GraphConfig) -> Self {
        Self { transport, config }
    }

    fn endpoint(&self, tenant_id: &str, action: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/{}",
            self.config.login_base.trim_end_matches('/'),
            tenant_id,
            action
        )
    }

    /// Build the consent URL the user is redirected to.
    ///
    /// The client secret is never part of the URL.
    pub fn authorize_url(&self, credential: &Credential, state: &str) -> Result<String> {
        let auth_url = AuthUrl::new(self.endpoint(&credential.tenant_id, "authorize"))
            .map_err(|e| Error::InvalidInput(format!("Invalid auth URL: {}", e)))?;
        let redirect_url = RedirectUrl::new(credential.redirect_uri.clone())
            .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?;

        let client = BasicClient::new(ClientId::new(credential.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_redirect_uri(redirect_url);

        let state = state.to_string();
        let (url, _) = client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(
                credential
                    .scope
                    .split_whitespace()
                    .map(|s| Scope::new(s.to_string())),
            )
            .add_extra_param("prompt", "consent")
            .url();

        Ok(url.to_string())
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// # Errors
    /// - `Authentication` if the refresh token is empty or the response
    ///   carries no access token
    /// - `RemoteApi` on a non-success status from the token endpoint
    pub async fn refresh(&self, credential: &Credential) -> Result<CredentialUpdate> {
        if credential.refresh_token.is_empty() {
            return Err(Error::Authentication(
                "Credential has no refresh token".to_string(),
            ));
        }

        let mut fields = self.base_params(credential);
        fields.push(("grant_type".to_string(), "refresh_token".to_string()));
        fields.push(("refresh_token".to_string(), credential.refresh_token.clone()));

        self.token_request(&credential.tenant_id, fields).await
    }

    /// Redeem the authorization code returned by the consent redirect.
    pub async fn exchange_code(
        &self,
        credential: &Credential,
        code: &str,
    ) -> Result<CredentialUpdate> {
        let mut fields = self.base_params(credential);
        fields.push(("grant_type".to_string(), "authorization_code".to_string()));
        fields.push(("code".to_string(), code.to_string()));

        self.token_request(&credential.tenant_id, fields).await
    }

    fn base_params(&self, credential: &Credential) -> Vec<(String, String)> {
        vec![
            ("client_id".to_string(), credential.client_id.clone()),
            ("client_secret".to_string(), credential.client_secret.clone()),
            ("redirect_uri".to_string(), credential.redirect_uri.clone()),
            ("scope".to_string(), credential.scope.clone()),
        ]
    }

    async fn token_request(
        &self,
        tenant_id: &str,
        fields: Vec<(String, String)>,
    ) -> Result<CredentialUpdate> {
        let url = self.endpoint(tenant_id, "token");
        let mut request = HttpRequest::new(url.clone(), self.config.timeouts.default_timeout());
        request.body = Body::Form(fields);

        let response = self.transport.fetch(request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| super::transport::classify(&url, e))?;
        let token: TokenResponse = serde_json::from_slice(&body)?;

        let access_token = token.access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            Error::Authentication("Token endpoint returned no access token".to_string())
        })?;

        let now = Utc::now();
        debug!(rotated = token.refresh_token.is_some(), "Token exchange succeeded");

        Ok(CredentialUpdate {
            access_token,
            refresh_token: token.refresh_token,
            expires_at: now.timestamp() + TOKEN_LIFETIME_SECS,
            updated_at: now,
        })
    }
}

/// Keeps the stored credential fresh.
///
/// Concurrent callers that find an expired token are funnelled through one
/// refresh; the others reuse its result.
pub struct TokenManager {
    auth_manager: AuthManager,
    store: Arc<dyn CredentialStore>,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    /// Create a new token manager backed by `store`.
    pub fn new(auth_manager: AuthManager, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            auth_manager,
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn auth_manager(&self) -> &AuthManager {
        &self.auth_manager
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Get a credential with a usable access token, refreshing if necessary.
    ///
    /// # Errors
    /// - Store read/write failures
    /// - Refresh failures; nothing is written in that case
    pub async fn valid_credential(&self) -> Result<Credential> {
        let credential = self.store.read().await?;
        if !credential.needs_refresh(Utc::now().timestamp()) {
            return Ok(credential);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        let credential = self.store.read().await?;
        if !credential.needs_refresh(Utc::now().timestamp()) {
            return Ok(credential);
        }

        info!("Refreshing expired access token");
        self.refresh_locked(credential).await
    }

    /// Refresh unconditionally and persist the result.
    pub async fn refresh_now(&self) -> Result<Credential> {
        let _guard = self.refresh_lock.lock().await;
        let credential = self.store.read().await?;
        info!("Refreshing access token");
        self.refresh_locked(credential).await
    }

    async fn refresh_locked(&self, mut credential: Credential) -> Result<Credential> {
        let update = self.auth_manager.refresh(&credential).await?;
        self.store.write(&update).await?;
        credential.apply(&update);
        Ok(credential)
    }
}
