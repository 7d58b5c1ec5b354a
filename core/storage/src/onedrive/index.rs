//! Caller-facing facade: fresh credential first, then the drive call.

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;

use oneindex_common::{DriveContext, Result};

use super::auth::{AuthManager, Credential, TokenManager};
use super::client::{ApiResponse, GraphClient, ListOptions};
use super::config::GraphConfig;
use super::store::CredentialStore;
use super::transport::Transport;

/// A drive exposed as a file index.
///
/// Every operation obtains a valid credential from the token manager
/// (refreshing and persisting it when expired) before calling Graph.
pub struct DriveIndex {
    tokens: TokenManager,
    client: GraphClient,
    context: DriveContext,
}

impl DriveIndex {
    /// Build an index over `store`, sharing one connection pool between the
    /// token endpoint and Graph.
    ///
    /// # Errors
    /// - HTTP client construction failure
    pub fn new(
        config: GraphConfig,
        store: Arc<dyn CredentialStore>,
        context: DriveContext,
    ) -> Result<Self> {
        let transport = Transport::new(&config)?;
        let auth_manager = AuthManager::new(transport.clone(), config.clone());

        Ok(Self {
            tokens: TokenManager::new(auth_manager, store),
            client: GraphClient::new(transport, config),
            context,
        })
    }

    pub fn context(&self) -> &DriveContext {
        &self.context
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Consent URL for the stored application registration.
    pub async fn authorize_url(&self, state: &str) -> Result<String> {
        let credential = self.tokens.store().read().await?;
        self.tokens.auth_manager().authorize_url(&credential, state)
    }

    /// Whether the stored access token is expired right now.
    pub async fn is_expired(&self) -> Result<bool> {
        let credential = self.tokens.store().read().await?;
        Ok(credential.is_expired(Utc::now().timestamp()))
    }

    /// Redeem a consent code and persist the resulting tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<Credential> {
        let store = self.tokens.store();
        let mut credential = store.read().await?;
        let update = self
            .tokens
            .auth_manager()
            .exchange_code(&credential, code)
            .await?;
        store.write(&update).await?;
        credential.apply(&update);
        Ok(credential)
    }

    /// Force a token refresh.
    pub async fn refresh(&self) -> Result<Credential> {
        self.tokens.refresh_now().await
    }

    pub async fn list(&self, options: &ListOptions) -> Result<ApiResponse> {
        let credential = self.tokens.valid_credential().await?;
        self.client.list(&credential, &self.context, options).await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        let credential = self.tokens.valid_credential().await?;
        self.client.get(&credential, &self.context, path).await
    }

    pub async fn download_url(&self, path: &str) -> Result<Option<String>> {
        let credential = self.tokens.valid_credential().await?;
        self.client
            .download_url(&credential, &self.context, path)
            .await
    }

    pub async fn upload(&self, name: &str, data: impl Into<Bytes>) -> Result<ApiResponse> {
        let credential = self.tokens.valid_credential().await?;
        self.client
            .upload(&credential, &self.context, name, data)
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        let credential = self.tokens.valid_credential().await?;
        self.client.delete(&credential, &self.context, path).await
    }

    pub async fn rename(&self, path: &str, new_name: &str) -> Result<ApiResponse> {
        let credential = self.tokens.valid_credential().await?;
        self.client
            .rename(&credential, &self.context, path, new_name)
            .await
    }

    pub async fn create_folder(&self, parent: &str, name: &str) -> Result<ApiResponse> {
        let credential = self.tokens.valid_credential().await?;
        self.client
            .create_folder(&credential, &self.context, parent, name)
            .await
    }

    pub async fn drive_info(&self) -> Result<ApiResponse> {
        let credential = self.tokens.valid_credential().await?;
        self.client.drive_info(&credential).await
    }

    pub async fn site_drive_info(&self, site_id: &str) -> Result<ApiResponse> {
        let credential = self.tokens.valid_credential().await?;
        self.client.site_drive_info(&credential, site_id).await
    }

    pub async fn site_list(&self) -> Result<ApiResponse> {
        let credential = self.tokens.valid_credential().await?;
        self.client.site_list(&credential).await
    }

    pub async fn user_info(&self) -> Result<ApiResponse> {
        let credential = self.tokens.valid_credential().await?;
        self.client.user_info(&credential).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onedrive::store::MemoryCredentialStore;
    use oneindex_common::Error;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> GraphConfig {
        GraphConfig {
            api_base: format!("{}/v1.0/", server.uri()),
            login_base: server.uri(),
            ..GraphConfig::default()
        }
    }

    fn expired_credential() -> Credential {
        let mut cred = Credential::new("id", "secret", "refresh", "http://localhost/cb");
        cred.access_token = Some("stale".to_string());
        cred.expires_at = 0;
        cred
    }

    #[tokio::test]
    async fn test_refreshes_before_drive_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "fresh"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/sites/s1/drive/root/children"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .expect(2)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentialStore::new(expired_credential()));
        let index = DriveIndex::new(config_for(&server), store, DriveContext::site("s1")).unwrap();

        index.list(&ListOptions::default()).await.unwrap();
        index.list(&ListOptions::default()).await.unwrap();
        assert!(!index.is_expired().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_refresh_aborts_drive_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentialStore::new(expired_credential()));
        let index = DriveIndex::new(config_for(&server), store, DriveContext::me()).unwrap();

        let err = index.user_info().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert!(index.is_expired().await.unwrap());
    }

    #[tokio::test]
    async fn test_exchange_code_persists_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "first",
                "refresh_token": "rotated"
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentialStore::new(expired_credential()));
        let index =
            DriveIndex::new(config_for(&server), store.clone(), DriveContext::me()).unwrap();

        index.exchange_code("code-1").await.unwrap();
        let stored = store.read().await.unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("first"));
        assert_eq!(stored.refresh_token, "rotated");
    }

    #[tokio::test]
    async fn test_authorize_url_from_store() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryCredentialStore::new(expired_credential()));
        let index = DriveIndex::new(config_for(&server), store, DriveContext::me()).unwrap();

        let url = index.authorize_url("xyz").await.unwrap();
        assert!(url.starts_with(&format!("{}/common/oauth2/v2.0/authorize", server.uri())));
        assert!(url.contains("state=xyz"));
        assert!(!url.contains("secret"));
    }
}
