//! Microsoft Graph drive API client.

use bytes::Bytes;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use oneindex_common::{encode_segment, DriveContext, DrivePath, Error, Result};

use super::auth::Credential;
use super::config::GraphConfig;
use super::transport::{classify, Body, HttpRequest, Transport};

/// Item fields requested by default when listing.
pub const DEFAULT_FIELDS: &str = "id, name, size, folder, audio, video, photo, image, \
                                  lastModifiedDateTime, @microsoft.graph.downloadUrl";
/// Page size when listing a folder.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Page size for full-text search.
pub const SEARCH_PAGE_SIZE: u32 = 100;
/// Page size for site search.
pub const SITE_PAGE_SIZE: u32 = 30;
/// Item field holding the pre-authenticated download link.
pub const DOWNLOAD_URL_FIELD: &str = "@microsoft.graph.downloadUrl";

/// What the request primitive hands back.
#[derive(Debug, Clone)]
pub enum ApiResponse {
    /// No body to decode (204, or a body of at most one byte).
    Status(u16),
    /// Any 3xx carrying a `Location` header.
    Redirect { status: u16, headers: HeaderMap },
    /// Decoded JSON body.
    Json(Value),
}

impl ApiResponse {
    /// HTTP status, when the body was not decoded.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiResponse::Status(code) => Some(*code),
            ApiResponse::Redirect { status, .. } => Some(*status),
            ApiResponse::Json(_) => None,
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match self {
            ApiResponse::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Convert to a JSON value; markers become `{"status_code": n}`.
    pub fn into_json(self) -> Value {
        match self {
            ApiResponse::Json(value) => value,
            ApiResponse::Status(code) => json!({ "status_code": code }),
            ApiResponse::Redirect { status, headers } => {
                let headers: serde_json::Map<String, Value> = headers
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .to_str()
                            .ok()
                            .map(|v| (name.as_str().to_string(), Value::from(v)))
                    })
                    .collect();
                json!({ "status_code": status, "headers": headers })
            }
        }
    }

    /// Redirect target, if this is a redirect.
    pub fn location(&self) -> Option<&str> {
        match self {
            ApiResponse::Redirect { headers, .. } => {
                headers.get(LOCATION).and_then(|v| v.to_str().ok())
            }
            _ => None,
        }
    }
}

/// Options for a single API call.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub method: Option<Method>,
    pub query: Vec<(String, String)>,
    pub body: Body,
    /// Overrides the default timeout.
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn bytes(mut self, data: Bytes) -> Self {
        self.body = Body::Bytes(data);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Arguments for listing a folder or searching the drive.
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Folder to list; `""` or `/` is the drive root.
    pub folder: String,
    /// Full-text search; when set, `folder` is ignored.
    pub query: Option<String>,
    pub limit: u32,
    pub fields: String,
}

impl ListOptions {
    pub fn folder(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            ..Self::default()
        }
    }

    pub fn search(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = fields.into();
        self
    }

    /// Page size actually sent; zero means the default.
    pub fn effective_limit(&self) -> u32 {
        if self.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.limit
        }
    }

    /// Field selection actually sent; blank means the default.
    pub fn effective_fields(&self) -> &str {
        if self.fields.trim().is_empty() {
            DEFAULT_FIELDS
        } else {
            &self.fields
        }
    }
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            folder: "/".to_string(),
            query: None,
            limit: DEFAULT_PAGE_SIZE,
            fields: DEFAULT_FIELDS.to_string(),
        }
    }
}

/// Undo UTF-8 text that was decoded as Latin-1 somewhere upstream.
///
/// Every char must fit in one byte and those bytes must form valid UTF-8;
/// otherwise the input is already correct and is returned unchanged.
pub fn repair_latin1(text: &str) -> String {
    let bytes: Option<Vec<u8>> = text
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect();

    bytes
        .and_then(|b| String::from_utf8(b).ok())
        .unwrap_or_else(|| text.to_string())
}

/// `{root}` for the drive root, `{root}:/{path}` otherwise.
fn item_url(ctx: &DriveContext, path: &DrivePath) -> String {
    if path.is_root() {
        ctx.root_path()
    } else {
        format!("{}:/{}", ctx.root_path(), path.encoded())
    }
}

/// Children collection of a folder.
fn children_url(ctx: &DriveContext, folder: &DrivePath) -> String {
    if folder.is_root() {
        format!("{}/children", ctx.root_path())
    } else {
        format!("{}:/{}:/children", ctx.root_path(), folder.encoded())
    }
}

/// Microsoft Graph API client.
///
/// The bearer token comes from the credential passed to each call; the
/// client itself holds no auth state.
#[derive(Clone)]
pub struct GraphClient {
    transport: Transport,
    config: GraphConfig,
}

impl GraphClient {
    /// Create a new Graph client.
    pub fn new(transport: Transport, config: GraphConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Absolute URL for an API path. Absolute inputs pass through.
    pub fn build_url(&self, sub_url: &str) -> String {
        if sub_url.starts_with("http://") || sub_url.starts_with("https://") {
            return sub_url.to_string();
        }
        format!(
            "{}/{}",
            self.config.api_base.trim_end_matches('/'),
            sub_url.trim_matches('/')
        )
    }

    /// Issue one API call and shape the response.
    ///
    /// # Errors
    /// - `Authentication` if the credential has no access token
    /// - `RemoteApi` for any 4xx/5xx status
    /// - `Timeout`/`Network` for transport failures
    /// - `Serialization` if a success body is not JSON
    pub async fn api(
        &self,
        credential: &Credential,
        sub_url: &str,
        request: ApiRequest,
    ) -> Result<ApiResponse> {
        let url = self.build_url(sub_url);
        let mut http = HttpRequest::new(
            url.clone(),
            request
                .timeout
                .unwrap_or_else(|| self.config.timeouts.default_timeout()),
        );
        http.method = request.method;
        http.query = request.query;
        http.body = request.body;
        http.bearer = Some(credential.bearer()?.to_string());

        let response = self.transport.fetch(http).await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(ApiResponse::Status(status.as_u16()));
        }
        if status.is_redirection() && response.headers().contains_key(LOCATION) {
            return Ok(ApiResponse::Redirect {
                status: status.as_u16(),
                headers: response.headers().clone(),
            });
        }

        let body = response.bytes().await.map_err(|e| classify(&url, e))?;
        if body.len() > 1 {
            let value: Value = serde_json::from_slice(&body).map_err(|e| {
                Error::Serialization(format!("Invalid JSON from {}: {}", url, e))
            })?;
            return Ok(ApiResponse::Json(value));
        }

        Ok(ApiResponse::Status(status.as_u16()))
    }

    /// List a folder, or search the whole drive when a query is given.
    pub async fn list(
        &self,
        credential: &Credential,
        ctx: &DriveContext,
        options: &ListOptions,
    ) -> Result<ApiResponse> {
        let fields = options.effective_fields();

        if let Some(query) = &options.query {
            let query = repair_latin1(query).replace('\'', "''");
            let url = format!(
                "{}/search(q='{}')",
                ctx.root_path(),
                encode_segment(&query)
            );
            let request = ApiRequest::new()
                .param("$select", fields)
                .param("$top", SEARCH_PAGE_SIZE);
            return self.api(credential, &url, request).await;
        }

        let folder = DrivePath::parse(&options.folder);
        let request = ApiRequest::new()
            .param("$select", fields)
            .param("$top", options.effective_limit())
            .param("$orderby", "name desc")
            .param("$expand", "thumbnails($select=large)");
        self.api(credential, &children_url(ctx, &folder), request)
            .await
    }

    /// Fetch metadata for one item.
    pub async fn get(
        &self,
        credential: &Credential,
        ctx: &DriveContext,
        path: &str,
    ) -> Result<ApiResponse> {
        let path = DrivePath::parse(path);
        self.api(credential, &item_url(ctx, &path), ApiRequest::new())
            .await
    }

    /// Pre-authenticated download link for a file.
    pub async fn download_url(
        &self,
        credential: &Credential,
        ctx: &DriveContext,
        path: &str,
    ) -> Result<Option<String>> {
        let item = self.get(credential, ctx, path).await?;
        Ok(item
            .json()
            .and_then(|v| v.get(DOWNLOAD_URL_FIELD))
            .and_then(|v| v.as_str())
            .map(String::from))
    }

    /// Create or replace a file's content.
    pub async fn upload(
        &self,
        credential: &Credential,
        ctx: &DriveContext,
        name: &str,
        data: impl Into<Bytes>,
    ) -> Result<ApiResponse> {
        let path = DrivePath::parse(name);
        let url = format!("{}:/{}:/content", ctx.root_path(), path.encoded());
        let request = ApiRequest::new()
            .method(Method::PUT)
            .bytes(data.into())
            .timeout(self.config.timeouts.upload_timeout());
        self.api(credential, &url, request).await
    }

    /// Delete an item.
    pub async fn delete(
        &self,
        credential: &Credential,
        ctx: &DriveContext,
        path: &str,
    ) -> Result<ApiResponse> {
        let path = DrivePath::parse(path);
        let request = ApiRequest::new()
            .method(Method::DELETE)
            .timeout(self.config.timeouts.delete_timeout());
        self.api(credential, &item_url(ctx, &path), request).await
    }

    /// Rename an item in place.
    pub async fn rename(
        &self,
        credential: &Credential,
        ctx: &DriveContext,
        path: &str,
        new_name: &str,
    ) -> Result<ApiResponse> {
        let path = DrivePath::parse(path);
        let request = ApiRequest::new()
            .method(Method::PATCH)
            .json(json!({ "name": new_name }));
        self.api(credential, &item_url(ctx, &path), request).await
    }

    /// Create a folder; fails if the name is already taken.
    pub async fn create_folder(
        &self,
        credential: &Credential,
        ctx: &DriveContext,
        parent: &str,
        name: &str,
    ) -> Result<ApiResponse> {
        let parent = DrivePath::parse(parent);
        let request = ApiRequest::new().json(json!({
            "@microsoft.graph.conflictBehavior": "fail",
            "folder": { "childCount": 1 },
            "name": name,
        }));
        self.api(credential, &children_url(ctx, &parent), request)
            .await
    }

    /// Drive metadata of the signed-in account.
    pub async fn drive_info(&self, credential: &Credential) -> Result<ApiResponse> {
        self.api(credential, "/me/drive", ApiRequest::new()).await
    }

    /// Drive metadata of a site.
    pub async fn site_drive_info(
        &self,
        credential: &Credential,
        site_id: &str,
    ) -> Result<ApiResponse> {
        let url = format!("/sites/{}/drive", site_id);
        self.api(credential, &url, ApiRequest::new()).await
    }

    /// All sites visible to the account.
    pub async fn site_list(&self, credential: &Credential) -> Result<ApiResponse> {
        let request = ApiRequest::new()
            .param("search", "*")
            .param("$top", SITE_PAGE_SIZE)
            .param("$select", "*");
        self.api(credential, "/sites", request).await
    }

    /// Profile of the signed-in account.
    pub async fn user_info(&self, credential: &Credential) -> Result<ApiResponse> {
        self.api(credential, "/me", ApiRequest::new()).await
    }
}
