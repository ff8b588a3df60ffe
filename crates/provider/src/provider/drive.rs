//! Google Drive provider.
//!
//! Talks to the Drive v3 REST API with a bearer access token. The provider
//! itself never refreshes tokens: a rejected token surfaces as
//! [`Unauthorized`](ErrorKind::Unauthorized) and whoever handed out the
//! provider decides what to do about it. [`refresh_access_token()`] is the
//! OAuth exchange for that.

use crate::error::{ErrorKind, Result};
use crate::models::{Quota, RemoteObject};
use crate::name::validate as validate_object_name;
use crate::provider::{ByteStream, RemoteProvider};
use async_trait::async_trait;
use bytes::Bytes;
use exn::{OptionExt, ResultExt};
use futures::TryStreamExt;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Drive accounts without a storage limit (some Workspace plans) don't report
/// one. Treat them as having all the room in the world.
const UNLIMITED: u64 = u64::MAX;

#[derive(Debug, Deserialize)]
struct AboutResponse {
    #[serde(rename = "storageQuota")]
    storage_quota: StorageQuota,
}

/// The API encodes int64 values as JSON strings.
#[derive(Debug, Deserialize)]
struct StorageQuota {
    limit: Option<String>,
    usage: Option<String>,
}

#[derive(Debug, Serialize)]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<[&'a str; 1]>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// A freshly issued access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Seconds until the token expires, if the server said.
    pub expires_in: Option<u64>,
}

/// Google Drive provider.
///
/// # Examples
///
/// ```no_run
/// use colossus_provider::provider::DriveProvider;
///
/// let provider = DriveProvider::new(reqwest::Client::new(), "alice@example.com", "ya29.a0...", None);
/// ```
#[derive(Clone)]
pub struct DriveProvider {
    name: String,
    client: Client,
    access_token: String,
    /// Folder new objects are created in; Drive root when absent.
    folder: Option<String>,
    api_base: String,
    upload_base: String,
}

impl DriveProvider {
    pub fn new(client: Client, name: impl Into<String>, access_token: impl Into<String>, folder: Option<String>) -> Self {
        Self {
            name: name.into(),
            client,
            access_token: access_token.into(),
            folder,
            api_base: API_BASE.to_string(),
            upload_base: UPLOAD_BASE.to_string(),
        }
    }

    /// Point the provider at different API endpoints (a proxy, a test double).
    pub fn with_endpoints(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    fn file_url(&self, remote_id: &str) -> String {
        format!("{}/files/{}", self.api_base, remote_id)
    }

    async fn send(request: reqwest::RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(network_error)?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        exn::bail!(classify(status, &body))
    }
}

fn network_error(e: reqwest::Error) -> ErrorKind {
    ErrorKind::Network(e.to_string())
}

/// Map a failed Drive API response onto an error kind.
fn classify(status: StatusCode, body: &str) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED => ErrorKind::Unauthorized,
        StatusCode::NOT_FOUND => ErrorKind::NotFound(body.to_string()),
        StatusCode::FORBIDDEN if body.contains("storageQuotaExceeded") => {
            ErrorKind::StorageFull { requested: 0, free: 0 }
        },
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::Network(format!("{status}: {body}")),
        s if s.is_server_error() => ErrorKind::Network(format!("{status}: {body}")),
        _ => ErrorKind::Provider(format!("{status}: {body}")),
    }
}

fn parse_int(value: Option<&str>, field: &str) -> Result<Option<u64>> {
    value
        .map(|v| v.parse::<u64>().or_raise(|| ErrorKind::Provider(format!("malformed {field}: {v:?}"))))
        .transpose()
}

fn parse_quota(about: AboutResponse) -> Result<Quota> {
    let limit = parse_int(about.storage_quota.limit.as_deref(), "storage limit")?;
    let usage = parse_int(about.storage_quota.usage.as_deref(), "storage usage")?;
    Ok(Quota::new(limit.unwrap_or(UNLIMITED), usage.unwrap_or(0)))
}

#[async_trait]
impl RemoteProvider for DriveProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quota(&self) -> Result<Quota> {
        let request = self
            .client
            .get(format!("{}/about", self.api_base))
            .query(&[("fields", "storageQuota")])
            .bearer_auth(&self.access_token);
        let about: AboutResponse = Self::send(request).await?.json().await.map_err(network_error)?;
        parse_quota(about)
    }

    /// Uses a resumable upload session so the object body is sent as-is
    /// instead of being copied into a multipart envelope.
    async fn create(&self, name: &str, mime_type: &str, data: Bytes) -> Result<RemoteObject> {
        let name = validate_object_name(name)?;
        let requested = data.len() as u64;
        let metadata = FileMetadata {
            name,
            mime_type,
            parents: self.folder.as_deref().map(|folder| [folder]),
        };
        let session = self
            .client
            .post(format!("{}/files", self.upload_base))
            .query(&[("uploadType", "resumable"), ("fields", "id,size")])
            .bearer_auth(&self.access_token)
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", requested)
            .json(&metadata);
        let session = Self::send(session).await?;
        let location = session
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_raise(|| ErrorKind::Provider("upload session has no location".to_string()))?
            .to_string();
        let upload = self
            .client
            .put(location)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, mime_type)
            .body(data);
        let created: CreatedFile = Self::send(upload).await?.json().await.map_err(network_error)?;
        let size = parse_int(created.size.as_deref(), "file size")?.unwrap_or(requested);
        tracing::debug!(provider = %self.name, remote_id = %created.id, bytes = size, "Uploaded object to Drive");
        Ok(RemoteObject::new(created.id, size))
    }

    async fn reader(&self, remote_id: &str) -> Result<ByteStream> {
        let request = self
            .client
            .get(self.file_url(remote_id))
            .query(&[("alt", "media")])
            .bearer_auth(&self.access_token);
        let response = Self::send(request).await.map_err(|e| match &*e {
            ErrorKind::NotFound(_) => exn::Exn::from(ErrorKind::NotFound(remote_id.to_string())),
            _ => e,
        })?;
        Ok(Box::pin(response.bytes_stream().map_err(|e| exn::Exn::from(network_error(e)))))
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        let request = self.client.delete(self.file_url(remote_id)).bearer_auth(&self.access_token);
        Self::send(request).await.map_err(|e| match &*e {
            ErrorKind::NotFound(_) => exn::Exn::from(ErrorKind::NotFound(remote_id.to_string())),
            _ => e,
        })?;
        Ok(())
    }
}

/// Exchange a refresh token for a new access token.
///
/// A revoked or expired refresh token (`invalid_grant`) is reported as
/// [`Unauthorized`](ErrorKind::Unauthorized): only reconnecting the account
/// fixes that.
pub async fn refresh_access_token(
    client: &Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenGrant> {
    let response = client
        .post(token_url)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .map_err(network_error)?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        exn::bail!(classify_refresh(status, &body));
    }
    let token: TokenResponse = response.json().await.map_err(network_error)?;
    Ok(TokenGrant {
        access_token: token.access_token,
        expires_in: token.expires_in,
    })
}

fn classify_refresh(status: StatusCode, body: &str) -> ErrorKind {
    if body.contains("invalid_grant") || status == StatusCode::UNAUTHORIZED {
        return ErrorKind::Unauthorized;
    }
    classify(status, body)
}
