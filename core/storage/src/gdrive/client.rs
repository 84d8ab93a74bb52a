//! Google Drive API client.

use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use accredify_common::{AuthorizationToken, Error, FolderRef, Result, UploadedFileRef};

use super::multipart::MultipartBody;
use super::query::{self, FOLDER_MIME_TYPE};

/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Fields requested for uploaded files.
const UPLOAD_FIELDS: &str = "id,name,mimeType,webViewLink";

/// Page size for folder listings shown in the picker.
const LIST_PAGE_SIZE: &str = "200";

/// Endpoints and transport settings for the Drive API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Base URL for metadata requests.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Base URL for media uploads.
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
    /// Deadline applied to every provider request.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_base() -> String {
    DRIVE_API_BASE.to_string()
}

fn default_upload_base() -> String {
    DRIVE_UPLOAD_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("AccrediFy/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            upload_base: default_upload_base(),
            request_timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl DriveConfig {
    /// Point both API bases at one server (used against mock servers).
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: format!("{}/drive/v3", base),
            upload_base: format!("{}/upload/drive/v3", base),
            ..Self::default()
        }
    }
}

/// Drive file metadata returned by listing and create calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    trashed: bool,
}

impl DriveFile {
    fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

impl From<DriveFile> for FolderRef {
    fn from(file: DriveFile) -> Self {
        FolderRef::new(file.id, file.name)
    }
}

/// Response from listing files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewLink {
    #[serde(default)]
    web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutResponse {
    #[serde(default)]
    user: Option<AboutUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    #[serde(default)]
    email_address: Option<String>,
}

/// Google Drive API client.
///
/// Holds no credentials; every call takes the token for the current
/// operation sequence.
#[derive(Debug, Clone)]
pub struct DriveClient {
    http: Client,
    config: DriveConfig,
}

impl DriveClient {
    /// Create a new Drive client.
    ///
    /// # Errors
    /// - The HTTP client could not be built
    pub fn new(config: DriveConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.config.api_base.trim_end_matches('/'))
    }

    /// Find a non-trashed folder named exactly `name` under `parent_id`.
    ///
    /// # Errors
    /// - `FolderLookupFailed` on transport errors or non-success responses
    pub async fn find_folder(
        &self,
        token: &AuthorizationToken,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<FolderRef>> {
        let q = query::child_folder_named(parent_id, name);
        debug!(parent = parent_id, name, "Looking up folder");

        let response = self
            .http
            .get(self.files_url())
            .header(header::AUTHORIZATION, token.bearer_header())
            .query(&[
                ("q", q.as_str()),
                ("fields", "files(id,name,mimeType)"),
                ("pageSize", "1"),
            ])
            .send()
            .await
            .map_err(|e| Error::FolderLookupFailed(format!("Request failed: {}", e)))?;

        let list: FileListResponse = handle_response(response, Error::FolderLookupFailed).await?;
        Ok(list.files.into_iter().next().map(FolderRef::from))
    }

    /// Create a folder named `name` under `parent_id`.
    ///
    /// # Errors
    /// - `FolderCreateFailed` on transport errors or non-success responses
    pub async fn create_folder(
        &self,
        token: &AuthorizationToken,
        parent_id: &str,
        name: &str,
    ) -> Result<FolderRef> {
        debug!(parent = parent_id, name, "Creating folder");

        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id],
        });

        let response = self
            .http
            .post(self.files_url())
            .header(header::AUTHORIZATION, token.bearer_header())
            .query(&[("fields", "id,name")])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::FolderCreateFailed(format!("Request failed: {}", e)))?;

        let file: DriveFile = handle_response(response, Error::FolderCreateFailed).await?;
        Ok(file.into())
    }

    /// List every folder directly under `parent_id`, sorted by name.
    ///
    /// # Errors
    /// - `FolderLookupFailed` on transport errors or non-success responses
    pub async fn list_folders(
        &self,
        token: &AuthorizationToken,
        parent_id: &str,
    ) -> Result<Vec<FolderRef>> {
        let q = query::child_folders(parent_id);
        let mut folders = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.files_url())
                .header(header::AUTHORIZATION, token.bearer_header())
                .query(&[
                    ("q", q.as_str()),
                    ("fields", "files(id,name,mimeType),nextPageToken"),
                    ("orderBy", "name"),
                    ("pageSize", LIST_PAGE_SIZE),
                ]);

            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::FolderLookupFailed(format!("Request failed: {}", e)))?;

            let list: FileListResponse =
                handle_response(response, Error::FolderLookupFailed).await?;
            folders.extend(list.files.into_iter().map(FolderRef::from));

            match list.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(folders)
    }

    /// Fetch a folder by id.
    ///
    /// # Errors
    /// - `NotFound` if the id does not exist, is not a folder or is trashed
    /// - `FolderLookupFailed` on other failures
    pub async fn get_folder(&self, token: &AuthorizationToken, folder_id: &str) -> Result<FolderRef> {
        let url = format!("{}/{}", self.files_url(), folder_id);

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, token.bearer_header())
            .query(&[("fields", "id,name,mimeType,trashed")])
            .send()
            .await
            .map_err(|e| Error::FolderLookupFailed(format!("Request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Folder not found: {}", folder_id)));
        }

        let file: DriveFile = handle_response(response, Error::FolderLookupFailed).await?;
        if !file.is_folder() || file.trashed {
            return Err(Error::NotFound(format!("Not an active folder: {}", folder_id)));
        }
        Ok(file.into())
    }

    /// Email address of the account the token was issued for.
    ///
    /// # Errors
    /// - `AuthUnavailable` on transport errors or non-success responses
    pub async fn account_email(&self, token: &AuthorizationToken) -> Result<Option<String>> {
        let url = format!("{}/about", self.config.api_base.trim_end_matches('/'));

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, token.bearer_header())
            .query(&[("fields", "user(emailAddress)")])
            .send()
            .await
            .map_err(|e| Error::AuthUnavailable(format!("Request failed: {}", e)))?;

        let about: AboutResponse = handle_response(response, Error::AuthUnavailable).await?;
        Ok(about.user.and_then(|u| u.email_address))
    }

    /// Upload a file into `folder_id` as one `multipart/related` request.
    ///
    /// The whole content is held in memory; callers bound file size.
    ///
    /// # Errors
    /// - `UploadFailed` on transport errors or non-success responses
    pub async fn upload_file(
        &self,
        token: &AuthorizationToken,
        folder_id: &str,
        content: &[u8],
        file_name: &str,
        mime_type: Option<&str>,
    ) -> Result<UploadedFileRef> {
        let url = format!("{}/files", self.config.upload_base.trim_end_matches('/'));

        let metadata = serde_json::json!({
            "name": file_name,
            "parents": [folder_id],
        });
        let body = MultipartBody::encode(&metadata, content, mime_type);

        debug!(
            folder = folder_id,
            file_name,
            bytes = content.len(),
            "Uploading file"
        );

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, token.bearer_header())
            .header(header::CONTENT_TYPE, body.content_type())
            .query(&[("uploadType", "multipart"), ("fields", UPLOAD_FIELDS)])
            .body(body.into_bytes())
            .send()
            .await
            .map_err(|e| Error::UploadFailed(format!("Request failed: {}", e)))?;

        handle_response(response, Error::UploadFailed).await
    }

    /// Let anyone holding the link view `file_id`, then return its view link.
    ///
    /// Grants a `reader` permission of type `anyone`. Granting again is
    /// harmless; Drive keeps a single link permission.
    ///
    /// # Errors
    /// - `UploadFailed` if the permission cannot be granted or the link read
    pub async fn share_with_link(
        &self,
        token: &AuthorizationToken,
        file_id: &str,
    ) -> Result<Option<String>> {
        let url = format!("{}/{}/permissions", self.files_url(), file_id);
        let permission = serde_json::json!({
            "type": "anyone",
            "role": "reader",
        });
        debug!(file = file_id, "Granting link access");

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, token.bearer_header())
            .query(&[("fields", "id")])
            .json(&permission)
            .send()
            .await
            .map_err(|e| Error::UploadFailed(format!("Permission request failed: {}", e)))?;

        let _: serde_json::Value = handle_response(response, |detail| {
            Error::UploadFailed(format!("Cannot share file: {}", detail))
        })
        .await?;

        self.share_link(token, file_id).await
    }

    /// The browser link of `file_id`, if Drive reports one.
    ///
    /// # Errors
    /// - `UploadFailed` on transport errors or non-success responses
    pub async fn share_link(
        &self,
        token: &AuthorizationToken,
        file_id: &str,
    ) -> Result<Option<String>> {
        let url = format!("{}/{}", self.files_url(), file_id);

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, token.bearer_header())
            .query(&[("fields", "webViewLink")])
            .send()
            .await
            .map_err(|e| Error::UploadFailed(format!("Request failed: {}", e)))?;

        let file: ViewLink = handle_response(response, Error::UploadFailed).await?;
        Ok(file.web_view_link)
    }
}

/// Decode a successful response, or turn a failure into `to_error` with
/// the status and the provider's message.
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: Response,
    to_error: fn(String) -> Error,
) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| to_error(format!("Failed to parse response: {}", e)))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(to_error(provider_detail(status, &body)))
    }
}

/// Render `status - message`, preferring the message in Drive's error envelope.
fn provider_detail(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    if message.is_empty() {
        status.to_string()
    } else {
        format!("{} - {}", status, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_file_is_folder() {
        let folder = DriveFile {
            id: "1".to_string(),
            name: "Section A".to_string(),
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            trashed: false,
        };
        assert!(folder.is_folder());

        let file = DriveFile {
            id: "2".to_string(),
            name: "report.pdf".to_string(),
            mime_type: Some("application/pdf".to_string()),
            trashed: false,
        };
        assert!(!file.is_folder());
    }

    #[test]
    fn test_provider_detail_prefers_error_message() {
        let body = r#"{"error": {"code": 403, "message": "The user does not have sufficient permissions"}}"#;
        assert_eq!(
            provider_detail(StatusCode::FORBIDDEN, body),
            "403 Forbidden - The user does not have sufficient permissions"
        );
    }

    #[test]
    fn test_provider_detail_falls_back_to_body() {
        assert_eq!(
            provider_detail(StatusCode::BAD_GATEWAY, "upstream down\n"),
            "502 Bad Gateway - upstream down"
        );
        assert_eq!(
            provider_detail(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "500 Internal Server Error"
        );
    }

    #[test]
    fn test_config_defaults() {
        let config: DriveConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.api_base, DRIVE_API_BASE);
        assert_eq!(config.upload_base, DRIVE_UPLOAD_BASE);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_with_base_url() {
        let config = DriveConfig::with_base_url("http://127.0.0.1:9000/");
        assert_eq!(config.api_base, "http://127.0.0.1:9000/drive/v3");
        assert_eq!(config.upload_base, "http://127.0.0.1:9000/upload/drive/v3");
    }
}
