//! Common types used throughout AccrediFy evidence storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Unique identifier for a compliance project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    /// Create a new ProjectId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "ProjectId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A remote folder identified by the storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderRef {
    /// Provider-assigned folder identifier.
    pub id: String,
    /// Display name of the folder.
    pub name: String,
}

impl FolderRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Section and standard names under a project's root folder.
///
/// Names are kept exactly as supplied. Whitespace and case are significant,
/// so callers should derive them from stable template codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderPath {
    section: String,
    standard: String,
}

impl FolderPath {
    /// Create a folder path from its two segments.
    ///
    /// # Errors
    /// - Returns error if either segment is empty
    pub fn new(section: impl Into<String>, standard: impl Into<String>) -> crate::Result<Self> {
        let section = section.into();
        let standard = standard.into();
        if section.is_empty() || standard.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Folder path segments cannot be empty".to_string(),
            ));
        }
        Ok(Self { section, standard })
    }

    /// The section segment.
    pub fn section(&self) -> &str {
        &self.section
    }

    /// The standard segment (leaf folder name).
    pub fn standard(&self) -> &str {
        &self.standard
    }

    /// Segments in materialization order.
    pub fn segments(&self) -> [&str; 2] {
        [&self.section, &self.standard]
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.section, self.standard)
    }
}

/// Where a project's new evidence uploads land.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Local,
    Remote,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Local => "local",
            StorageMode::Remote => "remote",
        }
    }

    /// Parse the persisted form.
    pub fn parse(value: &str) -> crate::Result<Self> {
        match value {
            "local" => Ok(StorageMode::Local),
            "remote" => Ok(StorageMode::Remote),
            other => Err(crate::Error::Serialization(format!(
                "Unknown storage mode: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link between a project and its remote root folder.
///
/// Exactly one exists per project. A project that was never linked reads as
/// [`ProjectDriveLink::unlinked`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDriveLink {
    pub project_id: ProjectId,
    pub root_folder_id: Option<String>,
    pub storage_mode: StorageMode,
    pub linked_at: Option<DateTime<Utc>>,
    pub linked_account_email: Option<String>,
}

impl ProjectDriveLink {
    /// The implicit link state of a new project.
    pub fn unlinked(project_id: ProjectId) -> Self {
        Self {
            project_id,
            root_folder_id: None,
            storage_mode: StorageMode::Local,
            linked_at: None,
            linked_account_email: None,
        }
    }

    /// Root folder to upload under, if the project targets remote storage.
    pub fn remote_root(&self) -> Option<&str> {
        match self.storage_mode {
            StorageMode::Remote => self.root_folder_id.as_deref(),
            StorageMode::Local => None,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.remote_root().is_some()
    }
}

/// Canonical metadata of a file stored by the remote provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileRef {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(rename = "webViewLink", default)]
    pub view_link: Option<String>,
}

/// Short-lived bearer credential scoped to file creation.
///
/// Held only for the duration of one operation sequence. The secret is
/// zeroized on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthorizationToken(String);

impl AuthorizationToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw bearer secret.
    pub fn secret(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AuthorizationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthorizationToken([REDACTED])")
    }
}
