//! Evidence storage service.
//!
//! Ties the token provider, folder picker, link store and upload path
//! together. Within one sequence each step gates the next: token, then
//! folder, then materialization, then upload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use accredify_common::{
    Error, FolderPath, FolderRef, ProjectDriveLink, ProjectId, Result, UploadedFileRef,
};

use crate::gdrive::{
    FolderPicker, PathMaterializer, TokenProvider, DRIVE_BROWSE_SCOPE, DRIVE_FILE_SCOPE,
};
use crate::link::LinkStore;
use crate::local::{LocalEvidenceStore, LocalFileRef};

/// A file to attach as evidence.
#[derive(Debug, Clone)]
pub struct EvidenceFile {
    pub name: String,
    /// MIME type if known; remote uploads default to `application/octet-stream`.
    pub mime_type: Option<String>,
    pub content: Bytes,
    /// Grant link-holders read access after a remote upload.
    pub share_by_link: bool,
}

impl EvidenceFile {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            content: content.into(),
            share_by_link: false,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Make a remote upload viewable by anyone with its link.
    pub fn shared_by_link(mut self) -> Self {
        self.share_by_link = true;
        self
    }
}

/// Where an evidence file ended up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "storage", rename_all = "lowercase")]
pub enum StoredEvidence {
    Local(LocalFileRef),
    Remote(UploadedFileRef),
}

/// Links projects to Drive folders and routes evidence uploads.
///
/// Linking and confirming use a read-only browse token so the operator can
/// see their own folders. Uploads use a separate write token, `drive.file`
/// unless [`Self::with_write_scope`] widens it.
pub struct EvidenceService {
    tokens: Arc<dyn TokenProvider>,
    picker: Arc<dyn FolderPicker>,
    links: Arc<dyn LinkStore>,
    materializer: PathMaterializer,
    local: LocalEvidenceStore,
    browse_scope: String,
    write_scope: String,
}

impl EvidenceService {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        picker: Arc<dyn FolderPicker>,
        links: Arc<dyn LinkStore>,
        materializer: PathMaterializer,
        local: LocalEvidenceStore,
    ) -> Self {
        Self {
            tokens,
            picker,
            links,
            materializer,
            local,
            browse_scope: DRIVE_BROWSE_SCOPE.to_string(),
            write_scope: DRIVE_FILE_SCOPE.to_string(),
        }
    }

    /// Scope requested for upload tokens.
    ///
    /// `drive.file` only reaches folders this application created, so a
    /// root picked from the operator's existing folders needs the full
    /// `drive` scope for uploads to land in it.
    pub fn with_write_scope(mut self, scope: impl Into<String>) -> Self {
        self.write_scope = scope.into();
        self
    }

    /// Current link state of a project.
    pub async fn link_status(&self, project: &ProjectId) -> Result<ProjectDriveLink> {
        self.links.get_link(project).await
    }

    /// Ask the operator for a root folder and link the project to it.
    ///
    /// Relinking an already linked project replaces its root folder. If the
    /// pick succeeds but persisting fails, nothing remote has changed and
    /// the action can simply be repeated.
    ///
    /// # Errors
    /// - `AuthDenied` / `AuthUnavailable` from consent
    /// - `SelectionCancelled` / `PickerUnavailable` from the picker
    /// - `LinkPersistenceFailed` if the link cannot be saved
    pub async fn link_project(&self, project: &ProjectId) -> Result<ProjectDriveLink> {
        let token = self.tokens.acquire_token(&self.browse_scope).await?;
        let folder = self.picker.pick_root_folder(&token).await?;

        let email = match self.materializer.client().account_email(&token).await {
            Ok(email) => email,
            Err(e) => {
                warn!(project = %project, "Could not read linked account email: {}", e);
                None
            }
        };

        let link = self
            .links
            .set_link(project, &folder.id, email.as_deref())
            .await?;
        info!(
            project = %project,
            folder = %folder.id,
            name = %folder.name,
            "Project linked to Drive folder"
        );
        Ok(link)
    }

    /// Check that a linked project's root folder is still reachable.
    ///
    /// # Errors
    /// - `NotFound` if the project is not linked or the folder is gone
    pub async fn confirm_link(&self, project: &ProjectId) -> Result<FolderRef> {
        let link = self.links.get_link(project).await?;
        let root = link
            .remote_root()
            .ok_or_else(|| Error::NotFound(format!("Project {} is not linked", project)))?;

        let token = self.tokens.acquire_token(&self.browse_scope).await?;
        self.materializer.client().get_folder(&token, root).await
    }

    /// Stop directing new uploads to Drive. Remote files are left alone.
    pub async fn unlink_project(&self, project: &ProjectId) -> Result<ProjectDriveLink> {
        let link = self.links.clear_link(project).await?;
        info!(project = %project, "Project unlinked from Drive");
        Ok(link)
    }

    /// Store an evidence file according to the project's storage mode.
    ///
    /// Remote uploads obtain a fresh token, materialize
    /// `root/section/standard` and upload into the standard folder. A file
    /// marked [`EvidenceFile::shared_by_link`] is then shared; if sharing
    /// fails the file stays on Drive and `UploadFailed` is returned.
    pub async fn upload_evidence(
        &self,
        project: &ProjectId,
        path: &FolderPath,
        file: EvidenceFile,
    ) -> Result<StoredEvidence> {
        let link = self.links.get_link(project).await?;

        let Some(root) = link.remote_root() else {
            if file.share_by_link {
                debug!(project = %project, "Link sharing applies to Drive uploads only");
            }
            let stored = self
                .local
                .store(project, path, &file.name, &file.content)
                .await?;
            return Ok(StoredEvidence::Local(stored));
        };

        let token = self.tokens.acquire_token(&self.write_scope).await?;
        let leaf = self.materializer.ensure_path(&token, root, path).await?;
        let mut uploaded = self
            .materializer
            .client()
            .upload_file(
                &token,
                &leaf,
                &file.content,
                &file.name,
                file.mime_type.as_deref(),
            )
            .await?;

        if file.share_by_link {
            let link = self
                .materializer
                .client()
                .share_with_link(&token, &uploaded.id)
                .await?;
            if link.is_some() {
                uploaded.view_link = link;
            }
        }

        info!(
            project = %project,
            path = %path,
            file = %uploaded.id,
            "Uploaded evidence to Drive"
        );
        Ok(StoredEvidence::Remote(uploaded))
    }
}
