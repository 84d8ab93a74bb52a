//! Persisted link between a project and its remote root folder.
//!
//! One [`ProjectDriveLink`] exists per project. Projects without a stored
//! record read as unlinked local storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use tracing::{debug, info};

use accredify_common::{Error, ProjectDriveLink, ProjectId, Result, StorageMode};

/// Storage for project link records.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Current link state of `project`.
    ///
    /// # Errors
    /// - `LinkPersistenceFailed` if the record cannot be read
    async fn get_link(&self, project: &ProjectId) -> Result<ProjectDriveLink>;

    /// Point `project` at `root_folder_id` and switch it to remote storage.
    ///
    /// # Errors
    /// - `InvalidInput` if `root_folder_id` is empty
    /// - `LinkPersistenceFailed` if the record cannot be written
    async fn set_link(
        &self,
        project: &ProjectId,
        root_folder_id: &str,
        linked_email: Option<&str>,
    ) -> Result<ProjectDriveLink>;

    /// Switch `project` back to local storage. Succeeds if already unlinked.
    ///
    /// # Errors
    /// - `LinkPersistenceFailed` if the record cannot be written
    async fn clear_link(&self, project: &ProjectId) -> Result<ProjectDriveLink>;
}

fn linked(project: &ProjectId, root_folder_id: &str, email: Option<&str>) -> Result<ProjectDriveLink> {
    if root_folder_id.trim().is_empty() {
        return Err(Error::InvalidInput("Drive folder id is required".to_string()));
    }
    Ok(ProjectDriveLink {
        project_id: project.clone(),
        root_folder_id: Some(root_folder_id.to_string()),
        storage_mode: StorageMode::Remote,
        linked_at: Some(Utc::now()),
        linked_account_email: email.map(str::to_string),
    })
}

/// In-memory link store.
///
/// Useful for testing and embedding; records are lost on drop.
#[derive(Default)]
pub struct MemoryLinkStore {
    links: RwLock<HashMap<ProjectId, ProjectDriveLink>>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn get_link(&self, project: &ProjectId) -> Result<ProjectDriveLink> {
        let links = self
            .links
            .read()
            .map_err(|_| Error::LinkPersistenceFailed("Link store poisoned".to_string()))?;
        Ok(links
            .get(project)
            .cloned()
            .unwrap_or_else(|| ProjectDriveLink::unlinked(project.clone())))
    }

    async fn set_link(
        &self,
        project: &ProjectId,
        root_folder_id: &str,
        linked_email: Option<&str>,
    ) -> Result<ProjectDriveLink> {
        let link = linked(project, root_folder_id, linked_email)?;
        self.links
            .write()
            .map_err(|_| Error::LinkPersistenceFailed("Link store poisoned".to_string()))?
            .insert(project.clone(), link.clone());
        Ok(link)
    }

    async fn clear_link(&self, project: &ProjectId) -> Result<ProjectDriveLink> {
        self.links
            .write()
            .map_err(|_| Error::LinkPersistenceFailed("Link store poisoned".to_string()))?
            .remove(project);
        Ok(ProjectDriveLink::unlinked(project.clone()))
    }
}

/// SQLite-backed link store, one row per linked project.
pub struct SqliteLinkStore {
    conn: Mutex<Connection>,
}

fn db_error(e: rusqlite::Error) -> Error {
    Error::LinkPersistenceFailed(e.to_string())
}

impl SqliteLinkStore {
    /// Create or open a link database.
    ///
    /// # Errors
    /// - `LinkPersistenceFailed` on database creation or migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(db_error)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS project_drive_links (
                project_id TEXT PRIMARY KEY,
                root_folder_id TEXT,
                storage_mode TEXT NOT NULL,
                linked_at TEXT,
                linked_account_email TEXT
            );
            "#,
        )
        .map_err(db_error)?;

        info!("Link store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::LinkPersistenceFailed("Link store poisoned".to_string()))?;
        f(&conn)
    }
}

#[async_trait]
impl LinkStore for SqliteLinkStore {
    async fn get_link(&self, project: &ProjectId) -> Result<ProjectDriveLink> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                r#"
                SELECT root_folder_id, storage_mode, linked_at, linked_account_email
                FROM project_drive_links WHERE project_id = ?1
                "#,
                [project.as_str()],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(db_error)
        })?;

        let Some((root_folder_id, mode, linked_at, email)) = row else {
            return Ok(ProjectDriveLink::unlinked(project.clone()));
        };

        let storage_mode = StorageMode::parse(&mode)
            .map_err(|e| Error::LinkPersistenceFailed(e.to_string()))?;
        let linked_at = linked_at
            .map(|ts| {
                DateTime::parse_from_rfc3339(&ts)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| Error::LinkPersistenceFailed(format!("Bad linked_at: {}", e)))
            })
            .transpose()?;

        Ok(ProjectDriveLink {
            project_id: project.clone(),
            root_folder_id,
            storage_mode,
            linked_at,
            linked_account_email: email,
        })
    }

    async fn set_link(
        &self,
        project: &ProjectId,
        root_folder_id: &str,
        linked_email: Option<&str>,
    ) -> Result<ProjectDriveLink> {
        let link = linked(project, root_folder_id, linked_email)?;
        debug!(project = %project, "Persisting drive link");

        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT OR REPLACE INTO project_drive_links
                (project_id, root_folder_id, storage_mode, linked_at, linked_account_email)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    project.as_str(),
                    link.root_folder_id,
                    link.storage_mode.as_str(),
                    link.linked_at.map(|t| t.to_rfc3339()),
                    link.linked_account_email,
                ],
            )
            .map_err(db_error)
        })?;

        Ok(link)
    }

    async fn clear_link(&self, project: &ProjectId) -> Result<ProjectDriveLink> {
        debug!(project = %project, "Clearing drive link");
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM project_drive_links WHERE project_id = ?1",
                [project.as_str()],
            )
            .map_err(db_error)
        })?;
        Ok(ProjectDriveLink::unlinked(project.clone()))
    }
}
