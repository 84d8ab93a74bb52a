//! Local filesystem evidence storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use accredify_common::{Error, FolderPath, ProjectId, Result};

/// A file written to local evidence storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalFileRef {
    /// Path of the stored file.
    pub path: PathBuf,
    /// Final file name (may carry a ` (n)` suffix).
    pub name: String,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

/// Local evidence store.
///
/// Files land under `<root>/<project>/<section>/<standard>/<file>`.
pub struct LocalEvidenceStore {
    root: PathBuf,
}

impl LocalEvidenceStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    /// - Root cannot be created
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a project's files for one standard.
    fn leaf_dir(&self, project: &ProjectId, path: &FolderPath) -> Result<PathBuf> {
        let mut dir = self.root.clone();
        dir.push(safe_component(project.as_str())?);
        for segment in path.segments() {
            dir.push(safe_component(segment)?);
        }
        Ok(dir)
    }

    /// Write `content` as `file_name` under the project's standard folder.
    ///
    /// An existing file is never overwritten; the new file gets a ` (n)`
    /// suffix instead. A failed write leaves no partial file behind.
    ///
    /// # Errors
    /// - `InvalidInput` if a name is not a single path component
    /// - I/O errors
    pub async fn store(
        &self,
        project: &ProjectId,
        path: &FolderPath,
        file_name: &str,
        content: &[u8],
    ) -> Result<LocalFileRef> {
        let file_name = safe_component(file_name)?;
        let dir = self.leaf_dir(project, path)?;
        fs::create_dir_all(&dir).await?;

        let mut attempt = 0u32;
        let (target, file) = loop {
            let name = numbered(file_name, attempt);
            let target = dir.join(&name);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .await
            {
                Ok(file) => break (target, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        };

        write_or_remove(file, &target, content).await?;

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());
        info!(project = %project, path = %path, file = %name, "Stored evidence locally");

        Ok(LocalFileRef {
            path: target,
            name,
            size: content.len() as u64,
            stored_at: Utc::now(),
        })
    }
}

/// Write `content` to a freshly created `target`, deleting it if the write fails.
async fn write_or_remove<W: AsyncWrite + Unpin>(
    mut writer: W,
    target: &Path,
    content: &[u8],
) -> Result<()> {
    let written = async {
        writer.write_all(content).await?;
        writer.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(writer);
        if let Err(cleanup) = fs::remove_file(target).await {
            warn!(path = %target.display(), "Failed to remove partial file: {}", cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

/// Reject names that would escape their directory.
fn safe_component(name: &str) -> Result<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\')
    {
        return Err(Error::InvalidInput(format!(
            "Not a valid local path component: {:?}",
            name
        )));
    }
    Ok(name)
}

/// `report.pdf` → `report (2).pdf` for attempt 2.
fn numbered(file_name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, attempt, ext),
        _ => format!("{} ({})", file_name, attempt),
    }
}
