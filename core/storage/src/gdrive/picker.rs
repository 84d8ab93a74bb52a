//! Interactive root-folder selection.
//!
//! [`DriveFolderPicker`] browses folders with the caller's token and asks a
//! [`FolderChooser`] (the UI) what to do at each level. It never writes.

use async_trait::async_trait;
use tracing::debug;

use accredify_common::{AuthorizationToken, Error, FolderRef, Result};

use super::client::DriveClient;

/// Drive alias for the signed-in user's top-level folder.
const MY_DRIVE_ID: &str = "root";
const MY_DRIVE_NAME: &str = "My Drive";

/// Operator decision at one level of the folder browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerChoice {
    /// Use this folder as the project root.
    Select(FolderRef),
    /// Descend into a child folder.
    Open(FolderRef),
    /// Go back to the parent level.
    Up,
    /// Dismiss the picker.
    Cancel,
}

/// The interactive half of the picker.
#[async_trait]
pub trait FolderChooser: Send + Sync {
    /// Present `current` and its child folders and return the operator's choice.
    async fn choose(&self, current: &FolderRef, children: &[FolderRef]) -> Result<PickerChoice>;
}

/// Selects a project root folder.
#[async_trait]
pub trait FolderPicker: Send + Sync {
    /// # Errors
    /// - `SelectionCancelled` if the operator dismisses the picker
    /// - `PickerUnavailable` if the picker cannot be shown
    async fn pick_root_folder(&self, token: &AuthorizationToken) -> Result<FolderRef>;
}

/// Browse state for a single pick. Dropped when the pick ends, so no UI
/// state survives between calls.
struct PickerSession<'a> {
    client: &'a DriveClient,
    token: &'a AuthorizationToken,
    trail: Vec<FolderRef>,
}

impl<'a> PickerSession<'a> {
    fn new(client: &'a DriveClient, token: &'a AuthorizationToken, start: FolderRef) -> Self {
        Self {
            client,
            token,
            trail: vec![start],
        }
    }

    fn current(&self) -> &FolderRef {
        // The trail always holds at least the start folder.
        &self.trail[self.trail.len() - 1]
    }

    async fn children(&self) -> Result<Vec<FolderRef>> {
        let current = self.current();
        self.client
            .list_folders(self.token, &current.id)
            .await
            .map_err(|e| Error::PickerUnavailable(format!("Cannot list '{}': {}", current.name, e)))
    }

    async fn run(mut self, chooser: &dyn FolderChooser) -> Result<FolderRef> {
        loop {
            let children = self.children().await?;
            match chooser.choose(self.current(), &children).await? {
                PickerChoice::Select(folder) => {
                    debug!(id = %folder.id, name = %folder.name, "Folder selected");
                    return Ok(folder);
                }
                PickerChoice::Open(folder) => self.trail.push(folder),
                PickerChoice::Up => {
                    if self.trail.len() > 1 {
                        self.trail.pop();
                    }
                }
                PickerChoice::Cancel => return Err(Error::SelectionCancelled),
            }
        }
    }
}

/// Folder picker backed by Drive folder listings.
pub struct DriveFolderPicker<C> {
    client: DriveClient,
    chooser: C,
    start: FolderRef,
}

impl<C: FolderChooser> DriveFolderPicker<C> {
    pub fn new(client: DriveClient, chooser: C) -> Self {
        Self {
            client,
            chooser,
            start: FolderRef::new(MY_DRIVE_ID, MY_DRIVE_NAME),
        }
    }

    /// Start browsing at `folder` instead of My Drive.
    pub fn starting_at(mut self, folder: FolderRef) -> Self {
        self.start = folder;
        self
    }
}

#[async_trait]
impl<C: FolderChooser> FolderPicker for DriveFolderPicker<C> {
    async fn pick_root_folder(&self, token: &AuthorizationToken) -> Result<FolderRef> {
        let session = PickerSession::new(&self.client, token, self.start.clone());
        session.run(&self.chooser).await
    }
}
