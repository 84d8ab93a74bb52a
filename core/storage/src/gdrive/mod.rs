//! Google Drive integration for evidence storage.
//!
//! - OAuth2 consent with PKCE and a loopback redirect, one fresh token per sequence
//! - Folder picker driven by an operator-supplied chooser
//! - Idempotent section/standard folder materialization
//! - Single-request multipart uploads

pub mod auth;
pub mod callback;
pub mod client;
pub mod materialize;
pub mod multipart;
pub mod picker;
pub mod query;

pub use auth::{
    redirect_host_warning, AuthConfig, ConsentLauncher, ConsentSession, OAuthTokenProvider,
    TokenProvider, DRIVE_BROWSE_SCOPE, DRIVE_FILE_SCOPE, DRIVE_SCOPE,
};
pub use client::{DriveClient, DriveConfig};
pub use materialize::PathMaterializer;
pub use multipart::MultipartBody;
pub use picker::{DriveFolderPicker, FolderChooser, FolderPicker, PickerChoice};
