//! Common utilities and types shared across AccrediFy evidence storage crates.
//!
//! This module provides the error taxonomy and the domain types that flow
//! between the token provider, folder resolver, path materializer and upload
//! transport.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    AuthorizationToken, FolderPath, FolderRef, ProjectDriveLink, ProjectId, StorageMode,
    UploadedFileRef,
};
