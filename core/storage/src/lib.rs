//! Evidence storage for AccrediFy.
//!
//! Evidence files for a project land either in local storage or under the
//! project's linked Google Drive folder, depending on the project's storage
//! mode.
//!
//! # Design Principles
//! - No cached credentials: every remote sequence asks for a fresh token
//! - Idempotent folders: lookup before create, serialized per path
//! - Typed failures: cancellation and provider errors are error variants
//! - Explicit sessions: consent and picker state live only for one call

pub mod evidence;
pub mod gdrive;
pub mod link;
pub mod local;

pub use evidence::{EvidenceFile, EvidenceService, StoredEvidence};
pub use link::{LinkStore, MemoryLinkStore, SqliteLinkStore};
pub use local::{LocalEvidenceStore, LocalFileRef};
