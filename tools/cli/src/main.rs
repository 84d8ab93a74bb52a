//! AccrediFy evidence CLI - link projects to Google Drive and store evidence.
//!
//! Projects start in local storage. Linking a project to a Drive folder
//! routes new evidence uploads into `<root>/<section>/<standard>/` on Drive;
//! unlinking routes them back to local storage.

mod chooser;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use accredify_common::{FolderPath, ProjectId};
use accredify_storage::gdrive::{
    AuthConfig, DriveClient, DriveConfig, DriveFolderPicker, OAuthTokenProvider, PathMaterializer,
    DRIVE_SCOPE,
};
use accredify_storage::{EvidenceFile, EvidenceService, LocalEvidenceStore, SqliteLinkStore};

use chooser::TerminalChooser;

#[derive(Parser)]
#[command(name = "accredify-evidence")]
#[command(about = "AccrediFy - Evidence storage and Google Drive linking")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the link database and local evidence.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Request full Drive access for uploads, needed when the linked folder
    /// was not created by this tool.
    #[arg(long, global = true)]
    full_drive_access: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick a Drive folder and link a project to it.
    Link {
        /// Project identifier.
        #[arg(short, long)]
        project: String,
    },

    /// Return a project to local storage.
    Unlink {
        /// Project identifier.
        #[arg(short, long)]
        project: String,
    },

    /// Show a project's storage mode and linked folder.
    Status {
        /// Project identifier.
        #[arg(short, long)]
        project: String,
    },

    /// Check that a linked project's Drive folder is still reachable.
    Confirm {
        /// Project identifier.
        #[arg(short, long)]
        project: String,
    },

    /// Store an evidence file for a project standard.
    Upload {
        /// Project identifier.
        #[arg(short, long)]
        project: String,

        /// Section folder name.
        #[arg(long)]
        section: String,

        /// Standard folder name.
        #[arg(long)]
        standard: String,

        /// File to upload.
        #[arg(short, long)]
        file: PathBuf,

        /// MIME type (default: application/octet-stream).
        #[arg(short, long)]
        mime: Option<String>,

        /// Let anyone with the Drive link view the uploaded file.
        #[arg(long)]
        share: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("No data directory on this platform; pass --data-dir")?
            .join("accredify"),
    };
    let service = build_service(&data_dir, cli.full_drive_access)?;

    match cli.command {
        Commands::Link { project } => cmd_link(&service, &project).await,

        Commands::Unlink { project } => cmd_unlink(&service, &project).await,

        Commands::Status { project } => cmd_status(&service, &project).await,

        Commands::Confirm { project } => cmd_confirm(&service, &project).await,

        Commands::Upload {
            project,
            section,
            standard,
            file,
            mime,
            share,
        } => cmd_upload(&service, &project, &section, &standard, &file, mime, share).await,
    }
}

/// Wire the evidence service over the data directory.
fn build_service(data_dir: &Path, full_drive_access: bool) -> Result<EvidenceService> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    // Missing credentials only matter once consent is needed.
    let auth = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            debug!("{}; Drive access disabled", e);
            AuthConfig::new("", "")
        }
    };
    let tokens = OAuthTokenProvider::new(auth);

    let cancel = tokens.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling pending consent (Ctrl-C again to quit)");
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    let drive = DriveConfig::default();
    let picker = DriveFolderPicker::new(
        DriveClient::new(drive.clone()).context("Failed to create Drive client")?,
        TerminalChooser::new(),
    );
    let materializer =
        PathMaterializer::new(DriveClient::new(drive).context("Failed to create Drive client")?);

    let links = SqliteLinkStore::open(data_dir.join("links.db"))
        .context("Failed to open link database")?;
    let local = LocalEvidenceStore::new(data_dir.join("evidence"))
        .context("Failed to create local evidence store")?;

    let service = EvidenceService::new(
        Arc::new(tokens),
        Arc::new(picker),
        Arc::new(links),
        materializer,
        local,
    );
    Ok(if full_drive_access {
        service.with_write_scope(DRIVE_SCOPE)
    } else {
        service
    })
}

fn project_id(project: &str) -> Result<ProjectId> {
    ProjectId::new(project).context("Invalid project id")
}

/// Link a project to a Drive folder.
async fn cmd_link(service: &EvidenceService, project: &str) -> Result<()> {
    let project = project_id(project)?;
    info!("Linking project {} to Google Drive", project);

    let link = match service.link_project(&project).await {
        Ok(link) => link,
        Err(e) if e.is_cancellation() => {
            println!("Linking cancelled ({}); project unchanged.", e);
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to link project"),
    };

    println!("Project linked!");
    println!("  Project: {}", link.project_id);
    println!("  Folder: {}", link.root_folder_id.as_deref().unwrap_or("-"));
    if let Some(email) = &link.linked_account_email {
        println!("  Account: {}", email);
    }

    Ok(())
}

/// Return a project to local storage.
async fn cmd_unlink(service: &EvidenceService, project: &str) -> Result<()> {
    let project = project_id(project)?;

    service
        .unlink_project(&project)
        .await
        .context("Failed to unlink project")?;

    println!("Project {} now stores evidence locally.", project);
    println!("Files already on Drive were left in place.");

    Ok(())
}

/// Show link state.
async fn cmd_status(service: &EvidenceService, project: &str) -> Result<()> {
    let project = project_id(project)?;

    let link = service
        .link_status(&project)
        .await
        .context("Failed to read link state")?;

    println!("Project: {}", link.project_id);
    println!("  Storage: {}", link.storage_mode);
    if let Some(root) = link.remote_root() {
        println!("  Drive folder: {}", root);
    }
    if let Some(at) = link.linked_at {
        println!("  Linked: {}", at);
    }
    if let Some(email) = &link.linked_account_email {
        println!("  Account: {}", email);
    }

    Ok(())
}

/// Confirm the linked folder still exists.
async fn cmd_confirm(service: &EvidenceService, project: &str) -> Result<()> {
    let project = project_id(project)?;

    let folder = service
        .confirm_link(&project)
        .await
        .context("Linked folder is not reachable")?;

    println!("Linked folder OK: {} ({})", folder.name, folder.id);

    Ok(())
}

/// Store an evidence file.
async fn cmd_upload(
    service: &EvidenceService,
    project: &str,
    section: &str,
    standard: &str,
    file: &Path,
    mime: Option<String>,
    share: bool,
) -> Result<()> {
    let project = project_id(project)?;
    let path = FolderPath::new(section, standard).context("Invalid section or standard")?;

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("File path has no file name")?;
    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    info!("Storing {} ({} bytes) under {}", name, content.len(), path);

    let mut evidence = EvidenceFile::new(name, content);
    if let Some(mime) = mime {
        evidence = evidence.with_mime_type(mime);
    }
    if share {
        evidence = evidence.shared_by_link();
    }

    let stored = service
        .upload_evidence(&project, &path, evidence)
        .await
        .context("Failed to store evidence")?;

    println!("{}", serde_json::to_string_pretty(&stored)?);

    Ok(())
}
