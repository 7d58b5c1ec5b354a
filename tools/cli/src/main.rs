//! OneIndex CLI - command line access to a OneDrive file index.
//!
//! Every command runs through the same path the web front-end uses: the
//! stored credential is refreshed when expired, then the drive call is made.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oneindex_common::DriveContext;
use oneindex_storage::onedrive::{
    ApiResponse, Credential, CredentialStore, DriveIndex, FileCredentialStore, GraphConfig,
    ListOptions, DEFAULT_SCOPE, DEFAULT_TENANT,
};

#[derive(Parser)]
#[command(name = "oneindex")]
#[command(about = "OneIndex - browse and manage a OneDrive file index")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Credential file (default: <config dir>/oneindex/credentials.json).
    #[arg(short, long, global = true)]
    credentials: Option<PathBuf>,

    /// Endpoint/timeout configuration file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Address a SharePoint site's drive.
    #[arg(long, global = true, conflicts_with = "user")]
    site: Option<String>,

    /// Address another user's drive.
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new credential file for an app registration.
    Init(InitArgs),

    #[command(flatten)]
    Index(IndexCommands),
}

#[derive(Args)]
struct InitArgs {
    #[arg(long)]
    client_id: String,

    #[arg(long)]
    client_secret: String,

    #[arg(long)]
    redirect_uri: String,

    /// Refresh token, if one was already obtained.
    #[arg(long, default_value = "")]
    refresh_token: String,

    #[arg(long, default_value = DEFAULT_TENANT)]
    tenant_id: String,

    #[arg(long, default_value = DEFAULT_SCOPE)]
    scope: String,

    /// Site served by default.
    #[arg(long)]
    site_id: Option<String>,
}

/// Commands that talk to the drive.
#[derive(Subcommand)]
enum IndexCommands {
    /// Print the consent URL.
    AuthorizeUrl {
        /// Opaque state echoed back on the redirect.
        #[arg(short, long, default_value = "")]
        state: String,

        /// Open the URL in the default browser.
        #[arg(long)]
        open: bool,
    },

    /// Redeem the code from the consent redirect.
    Login {
        #[arg(long)]
        code: String,
    },

    /// Force a token refresh.
    Refresh,

    /// List a folder, or search the drive.
    Ls {
        /// Folder path (default: root).
        #[arg(default_value = "/")]
        folder: String,

        /// Full-text search instead of listing.
        #[arg(short, long)]
        search: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: u32,

        /// Comma-separated item fields to select.
        #[arg(long)]
        fields: Option<String>,
    },

    /// Show item metadata.
    Get { path: String },

    /// Print a file's direct download URL.
    Url { path: String },

    /// Upload a local file.
    Upload {
        source: PathBuf,

        /// Name in the drive (default: the local file name).
        #[arg(short, long, conflicts_with = "auto_name")]
        name: Option<String>,

        /// Store under a collision-free timestamp name, keeping the extension.
        #[arg(long)]
        auto_name: bool,
    },

    /// Delete an item.
    Rm { path: String },

    /// Rename an item.
    Mv { path: String, new_name: String },

    /// Create a folder.
    Mkdir { parent: String, name: String },

    /// Show drive information.
    Drive {
        /// Show a site's drive instead of the account's.
        #[arg(long)]
        site_id: Option<String>,
    },

    /// List SharePoint sites.
    Sites,

    /// Show the signed-in account.
    Whoami,
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

    let credentials_path = match &cli.credentials {
        Some(path) => path.clone(),
        None => default_credentials_path()?,
    };
    let store = Arc::new(FileCredentialStore::new(credentials_path));

    match cli.command {
        Commands::Init(args) => cmd_init(&store, args).await,
        Commands::Index(command) => {
            let config = load_config(cli.config.as_deref()).await?;
            let context =
                resolve_context(cli.site.as_deref(), cli.user.as_deref(), &store).await?;
            info!("Using drive {}", context.root_path());

            let index =
                DriveIndex::new(config, store, context).context("Failed to set up client")?;
            run(&index, command).await
        }
    }
}

/// Write a fresh credential file.
async fn cmd_init(store: &FileCredentialStore, args: InitArgs) -> Result<()> {
    let mut credential = Credential::new(
        args.client_id,
        args.client_secret,
        args.refresh_token,
        args.redirect_uri,
    );
    credential.tenant_id = args.tenant_id;
    credential.scope = args.scope;
    credential.site_id = args.site_id;

    store
        .save(&credential)
        .await
        .context("Failed to write credential file")?;
    println!("Credential written to {}", store.path().display());

    Ok(())
}

/// Execute one drive command.
async fn run(index: &DriveIndex, command: IndexCommands) -> Result<()> {
    match command {
        IndexCommands::AuthorizeUrl { state, open } => {
            let url = index
                .authorize_url(&state)
                .await
                .context("Failed to build authorization URL")?;
            println!("{}", url);
            if open {
                open::that(&url).context("Failed to open browser")?;
            }
        }

        IndexCommands::Login { code } => {
            let credential = index
                .exchange_code(&code)
                .await
                .context("Failed to redeem authorization code")?;
            println!("Signed in; token valid until {}", credential.expires_at);
        }

        IndexCommands::Refresh => {
            let credential = index.refresh().await.context("Failed to refresh token")?;
            println!("Token refreshed; valid until {}", credential.expires_at);
        }

        IndexCommands::Ls {
            folder,
            search,
            limit,
            fields,
        } => {
            let mut options = ListOptions::folder(folder).with_limit(limit);
            options.query = search;
            if let Some(fields) = fields {
                options = options.with_fields(fields);
            }
            let response = index.list(&options).await.context("Failed to list")?;
            print_response(response)?;
        }

        IndexCommands::Get { path } => {
            let response = index.get(&path).await.context("Failed to get item")?;
            print_response(response)?;
        }

        IndexCommands::Url { path } => {
            match index
                .download_url(&path)
                .await
                .context("Failed to get item")?
            {
                Some(url) => println!("{}", url),
                None => anyhow::bail!("{} has no download URL (is it a folder?)", path),
            }
        }

        IndexCommands::Upload {
            source,
            name,
            auto_name,
        } => {
            let name = match name {
                Some(name) => name,
                None => {
                    let file_name = source
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .context("Source has no file name; pass --name")?;
                    if auto_name {
                        timestamped_name(&file_name, Utc::now())
                    } else {
                        file_name
                    }
                }
            };
            let content = tokio::fs::read(&source)
                .await
                .context("Failed to read source file")?;

            info!("Uploading {} ({} bytes) as {}", source.display(), content.len(), name);
            let response = index
                .upload(&name, content)
                .await
                .context("Failed to upload")?;
            print_response(response)?;
        }

        IndexCommands::Rm { path } => {
            let response = index.delete(&path).await.context("Failed to delete")?;
            print_response(response)?;
        }

        IndexCommands::Mv { path, new_name } => {
            let response = index
                .rename(&path, &new_name)
                .await
                .context("Failed to rename")?;
            print_response(response)?;
        }

        IndexCommands::Mkdir { parent, name } => {
            let response = index
                .create_folder(&parent, &name)
                .await
                .context("Failed to create folder")?;
            print_response(response)?;
        }

        IndexCommands::Drive { site_id } => {
            let response = match site_id {
                Some(site_id) => index.site_drive_info(&site_id).await,
                None => index.drive_info().await,
            }
            .context("Failed to get drive information")?;
            print_response(response)?;
        }

        IndexCommands::Sites => {
            let response = index.site_list().await.context("Failed to list sites")?;
            print_response(response)?;
        }

        IndexCommands::Whoami => {
            let response = index.user_info().await.context("Failed to get user")?;
            print_response(response)?;
        }
    }

    Ok(())
}

/// `<unix micros>.<extension>`; a name without a dot is its own extension.
fn timestamped_name(file_name: &str, now: DateTime<Utc>) -> String {
    let ext = file_name.rsplit('.').next().unwrap_or(file_name);
    format!("{}.{}", now.timestamp_micros(), ext)
}

fn default_credentials_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join("oneindex").join("credentials.json"))
}

async fn load_config(path: Option<&Path>) -> Result<GraphConfig> {
    let Some(path) = path else {
        return Ok(GraphConfig::default());
    };

    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("Invalid config {}", path.display()))
}

/// Flags win; otherwise the credential's site, otherwise the account's own drive.
async fn resolve_context(
    site: Option<&str>,
    user: Option<&str>,
    store: &FileCredentialStore,
) -> Result<DriveContext> {
    if let Some(site) = site {
        return Ok(DriveContext::site(site));
    }
    if let Some(user) = user {
        return Ok(DriveContext::user(user));
    }

    let credential = store.read().await.with_context(|| {
        format!(
            "Failed to read credentials from {} (run `oneindex init` first)",
            store.path().display()
        )
    })?;

    Ok(match credential.site_id {
        Some(site_id) => DriveContext::site(site_id),
        None => DriveContext::me(),
    })
}

fn print_response(response: ApiResponse) -> Result<()> {
    let value: Value = response.into_json();
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
