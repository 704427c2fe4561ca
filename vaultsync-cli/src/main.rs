//! VaultSync CLI
//!
//! Drives a local vault session: entries are written to the SQLite cache,
//! then published as encrypted blobs with the owner's pointer record kept
//! in a file-backed registry under the data directory.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::{BlobBackend, CliConfig};
use rpassword::prompt_password;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vaultsync_core::platform;
use vaultsync_core::{
    BlobStore, BootstrapOutcome, EntryPatch, FsBlobStore, LocalCache, LocalPointerRegistry,
    MasterSecret, NewEntry, PasswordEntry, SqliteCache, StaticIdentity, SyncBackends,
    VaultSession, WalrusClient,
};

const MASTER_KEY_ENV: &str = "VAULTSYNC_MASTER_KEY";

#[derive(Parser)]
#[command(name = "vaultsync", version)]
#[command(about = "Local-first password vault with encrypted blob sync", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vault owner (wallet address)
    #[arg(long, env = "VAULTSYNC_OWNER")]
    owner: String,

    /// Data directory override
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Blob backend override
    #[arg(long, value_enum)]
    blob_store: Option<BlobBackend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the vault, creating the pointer record if needed
    Init,

    /// Add a new entry
    Add {
        domain: String,
        username: String,

        /// Password (will prompt if not provided)
        #[arg(long)]
        password: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        favorite: bool,
    },

    /// Show one entry, including its password
    Get { id: Uuid },

    /// Search entries; no query lists everything
    Search { query: Option<String> },

    /// Update fields of an entry
    Update {
        id: Uuid,

        #[arg(long)]
        domain: Option<String>,

        #[arg(long)]
        username: Option<String>,

        /// Prompt for a new password
        #[arg(long)]
        password: bool,

        /// Empty string clears the category
        #[arg(long)]
        category: Option<String>,

        /// Empty string clears the notes
        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        favorite: Option<bool>,
    },

    /// Delete an entry
    Delete { id: Uuid },

    /// Record that an entry was used
    Use { id: Uuid },

    /// Publish pending changes now
    Sync,

    /// Show vault and sync status
    Info,
}

impl Commands {
    fn mutates(&self) -> bool {
        matches!(
            self,
            Self::Add { .. } | Self::Update { .. } | Self::Delete { .. } | Self::Use { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(platform::default_config_path);
    let mut cfg = if config_path.exists() {
        CliConfig::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        info!("No config file found, using defaults");
        CliConfig::default()
    };
    if let Some(data_dir) = cli.data_dir {
        cfg.data_dir = Some(data_dir);
    }
    if let Some(blob_store) = cli.blob_store {
        cfg.blob_store = blob_store;
    }

    let data_dir = cfg.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let registry = Arc::new(LocalPointerRegistry::open(data_dir.join("pointers.json"))?);
    let backends = build_backends(&cfg, &data_dir, registry.clone())?;

    let mut identity = StaticIdentity::new(cli.owner.as_str(), master_secret()?);
    if let Some(capability) = registry.capability_of(&cli.owner) {
        identity = identity.with_capability(capability);
    }

    let (session, outcome) = VaultSession::open(Arc::new(identity), backends, cfg.sync.clone())
        .await
        .context("Failed to open vault")?;
    match &outcome {
        BootstrapOutcome::Local => {}
        BootstrapOutcome::Restored { blob_id } => info!("Restored vault from blob {}", blob_id),
        BootstrapOutcome::Created => info!("No published vault found, starting empty"),
        BootstrapOutcome::RestoreFailed { error } => {
            warn!("Could not restore published vault: {}", error.message)
        }
    }

    let mutates = cli.command.mutates();
    run(&session, cli.command).await?;

    if mutates {
        if let Some(blob_id) = session
            .flush()
            .await
            .context("Saved locally, but publishing failed")?
        {
            println!("Published blob {}", blob_id);
        }
    }

    Ok(())
}

async fn run(session: &VaultSession, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {
            let blob_id = session.create_vault().await?;
            println!("Vault published as blob {}", blob_id);
        }
        Commands::Add {
            domain,
            username,
            password,
            category,
            notes,
            favorite,
        } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password("Password: ")?,
            };
            let mut input = NewEntry::new(domain, username, password).favorite(favorite);
            if let Some(category) = category {
                input = input.category(category);
            }
            if let Some(notes) = notes {
                input = input.notes(notes);
            }
            let entry = session.add_entry(input)?;
            println!("Added {} ({})", entry.domain, entry.id);
        }
        Commands::Get { id } => match session.get_entry(&id)? {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
            None => bail!("No entry with id {}", id),
        },
        Commands::Search { query } => {
            let entries = session.search_entries(query.as_deref().unwrap_or(""))?;
            if entries.is_empty() {
                println!("No entries found");
            }
            for entry in &entries {
                print_summary(entry);
            }
        }
        Commands::Update {
            id,
            domain,
            username,
            password,
            category,
            notes,
            favorite,
        } => {
            let password = if password {
                Some(prompt_password("New password: ")?)
            } else {
                None
            };
            let patch = EntryPatch {
                domain,
                username,
                password,
                category,
                notes,
                favorite,
                device_whitelist: None,
            };
            let entry = session.update_entry(&id, patch)?;
            println!("Updated {} ({})", entry.domain, entry.id);
        }
        Commands::Delete { id } => {
            session.delete_entry(&id)?;
            println!("Deleted {}", id);
        }
        Commands::Use { id } => {
            let entry = session.record_usage(&id)?;
            println!("{} used {} times", entry.domain, entry.usage_count);
        }
        Commands::Sync => {
            let blob_id = session.sync_vault().await?;
            println!("Vault published as blob {}", blob_id);
        }
        Commands::Info => {
            let report = serde_json::json!({
                "owner": session.owner_id(),
                "vault": session.get_vault_info(),
                "sync": session.status(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn build_backends(
    cfg: &CliConfig,
    data_dir: &Path,
    registry: Arc<LocalPointerRegistry>,
) -> Result<SyncBackends> {
    let cache: Arc<dyn LocalCache> = Arc::new(SqliteCache::open(data_dir.join("cache.db"))?);
    let blobs: Arc<dyn BlobStore> = match cfg.blob_store {
        BlobBackend::Walrus => Arc::new(WalrusClient::new(cfg.walrus.clone())?),
        BlobBackend::Local => Arc::new(FsBlobStore::new(data_dir.join("blobs"))?),
    };
    Ok(SyncBackends::with_registry(cache, blobs, registry))
}

fn master_secret() -> Result<MasterSecret> {
    let secret = match std::env::var(MASTER_KEY_ENV) {
        Ok(secret) => secret,
        Err(_) => prompt_password("Master key: ")?,
    };
    if secret.is_empty() {
        bail!("Master key must not be empty");
    }
    Ok(MasterSecret::from(secret))
}

fn print_summary(entry: &PasswordEntry) {
    let category = entry.category.as_deref().unwrap_or("-");
    let favorite = if entry.favorite { "*" } else { " " };
    println!(
        "{} {}  {:<30} {:<24} {}",
        favorite, entry.id, entry.domain, entry.username, category
    );
}
