//! Cumulus CLI: command-line access to the configured storage backend.
//!
//! Set STORAGE_BACKEND and the backend's variables (CLOUDINARY_URL, or
//! LOCAL_STORAGE_PATH and LOCAL_STORAGE_BASE_URL).

use anyhow::Context;
use clap::{Parser, Subcommand};
use cumulus_cli::{init_tracing, parse_options};
use cumulus_core::{Metadata, StorageConfig};
use cumulus_storage::{create_storage, Confirm, Identifier, UploadSource};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "cumulus", about = "Cumulus storage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file
    Upload {
        /// Path to the file to upload
        file: std::path::PathBuf,
        /// Identifier to store the file under
        #[arg(long)]
        id: String,
        /// Keep the identifier even if the backend reports another one
        #[arg(long)]
        frozen: bool,
        /// Provider option as key=value (repeatable)
        #[arg(long = "option")]
        options: Vec<String>,
    },
    /// Upload a file from a URL
    UploadUrl {
        /// URL of the file
        url: String,
        /// Identifier to store the file under
        #[arg(long)]
        id: String,
        /// Provider option as key=value (repeatable)
        #[arg(long = "option")]
        options: Vec<String>,
    },
    /// Print the delivery URL of a file
    Url {
        /// File identifier
        id: String,
        /// Crop mode, e.g. fit or fill
        #[arg(long)]
        crop: Option<String>,
        /// Width in pixels
        #[arg(long)]
        width: Option<u32>,
        /// Height in pixels
        #[arg(long)]
        height: Option<u32>,
        /// URL option as key=value (repeatable)
        #[arg(long = "option")]
        options: Vec<String>,
    },
    /// Check whether a file exists
    Exists {
        /// File identifier
        id: String,
    },
    /// Delete one or more files
    Delete {
        /// File identifiers
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete everything the storage holds
    Clear {
        /// Required: confirms the deletion
        #[arg(long)]
        confirm: bool,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = StorageConfig::from_env().context("Failed to load storage configuration")?;
    let storage = create_storage(&config)
        .await
        .context("Failed to create storage backend")?;

    match cli.command {
        Commands::Upload {
            file,
            id,
            frozen,
            options,
        } => {
            let options = parse_options(&options)?;
            let source = UploadSource::from_path(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let id = if frozen {
                Identifier::frozen(id)
            } else {
                Identifier::new(id)
            };

            let outcome = storage.upload(source, id, Metadata::new(), options).await?;
            print_json(&json!({
                "id": outcome.id,
                "url": storage.url(&outcome.id, &Default::default()),
                "metadata": outcome.metadata,
            }))?;
        }
        Commands::UploadUrl { url, id, options } => {
            let options = parse_options(&options)?;
            let outcome = storage
                .upload(UploadSource::Url(url), Identifier::new(id), Metadata::new(), options)
                .await?;
            print_json(&json!({
                "id": outcome.id,
                "url": storage.url(&outcome.id, &Default::default()),
                "metadata": outcome.metadata,
            }))?;
        }
        Commands::Url {
            id,
            crop,
            width,
            height,
            options,
        } => {
            let mut options = parse_options(&options)?;
            if let Some(crop) = crop {
                options.insert("crop".to_string(), Value::from(crop));
            }
            if let Some(width) = width {
                options.insert("width".to_string(), Value::from(width));
            }
            if let Some(height) = height {
                options.insert("height".to_string(), Value::from(height));
            }
            print_json(&json!({ "url": storage.url(&id, &options) }))?;
        }
        Commands::Exists { id } => {
            let exists = storage.exists(&id).await?;
            print_json(&json!({ "id": id, "exists": exists }))?;
        }
        Commands::Delete { ids } => {
            if let [id] = ids.as_slice() {
                storage.delete(id).await?;
            } else {
                storage.multi_delete(&ids).await?;
            }
            print_json(&json!({ "success": true, "deleted": ids }))?;
        }
        Commands::Clear { confirm } => {
            storage
                .clear(confirm.then_some(Confirm), &Default::default())
                .await
                .context("Failed to clear storage")?;
            print_json(&json!({ "success": true, "backend": storage.backend_type().to_string() }))?;
        }
    }

    Ok(())
}
