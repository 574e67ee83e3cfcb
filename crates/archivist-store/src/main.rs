use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use archivist_core::RemoteStore;
use archivist_drive::DriveClient;
use archivist_store::{ChangeAwareCache, Config, RecordStore};

/// Inspection tool: walks the scope folders under the configured root and
/// prints each scope's current record.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    info!("Starting archivist");
    info!("  API base: {}", config.drive_api_base);
    info!("  Root folder: {}", config.root_folder_id);
    info!("  Ledger file: {}", config.ledger_file_name);

    let remote: Arc<dyn RemoteStore> = Arc::new(DriveClient::with_options(
        config.drive_api_base.clone(),
        config.drive_api_token.clone(),
        config.request_timeout(),
        config.retry_policy(),
    )?);
    let cache = Arc::new(ChangeAwareCache::new(remote));
    let store = RecordStore::new(
        cache.clone(),
        config.root_folder_id.clone(),
        config.ledger_file_name.clone(),
    );

    let scopes = cache.list_folders(&config.root_folder_id).await?;
    info!("{} scope folders under root", scopes.len());

    for scope in scopes {
        match store.get_current(&scope.id, &scope.name).await? {
            Some(record) => info!(
                "  {}: v{}{} by {} (updated {})",
                scope.name,
                record.version,
                if record.pinned { " [pinned]" } else { "" },
                record.author,
                record.updated_at
            ),
            None => info!("  {}: no versions yet", scope.name),
        }
    }

    Ok(())
}
