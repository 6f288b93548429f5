use std::sync::Arc;

use listgrid_api::ListStore;
use listgrid_engine::{GridError, StoreConfig};
use storage_memory::{MemoryListStore, MemoryStorageConfig};
use storage_sharepoint::{SharePointConfig, SharePointStore};

/// Build the configured list store. `token` overrides the configured access token.
pub fn open(config: &StoreConfig, token: Option<&str>) -> Result<Arc<dyn ListStore>, GridError> {
    let settings = config.settings.clone();
    match config.kind.as_str() {
        "memory" => {
            let seed: MemoryStorageConfig = match settings {
                Some(v) => v
                    .try_into()
                    .map_err(|e| GridError::Config(format!("[store.settings]: {e}")))?,
                None => MemoryStorageConfig::default(),
            };
            tracing::info!(lists = seed.lists.len(), "using in-memory list store");
            Ok(Arc::new(MemoryListStore::from_config(seed)))
        }
        "sharepoint" => {
            let settings = settings
                .ok_or_else(|| GridError::Config("[store.settings] with site_url is required".into()))?;
            let mut sp: SharePointConfig = settings
                .try_into()
                .map_err(|e| GridError::Config(format!("[store.settings]: {e}")))?;
            if let Some(token) = token {
                sp.access_token = Some(token.to_string());
            }
            tracing::info!(site = %sp.site_url, "using SharePoint list store");
            Ok(Arc::new(SharePointStore::new(&sp)?))
        }
        other => Err(GridError::Config(format!("unknown store kind '{other}'"))),
    }
}
