use secrecy::ExposeSecret;
use std::sync::Arc;

use crate::config::Config;
use crate::store::{FileKeyStore, KeyStore, PgKeyStore, StoreError};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<KeyStore>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: KeyStore, config: Config) -> Self {
        Self {
            store: Arc::new(store),
            config,
        }
    }

    /// Opens the store the configuration points at: Postgres when a database
    /// URL is set, the keys file otherwise.
    pub async fn from_config(config: Config) -> Result<Self, StoreError> {
        let store = match &config.database_url {
            Some(url) => KeyStore::Postgres(PgKeyStore::connect(url.expose_secret()).await?),
            None => KeyStore::File(FileKeyStore::open(&config.keys_file).await?),
        };

        tracing::info!(backend = store.backend_name(), "Key store opened");

        Ok(Self::new(store, config))
    }
}
