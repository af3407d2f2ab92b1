//! Server state and TCP listener.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::connection;
use crate::crypto::SessionCrypto;
use crate::directory::SessionDirectory;
use crate::store::Store;

/// Shared state accessible by all connection handlers.
pub struct SharedState {
    pub directory: SessionDirectory,
    pub store: Mutex<Store>,
    pub crypto: SessionCrypto,
}

impl SharedState {
    /// Run a closure against the store, logging and swallowing
    /// failures. A storage error fails the one request that hit it,
    /// never the process.
    pub fn with_store<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Store) -> rusqlite::Result<R>,
    {
        let mut store = self.store.lock();
        match f(&mut store) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::error!("storage error: {e}");
                None
            }
        }
    }
}

pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    fn build_state(&self) -> Result<Arc<SharedState>> {
        let crypto = SessionCrypto::load_or_generate(Path::new(&self.config.key_file))
            .context("failed to load or create the session key")?;
        let preview_len = crypto.key_string().len().min(10);
        tracing::info!(
            "session key loaded: {}...",
            &crypto.key_string()[..preview_len]
        );

        let store = Store::open(&self.config.db_path)
            .with_context(|| format!("failed to open database: {}", self.config.db_path))?;

        Ok(Arc::new(SharedState {
            directory: SessionDirectory::new(),
            store: Mutex::new(store),
            crypto,
        }))
    }

    /// Run the server, blocking forever. An accept-level failure is
    /// fatal to the whole process; there is no supervisor.
    pub async fn run(self) -> Result<()> {
        let state = self.build_state()?;
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!("listening on {}", self.config.listen_addr);

        loop {
            let (stream, peer) = listener.accept().await?;
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                if let Err(e) = connection::handle(stream, state).await {
                    tracing::error!(%peer, "connection error: {e}");
                }
            });
        }
    }

    /// Start the server and return the bound address + task handle
    /// (for testing).
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let state = self.build_state()?;
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "listening");

        let handle = tokio::spawn(async move {
            loop {
                let (stream, peer) = listener.accept().await?;
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = connection::handle(stream, state).await {
                        tracing::error!(%peer, "connection error: {e}");
                    }
                });
            }
        });

        Ok((addr, handle))
    }
}
