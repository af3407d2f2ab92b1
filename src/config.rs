//! Server configuration, parsed from flags and environment.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "chatrelay-server", about = "Chat relay server")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long = "listen", env = "CHATRELAY_LISTEN", default_value = "127.0.0.1:5050")]
    pub listen_addr: String,

    /// SQLite database path. Parent directories are created on startup.
    #[arg(long = "db", env = "CHATRELAY_DB", default_value = "data/data.db")]
    pub db_path: String,

    /// Session key file. Generated and persisted on first start if missing.
    #[arg(long = "key-file", env = "CHATRELAY_KEY_FILE", default_value = "server.key")]
    pub key_file: String,
}
