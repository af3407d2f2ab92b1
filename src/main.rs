use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (CHATRELAY_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("CHATRELAY_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("chatrelay=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = chatrelay::config::ServerConfig::parse();
    tracing::info!("Starting chat relay on {}", config.listen_addr);

    let server = chatrelay::server::Server::new(config);
    server.run().await
}
