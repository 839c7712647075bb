use std::net::SocketAddr;

use server::{build_router, config::ServerConfig, AppState};
use speech_api::SpeechClient;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting speech playback server...");

    let client = SpeechClient::from_env()?;
    info!("Using speech API at {}", client.base_url());

    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, prime_chunks={}, default_voice={}",
        config.port, config.rate_limit_per_minute, config.prime_chunks, config.default_voice_name
    );

    let port = config.port;
    let app = build_router(AppState::new(client, config))?;

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
