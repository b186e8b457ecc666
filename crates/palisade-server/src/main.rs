//! Palisade server entry point.

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palisade_config::PalisadeConfig;
use palisade_server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palisade=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = PalisadeConfig::from_env()?;
    config.validate()?;

    info!(
        mode = ?config.mode,
        addr = %config.http_addr,
        "starting palisade"
    );

    let server = Server::new(&config);
    if let Err(e) = server.run().await {
        error!("server error: {e}");
        return Err(e.into());
    }

    Ok(())
}
