use canvas_accounts::{Registry, config, net::http};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cfg = Arc::new(config::Config::from_env()?);

    let registry = Arc::new(Registry::connect(cfg.clone()).await?);

    let http_addr: SocketAddr = cfg.http_addr.parse()?;
    tracing::info!(
        %http_addr,
        max_probes = ?cfg.username_max_probes,
        signup_attempts = cfg.signup_max_attempts,
        "canvas accounts API listening"
    );
    http::serve(http_addr, registry).await?;

    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, prelude::*};

    color_eyre::install().map_err(|e| anyhow::anyhow!(e))?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info,canvas_accounts=debug"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::uptime()),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();

    Ok(())
}
