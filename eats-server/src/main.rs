use std::env;
use std::net::TcpListener;

use anyhow::Context;
use eats_server::{config::Config, serve, shutdown_signal, State};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?.with_args(env::args().skip(1))?;

    info!("Initializing state...");
    let state = State::new(&config)?;

    let addr = config.addr();
    let listener = TcpListener::bind(addr).with_context(|| format!("Error binding {addr}"))?;
    serve(listener, state, shutdown_signal()).await?;

    info!("Server shut down");
    Ok(())
}
