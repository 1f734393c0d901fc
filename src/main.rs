use anyhow::{Context, Result};
use quote_shorts::app::App;
use quote_shorts::config::Config;
use quote_shorts::{init, server};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<()> {
    quote_shorts::init_tracing();

    let cfg = Config::load("config.json").await?;
    init::ensure_directories(&cfg).await?;

    if !init::check_ffmpeg().await {
        tracing::warn!("FFmpeg not found in PATH. Please install FFmpeg.");
    }

    let addr: SocketAddr = cfg
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address: {}", cfg.listen))?;
    let app = App::build(&cfg).await?;
    server::serve(addr, app.into_state()).await?;
    Ok(())
}
