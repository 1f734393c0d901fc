use anyhow::Result;
use quote_shorts::app::App;
use quote_shorts::config::Config;
use quote_shorts::init;

#[tokio::main]
async fn main() -> Result<()> {
    quote_shorts::init_tracing();

    let cfg = Config::load("config.json").await?;
    init::ensure_directories(&cfg).await?;

    if !init::check_ffmpeg().await {
        tracing::warn!("FFmpeg not found in PATH. Please install FFmpeg.");
    }

    let app = App::build(&cfg).await?;
    let code = match app.pipeline.run().await {
        Ok(outcome) => {
            tracing::info!(
                quote = %outcome.quote.text,
                uploaded = outcome.report.uploaded(),
                failed = outcome.report.failed(),
                "Run complete"
            );
            0
        }
        Err(err) => {
            tracing::error!("Run failed: {:#}", err);
            1
        }
    };
    std::process::exit(code);
}
