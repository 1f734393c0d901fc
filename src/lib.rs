pub mod api;
pub mod app;
pub mod composer;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod history;
pub mod identity;
pub mod init;
pub mod layout;
pub mod metadata;
pub mod music;
pub mod oauth;
pub mod pipeline;
pub mod publish;
pub mod quote;
pub mod server;
pub mod source;
pub mod youtube;

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!("[{}] {}", tag, message),
        _ => tracing::info!("[{}] {}", tag, message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}

/// Installs the `tracing` subscriber used by both binaries.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
