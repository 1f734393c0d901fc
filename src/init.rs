use crate::config::Config;
use crate::logi;
use anyhow::Result;
use tokio::fs;

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in [cfg.base_dir.clone(), cfg.music_path()] {
        if fs::metadata(&dir).await.is_err() {
            fs::create_dir_all(&dir).await?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
