use crate::layout::OverlayStyle;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

const AUDIO_FADE_S: u32 = 2;
const AUDIO_VOLUME: f64 = 0.5;

/// The two encoder invocations the composer needs.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Renders `filters` over a black frame into `out`.
    async fn render_text(&self, filters: &str, style: &OverlayStyle, out: &Path) -> Result<()>;

    /// Writes `video` with `track` mixed in as its audio into `out`.
    async fn mix_audio(&self, video: &Path, track: &Path, style: &OverlayStyle, out: &Path) -> Result<()>;
}

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let output = cmd.output().await.context("Command execution failed")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let snippet = stderr.chars().take(600).collect::<String>();
        if !snippet.trim().is_empty() {
            logw(format!("{} stderr: {}", args[0], snippet.trim()));
        }
        return Err(anyhow::anyhow!("Command failed ({}): {:?}", output.status, args));
    }

    Ok(())
}

pub fn render_args(program: &str, filters: &str, style: &OverlayStyle, out: &Path) -> Vec<String> {
    vec![
        program.to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!("color=c=black:s={}x{}:d={}", style.width, style.height, style.duration_s),
        "-vf".to_string(),
        filters.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "slow".to_string(),
        "-crf".to_string(),
        "18".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-t".to_string(),
        style.duration_s.to_string(),
        out.display().to_string(),
    ]
}

pub fn audio_filter(style: &OverlayStyle) -> String {
    let fade_out_at = style.duration_s.saturating_sub(AUDIO_FADE_S);
    format!(
        "[1:a]afade=t=in:st=0:d={fade},afade=t=out:st={out_at}:d={fade},volume={vol}[a]",
        fade = AUDIO_FADE_S,
        out_at = fade_out_at,
        vol = AUDIO_VOLUME
    )
}

pub fn mix_args(program: &str, video: &Path, track: &Path, style: &OverlayStyle, out: &Path) -> Vec<String> {
    vec![
        program.to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-i".to_string(),
        track.display().to_string(),
        "-filter_complex".to_string(),
        audio_filter(style),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-shortest".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.display().to_string(),
    ]
}

/// Shells out to the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn render_text(&self, filters: &str, style: &OverlayStyle, out: &Path) -> Result<()> {
        run_cmd(&render_args(&self.program, filters, style, out)).await?;
        if !out.exists() {
            anyhow::bail!("ffmpeg reported success but {} is missing", out.display());
        }
        Ok(())
    }

    async fn mix_audio(&self, video: &Path, track: &Path, style: &OverlayStyle, out: &Path) -> Result<()> {
        run_cmd(&mix_args(&self.program, video, track, style, out)).await?;
        if !out.exists() {
            anyhow::bail!("ffmpeg reported success but {} is missing", out.display());
        }
        Ok(())
    }
}
