use crate::ffmpeg::Encoder;
use crate::layout::{self, OverlayStyle};
use crate::music;
use crate::quote::Quote;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use tokio::fs;

#[async_trait]
pub trait VideoComposer: Send + Sync {
    /// Renders `quote` and returns the path of the finished video.
    async fn compose(&self, quote: &Quote) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct ComposerSettings {
    pub output: PathBuf,
    pub font: PathBuf,
    pub music_dir: PathBuf,
    pub wrap_chars: usize,
    pub style: OverlayStyle,
}

/// Wraps the quote, renders the silent clip and, when the music directory
/// holds a track, mixes it in place over the output.
pub struct QuoteVideoComposer<E> {
    encoder: E,
    settings: ComposerSettings,
}

impl<E: Encoder> QuoteVideoComposer<E> {
    pub fn new(encoder: E, settings: ComposerSettings) -> Self {
        Self { encoder, settings }
    }

    fn mixed_path(&self) -> PathBuf {
        let stem = self
            .settings
            .output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        self.settings.output.with_file_name(format!("{}_with_audio.mp4", stem))
    }

    async fn add_music(&self, track: &Path) -> Result<()> {
        let mixed = self.mixed_path();
        let style = &self.settings.style;
        self.encoder
            .mix_audio(&self.settings.output, track, style, &mixed)
            .await?;
        fs::rename(&mixed, &self.settings.output)
            .await
            .with_context(|| format!("Failed to replace {}", self.settings.output.display()))?;
        Ok(())
    }
}

#[async_trait]
impl<E: Encoder> VideoComposer for QuoteVideoComposer<E> {
    async fn compose(&self, quote: &Quote) -> Result<PathBuf> {
        let settings = &self.settings;
        let lines = layout::wrap_lines(&quote.text, settings.wrap_chars);
        if lines.is_empty() {
            anyhow::bail!("quote has no words to render");
        }

        let overlay = layout::build_overlay(&lines, &settings.style);
        let filters = layout::filter_chain(&overlay, &settings.style, &settings.font);

        logi(format!("Rendering {} overlay lines -> {}", overlay.len(), settings.output.display()));
        self.encoder
            .render_text(&filters, &settings.style, &settings.output)
            .await
            .context("Silent render failed")?;
        logok(format!("Silent render OK: {}", settings.output.display()));

        let track = {
            let mut rng = StdRng::from_entropy();
            music::pick_random_track(&settings.music_dir, &mut rng)
        };

        match track {
            None => logi(format!("No audio in {}; keeping silent video.", settings.music_dir.display())),
            Some(track) => {
                logi(format!("Mixing background track {}", track.display()));
                match self.add_music(&track).await {
                    Ok(()) => logok(format!("Audio mix OK: {}", settings.output.display())),
                    Err(err) => {
                        logw(format!("Audio mix failed; keeping silent video: {:#}", err));
                        let _ = fs::remove_file(self.mixed_path()).await;
                    }
                }
            }
        }

        Ok(settings.output.clone())
    }
}
